use std::path::Path;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
};

use crate::dataset::NUM_CLASSES;
use crate::Result;

// Spatial size after three conv (kernel 3, no padding) + pool (2x2) stages: 32 -> 15 -> 6 -> 2.
const FEATURE_SIZE: usize = 2;
const FEATURE_CHANNELS: usize = 16;

/// Recorder of model checkpoints, keeping full precision so a reload is bit-exact.
pub type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Whether a forward pass belongs to training or to inference.
///
/// The network has no training-only layer; inference detaches the scores from the
/// gradient graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Inference,
}

/// Anything able to score a batch of images against every class.
pub trait ImageClassifier<B: Backend> {
    /// Scores of shape `[batch_size, NUM_CLASSES]` for images of shape `[batch_size, 3, 32, 32]`.
    fn scores(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

/// Three conv/relu/pool stages (3 -> 6 -> 6 -> 16 channels) followed by three linear layers
/// (64 -> 120 -> 84 -> 10).
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    pool: MaxPool2d,
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    activation: Relu,
}

impl<B: Backend> Model<B> {
    /// Creates a model with freshly initialized parameters.
    pub fn new(device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([3, 6], [3, 3]).init(device);
        let conv2 = Conv2dConfig::new([6, 6], [3, 3]).init(device);
        let conv3 = Conv2dConfig::new([6, FEATURE_CHANNELS], [3, 3]).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        let fc1 =
            LinearConfig::new(FEATURE_CHANNELS * FEATURE_SIZE * FEATURE_SIZE, 120).init(device);
        let fc2 = LinearConfig::new(120, 84).init(device);
        let fc3 = LinearConfig::new(84, NUM_CLASSES).init(device);

        Self {
            conv1,
            conv2,
            conv3,
            pool,
            fc1,
            fc2,
            fc3,
            activation: Relu::new(),
        }
    }

    /// # Shapes
    ///   - Images `[batch_size, 3, 32, 32]`
    ///   - Output `[batch_size, NUM_CLASSES]`
    pub fn forward(&self, images: Tensor<B, 4>, mode: Mode) -> Tensor<B, 2> {
        let x = self.pool.forward(self.activation.forward(self.conv1.forward(images)));
        let x = self.pool.forward(self.activation.forward(self.conv2.forward(x)));
        let x = self.pool.forward(self.activation.forward(self.conv3.forward(x)));

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.activation.forward(self.fc2.forward(x));
        let scores = self.fc3.forward(x);

        match mode {
            Mode::Train => scores,
            Mode::Inference => scores.detach(),
        }
    }

    /// Persist the parameters. The recorder sets the `.mpk` extension.
    pub fn save_checkpoint(self, path: &Path) -> Result<()> {
        self.save_file(path.to_path_buf(), &CheckpointRecorder::new())?;
        Ok(())
    }

    /// Creates a model whose parameters are read from a checkpoint.
    pub fn from_checkpoint(path: &Path, device: &B::Device) -> Result<Self> {
        let model =
            Self::new(device).load_file(path.to_path_buf(), &CheckpointRecorder::new(), device)?;
        Ok(model)
    }
}

impl<B: Backend> ImageClassifier<B> for Model<B> {
    fn scores(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images, Mode::Inference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TestAutodiffBackend, TestBackend};
    use burn::tensor::{Distribution, Tolerance};
    use tempfile::TempDir;

    fn images<B: Backend>(device: &B::Device) -> Tensor<B, 4> {
        Tensor::random([4, 3, 32, 32], Distribution::Uniform(-1.0, 1.0), device)
    }

    #[test]
    fn forward_produces_one_score_per_class() {
        let device = Default::default();
        let model = Model::<TestBackend>::new(&device);

        let scores = model.forward(images::<TestBackend>(&device), Mode::Train);

        assert_eq!(scores.dims(), [4, NUM_CLASSES]);
    }

    #[test]
    fn partial_batch_is_accepted() {
        let device = Default::default();
        let model = Model::<TestBackend>::new(&device);
        let images = Tensor::<TestBackend, 4>::zeros([1, 3, 32, 32], &device);

        assert_eq!(model.scores(images).dims(), [1, NUM_CLASSES]);
    }

    #[test]
    fn modes_share_the_same_scores() {
        let device = Default::default();
        let model = Model::<TestAutodiffBackend>::new(&device);
        let input = images::<TestAutodiffBackend>(&device);

        let train = model.forward(input.clone(), Mode::Train);
        let inference = model.forward(input, Mode::Inference);

        inference
            .into_data()
            .assert_approx_eq::<f32>(&train.into_data(), Tolerance::default());
    }

    #[test]
    fn checkpoint_round_trip_preserves_outputs() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("result");
        let input = images::<TestBackend>(&device);

        let model = Model::<TestBackend>::new(&device);
        let expected = model.scores(input.clone());
        model.save_checkpoint(&path).unwrap();

        let restored = Model::<TestBackend>::from_checkpoint(&path, &device).unwrap();
        let actual = restored.scores(input);

        actual.into_data().assert_eq(&expected.into_data(), true);
    }

    #[test]
    fn missing_checkpoint_is_an_error() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();

        let result = Model::<TestBackend>::from_checkpoint(&dir.path().join("absent"), &device);

        assert!(matches!(result, Err(crate::Error::Checkpoint(_))));
    }
}
