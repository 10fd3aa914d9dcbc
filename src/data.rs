use std::sync::Arc;

use burn::{
    data::{
        dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
        dataset::Dataset,
    },
    prelude::*,
};

use crate::dataset::{CifarItem, CifarSplit, CHANNELS, HEIGHT, WIDTH};

// Per-channel normalization mapping [0, 1] to [-1, 1].
const MEAN: f32 = 0.5;
const STD: f32 = 0.5;

/// Turns CIFAR items into normalized image tensors and class labels.
#[derive(Clone, Default)]
pub struct CifarBatcher;

#[derive(Clone, Debug)]
pub struct CifarBatch<B: Backend> {
    /// Images of shape `[batch_size, 3, 32, 32]` in the range [-1, 1].
    pub images: Tensor<B, 4>,
    /// Class labels of shape `[batch_size]`.
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, CifarItem, CifarBatch<B>> for CifarBatcher {
    fn batch(&self, items: Vec<CifarItem>, device: &B::Device) -> CifarBatch<B> {
        let images = items
            .iter()
            .map(|item| TensorData::new(item.image.clone(), [CHANNELS, HEIGHT, WIDTH]))
            .map(|data| Tensor::<B, 3>::from_data(data.convert::<B::FloatElem>(), device))
            .map(|tensor| tensor / 255)
            .collect();

        let images = Tensor::stack::<4>(images, 0).sub_scalar(MEAN).div_scalar(STD);

        let targets = items
            .iter()
            .map(|item| item.label.index() as i64)
            .collect::<Vec<_>>();
        let targets = TensorData::new(targets, [items.len()]).convert::<B::IntElem>();
        let targets = Tensor::<B, 1, Int>::from_data(targets, device);

        CifarBatch { images, targets }
    }
}

/// Loader over one split.
///
/// The train split is shuffled with a seeded generator that advances on every call to
/// `iter()`, so each pass sees a different order while every sample still appears exactly
/// once. The test split keeps the dataset order. In both cases the last, possibly partial,
/// batch is yielded.
pub fn split_loader<B, O, Bt, D>(
    batcher: Bt,
    dataset: D,
    split: CifarSplit,
    batch_size: usize,
    seed: u64,
    device: &B::Device,
) -> Arc<dyn DataLoader<B, O>>
where
    B: Backend,
    O: Send + Clone + std::fmt::Debug + 'static,
    Bt: Batcher<B, CifarItem, O> + 'static,
    D: Dataset<CifarItem> + 'static,
{
    let builder = DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .set_device(device.clone());

    match split {
        CifarSplit::Train => builder.shuffle(seed).build(dataset),
        CifarSplit::Test => builder.build(dataset),
    }
}

/// Shuffled loader of training batches.
pub fn train_loader<B: Backend, D: Dataset<CifarItem> + 'static>(
    dataset: D,
    batch_size: usize,
    seed: u64,
    device: &B::Device,
) -> Arc<dyn DataLoader<B, CifarBatch<B>>> {
    split_loader(CifarBatcher, dataset, CifarSplit::Train, batch_size, seed, device)
}

/// Loader of test batches in dataset order.
pub fn test_loader<B: Backend, D: Dataset<CifarItem> + 'static>(
    dataset: D,
    batch_size: usize,
    device: &B::Device,
) -> Arc<dyn DataLoader<B, CifarBatch<B>>> {
    split_loader(CifarBatcher, dataset, CifarSplit::Test, batch_size, 0, device)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::dataset::{CifarClass, CifarDataset, IMAGE_BYTES};
    use crate::TestBackend;

    /// Recovers the sample indices written in the first two pixels.
    #[derive(Clone)]
    struct IndexBatcher;

    impl<B: Backend> Batcher<B, CifarItem, Vec<usize>> for IndexBatcher {
        fn batch(&self, items: Vec<CifarItem>, _device: &B::Device) -> Vec<usize> {
            items
                .iter()
                .map(|item| item.image[0] as usize + 256 * item.image[1] as usize)
                .collect()
        }
    }

    fn indexed_dataset(len: usize) -> CifarDataset {
        let items = (0..len)
            .map(|index| {
                let mut image = vec![0; IMAGE_BYTES];
                image[0] = (index % 256) as u8;
                image[1] = (index / 256) as u8;
                CifarItem {
                    image,
                    label: CifarClass::ALL[index % CifarClass::ALL.len()],
                }
            })
            .collect();
        CifarDataset::from_items(items)
    }

    fn passes(split: CifarSplit, len: usize) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
        let device = Default::default();
        let loader = split_loader::<TestBackend, _, _, _>(
            IndexBatcher,
            indexed_dataset(len),
            split,
            4,
            42,
            &device,
        );

        (loader.iter().collect(), loader.iter().collect())
    }

    fn sample_set(batches: &[Vec<usize>]) -> BTreeSet<usize> {
        batches.iter().flatten().copied().collect()
    }

    #[test]
    fn train_passes_cover_same_samples_in_new_order() {
        let (first, second) = passes(CifarSplit::Train, 402);

        assert_eq!(sample_set(&first), (0..402).collect());
        assert_eq!(sample_set(&second), (0..402).collect());
        assert_eq!(first.iter().flatten().count(), 402);
        assert_ne!(first, second);
    }

    #[test]
    fn last_partial_batch_is_yielded() {
        let (batches, _) = passes(CifarSplit::Train, 402);

        assert_eq!(batches.len(), 101);
        assert_eq!(batches.last().map(Vec::len), Some(2));
    }

    #[test]
    fn test_passes_keep_dataset_order() {
        let (first, second) = passes(CifarSplit::Test, 10);

        assert_eq!(first, second);
        assert_eq!(first, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
    }

    #[test]
    fn batcher_normalizes_images_and_labels() {
        let device = Default::default();
        let items = vec![
            CifarItem {
                image: vec![255; IMAGE_BYTES],
                label: CifarClass::Ship,
            },
            CifarItem {
                image: vec![0; IMAGE_BYTES],
                label: CifarClass::Car,
            },
        ];

        let batch: CifarBatch<TestBackend> = CifarBatcher.batch(items, &device);

        assert_eq!(batch.images.dims(), [2, CHANNELS, HEIGHT, WIDTH]);
        let max = batch.images.clone().max().into_scalar();
        let min = batch.images.min().into_scalar();
        assert!((max - 1.0).abs() < 1e-6);
        assert!((min + 1.0).abs() < 1e-6);
        batch
            .targets
            .into_data()
            .assert_eq(&TensorData::from([8i64, 1]), false);
    }
}
