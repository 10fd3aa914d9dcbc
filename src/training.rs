use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use burn::{
    data::dataloader::DataLoader,
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{momentum::MomentumConfig, GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::CifarBatch;
use crate::model::{Mode, Model};
use crate::Error;

/// Where the trained parameters are kept between runs.
pub const CHECKPOINT_PATH: &str = "result.mpk";

const CHECKPOINT_EXTENSION: &str = "mpk";

#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = 6)]
    pub num_epochs: usize,
    #[config(default = 4)]
    pub batch_size: usize,
    #[config(default = 1.0e-3)]
    pub learning_rate: f64,
    #[config(default = 0.9)]
    pub momentum: f64,
    #[config(default = 42)]
    pub seed: u64,
    /// Number of batches averaged in each reported loss.
    #[config(default = 2000)]
    pub log_interval: usize,
}

impl TrainingConfig {
    /// Plain SGD with momentum, without weight decay.
    pub fn optimizer(&self) -> SgdConfig {
        SgdConfig::new().with_momentum(Some(self.momentum_config()))
    }

    /// Classical momentum: no dampening, no Nesterov.
    pub fn momentum_config(&self) -> MomentumConfig {
        MomentumConfig::new()
            .with_momentum(self.momentum)
            .with_dampening(0.0)
            .with_nesterov(false)
    }
}

/// Mean loss over the last `log_interval` batches of an epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct LossSummary {
    pub epoch: usize,
    pub iteration: usize,
    pub mean_loss: f64,
}

impl fmt::Display for LossSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {:5}] loss: {:.3}",
            self.epoch, self.iteration, self.mean_loss
        )
    }
}

/// How the model handed to evaluation was obtained.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    /// Parameters were restored from an existing checkpoint.
    Loaded,
    /// The model was fitted and the checkpoint written.
    Trained { summaries: Vec<LossSummary> },
}

/// Fits the model unless a checkpoint already holds its parameters.
pub struct Trainer {
    config: TrainingConfig,
    checkpoint: PathBuf,
}

impl Trainer {
    pub fn new<P: Into<PathBuf>>(config: TrainingConfig, checkpoint: P) -> Self {
        Self {
            config,
            checkpoint: checkpoint.into(),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Checkpoint file, with the extension the recorder writes.
    pub fn checkpoint_file(&self) -> PathBuf {
        self.checkpoint.with_extension(CHECKPOINT_EXTENSION)
    }

    pub fn checkpoint_exists(&self) -> bool {
        self.checkpoint_file().is_file()
    }

    /// Returns a model ready for inference.
    ///
    /// The path is chosen once: an existing checkpoint is loaded verbatim and the training
    /// loader is never consumed, otherwise the model is fitted and then persisted.
    pub fn prepare<B: AutodiffBackend>(
        &self,
        loader: &Arc<dyn DataLoader<B, CifarBatch<B>>>,
        device: &B::Device,
    ) -> crate::Result<(Model<B::InnerBackend>, TrainingOutcome)> {
        if self.checkpoint_exists() {
            log::info!(
                "Model already trained, loading {}",
                self.checkpoint_file().display()
            );
            let model = Model::<B::InnerBackend>::from_checkpoint(&self.checkpoint, device)?;
            return Ok((model, TrainingOutcome::Loaded));
        }

        let (model, summaries) = self.fit(loader, device)?;
        Ok((model.valid(), TrainingOutcome::Trained { summaries }))
    }

    /// Runs every epoch over the loader, then writes the checkpoint.
    pub fn fit<B: AutodiffBackend>(
        &self,
        loader: &Arc<dyn DataLoader<B, CifarBatch<B>>>,
        device: &B::Device,
    ) -> crate::Result<(Model<B>, Vec<LossSummary>)> {
        let config = &self.config;
        B::seed(config.seed);

        let mut model = Model::<B>::new(device);
        let mut optim = config.optimizer().init::<B, Model<B>>();
        let loss_fn = CrossEntropyLossConfig::new().init(device);
        let mut summaries = Vec::new();

        log::info!(
            "Training for {} epochs over {} samples",
            config.num_epochs,
            loader.num_items()
        );

        for epoch in 1..=config.num_epochs {
            let mut running_loss = 0.0;

            for (index, batch) in loader.iter().enumerate() {
                let iteration = index + 1;

                // Gradients are consumed by each step, every batch starts from none.
                let scores = model.forward(batch.images, Mode::Train);
                let loss = loss_fn.forward(scores, batch.targets);
                let loss_value = loss.clone().into_scalar().elem::<f64>();

                if !loss_value.is_finite() {
                    return Err(Error::NonFiniteLoss { epoch, iteration });
                }

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(config.learning_rate, model, grads);

                running_loss += loss_value;
                if config.log_interval > 0 && iteration % config.log_interval == 0 {
                    let summary = LossSummary {
                        epoch,
                        iteration,
                        mean_loss: running_loss / config.log_interval as f64,
                    };
                    log::info!("{summary}");
                    summaries.push(summary);
                    running_loss = 0.0;
                }
            }
        }

        log::info!("Finished Training");
        self.save(&model)?;

        Ok((model, summaries))
    }

    fn save<B: Backend>(&self, model: &Model<B>) -> crate::Result<()> {
        if let Some(parent) = self.checkpoint.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        model.clone().save_checkpoint(&self.checkpoint)?;
        log::info!("Saved checkpoint {}", self.checkpoint_file().display());
        Ok(())
    }
}
