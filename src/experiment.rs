use burn::tensor::backend::AutodiffBackend;

use crate::data::{test_loader, train_loader};
use crate::dataset::CifarDataset;
use crate::evaluation::{class_names, labels_to_classes, predict, Evaluator};
use crate::show::save_image_grid;
use crate::training::{Trainer, TrainingConfig, TrainingOutcome, CHECKPOINT_PATH};
use crate::Result;

/// Grid of the first training batch.
pub const TRAIN_GRID: &str = "0.png";
/// Grid of the first test batch.
pub const TEST_GRID: &str = "1.png";

/// Load the data, train or restore the model, then report its accuracy on the test split.
pub fn run<B: AutodiffBackend>(device: B::Device) -> Result<()> {
    let config = TrainingConfig::new();

    let dataset_train = CifarDataset::train()?;
    let dataset_test = CifarDataset::test()?;

    let dataloader_train =
        train_loader::<B, _>(dataset_train, config.batch_size, config.seed, &device);
    let dataloader_test =
        test_loader::<B::InnerBackend, _>(dataset_test, config.batch_size, &device);

    // Some random training images.
    if let Some(batch) = dataloader_train.iter().next() {
        save_image_grid(&batch.images, TRAIN_GRID)?;
        println!("{}", class_names(&labels_to_classes(batch.targets)?));
    }

    let trainer = Trainer::new(config, CHECKPOINT_PATH);
    let (model, outcome) = trainer.prepare(&dataloader_train, &device)?;
    if let TrainingOutcome::Trained { summaries } = &outcome {
        log::info!("Trained with {} loss summaries", summaries.len());
    }

    let evaluator = Evaluator::new(dataloader_test);

    if let Some(batch) = evaluator.first_batch() {
        save_image_grid(&batch.images, TEST_GRID)?;
        let prediction = predict(&model, batch)?;
        println!("{}", prediction.ground_truth_line());
        println!("{}", prediction.predicted_line());
    }

    let accuracy = evaluator.evaluate(&model)?;
    print!("{accuracy}");

    Ok(())
}
