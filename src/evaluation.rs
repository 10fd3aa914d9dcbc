use std::fmt;
use std::sync::Arc;

use burn::{data::dataloader::DataLoader, prelude::*};

use crate::data::CifarBatch;
use crate::dataset::{CifarClass, NUM_CLASSES};
use crate::model::ImageClassifier;
use crate::{Error, Result};

/// Correct and total predictions, globally and for every class.
///
/// Percentages are `None` when nothing was counted, so an absent class is reported as
/// undefined instead of dividing by zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassAccuracy {
    correct: usize,
    total: usize,
    class_correct: [usize; NUM_CLASSES],
    class_total: [usize; NUM_CLASSES],
}

impl ClassAccuracy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one evaluated sample.
    pub fn record(&mut self, predicted: CifarClass, target: CifarClass) {
        let hit = usize::from(predicted == target);

        self.correct += hit;
        self.total += 1;
        self.class_correct[target.index()] += hit;
        self.class_total[target.index()] += 1;
    }

    /// Count a batch of predictions against their targets, pairwise.
    ///
    /// Nothing is counted when the two slices differ in length.
    pub fn update(&mut self, predicted: &[CifarClass], targets: &[CifarClass]) -> Result<()> {
        if predicted.len() != targets.len() {
            return Err(Error::TensorData(format!(
                "{} predictions for {} targets",
                predicted.len(),
                targets.len()
            )));
        }

        for (predicted, target) in predicted.iter().zip(targets) {
            self.record(*predicted, *target);
        }

        Ok(())
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn class_correct(&self, class: CifarClass) -> usize {
        self.class_correct[class.index()]
    }

    pub fn class_total(&self, class: CifarClass) -> usize {
        self.class_total[class.index()]
    }

    /// Percentage of correct predictions over every sample.
    pub fn global(&self) -> Option<f64> {
        percent(self.correct, self.total)
    }

    /// Percentage of correct predictions among the samples of `class`.
    pub fn per_class(&self, class: CifarClass) -> Option<f64> {
        percent(self.class_correct(class), self.class_total(class))
    }
}

fn percent(correct: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| 100.0 * correct as f64 / total as f64)
}

struct Percent(Option<f64>);

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            // Whole percent, truncated.
            Some(value) => write!(f, "{:2} %", value as u32),
            None => f.write_str("undefined (no samples)"),
        }
    }
}

impl fmt::Display for ClassAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Accuracy of the network on the {} test images: {}",
            self.total,
            Percent(self.global())
        )?;

        for class in CifarClass::ALL {
            writeln!(
                f,
                "Accuracy of {:>5} : {}",
                class,
                Percent(self.per_class(class))
            )?;
        }

        Ok(())
    }
}

/// Ground truth and predicted classes of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPrediction {
    pub ground_truth: Vec<CifarClass>,
    pub predicted: Vec<CifarClass>,
}

impl BatchPrediction {
    pub fn ground_truth_line(&self) -> String {
        format!("GroundTruth: {}", class_names(&self.ground_truth))
    }

    pub fn predicted_line(&self) -> String {
        format!("Predicted: {}", class_names(&self.predicted))
    }
}

/// Class names padded to five characters, space separated.
pub fn class_names(classes: &[CifarClass]) -> String {
    classes
        .iter()
        .map(|class| format!("{class:>5}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Predicted class of every image: the index of its highest score.
pub fn predict<B: Backend, M: ImageClassifier<B>>(
    model: &M,
    batch: CifarBatch<B>,
) -> Result<BatchPrediction> {
    let predicted = model.scores(batch.images).argmax(1).flatten::<1>(0, 1);

    Ok(BatchPrediction {
        ground_truth: labels_to_classes(batch.targets)?,
        predicted: labels_to_classes(predicted)?,
    })
}

/// Read integer labels back from the device.
pub fn labels_to_classes<B: Backend>(labels: Tensor<B, 1, Int>) -> Result<Vec<CifarClass>> {
    let labels = labels
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|err| Error::TensorData(format!("{err:?}")))?;

    labels
        .into_iter()
        .map(|label| {
            usize::try_from(label)
                .ok()
                .and_then(CifarClass::from_index)
                .ok_or_else(|| Error::TensorData(format!("{label} is not a class label")))
        })
        .collect()
}

/// Runs a model over the test batches and accumulates its accuracy.
///
/// The backend is expected to be a plain inference backend, so no gradient is tracked.
pub struct Evaluator<B: Backend> {
    loader: Arc<dyn DataLoader<B, CifarBatch<B>>>,
}

impl<B: Backend> Evaluator<B> {
    pub fn new(loader: Arc<dyn DataLoader<B, CifarBatch<B>>>) -> Self {
        Self { loader }
    }

    /// First test batch, taken from a pass of its own; `None` when the split is empty.
    pub fn first_batch(&self) -> Option<CifarBatch<B>> {
        self.loader.iter().next()
    }

    /// One full pass over the test split. Accumulators start from zero on every call.
    pub fn evaluate<M: ImageClassifier<B>>(&self, model: &M) -> Result<ClassAccuracy> {
        let mut accuracy = ClassAccuracy::new();

        for batch in self.loader.iter() {
            let prediction = predict(model, batch)?;
            accuracy.update(&prediction.predicted, &prediction.ground_truth)?;
        }

        log::info!(
            "Evaluated {} samples, {} correct",
            accuracy.total(),
            accuracy.correct()
        );

        for class in CifarClass::ALL {
            if accuracy.class_total(class) == 0 {
                log::warn!("No test sample of class {class}, its accuracy is undefined");
            }
        }

        Ok(accuracy)
    }
}
