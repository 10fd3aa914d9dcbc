#![recursion_limit = "256"]

//! Train a small convolutional network on CIFAR-10 and report its accuracy.
//!
//! The [run](experiment::run) is linear: the [dataset](dataset) is materialized, the
//! [trainer](training) either restores the [model](model) from its checkpoint or fits it, and
//! the [evaluator](evaluation) reports global and per-class accuracy on the test split.

pub mod data;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod logger;
pub mod model;
pub mod show;
pub mod training;

pub use error::{Error, Result};

#[cfg(test)]
pub type TestBackend = burn::backend::NdArray<f32>;

#[cfg(test)]
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
