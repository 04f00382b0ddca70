#![deny(dead_code)]
#![deny(unused_imports)]

pub mod classifier;
pub mod config;
pub mod cv;
pub mod features;
pub mod filter;
pub mod merge;
pub mod partition;
pub mod plot;
pub mod runner;
pub mod summary;
pub mod tsv;
pub mod types;
pub mod vis;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use classifier::{Classifier, CuppaClassifier};
pub use config::{ConfigError, RunnerConfig};
pub use filter::ClassifierGroup;
pub use runner::{PredictionRunner, RunnerError};
