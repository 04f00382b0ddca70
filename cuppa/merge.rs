use log::info;
use thiserror::Error;

use crate::classifier::{Classifier, ClassifierError};
use crate::partition::partition_samples;
use crate::types::{FeatureMatrix, PredictionTable, TableError};

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("failed to assemble prediction table: {0}")]
    Table(#[from] TableError),
    #[error("prediction columns do not match the classifier outputs (expected {expected}, found {found})")]
    ColumnMismatch { expected: usize, found: usize },
}

/// Predictions for every sample of `features`, in feature order.
///
/// Samples present in `cv_predictions` reuse their cross-validation rows and
/// skip inference; only the remaining samples go through the classifier.
pub fn merge_predictions<C>(
    classifier: &C,
    features: &FeatureMatrix,
    cv_predictions: Option<&PredictionTable>,
) -> Result<PredictionTable, PredictionError>
where
    C: Classifier + ?Sized,
{
    let Some(cv_predictions) = cv_predictions else {
        info!("Computing predictions for {} samples", features.n_samples());
        return Ok(classifier.predict(features)?);
    };

    let cv_ids = cv_predictions.sample_id_set();
    let partition = partition_samples(features.sample_ids(), Some(&cv_ids));
    let n_total = features.n_samples();

    let mut parts = Vec::with_capacity(2);

    if !partition.new.is_empty() {
        info!("Computing predictions for {} / {} samples", partition.new.len(), n_total);
        let new_features = features.select_samples(&partition.new)?;
        parts.push(classifier.predict(&new_features)?);
    }

    if !partition.cv.is_empty() {
        let cv_rows = cv_predictions
            .select_samples(&partition.cv)?
            .align_columns(classifier.output_columns())?;
        parts.push(cv_rows);
        info!(
            "Found cross-validation predictions for {} / {} samples",
            partition.cv.len(),
            n_total
        );
    }

    if parts.is_empty() {
        return Ok(PredictionTable::empty(classifier.output_columns().to_vec()));
    }

    let merged = PredictionTable::concat(parts)?;
    Ok(merged.reindex(features.sample_ids())?)
}
