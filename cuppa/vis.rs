//! Long-format dataset consumed by the plot renderer.

use log::{debug, info};
use natord::compare;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::classifier::CvPerformance;
use crate::tsv::{OutputError, create_tsv_writer, finish_tsv_writer};
use crate::types::{ClfGroup, PredictionTable, SampleId};

#[derive(Debug, Error, PartialEq)]
pub enum VisError {
    #[error("sample '{0}' has no predictions to visualize")]
    MissingSample(String),
    #[error("no sample id was given and the predictions contain {0} samples")]
    AmbiguousSample(usize),
    #[error("there are no predictions to visualize")]
    NoPredictions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Prob,
    Recall,
    Precision,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prob => "prob",
            Self::Recall => "recall",
            Self::Precision => "precision",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisRow {
    pub sample_id: SampleId,
    pub data_type: DataType,
    pub clf_group: ClfGroup,
    pub clf_name: String,
    pub cancer_type: String,
    pub data_value: f64,
    /// Position of the class within its classifier, 1 = most probable. Only
    /// set on `prob` rows.
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisData {
    rows: Vec<VisRow>,
}

impl VisData {
    pub fn rows(&self) -> &[VisRow] {
        &self.rows
    }

    pub fn sample_id(&self) -> Option<&str> {
        self.rows.first().map(|r| r.sample_id.as_str())
    }

    pub fn to_tsv(&self, path: &Path) -> Result<(), OutputError> {
        let mut writer = create_tsv_writer(path)?;
        writer
            .write_record([
                "sample_id",
                "data_type",
                "clf_group",
                "clf_name",
                "cancer_type",
                "data_value",
                "rank",
            ])
            .map_err(|e| OutputError::csv(path, e))?;

        for row in &self.rows {
            let value = format!("{:.4}", row.data_value);
            let rank = row.rank.map(|r| r.to_string()).unwrap_or_default();
            writer
                .write_record([
                    row.sample_id.as_str(),
                    row.data_type.as_str(),
                    row.clf_group.as_str(),
                    row.clf_name.as_str(),
                    row.cancer_type.as_str(),
                    value.as_str(),
                    rank.as_str(),
                ])
                .map_err(|e| OutputError::csv(path, e))?;
        }

        finish_tsv_writer(writer, path)?;
        info!("Wrote visualization data to: {}", path.display());
        Ok(())
    }
}

pub struct VisDataBuilder<'a> {
    predictions: &'a PredictionTable,
    sample_id: Option<&'a str>,
    cv_performance: &'a [CvPerformance],
}

impl<'a> VisDataBuilder<'a> {
    pub fn new(
        predictions: &'a PredictionTable,
        sample_id: Option<&'a str>,
        cv_performance: &'a [CvPerformance],
    ) -> Self {
        Self {
            predictions,
            sample_id,
            cv_performance,
        }
    }

    fn select_row(&self) -> Result<usize, VisError> {
        match self.sample_id {
            Some(id) => self
                .predictions
                .row_of(id)
                .ok_or_else(|| VisError::MissingSample(id.to_string())),
            None => match self.predictions.len() {
                0 => Err(VisError::NoPredictions),
                1 => Ok(0),
                n => Err(VisError::AmbiguousSample(n)),
            },
        }
    }

    pub fn build(&self) -> Result<VisData, VisError> {
        let row = self.select_row()?;
        let sample_id = &self.predictions.sample_ids()[row];
        let probs = self.predictions.probs().row(row);
        let groups = self.predictions.classifier_columns();

        let mut rows = Vec::new();
        for group in &groups {
            let mut ranked: Vec<usize> = group.indices.clone();
            ranked.sort_by(|&a, &b| {
                probs[b].partial_cmp(&probs[a]).unwrap_or(Ordering::Equal).then_with(|| {
                    compare(
                        &self.predictions.columns()[a].cancer_type,
                        &self.predictions.columns()[b].cancer_type,
                    )
                })
            });
            for (rank, &i) in ranked.iter().enumerate() {
                let column = &self.predictions.columns()[i];
                rows.push(VisRow {
                    sample_id: sample_id.clone(),
                    data_type: DataType::Prob,
                    clf_group: column.clf_group,
                    clf_name: column.clf_name.clone(),
                    cancer_type: column.cancer_type.clone(),
                    data_value: probs[i],
                    rank: Some(rank + 1),
                });
            }
        }

        let mut n_perf = 0usize;
        for data_type in [DataType::Recall, DataType::Precision] {
            for perf in self.cv_performance {
                let Some(group) = groups.iter().find(|g| g.clf_name == perf.clf_name) else {
                    continue;
                };
                rows.push(VisRow {
                    sample_id: sample_id.clone(),
                    data_type,
                    clf_group: group.clf_group,
                    clf_name: perf.clf_name.clone(),
                    cancer_type: perf.cancer_type.clone(),
                    data_value: match data_type {
                        DataType::Recall => perf.recall,
                        _ => perf.precision,
                    },
                    rank: None,
                });
                n_perf += 1;
            }
        }
        debug!("Visualization data for {sample_id}: {} rows, {n_perf} from cross-validation performance", rows.len());

        Ok(VisData { rows })
    }
}
