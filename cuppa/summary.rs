use log::info;
use natord::compare;
use std::cmp::Ordering;
use std::path::Path;

use crate::tsv::{OutputError, create_tsv_writer, finish_tsv_writer};
use crate::types::{ClassifierColumns, ClfGroup, PredictionTable, SampleId, is_combined_clf};

/// Number of ranked classes reported per sample and classifier.
pub const N_TOP_CLASSES: usize = 3;

/// One sample's ranking under one classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub sample_id: SampleId,
    pub clf_group: ClfGroup,
    pub clf_name: String,
    /// Highest probability first. Shorter than `N_TOP_CLASSES` only when the
    /// classifier knows fewer classes.
    pub top_classes: Vec<(String, f64)>,
    pub extra_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredSummary {
    rows: Vec<SummaryRow>,
    show_extra_info: bool,
}

impl PredSummary {
    pub fn from_predictions(predictions: &PredictionTable, show_extra_info: bool, verbose: bool) -> Self {
        let groups = predictions.classifier_columns();
        let mut rows = Vec::with_capacity(predictions.len() * groups.len());

        for (row_idx, sample_id) in predictions.sample_ids().iter().enumerate() {
            for group in &groups {
                let top_classes = ranked_classes(predictions, row_idx, group)
                    .into_iter()
                    .take(N_TOP_CLASSES)
                    .collect::<Vec<_>>();

                let extra_info = if show_extra_info && is_combined_clf(&group.clf_name) {
                    top_classes
                        .first()
                        .map(|(top, _)| member_probabilities(predictions, row_idx, group, top, &groups))
                } else {
                    None
                };

                if verbose && group.clf_group == ClfGroup::Combined {
                    if let Some((top, prob)) = top_classes.first() {
                        info!("Sample {sample_id}: top prediction {top} ({prob:.3})");
                    }
                }

                rows.push(SummaryRow {
                    sample_id: sample_id.clone(),
                    clf_group: group.clf_group,
                    clf_name: group.clf_name.clone(),
                    top_classes,
                    extra_info,
                });
            }
        }

        Self { rows, show_extra_info }
    }

    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_tsv(&self, path: &Path) -> Result<(), OutputError> {
        let mut writer = create_tsv_writer(path)?;

        let mut header = vec!["sample_id".to_string(), "clf_group".to_string(), "clf_name".to_string()];
        for rank in 1..=N_TOP_CLASSES {
            header.push(format!("pred_class_{rank}"));
            header.push(format!("pred_prob_{rank}"));
        }
        if self.show_extra_info {
            header.push("extra_info".to_string());
        }
        writer.write_record(&header).map_err(|e| OutputError::csv(path, e))?;

        for row in &self.rows {
            let mut record = vec![row.sample_id.clone(), row.clf_group.to_string(), row.clf_name.clone()];
            for rank in 0..N_TOP_CLASSES {
                match row.top_classes.get(rank) {
                    Some((class, prob)) => {
                        record.push(class.clone());
                        record.push(format!("{prob:.4}"));
                    }
                    None => {
                        record.push(String::new());
                        record.push(String::new());
                    }
                }
            }
            if self.show_extra_info {
                record.push(row.extra_info.clone().unwrap_or_default());
            }
            writer.write_record(&record).map_err(|e| OutputError::csv(path, e))?;
        }

        finish_tsv_writer(writer, path)?;
        info!("Wrote prediction summary to: {}", path.display());
        Ok(())
    }
}

/// All classes of one classifier for one sample, most probable first. Equal
/// probabilities fall back to natural order of the class name.
fn ranked_classes(predictions: &PredictionTable, row: usize, group: &ClassifierColumns) -> Vec<(String, f64)> {
    let probs = predictions.probs().row(row);
    let mut ranked: Vec<(String, f64)> = group
        .indices
        .iter()
        .map(|&i| (predictions.columns()[i].cancer_type.clone(), probs[i]))
        .collect();
    ranked.sort_by(|(a_name, a), (b_name, b)| {
        b.partial_cmp(a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| compare(a_name, b_name))
    });
    ranked
}

/// `name=prob` for each individual classifier feeding `combined`, evaluated at
/// the combined classifier's top class.
fn member_probabilities(
    predictions: &PredictionTable,
    row: usize,
    combined: &ClassifierColumns,
    top_class: &str,
    groups: &[ClassifierColumns],
) -> String {
    let probs = predictions.probs().row(row);
    groups
        .iter()
        .filter(|g| !is_combined_clf(&g.clf_name))
        .filter(|g| combined.clf_group == ClfGroup::Combined || g.clf_group == combined.clf_group)
        .filter_map(|g| {
            g.indices
                .iter()
                .find(|&&i| predictions.columns()[i].cancer_type == top_class)
                .map(|&i| format!("{}={:.3}", g.clf_name, probs[i]))
        })
        .collect::<Vec<_>>()
        .join(";")
}
