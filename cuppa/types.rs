//! # Core Tables
//!
//! The two sample-keyed tables every stage of a run passes along: the
//! `FeatureMatrix` consumed by the classifier and the `PredictionTable` it
//! produces. Both keep rows in an explicit `sample_ids` order; all selection
//! and reordering goes through sample ids, never positional assumptions.

use ahash::{AHashMap, AHashSet};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Unique key naming a biological sample across features, predictions and outputs.
pub type SampleId = String;

/// The data modality a classifier output belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClfGroup {
    Dna,
    Rna,
    Combined,
}

impl ClfGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dna => "dna",
            Self::Rna => "rna",
            Self::Combined => "combined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dna" => Some(Self::Dna),
            "rna" => Some(Self::Rna),
            "combined" => Some(Self::Combined),
            _ => None,
        }
    }
}

impl fmt::Display for ClfGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One probability column: the probability that `clf_name` assigns to `cancer_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbColumn {
    pub clf_group: ClfGroup,
    pub clf_name: String,
    pub cancer_type: String,
}

impl ProbColumn {
    pub fn new(clf_group: ClfGroup, clf_name: impl Into<String>, cancer_type: impl Into<String>) -> Self {
        Self {
            clf_group,
            clf_name: clf_name.into(),
            cancer_type: cancer_type.into(),
        }
    }

    /// Combined classifiers aggregate the outputs of the individual sub-classifiers.
    pub fn is_combined(&self) -> bool {
        is_combined_clf(&self.clf_name)
    }
}

impl fmt::Display for ProbColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.clf_group, self.clf_name, self.cancer_type)
    }
}

pub fn is_combined_clf(clf_name: &str) -> bool {
    clf_name == "combined" || clf_name.ends_with("_combined")
}

/// Column indices belonging to one classifier, in table column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierColumns {
    pub clf_group: ClfGroup,
    pub clf_name: String,
    pub indices: Vec<usize>,
}

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("sample '{0}' is not present in the table")]
    MissingSample(String),
    #[error("sample '{0}' appears more than once")]
    DuplicateSample(String),
    #[error("column '{0}' is missing from the table")]
    MissingColumn(String),
    #[error("tables have incompatible column sets ({expected} columns expected, found {found})")]
    ColumnCountMismatch { expected: usize, found: usize },
    #[error("value matrix has shape {found:?} but {expected:?} was expected")]
    Shape {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

fn index_samples(sample_ids: &[SampleId]) -> Result<AHashMap<&str, usize>, TableError> {
    let mut index = AHashMap::with_capacity(sample_ids.len());
    for (row, id) in sample_ids.iter().enumerate() {
        if index.insert(id.as_str(), row).is_some() {
            return Err(TableError::DuplicateSample(id.clone()));
        }
    }
    Ok(index)
}

fn row_indices(sample_ids: &[SampleId], order: &[SampleId]) -> Result<Vec<usize>, TableError> {
    let index = index_samples(sample_ids)?;
    let mut seen = AHashSet::with_capacity(order.len());
    order
        .iter()
        .map(|id| {
            if !seen.insert(id.as_str()) {
                return Err(TableError::DuplicateSample(id.clone()));
            }
            index
                .get(id.as_str())
                .copied()
                .ok_or_else(|| TableError::MissingSample(id.clone()))
        })
        .collect()
}

/// Per-sample feature vectors. Shape: [n_samples, n_features].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    sample_ids: Vec<SampleId>,
    feature_names: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(
        sample_ids: Vec<SampleId>,
        feature_names: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, TableError> {
        let expected = (sample_ids.len(), feature_names.len());
        if values.dim() != expected {
            return Err(TableError::Shape {
                expected,
                found: values.dim(),
            });
        }
        index_samples(&sample_ids)?;
        Ok(Self {
            sample_ids,
            feature_names,
            values,
        })
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    pub fn sample_ids(&self) -> &[SampleId] {
        &self.sample_ids
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    pub fn row(&self, sample_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.sample_ids
            .iter()
            .position(|id| id == sample_id)
            .map(|row| self.values.row(row))
    }

    /// Sub-matrix with exactly the requested samples, in the requested order.
    pub fn select_samples(&self, order: &[SampleId]) -> Result<FeatureMatrix, TableError> {
        let rows = row_indices(&self.sample_ids, order)?;
        Ok(FeatureMatrix {
            sample_ids: order.to_vec(),
            feature_names: self.feature_names.clone(),
            values: self.values.select(Axis(0), &rows),
        })
    }
}

/// Per-sample class probabilities. Shape: [n_samples, n_columns].
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    sample_ids: Vec<SampleId>,
    columns: Vec<ProbColumn>,
    probs: Array2<f64>,
}

impl PredictionTable {
    pub fn new(
        sample_ids: Vec<SampleId>,
        columns: Vec<ProbColumn>,
        probs: Array2<f64>,
    ) -> Result<Self, TableError> {
        let expected = (sample_ids.len(), columns.len());
        if probs.dim() != expected {
            return Err(TableError::Shape {
                expected,
                found: probs.dim(),
            });
        }
        index_samples(&sample_ids)?;
        Ok(Self {
            sample_ids,
            columns,
            probs,
        })
    }

    /// A table with the given columns and no rows.
    pub fn empty(columns: Vec<ProbColumn>) -> Self {
        let n_cols = columns.len();
        Self {
            sample_ids: Vec::new(),
            columns,
            probs: Array2::zeros((0, n_cols)),
        }
    }

    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    pub fn sample_ids(&self) -> &[SampleId] {
        &self.sample_ids
    }

    pub fn sample_id_set(&self) -> AHashSet<&str> {
        self.sample_ids.iter().map(String::as_str).collect()
    }

    pub fn columns(&self) -> &[ProbColumn] {
        &self.columns
    }

    pub fn probs(&self) -> &Array2<f64> {
        &self.probs
    }

    pub fn row_of(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Groups the column indices by classifier, in first-appearance order.
    pub fn classifier_columns(&self) -> Vec<ClassifierColumns> {
        let mut groups: Vec<ClassifierColumns> = Vec::new();
        for (idx, column) in self.columns.iter().enumerate() {
            match groups
                .iter_mut()
                .find(|g| g.clf_name == column.clf_name && g.clf_group == column.clf_group)
            {
                Some(group) => group.indices.push(idx),
                None => groups.push(ClassifierColumns {
                    clf_group: column.clf_group,
                    clf_name: column.clf_name.clone(),
                    indices: vec![idx],
                }),
            }
        }
        groups
    }

    /// Rows for exactly the requested samples, in the requested order.
    pub fn select_samples(&self, order: &[SampleId]) -> Result<PredictionTable, TableError> {
        let rows = row_indices(&self.sample_ids, order)?;
        Ok(PredictionTable {
            sample_ids: order.to_vec(),
            columns: self.columns.clone(),
            probs: self.probs.select(Axis(0), &rows),
        })
    }

    /// Restores the given sample order. Every sample of the table must be listed.
    pub fn reindex(&self, order: &[SampleId]) -> Result<PredictionTable, TableError> {
        if order.len() != self.sample_ids.len() {
            let listed: AHashSet<&str> = order.iter().map(String::as_str).collect();
            if let Some(unlisted) = self.sample_ids.iter().find(|id| !listed.contains(id.as_str())) {
                return Err(TableError::MissingSample(unlisted.clone()));
            }
        }
        self.select_samples(order)
    }

    /// Keeps only the columns accepted by `keep`, preserving column order.
    pub fn retain_columns<F>(&self, keep: F) -> PredictionTable
    where
        F: Fn(&ProbColumn) -> bool,
    {
        let indices: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| keep(c))
            .map(|(i, _)| i)
            .collect();
        PredictionTable {
            sample_ids: self.sample_ids.clone(),
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            probs: self.probs.select(Axis(1), &indices),
        }
    }

    /// Reorders columns to `columns`. The column sets must match exactly.
    pub fn align_columns(&self, columns: &[ProbColumn]) -> Result<PredictionTable, TableError> {
        if columns.len() != self.columns.len() {
            return Err(TableError::ColumnCountMismatch {
                expected: columns.len(),
                found: self.columns.len(),
            });
        }
        let position: AHashMap<&ProbColumn, usize> =
            self.columns.iter().enumerate().map(|(i, c)| (c, i)).collect();
        let indices = columns
            .iter()
            .map(|c| {
                position
                    .get(c)
                    .copied()
                    .ok_or_else(|| TableError::MissingColumn(c.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PredictionTable {
            sample_ids: self.sample_ids.clone(),
            columns: columns.to_vec(),
            probs: self.probs.select(Axis(1), &indices),
        })
    }

    /// Stacks tables row-wise. Columns follow the first table; the others are
    /// aligned to it. Sample ids must be unique across all parts.
    pub fn concat(parts: Vec<PredictionTable>) -> Result<PredictionTable, TableError> {
        let mut parts = parts.into_iter();
        let Some(first) = parts.next() else {
            return Ok(PredictionTable::empty(Vec::new()));
        };

        let mut sample_ids = first.sample_ids;
        let columns = first.columns;
        let mut blocks = vec![first.probs];
        for part in parts {
            let aligned = part.align_columns(&columns)?;
            sample_ids.extend(aligned.sample_ids);
            blocks.push(aligned.probs);
        }

        let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
        let probs = ndarray::concatenate(Axis(0), &views).map_err(|_| TableError::Shape {
            expected: (sample_ids.len(), columns.len()),
            found: (blocks.iter().map(|b| b.nrows()).sum(), columns.len()),
        })?;
        PredictionTable::new(sample_ids, columns, probs)
    }
}
