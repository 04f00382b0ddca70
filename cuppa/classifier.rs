//! # The CUPPA Classifier
//!
//! A set of multinomial logistic sub-classifiers, one per feature family
//! (`gen_pos`, `snv96`, `event`, `gene_exp`, ...). Each sub-classifier sees only
//! the features whose names start with its prefix. Their probabilities are
//! merged into combined classifiers per data modality (`dna_combined`,
//! `rna_combined`) and overall (`combined`).
//!
//! The persisted form is a human-readable TOML file. Loading validates every
//! coefficient shape against the declared schema so that inference itself
//! cannot go out of bounds.

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Zip};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

use crate::types::{ClfGroup, FeatureMatrix, PredictionTable, ProbColumn, TableError};

pub const COMBINED_CLF_NAME: &str = "combined";
pub const DNA_COMBINED_CLF_NAME: &str = "dna_combined";
pub const RNA_COMBINED_CLF_NAME: &str = "rna_combined";

/// Floor applied to probabilities before taking logs in the combined classifiers.
const MIN_PROB: f64 = 1e-12;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("failed to read or write classifier file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse classifier file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize classifier: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("classifier defines no cancer types")]
    NoCancerTypes,
    #[error("sub-classifier '{name}' selects no features (prefix '{prefix}')")]
    NoFeatures { name: String, prefix: String },
    #[error("sub-classifier '{name}' has {found} coefficient rows, expected one per cancer type ({expected})")]
    CoefficientRows {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("sub-classifier '{name}' has a coefficient row of length {found}, expected {expected} (one per selected feature)")]
    CoefficientCols {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("sub-classifier '{name}' has {found} intercepts, expected {expected}")]
    Intercepts {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("sub-classifier name '{0}' is used more than once or is reserved")]
    DuplicateClassifier(String),
    #[error(
        "feature matrix columns do not match the classifier schema ({found} columns, {expected} expected); missing columns must be filled first"
    )]
    SchemaMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// The prediction interface the run depends on.
pub trait Classifier: Send + Sync {
    /// Class probabilities for every sample of `features`, in the same row order.
    fn predict(&self, features: &FeatureMatrix) -> Result<PredictionTable, ClassifierError>;

    /// Reconciles `features` with the classifier's schema.
    fn fill_missing_cols(&self, features: FeatureMatrix) -> Result<FeatureMatrix, ClassifierError>;

    /// Every column `predict` produces, in order.
    fn output_columns(&self) -> &[ProbColumn];

    /// The DNA-derived subset of `predictions`.
    fn subset_dna(&self, predictions: &PredictionTable) -> PredictionTable;

    /// Historical cross-validation performance of each classifier.
    fn cv_performance(&self) -> &[CvPerformance];
}

/// Cross-validation performance of one classifier on one cancer type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvPerformance {
    pub clf_name: String,
    pub cancer_type: String,
    pub n_total: usize,
    pub n_correct: usize,
    pub recall: f64,
    pub precision: f64,
}

/// One multinomial logistic model over a feature family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubClassifier {
    pub name: String,
    pub group: ClfGroup,
    pub feature_prefix: String,
    /// Shape: [n_cancer_types][n_selected_features].
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

/// The on-disk representation of a trained classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSpec {
    /// Canonical feature order. Feature matrices are reordered to it before prediction.
    pub feature_names: Vec<String>,
    pub cancer_types: Vec<String>,
    pub sub_classifiers: Vec<SubClassifier>,
    #[serde(default)]
    pub cv_performance: Vec<CvPerformance>,
}

/// A sub-classifier prepared for inference.
#[derive(Debug, Clone)]
struct CompiledSubClassifier {
    feature_indices: Vec<usize>,
    coefficients: Array2<f64>,
    intercepts: Array1<f64>,
}

#[derive(Debug, Clone)]
struct CombinedClassifier {
    name: &'static str,
    group: ClfGroup,
    members: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct CuppaClassifier {
    spec: ClassifierSpec,
    compiled: Vec<CompiledSubClassifier>,
    combined: Vec<CombinedClassifier>,
    output_columns: Vec<ProbColumn>,
}

impl CuppaClassifier {
    /// Validates `spec` and prepares it for inference.
    pub fn new(spec: ClassifierSpec) -> Result<Self, ClassifierError> {
        let n_classes = spec.cancer_types.len();
        if n_classes == 0 {
            return Err(ClassifierError::NoCancerTypes);
        }

        let mut seen_names: HashSet<&str> =
            [COMBINED_CLF_NAME, DNA_COMBINED_CLF_NAME, RNA_COMBINED_CLF_NAME].into_iter().collect();
        let mut compiled = Vec::with_capacity(spec.sub_classifiers.len());
        for sub in &spec.sub_classifiers {
            if !seen_names.insert(sub.name.as_str()) {
                return Err(ClassifierError::DuplicateClassifier(sub.name.clone()));
            }
            compiled.push(compile(sub, &spec.feature_names, n_classes)?);
        }

        let combined = combined_classifiers(&spec.sub_classifiers);

        let mut output_columns = Vec::new();
        for clf in &combined {
            for cancer_type in &spec.cancer_types {
                output_columns.push(ProbColumn::new(clf.group, clf.name, cancer_type.as_str()));
            }
        }
        for sub in &spec.sub_classifiers {
            for cancer_type in &spec.cancer_types {
                output_columns.push(ProbColumn::new(sub.group, sub.name.as_str(), cancer_type.as_str()));
            }
        }

        Ok(Self {
            spec,
            compiled,
            combined,
            output_columns,
        })
    }

    /// Loads a trained classifier from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ClassifierError> {
        info!("Loading classifier from: {}", path.display());
        let toml_string = fs::read_to_string(path)?;
        let spec: ClassifierSpec = toml::from_str(&toml_string)?;
        let classifier = Self::new(spec)?;
        info!(
            "Loaded classifier with {} sub-classifiers, {} cancer types and {} features",
            classifier.spec.sub_classifiers.len(),
            classifier.spec.cancer_types.len(),
            classifier.spec.feature_names.len()
        );
        Ok(classifier)
    }

    /// Saves the classifier to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        let toml_string = toml::to_string_pretty(&self.spec)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn spec(&self) -> &ClassifierSpec {
        &self.spec
    }

    pub fn cancer_types(&self) -> &[String] {
        &self.spec.cancer_types
    }

    pub fn feature_names(&self) -> &[String] {
        &self.spec.feature_names
    }

    /// Probabilities for one sample, laid out as `output_columns`.
    fn predict_row(&self, x: ArrayView1<f64>, mut out: ArrayViewMut1<f64>) {
        let n_classes = self.spec.cancer_types.len();
        let offset = self.combined.len() * n_classes;

        let sub_probs: Vec<Array1<f64>> = self
            .compiled
            .iter()
            .map(|sub| {
                let selected = Array1::from_iter(sub.feature_indices.iter().map(|&j| x[j]));
                let mut logits = sub.coefficients.dot(&selected);
                logits += &sub.intercepts;
                softmax(logits)
            })
            .collect();

        for (i, clf) in self.combined.iter().enumerate() {
            let mut log_mean = Array1::<f64>::zeros(n_classes);
            for &member in &clf.members {
                log_mean += &sub_probs[member].mapv(|p| p.max(MIN_PROB).ln());
            }
            log_mean /= clf.members.len() as f64;
            out.slice_mut(ndarray::s![i * n_classes..(i + 1) * n_classes])
                .assign(&softmax(log_mean));
        }

        for (i, probs) in sub_probs.iter().enumerate() {
            let start = offset + i * n_classes;
            out.slice_mut(ndarray::s![start..start + n_classes]).assign(probs);
        }
    }
}

impl Classifier for CuppaClassifier {
    fn predict(&self, features: &FeatureMatrix) -> Result<PredictionTable, ClassifierError> {
        if features.feature_names() != self.spec.feature_names.as_slice() {
            return Err(ClassifierError::SchemaMismatch {
                expected: self.spec.feature_names.len(),
                found: features.feature_names().len(),
            });
        }

        let mut probs = Array2::<f64>::zeros((features.n_samples(), self.output_columns.len()));
        Zip::from(probs.rows_mut())
            .and(features.values().rows())
            .par_for_each(|out, x| self.predict_row(x, out));

        Ok(PredictionTable::new(
            features.sample_ids().to_vec(),
            self.output_columns.clone(),
            probs,
        )?)
    }

    fn fill_missing_cols(&self, features: FeatureMatrix) -> Result<FeatureMatrix, ClassifierError> {
        if features.feature_names() == self.spec.feature_names.as_slice() {
            return Ok(features);
        }

        let n_samples = features.n_samples();
        let mut values = Array2::<f64>::zeros((n_samples, self.spec.feature_names.len()));
        let mut n_missing = 0usize;
        for (j, name) in self.spec.feature_names.iter().enumerate() {
            match features.column_index(name) {
                Some(src) => values.column_mut(j).assign(&features.values().column(src)),
                None => n_missing += 1,
            }
        }
        let n_dropped = features.feature_names().len() + n_missing - self.spec.feature_names.len();

        if n_missing > 0 {
            info!("Filled {n_missing} missing feature columns with 0");
        }
        if n_dropped > 0 {
            debug!("Dropped {n_dropped} feature columns unknown to the classifier");
        }

        Ok(FeatureMatrix::new(
            features.sample_ids().to_vec(),
            self.spec.feature_names.clone(),
            values,
        )?)
    }

    fn output_columns(&self) -> &[ProbColumn] {
        &self.output_columns
    }

    fn subset_dna(&self, predictions: &PredictionTable) -> PredictionTable {
        predictions.retain_columns(|c| c.clf_group == ClfGroup::Dna)
    }

    fn cv_performance(&self) -> &[CvPerformance] {
        &self.spec.cv_performance
    }
}

fn compile(
    sub: &SubClassifier,
    feature_names: &[String],
    n_classes: usize,
) -> Result<CompiledSubClassifier, ClassifierError> {
    let feature_indices: Vec<usize> = feature_names
        .iter()
        .enumerate()
        .filter(|(_, name)| name.starts_with(&sub.feature_prefix))
        .map(|(j, _)| j)
        .collect();
    if feature_indices.is_empty() {
        return Err(ClassifierError::NoFeatures {
            name: sub.name.clone(),
            prefix: sub.feature_prefix.clone(),
        });
    }

    if sub.coefficients.len() != n_classes {
        return Err(ClassifierError::CoefficientRows {
            name: sub.name.clone(),
            expected: n_classes,
            found: sub.coefficients.len(),
        });
    }
    if sub.intercepts.len() != n_classes {
        return Err(ClassifierError::Intercepts {
            name: sub.name.clone(),
            expected: n_classes,
            found: sub.intercepts.len(),
        });
    }

    let n_features = feature_indices.len();
    let mut flat = Vec::with_capacity(n_classes * n_features);
    for row in &sub.coefficients {
        if row.len() != n_features {
            return Err(ClassifierError::CoefficientCols {
                name: sub.name.clone(),
                expected: n_features,
                found: row.len(),
            });
        }
        flat.extend_from_slice(row);
    }

    let coefficients = Array2::from_shape_vec((n_classes, n_features), flat).map_err(|_| {
        ClassifierError::CoefficientCols {
            name: sub.name.clone(),
            expected: n_features,
            found: 0,
        }
    })?;

    Ok(CompiledSubClassifier {
        feature_indices,
        coefficients,
        intercepts: Array1::from_vec(sub.intercepts.clone()),
    })
}

/// Combined classifiers with at least one member, overall first.
fn combined_classifiers(subs: &[SubClassifier]) -> Vec<CombinedClassifier> {
    let members_of = |group: Option<ClfGroup>| -> Vec<usize> {
        subs.iter()
            .enumerate()
            .filter(|(_, s)| group.is_none_or(|g| s.group == g))
            .map(|(i, _)| i)
            .collect()
    };

    [
        (COMBINED_CLF_NAME, ClfGroup::Combined, members_of(None)),
        (DNA_COMBINED_CLF_NAME, ClfGroup::Dna, members_of(Some(ClfGroup::Dna))),
        (RNA_COMBINED_CLF_NAME, ClfGroup::Rna, members_of(Some(ClfGroup::Rna))),
    ]
    .into_iter()
    .filter(|(_, _, members)| !members.is_empty())
    .map(|(name, group, members)| CombinedClassifier { name, group, members })
    .collect()
}

/// Numerically stable softmax.
fn softmax(mut logits: Array1<f64>) -> Array1<f64> {
    let max = logits.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    logits.mapv_inplace(|z| (z - max).exp());
    let total = logits.sum();
    logits /= total;
    logits
}
