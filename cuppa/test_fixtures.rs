//! Small trained classifier and feature matrices shared by unit tests.

use ndarray::Array2;

use crate::classifier::{ClassifierSpec, CuppaClassifier, CvPerformance, SubClassifier};
use crate::types::{ClfGroup, FeatureMatrix};

pub const FIXTURE_FEATURES: [&str; 6] = [
    "gen_pos.1_500000",
    "gen_pos.2_1000000",
    "snv96.C>A_ACA",
    "snv96.C>T_ACG",
    "gene_exp.TP53",
    "gene_exp.KRAS",
];

pub const FIXTURE_CANCER_TYPES: [&str; 3] = ["Breast", "Lung", "Skin"];

fn sub(name: &str, group: ClfGroup, coefficients: [[f64; 2]; 3]) -> SubClassifier {
    SubClassifier {
        name: name.to_string(),
        group,
        feature_prefix: format!("{name}."),
        coefficients: coefficients.iter().map(|row| row.to_vec()).collect(),
        intercepts: vec![0.0; 3],
    }
}

fn performance(clf_name: &str, cancer_type: &str, n_total: usize, n_correct: usize, precision: f64) -> CvPerformance {
    CvPerformance {
        clf_name: clf_name.to_string(),
        cancer_type: cancer_type.to_string(),
        n_total,
        n_correct,
        recall: n_correct as f64 / n_total as f64,
        precision,
    }
}

pub fn fixture_spec() -> ClassifierSpec {
    ClassifierSpec {
        feature_names: FIXTURE_FEATURES.iter().map(|s| s.to_string()).collect(),
        cancer_types: FIXTURE_CANCER_TYPES.iter().map(|s| s.to_string()).collect(),
        sub_classifiers: vec![
            sub("gen_pos", ClfGroup::Dna, [[2.0, 0.0], [0.0, 2.0], [-1.0, -1.0]]),
            sub("snv96", ClfGroup::Dna, [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            sub("gene_exp", ClfGroup::Rna, [[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]),
        ],
        cv_performance: vec![
            performance("combined", "Breast", 200, 180, 0.9),
            performance("combined", "Lung", 150, 120, 0.85),
            performance("combined", "Skin", 100, 95, 0.97),
            performance("gen_pos", "Breast", 200, 150, 0.7),
            performance("gene_exp", "Breast", 200, 170, 0.8),
        ],
    }
}

pub fn fixture_classifier() -> CuppaClassifier {
    CuppaClassifier::new(fixture_spec()).unwrap()
}

/// Features for known sample ids: S1 looks like Breast, S2 like Lung, S3 like
/// Skin. Other ids get an all-zero row.
pub fn fixture_features(sample_ids: &[&str]) -> FeatureMatrix {
    let rows: Vec<[f64; 6]> = sample_ids
        .iter()
        .map(|id| match *id {
            "S1" => [3.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            "S2" => [0.0, 3.0, 2.0, 0.0, 0.0, 1.0],
            "S3" => [0.0, 0.0, 0.0, 4.0, 0.0, 0.0],
            _ => [0.0; 6],
        })
        .collect();
    let values = Array2::from_shape_fn((rows.len(), 6), |(i, j)| rows[i][j]);
    FeatureMatrix::new(
        sample_ids.iter().map(|s| s.to_string()).collect(),
        FIXTURE_FEATURES.iter().map(|s| s.to_string()).collect(),
        values,
    )
    .unwrap()
}
