#![allow(dead_code)]

use flate2::read::MultiGzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Three cancer types, two DNA sub-classifiers and one RNA sub-classifier.
pub const CLASSIFIER_TOML: &str = r#"
feature_names = [
    "gen_pos.1_500000",
    "gen_pos.2_1000000",
    "snv96.C>A_ACA",
    "snv96.C>T_ACG",
    "gene_exp.TP53",
    "gene_exp.KRAS",
]
cancer_types = ["Breast", "Lung", "Skin"]

[[sub_classifiers]]
name = "gen_pos"
group = "dna"
feature_prefix = "gen_pos."
coefficients = [[2.0, 0.0], [0.0, 2.0], [-1.0, -1.0]]
intercepts = [0.0, 0.0, 0.0]

[[sub_classifiers]]
name = "snv96"
group = "dna"
feature_prefix = "snv96."
coefficients = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]
intercepts = [0.0, 0.0, 0.0]

[[sub_classifiers]]
name = "gene_exp"
group = "rna"
feature_prefix = "gene_exp."
coefficients = [[1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]
intercepts = [0.0, 0.0, 0.0]

[[cv_performance]]
clf_name = "combined"
cancer_type = "Breast"
n_total = 200
n_correct = 180
recall = 0.9
precision = 0.88

[[cv_performance]]
clf_name = "gene_exp"
cancer_type = "Breast"
n_total = 200
n_correct = 170
recall = 0.85
precision = 0.8
"#;

/// S1 looks like Breast, S2 like Lung. The Y bin is dropped at load time.
pub const TWO_SAMPLE_FEATURES: &str = "Source\tCategory\tKey\tS1\tS2\n\
DNA\tGEN_POS\t1_500000\t3\t0\n\
DNA\tGEN_POS\t2_1000000\t0\t3\n\
DNA\tGEN_POS\tY_100\t5\t5\n\
DNA\tSNV96\tC>A_ACA\t0\t2\n\
RNA\tGENE_EXP\tTP53\t1\t0\n\
RNA\tGENE_EXP\tKRAS\t0\t1\n";

pub const SINGLE_SAMPLE_FEATURES: &str = "Source\tCategory\tKey\tValue\n\
DNA\tGEN_POS\t1_500000\t3\n\
DNA\tSNV96\tC>T_ACG\t1\n\
RNA\tGENE_EXP\tTP53\t1\n";

pub const CLASSIFIER_NAMES: [&str; 6] = ["combined", "dna_combined", "rna_combined", "gen_pos", "snv96", "gene_exp"];

pub fn write_classifier(dir: &Path) -> PathBuf {
    let path = dir.join("cuppa_classifier.toml");
    fs::write(&path, CLASSIFIER_TOML).unwrap();
    path
}

pub fn write_features(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("features.tsv");
    fs::write(&path, content).unwrap();
    path
}

/// Pivoted cross-validation predictions giving `sample_id` a flat distribution
/// under every classifier.
pub fn write_flat_cv_predictions(dir: &Path, sample_id: &str) -> PathBuf {
    let path = dir.join("cv_predictions.tsv");
    let mut content = String::from("sample_id\tclf_group\tclf_name\tBreast\tLung\tSkin\n");
    for name in CLASSIFIER_NAMES {
        let group = match name {
            "combined" => "combined",
            "rna_combined" | "gene_exp" => "rna",
            _ => "dna",
        };
        content.push_str(&format!("{sample_id}\t{group}\t{name}\t0.25\t0.5\t0.25\n"));
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn read_text(path: &Path) -> String {
    let bytes = fs::read(path).unwrap();
    if path.extension().is_some_and(|ext| ext == "gz") {
        let mut text = String::new();
        MultiGzDecoder::new(bytes.as_slice()).read_to_string(&mut text).unwrap();
        text
    } else {
        String::from_utf8(bytes).unwrap()
    }
}
