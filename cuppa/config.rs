//! Run configuration and output path derivation.

use std::path::PathBuf;
use thiserror::Error;

use crate::cv::CvSource;
use crate::features::{FeaturesFormat, GenomeVersion};
use crate::filter::ClassifierGroup;
use crate::types::SampleId;

pub const DEFAULT_EXCL_CHROMS: [&str; 2] = ["ChrY", "Y"];
pub const DEFAULT_LOG_FILENAME: &str = "predict.log";

pub const PRED_SUMM_FILENAME: &str = "cuppa.pred_summ.tsv";
pub const VIS_DATA_FILENAME: &str = "cuppa.vis_data.tsv";
pub const PLOT_FILENAME: &str = "cuppa.vis.png";

/// Invalid run configuration. Raised before any artifact is written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("classifier group must be 'all' or 'dna' (found '{0}')")]
    InvalidClassifierGroup(String),
    #[error("genome version must be 37 or 38 (found {0})")]
    InvalidGenomeVersion(u32),
    #[error("a sample id must be provided when predicting on more than one sample ({n_samples} samples found)")]
    MissingSampleId { n_samples: usize },
    #[error("the feature matrix contains no samples")]
    NoSamples,
}

/// Everything a single prediction run needs to know.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub classifier_path: PathBuf,
    pub features_path: PathBuf,
    pub output_dir: PathBuf,
    pub sample_id: Option<SampleId>,
    pub compress_tsv_files: bool,
    pub features_format: FeaturesFormat,
    pub genome_version: GenomeVersion,
    pub excl_chroms: Vec<String>,
    pub cv_source: Option<CvSource>,
    pub clf_group: ClassifierGroup,
    /// External renderer for the vis plot. No plot is drawn when unset.
    pub plot_command: Option<String>,
    pub log_to_file: bool,
    pub log_path: Option<PathBuf>,
}

impl RunnerConfig {
    pub fn new(
        classifier_path: impl Into<PathBuf>,
        features_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            classifier_path: classifier_path.into(),
            features_path: features_path.into(),
            output_dir: output_dir.into(),
            sample_id: None,
            compress_tsv_files: false,
            features_format: FeaturesFormat::Current,
            genome_version: GenomeVersion::V37,
            excl_chroms: DEFAULT_EXCL_CHROMS.iter().map(|s| s.to_string()).collect(),
            cv_source: None,
            clf_group: ClassifierGroup::All,
            plot_command: None,
            log_to_file: false,
            log_path: None,
        }
    }

    /// Prefixes the sample id and appends `.gz` to tsv files when compression is on.
    pub fn add_filename_affixes(&self, filename: &str) -> String {
        let mut name = match &self.sample_id {
            Some(sample_id) => format!("{sample_id}.{filename}"),
            None => filename.to_string(),
        };
        if self.compress_tsv_files && name.ends_with(".tsv") {
            name.push_str(".gz");
        }
        name
    }

    pub fn pred_summ_path(&self) -> PathBuf {
        self.output_path(PRED_SUMM_FILENAME)
    }

    pub fn vis_data_path(&self) -> PathBuf {
        self.output_path(VIS_DATA_FILENAME)
    }

    pub fn plot_path(&self) -> PathBuf {
        self.output_path(PLOT_FILENAME)
    }

    fn output_path(&self, filename: &str) -> PathBuf {
        self.output_dir.join(self.add_filename_affixes(filename))
    }

    /// Where the log should go, if anywhere other than stderr.
    pub fn resolved_log_path(&self) -> Option<PathBuf> {
        match (&self.log_path, self.log_to_file) {
            (Some(path), _) => Some(path.clone()),
            (None, true) => Some(self.output_dir.join(DEFAULT_LOG_FILENAME)),
            (None, false) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_summary_path_carries_sample_prefix() {
        let mut config = RunnerConfig::new("clf.toml", "features.tsv", "/out");
        config.sample_id = Some("SAMPLE01".to_string());
        config.compress_tsv_files = true;

        let path = config.pred_summ_path();
        assert!(path.ends_with("SAMPLE01.cuppa.pred_summ.tsv.gz"));
        assert_eq!(path, PathBuf::from("/out/SAMPLE01.cuppa.pred_summ.tsv.gz"));
    }

    #[test]
    fn plot_is_never_gzipped() {
        let mut config = RunnerConfig::new("clf.toml", "features.tsv", "/out");
        config.compress_tsv_files = true;
        assert_eq!(config.plot_path(), PathBuf::from("/out/cuppa.vis.png"));
        assert_eq!(config.vis_data_path(), PathBuf::from("/out/cuppa.vis_data.tsv.gz"));
    }

    #[test]
    fn anonymous_run_has_no_prefix() {
        let config = RunnerConfig::new("clf.toml", "features.tsv", "out");
        assert_eq!(config.add_filename_affixes(VIS_DATA_FILENAME), "cuppa.vis_data.tsv");
    }

    #[test]
    fn log_file_defaults_to_output_dir() {
        let mut config = RunnerConfig::new("clf.toml", "features.tsv", "out");
        assert_eq!(config.resolved_log_path(), None);
        config.log_to_file = true;
        assert_eq!(config.resolved_log_path(), Some(PathBuf::from("out/predict.log")));
    }
}
