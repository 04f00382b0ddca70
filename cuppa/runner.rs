//! # Prediction Run
//!
//! Drives one run end to end: load and reconcile features, check that the
//! batch can be named, predict (reusing cross-validation rows where
//! available), narrow to the requested classifier group, summarize, build the
//! visualization dataset, then write every artifact and render the plot.
//!
//! Stages run in a fixed order and any failure ends the run. Artifacts that
//! were already written are left in place.

use log::info;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::classifier::{Classifier, ClassifierError, CuppaClassifier};
use crate::config::{ConfigError, RunnerConfig};
use crate::cv::CvError;
use crate::features::{FeatureError, FeatureLoader, FeaturesFormat, LegacyFeatureLoader};
use crate::merge::{PredictionError, merge_predictions};
use crate::plot::{CommandPlotter, PlotError, Plotter, SkipPlotter};
use crate::summary::PredSummary;
use crate::tsv::OutputError;
use crate::types::{FeatureMatrix, PredictionTable};
use crate::vis::{VisData, VisDataBuilder, VisError};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Features(#[from] FeatureError),
    #[error(transparent)]
    CrossValidation(#[from] CvError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    Vis(#[from] VisError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error(transparent)]
    Plot(#[from] PlotError),
    #[error("failed to create output directory '{path}': {source}")]
    OutputDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Owns one run's configuration and everything derived from it.
pub struct PredictionRunner {
    config: RunnerConfig,
    classifier: OnceLock<Arc<dyn Classifier>>,
    plotter: Option<Box<dyn Plotter>>,
    features: Option<FeatureMatrix>,
    predictions: Option<PredictionTable>,
    pred_summ: Option<PredSummary>,
    vis_data: Option<VisData>,
}

impl PredictionRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            classifier: OnceLock::new(),
            plotter: None,
            features: None,
            predictions: None,
            pred_summ: None,
            vis_data: None,
        }
    }

    /// Uses an already loaded classifier instead of reading `classifier_path`.
    pub fn with_classifier(self, classifier: Arc<dyn Classifier>) -> Self {
        // Only the first classifier handed in is kept.
        let _ = self.classifier.set(classifier);
        self
    }

    /// Overrides the plotter derived from `plot_command`.
    pub fn with_plotter(mut self, plotter: Box<dyn Plotter>) -> Self {
        self.plotter = Some(plotter);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// The classifier, loaded from `classifier_path` on first use.
    pub fn classifier(&self) -> Result<Arc<dyn Classifier>, ClassifierError> {
        if let Some(classifier) = self.classifier.get() {
            return Ok(Arc::clone(classifier));
        }
        let loaded: Arc<dyn Classifier> = Arc::new(CuppaClassifier::from_file(&self.config.classifier_path)?);
        Ok(Arc::clone(self.classifier.get_or_init(|| loaded)))
    }

    pub fn features(&self) -> Option<&FeatureMatrix> {
        self.features.as_ref()
    }

    pub fn predictions(&self) -> Option<&PredictionTable> {
        self.predictions.as_ref()
    }

    pub fn pred_summ(&self) -> Option<&PredSummary> {
        self.pred_summ.as_ref()
    }

    pub fn vis_data(&self) -> Option<&VisData> {
        self.vis_data.as_ref()
    }

    fn load_features(&self, classifier: &dyn Classifier) -> Result<FeatureMatrix, RunnerError> {
        let raw = match self.config.features_format {
            FeaturesFormat::Current => FeatureLoader::new(
                &self.config.features_path,
                self.config.sample_id.clone(),
                &self.config.excl_chroms,
            )
            .load()?,
            FeaturesFormat::Legacy => LegacyFeatureLoader::new(
                &self.config.features_path,
                self.config.genome_version,
                &self.config.excl_chroms,
            )
            .load()?,
        };
        Ok(classifier.fill_missing_cols(raw)?)
    }

    fn check_cardinality(&self, features: &FeatureMatrix) -> Result<(), ConfigError> {
        let n_samples = features.n_samples();
        if n_samples == 0 {
            return Err(ConfigError::NoSamples);
        }
        if self.config.sample_id.is_none() && n_samples > 1 {
            return Err(ConfigError::MissingSampleId { n_samples });
        }
        Ok(())
    }

    fn get_predictions(
        &self,
        classifier: &dyn Classifier,
        features: &FeatureMatrix,
    ) -> Result<PredictionTable, RunnerError> {
        let cv_predictions = self.config.cv_source.as_ref().map(|source| source.load()).transpose()?;

        let merged = merge_predictions(classifier, features, cv_predictions.as_ref())?;
        let filtered = self.config.clf_group.apply(classifier, merged);

        let expected = self.config.clf_group.expected_columns(classifier);
        if filtered.columns() != expected.as_slice() {
            return Err(PredictionError::ColumnMismatch {
                expected: expected.len(),
                found: filtered.columns().len(),
            }
            .into());
        }
        info!(
            "Kept {} prediction columns for classifier group '{}'",
            filtered.columns().len(),
            self.config.clf_group
        );
        Ok(filtered)
    }

    fn ensure_output_dir(&self) -> Result<(), RunnerError> {
        let dir = &self.config.output_dir;
        if !dir.is_dir() {
            info!("Creating output directory: {}", dir.display());
            fs::create_dir_all(dir).map_err(|source| RunnerError::OutputDir {
                path: dir.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    fn plot(&self, vis_data_path: &Path) -> Result<(), RunnerError> {
        let plot_path = self.config.plot_path();
        match (&self.plotter, &self.config.plot_command) {
            (Some(plotter), _) => plotter.plot_from_tsv(vis_data_path, &plot_path)?,
            (None, Some(command)) => {
                CommandPlotter::from_command_line(command)?.plot_from_tsv(vis_data_path, &plot_path)?
            }
            (None, None) => SkipPlotter.plot_from_tsv(vis_data_path, &plot_path)?,
        }
        Ok(())
    }

    /// Executes every stage of the run.
    pub fn run(&mut self) -> Result<(), RunnerError> {
        let classifier = self.classifier()?;

        let features = self.load_features(classifier.as_ref())?;
        self.check_cardinality(&features)?;

        let predictions = self.get_predictions(classifier.as_ref(), &features)?;
        self.features = Some(features);

        let pred_summ = PredSummary::from_predictions(&predictions, true, true);
        let vis_data = VisDataBuilder::new(
            &predictions,
            self.config.sample_id.as_deref(),
            classifier.cv_performance(),
        )
        .build()?;

        self.ensure_output_dir()?;

        let pred_summ_path = self.config.pred_summ_path();
        pred_summ.to_tsv(&pred_summ_path)?;
        let vis_data_path = self.config.vis_data_path();
        vis_data.to_tsv(&vis_data_path)?;

        self.predictions = Some(predictions);
        self.pred_summ = Some(pred_summ);
        self.vis_data = Some(vis_data);

        self.plot(&vis_data_path)?;
        info!("Prediction run complete");
        Ok(())
    }
}
