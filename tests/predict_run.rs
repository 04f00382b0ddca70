mod common;

use std::fs;
use std::sync::Arc;

use cuppa::config::ConfigError;
use cuppa::cv::CvSource;
use cuppa::features::{FeaturesFormat, GenomeVersion};
use cuppa::types::{ClfGroup, PredictionTable};
use cuppa::{ClassifierGroup, Classifier, CuppaClassifier, PredictionRunner, RunnerConfig, RunnerError};
use tempfile::tempdir;

use common::*;

#[test]
fn single_sample_run_writes_summary_and_vis_data() {
    let tmp = tempdir().unwrap();
    let classifier_path = write_classifier(tmp.path());
    let features_path = write_features(tmp.path(), SINGLE_SAMPLE_FEATURES);
    let output_dir = tmp.path().join("nested").join("out");

    let mut config = RunnerConfig::new(&classifier_path, &features_path, &output_dir);
    config.sample_id = Some("TUMOR1".to_string());
    let mut runner = PredictionRunner::new(config);
    runner.run().unwrap();

    let summary = read_text(&output_dir.join("TUMOR1.cuppa.pred_summ.tsv"));
    let lines: Vec<&str> = summary.lines().collect();
    assert!(lines[0].starts_with("sample_id\tclf_group\tclf_name\tpred_class_1\tpred_prob_1"));
    assert_eq!(lines.len(), 1 + CLASSIFIER_NAMES.len());
    assert!(lines[1].starts_with("TUMOR1\tcombined\tcombined\tBreast\t"));

    let vis = read_text(&output_dir.join("TUMOR1.cuppa.vis_data.tsv"));
    assert!(vis.lines().skip(1).all(|l| l.starts_with("TUMOR1\t")));
    assert!(vis.contains("\trecall\tcombined\tcombined\tBreast\t0.9000\t"));
    assert!(vis.contains("\tprecision\trna\tgene_exp\tBreast\t0.8000\t"));

    // No renderer configured.
    assert!(!output_dir.join("TUMOR1.cuppa.vis.png").exists());
}

#[test]
fn anonymous_single_sample_has_unprefixed_outputs() {
    let tmp = tempdir().unwrap();
    let classifier_path = write_classifier(tmp.path());
    let features_path = write_features(tmp.path(), SINGLE_SAMPLE_FEATURES);
    let output_dir = tmp.path().join("out");

    let mut config = RunnerConfig::new(&classifier_path, &features_path, &output_dir);
    config.compress_tsv_files = true;
    PredictionRunner::new(config).run().unwrap();

    assert!(output_dir.join("cuppa.pred_summ.tsv.gz").is_file());
    let vis = read_text(&output_dir.join("cuppa.vis_data.tsv.gz"));
    assert!(vis.lines().nth(1).unwrap().starts_with("sample\tprob\t"));
}

#[test]
fn multi_sample_batch_without_sample_id_fails_before_writing() {
    let tmp = tempdir().unwrap();
    let classifier_path = write_classifier(tmp.path());
    let features_path = write_features(tmp.path(), TWO_SAMPLE_FEATURES);
    let output_dir = tmp.path().join("out");

    let mut runner = PredictionRunner::new(RunnerConfig::new(&classifier_path, &features_path, &output_dir));
    let err = runner.run().unwrap_err();

    assert!(matches!(
        err,
        RunnerError::Config(ConfigError::MissingSampleId { n_samples: 2 })
    ));
    assert!(!output_dir.exists());
}

#[test]
fn cross_validation_file_supplies_training_samples() {
    let tmp = tempdir().unwrap();
    let classifier_path = write_classifier(tmp.path());
    let features_path = write_features(tmp.path(), TWO_SAMPLE_FEATURES);
    let cv_path = write_flat_cv_predictions(tmp.path(), "S2");

    let mut config = RunnerConfig::new(&classifier_path, &features_path, tmp.path().join("out"));
    config.sample_id = Some("S2".to_string());
    config.cv_source = Some(CvSource::File(cv_path));
    let mut runner = PredictionRunner::new(config);
    runner.run().unwrap();

    let predictions = runner.predictions().unwrap();
    assert_eq!(predictions.sample_ids(), ["S1", "S2"].map(String::from).as_slice());
    for (j, column) in predictions.columns().iter().enumerate() {
        let expected = if column.cancer_type == "Lung" { 0.5 } else { 0.25 };
        assert_eq!(predictions.probs()[[1, j]], expected, "column {column}");
    }
    // S1 was predicted fresh.
    let breast = predictions
        .columns()
        .iter()
        .position(|c| c.clf_name == "gen_pos" && c.cancer_type == "Breast")
        .unwrap();
    assert!(predictions.probs()[[0, breast]] > 0.9);
}

#[test]
fn dna_group_keeps_only_dna_classifiers() {
    let tmp = tempdir().unwrap();
    let classifier_path = write_classifier(tmp.path());
    let features_path = write_features(tmp.path(), TWO_SAMPLE_FEATURES);
    let output_dir = tmp.path().join("out");

    let mut config = RunnerConfig::new(&classifier_path, &features_path, &output_dir);
    config.sample_id = Some("S1".to_string());
    config.clf_group = ClassifierGroup::Dna;
    let mut runner = PredictionRunner::new(config);
    runner.run().unwrap();

    let names: Vec<String> = runner
        .predictions()
        .unwrap()
        .classifier_columns()
        .into_iter()
        .map(|c| c.clf_name)
        .collect();
    assert_eq!(names, vec!["dna_combined", "gen_pos", "snv96"]);

    let summary = read_text(&output_dir.join("S1.cuppa.pred_summ.tsv"));
    assert!(summary.lines().skip(1).all(|l| l.split('\t').nth(1) == Some("dna")));
}

#[test]
fn shared_classifier_is_reused_across_runners() {
    let tmp = tempdir().unwrap();
    let classifier_path = write_classifier(tmp.path());
    let classifier: Arc<dyn Classifier> = Arc::new(CuppaClassifier::from_file(&classifier_path).unwrap());
    let features_path = write_features(tmp.path(), TWO_SAMPLE_FEATURES);

    for sample_id in ["S1", "S2"] {
        // The path is never read because the classifier is injected.
        let mut config = RunnerConfig::new(
            tmp.path().join("absent.toml"),
            &features_path,
            tmp.path().join(sample_id),
        );
        config.sample_id = Some(sample_id.to_string());
        let mut runner = PredictionRunner::new(config).with_classifier(Arc::clone(&classifier));
        runner.run().unwrap();
        assert!(Arc::ptr_eq(&runner.classifier().unwrap(), &classifier));
    }
}

#[test]
fn exported_cv_table_reads_back() {
    let tmp = tempdir().unwrap();
    let cv_path = write_flat_cv_predictions(tmp.path(), "TRAIN1");
    let table = PredictionTable::from_tsv(&cv_path).unwrap();
    assert_eq!(table.columns().len(), 3 * CLASSIFIER_NAMES.len());
    assert_eq!(table.columns()[0].clf_group, ClfGroup::Combined);

    let export = tmp.path().join("export.tsv.gz");
    table.to_tsv(&export).unwrap();
    assert_eq!(PredictionTable::from_tsv(&export).unwrap(), table);
}

#[test]
fn legacy_directory_predicts_like_current_format() {
    let tmp = tempdir().unwrap();
    let classifier_path = write_classifier(tmp.path());

    let current_path = write_features(tmp.path(), TWO_SAMPLE_FEATURES);
    let mut current = RunnerConfig::new(&classifier_path, &current_path, tmp.path().join("current_out"));
    current.sample_id = Some("S1".to_string());
    let mut current_runner = PredictionRunner::new(current);
    current_runner.run().unwrap();

    // Same values as TWO_SAMPLE_FEATURES, laid out per family with v38 contig names.
    let legacy_dir = tmp.path().join("legacy");
    fs::create_dir(&legacy_dir).unwrap();
    fs::write(
        legacy_dir.join("gen_pos.tsv"),
        "sample_id\tchr1_500000\tchr2_1000000\tchrY_100\nS1\t3\t0\t5\nS2\t0\t3\t5\n",
    )
    .unwrap();
    fs::write(legacy_dir.join("snv96.tsv"), "sample_id\tC>A_ACA\nS1\t0\nS2\t2\n").unwrap();
    fs::write(legacy_dir.join("gene_exp.tsv"), "sample_id\tTP53\tKRAS\nS1\t1\t0\nS2\t0\t1\n").unwrap();

    let mut legacy = RunnerConfig::new(&classifier_path, &legacy_dir, tmp.path().join("legacy_out"));
    legacy.sample_id = Some("S1".to_string());
    legacy.features_format = FeaturesFormat::Legacy;
    legacy.genome_version = GenomeVersion::V38;
    let mut legacy_runner = PredictionRunner::new(legacy);
    legacy_runner.run().unwrap();

    let expected = current_runner.predictions().unwrap();
    let actual = legacy_runner.predictions().unwrap();
    assert_eq!(actual.sample_ids(), expected.sample_ids());
    for (j, column) in expected.columns().iter().enumerate() {
        if column.clf_name == "gen_pos" {
            assert_eq!(actual.probs().column(j), expected.probs().column(j), "column {column}");
        }
    }
    assert_eq!(actual, expected);
    assert!(tmp.path().join("legacy_out").join("S1.cuppa.pred_summ.tsv").is_file());
}
