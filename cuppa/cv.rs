//! Cross-validation predictions: precomputed probabilities for the training cohort.
//!
//! The delimited layout is pivoted, one row per sample and classifier:
//! `sample_id  clf_group  clf_name  <cancer type>...`.

use ahash::AHashMap;
use log::info;
use ndarray::Array2;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::tsv::{OutputError, create_tsv_writer, finish_tsv_writer, open_text_reader};
use crate::types::{ClfGroup, PredictionTable, ProbColumn, SampleId, TableError};

const KEY_COLUMNS: [&str; 3] = ["sample_id", "clf_group", "clf_name"];

#[derive(Debug, Error)]
pub enum CvError {
    #[error("failed to read cross-validation predictions '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed cross-validation predictions '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("'{path}' must start with the columns sample_id, clf_group, clf_name followed by cancer types")]
    BadHeader { path: String },
    #[error("'{path}' line {line}: unknown classifier group '{value}'")]
    UnknownClfGroup {
        path: String,
        line: u64,
        value: String,
    },
    #[error("'{path}' line {line}: value '{value}' for '{cancer_type}' is not a number")]
    Parse {
        path: String,
        line: u64,
        cancer_type: String,
        value: String,
    },
    #[error("'{path}' line {line}: duplicate row for sample '{sample_id}' and classifier '{clf_name}'")]
    DuplicateRow {
        path: String,
        line: u64,
        sample_id: String,
        clf_name: String,
    },
    #[error("'{path}': sample '{sample_id}' has no row for classifier '{clf_name}'")]
    MissingRow {
        path: String,
        sample_id: String,
        clf_name: String,
    },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Where cross-validation predictions come from.
#[derive(Debug, Clone)]
pub enum CvSource {
    InMemory(PredictionTable),
    File(PathBuf),
}

impl CvSource {
    pub fn load(&self) -> Result<PredictionTable, CvError> {
        match self {
            Self::InMemory(table) => Ok(table.clone()),
            Self::File(path) => {
                info!("Loading cross-validation predictions from: {}", path.display());
                PredictionTable::from_tsv(path)
            }
        }
    }
}

impl PredictionTable {
    /// Reads a pivoted prediction table.
    pub fn from_tsv(path: &Path) -> Result<PredictionTable, CvError> {
        let path_str = path.display().to_string();
        let reader = open_text_reader(path).map_err(|source| CvError::Io {
            path: path_str.clone(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(reader);
        let csv_err = |source| CvError::Csv {
            path: path_str.clone(),
            source,
        };

        let header = reader.headers().map_err(csv_err)?.clone();
        let header_ok = header.len() > KEY_COLUMNS.len()
            && KEY_COLUMNS.iter().zip(header.iter()).all(|(a, b)| *a == b);
        if !header_ok {
            return Err(CvError::BadHeader { path: path_str.clone() });
        }
        let cancer_types: Vec<String> = header.iter().skip(KEY_COLUMNS.len()).map(String::from).collect();

        let mut sample_ids: Vec<SampleId> = Vec::new();
        let mut sample_rows: AHashMap<SampleId, usize> = AHashMap::new();
        let mut classifiers: Vec<(ClfGroup, String)> = Vec::new();
        let mut rows: AHashMap<(usize, usize), Vec<f64>> = AHashMap::new();

        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let line = record.position().map_or(0, |p| p.line());

            let sample_id = record.get(0).unwrap_or_default().to_string();
            let group_value = record.get(1).unwrap_or_default();
            let clf_group = ClfGroup::parse(group_value).ok_or_else(|| CvError::UnknownClfGroup {
                path: path_str.clone(),
                line,
                value: group_value.to_string(),
            })?;
            let clf_name = record.get(2).unwrap_or_default().to_string();

            let mut values = Vec::with_capacity(cancer_types.len());
            for (cancer_type, raw) in cancer_types.iter().zip(record.iter().skip(KEY_COLUMNS.len())) {
                let value = raw.trim().parse::<f64>().map_err(|_| CvError::Parse {
                    path: path_str.clone(),
                    line,
                    cancer_type: cancer_type.clone(),
                    value: raw.to_string(),
                })?;
                values.push(value);
            }

            let sample_row = *sample_rows.entry(sample_id.clone()).or_insert_with(|| {
                sample_ids.push(sample_id.clone());
                sample_ids.len() - 1
            });
            let clf_idx = match classifiers.iter().position(|(_, name)| *name == clf_name) {
                Some(idx) => idx,
                None => {
                    classifiers.push((clf_group, clf_name.clone()));
                    classifiers.len() - 1
                }
            };

            if rows.insert((sample_row, clf_idx), values).is_some() {
                return Err(CvError::DuplicateRow {
                    path: path_str.clone(),
                    line,
                    sample_id,
                    clf_name,
                });
            }
        }

        let n_classes = cancer_types.len();
        let columns: Vec<ProbColumn> = classifiers
            .iter()
            .flat_map(|(group, name)| {
                cancer_types
                    .iter()
                    .map(move |cancer_type| ProbColumn::new(*group, name.as_str(), cancer_type.as_str()))
            })
            .collect();

        let mut probs = Array2::<f64>::zeros((sample_ids.len(), columns.len()));
        for (s, sample_id) in sample_ids.iter().enumerate() {
            for (c, (_, clf_name)) in classifiers.iter().enumerate() {
                let values = rows.get(&(s, c)).ok_or_else(|| CvError::MissingRow {
                    path: path_str.clone(),
                    sample_id: sample_id.clone(),
                    clf_name: clf_name.clone(),
                })?;
                for (k, value) in values.iter().enumerate() {
                    probs[[s, c * n_classes + k]] = *value;
                }
            }
        }

        let table = PredictionTable::new(sample_ids, columns, probs)?;
        info!(
            "Loaded cross-validation predictions for {} samples and {} classifiers",
            table.len(),
            classifiers.len()
        );
        Ok(table)
    }

    /// Writes the table in the pivoted layout read by `from_tsv`. Every
    /// classifier must cover the same cancer types as the first one.
    pub fn to_tsv(&self, path: &Path) -> Result<(), OutputError> {
        let groups = self.classifier_columns();
        let cancer_types: Vec<&str> = groups
            .first()
            .map(|g| g.indices.iter().map(|&i| self.columns()[i].cancer_type.as_str()).collect())
            .unwrap_or_default();

        let lookup: AHashMap<(&str, &str), usize> = self
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| ((c.clf_name.as_str(), c.cancer_type.as_str()), i))
            .collect();

        let mut writer = create_tsv_writer(path)?;
        let header = KEY_COLUMNS.iter().copied().chain(cancer_types.iter().copied());
        writer.write_record(header).map_err(|e| OutputError::csv(path, e))?;

        for (row, sample_id) in self.sample_ids().iter().enumerate() {
            for group in &groups {
                let mut record = vec![
                    sample_id.clone(),
                    group.clf_group.to_string(),
                    group.clf_name.clone(),
                ];
                for cancer_type in &cancer_types {
                    let col = lookup.get(&(group.clf_name.as_str(), *cancer_type)).ok_or_else(|| {
                        OutputError::io(
                            path,
                            std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                format!("classifier '{}' has no '{cancer_type}' column", group.clf_name),
                            ),
                        )
                    })?;
                    record.push(self.probs()[[row, *col]].to_string());
                }
                writer.write_record(&record).map_err(|e| OutputError::csv(path, e))?;
            }
        }

        finish_tsv_writer(writer, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::fs;
    use tempfile::tempdir;

    const CV_TSV: &str = "sample_id\tclf_group\tclf_name\tBreast\tLung\n\
TRAIN2\tdna\tgen_pos\t0.9\t0.1\n\
TRAIN1\tdna\tgen_pos\t0.2\t0.8\n\
TRAIN2\tcombined\tcombined\t0.7\t0.3\n\
TRAIN1\tcombined\tcombined\t0.4\t0.6\n";

    #[test]
    fn pivoted_file_becomes_prediction_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cv_predictions.tsv");
        fs::write(&path, CV_TSV).unwrap();

        let table = PredictionTable::from_tsv(&path).unwrap();

        assert_eq!(table.sample_ids(), ["TRAIN2", "TRAIN1"].map(String::from).as_slice());
        assert_eq!(table.columns().len(), 4);
        assert_eq!(table.columns()[2], ProbColumn::new(ClfGroup::Combined, "combined", "Breast"));
        assert_eq!(table.probs(), &array![[0.9, 0.1, 0.7, 0.3], [0.2, 0.8, 0.4, 0.6]]);
    }

    #[test]
    fn written_table_reads_back() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("cv_predictions.tsv");
        fs::write(&source, CV_TSV).unwrap();
        let table = PredictionTable::from_tsv(&source).unwrap();

        let copy = dir.path().join("copy.tsv.gz");
        table.to_tsv(&copy).unwrap();
        assert_eq!(PredictionTable::from_tsv(&copy).unwrap(), table);
    }

    #[test]
    fn sample_missing_a_classifier_row_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cv_predictions.tsv");
        fs::write(
            &path,
            "sample_id\tclf_group\tclf_name\tBreast\n\
S1\tdna\tgen_pos\t1.0\n\
S1\tdna\tsnv96\t1.0\n\
S2\tdna\tgen_pos\t1.0\n",
        )
        .unwrap();

        assert!(matches!(
            PredictionTable::from_tsv(&path),
            Err(CvError::MissingRow { sample_id, clf_name, .. }) if sample_id == "S2" && clf_name == "snv96"
        ));
    }

    #[test]
    fn unknown_group_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cv_predictions.tsv");
        fs::write(&path, "sample_id\tclf_group\tclf_name\tBreast\nS1\tprotein\tx\t1.0\n").unwrap();
        assert!(matches!(
            PredictionTable::from_tsv(&path),
            Err(CvError::UnknownClfGroup { .. })
        ));
    }

    #[test]
    fn in_memory_source_is_returned_as_is() {
        let table = PredictionTable::new(
            vec!["S1".to_string()],
            vec![ProbColumn::new(ClfGroup::Dna, "gen_pos", "Breast")],
            array![[1.0]],
        )
        .unwrap();
        assert_eq!(CvSource::InMemory(table.clone()).load().unwrap(), table);
    }
}
