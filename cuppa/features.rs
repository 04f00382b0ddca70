//! # Feature Loading
//!
//! Turns the feature files produced by the upstream data-prep step into a
//! `FeatureMatrix`. Two layouts are supported:
//!
//! - Current: one long-format table, `Source Category Key <value columns...>`,
//!   where each value column holds one sample (a lone `Value` column is a
//!   single-sample file).
//! - Legacy: a directory of wide per-family tables (`gen_pos.tsv`, `snv96.tsv`,
//!   ...), each keyed by a `sample_id` column.
//!
//! Feature names are `<family>.<key>` in both layouts. Genomic-position bins on
//! excluded chromosomes are dropped at load time. The returned matrix is not yet
//! reconciled with any classifier schema.

use ahash::{AHashMap, AHashSet};
use log::{debug, info};
use ndarray::Array2;
use polars::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::ConfigError;
use crate::tsv::read_decompressed;
use crate::types::{FeatureMatrix, SampleId, TableError};

/// Name given to the sample of a single-sample file when no sample id is designated.
pub const DEFAULT_SAMPLE_ID: &str = "sample";

const GEN_POS_FAMILY: &str = "gen_pos";

/// Feature families of the legacy layout, in load order.
pub const LEGACY_FEATURE_FILES: [&str; 6] = ["gen_pos", "snv96", "event", "sig", "gene_exp", "alt_sj"];

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("the required column '{column}' was not found in '{path}'")]
    ColumnNotFound { path: String, column: String },
    #[error("'{path}' contains no sample value columns")]
    NoValueColumns { path: String },
    #[error("column '{column}' in '{path}' could not be read as numeric data (found type: {found_type})")]
    ColumnWrongType {
        path: String,
        column: String,
        found_type: String,
    },
    #[error("missing or null values were found in column '{column}' of '{path}'")]
    MissingValues { path: String, column: String },
    #[error("non-finite values were found in column '{column}' of '{path}'")]
    NonFiniteValues { path: String, column: String },
    #[error("feature '{feature}' appears more than once in '{path}'")]
    DuplicateFeature { path: String, feature: String },
    #[error("sample '{sample_id}' appears more than once in '{path}'")]
    DuplicateSample { path: String, sample_id: String },
    #[error("genomic position column '{column}' in '{path}' is not of the form <chromosome>_<position>")]
    MalformedBin { path: String, column: String },
    #[error("no legacy feature files were found in '{dir}'")]
    NoFeatureFiles { dir: String },
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Layout of the feature input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeaturesFormat {
    #[default]
    Current,
    Legacy,
}

/// Reference genome the legacy position bins were computed against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenomeVersion {
    #[default]
    V37,
    V38,
}

impl GenomeVersion {
    pub fn from_number(version: u32) -> Result<Self, ConfigError> {
        match version {
            37 => Ok(Self::V37),
            38 => Ok(Self::V38),
            other => Err(ConfigError::InvalidGenomeVersion(other)),
        }
    }

    /// Strips the `chr` prefix that v38 contig names carry.
    pub fn canonical_chromosome(self, chromosome: &str) -> &str {
        match self {
            Self::V37 => chromosome,
            Self::V38 => chromosome.strip_prefix("chr").unwrap_or(chromosome),
        }
    }
}

/// Case-insensitive chromosome name without any `chr` prefix.
pub fn normalize_chromosome(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    lower.strip_prefix("chr").unwrap_or(&lower).to_string()
}

/// Matches `gen_pos` bin keys (`<chromosome>_<position>`) against the excluded chromosomes.
#[derive(Debug, Clone, Default)]
struct ChromosomeExclusions {
    normalized: Vec<String>,
}

impl ChromosomeExclusions {
    fn new(excl_chroms: &[String]) -> Self {
        Self {
            normalized: excl_chroms.iter().map(|c| normalize_chromosome(c)).collect(),
        }
    }

    fn excludes_bin(&self, bin_key: &str) -> bool {
        let chromosome = bin_key.split('_').next().unwrap_or(bin_key);
        let chromosome = normalize_chromosome(chromosome);
        self.normalized.iter().any(|c| *c == chromosome)
    }
}

/// Loader for the current long-format feature table.
#[derive(Debug, Clone)]
pub struct FeatureLoader {
    path: PathBuf,
    sample_id: Option<SampleId>,
    exclusions: ChromosomeExclusions,
}

impl FeatureLoader {
    pub fn new(path: impl Into<PathBuf>, sample_id: Option<SampleId>, excl_chroms: &[String]) -> Self {
        Self {
            path: path.into(),
            sample_id,
            exclusions: ChromosomeExclusions::new(excl_chroms),
        }
    }

    pub fn load(&self) -> Result<FeatureMatrix, FeatureError> {
        info!("Loading features from: {}", self.path.display());
        let path_str = self.path.display().to_string();
        let df = read_tsv(&self.path)?;

        let column_names: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
        for required in ["Source", "Category", "Key"] {
            if !column_names.iter().any(|c| c == required) {
                return Err(FeatureError::ColumnNotFound {
                    path: path_str,
                    column: required.to_string(),
                });
            }
        }

        let value_columns: Vec<&String> = column_names
            .iter()
            .filter(|c| !matches!(c.as_str(), "Source" | "Category" | "Key"))
            .collect();
        if value_columns.is_empty() {
            return Err(FeatureError::NoValueColumns { path: path_str });
        }

        let sample_ids: Vec<SampleId> = if value_columns.len() == 1 && value_columns[0] == "Value" {
            vec![self.sample_id.clone().unwrap_or_else(|| DEFAULT_SAMPLE_ID.to_string())]
        } else {
            value_columns.iter().map(|c| c.to_string()).collect()
        };

        let categories = extract_string_column(&df, "Category", &self.path)?;
        let keys = extract_string_column(&df, "Key", &self.path)?;

        let mut kept_rows = Vec::with_capacity(keys.len());
        let mut feature_names = Vec::with_capacity(keys.len());
        let mut seen: AHashMap<String, usize> = AHashMap::with_capacity(keys.len());
        let mut n_excluded = 0usize;
        for (row, (category, key)) in categories.iter().zip(keys.iter()).enumerate() {
            let family = category.to_ascii_lowercase();
            if family == GEN_POS_FAMILY && self.exclusions.excludes_bin(key) {
                n_excluded += 1;
                continue;
            }
            let name = format!("{family}.{key}");
            if seen.insert(name.clone(), row).is_some() {
                return Err(FeatureError::DuplicateFeature {
                    path: path_str,
                    feature: name,
                });
            }
            kept_rows.push(row);
            feature_names.push(name);
        }
        if n_excluded > 0 {
            debug!("Excluded {n_excluded} genomic position bins on excluded chromosomes");
        }

        let mut values = Array2::<f64>::zeros((sample_ids.len(), feature_names.len()));
        for (s, column) in value_columns.iter().enumerate() {
            let column_values = extract_numeric_column(&df, column, &self.path)?;
            for (j, &row) in kept_rows.iter().enumerate() {
                values[[s, j]] = column_values[row];
            }
        }

        check_unique_samples(&sample_ids, &self.path)?;
        let matrix = FeatureMatrix::new(sample_ids, feature_names, values)?;
        info!(
            "Loaded {} features for {} samples",
            matrix.feature_names().len(),
            matrix.n_samples()
        );
        Ok(matrix)
    }
}

/// Loader for the legacy directory of per-family wide tables.
#[derive(Debug, Clone)]
pub struct LegacyFeatureLoader {
    dir: PathBuf,
    genome_version: GenomeVersion,
    exclusions: ChromosomeExclusions,
}

impl LegacyFeatureLoader {
    pub fn new(dir: impl Into<PathBuf>, genome_version: GenomeVersion, excl_chroms: &[String]) -> Self {
        Self {
            dir: dir.into(),
            genome_version,
            exclusions: ChromosomeExclusions::new(excl_chroms),
        }
    }

    /// Existing family files, in `LEGACY_FEATURE_FILES` order.
    pub fn feature_paths(&self) -> Vec<(&'static str, PathBuf)> {
        LEGACY_FEATURE_FILES
            .iter()
            .filter_map(|family| {
                let plain = self.dir.join(format!("{family}.tsv"));
                let gzipped = self.dir.join(format!("{family}.tsv.gz"));
                if plain.is_file() {
                    Some((*family, plain))
                } else if gzipped.is_file() {
                    Some((*family, gzipped))
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn load(&self) -> Result<FeatureMatrix, FeatureError> {
        info!(
            "Loading legacy features from: {} (genome version {:?})",
            self.dir.display(),
            self.genome_version
        );

        let paths = self.feature_paths();
        if paths.is_empty() {
            return Err(FeatureError::NoFeatureFiles {
                dir: self.dir.display().to_string(),
            });
        }

        let mut sample_ids: Vec<SampleId> = Vec::new();
        let mut sample_rows: AHashMap<SampleId, usize> = AHashMap::new();
        let mut feature_names: Vec<String> = Vec::new();
        let mut seen_features: AHashSet<String> = AHashSet::new();
        // (sample row, feature column, value) triplets, assembled once all files are read.
        let mut entries: Vec<(usize, usize, f64)> = Vec::new();

        for (family, path) in &paths {
            let df = read_tsv(path)?;
            let file_samples = extract_string_column(&df, "sample_id", path)?;
            check_unique_samples(&file_samples, path)?;

            let rows: Vec<usize> = file_samples
                .iter()
                .map(|id| {
                    *sample_rows.entry(id.clone()).or_insert_with(|| {
                        sample_ids.push(id.clone());
                        sample_ids.len() - 1
                    })
                })
                .collect();

            let mut n_family = 0usize;
            for column in df.get_column_names().iter().map(|c| c.to_string()) {
                if column == "sample_id" {
                    continue;
                }
                let key = if *family == GEN_POS_FAMILY {
                    match self.gen_pos_key(&column, path)? {
                        Some(key) => key,
                        None => continue,
                    }
                } else {
                    column.clone()
                };

                let name = format!("{family}.{key}");
                if !seen_features.insert(name.clone()) {
                    return Err(FeatureError::DuplicateFeature {
                        path: path.display().to_string(),
                        feature: name,
                    });
                }
                let values = extract_numeric_column(&df, &column, path)?;
                let col_idx = feature_names.len();
                feature_names.push(name);
                entries.extend(rows.iter().zip(values).map(|(&row, v)| (row, col_idx, v)));
                n_family += 1;
            }
            debug!("Loaded {n_family} {family} features from {}", path.display());
        }

        let mut values = Array2::<f64>::zeros((sample_ids.len(), feature_names.len()));
        for (row, col, value) in entries {
            values[[row, col]] = value;
        }

        let matrix = FeatureMatrix::new(sample_ids, feature_names, values)?;
        info!(
            "Loaded {} features for {} samples from {} files",
            matrix.feature_names().len(),
            matrix.n_samples(),
            paths.len()
        );
        Ok(matrix)
    }

    /// Canonical `gen_pos` key for a legacy bin column, or `None` when excluded.
    fn gen_pos_key(&self, column: &str, path: &Path) -> Result<Option<String>, FeatureError> {
        let Some((chromosome, position)) = column.split_once('_') else {
            return Err(FeatureError::MalformedBin {
                path: path.display().to_string(),
                column: column.to_string(),
            });
        };
        let chromosome = self.genome_version.canonical_chromosome(chromosome);
        let key = format!("{chromosome}_{position}");
        Ok((!self.exclusions.excludes_bin(&key)).then_some(key))
    }
}

fn read_tsv(path: &Path) -> Result<DataFrame, FeatureError> {
    let bytes = read_decompressed(path).map_err(|source| FeatureError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let df = CsvReader::new(Cursor::new(bytes))
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                // Infer dtypes from every row: fractional values can follow thousands of integer counts.
                .with_infer_schema_length(None)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;
    Ok(df)
}

fn extract_string_column(df: &DataFrame, column: &str, path: &Path) -> Result<Vec<String>, FeatureError> {
    let series = df.column(column).map_err(|_| FeatureError::ColumnNotFound {
        path: path.display().to_string(),
        column: column.to_string(),
    })?;
    if series.null_count() > 0 {
        return Err(FeatureError::MissingValues {
            path: path.display().to_string(),
            column: column.to_string(),
        });
    }
    let casted = series.cast(&DataType::String)?;
    let values = casted
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect();
    Ok(values)
}

fn extract_numeric_column(df: &DataFrame, column: &str, path: &Path) -> Result<Vec<f64>, FeatureError> {
    let series = df.column(column)?;
    if series.null_count() > 0 {
        return Err(FeatureError::MissingValues {
            path: path.display().to_string(),
            column: column.to_string(),
        });
    }

    let wrong_type = || FeatureError::ColumnWrongType {
        path: path.display().to_string(),
        column: column.to_string(),
        found_type: format!("{:?}", series.dtype()),
    };
    let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let values: Vec<f64> = casted.f64()?.rechunk().into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(FeatureError::NonFiniteValues {
            path: path.display().to_string(),
            column: column.to_string(),
        });
    }
    Ok(values)
}

fn check_unique_samples(sample_ids: &[SampleId], path: &Path) -> Result<(), FeatureError> {
    let mut seen = AHashSet::with_capacity(sample_ids.len());
    for id in sample_ids {
        if !seen.insert(id.as_str()) {
            return Err(FeatureError::DuplicateSample {
                path: path.display().to_string(),
                sample_id: id.clone(),
            });
        }
    }
    Ok(())
}
