use std::fmt;
use std::str::FromStr;

use crate::classifier::Classifier;
use crate::config::ConfigError;
use crate::types::{PredictionTable, ProbColumn};

/// Which classifier outputs to keep in the final predictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClassifierGroup {
    #[default]
    All,
    Dna,
}

impl ClassifierGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Dna => "dna",
        }
    }

    /// Narrows `predictions` to this group. `All` leaves the table untouched.
    pub fn apply<C>(self, classifier: &C, predictions: PredictionTable) -> PredictionTable
    where
        C: Classifier + ?Sized,
    {
        match self {
            Self::All => predictions,
            Self::Dna => classifier.subset_dna(&predictions),
        }
    }

    /// The columns a filtered prediction table must carry, in classifier order.
    pub fn expected_columns<C>(self, classifier: &C) -> Vec<ProbColumn>
    where
        C: Classifier + ?Sized,
    {
        let all = PredictionTable::empty(classifier.output_columns().to_vec());
        self.apply(classifier, all).columns().to_vec()
    }
}

impl FromStr for ClassifierGroup {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "all" => Ok(Self::All),
            "dna" => Ok(Self::Dna),
            other => Err(ConfigError::InvalidClassifierGroup(other.to_string())),
        }
    }
}

impl fmt::Display for ClassifierGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
