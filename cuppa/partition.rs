use ahash::AHashSet;

use crate::types::SampleId;

/// Samples split by whether a cross-validation prediction exists for them.
/// Both halves keep the relative order of the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplePartition {
    /// Samples that need a fresh prediction.
    pub new: Vec<SampleId>,
    /// Samples whose prediction is taken from the cross-validation table.
    pub cv: Vec<SampleId>,
}

impl SamplePartition {
    pub fn total(&self) -> usize {
        self.new.len() + self.cv.len()
    }
}

/// Splits `order` into `new` and `cv` samples. Without a cross-validation set
/// every sample is new.
pub fn partition_samples(order: &[SampleId], cv_ids: Option<&AHashSet<&str>>) -> SamplePartition {
    let Some(cv_ids) = cv_ids else {
        return SamplePartition {
            new: order.to_vec(),
            cv: Vec::new(),
        };
    };

    let (cv, new): (Vec<SampleId>, Vec<SampleId>) = order
        .iter()
        .cloned()
        .partition(|id| cv_ids.contains(id.as_str()));
    SamplePartition { new, cv }
}
