//! Per-step view of a sequence for batch assembly.

use crate::config::{SamplingParams, SamplingType};
use crate::core::block::PhysicalBlockId;
use crate::core::sequence::{SequenceData, SequenceId};

/// What the model runner needs to know about one sequence for one step.
///
/// Built fresh every step and dropped after the batch is assembled. It
/// borrows the sequence's token data and sampling configuration, so it can
/// never outlive the sequences it describes. Fields are public so the
/// scheduler can patch them in place before assembly.
#[derive(Debug, Clone)]
pub struct SequenceMetadata<'a> {
    pub request_id: String,
    pub seq_id: SequenceId,
    /// `true` during prefill, `false` for single-token decode.
    pub is_prompt: bool,
    pub seq_data: &'a SequenceData,
    pub sampling_params: &'a SamplingParams,
    /// Physical block for each logical block of the sequence.
    pub block_table: Vec<PhysicalBlockId>,
    pub sampling_type: SamplingType,
}

impl<'a> SequenceMetadata<'a> {
    pub fn new(
        request_id: impl Into<String>,
        seq_id: SequenceId,
        is_prompt: bool,
        seq_data: &'a SequenceData,
        sampling_params: &'a SamplingParams,
        block_table: Vec<PhysicalBlockId>,
        sampling_type: SamplingType,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            seq_id,
            is_prompt,
            seq_data,
            sampling_params,
            block_table,
            sampling_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_borrows_sequence_data() {
        let data = SequenceData::new(vec![1, 2, 3]).unwrap();
        let params = SamplingParams::Greedy;

        let mut meta =
            SequenceMetadata::new("req", 3, true, &data, &params, vec![4], SamplingType::Greedy);
        assert_eq!(meta.seq_data.get_len(), 3);

        meta.is_prompt = false;
        meta.block_table.push(9);
        assert_eq!(meta.block_table, vec![4, 9]);
        assert!(std::ptr::eq(meta.seq_data, &data));
    }
}
