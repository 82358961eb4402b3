//! Input preparation for decode steps.
//!
//! ## Decode Batch Layout
//!
//! ```text
//!   batch index      0        1        2
//!                ┌────────┬────────┬────────┐
//!   input_tokens │ last₀  │ last₁  │ last₂  │  i64, most recent token
//!                ├────────┼────────┼────────┤
//!   positions    │ len₀-1 │ len₁-1 │ len₂-1 │  i64, offset of that token
//!                ├────────┼────────┼────────┤
//!   slot_mapping │ slot₀  │ slot₁  │ slot₂  │  i32, cache slot to write
//!                └────────┴────────┴────────┘
//!   max_context_len = max(lenᵢ)
//! ```
//!
//! ## Example
//!
//! ```
//! use paged_seq::config::{SamplingParams, SamplingType};
//! use paged_seq::core::{SequenceData, SequenceMetadata};
//! use paged_seq::engine::prepare_decode;
//!
//! let mut data = SequenceData::new(vec![11, 12, 13, 14, 15]).unwrap();
//! for token in [16, 17, 18, 19] {
//!     data.append_token_id(token);
//! }
//! let params = SamplingParams::Greedy;
//! let meta = SequenceMetadata::new("req", 0, false, &data, &params, vec![7, 2, 1], SamplingType::Greedy);
//!
//! let batch = prepare_decode(&[meta], 4).unwrap();
//! assert_eq!(batch.input_tokens, vec![19]);
//! assert_eq!(batch.input_positions, vec![8]);
//! assert_eq!(batch.slot_mapping, vec![4]);
//! assert_eq!(batch.max_context_len, 9);
//! ```

use candle_core::{Device, Tensor};
use tracing::{debug, error, trace};

use crate::core::block::translate;
use crate::core::metadata::SequenceMetadata;
use crate::error::{Error, Result};

/// Flat per-sequence arrays for one decode step, aligned by batch index.
///
/// Element types match what the attention kernels expect: 64-bit tokens and
/// positions, 32-bit slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeBatch {
    /// Most recent token of each sequence.
    pub input_tokens: Vec<i64>,
    /// Position of that token within its sequence.
    pub input_positions: Vec<i64>,
    /// Cache slot the step writes the new KV state to.
    pub slot_mapping: Vec<i32>,
    /// Longest sequence in the batch; 0 for an empty batch.
    pub max_context_len: i64,
}

impl DecodeBatch {
    fn with_capacity(num_seqs: usize) -> Self {
        Self {
            input_tokens: Vec::with_capacity(num_seqs),
            input_positions: Vec::with_capacity(num_seqs),
            slot_mapping: Vec::with_capacity(num_seqs),
            max_context_len: 0,
        }
    }

    /// Number of sequences in the batch.
    pub fn len(&self) -> usize {
        self.input_tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_empty()
    }

    /// Split into `(input_tokens, input_positions, slot_mapping, max_context_len)`.
    pub fn into_parts(self) -> (Vec<i64>, Vec<i64>, Vec<i32>, i64) {
        (
            self.input_tokens,
            self.input_positions,
            self.slot_mapping,
            self.max_context_len,
        )
    }

    /// Upload the arrays to `device`.
    ///
    /// candle has no `i32` dtype, so slots go up as `U32`. Slots are never
    /// negative, so the 32-bit pattern is unchanged.
    pub fn to_tensors(&self, device: &Device) -> Result<DecodeTensors> {
        let num_seqs = self.len();
        let slots = self
            .slot_mapping
            .iter()
            .map(|&slot| {
                u32::try_from(slot).map_err(|_| Error::SlotOutOfRange {
                    slot: i64::from(slot),
                })
            })
            .collect::<Result<Vec<u32>>>()?;

        Ok(DecodeTensors {
            input_tokens: Tensor::from_slice(self.input_tokens.as_slice(), num_seqs, device)?,
            input_positions: Tensor::from_slice(self.input_positions.as_slice(), num_seqs, device)?,
            slot_mapping: Tensor::from_vec(slots, num_seqs, device)?,
            max_context_len: self.max_context_len,
        })
    }
}

/// A [`DecodeBatch`] resident on a device.
#[derive(Debug, Clone)]
pub struct DecodeTensors {
    /// `[num_seqs]`, `I64`.
    pub input_tokens: Tensor,
    /// `[num_seqs]`, `I64`.
    pub input_positions: Tensor,
    /// `[num_seqs]`, `U32`.
    pub slot_mapping: Tensor,
    pub max_context_len: i64,
}

/// Assemble the inputs for one decode step.
///
/// Each sequence contributes its most recent token, that token's position,
/// and the cache slot for the position. Output index `i` always corresponds
/// to `seq_metadata_list[i]`. The inputs are not modified.
///
/// # Errors
///
/// - [`Error::Config`] if `block_size` is zero.
/// - [`Error::PromptInDecodeBatch`] if any entry is still in prefill.
/// - Any addressing error from [`translate`]; the whole batch fails.
pub fn prepare_decode(
    seq_metadata_list: &[SequenceMetadata<'_>],
    block_size: usize,
) -> Result<DecodeBatch> {
    if block_size == 0 {
        return Err(Error::Config("block_size must be positive".to_string()));
    }

    let mut batch = DecodeBatch::with_capacity(seq_metadata_list.len());

    for seq_metadata in seq_metadata_list {
        if seq_metadata.is_prompt {
            error!(seq_id = seq_metadata.seq_id, "prompt sequence in decode batch");
            return Err(Error::PromptInDecodeBatch {
                seq_id: seq_metadata.seq_id,
            });
        }

        let seq_data = seq_metadata.seq_data;
        let generation_token = seq_data.get_last_token_id()?;

        // Non-empty: a last token exists.
        let seq_len = seq_data.get_len();
        let position = seq_len - 1;

        let addr = translate(position, &seq_metadata.block_table, block_size).inspect_err(|e| {
            error!(
                seq_id = seq_metadata.seq_id,
                request_id = %seq_metadata.request_id,
                error = %e,
                "decode slot translation failed"
            );
        })?;

        trace!(
            seq_id = seq_metadata.seq_id,
            position,
            physical_block = addr.physical_block,
            slot = addr.slot,
            "decode row"
        );

        batch.input_tokens.push(i64::from(generation_token));
        batch.input_positions.push(position as i64);
        batch.slot_mapping.push(addr.slot);
        batch.max_context_len = batch.max_context_len.max(seq_len as i64);
    }

    debug!(
        num_seqs = batch.len(),
        max_context_len = batch.max_context_len,
        "prepared decode batch"
    );

    Ok(batch)
}
