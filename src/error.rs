//! Error types for paged-seq.

use thiserror::Error;

/// Result type alias for paged-seq operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for paged-seq.
///
/// The addressing variants (`EmptySequence`, `BlockTableOverflow`,
/// `UnallocatedBlock`, `SlotOutOfRange`) mean a cache invariant was already
/// broken upstream. They are never retried here.
#[derive(Error, Debug)]
pub enum Error {
    /// Both token buffers are empty, or a sequence was built from an empty prompt.
    #[error("sequence has no tokens")]
    EmptySequence,

    /// The block table does not cover the requested logical block.
    #[error("logical block {logical_block} out of range for block table with {num_blocks} blocks")]
    BlockTableOverflow {
        logical_block: usize,
        num_blocks: usize,
    },

    /// The block table entry exists but holds no physical block.
    #[error("logical block {logical_block} is unallocated (physical block {physical_block})")]
    UnallocatedBlock {
        logical_block: usize,
        physical_block: i32,
    },

    /// Flat slot index does not fit the 32-bit slot mapping.
    #[error("slot {slot} does not fit in a 32-bit slot mapping")]
    SlotOutOfRange { slot: i64 },

    /// A prefill-phase sequence was handed to the decode assembler.
    #[error("sequence {seq_id} is in the prompt phase and cannot be decoded")]
    PromptInDecodeBatch { seq_id: u64 },

    /// Invalid sequence state transition.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Tensor operation error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
