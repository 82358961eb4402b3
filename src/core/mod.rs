//! Core data model.
//!
//! - [`block`]: block tables and position-to-slot translation
//! - [`sequence`]: token buffers, lifecycle status, stopping configuration
//! - [`metadata`]: per-step borrowed view handed to the model runner

pub mod block;
pub mod metadata;
pub mod sequence;

pub use block::{compute_num_blocks, translate, BlockTable, PhysicalBlockId, SlotAddress};
pub use metadata::SequenceMetadata;
pub use sequence::{
    FinishReason, Sequence, SequenceData, SequenceId, SequenceStatus, StoppingCriteria, TokenId,
};
