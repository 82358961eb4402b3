//! paged-seq: sequence state and paged KV-cache addressing for batched decoding.
//!
//! This crate provides the pieces between a scheduler's view of in-flight
//! requests and the flat index arrays an attention kernel consumes:
//! - Token buffers and lifecycle status per sequence
//! - Block tables translating logical positions to physical cache slots
//! - Decode batch assembly

pub mod config;
pub mod error;

pub mod core;
pub mod engine;

pub use config::{CacheConfig, SamplingParams, SamplingType};
pub use error::{Error, Result};

pub use crate::core::{
    BlockTable, FinishReason, Sequence, SequenceData, SequenceMetadata, SequenceStatus,
};
pub use engine::{prepare_decode, DecodeBatch, DecodeTensors};
