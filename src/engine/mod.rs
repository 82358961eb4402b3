//! Model runner input preparation.

pub mod model_runner;

pub use model_runner::{prepare_decode, DecodeBatch, DecodeTensors};
