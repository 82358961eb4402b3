//! Configuration types for paged-seq.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Cache layout configuration shared by every sequence in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Tokens per physical block.
    pub block_size: usize,
    /// Vocabulary size, used to size per-sequence counter buffers.
    pub vocab_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            block_size: 16,
            vocab_size: 32000,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration.
    pub fn new(block_size: usize, vocab_size: usize) -> Self {
        Self {
            block_size,
            vocab_size,
        }
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `block_size` or `vocab_size` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be positive".to_string()));
        }
        if self.vocab_size == 0 {
            return Err(Error::Config("vocab_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Discriminator selecting which sampling algorithm applies to a sequence.
///
/// The numeric values are stable and match what downstream samplers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingType {
    Greedy = 0,
    Random = 1,
    Beam = 2,
}

impl SamplingType {
    /// Get the numeric discriminator.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for SamplingType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(Self::Greedy),
            1 => Ok(Self::Random),
            2 => Ok(Self::Beam),
            other => Err(Error::Config(format!("unknown sampling type {other}"))),
        }
    }
}

/// Sampling configuration for one request.
///
/// Interpreted by the sampler, never by this crate; it only travels with the
/// sequence and its per-step metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SamplingParams {
    /// Always pick the highest-probability token.
    #[default]
    Greedy,
    /// Temperature / top-k / top-p sampling.
    Random {
        temperature: f32,
        /// 0 disables top-k.
        top_k: usize,
        /// 1.0 disables top-p.
        top_p: f32,
        seed: Option<u64>,
    },
    /// Beam search.
    Beam {
        beam_width: usize,
        length_penalty: f32,
    },
}

impl SamplingParams {
    /// Discriminator matching this variant.
    pub fn sampling_type(&self) -> SamplingType {
        match self {
            Self::Greedy => SamplingType::Greedy,
            Self::Random { .. } => SamplingType::Random,
            Self::Beam { .. } => SamplingType::Beam,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_default_is_valid() {
        let config = CacheConfig::default();
        assert_eq!(config.block_size, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_config_rejects_zero_block_size() {
        let config = CacheConfig::new(0, 100);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_sampling_type_round_trip() {
        for ty in [SamplingType::Greedy, SamplingType::Random, SamplingType::Beam] {
            assert_eq!(SamplingType::try_from(ty.as_i32()).unwrap(), ty);
        }
        assert!(SamplingType::try_from(7).is_err());
    }

    #[test]
    fn test_sampling_params_discriminator() {
        let params = SamplingParams::Random {
            temperature: 0.8,
            top_k: 40,
            top_p: 0.95,
            seed: None,
        };
        assert_eq!(params.sampling_type(), SamplingType::Random);
        assert_eq!(SamplingParams::default().sampling_type(), SamplingType::Greedy);
    }

    #[test]
    fn test_sampling_params_json_tag() {
        let params: SamplingParams =
            serde_json::from_str(r#"{"type":"beam","beam_width":4,"length_penalty":1.0}"#).unwrap();
        assert_eq!(params.sampling_type(), SamplingType::Beam);
    }
}
