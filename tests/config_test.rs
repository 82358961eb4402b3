//! Integration tests for configuration loading.

use std::path::PathBuf;

use paged_seq::config::{CacheConfig, SamplingParams, SamplingType};
use paged_seq::Error;

fn write_temp(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("paged-seq-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_cache_config() {
    let path = write_temp("cache.json", r#"{"block_size": 8, "vocab_size": 1000}"#);
    let config = CacheConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config, CacheConfig::new(8, 1000));
}

#[test]
fn test_missing_fields_use_defaults() {
    let path = write_temp("partial.json", r#"{"block_size": 32}"#);
    let config = CacheConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.block_size, 32);
    assert_eq!(config.vocab_size, CacheConfig::default().vocab_size);
}

#[test]
fn test_zero_block_size_rejected() {
    let path = write_temp("zero.json", r#"{"block_size": 0}"#);
    let result = CacheConfig::from_json_file(&path);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_json() {
    let path = write_temp("bad.json", "{ block_size: ");
    let result = CacheConfig::from_json_file(&path);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(result, Err(Error::Json(_))));
}

#[test]
fn test_missing_file() {
    let result = CacheConfig::from_json_file("/nonexistent/paged-seq/config.json");
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_sampling_params_from_json() {
    let params: SamplingParams = serde_json::from_str(
        r#"{"type": "random", "temperature": 0.7, "top_k": 50, "top_p": 0.9, "seed": null}"#,
    )
    .unwrap();

    assert_eq!(params.sampling_type(), SamplingType::Random);
    assert_eq!(
        params,
        SamplingParams::Random {
            temperature: 0.7,
            top_k: 50,
            top_p: 0.9,
            seed: None
        }
    );

    let greedy: SamplingParams = serde_json::from_str(r#"{"type": "greedy"}"#).unwrap();
    assert_eq!(greedy, SamplingParams::Greedy);
}
