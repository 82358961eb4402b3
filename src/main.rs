use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use paged_seq::config::{CacheConfig, SamplingParams};
use paged_seq::core::block::{BlockTable, PhysicalBlockId};
use paged_seq::core::sequence::{Sequence, SequenceId, SequenceStatus, TokenId};
use paged_seq::engine::prepare_decode;
use paged_seq::Result;

#[derive(Parser, Debug)]
#[command(name = "paged-seq")]
#[command(about = "Assemble decode-step inputs from a batch of sequences")]
struct Args {
    /// Cache configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Batch description (JSON); a built-in demo batch is used if omitted
    #[arg(short, long)]
    batch: Option<PathBuf>,

    /// Override the block size from the configuration
    #[arg(long)]
    block_size: Option<usize>,
}

/// One sequence of a batch file.
#[derive(Debug, Deserialize)]
struct SequenceEntry {
    request_id: String,
    seq_id: SequenceId,
    prompt_token_ids: Vec<TokenId>,
    #[serde(default)]
    output_token_ids: Vec<TokenId>,
    block_table: Vec<PhysicalBlockId>,
    #[serde(default)]
    sampling_params: SamplingParams,
    #[serde(default)]
    arrival_time: Option<f64>,
}

fn demo_batch() -> Vec<SequenceEntry> {
    vec![
        SequenceEntry {
            request_id: "demo-0".to_string(),
            seq_id: 0,
            prompt_token_ids: vec![11, 12, 13, 14, 15],
            output_token_ids: vec![16, 17, 18, 19],
            block_table: vec![7, 2, 1],
            sampling_params: SamplingParams::Greedy,
            arrival_time: None,
        },
        SequenceEntry {
            request_id: "demo-1".to_string(),
            seq_id: 1,
            prompt_token_ids: vec![21, 22, 23],
            output_token_ids: vec![24],
            block_table: vec![4],
            sampling_params: SamplingParams::Random {
                temperature: 0.7,
                top_k: 50,
                top_p: 0.9,
                seed: Some(7),
            },
            arrival_time: None,
        },
    ]
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CacheConfig::from_json_file(path)?,
        None => CacheConfig::new(4, 32000),
    };
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
    }
    config.validate()?;

    let entries = match &args.batch {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => demo_batch(),
    };

    println!("paged-seq v{}", env!("CARGO_PKG_VERSION"));
    println!("Block size: {}", config.block_size);

    let mut sequences = Vec::with_capacity(entries.len());
    let mut block_tables = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut seq = Sequence::new(
            entry.seq_id,
            entry.request_id,
            entry.prompt_token_ids,
            &config,
            Arc::new(entry.sampling_params),
        )?;
        if let Some(arrival_time) = entry.arrival_time {
            seq = seq.with_arrival_time(arrival_time);
        }
        for token in entry.output_token_ids {
            seq.append_token_id(token);
        }
        seq.set_status(SequenceStatus::Running)?;
        let block_table = BlockTable::from_blocks(config.block_size, entry.block_table);
        if !block_table.covers(seq.get_len()) {
            warn!(
                seq_id = seq.seq_id(),
                len = seq.get_len(),
                blocks_assigned = block_table.num_blocks(),
                "block table does not cover sequence"
            );
        }
        info!(
            seq_id = seq.seq_id(),
            len = seq.get_len(),
            blocks_needed = seq.get_num_blocks(),
            blocks_assigned = block_table.num_blocks(),
            "loaded sequence"
        );
        sequences.push(seq);
        block_tables.push(block_table);
    }

    let metadata = sequences
        .iter()
        .zip(&block_tables)
        .map(|(seq, block_table)| seq.metadata(false, block_table))
        .collect::<Result<Vec<_>>>()?;

    let batch = prepare_decode(&metadata, config.block_size)?;

    println!("input_tokens:    {:?}", batch.input_tokens);
    println!("input_positions: {:?}", batch.input_positions);
    println!("slot_mapping:    {:?}", batch.slot_mapping);
    println!("max_context_len: {}", batch.max_context_len);

    Ok(())
}
