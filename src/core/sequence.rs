//! Sequence tracking for generation requests.
//!
//! A [`Sequence`] owns the tokens of one generation stream ([`SequenceData`])
//! together with its lifecycle status, stopping configuration and the
//! per-vocabulary counter buffer used by repetition penalties.

use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::config::{CacheConfig, SamplingParams, SamplingType};
use crate::core::block::{compute_num_blocks, BlockTable};
use crate::core::metadata::SequenceMetadata;
use crate::error::{Error, Result};

/// Unique identifier for a sequence.
pub type SequenceId = u64;

/// Token identifier.
pub type TokenId = u32;

/// Status of a sequence in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceStatus {
    /// Waiting in queue to be scheduled.
    Waiting,
    /// Currently running (prefill or decode).
    Running,
    /// Cache blocks evicted to host memory (preempted).
    Swapped,
    /// Hit a stop token or EOS.
    FinishedStopped,
    /// Reached `max_tokens`.
    FinishedLengthCapped,
    /// Aborted by the client or the engine.
    FinishedAborted,
    /// Rejected, e.g. the prompt does not fit the cache.
    FinishedIgnored,
    /// Dropped by preemption without resuming.
    FinishedPreempted,
}

impl SequenceStatus {
    /// Every status, in declaration order.
    pub const ALL: [SequenceStatus; 8] = [
        Self::Waiting,
        Self::Running,
        Self::Swapped,
        Self::FinishedStopped,
        Self::FinishedLengthCapped,
        Self::FinishedAborted,
        Self::FinishedIgnored,
        Self::FinishedPreempted,
    ];

    /// Check if the status is terminal.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::FinishedStopped
                | Self::FinishedLengthCapped
                | Self::FinishedAborted
                | Self::FinishedIgnored
                | Self::FinishedPreempted
        )
    }

    /// Reason reported to the client, `None` while the sequence is live.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        match self {
            Self::FinishedStopped => Some(FinishReason::Stop),
            Self::FinishedLengthCapped | Self::FinishedIgnored => Some(FinishReason::Length),
            Self::FinishedAborted => Some(FinishReason::Abort),
            Self::FinishedPreempted => Some(FinishReason::Preempted),
            Self::Waiting | Self::Running | Self::Swapped => None,
        }
    }

    /// Whether the scheduler may move a sequence from `self` to `to`.
    pub fn can_transition_to(&self, to: SequenceStatus) -> bool {
        use SequenceStatus::*;

        match (*self, to) {
            (Waiting, Running) | (Running, Swapped) | (Swapped, Running) | (Running, Waiting) => {
                true
            }
            (Running, to) => to.is_finished(),
            (Waiting | Swapped, FinishedAborted | FinishedIgnored | FinishedPreempted) => true,
            _ => false,
        }
    }

    /// Get the status name as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Running => "Running",
            Self::Swapped => "Swapped",
            Self::FinishedStopped => "FinishedStopped",
            Self::FinishedLengthCapped => "FinishedLengthCapped",
            Self::FinishedAborted => "FinishedAborted",
            Self::FinishedIgnored => "FinishedIgnored",
            Self::FinishedPreempted => "FinishedPreempted",
        }
    }
}

/// Reason for sequence completion, as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Abort,
    Preempted,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::Abort => "abort",
            Self::Preempted => "preempted",
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prompt and generated tokens of one sequence.
///
/// The prompt is fixed at construction; the output only grows, one token
/// per decode step.
///
/// # Example
///
/// ```
/// use paged_seq::core::sequence::SequenceData;
///
/// let mut data = SequenceData::new(vec![1, 2, 3]).unwrap();
/// assert_eq!(data.get_last_token_id().unwrap(), 3);
///
/// data.append_token_id(42);
/// assert_eq!(data.get_len(), 4);
/// assert_eq!(data.get_last_token_id().unwrap(), 42);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceData {
    prompt_token_ids: Vec<TokenId>,
    output_token_ids: Vec<TokenId>,
}

impl SequenceData {
    /// Create sequence data from a prompt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySequence`] if the prompt is empty.
    pub fn new(prompt_token_ids: Vec<TokenId>) -> Result<Self> {
        if prompt_token_ids.is_empty() {
            return Err(Error::EmptySequence);
        }
        Ok(Self {
            prompt_token_ids,
            output_token_ids: Vec::new(),
        })
    }

    /// Append a generated token.
    pub fn append_token_id(&mut self, token_id: TokenId) {
        self.output_token_ids.push(token_id);
    }

    /// Total length (prompt + output).
    pub fn get_len(&self) -> usize {
        self.prompt_token_ids.len() + self.output_token_ids.len()
    }

    /// Get the prompt length.
    pub fn get_prompt_len(&self) -> usize {
        self.prompt_token_ids.len()
    }

    /// Get the output length.
    pub fn get_output_len(&self) -> usize {
        self.output_token_ids.len()
    }

    /// Get the prompt token IDs.
    pub fn get_prompt_token_ids(&self) -> &[TokenId] {
        &self.prompt_token_ids
    }

    /// Get the generated token IDs.
    pub fn get_output_token_ids(&self) -> &[TokenId] {
        &self.output_token_ids
    }

    /// All token IDs (prompt followed by output).
    pub fn get_token_ids(&self) -> Vec<TokenId> {
        let mut tokens = self.prompt_token_ids.clone();
        tokens.extend(&self.output_token_ids);
        tokens
    }

    /// Most recent token: last output token, or last prompt token before any
    /// output exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySequence`] if both buffers are empty.
    pub fn get_last_token_id(&self) -> Result<TokenId> {
        self.output_token_ids
            .last()
            .or_else(|| self.prompt_token_ids.last())
            .copied()
            .ok_or(Error::EmptySequence)
    }
}

/// When a sequence should stop generating.
///
/// Evaluated by the stop checker, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoppingCriteria {
    /// Tokens that end generation.
    pub stop_token_ids: Vec<TokenId>,
    /// Output length cap.
    pub max_tokens: usize,
    /// Keep generating past the EOS token.
    pub ignore_eos: bool,
}

/// A single generation stream tracked by the engine.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use paged_seq::config::{CacheConfig, SamplingParams};
/// use paged_seq::core::sequence::{Sequence, SequenceStatus};
///
/// let config = CacheConfig::new(4, 32);
/// let mut seq = Sequence::new(1, "req-1", vec![1, 2, 3, 4, 5], &config,
///     Arc::new(SamplingParams::Greedy)).unwrap();
/// assert_eq!(seq.status(), SequenceStatus::Waiting);
/// assert_eq!(seq.num_prompt_blocks(), 2);
///
/// seq.append_token_id(6);
/// assert_eq!(seq.get_len(), 6);
/// assert!(!seq.is_finished());
/// ```
#[derive(Debug)]
pub struct Sequence {
    seq_id: SequenceId,
    request_id: String,
    /// Prompt text, if the caller kept it.
    prompt: String,
    data: SequenceData,
    status: SequenceStatus,
    /// Seconds, in whatever clock the scheduler uses.
    arrival_time: f64,
    block_size: usize,
    vocab_size: usize,
    /// Per-token output counts, created on first request.
    output_bin_count: Option<Tensor>,
    stopping: StoppingCriteria,
    sampling_params: Arc<SamplingParams>,
    sampling_type: SamplingType,
}

impl Sequence {
    /// Create a new sequence in `Waiting` status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySequence`] for an empty prompt and
    /// [`Error::Config`] for an invalid cache configuration.
    pub fn new(
        seq_id: SequenceId,
        request_id: impl Into<String>,
        prompt_token_ids: Vec<TokenId>,
        config: &CacheConfig,
        sampling_params: Arc<SamplingParams>,
    ) -> Result<Self> {
        config.validate()?;
        let data = SequenceData::new(prompt_token_ids)?;
        let sampling_type = sampling_params.sampling_type();

        Ok(Self {
            seq_id,
            request_id: request_id.into(),
            prompt: String::new(),
            data,
            status: SequenceStatus::Waiting,
            arrival_time: unix_time_secs(),
            block_size: config.block_size,
            vocab_size: config.vocab_size,
            output_bin_count: None,
            stopping: StoppingCriteria::default(),
            sampling_params,
            sampling_type,
        })
    }

    /// Attach the prompt text.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the stopping configuration.
    pub fn with_stopping(mut self, stopping: StoppingCriteria) -> Self {
        self.stopping = stopping;
        self
    }

    /// Set the arrival time (seconds) reported by the scheduler.
    ///
    /// Defaults to the wall-clock time at construction.
    pub fn with_arrival_time(mut self, arrival_time: f64) -> Self {
        self.arrival_time = arrival_time;
        self
    }

    // ========== Getters ==========

    /// Get the sequence ID.
    pub fn seq_id(&self) -> SequenceId {
        self.seq_id
    }

    /// Get the ID of the request this sequence belongs to.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Get the prompt text (empty if not provided).
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Get the token data.
    pub fn data(&self) -> &SequenceData {
        &self.data
    }

    /// Get the current status.
    pub fn status(&self) -> SequenceStatus {
        self.status
    }

    /// Get the arrival time in seconds.
    pub fn arrival_time(&self) -> f64 {
        self.arrival_time
    }

    /// Get the block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Get the vocabulary size.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Get the stopping configuration.
    pub fn stopping(&self) -> &StoppingCriteria {
        &self.stopping
    }

    /// Get the stop token IDs.
    pub fn stop_token_ids(&self) -> &[TokenId] {
        &self.stopping.stop_token_ids
    }

    /// Get the output length cap.
    pub fn max_tokens(&self) -> usize {
        self.stopping.max_tokens
    }

    /// Whether EOS is ignored when checking for stop.
    pub fn ignore_eos(&self) -> bool {
        self.stopping.ignore_eos
    }

    /// Get the sampling configuration.
    pub fn sampling_params(&self) -> &Arc<SamplingParams> {
        &self.sampling_params
    }

    /// Get the sampling discriminator.
    pub fn sampling_type(&self) -> SamplingType {
        self.sampling_type
    }

    // ========== Token operations ==========

    /// Append a generated token.
    pub fn append_token_id(&mut self, token_id: TokenId) {
        self.data.append_token_id(token_id);
    }

    /// Get the total length (prompt + output).
    pub fn get_len(&self) -> usize {
        self.data.get_len()
    }

    /// Get the prompt length.
    pub fn get_prompt_len(&self) -> usize {
        self.data.get_prompt_len()
    }

    /// Get the output length.
    pub fn get_output_len(&self) -> usize {
        self.data.get_output_len()
    }

    /// Get the most recent token.
    pub fn get_last_token_id(&self) -> Result<TokenId> {
        self.data.get_last_token_id()
    }

    /// Blocks needed to hold the prompt.
    pub fn num_prompt_blocks(&self) -> usize {
        compute_num_blocks(self.get_prompt_len(), self.block_size)
    }

    /// Blocks needed to hold the whole sequence.
    pub fn get_num_blocks(&self) -> usize {
        compute_num_blocks(self.get_len(), self.block_size)
    }

    // ========== Status ==========

    /// Check if the sequence is finished.
    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Get the finish reason (if finished).
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.status.finish_reason()
    }

    /// Move to a new status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the lifecycle does not
    /// allow the move; the status is left unchanged.
    pub fn set_status(&mut self, status: SequenceStatus) -> Result<()> {
        if !self.status.can_transition_to(status) {
            return Err(Error::InvalidStateTransition {
                from: self.status.as_str(),
                to: status.as_str(),
            });
        }
        tracing::debug!(
            seq_id = self.seq_id,
            from = self.status.as_str(),
            to = status.as_str(),
            "sequence status change"
        );
        self.status = status;
        Ok(())
    }

    // ========== Counter buffer ==========

    /// The output counter buffer, if it has been created.
    pub fn output_bin_count(&self) -> Option<&Tensor> {
        self.output_bin_count.as_ref()
    }

    /// Create the `[vocab_size]` output counter buffer on `device` if it
    /// does not exist yet, and return it.
    ///
    /// Later calls return the existing buffer regardless of `device`.
    pub fn init_output_bin_count(&mut self, device: &Device) -> Result<&Tensor> {
        let counts = match self.output_bin_count.take() {
            Some(counts) => counts,
            None => Tensor::zeros(self.vocab_size, DType::U32, device)?,
        };
        Ok(&*self.output_bin_count.insert(counts))
    }

    // ========== Per-step view ==========

    /// Build this step's metadata, borrowing the sequence's data and
    /// sampling configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the table was laid out for a different
    /// block size than this sequence uses.
    pub fn metadata(
        &self,
        is_prompt: bool,
        block_table: &BlockTable,
    ) -> Result<SequenceMetadata<'_>> {
        if block_table.block_size() != self.block_size {
            return Err(Error::Config(format!(
                "block table uses block size {}, sequence {} uses {}",
                block_table.block_size(),
                self.seq_id,
                self.block_size
            )));
        }
        Ok(SequenceMetadata::new(
            self.request_id.clone(),
            self.seq_id,
            is_prompt,
            &self.data,
            &self.sampling_params,
            block_table.as_slice().to_vec(),
            self.sampling_type,
        ))
    }
}

fn unix_time_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.seq_id == other.seq_id
    }
}

impl Eq for Sequence {}

impl std::hash::Hash for Sequence {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.seq_id.hash(state);
    }
}
