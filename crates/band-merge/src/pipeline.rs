//! Run orchestration.
//!
//! A run moves through `Idle → Locating → FetchingLoop → (Validating →
//! Assembling)* → Encoding` and ends in `Complete`, `PartialSuccess` or
//! `Failed`. Objects are fetched concurrently but handed to validation in
//! locator order, so the first band that decodes becomes the reference.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use merge_common::Grid;
use storage::BlobStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::assembler::MergedRaster;
use crate::config::{ParameterSelector, RunConfig, RunRequest};
use crate::decoder::{Grib2GridDecoder, GridDecoder};
use crate::encoder::OutputEncoder;
use crate::error::{MergeError, Result};
use crate::fetcher::{BandFetcher, FetchOutcome};
use crate::locator::{enumerate, ObjectKey};
use crate::validator::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Locating,
    FetchingLoop,
    Validating,
    Assembling,
    Encoding,
    Complete,
    PartialSuccess,
    Failed,
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Complete,
    PartialSuccess,
    Failed,
}

impl RunStatus {
    /// Process exit code: 0 complete, 2 partial, 1 failed.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Complete => 0,
            RunStatus::PartialSuccess => 2,
            RunStatus::Failed => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Complete => "complete",
            RunStatus::PartialSuccess => "partial-success",
            RunStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened to one object key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    /// Became band `band` (1-based) of the raster
    Assembled { band: usize, attempts: u32 },
    NotFound,
    FetchExhausted { attempts: u32, error: String },
    MalformedInput { reason: String },
    /// Decoded but refused by the validator or assembler; fails the run
    Rejected { reason: String },
    /// The run ended before this key was reached
    NotAttempted,
}

impl KeyOutcome {
    pub fn is_assembled(&self) -> bool {
        matches!(self, KeyOutcome::Assembled { .. })
    }
}

impl fmt::Display for KeyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyOutcome::Assembled { band, attempts } => {
                write!(f, "assembled as band {} ({} attempt(s))", band, attempts)
            }
            KeyOutcome::NotFound => f.write_str("not found"),
            KeyOutcome::FetchExhausted { attempts, error } => {
                write!(f, "fetch failed after {} attempt(s): {}", attempts, error)
            }
            KeyOutcome::MalformedInput { reason } => write!(f, "malformed: {}", reason),
            KeyOutcome::Rejected { reason } => write!(f, "rejected: {}", reason),
            KeyOutcome::NotAttempted => f.write_str("not attempted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyReport {
    pub key: ObjectKey,
    pub outcome: KeyOutcome,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct RunResult {
    pub status: RunStatus,
    pub raster: Option<MergedRaster>,
    /// One entry per located key, in locator order
    pub outcomes: Vec<KeyReport>,
    pub artifact: Option<PathBuf>,
    /// Why the run failed
    pub error: Option<MergeError>,
}

impl RunResult {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    pub fn assembled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|r| r.outcome.is_assembled())
            .count()
    }

    /// Keys that did not become a band.
    pub fn missing(&self) -> impl Iterator<Item = &KeyReport> {
        self.outcomes.iter().filter(|r| !r.outcome.is_assembled())
    }
}

type Decoded = std::result::Result<(Grid, u32), KeyOutcome>;

/// Drives one run from request to artifact.
pub struct Pipeline {
    fetcher: BandFetcher,
    decoder: Arc<dyn GridDecoder>,
    encoder: OutputEncoder,
    max_concurrent_fetches: usize,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(store: Arc<dyn BlobStore>, config: &RunConfig) -> Self {
        Self {
            fetcher: BandFetcher::new(store, config.retry.clone())
                .with_download_dir(config.download_dir.clone()),
            decoder: Arc::new(Grib2GridDecoder::default()),
            encoder: OutputEncoder::new(config.output.format).with_verify(config.output.verify),
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn GridDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the run when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[instrument(
        skip_all,
        fields(
            dataset = %request.dataset(),
            date = %request.date(),
            step = %request.time_step(),
            selector = %request.selector()
        )
    )]
    pub async fn run(&self, request: &RunRequest, destination: &Path) -> RunResult {
        let mut state = RunState::Idle;

        transition(&mut state, RunState::Locating);
        let keys = match enumerate(request) {
            Ok(keys) => keys,
            Err(e) => return failed(&mut state, Vec::new(), None, e),
        };
        info!(keys = keys.len(), "Located source objects");

        let mut outcomes: Vec<KeyReport> = keys
            .iter()
            .map(|key| KeyReport {
                key: key.clone(),
                outcome: KeyOutcome::NotAttempted,
            })
            .collect();

        transition(&mut state, RunState::FetchingLoop);
        let raster = match self
            .fetch_loop(&mut state, keys, request.selector(), &mut outcomes)
            .await
        {
            Ok(raster) => raster,
            Err(e) => return failed(&mut state, outcomes, None, e),
        };

        if raster.is_empty() {
            let expected = outcomes.len();
            return failed(&mut state, outcomes, None, MergeError::NoBands { expected });
        }
        if self.cancel.is_cancelled() {
            return failed(&mut state, outcomes, Some(raster), MergeError::Cancelled);
        }

        transition(&mut state, RunState::Encoding);
        let encoder = self.encoder;
        let cancel = self.cancel.clone();
        let dest = destination.to_path_buf();
        let encoded = tokio::task::spawn_blocking(move || {
            let result = encoder.encode(&raster, &dest, &cancel);
            (raster, result)
        })
        .await;

        let (raster, artifact) = match encoded {
            Ok((raster, Ok(path))) => (raster, path),
            Ok((raster, Err(e))) => return failed(&mut state, outcomes, Some(raster), e),
            Err(e) => {
                return failed(
                    &mut state,
                    outcomes,
                    None,
                    MergeError::Encode(format!("encoder task failed: {}", e)),
                )
            }
        };

        let (status, next) = if raster.len() == outcomes.len() {
            (RunStatus::Complete, RunState::Complete)
        } else {
            (RunStatus::PartialSuccess, RunState::PartialSuccess)
        };
        transition(&mut state, next);

        let result = RunResult {
            status,
            raster: Some(raster),
            outcomes,
            artifact: Some(artifact),
            error: None,
        };
        info!(
            status = %result.status,
            bands = result.assembled(),
            expected = result.outcomes.len(),
            "Run finished"
        );
        result
    }

    /// Fetch, decode, validate and assemble every key in order.
    ///
    /// Per-object failures are recorded in `outcomes`; a mismatch, a
    /// duplicate or cancellation ends the loop with an error.
    async fn fetch_loop(
        &self,
        state: &mut RunState,
        keys: Vec<ObjectKey>,
        selector: &ParameterSelector,
        outcomes: &mut [KeyReport],
    ) -> Result<MergedRaster> {
        let fetches = futures::stream::iter(keys)
            .map(move |key| self.fetch_and_decode(key, selector))
            .buffered(self.max_concurrent_fetches);
        futures::pin_mut!(fetches);

        let mut raster = MergedRaster::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    warn!("Run cancelled while fetching");
                    return Err(MergeError::Cancelled);
                }
                next = fetches.next() => next,
            };
            let Some((index, decoded)) = next else {
                break;
            };

            let (grid, attempts) = match decoded {
                Ok(decoded) => decoded,
                Err(outcome) => {
                    outcomes[index].outcome = outcome;
                    continue;
                }
            };

            transition(state, RunState::Validating);
            let grid = match validate(grid, raster.reference()) {
                Ok(grid) => grid,
                Err(mismatch) => {
                    outcomes[index].outcome = KeyOutcome::Rejected {
                        reason: mismatch.to_string(),
                    };
                    return Err(mismatch.into());
                }
            };

            transition(state, RunState::Assembling);
            raster = match raster.append(grid) {
                Ok(raster) => raster,
                Err(e) => {
                    outcomes[index].outcome = KeyOutcome::Rejected {
                        reason: e.to_string(),
                    };
                    return Err(e);
                }
            };
            outcomes[index].outcome = KeyOutcome::Assembled {
                band: raster.len(),
                attempts,
            };
            transition(state, RunState::FetchingLoop);
        }

        Ok(raster)
    }

    async fn fetch_and_decode(
        &self,
        key: ObjectKey,
        selector: &ParameterSelector,
    ) -> (usize, Decoded) {
        let index = key.index;
        let (bytes, attempts) = match self.fetcher.fetch(&key).await {
            FetchOutcome::Fetched { bytes, attempts } => (bytes, attempts),
            FetchOutcome::NotFound { .. } => {
                info!(key = %key, "Missing time step");
                return (index, Err(KeyOutcome::NotFound));
            }
            FetchOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                warn!(key = %key, attempts, error = %last_error, "Treating unreachable object as missing");
                return (
                    index,
                    Err(KeyOutcome::FetchExhausted {
                        attempts,
                        error: last_error,
                    }),
                );
            }
        };

        let decoder = Arc::clone(&self.decoder);
        let selector = selector.clone();
        let decoded = tokio::task::spawn_blocking(move || {
            decoder.decode(&key, bytes, &selector)
        })
        .await;

        let outcome = match decoded {
            Ok(Ok(grid)) => Ok((grid, attempts)),
            Ok(Err(malformed)) => {
                warn!(key = %malformed.key, reason = %malformed.reason, "Skipping malformed object");
                Err(KeyOutcome::MalformedInput {
                    reason: malformed.reason,
                })
            }
            Err(e) => Err(KeyOutcome::MalformedInput {
                reason: format!("decoder task failed: {}", e),
            }),
        };
        (index, outcome)
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug!(from = ?*state, to = ?next, "Run state");
    *state = next;
}

fn failed(
    state: &mut RunState,
    outcomes: Vec<KeyReport>,
    raster: Option<MergedRaster>,
    error: MergeError,
) -> RunResult {
    transition(state, RunState::Failed);
    error!(error = %error, "Run failed");
    RunResult {
        status: RunStatus::Failed,
        raster,
        outcomes,
        artifact: None,
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(RunStatus::Complete.exit_code(), 0);
        assert_eq!(RunStatus::PartialSuccess.exit_code(), 2);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(KeyOutcome::NotFound.to_string(), "not found");
        assert_eq!(
            KeyOutcome::Assembled {
                band: 3,
                attempts: 1
            }
            .to_string(),
            "assembled as band 3 (1 attempt(s))"
        );
        assert!(!KeyOutcome::NotAttempted.is_assembled());
    }
}
