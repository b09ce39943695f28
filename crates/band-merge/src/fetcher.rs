//! Object fetching with bounded retry.
//!
//! Each key goes through an explicit attempt/backoff loop. Missing objects
//! end the loop at once; transient failures and attempt timeouts are retried
//! with doubling delays up to `max_attempts`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use storage::{BlobStore, StorageError};
use tracing::{debug, instrument, warn};

use crate::config::RetryPolicy;
use crate::locator::ObjectKey;

/// How a fetch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched { bytes: Bytes, attempts: u32 },
    /// The object does not exist; never retried
    NotFound { attempts: u32 },
    /// Every attempt failed
    Exhausted { attempts: u32, last_error: String },
}

impl FetchOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            FetchOutcome::Fetched { attempts, .. }
            | FetchOutcome::NotFound { attempts }
            | FetchOutcome::Exhausted { attempts, .. } => *attempts,
        }
    }
}

enum RetryState {
    Attempt { number: u32, delay: Duration },
    Backoff { next: u32, delay: Duration },
}

/// Fetches objects from a blob store under a retry policy.
#[derive(Clone)]
pub struct BandFetcher {
    store: Arc<dyn BlobStore>,
    policy: RetryPolicy,
    download_dir: Option<PathBuf>,
}

impl BandFetcher {
    pub fn new(store: Arc<dyn BlobStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            download_dir: None,
        }
    }

    /// Keep a copy of every fetched object in `dir`.
    pub fn with_download_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.download_dir = dir;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[instrument(skip(self, key), fields(key = %key.key, index = key.index))]
    pub async fn fetch(&self, key: &ObjectKey) -> FetchOutcome {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = RetryState::Attempt {
            number: 1,
            delay: self.policy.initial_delay,
        };

        loop {
            state = match state {
                RetryState::Attempt { number, delay } => {
                    let error = match tokio::time::timeout(
                        self.policy.attempt_timeout,
                        self.store.get_object(&key.key),
                    )
                    .await
                    {
                        Ok(Ok(bytes)) => {
                            debug!(size = bytes.len(), attempt = number, "Fetched object");
                            self.retain(key, &bytes).await;
                            return FetchOutcome::Fetched {
                                bytes,
                                attempts: number,
                            };
                        }
                        Ok(Err(StorageError::NotFound { .. })) => {
                            debug!(attempt = number, "Object not found");
                            return FetchOutcome::NotFound { attempts: number };
                        }
                        Ok(Err(e @ StorageError::Config(_))) => {
                            return FetchOutcome::Exhausted {
                                attempts: number,
                                last_error: e.to_string(),
                            };
                        }
                        Ok(Err(e)) => e.to_string(),
                        Err(_) => format!(
                            "attempt timed out after {}s",
                            self.policy.attempt_timeout.as_secs_f64()
                        ),
                    };

                    if number >= max_attempts {
                        warn!(
                            error = %error,
                            attempts = number,
                            "Fetch failed, giving up"
                        );
                        return FetchOutcome::Exhausted {
                            attempts: number,
                            last_error: error,
                        };
                    }

                    warn!(
                        error = %error,
                        retry = number,
                        max_retries = max_attempts - 1,
                        delay_secs = delay.as_secs_f64(),
                        "Fetch failed, retrying"
                    );
                    RetryState::Backoff {
                        next: number + 1,
                        delay,
                    }
                }
                RetryState::Backoff { next, delay } => {
                    tokio::time::sleep(delay).await;
                    RetryState::Attempt {
                        number: next,
                        delay: next_delay(delay, self.policy.max_delay),
                    }
                }
            };
        }
    }

    /// Best effort; a failed copy never fails the fetch.
    async fn retain(&self, key: &ObjectKey, bytes: &Bytes) {
        let Some(dir) = &self.download_dir else {
            return;
        };
        let path = dir.join(key.file_name());
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, bytes).await
        }
        .await;

        match result {
            Ok(()) => debug!(path = %path.display(), "Retained download"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to retain download"),
        }
    }
}

/// Doubled delay, capped at `max`.
fn next_delay(delay: Duration, max: Duration) -> Duration {
    std::cmp::min(delay.saturating_mul(2), max)
}
