// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::future::Future;
use std::time::Duration;

use tl_relay_config::RetryConfig;
use tl_relay_utils::probe;
use tl_relay_utils::retry::ConstantWithMaxRetryCount;

use crate::ledger::LedgerError;

/// Retries ledger calls that failed on the transport.
///
/// Anything but [`LedgerError::Transport`] is returned right away.
#[derive(Debug, Clone, Copy)]
pub struct LedgerRetry {
    interval: Duration,
    max_retries: usize,
}

impl LedgerRetry {
    /// Retry up to `max_retries` times, waiting `interval` in between.
    pub fn new(interval: Duration, max_retries: usize) -> Self {
        Self {
            interval,
            max_retries,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    /// Runs `operation` until it succeeds, fails for good or the retries
    /// are used up, in which case the last error is returned.
    pub async fn call<T, F, Fut>(
        &self,
        name: &'static str,
        mut operation: F,
    ) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let backoff =
            ConstantWithMaxRetryCount::new(self.interval, self.max_retries);
        backoff::future::retry_notify(
            backoff,
            || {
                let attempt = operation();
                async move {
                    attempt.await.map_err(|e| {
                        if e.is_transient() {
                            backoff::Error::transient(e)
                        } else {
                            backoff::Error::permanent(e)
                        }
                    })
                }
            },
            |e: LedgerError, after: Duration| {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::WARN,
                    kind = %probe::Kind::Retry,
                    operation = name,
                    error = %e,
                    after = ?after,
                );
            },
        )
        .await
    }
}

impl Default for LedgerRetry {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for LedgerRetry {
    fn from(config: &RetryConfig) -> Self {
        Self::new(Duration::from_millis(config.interval_ms), config.max_retries)
    }
}
