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

use std::time::Duration;

use ethers::providers::{HttpClientError, JsonRpcError, RetryPolicy};

/// Implements [RetryPolicy] for the HTTP transport of the relay: requests
/// that errored with status code 429 i.e. TOO_MANY_REQUESTS, rate limit
/// responses of hosted nodes and dropped connections are retried.
///
/// Infura often fails with a `"header not found"` rpc error which is apparently linked to load
/// balancing, which are retried as well.
#[derive(Debug)]
pub struct RelayHttpRetryPolicy {
    err_regex: regex::Regex,
}

impl RelayHttpRetryPolicy {
    /// Creates the policy.
    pub fn new() -> tl_relay_utils::Result<Self> {
        let err_regex =
            regex::Regex::new(r"(?mixU)\b(?:rate|limit|429|Too \s Many \s Requests)\b")
                .map_err(|_| {
                    tl_relay_utils::Error::Generic("invalid retry regex")
                })?;
        Ok(Self { err_regex })
    }

    /// Creates the policy, boxed for [`ethers::providers::RetryClientBuilder`].
    pub fn boxed() -> tl_relay_utils::Result<Box<Self>> {
        Self::new().map(Box::new)
    }

    fn should_retry_response_text(&self, text: &str) -> bool {
        // some providers send invalid JSON RPC in the error case (no `id:u64`), but the
        // text should be a `JsonRpcError`
        #[derive(serde::Deserialize)]
        struct Resp {
            error: JsonRpcError,
        }

        if let Ok(resp) = serde_json::from_str::<Resp>(text) {
            return should_retry_json_rpc_error(&resp.error);
        }

        // last resort, the text itself is not a valid json response either.
        let err_text = text.to_lowercase();
        let should_retry = self.err_regex.is_match(&err_text);
        tracing::event!(
            target: tl_relay_utils::probe::TARGET,
            tracing::Level::DEBUG,
            kind = %tl_relay_utils::probe::Kind::Retry,
            should_retry = should_retry,
            error = %err_text,
        );
        should_retry
    }
}

fn should_retry_json_rpc_error(err: &JsonRpcError) -> bool {
    let JsonRpcError { code, message, .. } = err;
    // alchemy throws it this way
    if *code == 429 {
        return true;
    }

    // This is an infura error code for `exceeded project rate limit`
    if *code == -32005 {
        return true;
    }

    // alternative alchemy error for specific IPs
    if *code == -32016 && message.contains("rate limit") {
        return true;
    }

    matches!(
        message.as_str(),
        "header not found"
            | "daily request count exceeded, request rate limited"
    )
}

impl RetryPolicy<HttpClientError> for RelayHttpRetryPolicy {
    fn should_retry(&self, error: &HttpClientError) -> bool {
        tracing::debug!("should_retry: {:?}", error);
        match error {
            HttpClientError::ReqwestError(err) => {
                err.status() == Some(http::StatusCode::TOO_MANY_REQUESTS)
                    || err.is_timeout()
                    || err.is_connect()
            }
            HttpClientError::JsonRpcError(err) => {
                should_retry_json_rpc_error(err)
            }
            HttpClientError::SerdeJson { text, .. } => {
                self.should_retry_response_text(text)
            }
        }
    }

    fn backoff_hint(&self, error: &HttpClientError) -> Option<Duration> {
        const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

        if let HttpClientError::JsonRpcError(JsonRpcError {
            data: Some(data),
            ..
        }) = error
        {
            // if daily rate limit exceeded, infura returns the requested backoff in the error
            // response
            let backoff_seconds =
                data.get("rate").and_then(|v| v.get("backoff_seconds"));
            if let Some(seconds) = backoff_seconds.and_then(|v| v.as_u64()) {
                return Some(Duration::from_secs(seconds));
            }
            if let Some(seconds) = backoff_seconds.and_then(|v| v.as_f64()) {
                return Some(Duration::from_secs(seconds as u64 + 1));
            }
        }

        Some(DEFAULT_BACKOFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpc_error(code: i64, message: &str) -> HttpClientError {
        HttpClientError::JsonRpcError(JsonRpcError {
            code,
            message: message.to_string(),
            data: None,
        })
    }

    fn serde_error(text: &str) -> HttpClientError {
        let err = serde_json::from_str::<serde_json::Value>("{")
            .expect_err("truncated json");
        HttpClientError::SerdeJson {
            err,
            text: text.to_string(),
        }
    }

    #[test]
    fn retries_rate_limits() {
        let policy = RelayHttpRetryPolicy::new().unwrap();
        assert!(policy.should_retry(&rpc_error(429, "too many")));
        assert!(policy.should_retry(&rpc_error(-32005, "limit")));
        assert!(policy.should_retry(&rpc_error(-32016, "rate limit hit")));
        assert!(policy.should_retry(&rpc_error(-32000, "header not found")));
    }

    #[test]
    fn does_not_retry_reverts() {
        let policy = RelayHttpRetryPolicy::new().unwrap();
        assert!(!policy.should_retry(&rpc_error(-32000, "execution reverted")));
        assert!(!policy.should_retry(&rpc_error(-32000, "nonce too low")));
    }

    #[test]
    fn inspects_invalid_responses() {
        let policy = RelayHttpRetryPolicy::new().unwrap();
        assert!(policy.should_retry(&serde_error(
            r#"{"error":{"code":429,"message":"slow down"}}"#
        )));
        assert!(policy.should_retry(&serde_error("Too Many Requests")));
        assert!(!policy.should_retry(&serde_error("<html>bad gateway</html>")));
    }

    #[test]
    fn honors_backoff_hint() {
        let policy = RelayHttpRetryPolicy::new().unwrap();
        let error = HttpClientError::JsonRpcError(JsonRpcError {
            code: -32005,
            message: "daily request count exceeded".to_string(),
            data: Some(serde_json::json!({ "rate": { "backoff_seconds": 30 } })),
        });
        assert_eq!(policy.backoff_hint(&error), Some(Duration::from_secs(30)));
    }
}
