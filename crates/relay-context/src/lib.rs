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

#![warn(missing_docs)]
//! # Relay Context Module
//!
//! Builds the chain clients and the relay account wallet out of the
//! relay configuration.
use std::convert::TryFrom;
use std::time::Duration;

use ethers::core::k256::SecretKey;
use ethers::prelude::*;

use tl_relay_config::RelayConfig;
use tl_relay_types::{EthersClient, RelaySignerClient};

/// Retry policy of the HTTP transport.
pub mod ethers_retry_policy;

use ethers_retry_policy::RelayHttpRetryPolicy;

/// RelayContext contains the relay configuration and hands out the clients
/// derived from it.
#[derive(Clone)]
pub struct RelayContext {
    /// The configuration of the relay.
    pub config: RelayConfig,
}

impl RelayContext {
    /// Creates a new RelayContext.
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Returns a new provider for the configured chain, which retries
    /// rate limited and dropped requests.
    pub fn evm_provider(&self) -> tl_relay_utils::Result<EthersClient> {
        let chain_config = &self.config.chain;
        let retry = &self.config.delegate.retry;
        let http = Http::new(chain_config.http_endpoint.as_url().clone());
        let client = RetryClientBuilder::default()
            .rate_limit_retries(retry.max_retries as u32)
            .timeout_retries(retry.max_retries as u32)
            .initial_backoff(Duration::from_millis(retry.interval_ms))
            .build(http, RelayHttpRetryPolicy::boxed()?);
        let provider =
            Provider::new(client).interval(Duration::from_millis(500u64));
        Ok(provider)
    }

    /// Sets up and returns the wallet of the relay account.
    pub fn evm_wallet(&self) -> tl_relay_utils::Result<LocalWallet> {
        let chain_config = &self.config.chain;
        let private_key = chain_config
            .private_key
            .as_ref()
            .ok_or(tl_relay_utils::Error::MissingSecrets)?;
        let key = SecretKey::from_bytes(private_key.as_bytes().into())?;
        let wallet = LocalWallet::from(key).with_chain_id(chain_config.chain_id);
        Ok(wallet)
    }

    /// Returns a client that signs transactions as the relay account.
    pub fn evm_client(&self) -> tl_relay_utils::Result<RelaySignerClient> {
        let provider = self.evm_provider()?;
        let wallet = self.evm_wallet()?;
        Ok(SignerMiddleware::new(provider, wallet))
    }

    /// Makes sure the node behind the endpoint serves the configured chain.
    pub async fn verify_chain_id(
        &self,
        provider: &EthersClient,
    ) -> tl_relay_utils::Result<()> {
        let reported = provider.get_chainid().await?.as_u64();
        let configured = self.config.chain.chain_id;
        if reported != configured {
            tracing::error!(
                configured,
                reported,
                endpoint = %self.config.chain.http_endpoint,
                "Node serves a different chain"
            );
            return Err(tl_relay_utils::Error::ChainIdMismatch {
                configured,
                reported,
            });
        }
        Ok(())
    }
}

impl TryFrom<&str> for RelayContext {
    type Error = tl_relay_utils::Error;

    /// Loads the context from a configuration directory.
    fn try_from(config_dir: &str) -> Result<Self, Self::Error> {
        let config = tl_relay_config::utils::load(config_dir)?;
        Ok(Self::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tl_relay_config::{DelegateConfig, EvmChainConfig};

    const KEY: &str =
        "0x8917174396171783496173419137618235192359106130478137647163400318";

    fn config(private_key: Option<&str>) -> RelayConfig {
        RelayConfig {
            chain: EvmChainConfig {
                name: "test".into(),
                http_endpoint: url::Url::parse("http://localhost:8545")
                    .unwrap()
                    .into(),
                explorer: None,
                chain_id: 4660,
                private_key: private_key.map(|k| {
                    serde_json::from_value(serde_json::json!(k)).unwrap()
                }),
                max_log_block_range: 1000,
            },
            delegate: DelegateConfig::default(),
        }
    }

    #[test]
    fn wallet_uses_configured_chain() {
        let ctx = RelayContext::new(config(Some(KEY)));
        let wallet = ctx.evm_wallet().unwrap();
        assert_eq!(wallet.chain_id(), 4660);
        let client = ctx.evm_client().unwrap();
        assert_eq!(client.address(), wallet.address());
    }

    #[test]
    fn wallet_requires_private_key() {
        let ctx = RelayContext::new(config(None));
        assert!(matches!(
            ctx.evm_wallet(),
            Err(tl_relay_utils::Error::MissingSecrets)
        ));
    }
}
