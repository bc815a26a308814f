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

//! # Relay Configuration Module
//!
//! A module for configuring the relay.
//!
//! ## Overview
//!
//! Possible configuration include:
//! * `port`: The port the relay API will listen on. Defaults to 5000
//! * `chain`: The EVM chain the relay submits to, and the relay account on it.
//! * `delegate`: The trusted identity proxy factories, the accepted
//!   delegation fees and the retry policy for ledger calls.

/// CLI configuration
#[cfg(feature = "cli")]
pub mod cli;
/// Default values for the configuration.
pub mod defaults;
/// Utils for processing configuration
pub mod utils;

use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use tl_relay_types::{private_key::PrivateKey, rpc_url::RpcUrl};

/// RelayConfig is the configuration for the trustlines relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayConfig {
    /// The chain the relay submits transactions to.
    pub chain: EvmChainConfig,
    /// Configuration of the meta-transaction delegate.
    #[serde(default)]
    pub delegate: DelegateConfig,
}

impl RelayConfig {
    /// Makes sure that the config is usable for submitting transactions.
    pub fn verify(&self) -> tl_relay_utils::Result<()> {
        self.chain
            .private_key
            .as_ref()
            .map(|_| ())
            .ok_or(tl_relay_utils::Error::MissingSecrets)
    }
}

/// EvmChainConfig is the configuration for the EVM based network.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvmChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// Http(s) Endpoint of the node.
    #[serde(skip_serializing)]
    pub http_endpoint: RpcUrl,
    /// Block Explorer for this chain.
    ///
    /// Optional, and only used for printing links to transactions.
    #[serde(skip_serializing)]
    pub explorer: Option<url::Url>,
    /// chain specific id (output of chainId opcode on EVM networks)
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u64,
    /// The private key of the funded relay account on this network.
    ///
    /// 1. if it starts with '0x' then this would be raw (32 bytes) hex encoded
    ///    private key.
    /// 2. if it starts with '$' then it would be considered as an Enviroment variable
    ///    of a hex-encoded private key.
    ///   Example: $RELAY_PRIVATE_KEY
    #[serde(skip_serializing)]
    pub private_key: Option<PrivateKey>,
    /// Largest block range of a single `eth_getLogs` request.
    ///
    /// Public nodes cap the range, defaults to 5000.
    #[serde(
        default = "defaults::max_log_block_range",
        rename(serialize = "maxLogBlockRange")
    )]
    pub max_log_block_range: u64,
}

/// DelegateConfig configures the validation and submission of meta-transactions.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DelegateConfig {
    /// Factories whose deployed proxies are trusted as identity contracts.
    #[serde(default, rename(serialize = "identityProxyFactories"))]
    pub identity_proxy_factories: Vec<ProxyFactoryConfig>,
    /// Ordered list of accepted delegation fees.
    #[serde(default)]
    pub fees: Vec<DelegationFeesConfig>,
    /// Retry policy for transient ledger failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// A trusted identity proxy factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProxyFactoryConfig {
    /// The address of the factory contract.
    pub address: Address,
    /// the block number where this factory got deployed at.
    ///
    /// Deployment events are only searched from this block on.
    #[serde(default, rename(serialize = "deployedAt"))]
    pub deployed_at: u64,
}

/// One accepted `(minimum base fee, currency network)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DelegationFeesConfig {
    /// Minimum fee a meta-transaction has to declare.
    #[serde(
        deserialize_with = "utils::deserialize_amount",
        rename(serialize = "baseFee")
    )]
    pub base_fee: U256,
    /// Currency network the fee is paid in.
    #[serde(rename(serialize = "currencyNetworkOfFees"))]
    pub currency_network: Address,
}

/// Bounded retries of ledger calls that failed on the transport.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    /// How many times a failed call is retried.
    #[serde(
        default = "defaults::max_retries",
        rename(serialize = "maxRetries")
    )]
    pub max_retries: usize,
    /// Milliseconds to wait between two attempts.
    #[serde(
        default = "defaults::retry_interval_ms",
        rename(serialize = "intervalMs")
    )]
    pub interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            interval_ms: defaults::retry_interval_ms(),
        }
    }
}
