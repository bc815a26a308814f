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

//! # Relay Utilities
//!
//! Errors, probe targets and retry helpers shared by every crate of the relay.

use ethers::types::Address;

/// Probe targets for structured tracing events.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered while
/// bootstrapping and running the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Elliptic Curve error.
    #[error(transparent)]
    EllipticCurve(#[from] ethers::core::k256::elliptic_curve::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Missing the relay account private key in the config.
    #[error("Missing required private-key in the config")]
    MissingSecrets,
    /// The node we are connected to serves a different chain.
    #[error("Chain id mismatch: configured {configured} but the node reports {reported}")]
    ChainIdMismatch {
        /// Chain id from the configuration.
        configured: u64,
        /// Chain id reported by the node.
        reported: u64,
    },
    /// The same identity proxy factory was configured more than once
    /// with different deployment blocks.
    #[error("Conflicting configuration for identity proxy factory {:?}", _0)]
    ConflictingFactory(Address),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
}

/// A type alias for the result for the relay, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;
