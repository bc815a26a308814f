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

//! Value types shared by the relay configuration and its clients.

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider, RetryClient};
use ethers::signers::LocalWallet;

pub mod private_key;
pub mod rpc_url;

/// Ethers provider over HTTP, that includes a retry strategy.
pub type EthersClient = Provider<RetryClient<Http>>;

/// [`EthersClient`] that signs outgoing transactions with the relay account.
pub type RelaySignerClient = SignerMiddleware<EthersClient, LocalWallet>;

/// Resolves a configuration value that may point to an environment variable.
///
/// Values starting with `$` are read from the environment, anything else is
/// returned as is.
pub(crate) fn resolve_env_reference<E>(value: &str) -> Result<String, E>
where
    E: serde::de::Error,
{
    match value.strip_prefix('$') {
        Some(var) => {
            tracing::trace!("Reading {} from env", var);
            std::env::var(var).map_err(|e| {
                E::custom(format!("error while loading this env {var}: {e}"))
            })
        }
        None => Ok(value.to_string()),
    }
}
