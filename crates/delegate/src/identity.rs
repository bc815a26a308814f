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

use std::sync::Arc;

use ethers::types::{Address, Bytes};
use tl_relay_config::ProxyFactoryConfig;
use tl_relay_utils::probe;

use crate::account::RelayAccount;
use crate::error::{DelegateError, SignatureFailure};
use crate::ledger::{IdentityDeployment, IdentityLedger, LedgerError};
use crate::meta_transaction::deployment_authorization_hash;
use crate::retry::LedgerRetry;
use crate::signature::SignatureVerifier;

/// An identity proxy factory the relay trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedFactory {
    /// Address of the factory.
    pub address: Address,
    /// Block the factory was deployed at, deployments are not searched
    /// before it.
    pub deployed_at: u64,
}

impl From<&ProxyFactoryConfig> for TrustedFactory {
    fn from(config: &ProxyFactoryConfig) -> Self {
        Self {
            address: config.address,
            deployed_at: config.deployed_at,
        }
    }
}

/// Knows which identity contracts came out of trusted factories, and
/// deploys new ones.
pub struct IdentityRegistry<L> {
    ledger: Arc<L>,
    retry: LedgerRetry,
    factories: Vec<TrustedFactory>,
}

impl<L: IdentityLedger> IdentityRegistry<L> {
    /// Creates the registry.
    pub fn new(
        ledger: Arc<L>,
        retry: LedgerRetry,
        factories: Vec<TrustedFactory>,
    ) -> Self {
        Self {
            ledger,
            retry,
            factories,
        }
    }

    /// The trusted factories.
    pub fn trusted_factories(&self) -> &[TrustedFactory] {
        &self.factories
    }

    /// Looks up a trusted factory by address.
    pub fn trusted_factory(&self, address: Address) -> Option<&TrustedFactory> {
        self.factories.iter().find(|f| f.address == address)
    }

    /// Whether one of the trusted factories deployed `identity`.
    pub async fn is_trusted_identity(
        &self,
        identity: Address,
    ) -> Result<bool, LedgerError> {
        for factory in &self.factories {
            let deployed = self
                .retry
                .call("is_deployed_by", move || {
                    self.ledger.is_deployed_by(
                        factory.address,
                        factory.deployed_at,
                        identity,
                    )
                })
                .await?;
            if deployed {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Deploys an identity proxy for `implementation` through `factory`,
    /// authorized by `owner_signature`.
    ///
    /// Nothing is sent when the factory is not trusted or the signature is
    /// malformed.
    pub async fn deploy_identity(
        &self,
        account: &RelayAccount<L>,
        factory: Address,
        implementation: Address,
        owner_signature: &Bytes,
    ) -> Result<IdentityDeployment, DelegateError> {
        if self.trusted_factory(factory).is_none() {
            return Err(DelegateError::InvalidIdentityContract(factory));
        }
        let hash = deployment_authorization_hash(factory, implementation);
        let owner = SignatureVerifier::recover(hash, owner_signature)
            .ok_or(SignatureFailure::Malformed)?;

        let tx_hash = account
            .broadcast_identity_deployment(
                factory,
                implementation,
                owner_signature,
            )
            .await?;
        // the receipt is awaited outside of the account lock.
        let deployment = self
            .retry
            .call("deployed_identity", move || {
                self.ledger.deployed_identity(factory, tx_hash)
            })
            .await?;
        if deployment.owner != owner {
            tracing::warn!(
                expected = ?owner,
                actual = ?deployment.owner,
                "Factory registered a different owner than the signer",
            );
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::IdentityDeployment,
            factory = ?factory,
            identity = ?deployment.identity,
            owner = ?deployment.owner,
            ?tx_hash,
        );
        Ok(deployment)
    }
}
