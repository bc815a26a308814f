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

//! The ledger seam of the delegate.
//!
//! Every read and write the delegate performs against the chain goes through
//! [`IdentityLedger`], nothing is cached on this side of the seam.

use ethers::types::{Address, Bytes, TxHash, U256};
use serde::Serialize;

use crate::meta_transaction::MetaTransaction;

/// Errors reported by a ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The node could not be reached or did not answer.
    #[error("ledger unreachable: {0}")]
    Transport(String),
    /// The node refused the request, e.g. insufficient funds of the relay
    /// account or a stale relay nonce.
    #[error("rejected by the ledger: {0}")]
    Rejected(String),
    /// The contract call reverted.
    #[error("reverted: {0}")]
    Reverted(String),
    /// The transaction did not emit a `ProxyDeployment` event.
    #[error("transaction {0:?} did not deploy an identity")]
    MissingDeploymentEvent(TxHash),
    /// The transaction left the pending pool without being included.
    #[error("transaction {0:?} was dropped from the pending pool")]
    Dropped(TxHash),
}

impl LedgerError {
    /// Whether trying again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transport(_))
    }
}

/// Inclusion state of a transaction sent by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    /// The ledger knows nothing about the transaction.
    NotFound,
    /// Waiting in the pending pool.
    Pending,
    /// Included and executed.
    Succeeded,
    /// Included but reverted.
    Failed,
}

/// A `ProxyDeployment` event emitted by an identity proxy factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDeployment {
    /// Owner of the new identity.
    pub owner: Address,
    /// Address of the new identity proxy.
    pub identity: Address,
    /// Implementation the proxy delegates to.
    pub implementation: Address,
}

/// Read and write access to the identity contracts, the proxy factories and
/// the relay account.
#[async_trait::async_trait]
pub trait IdentityLedger: Send + Sync {
    /// The funded account that sends every transaction.
    fn relay_address(&self) -> Address;

    /// Registered owner of an identity contract.
    async fn identity_owner(
        &self,
        identity: Address,
    ) -> Result<Address, LedgerError>;

    /// Nonce of the last meta-transaction the identity executed, as of the
    /// pending block so transactions still in the pool count.
    async fn identity_last_nonce(
        &self,
        identity: Address,
    ) -> Result<U256, LedgerError>;

    /// Whether `factory` emitted a deployment of `identity`, searching from
    /// block `from_block` on.
    async fn is_deployed_by(
        &self,
        factory: Address,
        from_block: u64,
        identity: Address,
    ) -> Result<bool, LedgerError>;

    /// Transaction count of the relay account, pending pool included.
    async fn pending_relay_nonce(&self) -> Result<U256, LedgerError>;

    /// Sends `executeTransaction` of the identity with the relay nonce
    /// `relay_nonce`, after making sure the call does not revert on top of
    /// the pending block.
    async fn submit_meta_transaction(
        &self,
        meta_transaction: &MetaTransaction,
        relay_nonce: U256,
    ) -> Result<TxHash, LedgerError>;

    /// Sends `deployProxy` of the factory with the relay nonce `relay_nonce`.
    async fn broadcast_identity_deployment(
        &self,
        factory: Address,
        implementation: Address,
        signature: &Bytes,
        relay_nonce: U256,
    ) -> Result<TxHash, LedgerError>;

    /// Waits for the deployment transaction and reads its deployment event.
    async fn deployed_identity(
        &self,
        factory: Address,
        tx_hash: TxHash,
    ) -> Result<IdentityDeployment, LedgerError>;

    /// Where the transaction currently is.
    async fn transaction_status(
        &self,
        tx_hash: TxHash,
    ) -> Result<TxStatus, LedgerError>;
}
