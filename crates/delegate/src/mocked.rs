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

//! An in-memory [`IdentityLedger`] for tests and dry runs.
//!
//! By default it mines every transaction instantly. With
//! [`MockedLedger::pause_mining`] meta-transactions wait in the pending pool
//! until [`MockedLedger::mine`]. Identity contracts check the owner signature
//! and the nonce themselves, the relay account only accepts its exact next
//! nonce, and transient transport faults can be injected.

use std::collections::HashMap;

use ethers::types::{Address, Bytes, TxHash, H256, U256};
use ethers::utils::keccak256;
use tokio::sync::Mutex;

use crate::ledger::{IdentityDeployment, IdentityLedger, LedgerError, TxStatus};
use crate::meta_transaction::{deployment_authorization_hash, MetaTransaction};
use crate::signature::SignatureVerifier;

#[derive(Debug, Clone)]
struct MockedIdentity {
    owner: Address,
    factory: Address,
    /// As of the latest block.
    last_nonce: U256,
    /// As of the pending block.
    pending_nonce: U256,
}

#[derive(Debug, Default)]
struct LedgerState {
    identities: HashMap<Address, MockedIdentity>,
    deployments: HashMap<TxHash, IdentityDeployment>,
    transactions: HashMap<TxHash, TxStatus>,
    relay_nonce: U256,
    broadcasts: usize,
    transient_faults: usize,
    mining_paused: bool,
    pool: Vec<(TxHash, Address, U256)>,
}

impl LedgerState {
    fn transport_fault(&mut self) -> Result<(), LedgerError> {
        if self.transient_faults > 0 {
            self.transient_faults -= 1;
            return Err(LedgerError::Transport("connection reset".into()));
        }
        Ok(())
    }

    fn check_relay_nonce(&self, relay_nonce: U256) -> Result<(), LedgerError> {
        if relay_nonce < self.relay_nonce {
            Err(LedgerError::Rejected("nonce too low".into()))
        } else if relay_nonce > self.relay_nonce {
            Err(LedgerError::Rejected("nonce too high".into()))
        } else {
            Ok(())
        }
    }

    fn include(&mut self, relay: Address, status: TxStatus) -> TxHash {
        let mut buf = relay.as_bytes().to_vec();
        let mut nonce = [0u8; 32];
        self.relay_nonce.to_big_endian(&mut nonce);
        buf.extend_from_slice(&nonce);
        let tx_hash = H256(keccak256(buf));
        self.relay_nonce += U256::one();
        self.broadcasts += 1;
        self.transactions.insert(tx_hash, status);
        tx_hash
    }
}

/// An in-memory chain holding identity contracts and proxy factories.
#[derive(Debug)]
pub struct MockedLedger {
    relay_address: Address,
    chain_id: u64,
    state: Mutex<LedgerState>,
}

impl MockedLedger {
    /// A chain with id `chain_id` where `relay_address` is the funded
    /// relay account.
    pub fn new(relay_address: Address, chain_id: u64) -> Self {
        Self {
            relay_address,
            chain_id,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Lets `factory` create an identity owned by `owner`, as if someone
    /// else paid for the deployment.
    pub async fn create_identity(
        &self,
        factory: Address,
        owner: Address,
    ) -> Address {
        let mut state = self.state.lock().await;
        Self::insert_identity(&mut state, factory, owner)
    }

    /// The next `count` ledger calls fail on the transport.
    pub async fn inject_transient_faults(&self, count: usize) {
        self.state.lock().await.transient_faults = count;
    }

    /// How many transactions the relay account got included.
    pub async fn broadcast_count(&self) -> usize {
        self.state.lock().await.broadcasts
    }

    /// Transaction count of the relay account.
    pub async fn relay_nonce(&self) -> U256 {
        self.state.lock().await.relay_nonce
    }

    /// Keeps meta-transactions in the pending pool until [`Self::mine`].
    pub async fn pause_mining(&self) {
        self.state.lock().await.mining_paused = true;
    }

    /// Includes everything waiting in the pending pool.
    pub async fn mine(&self) {
        let mut state = self.state.lock().await;
        for (tx_hash, identity, nonce) in std::mem::take(&mut state.pool) {
            if let Some(identity) = state.identities.get_mut(&identity) {
                identity.last_nonce = nonce;
            }
            state.transactions.insert(tx_hash, TxStatus::Succeeded);
        }
    }

    /// Nonce of the last meta-transaction the identity executed in a mined
    /// block.
    pub async fn mined_last_nonce(&self, identity: Address) -> Option<U256> {
        let state = self.state.lock().await;
        state.identities.get(&identity).map(|i| i.last_nonce)
    }

    fn insert_identity(
        state: &mut LedgerState,
        factory: Address,
        owner: Address,
    ) -> Address {
        let mut buf = factory.as_bytes().to_vec();
        buf.extend_from_slice(owner.as_bytes());
        buf.extend_from_slice(&(state.identities.len() as u64).to_be_bytes());
        let identity = Address::from_slice(&keccak256(buf)[12..]);
        state.identities.insert(
            identity,
            MockedIdentity {
                owner,
                factory,
                last_nonce: U256::zero(),
                pending_nonce: U256::zero(),
            },
        );
        identity
    }

    fn execute(
        &self,
        identity: &MockedIdentity,
        meta_transaction: &MetaTransaction,
    ) -> Result<(), LedgerError> {
        if meta_transaction.chain_id != self.chain_id {
            return Err(LedgerError::Reverted("wrong chain id".into()));
        }
        if !SignatureVerifier::verify(meta_transaction, identity.owner) {
            return Err(LedgerError::Reverted("invalid signature".into()));
        }
        if meta_transaction.nonce != identity.pending_nonce + U256::one() {
            return Err(LedgerError::Reverted("invalid nonce".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IdentityLedger for MockedLedger {
    fn relay_address(&self) -> Address {
        self.relay_address
    }

    async fn identity_owner(
        &self,
        identity: Address,
    ) -> Result<Address, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.transport_fault()?;
        state
            .identities
            .get(&identity)
            .map(|i| i.owner)
            .ok_or_else(|| LedgerError::Rejected("not a contract".into()))
    }

    async fn identity_last_nonce(
        &self,
        identity: Address,
    ) -> Result<U256, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.transport_fault()?;
        state
            .identities
            .get(&identity)
            .map(|i| i.pending_nonce)
            .ok_or_else(|| LedgerError::Rejected("not a contract".into()))
    }

    async fn is_deployed_by(
        &self,
        factory: Address,
        _from_block: u64,
        identity: Address,
    ) -> Result<bool, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.transport_fault()?;
        Ok(state
            .identities
            .get(&identity)
            .map_or(false, |i| i.factory == factory))
    }

    async fn pending_relay_nonce(&self) -> Result<U256, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.transport_fault()?;
        Ok(state.relay_nonce)
    }

    async fn submit_meta_transaction(
        &self,
        meta_transaction: &MetaTransaction,
        relay_nonce: U256,
    ) -> Result<TxHash, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.transport_fault()?;
        let identity = state
            .identities
            .get(&meta_transaction.from)
            .cloned()
            .ok_or_else(|| LedgerError::Reverted("not an identity".into()))?;
        self.execute(&identity, meta_transaction)?;
        state.check_relay_nonce(relay_nonce)?;

        let paused = state.mining_paused;
        if let Some(identity) = state.identities.get_mut(&meta_transaction.from)
        {
            identity.pending_nonce = meta_transaction.nonce;
            if !paused {
                identity.last_nonce = meta_transaction.nonce;
            }
        }
        if paused {
            let tx_hash = state.include(self.relay_address, TxStatus::Pending);
            state.pool.push((
                tx_hash,
                meta_transaction.from,
                meta_transaction.nonce,
            ));
            Ok(tx_hash)
        } else {
            Ok(state.include(self.relay_address, TxStatus::Succeeded))
        }
    }

    async fn broadcast_identity_deployment(
        &self,
        factory: Address,
        implementation: Address,
        signature: &Bytes,
        relay_nonce: U256,
    ) -> Result<TxHash, LedgerError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        state.transport_fault()?;
        let owner = SignatureVerifier::recover(
            deployment_authorization_hash(factory, implementation),
            signature,
        )
        .ok_or_else(|| LedgerError::Reverted("invalid signature".into()))?;
        state.check_relay_nonce(relay_nonce)?;

        let identity = Self::insert_identity(&mut state, factory, owner);
        let tx_hash = state.include(self.relay_address, TxStatus::Succeeded);
        state.deployments.insert(
            tx_hash,
            IdentityDeployment {
                owner,
                identity,
                implementation,
            },
        );
        Ok(tx_hash)
    }

    async fn deployed_identity(
        &self,
        factory: Address,
        tx_hash: TxHash,
    ) -> Result<IdentityDeployment, LedgerError> {
        let mut state = self.state.lock().await;
        state.transport_fault()?;
        let deployment = state
            .deployments
            .get(&tx_hash)
            .copied()
            .ok_or(LedgerError::MissingDeploymentEvent(tx_hash))?;
        let from_factory = state
            .identities
            .get(&deployment.identity)
            .map_or(false, |i| i.factory == factory);
        if from_factory {
            Ok(deployment)
        } else {
            Err(LedgerError::MissingDeploymentEvent(tx_hash))
        }
    }

    async fn transaction_status(
        &self,
        tx_hash: TxHash,
    ) -> Result<TxStatus, LedgerError> {
        let mut state = self.state.lock().await;
        state.transport_fault()?;
        Ok(state
            .transactions
            .get(&tx_hash)
            .copied()
            .unwrap_or(TxStatus::NotFound))
    }
}
