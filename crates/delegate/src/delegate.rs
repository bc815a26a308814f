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

use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::{Address, Bytes, TxHash, U256};
use tl_relay_config::RelayConfig;
use tl_relay_utils::probe;
use tokio::sync::Mutex;
use typed_builder::TypedBuilder;

use crate::account::RelayAccount;
use crate::error::{DelegateError, SignatureFailure};
use crate::fees::{DelegationFees, FeeValidator};
use crate::identity::{IdentityRegistry, TrustedFactory};
use crate::ledger::{IdentityLedger, TxStatus};
use crate::meta_transaction::MetaTransaction;
use crate::nonce::NonceOracle;
use crate::retry::LedgerRetry;
use crate::signature::SignatureVerifier;

/// What a [`Delegate`] is set up with.
#[derive(Debug, Clone, TypedBuilder)]
pub struct DelegateOptions {
    /// Chain the relay submits to, meta-transactions signed for any other
    /// chain are refused.
    chain_id: u64,
    /// Factories whose identities are served.
    #[builder(default)]
    trusted_factories: Vec<TrustedFactory>,
    /// Accepted fees, in order of preference.
    #[builder(default)]
    fees: Vec<DelegationFees>,
    /// Retries of ledger calls.
    #[builder(default)]
    retry: LedgerRetry,
}

impl From<&RelayConfig> for DelegateOptions {
    fn from(config: &RelayConfig) -> Self {
        let delegate = &config.delegate;
        DelegateOptions::builder()
            .chain_id(config.chain.chain_id)
            .trusted_factories(
                delegate
                    .identity_proxy_factories
                    .iter()
                    .map(TrustedFactory::from)
                    .collect(),
            )
            .fees(delegate.fees.iter().map(DelegationFees::from).collect())
            .retry(LedgerRetry::from(&delegate.retry))
            .build()
    }
}

/// Validates signed meta-transactions and submits them from the relay
/// account.
///
/// A meta-transaction goes through provenance, signature, nonce and fee
/// checks, in that order, before it is sent. Submissions of one identity
/// are serialized, the relay account is shared by all of them.
pub struct Delegate<L> {
    chain_id: u64,
    ledger: Arc<L>,
    retry: LedgerRetry,
    account: RelayAccount<L>,
    registry: IdentityRegistry<L>,
    nonces: NonceOracle<L>,
    fees: FeeValidator,
    identity_locks: Mutex<HashMap<Address, Arc<Mutex<()>>>>,
}

impl<L: IdentityLedger> Delegate<L> {
    /// Creates a delegate on top of `ledger`.
    pub fn new(ledger: Arc<L>, options: DelegateOptions) -> Self {
        let DelegateOptions {
            chain_id,
            trusted_factories,
            fees,
            retry,
        } = options;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            relay = ?ledger.relay_address(),
            chain_id,
            trusted_factories = trusted_factories.len(),
            fee_schedules = fees.len(),
            ready = true,
        );
        Self {
            chain_id,
            account: RelayAccount::new(ledger.clone(), retry),
            registry: IdentityRegistry::new(
                ledger.clone(),
                retry,
                trusted_factories,
            ),
            nonces: NonceOracle::new(ledger.clone(), retry),
            fees: FeeValidator::new(fees),
            identity_locks: Mutex::new(HashMap::new()),
            retry,
            ledger,
        }
    }

    /// The account paying for all transactions.
    pub fn relay_address(&self) -> Address {
        self.account.address()
    }

    /// Chain the delegate serves.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The identity proxy factories the delegate trusts.
    pub fn trusted_factories(&self) -> &[TrustedFactory] {
        self.registry.trusted_factories()
    }

    /// The nonce the next meta-transaction of `identity` has to use.
    pub async fn calc_next_nonce(
        &self,
        identity: Address,
    ) -> Result<U256, DelegateError> {
        Ok(self.nonces.next_nonce(identity).await?)
    }

    /// Fee schedules the meta-transaction can be signed with.
    pub fn calculate_fees_for_meta_transaction(
        &self,
        meta_transaction: &MetaTransaction,
    ) -> Vec<DelegationFees> {
        self.fees.applicable_fees(meta_transaction)
    }

    /// Fails if the declared fees match no schedule.
    pub fn validate_meta_transaction_fees(
        &self,
        meta_transaction: &MetaTransaction,
    ) -> Result<(), DelegateError> {
        Ok(self.fees.validate(meta_transaction)?)
    }

    /// Validates the meta-transaction and sends it, returning the hash of
    /// the relay transaction once the pending pool took it.
    #[tracing::instrument(
        skip_all,
        fields(identity = ?meta_transaction.from, nonce = %meta_transaction.nonce)
    )]
    pub async fn send_signed_meta_transaction(
        &self,
        meta_transaction: &MetaTransaction,
    ) -> Result<TxHash, DelegateError> {
        let identity = meta_transaction.from;
        let lock = self.identity_lock(identity).await;
        let result = {
            let _identity = lock.lock().await;
            self.validate_and_submit(meta_transaction).await
        };
        drop(lock);
        self.release_identity_lock(identity).await;

        match &result {
            Ok(tx_hash) => {
                tracing::debug!(?tx_hash, "Meta-transaction sent");
            }
            Err(e) => tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Validation,
                identity = ?identity,
                rejected = true,
                code = e.code(),
                reason = %e,
            ),
        }
        result
    }

    async fn validate_and_submit(
        &self,
        meta_transaction: &MetaTransaction,
    ) -> Result<TxHash, DelegateError> {
        let identity = meta_transaction.from;
        if !self.registry.is_trusted_identity(identity).await? {
            return Err(DelegateError::InvalidIdentityContract(identity));
        }

        if meta_transaction.chain_id != self.chain_id {
            return Err(SignatureFailure::ChainMismatch {
                expected: self.chain_id,
                actual: meta_transaction.chain_id,
            }
            .into());
        }
        let owner = self
            .retry
            .call("identity_owner", move || {
                self.ledger.identity_owner(identity)
            })
            .await?;
        SignatureVerifier::check(meta_transaction, owner)?;

        let expected = self.nonces.next_nonce(identity).await?;
        if meta_transaction.nonce != expected {
            return Err(DelegateError::InvalidNonce {
                expected,
                actual: meta_transaction.nonce,
            });
        }

        self.fees.validate(meta_transaction)?;
        tracing::trace!("Meta-transaction is valid");

        Ok(self.account.submit_meta_transaction(meta_transaction).await?)
    }

    /// Deploys an identity proxy through a trusted factory and returns its
    /// address.
    #[tracing::instrument(skip(self, owner_signature))]
    pub async fn deploy_identity(
        &self,
        factory: Address,
        implementation: Address,
        owner_signature: &Bytes,
    ) -> Result<Address, DelegateError> {
        let deployment = self
            .registry
            .deploy_identity(
                &self.account,
                factory,
                implementation,
                owner_signature,
            )
            .await?;
        Ok(deployment.identity)
    }

    /// Where a transaction sent by the relay is.
    pub async fn transaction_status(
        &self,
        tx_hash: TxHash,
    ) -> Result<TxStatus, DelegateError> {
        let status = self
            .retry
            .call("transaction_status", move || {
                self.ledger.transaction_status(tx_hash)
            })
            .await?;
        Ok(status)
    }

    async fn identity_lock(&self, identity: Address) -> Arc<Mutex<()>> {
        let mut locks = self.identity_locks.lock().await;
        locks.entry(identity).or_default().clone()
    }

    async fn release_identity_lock(&self, identity: Address) {
        let mut locks = self.identity_locks.lock().await;
        // only the map holds it, nobody is waiting.
        if locks
            .get(&identity)
            .map_or(false, |lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&identity);
        }
    }
}
