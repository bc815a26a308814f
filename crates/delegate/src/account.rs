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

use ethers::types::{Address, Bytes, TxHash};
use tl_relay_utils::probe;
use tokio::sync::Mutex;

use crate::ledger::{IdentityLedger, LedgerError};
use crate::meta_transaction::MetaTransaction;
use crate::retry::LedgerRetry;

/// The funded account every transaction of the relay is sent from.
///
/// The ledger only accepts transactions of one account in sequence, so
/// reading the pending nonce and broadcasting happen under one lock. Two
/// submissions never pick the same relay nonce.
pub struct RelayAccount<L> {
    ledger: Arc<L>,
    retry: LedgerRetry,
    sequence: Mutex<()>,
}

impl<L: IdentityLedger> RelayAccount<L> {
    /// Creates the account.
    pub fn new(ledger: Arc<L>, retry: LedgerRetry) -> Self {
        Self {
            ledger,
            retry,
            sequence: Mutex::new(()),
        }
    }

    /// Address of the account.
    pub fn address(&self) -> Address {
        self.ledger.relay_address()
    }

    /// Sends the meta-transaction, returns once the pending pool took it.
    pub async fn submit_meta_transaction(
        &self,
        meta_transaction: &MetaTransaction,
    ) -> Result<TxHash, LedgerError> {
        let _sequence = self.sequence.lock().await;
        let relay_nonce = self
            .retry
            .call("pending_relay_nonce", move || {
                self.ledger.pending_relay_nonce()
            })
            .await?;
        let result = self
            .retry
            .call("submit_meta_transaction", move || {
                self.ledger
                    .submit_meta_transaction(meta_transaction, relay_nonce)
            })
            .await;
        match &result {
            Ok(tx_hash) => tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Submission,
                ty = "meta_transaction",
                identity = ?meta_transaction.from,
                %relay_nonce,
                pending = true,
                ?tx_hash,
            ),
            Err(e) => tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Submission,
                ty = "meta_transaction",
                identity = ?meta_transaction.from,
                %relay_nonce,
                errored = true,
                error = %e,
            ),
        }
        result
    }

    /// Sends the deployment of an identity proxy through `factory`.
    pub async fn broadcast_identity_deployment(
        &self,
        factory: Address,
        implementation: Address,
        signature: &Bytes,
    ) -> Result<TxHash, LedgerError> {
        let _sequence = self.sequence.lock().await;
        let relay_nonce = self
            .retry
            .call("pending_relay_nonce", move || {
                self.ledger.pending_relay_nonce()
            })
            .await?;
        let tx_hash = self
            .retry
            .call("broadcast_identity_deployment", move || {
                self.ledger.broadcast_identity_deployment(
                    factory,
                    implementation,
                    signature,
                    relay_nonce,
                )
            })
            .await?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Submission,
            ty = "identity_deployment",
            factory = ?factory,
            %relay_nonce,
            pending = true,
            ?tx_hash,
        );
        Ok(tx_hash)
    }
}
