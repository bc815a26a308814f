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

use ethers::types::{Address, U256};

use crate::ledger::{IdentityLedger, LedgerError};
use crate::retry::LedgerRetry;

/// Reads the next nonce of identity contracts from the ledger.
///
/// Every call goes to the ledger, other relays and earlier submissions of
/// this one move the nonce at any time.
pub struct NonceOracle<L> {
    ledger: Arc<L>,
    retry: LedgerRetry,
}

impl<L: IdentityLedger> NonceOracle<L> {
    /// Creates the oracle.
    pub fn new(ledger: Arc<L>, retry: LedgerRetry) -> Self {
        Self { ledger, retry }
    }

    /// The nonce the next meta-transaction of `identity` has to carry:
    /// one above the nonce it executed last.
    pub async fn next_nonce(
        &self,
        identity: Address,
    ) -> Result<U256, LedgerError> {
        let last = self
            .retry
            .call("identity_last_nonce", move || {
                self.ledger.identity_last_nonce(identity)
            })
            .await?;
        Ok(last.saturating_add(U256::one()))
    }
}
