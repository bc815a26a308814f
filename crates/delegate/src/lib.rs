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
//! # Meta-transaction Delegate
//!
//! Turns meta-transactions signed by the owners of identity contracts into
//! transactions paid for by the relay account.
//!
//! A meta-transaction is sent only if
//! * its identity contract was deployed by a trusted proxy factory,
//! * the owner of the identity signed it for this chain,
//! * its nonce is the next nonce of the identity on the ledger, and
//! * its fee matches one of the configured [`DelegationFees`].
//!
//! The ledger is reached through [`IdentityLedger`]; [`EvmLedger`] talks to
//! an EVM node, `MockedLedger` (feature `mocked`) keeps everything in
//! memory.

use std::sync::Arc;

use ethers::providers::Middleware;
use tl_relay_context::RelayContext;
use tl_relay_types::RelaySignerClient;

/// The funded relay account.
pub mod account;
mod delegate;
/// Errors of the delegate.
pub mod error;
pub mod evm;
/// Delegation fees and their validation.
pub mod fees;
/// Trusted identity proxy factories.
pub mod identity;
pub mod ledger;
/// Meta-transactions and the digests their signers sign.
pub mod meta_transaction;
#[cfg(any(test, feature = "mocked"))]
pub mod mocked;
/// Next nonces of identity contracts.
pub mod nonce;
/// Retries of ledger calls.
pub mod retry;
/// Recovery of signers.
pub mod signature;


pub use delegate::{Delegate, DelegateOptions};
pub use error::{DelegateError, FeeError, SignatureFailure};
pub use evm::EvmLedger;
pub use fees::DelegationFees;
pub use identity::TrustedFactory;
pub use ledger::{IdentityLedger, LedgerError, TxStatus};
pub use meta_transaction::MetaTransaction;

/// A delegate that submits to the chain of the relay context.
pub type EvmDelegate = Delegate<EvmLedger<RelaySignerClient>>;

/// Builds the delegate for the configured chain, after making sure the node
/// serves that chain.
pub async fn evm_delegate(
    ctx: &RelayContext,
) -> tl_relay_utils::Result<EvmDelegate> {
    let client = ctx.evm_client()?;
    ctx.verify_chain_id(client.inner()).await?;
    let relay_address = client.address();
    let ledger = EvmLedger::new(Arc::new(client), relay_address)
        .with_log_block_range(ctx.config.chain.max_log_block_range);
    Ok(Delegate::new(
        Arc::new(ledger),
        DelegateOptions::from(&ctx.config),
    ))
}
