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

use ethers::types::{Address, U256};

use crate::ledger::LedgerError;

/// Why a signature was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureFailure {
    /// The signature is not 65 bytes of `r || s || v` or no key recovers from it.
    #[error("malformed signature")]
    Malformed,
    /// The signature recovers to a key that does not own the identity.
    #[error("signed by {recovered:?} but the identity is owned by {expected:?}")]
    WrongSigner {
        /// Registered owner of the identity.
        expected: Address,
        /// Signer recovered from the signature.
        recovered: Address,
    },
    /// The payload is bound to another chain.
    #[error("signed for chain {actual} but the relay serves chain {expected}")]
    ChainMismatch {
        /// Chain id the relay submits to.
        expected: u64,
        /// Chain id of the meta-transaction.
        actual: u64,
    },
}

/// Why the declared delegation fees were not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeeError {
    /// No fee schedule is denominated in this currency network.
    #[error("fees in currency network {currency:?} are not accepted")]
    CurrencyNotAccepted {
        /// The declared currency network.
        currency: Address,
    },
    /// The fee is lower than every schedule of its currency network.
    #[error("fee {actual} is below the minimum of {minimum}")]
    FeeTooLow {
        /// Lowest minimum configured for the currency network.
        minimum: U256,
        /// The declared fee.
        actual: U256,
    },
    /// No currency network was declared and relaying is not free.
    #[error("meta-transactions without fees are not accepted")]
    ZeroFeeNotAccepted,
}

/// Every way the delegate can refuse a request.
#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    /// The address was not deployed through a trusted identity proxy
    /// factory, or a deployment went through an untrusted factory.
    #[error("{0:?} is not a trusted identity contract")]
    InvalidIdentityContract(Address),
    /// The owner did not sign the payload.
    #[error("invalid signature: {reason}")]
    InvalidSignature {
        /// What is wrong with the signature.
        reason: SignatureFailure,
    },
    /// The nonce is already used or skips ahead.
    #[error("invalid nonce: expected {expected} but got {actual}")]
    InvalidNonce {
        /// The next nonce of the identity on the ledger.
        expected: U256,
        /// The nonce of the meta-transaction.
        actual: U256,
    },
    /// The declared fees match no configured schedule.
    #[error("invalid delegation fees: {0}")]
    InvalidFees(#[from] FeeError),
    /// The ledger refused or never received the transaction.
    #[error("submission failed: {0}")]
    Submission(#[from] LedgerError),
}

impl DelegateError {
    /// Stable machine readable name of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            DelegateError::InvalidIdentityContract(_) => {
                "invalid_identity_contract"
            }
            DelegateError::InvalidSignature { .. } => "invalid_signature",
            DelegateError::InvalidNonce { .. } => "invalid_nonce",
            DelegateError::InvalidFees(_) => "invalid_fees",
            DelegateError::Submission(_) => "submission_failed",
        }
    }
}

impl From<SignatureFailure> for DelegateError {
    fn from(reason: SignatureFailure) -> Self {
        DelegateError::InvalidSignature { reason }
    }
}
