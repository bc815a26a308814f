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

use std::convert::TryFrom;

use ethers::types::{Address, Signature, H256};

use crate::error::SignatureFailure;
use crate::meta_transaction::MetaTransaction;

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// Recovers signers of meta-transactions and deployment authorizations.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Recovers the key that signed the raw digest `hash`.
    ///
    /// `None` when the signature is malformed.
    pub fn recover(hash: H256, signature: &[u8]) -> Option<Address> {
        if signature.len() != SIGNATURE_LENGTH {
            return None;
        }
        let signature = Signature::try_from(signature).ok()?;
        signature.recover(hash).ok()
    }

    /// Whether `expected_signer` signed the meta-transaction.
    pub fn verify(
        meta_transaction: &MetaTransaction,
        expected_signer: Address,
    ) -> bool {
        Self::check(meta_transaction, expected_signer).is_ok()
    }

    /// Like [`SignatureVerifier::verify`], naming what is wrong.
    pub fn check(
        meta_transaction: &MetaTransaction,
        expected_signer: Address,
    ) -> Result<(), SignatureFailure> {
        let recovered =
            Self::recover(meta_transaction.hash(), &meta_transaction.signature)
                .ok_or(SignatureFailure::Malformed)?;
        if recovered == expected_signer {
            Ok(())
        } else {
            Err(SignatureFailure::WrongSigner {
                expected: expected_signer,
                recovered,
            })
        }
    }
}
