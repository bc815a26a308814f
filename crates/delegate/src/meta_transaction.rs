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

use ethers::signers::{LocalWallet, WalletError};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Version byte of the EIP-191 envelope the hashes are wrapped in.
const EIP191_PREFIX: [u8; 2] = [0x19, 0x00];

/// A call an identity contract executes on behalf of its owner, signed by
/// the owner and paid for by the relay.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder,
)]
#[serde(rename_all = "camelCase")]
pub struct MetaTransaction {
    /// The identity contract executing the call.
    pub from: Address,
    /// Target of the call.
    pub to: Address,
    /// Wei sent along with the call.
    #[serde(default)]
    #[builder(default, setter(into))]
    pub value: U256,
    /// Calldata.
    #[serde(default)]
    #[builder(default, setter(into))]
    pub data: Bytes,
    /// Fee the owner pays to the relay.
    #[serde(default)]
    #[builder(default, setter(into))]
    pub base_fee: U256,
    /// Currency network the fee is paid in, zero for no fee.
    #[serde(default)]
    #[builder(default)]
    pub currency_network_of_fees: Address,
    /// Must be the next nonce of the identity.
    #[builder(setter(into))]
    pub nonce: U256,
    /// Chain the signature is bound to.
    pub chain_id: u64,
    /// `r || s || v` over [`MetaTransaction::hash`].
    #[serde(default)]
    #[builder(default, setter(into))]
    pub signature: Bytes,
}

impl MetaTransaction {
    /// The digest the owner signs.
    pub fn hash(&self) -> H256 {
        let mut buf = Vec::with_capacity(2 + 3 * 20 + 5 * 32);
        buf.extend_from_slice(&EIP191_PREFIX);
        buf.extend_from_slice(self.from.as_bytes());
        buf.extend_from_slice(self.to.as_bytes());
        buf.extend_from_slice(&word(self.value));
        buf.extend_from_slice(&keccak256(&self.data));
        buf.extend_from_slice(&word(self.base_fee));
        buf.extend_from_slice(self.currency_network_of_fees.as_bytes());
        buf.extend_from_slice(&word(self.nonce));
        buf.extend_from_slice(&word(U256::from(self.chain_id)));
        H256(keccak256(buf))
    }

    /// Returns a copy paying `base_fee` in `currency_network_of_fees`.
    ///
    /// The signature of the copy is cleared.
    pub fn with_fees(
        mut self,
        base_fee: U256,
        currency_network_of_fees: Address,
    ) -> Self {
        self.base_fee = base_fee;
        self.currency_network_of_fees = currency_network_of_fees;
        self.signature = Bytes::default();
        self
    }

    /// Returns a copy using `nonce`, with the signature cleared.
    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self.signature = Bytes::default();
        self
    }

    /// Signs the meta-transaction with the key of the identity owner.
    pub fn sign(mut self, owner: &LocalWallet) -> Result<Self, WalletError> {
        let signature = owner.sign_hash(self.hash())?;
        self.signature = signature.to_vec().into();
        Ok(self)
    }
}

/// The digest an owner signs to authorize `factory` to deploy an identity
/// proxy for `implementation`.
pub fn deployment_authorization_hash(
    factory: Address,
    implementation: Address,
) -> H256 {
    let mut buf = Vec::with_capacity(2 + 2 * 20);
    buf.extend_from_slice(&EIP191_PREFIX);
    buf.extend_from_slice(factory.as_bytes());
    buf.extend_from_slice(implementation.as_bytes());
    H256(keccak256(buf))
}

/// Signs a deployment authorization, see [`deployment_authorization_hash`].
pub fn sign_deployment_authorization(
    owner: &LocalWallet,
    factory: Address,
    implementation: Address,
) -> Result<Bytes, WalletError> {
    let signature =
        owner.sign_hash(deployment_authorization_hash(factory, implementation))?;
    Ok(signature.to_vec().into())
}

fn word(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode_packed, Token};

    fn sample() -> MetaTransaction {
        MetaTransaction::builder()
            .from(Address::repeat_byte(0x11))
            .to(Address::repeat_byte(0x22))
            .value(123u64)
            .data(vec![0x04, 0xd2])
            .base_fee(1u64)
            .currency_network_of_fees(Address::repeat_byte(0x33))
            .nonce(1u64)
            .chain_id(4660)
            .build()
    }

    #[test]
    fn hash_matches_packed_encoding() {
        let mt = sample();
        let packed = encode_packed(&[
            Token::FixedBytes(vec![0x19]),
            Token::FixedBytes(vec![0x00]),
            Token::Address(mt.from),
            Token::Address(mt.to),
            // uint256 packs to a full word.
            Token::FixedBytes(word(mt.value).to_vec()),
            Token::FixedBytes(keccak256(&mt.data).to_vec()),
            Token::FixedBytes(word(mt.base_fee).to_vec()),
            Token::Address(mt.currency_network_of_fees),
            Token::FixedBytes(word(mt.nonce).to_vec()),
            Token::FixedBytes(word(U256::from(mt.chain_id)).to_vec()),
        ])
        .unwrap();
        assert_eq!(packed.len(), 2 + 3 * 20 + 5 * 32);
        assert_eq!(mt.hash(), H256(keccak256(packed)));
    }

    #[test]
    fn hash_of_known_meta_transaction() {
        let expected: H256 =
            "0x108d66504609315c3eeed0b39f4b1e6eaed11a1f471cd61492d458a53c1b5e0f"
                .parse()
                .unwrap();
        assert_eq!(sample().hash(), expected);
    }

    #[test]
    fn every_field_is_covered_by_the_hash() {
        let mt = sample();
        let variants = [
            MetaTransaction { to: Address::zero(), ..mt.clone() },
            MetaTransaction { value: U256::zero(), ..mt.clone() },
            MetaTransaction { data: Bytes::default(), ..mt.clone() },
            mt.clone().with_fees(U256::from(2), mt.currency_network_of_fees),
            mt.clone().with_fees(mt.base_fee, Address::zero()),
            mt.clone().with_nonce(U256::from(2)),
            MetaTransaction { chain_id: 1, ..mt.clone() },
        ];
        for variant in variants {
            assert_ne!(variant.hash(), mt.hash());
        }
        // the signature is not part of what is signed.
        let signed = MetaTransaction {
            signature: vec![1u8; 65].into(),
            ..mt.clone()
        };
        assert_eq!(signed.hash(), mt.hash());
    }

    #[test]
    fn parses_camel_case_payload() {
        let mt: MetaTransaction = serde_json::from_value(serde_json::json!({
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x2222222222222222222222222222222222222222",
            "value": "0x7b",
            "data": "0x04d2",
            "baseFee": "0x1",
            "currencyNetworkOfFees": "0x3333333333333333333333333333333333333333",
            "nonce": "0x1",
            "chainId": 4660,
        }))
        .unwrap();
        assert_eq!(mt, sample());
        assert!(mt.signature.is_empty());
    }

    #[test]
    fn deployment_hash_binds_factory_and_implementation() {
        let factory = Address::repeat_byte(0xfa);
        let implementation = Address::repeat_byte(0x1e);
        let hash = deployment_authorization_hash(factory, implementation);
        assert_ne!(hash, deployment_authorization_hash(implementation, factory));
        let packed = [&[0x19u8, 0x00][..], factory.as_bytes(), implementation.as_bytes()]
            .concat();
        assert_eq!(hash, H256(keccak256(packed)));
        let expected: H256 =
            "0x6d996951a7175aebc3e0450499c435a8ebe3b6e9312767b15e406393d7b70fdf"
                .parse()
                .unwrap();
        assert_eq!(hash, expected);
    }
}
