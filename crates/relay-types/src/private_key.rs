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

use std::str::FromStr;

use ethers::types::H256;
use serde::Deserialize;

/// PrivateKey of the relay account.
///
/// Deserialized either from a `0x` prefixed hex string or from `$VAR`, an
/// environment variable holding such a string. The key never shows up in
/// `Debug` output.
#[derive(Clone)]
pub struct PrivateKey(H256);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<H256> for PrivateKey {
    fn from(secret: H256) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = H256;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVisitor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVisitor {
            type Value = H256;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let raw = crate::resolve_env_reference::<E>(value)?;
                if !raw.starts_with("0x") {
                    return Err(E::custom(
                        "private key must be a 0x prefixed hex string",
                    ));
                }
                H256::from_str(&raw).map_err(|e| {
                    E::custom(format!(
                        "{e}\n expected a 66 chars string (including the 0x prefix) but found {} chars",
                        raw.len()
                    ))
                })
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVisitor)?;
        Ok(Self(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str =
        "0x8917174396171783496173419137618235192359106130478137647163400318";

    #[test]
    fn parses_hex_key() {
        let key: PrivateKey =
            serde_json::from_value(serde_json::json!(KEY)).unwrap();
        assert_eq!(*key, H256::from_str(KEY).unwrap());
        assert_eq!(format!("{key:?}"), "PrivateKey");
    }

    #[test]
    fn parses_key_from_env() {
        std::env::set_var("TL_RELAY_TEST_PRIVATE_KEY", KEY);
        let key: PrivateKey = serde_json::from_value(serde_json::json!(
            "$TL_RELAY_TEST_PRIVATE_KEY"
        ))
        .unwrap();
        assert_eq!(*key, H256::from_str(KEY).unwrap());
    }

    #[test]
    fn rejects_unprefixed_key() {
        let result: Result<PrivateKey, _> =
            serde_json::from_value(serde_json::json!(&KEY[2..]));
        assert!(result.is_err());
    }
}
