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

use config::{Config, File};
use ethers::types::{Address, U256};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::{ProxyFactoryConfig, RelayConfig};

/// Prefix of the environment variables merged into the configuration.
pub const ENV_PREFIX: &str = "TL_RELAY";

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> tl_relay_utils::Result<Vec<PathBuf>> {
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(tl_relay_utils::Error::from))
        .collect()
}

/// Try to parse the [`RelayConfig`] from the given config file(s).
pub fn parse_from_files(
    files: &[PathBuf],
) -> tl_relay_utils::Result<RelayConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of TL_RELAY).
    let builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX).separator("__"),
    );
    let cfg = builder.build()?;
    let config: Result<
        RelayConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files found under `path`.
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(path: P) -> tl_relay_utils::Result<RelayConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The contract addresses file written by the contract deployment tooling.
///
/// Only the identity proxy factory is of interest to the relay.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressesFile {
    identity_proxy_factory: Option<Address>,
}

/// Merges the identity proxy factory of an `addresses.json` file into the
/// trusted factories of `config`.
pub fn merge_addresses_file<P: AsRef<Path>>(
    mut config: RelayConfig,
    path: P,
) -> tl_relay_utils::Result<RelayConfig> {
    tracing::trace!("Loading addresses from {}", path.as_ref().display());
    let content = std::fs::read_to_string(path)?;
    let addresses: AddressesFile = serde_json::from_str(&content)?;
    if let Some(address) = addresses.identity_proxy_factory {
        config
            .delegate
            .identity_proxy_factories
            .push(ProxyFactoryConfig {
                address,
                deployed_at: 0,
            });
    }
    postloading_process(config)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: RelayConfig,
) -> tl_relay_utils::Result<RelayConfig> {
    tracing::trace!("Checking configration sanity ...");

    // a factory listed twice keeps its earliest known deployment block,
    // unless one entry pins an explicit block and the other a different one.
    let mut factories: Vec<ProxyFactoryConfig> = Vec::new();
    let mut seen: HashMap<Address, usize> = HashMap::new();
    for factory in config.delegate.identity_proxy_factories.drain(..) {
        match seen.get(&factory.address) {
            Some(&idx) => {
                let known = &mut factories[idx];
                if known.deployed_at == 0 {
                    known.deployed_at = factory.deployed_at;
                } else if factory.deployed_at != 0
                    && factory.deployed_at != known.deployed_at
                {
                    return Err(tl_relay_utils::Error::ConflictingFactory(
                        factory.address,
                    ));
                }
            }
            None => {
                seen.insert(factory.address, factories.len());
                factories.push(factory);
            }
        }
    }
    config.delegate.identity_proxy_factories = factories;

    if config.delegate.identity_proxy_factories.is_empty() {
        tracing::warn!(
            "!!WARNING!!: No identity proxy factory is configured,
            every meta-transaction will be rejected as coming from an unknown identity"
        );
    }
    if config.delegate.fees.is_empty() {
        tracing::warn!(
            "!!WARNING!!: No delegation fees are configured,
            meta-transactions will be relayed without charging any fee"
        );
    }

    tracing::trace!(
        "postloaded config: {}",
        serde_json::to_string_pretty(&config)?
    );

    Ok(config)
}

/// Deserializes a token amount given either as an integer or as a decimal
/// or `0x` prefixed hex string.
pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Int(u64),
        Str(String),
    }

    match Amount::deserialize(deserializer)? {
        Amount::Int(v) => Ok(U256::from(v)),
        Amount::Str(s) => match s.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16)
                .map_err(|e| serde::de::Error::custom(format!("{e:?}"))),
            None => U256::from_dec_str(&s)
                .map_err(|e| serde::de::Error::custom(format!("{e:?}"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const CONFIG: &str = r#"
[chain]
name = "tlbc"
http-endpoint = "http://localhost:8545"
chain-id = 4660
private-key = "0x8917174396171783496173419137618235192359106130478137647163400318"

[delegate]
identity-proxy-factories = [
    { address = "0x8688966AE53807c273D8B9fCcf667F0A0a91b1d3" },
    { address = "0x8688966AE53807c273D8B9fCcf667F0A0a91b1d3", deployed-at = 42 },
]
fees = [
    { base-fee = 1, currency-network = "0x55bF1B5E12D8F3E09F5e7A4E9b5D6BeaC5E4A1c2" },
    { base-fee = "0x10", currency-network = "0x0b8B1cc2f10E3Ae4Ff10bC8F6f72F1F7A9F21e3D" },
]

[delegate.retry]
max-retries = 5
"#;

    fn write_config(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn loads_config_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "main.toml", CONFIG);
        let config = load(tmp.path()).unwrap();

        assert_eq!(config.chain.chain_id, 4660);
        assert_eq!(
            config.chain.max_log_block_range,
            crate::defaults::max_log_block_range()
        );
        assert!(config.verify().is_ok());

        let factories = &config.delegate.identity_proxy_factories;
        assert_eq!(factories.len(), 1);
        assert_eq!(factories[0].deployed_at, 42);

        let fees = &config.delegate.fees;
        assert_eq!(fees.len(), 2);
        assert_eq!(fees[0].base_fee, U256::one());
        assert_eq!(fees[1].base_fee, U256::from(16));
        assert_eq!(
            fees[0].currency_network,
            Address::from_str("0x55bF1B5E12D8F3E09F5e7A4E9b5D6BeaC5E4A1c2")
                .unwrap()
        );

        assert_eq!(config.delegate.retry.max_retries, 5);
        assert_eq!(
            config.delegate.retry.interval_ms,
            crate::defaults::retry_interval_ms()
        );
    }

    #[test]
    fn conflicting_factory_blocks_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let conflicting = CONFIG.replace(
            r#"{ address = "0x8688966AE53807c273D8B9fCcf667F0A0a91b1d3" },"#,
            r#"{ address = "0x8688966AE53807c273D8B9fCcf667F0A0a91b1d3", deployed-at = 7 },"#,
        );
        write_config(tmp.path(), "main.toml", &conflicting);
        assert!(matches!(
            load(tmp.path()),
            Err(tl_relay_utils::Error::ConflictingFactory(_))
        ));
    }

    #[test]
    fn addresses_file_adds_trusted_factory() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "main.toml", CONFIG);
        let config = load(tmp.path()).unwrap();

        let addresses = tmp.path().join("addresses.json");
        std::fs::write(
            &addresses,
            r#"{
                "identityProxyFactory": "0x2D0C6A5eDDB8f0C7Ff5F2a1C6d7D8E8B5b7f3A11",
                "networks": []
            }"#,
        )
        .unwrap();
        let config = merge_addresses_file(config, &addresses).unwrap();
        assert_eq!(config.delegate.identity_proxy_factories.len(), 2);
    }

    #[test]
    fn log_block_range_can_be_lowered() {
        let tmp = tempfile::tempdir().unwrap();
        let lowered = CONFIG.replace(
            "chain-id = 4660",
            "chain-id = 4660\nmax-log-block-range = 1000",
        );
        write_config(tmp.path(), "main.toml", &lowered);
        let config = load(tmp.path()).unwrap();
        assert_eq!(config.chain.max_log_block_range, 1000);
    }

    #[test]
    fn missing_private_key_fails_verification() {
        let tmp = tempfile::tempdir().unwrap();
        let without_key = CONFIG
            .lines()
            .filter(|l| !l.starts_with("private-key"))
            .collect::<Vec<_>>()
            .join("\n");
        write_config(tmp.path(), "main.toml", &without_key);
        let config = load(tmp.path()).unwrap();
        assert!(matches!(
            config.verify(),
            Err(tl_relay_utils::Error::MissingSecrets)
        ));
    }
}
