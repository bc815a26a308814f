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

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories_next::ProjectDirs;
use structopt::StructOpt;

use crate::RelayConfig;

/// Package identifier, where the default configuration & database are defined.
/// If the user does not start the relay with the `--config-dir`
/// it will default to read from the default location depending on the OS.
pub const PACKAGE_ID: [&str; 3] = ["network", "trustlines", "tl-relay"];

/// Options shared by every relay command.
///
/// $ tl-relay -vvv -c <CONFIG_DIR> --addresses addresses.json next-nonce <IDENTITY>
#[derive(Debug, Clone, StructOpt)]
pub struct ConfigOpts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences), global = true)]
    pub verbose: i32,
    /// Directory that contains configration files.
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str),
        global = true
    )]
    pub config_dir: Option<PathBuf>,
    /// Contract addresses file, its `identityProxyFactory` is trusted too.
    #[structopt(
        long = "addresses",
        value_name = "FILE",
        parse(from_os_str),
        global = true
    )]
    pub addresses: Option<PathBuf>,
}

/// Loads the configuration from the given directory.
///
/// Falls back to the platform config directory of the relay when
/// `config_dir` is `None`.
pub fn load_config<P>(
    config_dir: Option<P>,
) -> Result<RelayConfig, anyhow::Error>
where
    P: AsRef<Path>,
{
    tracing::debug!("Getting default dirs for the relay");
    let dirs = ProjectDirs::from(PACKAGE_ID[0], PACKAGE_ID[1], PACKAGE_ID[2])
        .context("failed to get config")?;
    let path = match config_dir {
        Some(p) => p.as_ref().to_path_buf(),
        None => dirs.config_dir().to_path_buf(),
    };
    // return an error if the path is not a directory.
    if !path.is_dir() {
        return Err(anyhow::anyhow!("{} is not a directory", path.display()));
    }
    tracing::trace!("Loading Config from {} ..", path.display());
    let v = crate::utils::load(path)?;
    tracing::trace!("Config loaded..");
    Ok(v)
}

/// Loads the configuration described by `opts`, including the optional
/// addresses file.
pub fn load_config_from_opts(
    opts: &ConfigOpts,
) -> Result<RelayConfig, anyhow::Error> {
    let config = load_config(opts.config_dir.as_ref())?;
    match opts.addresses.as_ref() {
        Some(addresses) => {
            let config = crate::utils::merge_addresses_file(config, addresses)
                .with_context(|| {
                    format!("failed to load {}", addresses.display())
                })?;
            Ok(config)
        }
        None => Ok(config),
    }
}

/// Sets up the logger for the relay, based on the verbosity level passed in.
///
/// `RUST_LOG` directives are honored on top of the verbosity.
pub fn setup_logger(verbosity: i32) -> anyhow::Result<()> {
    use tracing::Level;
    let log_level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    for target in [
        "tl_relay",
        "tl_relay_delegate",
        "tl_relay_context",
        tl_relay_utils::probe::TARGET,
    ] {
        env_filter =
            env_filter.add_directive(format!("{target}={log_level}").parse()?);
    }
    let logger = tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_env_filter(env_filter);
    // if we are not compiling for integration tests, we should use pretty logs
    #[cfg(not(feature = "integration-tests"))]
    let logger = logger.pretty();
    // otherwise, we should use json, which is easy to parse.
    #[cfg(feature = "integration-tests")]
    let logger = logger.json().flatten_event(true).with_current_span(false);

    logger
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))?;
    Ok(())
}
