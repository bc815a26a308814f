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

//! Trustlines Relay Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use ethers::types::{Address, Bytes, TxHash};
use structopt::StructOpt;

use tl_relay_config::cli::{load_config_from_opts, setup_logger, ConfigOpts};
use tl_relay_context::RelayContext;
use tl_relay_delegate::{evm_delegate, DelegateError, MetaTransaction};

/// Relays meta-transactions of trustlines identity contracts.
///
/// $ tl-relay -vv -c ./config submit meta-transaction.json
#[derive(StructOpt)]
#[structopt(name = "Trustlines Relay")]
struct Opts {
    #[structopt(flatten)]
    config: ConfigOpts,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Prints the nonce the next meta-transaction of an identity has to use.
    NextNonce {
        /// Address of the identity contract.
        identity: Address,
    },
    /// Prints the fees a meta-transaction draft can be signed with.
    Fees {
        /// JSON file with the meta-transaction draft.
        #[structopt(parse(from_os_str))]
        payload: PathBuf,
    },
    /// Validates a signed meta-transaction and sends it.
    Submit {
        /// JSON file with the signed meta-transaction.
        #[structopt(parse(from_os_str))]
        payload: PathBuf,
    },
    /// Deploys an identity proxy through a trusted factory.
    DeployIdentity {
        /// Address of the identity proxy factory.
        factory: Address,
        /// Address of the identity implementation.
        implementation: Address,
        /// Signature of the owner over the factory and the implementation.
        signature: Bytes,
    },
    /// Prints whether a relay transaction got included.
    Status {
        /// Hash of the transaction.
        tx_hash: TxHash,
    },
}

fn read_meta_transaction(path: &Path) -> anyhow::Result<MetaTransaction> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let meta_transaction =
        serde_json::from_str(&content).with_context(|| {
            format!("invalid meta-transaction in {}", path.display())
        })?;
    Ok(meta_transaction)
}

fn print_json(value: serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Prints a refused request the way clients can act on it.
fn rejection(e: DelegateError) -> anyhow::Error {
    let report = serde_json::json!({
        "error": e.code(),
        "message": e.to_string(),
    });
    println!("{report}");
    anyhow::Error::new(e)
}

async fn run(ctx: &RelayContext, command: Command) -> anyhow::Result<()> {
    let delegate = evm_delegate(ctx).await?;
    tracing::event!(
        target: tl_relay_utils::probe::TARGET,
        tracing::Level::DEBUG,
        kind = %tl_relay_utils::probe::Kind::Lifecycle,
        relay = ?delegate.relay_address(),
        chain = %ctx.config.chain.name,
        started = true
    );
    match command {
        Command::NextNonce { identity } => {
            let nonce = delegate
                .calc_next_nonce(identity)
                .await
                .map_err(rejection)?;
            print_json(serde_json::json!({
                "identity": identity,
                "nextNonce": nonce,
            }))
        }
        Command::Fees { payload } => {
            let draft = read_meta_transaction(&payload)?;
            let fees = delegate.calculate_fees_for_meta_transaction(&draft);
            print_json(serde_json::to_value(fees)?)
        }
        Command::Submit { payload } => {
            let meta_transaction = read_meta_transaction(&payload)?;
            let tx_hash = delegate
                .send_signed_meta_transaction(&meta_transaction)
                .await
                .map_err(rejection)?;
            if let Some(explorer) = &ctx.config.chain.explorer {
                tracing::info!("Sent: {}tx/{:?}", explorer, tx_hash);
            }
            print_json(serde_json::json!({ "txHash": tx_hash }))
        }
        Command::DeployIdentity {
            factory,
            implementation,
            signature,
        } => {
            let identity = delegate
                .deploy_identity(factory, implementation, &signature)
                .await
                .map_err(rejection)?;
            print_json(serde_json::json!({ "identity": identity }))
        }
        Command::Status { tx_hash } => {
            let status = delegate
                .transaction_status(tx_hash)
                .await
                .map_err(rejection)?;
            print_json(serde_json::json!({
                "txHash": tx_hash,
                "status": status,
            }))
        }
    }
}

/// The main entry point for the relay.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.config.verbose)?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }

    // The configuration is validated and configured from the given directory
    let config = load_config_from_opts(&args.config)?;
    config.verify()?;

    // The RelayContext hands out the providers and the wallet of the relay
    // account.
    let ctx = RelayContext::new(config);
    let result = run(&ctx, args.command).await;
    tracing::event!(
        target: tl_relay_utils::probe::TARGET,
        tracing::Level::DEBUG,
        kind = %tl_relay_utils::probe::Kind::Lifecycle,
        shutdown = true,
        errored = result.is_err(),
    );
    result
}
