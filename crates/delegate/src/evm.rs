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

//! [`IdentityLedger`] on an EVM chain through ethers.

use std::sync::Arc;
use std::time::Duration;

use ethers::contract::{parse_log, ContractError};
use ethers::providers::{
    Middleware, MiddlewareError, PendingTransaction, ProviderError, RpcError,
};
use ethers::types::{Address, BlockNumber, Bytes, TxHash, U256};

use crate::ledger::{IdentityDeployment, IdentityLedger, LedgerError, TxStatus};
use crate::meta_transaction::MetaTransaction;

#[allow(missing_docs)]
mod bindings {
    use ethers::contract::abigen;

    abigen!(
        IdentityContract,
        r#"[
            function owner() external view returns (address)
            function lastNonce() external view returns (uint256)
            function executeTransaction(address from, address to, uint256 value, bytes data, uint256 baseFee, address currencyNetworkOfFees, uint256 nonce, bytes signature) external
        ]"#
    );

    abigen!(
        ProxyFactoryContract,
        r#"[
            function deployProxy(address initialImplementation, bytes signature) external
            event ProxyDeployment(address owner, address proxyAddress, address implementationAddress)
        ]"#
    );
}

use bindings::{IdentityContract, ProxyDeploymentFilter, ProxyFactoryContract};

/// The ledger behind an ethers middleware that signs as the relay account.
pub struct EvmLedger<M> {
    client: Arc<M>,
    relay_address: Address,
    receipt_interval: Duration,
    max_log_block_range: u64,
}

impl<M: Middleware + 'static> EvmLedger<M> {
    /// `relay_address` must be the account `client` signs with.
    pub fn new(client: Arc<M>, relay_address: Address) -> Self {
        Self {
            client,
            relay_address,
            receipt_interval: Duration::from_millis(1000),
            max_log_block_range: 5000,
        }
    }

    /// Largest block range of a single `eth_getLogs` request.
    pub fn with_log_block_range(mut self, max_range: u64) -> Self {
        self.max_log_block_range = max_range;
        self
    }

    /// How often the node is polled for receipts.
    pub fn with_receipt_interval(mut self, interval: Duration) -> Self {
        self.receipt_interval = interval;
        self
    }
}

/// Splits `from..=to` into inclusive ranges of at most `max_range` blocks.
fn block_ranges(from: u64, to: u64, max_range: u64) -> Vec<(u64, u64)> {
    let step = max_range.max(1);
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(step - 1).min(to);
        ranges.push((start, end));
        if end == to {
            break;
        }
        start = end + 1;
    }
    ranges
}

fn from_middleware_error<E: MiddlewareError>(e: E) -> LedgerError {
    match MiddlewareError::as_error_response(&e) {
        Some(response) if response.message.contains("revert") => {
            LedgerError::Reverted(response.message.clone())
        }
        Some(response) => LedgerError::Rejected(response.message.clone()),
        None => LedgerError::Transport(e.to_string()),
    }
}

fn from_provider_error(e: ProviderError) -> LedgerError {
    match RpcError::as_error_response(&e) {
        Some(response) => LedgerError::Rejected(response.message.clone()),
        None => LedgerError::Transport(e.to_string()),
    }
}

fn from_contract_error<M: Middleware>(e: ContractError<M>) -> LedgerError {
    if let Some(data) = e.as_revert() {
        return LedgerError::Reverted(data.to_string());
    }
    match e {
        ContractError::MiddlewareError { e } => from_middleware_error(e),
        ContractError::ProviderError { e } => from_provider_error(e),
        other => LedgerError::Rejected(other.to_string()),
    }
}

#[async_trait::async_trait]
impl<M: Middleware + 'static> IdentityLedger for EvmLedger<M> {
    fn relay_address(&self) -> Address {
        self.relay_address
    }

    async fn identity_owner(
        &self,
        identity: Address,
    ) -> Result<Address, LedgerError> {
        let contract = IdentityContract::new(identity, self.client.clone());
        contract.owner().call().await.map_err(from_contract_error)
    }

    async fn identity_last_nonce(
        &self,
        identity: Address,
    ) -> Result<U256, LedgerError> {
        let contract = IdentityContract::new(identity, self.client.clone());
        contract
            .last_nonce()
            .block(BlockNumber::Pending)
            .call()
            .await
            .map_err(from_contract_error)
    }

    async fn is_deployed_by(
        &self,
        factory: Address,
        from_block: u64,
        identity: Address,
    ) -> Result<bool, LedgerError> {
        let latest = self
            .client
            .get_block_number()
            .await
            .map_err(from_middleware_error)?
            .as_u64();
        let contract = ProxyFactoryContract::new(factory, self.client.clone());
        for (start, end) in
            block_ranges(from_block, latest, self.max_log_block_range)
        {
            let deployments = contract
                .proxy_deployment_filter()
                .from_block(start)
                .to_block(end)
                .query()
                .await
                .map_err(from_contract_error)?;
            if deployments.iter().any(|d| d.proxy_address == identity) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn pending_relay_nonce(&self) -> Result<U256, LedgerError> {
        self.client
            .get_transaction_count(
                self.relay_address,
                Some(BlockNumber::Pending.into()),
            )
            .await
            .map_err(from_middleware_error)
    }

    async fn submit_meta_transaction(
        &self,
        meta_transaction: &MetaTransaction,
        relay_nonce: U256,
    ) -> Result<TxHash, LedgerError> {
        let contract =
            IdentityContract::new(meta_transaction.from, self.client.clone());
        let call = contract
            .execute_transaction(
                meta_transaction.from,
                meta_transaction.to,
                meta_transaction.value,
                meta_transaction.data.clone(),
                meta_transaction.base_fee,
                meta_transaction.currency_network_of_fees,
                meta_transaction.nonce,
                meta_transaction.signature.clone(),
            )
            .from(self.relay_address)
            .nonce(relay_nonce)
            .block(BlockNumber::Pending);
        // Make a dry call on top of the pending block, to make sure the
        // transaction will go through successfully to avoid wasting fees on
        // invalid calls.
        call.call().await.map_err(from_contract_error)?;
        let pending = call.send().await.map_err(from_contract_error)?;
        Ok(*pending)
    }

    async fn broadcast_identity_deployment(
        &self,
        factory: Address,
        implementation: Address,
        signature: &Bytes,
        relay_nonce: U256,
    ) -> Result<TxHash, LedgerError> {
        let contract = ProxyFactoryContract::new(factory, self.client.clone());
        let call = contract
            .deploy_proxy(implementation, signature.clone())
            .from(self.relay_address)
            .nonce(relay_nonce)
            .block(BlockNumber::Pending);
        call.call().await.map_err(from_contract_error)?;
        let pending = call.send().await.map_err(from_contract_error)?;
        Ok(*pending)
    }

    async fn deployed_identity(
        &self,
        factory: Address,
        tx_hash: TxHash,
    ) -> Result<IdentityDeployment, LedgerError> {
        let receipt = PendingTransaction::new(tx_hash, self.client.provider())
            .interval(self.receipt_interval)
            .await
            .map_err(from_provider_error)?
            .ok_or(LedgerError::Dropped(tx_hash))?;
        if receipt.status == Some(0u64.into()) {
            return Err(LedgerError::Reverted(format!(
                "deployment {tx_hash:?} failed"
            )));
        }
        receipt
            .logs
            .into_iter()
            .filter(|log| log.address == factory)
            .find_map(|log| parse_log::<ProxyDeploymentFilter>(log).ok())
            .map(|event| IdentityDeployment {
                owner: event.owner,
                identity: event.proxy_address,
                implementation: event.implementation_address,
            })
            .ok_or(LedgerError::MissingDeploymentEvent(tx_hash))
    }

    async fn transaction_status(
        &self,
        tx_hash: TxHash,
    ) -> Result<TxStatus, LedgerError> {
        let receipt = self
            .client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(from_middleware_error)?;
        if let Some(receipt) = receipt {
            return Ok(match receipt.status {
                Some(status) if status.is_zero() => TxStatus::Failed,
                _ => TxStatus::Succeeded,
            });
        }
        let transaction = self
            .client
            .get_transaction(tx_hash)
            .await
            .map_err(from_middleware_error)?;
        Ok(if transaction.is_some() {
            TxStatus::Pending
        } else {
            TxStatus::NotFound
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{JsonRpcError, MockProvider, MockResponse, Provider};

    fn ledger_with_error(
        code: i64,
        message: &str,
    ) -> EvmLedger<Provider<MockProvider>> {
        let (provider, mock) = Provider::mocked();
        mock.push_response(MockResponse::Error(JsonRpcError {
            code,
            message: message.into(),
            data: None,
        }));
        EvmLedger::new(Arc::new(provider), Address::repeat_byte(0xee))
    }

    #[test]
    fn block_ranges_are_bounded() {
        assert_eq!(block_ranges(10, 25, 10), vec![(10, 19), (20, 25)]);
        assert_eq!(block_ranges(10, 19, 10), vec![(10, 19)]);
        assert_eq!(block_ranges(7, 7, 5000), vec![(7, 7)]);
        assert!(block_ranges(30, 20, 10).is_empty());
        assert_eq!(block_ranges(0, 2, 0), vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(
            block_ranges(u64::MAX - 1, u64::MAX, 10),
            vec![(u64::MAX - 1, u64::MAX)]
        );
    }

    #[tokio::test]
    async fn node_refusal_is_rejected() {
        let ledger =
            ledger_with_error(-32000, "insufficient funds for gas * price");
        let err = ledger.pending_relay_nonce().await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn revert_in_rpc_error_is_reverted() {
        let ledger = ledger_with_error(3, "execution reverted: invalid nonce");
        let err = ledger.pending_relay_nonce().await.unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn unanswered_request_is_transport_failure() {
        let (provider, _mock) = Provider::mocked();
        let ledger =
            EvmLedger::new(Arc::new(provider), Address::repeat_byte(0xee));
        let err = ledger.pending_relay_nonce().await.unwrap_err();
        assert!(matches!(err, LedgerError::Transport(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn reverted_contract_call_is_reverted() {
        let ledger = ledger_with_error(3, "execution reverted");
        let err = ledger
            .identity_last_nonce(Address::repeat_byte(0x11))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Reverted(_)));
    }

    #[tokio::test]
    async fn unanswered_contract_call_is_transport_failure() {
        let (provider, _mock) = Provider::mocked();
        let ledger =
            EvmLedger::new(Arc::new(provider), Address::repeat_byte(0xee));
        let err = ledger
            .identity_owner(Address::repeat_byte(0x11))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Transport(_)));
    }

    #[tokio::test]
    async fn refused_contract_call_is_rejected() {
        let ledger = ledger_with_error(-32602, "invalid argument 0");
        let err = ledger
            .identity_owner(Address::repeat_byte(0x11))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
    }

    #[tokio::test]
    async fn deployment_search_before_factory_block_is_empty() {
        let (provider, mock) = Provider::mocked();
        mock.push(ethers::types::U64::from(5u64)).unwrap();
        let ledger =
            EvmLedger::new(Arc::new(provider), Address::repeat_byte(0xee));
        let deployed = ledger
            .is_deployed_by(
                Address::repeat_byte(0xfa),
                10,
                Address::repeat_byte(0x11),
            )
            .await
            .unwrap();
        assert!(!deployed);
    }
}
