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
use serde::{Deserialize, Serialize};
use tl_relay_config::DelegationFeesConfig;

use crate::error::FeeError;
use crate::meta_transaction::MetaTransaction;

/// A fee the relay accepts: at least `base_fee` paid in
/// `currency_network_of_fees`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationFees {
    /// Minimum amount.
    pub base_fee: U256,
    /// Currency network the amount is denominated in.
    pub currency_network_of_fees: Address,
}

impl From<&DelegationFeesConfig> for DelegationFees {
    fn from(config: &DelegationFeesConfig) -> Self {
        Self {
            base_fee: config.base_fee,
            currency_network_of_fees: config.currency_network,
        }
    }
}

/// Checks declared fees against the configured schedules.
///
/// Without any schedule the relay is free and every fee is accepted.
#[derive(Debug, Clone, Default)]
pub struct FeeValidator {
    schedules: Vec<DelegationFees>,
}

impl FeeValidator {
    /// Schedules are kept in the given order.
    pub fn new(schedules: Vec<DelegationFees>) -> Self {
        Self { schedules }
    }

    /// All configured schedules.
    pub fn schedules(&self) -> &[DelegationFees] {
        &self.schedules
    }

    /// The schedules a client can sign the meta-transaction with.
    ///
    /// A draft without a currency network gets every schedule to choose
    /// from.
    pub fn applicable_fees(
        &self,
        meta_transaction: &MetaTransaction,
    ) -> Vec<DelegationFees> {
        let currency = meta_transaction.currency_network_of_fees;
        self.schedules
            .iter()
            .filter(|s| {
                currency.is_zero() || s.currency_network_of_fees == currency
            })
            .copied()
            .collect()
    }

    /// Accepts the declared fee if it pays at least the minimum of one
    /// schedule of the same currency network.
    pub fn validate(
        &self,
        meta_transaction: &MetaTransaction,
    ) -> Result<(), FeeError> {
        if self.schedules.is_empty() {
            return Ok(());
        }
        let currency = meta_transaction.currency_network_of_fees;
        if currency.is_zero() {
            return if self.schedules.iter().any(|s| s.base_fee.is_zero()) {
                Ok(())
            } else {
                Err(FeeError::ZeroFeeNotAccepted)
            };
        }

        let minimum = self
            .schedules
            .iter()
            .filter(|s| s.currency_network_of_fees == currency)
            .map(|s| s.base_fee)
            .min()
            .ok_or(FeeError::CurrencyNotAccepted { currency })?;
        if meta_transaction.base_fee >= minimum {
            Ok(())
        } else {
            Err(FeeError::FeeTooLow {
                minimum,
                actual: meta_transaction.base_fee,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn schedule(base_fee: u64, byte: u8) -> DelegationFees {
        DelegationFees {
            base_fee: base_fee.into(),
            currency_network_of_fees: network(byte),
        }
    }

    fn paying(base_fee: u64, currency: Address) -> MetaTransaction {
        MetaTransaction::builder()
            .from(network(0x11))
            .to(network(0x22))
            .nonce(1u64)
            .chain_id(1)
            .build()
            .with_fees(base_fee.into(), currency)
    }

    #[test]
    fn discovers_schedules_in_configured_order() {
        let validator = FeeValidator::new(vec![
            schedule(5, 0xaa),
            schedule(1, 0xbb),
            schedule(2, 0xaa),
        ]);
        let draft = paying(0, Address::zero());
        assert_eq!(validator.applicable_fees(&draft), validator.schedules());

        let draft = paying(0, network(0xaa));
        assert_eq!(
            validator.applicable_fees(&draft),
            vec![schedule(5, 0xaa), schedule(2, 0xaa)]
        );
        assert!(validator.applicable_fees(&paying(0, network(0xcc))).is_empty());
    }

    #[test]
    fn fee_equal_to_minimum_is_accepted() {
        let validator = FeeValidator::new(vec![schedule(1, 0xaa)]);
        assert_eq!(validator.validate(&paying(1, network(0xaa))), Ok(()));
        assert_eq!(validator.validate(&paying(2, network(0xaa))), Ok(()));
    }

    #[test]
    fn fee_below_minimum_is_rejected() {
        let validator =
            FeeValidator::new(vec![schedule(3, 0xaa), schedule(5, 0xaa)]);
        assert_eq!(
            validator.validate(&paying(2, network(0xaa))),
            Err(FeeError::FeeTooLow {
                minimum: U256::from(3u64),
                actual: U256::from(2u64),
            })
        );
    }

    #[test]
    fn unknown_currency_is_rejected() {
        let validator = FeeValidator::new(vec![schedule(1, 0xaa)]);
        assert_eq!(
            validator.validate(&paying(100, network(0xbb))),
            Err(FeeError::CurrencyNotAccepted {
                currency: network(0xbb)
            })
        );
    }

    #[test]
    fn zero_currency_needs_a_free_schedule() {
        let paid = FeeValidator::new(vec![schedule(1, 0xaa)]);
        assert_eq!(
            paid.validate(&paying(0, Address::zero())),
            Err(FeeError::ZeroFeeNotAccepted)
        );
        let free = FeeValidator::new(vec![schedule(1, 0xaa), schedule(0, 0xbb)]);
        assert_eq!(free.validate(&paying(0, Address::zero())), Ok(()));
    }

    #[test]
    fn no_schedule_accepts_everything() {
        let validator = FeeValidator::default();
        assert_eq!(validator.validate(&paying(0, Address::zero())), Ok(()));
        assert_eq!(validator.validate(&paying(0, network(0xaa))), Ok(()));
    }
}
