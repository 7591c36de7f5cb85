//! Ledger seam and vault capability.
//!
//! Funds leave the commission vault only through [`Ledger::execute`], which
//! demands the [`VaultCapability`]. The capability is not `Clone`: it is
//! created once for a deployment and moved into the engine that owns it.

use std::collections::HashMap;

use feemeter_types::Identity;
use serde::{Deserialize, Serialize};

/// Exclusive right to move funds out of one vault account.
#[derive(Debug, PartialEq, Eq)]
pub struct VaultCapability {
    account: Identity,
}

impl VaultCapability {
    /// Mint the capability for `account`.
    pub fn new(account: Identity) -> Self {
        Self { account }
    }

    /// The vault account this capability controls.
    pub fn account(&self) -> &Identity {
        &self.account
    }
}

/// One transfer out of the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub to: Identity,
    pub amount: u64,
}

/// Ledger failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The account does not hold enough to cover the batch.
    #[error("insufficient funds in {account}: balance {balance}, required {required}")]
    InsufficientFunds {
        account: Identity,
        balance: u64,
        required: u64,
    },

    /// A balance would overflow.
    #[error("balance overflow for {0}")]
    Overflow(Identity),
}

/// Balances and vault transfers.
pub trait Ledger: Send {
    /// Balance of `account`; unknown accounts hold zero.
    fn balance_of(&self, account: &Identity) -> u64;

    /// Apply `transfers` out of the vault as one batch: either all of them
    /// happen or none does.
    fn execute(&mut self, vault: &VaultCapability, transfers: &[Transfer]) -> Result<(), LedgerError>;
}

/// Ledger kept in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryLedger {
    balances: HashMap<Identity, u64>,
}

impl InMemoryLedger {
    /// A ledger where every account holds zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `account` from outside the ledger.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Overflow`] if the balance would overflow.
    pub fn deposit(&mut self, account: Identity, amount: u64) -> Result<(), LedgerError> {
        let balance = self.balances.entry(account).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(account))?;
        Ok(())
    }

    /// Sum of all balances.
    pub fn total_supply(&self) -> u128 {
        self.balances.values().map(|b| *b as u128).sum()
    }
}

impl Ledger for InMemoryLedger {
    fn balance_of(&self, account: &Identity) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn execute(&mut self, vault: &VaultCapability, transfers: &[Transfer]) -> Result<(), LedgerError> {
        let from = *vault.account();
        let balance = self.balance_of(&from);
        let required = transfers
            .iter()
            .try_fold(0u64, |acc, t| acc.checked_add(t.amount))
            .ok_or(LedgerError::Overflow(from))?;
        if required > balance {
            return Err(LedgerError::InsufficientFunds {
                account: from,
                balance,
                required,
            });
        }

        // Validate every credit before touching any balance.
        let mut staged = self.balances.clone();
        staged.insert(from, balance - required);
        for t in transfers {
            let to = staged.entry(t.to).or_insert(0);
            *to = to.checked_add(t.amount).ok_or(LedgerError::Overflow(t.to))?;
        }
        self.balances = staged;
        Ok(())
    }
}
