//! Native-currency balances.
//!
//! Value enters only through [`ValueBook::deposit`]. Every other movement is
//! a debit from one holder and an equal credit to another (or to an event's
//! proceeds, held by the catalog), so the sum of all balances and all
//! undisbursed proceeds always equals [`ValueBook::total_issued`].

use crate::error::LedgerError;
use crate::notification::LedgerNotification;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use turnstile_core::{Amount, Identity, Transition};

/// Account balances plus the running total of deposited value
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueBook {
    balances: BTreeMap<Identity, Amount>,
    total_issued: Amount,
}

impl ValueBook {
    /// Creates an empty book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits fresh value to `account`.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroAmount`] for a zero deposit
    /// - [`LedgerError::ArithmeticOverflow`] if total issued value would
    ///   exceed the amount range
    pub fn deposit(
        &mut self,
        account: Identity,
        amount: Amount,
    ) -> Result<Transition<Amount, LedgerNotification>, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let total_issued = self
            .total_issued
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        // Any balance is bounded by total_issued, so this credit cannot fail
        // once the total fits.
        let balance = self.credit(&account, amount)?;
        self.total_issued = total_issued;

        Ok(Transition::new(balance).notify(LedgerNotification::FundsDeposited { account, amount }))
    }

    /// Fails unless `account` can cover `amount`
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientBalance`] if the balance is short.
    pub fn check_debit(&self, account: &Identity, amount: Amount) -> Result<(), LedgerError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: account.clone(),
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Removes `amount` from `account`
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientBalance`] if the balance is short; nothing
    /// changes in that case.
    pub fn debit(&mut self, account: &Identity, amount: Amount) -> Result<Amount, LedgerError> {
        self.check_debit(account, amount)?;
        let remaining = self
            .balance_of(account)
            .checked_sub(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        if remaining.is_zero() {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), remaining);
        }
        Ok(remaining)
    }

    /// Adds `amount` to `account` and returns the new balance
    ///
    /// # Errors
    ///
    /// [`LedgerError::ArithmeticOverflow`] if the balance would overflow.
    pub fn credit(&mut self, account: &Identity, amount: Amount) -> Result<Amount, LedgerError> {
        if amount.is_zero() {
            return Ok(self.balance_of(account));
        }
        let balance = self
            .balance_of(account)
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        self.balances.insert(account.clone(), balance);
        Ok(balance)
    }

    /// Current balance of `account` (zero if it never held value)
    #[must_use]
    pub fn balance_of(&self, account: &Identity) -> Amount {
        self.balances.get(account).copied().unwrap_or(Amount::ZERO)
    }

    /// Everything ever deposited
    #[must_use]
    pub const fn total_issued(&self) -> Amount {
        self.total_issued
    }

    /// Sum of all account balances, `None` if it does not fit an amount
    #[must_use]
    pub fn total_balances(&self) -> Option<Amount> {
        self.balances
            .values()
            .try_fold(Amount::ZERO, |sum, balance| sum.checked_add(*balance))
    }

    /// Accounts holding a non-zero balance
    pub fn accounts(&self) -> impl Iterator<Item = (&Identity, Amount)> {
        self.balances.iter().map(|(account, balance)| (account, *balance))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::new("alice")
    }

    #[test]
    fn deposit_credits_and_tracks_issuance() {
        let mut book = ValueBook::new();
        let transition = book.deposit(alice(), Amount::new(70)).unwrap();

        assert_eq!(transition.receipt, Amount::new(70));
        assert_eq!(book.balance_of(&alice()), Amount::new(70));
        assert_eq!(book.total_issued(), Amount::new(70));
        assert_eq!(transition.notifications().count(), 1);
    }

    #[test]
    fn zero_deposit_is_rejected() {
        let mut book = ValueBook::new();
        assert_eq!(
            book.deposit(alice(), Amount::ZERO).unwrap_err(),
            LedgerError::ZeroAmount
        );
        assert_eq!(book, ValueBook::new());
    }

    #[test]
    fn deposit_refuses_to_overflow_issuance() {
        let mut book = ValueBook::new();
        book.deposit(alice(), Amount::new(u64::MAX)).unwrap();
        let before = book.clone();

        let err = book.deposit(Identity::new("bob"), Amount::new(1)).unwrap_err();
        assert_eq!(err, LedgerError::ArithmeticOverflow);
        assert_eq!(book, before);
    }

    #[test]
    fn debit_beyond_balance_changes_nothing() {
        let mut book = ValueBook::new();
        book.deposit(alice(), Amount::new(5)).unwrap();
        let before = book.clone();

        let err = book.debit(&alice(), Amount::new(6)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                account: alice(),
                required: Amount::new(6),
                available: Amount::new(5),
            }
        );
        assert_eq!(book, before);
    }

    #[test]
    fn moving_value_conserves_the_total() {
        let mut book = ValueBook::new();
        book.deposit(alice(), Amount::new(100)).unwrap();
        book.debit(&alice(), Amount::new(40)).unwrap();
        book.credit(&Identity::new("bob"), Amount::new(40)).unwrap();

        assert_eq!(book.total_balances(), Some(book.total_issued()));
        assert_eq!(book.accounts().count(), 2);
    }

    #[test]
    fn draining_an_account_forgets_it() {
        let mut book = ValueBook::new();
        book.deposit(alice(), Amount::new(3)).unwrap();
        book.debit(&alice(), Amount::new(3)).unwrap();
        assert_eq!(book.accounts().count(), 0);
        assert_eq!(book.balance_of(&alice()), Amount::ZERO);
    }
}
