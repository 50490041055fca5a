//! The account ledger.
//!
//! Tracks per-(account, asset) balances with available/escrowed accounting.
//! Every primitive validates before it mutates, so a failing call leaves the
//! ledger untouched. [`AccountLedger::atomically`] extends that guarantee to
//! a group of calls by journaling the prior value of every touched entry.

use std::collections::BTreeMap;

use chainmatch_types::{
    Account, AccountId, AssetId, BalanceEntry, ChainmatchError, OrderSide, Result, Role,
};
use rust_decimal::Decimal;

use crate::fee::FeeSchedule;
use crate::supply_conservation::SupplyConservation;

/// One fill to settle between a buyer and a seller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleInstruction {
    pub buyer: AccountId,
    pub seller: AccountId,
    pub base: AssetId,
    pub quote: AssetId,
    pub quantity: Decimal,
    pub price: Decimal,
    /// The side that pays the taker fee.
    pub taker_side: OrderSide,
}

/// What a settlement moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    /// price × quantity.
    pub quote_amount: Decimal,
    pub fee: Decimal,
    pub fee_asset: AssetId,
}

/// Prior values of every entry touched inside an atomic scope.
#[derive(Debug)]
struct Journal {
    entries: BTreeMap<(AccountId, AssetId), Option<BalanceEntry>>,
    supply: SupplyConservation,
}

/// Owner of all balances.
#[derive(Debug, Default)]
pub struct AccountLedger {
    accounts: BTreeMap<AccountId, Account>,
    supply: SupplyConservation,
    journal: Option<Journal>,
}

impl AccountLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =================================================================
    // Registry
    // =================================================================

    /// Register a new account with zero balances.
    pub fn register(&mut self, id: AccountId, role: Role) -> Result<()> {
        if self.accounts.contains_key(&id) {
            return Err(ChainmatchError::DuplicateAccount(id));
        }
        self.accounts.insert(id, Account::new(id, role));
        tracing::debug!(account = %id.short(), %role, "Account registered");
        Ok(())
    }

    #[must_use]
    pub fn account(&self, id: &AccountId) -> Option<&Account> {
        self.accounts.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &AccountId) -> bool {
        self.accounts.contains_key(id)
    }

    /// Role of a registered account.
    pub fn role_of(&self, id: &AccountId) -> Result<Role> {
        self.accounts
            .get(id)
            .map(|a| a.role)
            .ok_or(ChainmatchError::AccountNotFound(*id))
    }

    /// All accounts in id order.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    #[must_use]
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    // =================================================================
    // External flows
    // =================================================================

    /// Credit value entering the engine (increases available balance).
    pub fn deposit(&mut self, account: AccountId, asset: &AssetId, amount: Decimal) -> Result<()> {
        require_positive("deposit", amount)?;
        let available = checked_credit(self.balance_of(account, asset)?.available, amount)?;
        self.supply.record_deposit(asset, amount)?;
        self.entry_mut(account, asset)?.available = available;
        Ok(())
    }

    /// Debit value leaving the engine. Only available balance can leave.
    pub fn withdraw(&mut self, account: AccountId, asset: &AssetId, amount: Decimal) -> Result<()> {
        require_positive("withdraw", amount)?;
        let available = self.balance_of(account, asset)?.available;
        if available < amount {
            return Err(ChainmatchError::InsufficientBalance {
                asset: asset.clone(),
                needed: amount,
                available,
            });
        }
        self.supply.record_withdrawal(asset, amount)?;
        self.entry_mut(account, asset)?.available -= amount;
        Ok(())
    }

    // =================================================================
    // Escrow
    // =================================================================

    /// Move `amount` from available to escrowed. Zero is a no-op.
    ///
    /// # Errors
    /// `InsufficientBalance` if available < amount.
    pub fn escrow(&mut self, account: AccountId, asset: &AssetId, amount: Decimal) -> Result<()> {
        require_non_negative("escrow", amount)?;
        let current = self.balance_of(account, asset)?;
        if current.available < amount {
            return Err(ChainmatchError::InsufficientBalance {
                asset: asset.clone(),
                needed: amount,
                available: current.available,
            });
        }
        if amount.is_zero() {
            return Ok(());
        }
        let escrowed = checked_credit(current.escrowed, amount)?;
        let entry = self.entry_mut(account, asset)?;
        entry.available -= amount;
        entry.escrowed = escrowed;
        tracing::debug!(account = %account.short(), %asset, %amount, "Escrowed");
        Ok(())
    }

    /// Move `amount` from escrowed back to available. Zero is a no-op.
    ///
    /// # Errors
    /// `InsufficientEscrow` if escrowed < amount.
    pub fn release(&mut self, account: AccountId, asset: &AssetId, amount: Decimal) -> Result<()> {
        require_non_negative("release", amount)?;
        let current = self.balance_of(account, asset)?;
        if current.escrowed < amount {
            return Err(ChainmatchError::InsufficientEscrow {
                asset: asset.clone(),
                needed: amount,
                escrowed: current.escrowed,
            });
        }
        if amount.is_zero() {
            return Ok(());
        }
        let available = checked_credit(current.available, amount)?;
        let entry = self.entry_mut(account, asset)?;
        entry.escrowed -= amount;
        entry.available = available;
        tracing::debug!(account = %account.short(), %asset, %amount, "Released");
        Ok(())
    }

    // =================================================================
    // Settlement
    // =================================================================

    /// Settle one fill atomically.
    ///
    /// 1. Seller's escrowed base decreases by `quantity`
    /// 2. Buyer's escrowed quote decreases by `price × quantity`
    /// 3. Buyer's available base increases by `quantity` (less the fee if the
    ///    buyer is the taker)
    /// 4. Seller's available quote increases by `price × quantity` (less the
    ///    fee if the seller is the taker)
    /// 5. The fee is credited to the protocol-fee account
    ///
    /// All preconditions are checked before the first write.
    ///
    /// # Errors
    /// - `Validation` for non-positive quantity/price, notional overflow or a
    ///   credit that would overflow a balance
    /// - `InsufficientEscrow` if either side's escrow cannot cover the fill
    /// - `AccountNotFound` if buyer, seller or fee account is unknown
    pub fn settle(
        &mut self,
        instruction: &SettleInstruction,
        fees: &FeeSchedule,
    ) -> Result<SettlementReceipt> {
        let SettleInstruction {
            buyer,
            seller,
            base,
            quote,
            quantity,
            price,
            taker_side,
        } = instruction;

        if *quantity <= Decimal::ZERO || *price <= Decimal::ZERO {
            return Err(ChainmatchError::validation(
                "settlement quantity and price must be positive",
            ));
        }
        if base == quote {
            return Err(ChainmatchError::validation(
                "base and quote asset must differ",
            ));
        }
        let quote_amount = price
            .checked_mul(*quantity)
            .ok_or_else(|| ChainmatchError::validation("notional overflow"))?;

        let (fee_asset, fee) = match taker_side {
            OrderSide::Buy => (base.clone(), fees.fee_on(*quantity)),
            OrderSide::Sell => (quote.clone(), fees.fee_on(quote_amount)),
        };

        // --- checks ---
        let seller_base = self.balance_of(*seller, base)?;
        if seller_base.escrowed < *quantity {
            return Err(ChainmatchError::InsufficientEscrow {
                asset: base.clone(),
                needed: *quantity,
                escrowed: seller_base.escrowed,
            });
        }
        let buyer_quote = self.balance_of(*buyer, quote)?;
        if buyer_quote.escrowed < quote_amount {
            return Err(ChainmatchError::InsufficientEscrow {
                asset: quote.clone(),
                needed: quote_amount,
                escrowed: buyer_quote.escrowed,
            });
        }
        if !fee.is_zero() && !self.contains(&fees.fee_account) {
            return Err(ChainmatchError::AccountNotFound(fees.fee_account));
        }

        // Credits are summed per entry: a self-trade, or a trader that is
        // also the fee account, credits the same entry more than once.
        let (buyer_fee, seller_fee) = match taker_side {
            OrderSide::Buy => (fee, Decimal::ZERO),
            OrderSide::Sell => (Decimal::ZERO, fee),
        };
        let credits = [
            (*buyer, base, *quantity - buyer_fee),
            (*seller, quote, quote_amount - seller_fee),
            (fees.fee_account, &fee_asset, fee),
        ];
        let mut credited: BTreeMap<(AccountId, AssetId), Decimal> = BTreeMap::new();
        for (account, asset, amount) in credits {
            if amount.is_zero() {
                continue;
            }
            let key = (account, asset.clone());
            let current = match credited.get(&key) {
                Some(available) => *available,
                None => self.balance_of(account, asset)?.available,
            };
            credited.insert(key, checked_credit(current, amount)?);
        }

        // --- writes ---
        self.entry_mut(*seller, base)?.escrowed -= *quantity;
        self.entry_mut(*buyer, quote)?.escrowed -= quote_amount;
        for ((account, asset), available) in credited {
            self.entry_mut(account, &asset)?.available = available;
        }

        Ok(SettlementReceipt {
            quote_amount,
            fee,
            fee_asset,
        })
    }

    // =================================================================
    // Atomic scope
    // =================================================================

    /// Run `f` as one unit: if it returns an error, every balance and
    /// supply change made inside it is undone.
    ///
    /// Nested calls join the outermost scope.
    pub fn atomically<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.journal.is_some() {
            return f(self);
        }
        self.journal = Some(Journal {
            entries: BTreeMap::new(),
            supply: self.supply.clone(),
        });
        let result = f(self);
        if let Some(journal) = self.journal.take() {
            if result.is_err() {
                self.rollback(journal);
            }
        }
        result
    }

    fn rollback(&mut self, journal: Journal) {
        for ((account, asset), prior) in journal.entries {
            if let Some(acct) = self.accounts.get_mut(&account) {
                match prior {
                    Some(entry) => {
                        acct.balances.insert(asset, entry);
                    }
                    None => {
                        acct.balances.remove(&asset);
                    }
                }
            }
        }
        self.supply = journal.supply;
        tracing::debug!("Ledger scope rolled back");
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Balance of a (account, asset) pair; zero for unknown pairs.
    #[must_use]
    pub fn balance(&self, account: AccountId, asset: &AssetId) -> BalanceEntry {
        self.accounts
            .get(&account)
            .map(|a| a.balance(asset))
            .unwrap_or_default()
    }

    /// Total supply of an asset (sum of all accounts' available + escrowed).
    #[must_use]
    pub fn total_supply(&self, asset: &AssetId) -> Decimal {
        self.accounts
            .values()
            .filter_map(|a| a.balances.get(asset))
            .map(BalanceEntry::total)
            .sum()
    }

    /// Verify supply conservation for one asset.
    pub fn verify_supply(&self, asset: &AssetId) -> Result<()> {
        self.supply.verify(asset, self.total_supply(asset))
    }

    /// Verify conservation for every tracked asset and non-negativity of
    /// every balance.
    pub fn check_invariants(&self) -> Result<()> {
        for account in self.accounts.values() {
            for (asset, entry) in &account.balances {
                if !entry.is_well_formed() {
                    return Err(ChainmatchError::SupplyInvariantViolation {
                        reason: format!("negative {asset} balance on account {}", account.id),
                    });
                }
            }
        }
        for asset in self.supply.tracked_assets() {
            self.verify_supply(&asset)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn supply(&self) -> &SupplyConservation {
        &self.supply
    }

    // =================================================================
    // Snapshot restore
    // =================================================================

    /// Rebuild a ledger from persisted records.
    #[must_use]
    pub fn from_parts(accounts: Vec<Account>, supply: SupplyConservation) -> Self {
        Self {
            accounts: accounts.into_iter().map(|a| (a.id, a)).collect(),
            supply,
            journal: None,
        }
    }

    // =================================================================
    // Internals
    // =================================================================

    fn balance_of(&self, account: AccountId, asset: &AssetId) -> Result<BalanceEntry> {
        self.accounts
            .get(&account)
            .map(|a| a.balance(asset))
            .ok_or(ChainmatchError::AccountNotFound(account))
    }

    /// The single write path for balances; journals the prior value when
    /// inside an atomic scope.
    fn entry_mut(&mut self, account: AccountId, asset: &AssetId) -> Result<&mut BalanceEntry> {
        let acct = self
            .accounts
            .get_mut(&account)
            .ok_or(ChainmatchError::AccountNotFound(account))?;
        if let Some(journal) = self.journal.as_mut() {
            journal
                .entries
                .entry((account, asset.clone()))
                .or_insert_with(|| acct.balances.get(asset).cloned());
        }
        Ok(acct.balances.entry(asset.clone()).or_default())
    }
}

fn checked_credit(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    balance
        .checked_add(amount)
        .ok_or_else(|| ChainmatchError::validation("balance overflow"))
}

fn require_positive(what: &str, amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(ChainmatchError::validation(format!(
            "{what} amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

fn require_non_negative(what: &str, amount: Decimal) -> Result<()> {
    if amount.is_sign_negative() {
        return Err(ChainmatchError::validation(format!(
            "{what} amount must not be negative, got {amount}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chainmatch_types::ErrorKind;

    use super::*;

    fn eth() -> AssetId {
        AssetId::new("ETH")
    }

    fn gold() -> AssetId {
        AssetId::new("GOLD")
    }

    fn fee_account() -> AccountId {
        AccountId::from_bytes([0xFE; 16])
    }

    fn setup() -> (AccountLedger, AccountId, AccountId) {
        let mut ledger = AccountLedger::new();
        let buyer = AccountId::from_bytes([1; 16]);
        let seller = AccountId::from_bytes([2; 16]);
        ledger.register(buyer, Role::Trader).unwrap();
        ledger.register(seller, Role::Trader).unwrap();
        ledger.register(fee_account(), Role::Admin).unwrap();
        (ledger, buyer, seller)
    }

    fn instruction(buyer: AccountId, seller: AccountId, taker: OrderSide) -> SettleInstruction {
        SettleInstruction {
            buyer,
            seller,
            base: gold(),
            quote: eth(),
            quantity: Decimal::new(30, 0),
            price: Decimal::TEN,
            taker_side: taker,
        }
    }

    #[test]
    fn duplicate_registration_rejected() {
        let (mut ledger, buyer, _) = setup();
        let err = ledger.register(buyer, Role::Admin).unwrap_err();
        assert!(matches!(err, ChainmatchError::DuplicateAccount(_)));
        assert_eq!(ledger.role_of(&buyer).unwrap(), Role::Trader);
    }

    #[test]
    fn deposit_increases_available() {
        let (mut ledger, buyer, _) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(1000, 0)).unwrap();
        let bal = ledger.balance(buyer, &eth());
        assert_eq!(bal.available, Decimal::new(1000, 0));
        assert_eq!(bal.escrowed, Decimal::ZERO);
    }

    #[test]
    fn deposit_to_unknown_account_fails() {
        let mut ledger = AccountLedger::new();
        let err = ledger
            .deposit(AccountId::from_bytes([9; 16]), &eth(), Decimal::ONE)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn non_positive_deposit_rejected() {
        let (mut ledger, buyer, _) = setup();
        let err = ledger.deposit(buyer, &eth(), Decimal::ZERO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(ledger.balance(buyer, &eth()).is_zero());
    }

    #[test]
    fn escrow_moves_to_escrowed() {
        let (mut ledger, buyer, _) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(1000, 0)).unwrap();
        ledger.escrow(buyer, &eth(), Decimal::new(500, 0)).unwrap();
        let bal = ledger.balance(buyer, &eth());
        assert_eq!(bal.available, Decimal::new(500, 0));
        assert_eq!(bal.escrowed, Decimal::new(500, 0));
    }

    #[test]
    fn escrow_insufficient_fails_without_change() {
        let (mut ledger, buyer, _) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(100, 0)).unwrap();
        let err = ledger.escrow(buyer, &eth(), Decimal::new(200, 0)).unwrap_err();
        assert!(matches!(err, ChainmatchError::InsufficientBalance { .. }));
        let bal = ledger.balance(buyer, &eth());
        assert_eq!(bal.available, Decimal::new(100, 0));
        assert_eq!(bal.escrowed, Decimal::ZERO);
    }

    #[test]
    fn release_restores_available() {
        let (mut ledger, buyer, _) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(1000, 0)).unwrap();
        ledger.escrow(buyer, &eth(), Decimal::new(400, 0)).unwrap();
        ledger.release(buyer, &eth(), Decimal::new(400, 0)).unwrap();
        let bal = ledger.balance(buyer, &eth());
        assert_eq!(bal.available, Decimal::new(1000, 0));
        assert_eq!(bal.escrowed, Decimal::ZERO);
    }

    #[test]
    fn release_more_than_escrowed_fails() {
        let (mut ledger, buyer, _) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(10, 0)).unwrap();
        ledger.escrow(buyer, &eth(), Decimal::new(5, 0)).unwrap();
        let err = ledger.release(buyer, &eth(), Decimal::new(6, 0)).unwrap_err();
        assert!(matches!(err, ChainmatchError::InsufficientEscrow { .. }));
    }

    #[test]
    fn withdraw_only_from_available() {
        let (mut ledger, buyer, _) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(10, 0)).unwrap();
        ledger.escrow(buyer, &eth(), Decimal::new(8, 0)).unwrap();
        assert!(ledger.withdraw(buyer, &eth(), Decimal::new(3, 0)).is_err());
        ledger.withdraw(buyer, &eth(), Decimal::new(2, 0)).unwrap();
        assert_eq!(ledger.balance(buyer, &eth()).available, Decimal::ZERO);
        ledger.verify_supply(&eth()).unwrap();
        assert_eq!(ledger.total_supply(&eth()), Decimal::new(8, 0));
    }

    #[test]
    fn settle_seller_taker_pays_fee_in_quote() {
        let (mut ledger, buyer, seller) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(1000, 0)).unwrap();
        ledger.escrow(buyer, &eth(), Decimal::new(300, 0)).unwrap();
        ledger.deposit(seller, &gold(), Decimal::new(30, 0)).unwrap();
        ledger.escrow(seller, &gold(), Decimal::new(30, 0)).unwrap();

        let fees = FeeSchedule::new(Decimal::new(1, 3), fee_account());
        let receipt = ledger
            .settle(&instruction(buyer, seller, OrderSide::Sell), &fees)
            .unwrap();

        assert_eq!(receipt.quote_amount, Decimal::new(300, 0));
        assert_eq!(receipt.fee, Decimal::new(3, 1));
        assert_eq!(receipt.fee_asset, eth());
        assert_eq!(ledger.balance(buyer, &gold()).available, Decimal::new(30, 0));
        assert_eq!(ledger.balance(buyer, &eth()).escrowed, Decimal::ZERO);
        assert_eq!(ledger.balance(seller, &eth()).available, Decimal::new(2997, 1));
        assert_eq!(ledger.balance(seller, &gold()).escrowed, Decimal::ZERO);
        assert_eq!(ledger.balance(fee_account(), &eth()).available, Decimal::new(3, 1));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn settle_buyer_taker_pays_fee_in_base() {
        let (mut ledger, buyer, seller) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(300, 0)).unwrap();
        ledger.escrow(buyer, &eth(), Decimal::new(300, 0)).unwrap();
        ledger.deposit(seller, &gold(), Decimal::new(30, 0)).unwrap();
        ledger.escrow(seller, &gold(), Decimal::new(30, 0)).unwrap();

        let fees = FeeSchedule::new(Decimal::new(1, 3), fee_account());
        let receipt = ledger
            .settle(&instruction(buyer, seller, OrderSide::Buy), &fees)
            .unwrap();

        assert_eq!(receipt.fee, Decimal::new(3, 2));
        assert_eq!(receipt.fee_asset, gold());
        assert_eq!(ledger.balance(buyer, &gold()).available, Decimal::new(2997, 2));
        assert_eq!(ledger.balance(seller, &eth()).available, Decimal::new(300, 0));
        assert_eq!(ledger.balance(fee_account(), &gold()).available, Decimal::new(3, 2));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn settle_is_all_or_nothing() {
        let (mut ledger, buyer, seller) = setup();
        // Seller escrowed enough, buyer did not.
        ledger.deposit(buyer, &eth(), Decimal::new(1000, 0)).unwrap();
        ledger.escrow(buyer, &eth(), Decimal::new(100, 0)).unwrap();
        ledger.deposit(seller, &gold(), Decimal::new(30, 0)).unwrap();
        ledger.escrow(seller, &gold(), Decimal::new(30, 0)).unwrap();

        let err = ledger
            .settle(
                &instruction(buyer, seller, OrderSide::Sell),
                &FeeSchedule::zero(fee_account()),
            )
            .unwrap_err();
        assert!(matches!(err, ChainmatchError::InsufficientEscrow { .. }));
        assert_eq!(ledger.balance(seller, &gold()).escrowed, Decimal::new(30, 0));
        assert!(ledger.balance(buyer, &gold()).is_zero());
    }

    #[test]
    fn overflowing_deposit_rejected_without_change() {
        let (mut ledger, buyer, _) = setup();
        let half = Decimal::from_str_exact("50000000000000000000000000000").unwrap();
        ledger.deposit(buyer, &eth(), half).unwrap();
        let err = ledger.deposit(buyer, &eth(), half).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(ledger.balance(buyer, &eth()).available, half);
        assert_eq!(ledger.supply().total_deposits(&eth()), half);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn overflowing_settlement_credit_changes_nothing() {
        let (buyer, seller) = (AccountId::from_bytes([1; 16]), AccountId::from_bytes([2; 16]));
        let mut buyer_account = Account::new(buyer, Role::Trader);
        buyer_account.balances.insert(
            eth(),
            BalanceEntry {
                available: Decimal::ZERO,
                escrowed: Decimal::new(300, 0),
            },
        );
        let mut seller_account = Account::new(seller, Role::Trader);
        seller_account.balances.insert(
            gold(),
            BalanceEntry {
                available: Decimal::ZERO,
                escrowed: Decimal::new(30, 0),
            },
        );
        seller_account.balances.insert(
            eth(),
            BalanceEntry {
                available: Decimal::MAX,
                escrowed: Decimal::ZERO,
            },
        );
        let mut ledger = AccountLedger::from_parts(
            vec![
                buyer_account,
                seller_account,
                Account::new(fee_account(), Role::Admin),
            ],
            SupplyConservation::new(),
        );
        let before: Vec<Account> = ledger.accounts().cloned().collect();

        let err = ledger
            .settle(
                &instruction(buyer, seller, OrderSide::Sell),
                &FeeSchedule::new(Decimal::new(1, 3), fee_account()),
            )
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        let after: Vec<Account> = ledger.accounts().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn self_trade_credits_one_entry_twice() {
        let (mut ledger, buyer, _) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(300, 0)).unwrap();
        ledger.escrow(buyer, &eth(), Decimal::new(300, 0)).unwrap();
        ledger.deposit(buyer, &gold(), Decimal::new(30, 0)).unwrap();
        ledger.escrow(buyer, &gold(), Decimal::new(30, 0)).unwrap();

        // The trader is also the fee account.
        let fees = FeeSchedule::new(Decimal::new(1, 3), buyer);
        ledger
            .settle(&instruction(buyer, buyer, OrderSide::Sell), &fees)
            .unwrap();

        let eth_bal = ledger.balance(buyer, &eth());
        assert_eq!(eth_bal.available, Decimal::new(300, 0));
        assert_eq!(eth_bal.escrowed, Decimal::ZERO);
        assert_eq!(ledger.balance(buyer, &gold()).available, Decimal::new(30, 0));
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn atomically_rolls_back_every_step() {
        let (mut ledger, buyer, _) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(100, 0)).unwrap();

        let result: Result<()> = ledger.atomically(|l| {
            l.escrow(buyer, &eth(), Decimal::new(60, 0))?;
            l.deposit(buyer, &gold(), Decimal::new(5, 0))?;
            // Fails: only 40 available now.
            l.escrow(buyer, &eth(), Decimal::new(60, 0))
        });

        assert!(result.is_err());
        let eth_bal = ledger.balance(buyer, &eth());
        assert_eq!(eth_bal.available, Decimal::new(100, 0));
        assert_eq!(eth_bal.escrowed, Decimal::ZERO);
        assert!(ledger.account(&buyer).unwrap().balances.get(&gold()).is_none());
        assert_eq!(ledger.supply().total_deposits(&gold()), Decimal::ZERO);
        ledger.check_invariants().unwrap();
    }

    #[test]
    fn atomically_commits_on_success() {
        let (mut ledger, buyer, _) = setup();
        ledger.deposit(buyer, &eth(), Decimal::new(100, 0)).unwrap();
        ledger
            .atomically(|l| {
                l.escrow(buyer, &eth(), Decimal::new(60, 0))?;
                l.atomically(|inner| inner.release(buyer, &eth(), Decimal::new(10, 0)))
            })
            .unwrap();
        assert_eq!(ledger.balance(buyer, &eth()).escrowed, Decimal::new(50, 0));
    }
}
