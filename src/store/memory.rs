//! In-memory store
//!
//! Process-local implementation of `LedgerStore`. A batch is checked in
//! full against a staged view before anything is applied, which gives the
//! same all-or-nothing behaviour as the SQL transaction in `PgStore`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::Balance;
use crate::model::{
    Account, AccountStatus, AdminUser, DeletionRequest, DeletionStatus, LoanRequest, LoanStatus,
    TransactionRecord, TransactionStatus,
};

use super::{LedgerStore, StoreError, TransactionFilter, WriteBatch, WriteOp};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<String, Account>,
    transactions: Vec<TransactionRecord>,
    tx_index: HashMap<String, usize>,
    loans: HashMap<Uuid, LoanRequest>,
    deletions: HashMap<Uuid, DeletionRequest>,
    /// Keyed by lowercased username
    admins: HashMap<String, AdminUser>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    /// Reject the batch if any op would fail, without touching state
    fn check(&self, ops: &[WriteOp]) -> Result<(), StoreError> {
        let mut balances: HashMap<&str, Decimal> = HashMap::new();
        let mut inserted: HashSet<&str> = HashSet::new();
        let mut deleted: HashSet<&str> = HashSet::new();
        let mut gov_ids: HashSet<String> = HashSet::new();
        let mut reversed: HashSet<&str> = HashSet::new();
        let mut new_txs: HashSet<&str> = HashSet::new();
        let mut admins: HashMap<String, bool> = HashMap::new();

        let exists = |number: &str, inserted: &HashSet<&str>, deleted: &HashSet<&str>| {
            !deleted.contains(number) && (inserted.contains(number) || self.accounts.contains_key(number))
        };

        for op in ops {
            match op {
                WriteOp::InsertAccount(account) => {
                    let number = account.account_number.as_str();
                    if exists(number, &inserted, &deleted) {
                        return Err(StoreError::Duplicate(format!("account {number}")));
                    }
                    let gov = account.gov_id_number.to_ascii_uppercase();
                    let taken = self
                        .accounts
                        .values()
                        .any(|a| a.gov_id_number.eq_ignore_ascii_case(&gov));
                    if taken || !gov_ids.insert(gov) {
                        return Err(StoreError::Duplicate("government ID".to_string()));
                    }
                    inserted.insert(number);
                    deleted.remove(number);
                    balances.insert(number, account.balance.value());
                }
                WriteOp::UpdateAccount(account) => {
                    let number = account.account_number.as_str();
                    if !exists(number, &inserted, &deleted) {
                        return Err(StoreError::not_found("account", number));
                    }
                }
                WriteOp::DeleteAccount(number) => {
                    if !exists(number.as_str(), &inserted, &deleted) {
                        return Err(StoreError::not_found("account", number.clone()));
                    }
                    deleted.insert(number.as_str());
                }
                WriteOp::Debit { account, amount } => {
                    if !exists(account.as_str(), &inserted, &deleted) {
                        return Err(StoreError::not_found("account", account.clone()));
                    }
                    let current = self.staged_balance(&balances, account);
                    if current < amount.value() {
                        return Err(StoreError::InsufficientBalance(account.clone()));
                    }
                    balances.insert(account.as_str(), current - amount.value());
                }
                WriteOp::Credit { account, amount } => {
                    if !exists(account.as_str(), &inserted, &deleted) {
                        return Err(StoreError::not_found("account", account.clone()));
                    }
                    let current = self.staged_balance(&balances, account);
                    if current + amount.value() > Balance::MAX {
                        return Err(StoreError::BalanceLimit(account.clone()));
                    }
                    let next = Balance::new(current)
                        .and_then(|b| b.credit(amount))
                        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                    balances.insert(account.as_str(), next.value());
                }
                WriteOp::AppendTransaction(record) => {
                    if self.tx_index.contains_key(&record.id) || !new_txs.insert(record.id.as_str()) {
                        return Err(StoreError::Duplicate(format!("transaction {}", record.id)));
                    }
                }
                WriteOp::ReverseTransaction { id, .. } => {
                    let current = self
                        .tx_index
                        .get(id)
                        .map(|&i| &self.transactions[i])
                        .ok_or_else(|| StoreError::not_found("transaction", id.clone()))?;
                    if current.status != TransactionStatus::Success || !reversed.insert(id.as_str()) {
                        return Err(StoreError::AlreadyReversed(id.clone()));
                    }
                }
                WriteOp::SaveLoanRequest(_) | WriteOp::SaveDeletionRequest(_) => {}
                WriteOp::InsertAdmin(admin) => {
                    let key = admin.username.to_lowercase();
                    if self.admin_exists(&admins, &key) {
                        return Err(StoreError::Duplicate(format!("admin {}", admin.username)));
                    }
                    admins.insert(key, true);
                }
                WriteOp::UpdateAdmin(admin) => {
                    let key = admin.username.to_lowercase();
                    if !self.admin_exists(&admins, &key) {
                        return Err(StoreError::not_found("admin", admin.username.clone()));
                    }
                }
                WriteOp::DeleteAdmin(username) => {
                    let key = username.to_lowercase();
                    if !self.admin_exists(&admins, &key) {
                        return Err(StoreError::not_found("admin", username.clone()));
                    }
                    admins.insert(key, false);
                }
            }
        }
        Ok(())
    }

    fn admin_exists(&self, staged: &HashMap<String, bool>, key: &str) -> bool {
        staged
            .get(key)
            .copied()
            .unwrap_or_else(|| self.admins.contains_key(key))
    }

    fn staged_balance(&self, balances: &HashMap<&str, Decimal>, account: &str) -> Decimal {
        balances.get(account).copied().unwrap_or_else(|| {
            self.accounts
                .get(account)
                .map(|a| a.balance.value())
                .unwrap_or(Decimal::ZERO)
        })
    }

    fn apply(&mut self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        for op in ops {
            match op {
                WriteOp::InsertAccount(account) => {
                    self.accounts.insert(account.account_number.clone(), account);
                }
                WriteOp::UpdateAccount(mut account) => {
                    if let Some(current) = self.accounts.get(&account.account_number) {
                        account.balance = current.balance;
                    }
                    self.accounts.insert(account.account_number.clone(), account);
                }
                WriteOp::DeleteAccount(number) => {
                    self.accounts.remove(&number);
                }
                WriteOp::Debit { account, amount } => {
                    let row = self
                        .accounts
                        .get_mut(&account)
                        .ok_or_else(|| StoreError::not_found("account", account.clone()))?;
                    row.balance = row
                        .balance
                        .debit(&amount)
                        .map_err(|_| StoreError::InsufficientBalance(account.clone()))?;
                }
                WriteOp::Credit { account, amount } => {
                    let row = self
                        .accounts
                        .get_mut(&account)
                        .ok_or_else(|| StoreError::not_found("account", account.clone()))?;
                    row.balance = row
                        .balance
                        .credit(&amount)
                        .map_err(|_| StoreError::BalanceLimit(account.clone()))?;
                }
                WriteOp::AppendTransaction(record) => {
                    self.tx_index.insert(record.id.clone(), self.transactions.len());
                    self.transactions.push(record);
                }
                WriteOp::ReverseTransaction { id, actor, at } => {
                    if let Some(&i) = self.tx_index.get(&id) {
                        let record = &mut self.transactions[i];
                        record.status = TransactionStatus::Reversed;
                        record.rolled_back_by = Some(actor);
                        record.rolled_back_at = Some(at);
                    }
                }
                WriteOp::SaveLoanRequest(request) => {
                    self.loans.insert(request.id, request);
                }
                WriteOp::SaveDeletionRequest(request) => {
                    self.deletions.insert(request.id, request);
                }
                WriteOp::InsertAdmin(admin) | WriteOp::UpdateAdmin(admin) => {
                    self.admins.insert(admin.username.to_lowercase(), admin);
                }
                WriteOp::DeleteAdmin(username) => {
                    self.admins.remove(&username.to_lowercase());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn account(&self, account_number: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.state().accounts.get(account_number).cloned())
    }

    async fn account_by_gov_id(&self, gov_id_number: &str) -> Result<Option<Account>, StoreError> {
        let needle = gov_id_number.trim();
        Ok(self
            .state()
            .accounts
            .values()
            .find(|a| a.gov_id_number.eq_ignore_ascii_case(needle))
            .cloned())
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self.state().accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.account_number.cmp(&b.account_number));
        Ok(accounts)
    }

    async fn transaction(&self, id: &str) -> Result<Option<TransactionRecord>, StoreError> {
        let state = self.state();
        Ok(state.tx_index.get(id).map(|&i| state.transactions[i].clone()))
    }

    async fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(self
            .state()
            .transactions
            .iter()
            .rev()
            .filter(|tx| filter.matches(tx))
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn loan_request(&self, id: Uuid) -> Result<Option<LoanRequest>, StoreError> {
        Ok(self.state().loans.get(&id).cloned())
    }

    async fn loan_requests(
        &self,
        account_number: Option<&str>,
        status: Option<LoanStatus>,
    ) -> Result<Vec<LoanRequest>, StoreError> {
        let mut requests: Vec<LoanRequest> = self
            .state()
            .loans
            .values()
            .filter(|r| account_number.map_or(true, |a| r.account_number == a))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(requests)
    }

    async fn deletion_request(&self, id: Uuid) -> Result<Option<DeletionRequest>, StoreError> {
        Ok(self.state().deletions.get(&id).cloned())
    }

    async fn deletion_requests(&self, status: Option<DeletionStatus>) -> Result<Vec<DeletionRequest>, StoreError> {
        let mut requests: Vec<DeletionRequest> = self
            .state()
            .deletions
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(requests)
    }

    async fn admin(&self, username: &str) -> Result<Option<AdminUser>, StoreError> {
        Ok(self.state().admins.get(&username.trim().to_lowercase()).cloned())
    }

    async fn admins(&self) -> Result<Vec<AdminUser>, StoreError> {
        let mut admins: Vec<AdminUser> = self.state().admins.values().cloned().collect();
        admins.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(admins)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check(batch.ops())?;
        state.apply(batch.into_ops())
    }

    async fn mark_inactive(&self, idle_since: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let mut state = self.state();
        let mut flipped = Vec::new();
        for account in state.accounts.values_mut() {
            if account.status == AccountStatus::Active
                && !account.is_deleted
                && account.last_activity < idle_since
            {
                account.status = AccountStatus::Inactive;
                flipped.push(account.account_number.clone());
            }
        }
        flipped.sort();
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;
    use crate::model::account::fixtures::account;
    use crate::model::TransactionType;
    use rust_decimal_macros::dec;

    fn amount(v: i64) -> Amount {
        Amount::from_integer(v).unwrap()
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .commit(
                WriteBatch::new()
                    .push(WriteOp::InsertAccount(account("12345678901", dec!(500))))
                    .push(WriteOp::InsertAccount(account("10987654321", dec!(100)))),
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let store = seeded().await;
        let record = TransactionRecord::new(
            TransactionType::Transfer,
            Some("12345678901".into()),
            Some("10987654321".into()),
            amount(600),
            None,
            Utc::now(),
        );

        // Credit first, then a debit that cannot be covered
        let batch = WriteBatch::new()
            .credit("10987654321", amount(600))
            .debit("12345678901", amount(600))
            .append(record);
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientBalance(_)));

        let to = store.account("10987654321").await.unwrap().unwrap();
        assert_eq!(to.balance.value(), dec!(100));
        assert!(store.transactions(&TransactionFilter::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_staged_debits_accumulate() {
        let store = seeded().await;
        let batch = WriteBatch::new()
            .debit("12345678901", amount(300))
            .debit("12345678901", amount(300));
        assert!(store.commit(batch).await.is_err());
        assert_eq!(store.account("12345678901").await.unwrap().unwrap().balance.value(), dec!(500));
    }

    #[tokio::test]
    async fn test_update_account_never_touches_balance() {
        let store = seeded().await;
        let mut stale = store.account("12345678901").await.unwrap().unwrap();
        store.commit(WriteBatch::new().debit("12345678901", amount(200))).await.unwrap();

        stale.holder_name = "Asha R".to_string();
        store.commit(WriteBatch::new().update_account(&stale)).await.unwrap();

        let now = store.account("12345678901").await.unwrap().unwrap();
        assert_eq!(now.holder_name, "Asha R");
        assert_eq!(now.balance.value(), dec!(300));
    }

    #[tokio::test]
    async fn test_reverse_is_conditional() {
        let store = seeded().await;
        let record = TransactionRecord::new(
            TransactionType::Deposit,
            None,
            Some("12345678901".into()),
            amount(10),
            None,
            Utc::now(),
        );
        let id = record.id.clone();
        store.commit(WriteBatch::new().append(record)).await.unwrap();

        let reverse = || WriteOp::ReverseTransaction {
            id: id.clone(),
            actor: "admin".into(),
            at: Utc::now(),
        };
        store.commit(WriteBatch::new().push(reverse())).await.unwrap();
        let err = store.commit(WriteBatch::new().push(reverse())).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyReversed(_)));

        let tx = store.transaction(&id).await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Reversed);
        assert_eq!(tx.rolled_back_by.as_deref(), Some("admin"));
    }

    #[tokio::test]
    async fn test_duplicate_government_id() {
        let store = seeded().await;
        let mut clash = account("55555555555", dec!(0));
        clash.gov_id_number = store.account("12345678901").await.unwrap().unwrap().gov_id_number.to_lowercase();
        let err = store
            .commit(WriteBatch::new().push(WriteOp::InsertAccount(clash)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_mark_inactive() {
        let store = InMemoryStore::new();
        let mut idle = account("12345678901", dec!(0));
        idle.last_activity = Utc::now() - chrono::Duration::days(400);
        store
            .commit(
                WriteBatch::new()
                    .push(WriteOp::InsertAccount(idle))
                    .push(WriteOp::InsertAccount(account("10987654321", dec!(0)))),
            )
            .await
            .unwrap();

        let flipped = store.mark_inactive(Utc::now() - chrono::Duration::days(180)).await.unwrap();
        assert_eq!(flipped, vec!["12345678901".to_string()]);
        assert_eq!(
            store.account("12345678901").await.unwrap().unwrap().status,
            AccountStatus::Inactive
        );
    }

    #[tokio::test]
    async fn test_credit_past_ceiling_is_refused() {
        let store = InMemoryStore::new();
        store
            .commit(WriteBatch::new().push(WriteOp::InsertAccount(account("12345678901", Balance::MAX - dec!(50)))))
            .await
            .unwrap();

        let err = store
            .commit(WriteBatch::new().credit("12345678901", amount(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BalanceLimit(_)));
        assert!(!err.is_infrastructure());

        store.commit(WriteBatch::new().credit("12345678901", amount(50))).await.unwrap();
        let full = store.account("12345678901").await.unwrap().unwrap();
        assert_eq!(full.balance.value(), Balance::MAX);
    }

    #[tokio::test]
    async fn test_admin_rows() {
        let store = InMemoryStore::new();
        let admin = crate::model::admin::fixtures::admin("ravishankar");
        store.commit(WriteBatch::new().push(WriteOp::InsertAdmin(admin.clone()))).await.unwrap();

        let err = store
            .commit(WriteBatch::new().push(WriteOp::InsertAdmin(admin.clone())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert!(store.admin("RaviShankar").await.unwrap().is_some());

        store
            .commit(WriteBatch::new().push(WriteOp::DeleteAdmin("ravishankar".into())))
            .await
            .unwrap();
        assert!(store.admins().await.unwrap().is_empty());

        let err = store.commit(WriteBatch::new().update_admin(&admin)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
