//! PostgreSQL store
//!
//! Every batch runs inside one database transaction. Debits and reversals
//! carry their precondition in the WHERE clause, so a concurrent writer
//! can never push a balance negative or reverse a row twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use uuid::Uuid;

use crate::domain::{Amount, Balance, EmiPlan, Gender, GovIdType};
use crate::model::{
    Account, AccountStatus, AccountType, AdminUser, DeletionRequest, DeletionStatus, LoanMetadata,
    LoanRequest, LoanStatus, LockTrack, TransactionRecord, TransactionStatus, TransactionType,
};

use super::{LedgerStore, StoreError, TransactionFilter, WriteBatch, WriteOp};

const ACCOUNT_COLUMNS: &str = r#"
    account_number, holder_name, email, phone, address, gender,
    gov_id_type, gov_id_number, gov_id_proof, branch, ifsc, date_of_birth,
    account_type, balance, login_secret, transaction_secret,
    failed_attempts, is_locked, lock_time, tx_failed_attempts, tx_locked, tx_lock_time,
    status, deletion_requested, is_deleted,
    loan_principal, loan_interest_rate, loan_total_due, loan_type, loan_emi_plan, loan_taken_at,
    loan_last_paid_at, auto_repayment, created_at, last_activity
"#;

const TRANSACTION_COLUMNS: &str =
    "id, tx_type, from_account, to_account, amount, category, status, created_at, rolled_back_by, rolled_back_at";

const LOAN_COLUMNS: &str = r#"
    id, account_number, amount, interest_rate, loan_type, emi_plan, gov_id_echo, kyc_proof,
    status, admin_comment, processed_by, requested_at, processed_at
"#;

const DELETION_COLUMNS: &str = r#"
    id, account_number, requester_name, contact, ifsc, reason, status,
    admin_comment, processed_by, requested_at, processed_at, had_loan
"#;

const ADMIN_COLUMNS: &str = r#"
    username, holder_name, email, phone, password_hash,
    failed_attempts, is_locked, lock_time, created_at, last_login_at
"#;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // =========================================================================
    // Batch ops
    // =========================================================================

    async fn apply(&self, tx: &mut Transaction<'_, Postgres>, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::InsertAccount(account) => insert_account(tx, &account).await,
            WriteOp::UpdateAccount(account) => update_account(tx, &account).await,
            WriteOp::DeleteAccount(number) => {
                let result = sqlx::query("DELETE FROM accounts WHERE account_number = $1")
                    .bind(&number)
                    .execute(&mut **tx)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::not_found("account", number));
                }
                Ok(())
            }
            WriteOp::Debit { account, amount } => {
                let result = sqlx::query(
                    r#"
                    UPDATE accounts
                    SET balance = balance - $2
                    WHERE account_number = $1 AND balance >= $2
                    "#,
                )
                .bind(&account)
                .bind(amount.value())
                .execute(&mut **tx)
                .await?;
                if result.rows_affected() == 0 {
                    let short = StoreError::InsufficientBalance(account.clone());
                    return Err(self.write_failure(tx, account, short).await);
                }
                Ok(())
            }
            WriteOp::Credit { account, amount } => {
                let result = sqlx::query(
                    r#"
                    UPDATE accounts
                    SET balance = balance + $2
                    WHERE account_number = $1 AND balance + $2 <= $3
                    "#,
                )
                .bind(&account)
                .bind(amount.value())
                .bind(Balance::MAX)
                .execute(&mut **tx)
                .await?;
                if result.rows_affected() == 0 {
                    let limit = StoreError::BalanceLimit(account.clone());
                    return Err(self.write_failure(tx, account, limit).await);
                }
                Ok(())
            }
            WriteOp::AppendTransaction(record) => {
                sqlx::query(
                    r#"
                    INSERT INTO transactions (
                        id, tx_type, from_account, to_account, amount, category,
                        status, created_at, rolled_back_by, rolled_back_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                    "#,
                )
                .bind(&record.id)
                .bind(record.tx_type.as_str())
                .bind(&record.from_account)
                .bind(&record.to_account)
                .bind(record.amount.value())
                .bind(&record.category)
                .bind(record.status.as_str())
                .bind(record.created_at)
                .bind(&record.rolled_back_by)
                .bind(record.rolled_back_at)
                .execute(&mut **tx)
                .await?;
                Ok(())
            }
            WriteOp::ReverseTransaction { id, actor, at } => {
                let result = sqlx::query(
                    r#"
                    UPDATE transactions
                    SET status = 'REVERSED', rolled_back_by = $2, rolled_back_at = $3
                    WHERE id = $1 AND status = 'SUCCESS'
                    "#,
                )
                .bind(&id)
                .bind(&actor)
                .bind(at)
                .execute(&mut **tx)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::AlreadyReversed(id));
                }
                Ok(())
            }
            WriteOp::SaveLoanRequest(request) => save_loan_request(tx, &request).await,
            WriteOp::SaveDeletionRequest(request) => save_deletion_request(tx, &request).await,
            WriteOp::InsertAdmin(admin) => insert_admin(tx, &admin).await,
            WriteOp::UpdateAdmin(admin) => update_admin(tx, &admin).await,
            WriteOp::DeleteAdmin(username) => {
                let result = sqlx::query("DELETE FROM admin_users WHERE LOWER(username) = LOWER($1)")
                    .bind(&username)
                    .execute(&mut **tx)
                    .await?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::not_found("admin", username));
                }
                Ok(())
            }
        }
    }

    /// Tell a missing account apart from a failed balance condition
    async fn write_failure(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        account: String,
        condition: StoreError,
    ) -> StoreError {
        let exists: Result<bool, sqlx::Error> =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE account_number = $1)")
                .bind(&account)
                .fetch_one(&mut **tx)
                .await;
        match exists {
            Ok(true) => condition,
            Ok(false) => StoreError::not_found("account", account),
            Err(e) => StoreError::Database(e),
        }
    }
}

fn classify(err: sqlx::Error) -> StoreError {
    if let Some(db) = err.as_database_error() {
        if db.code().as_deref() == Some("23505") {
            return StoreError::Duplicate(db.constraint().unwrap_or("row").to_string());
        }
    }
    StoreError::Database(err)
}

async fn insert_account(tx: &mut Transaction<'_, Postgres>, a: &Account) -> Result<(), StoreError> {
    let loan = a.loan.as_ref();
    sqlx::query(&format!(
        "INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
            $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34, $35
        )"
    ))
    .bind(&a.account_number)
    .bind(&a.holder_name)
    .bind(&a.email)
    .bind(&a.phone)
    .bind(&a.address)
    .bind(a.gender.as_str())
    .bind(a.gov_id_type.as_str())
    .bind(&a.gov_id_number)
    .bind(&a.gov_id_proof)
    .bind(&a.branch)
    .bind(&a.ifsc)
    .bind(a.date_of_birth)
    .bind(a.account_type.as_str())
    .bind(a.balance.value())
    .bind(&a.login_secret)
    .bind(&a.transaction_secret)
    .bind(a.login_track.failures() as i32)
    .bind(a.login_track.is_locked())
    .bind(a.login_track.locked_since())
    .bind(a.tx_track.failures() as i32)
    .bind(a.tx_track.is_locked())
    .bind(a.tx_track.locked_since())
    .bind(a.status.as_str())
    .bind(a.deletion_requested)
    .bind(a.is_deleted)
    .bind(loan.map(|l| l.principal))
    .bind(loan.map(|l| l.interest_rate))
    .bind(loan.map(|l| l.total_due))
    .bind(loan.map(|l| l.loan_type.clone()))
    .bind(loan.map(|l| l.emi_plan.as_str()))
    .bind(loan.map(|l| l.taken_at))
    .bind(a.loan_last_paid_at)
    .bind(a.auto_repayment)
    .bind(a.created_at)
    .bind(a.last_activity)
    .execute(&mut **tx)
    .await
    .map_err(classify)?;
    Ok(())
}

async fn update_account(tx: &mut Transaction<'_, Postgres>, a: &Account) -> Result<(), StoreError> {
    let loan = a.loan.as_ref();
    let result = sqlx::query(
        r#"
        UPDATE accounts SET
            holder_name = $2, email = $3, phone = $4, address = $5, gender = $6,
            gov_id_type = $7, gov_id_number = $8, gov_id_proof = $9, branch = $10, ifsc = $11,
            date_of_birth = $12, account_type = $13, login_secret = $14, transaction_secret = $15,
            failed_attempts = $16, is_locked = $17, lock_time = $18,
            tx_failed_attempts = $19, tx_locked = $20, tx_lock_time = $21,
            status = $22, deletion_requested = $23, is_deleted = $24,
            loan_principal = $25, loan_interest_rate = $26, loan_total_due = $27,
            loan_type = $28, loan_emi_plan = $29, loan_taken_at = $30,
            loan_last_paid_at = $31, auto_repayment = $32, last_activity = $33
        WHERE account_number = $1
        "#,
    )
    .bind(&a.account_number)
    .bind(&a.holder_name)
    .bind(&a.email)
    .bind(&a.phone)
    .bind(&a.address)
    .bind(a.gender.as_str())
    .bind(a.gov_id_type.as_str())
    .bind(&a.gov_id_number)
    .bind(&a.gov_id_proof)
    .bind(&a.branch)
    .bind(&a.ifsc)
    .bind(a.date_of_birth)
    .bind(a.account_type.as_str())
    .bind(&a.login_secret)
    .bind(&a.transaction_secret)
    .bind(a.login_track.failures() as i32)
    .bind(a.login_track.is_locked())
    .bind(a.login_track.locked_since())
    .bind(a.tx_track.failures() as i32)
    .bind(a.tx_track.is_locked())
    .bind(a.tx_track.locked_since())
    .bind(a.status.as_str())
    .bind(a.deletion_requested)
    .bind(a.is_deleted)
    .bind(loan.map(|l| l.principal))
    .bind(loan.map(|l| l.interest_rate))
    .bind(loan.map(|l| l.total_due))
    .bind(loan.map(|l| l.loan_type.clone()))
    .bind(loan.map(|l| l.emi_plan.as_str()))
    .bind(loan.map(|l| l.taken_at))
    .bind(a.loan_last_paid_at)
    .bind(a.auto_repayment)
    .bind(a.last_activity)
    .execute(&mut **tx)
    .await
    .map_err(classify)?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("account", a.account_number.clone()));
    }
    Ok(())
}

async fn save_loan_request(tx: &mut Transaction<'_, Postgres>, r: &LoanRequest) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO loan_requests ({LOAN_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            admin_comment = EXCLUDED.admin_comment,
            processed_by = EXCLUDED.processed_by,
            processed_at = EXCLUDED.processed_at"
    ))
    .bind(r.id)
    .bind(&r.account_number)
    .bind(r.amount.value())
    .bind(r.interest_rate)
    .bind(&r.loan_type)
    .bind(r.emi_plan.as_str())
    .bind(&r.gov_id_echo)
    .bind(&r.kyc_proof)
    .bind(r.status.as_str())
    .bind(&r.admin_comment)
    .bind(&r.processed_by)
    .bind(r.requested_at)
    .bind(r.processed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn save_deletion_request(tx: &mut Transaction<'_, Postgres>, r: &DeletionRequest) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO deletion_requests ({DELETION_COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            admin_comment = EXCLUDED.admin_comment,
            processed_by = EXCLUDED.processed_by,
            processed_at = EXCLUDED.processed_at"
    ))
    .bind(r.id)
    .bind(&r.account_number)
    .bind(&r.requester_name)
    .bind(&r.contact)
    .bind(&r.ifsc)
    .bind(&r.reason)
    .bind(r.status.as_str())
    .bind(&r.admin_comment)
    .bind(&r.processed_by)
    .bind(r.requested_at)
    .bind(r.processed_at)
    .bind(r.had_loan)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_admin(tx: &mut Transaction<'_, Postgres>, a: &AdminUser) -> Result<(), StoreError> {
    sqlx::query(&format!(
        "INSERT INTO admin_users ({ADMIN_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
    ))
    .bind(&a.username)
    .bind(&a.holder_name)
    .bind(&a.email)
    .bind(&a.phone)
    .bind(&a.password_hash)
    .bind(a.login_track.failures() as i32)
    .bind(a.login_track.is_locked())
    .bind(a.login_track.locked_since())
    .bind(a.created_at)
    .bind(a.last_login_at)
    .execute(&mut **tx)
    .await
    .map_err(classify)?;
    Ok(())
}

async fn update_admin(tx: &mut Transaction<'_, Postgres>, a: &AdminUser) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE admin_users SET
            holder_name = $2, email = $3, phone = $4, password_hash = $5,
            failed_attempts = $6, is_locked = $7, lock_time = $8, last_login_at = $9
        WHERE LOWER(username) = LOWER($1)
        "#,
    )
    .bind(&a.username)
    .bind(&a.holder_name)
    .bind(&a.email)
    .bind(&a.phone)
    .bind(&a.password_hash)
    .bind(a.login_track.failures() as i32)
    .bind(a.login_track.is_locked())
    .bind(a.login_track.locked_since())
    .bind(a.last_login_at)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("admin", a.username.clone()));
    }
    Ok(())
}

// =========================================================================
// Row mapping
// =========================================================================

fn corrupt(e: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(e.to_string())
}

fn lock_track(failures: i32, locked: bool, since: Option<DateTime<Utc>>) -> LockTrack {
    match (locked, since) {
        (true, Some(since)) => LockTrack::Locked { since },
        (true, None) => LockTrack::Locked { since: Utc::now() },
        (false, _) => LockTrack::Unlocked {
            failures: failures.max(0) as u32,
        },
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let loan = match row.try_get::<Option<Decimal>, _>("loan_principal")? {
        Some(principal) => {
            let plan: Option<String> = row.try_get("loan_emi_plan")?;
            Some(LoanMetadata {
                principal,
                interest_rate: row.try_get::<Option<Decimal>, _>("loan_interest_rate")?.unwrap_or_default(),
                total_due: row.try_get::<Option<Decimal>, _>("loan_total_due")?.unwrap_or(principal),
                loan_type: row.try_get::<Option<String>, _>("loan_type")?.unwrap_or_default(),
                emi_plan: EmiPlan::parse(plan.as_deref().unwrap_or("MONTHLY")).map_err(corrupt)?,
                taken_at: row.try_get::<Option<DateTime<Utc>>, _>("loan_taken_at")?.unwrap_or_else(Utc::now),
            })
        }
        None => None,
    };

    Ok(Account {
        account_number: row.try_get("account_number")?,
        holder_name: row.try_get("holder_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        gender: Gender::parse(row.try_get("gender")?).map_err(corrupt)?,
        gov_id_type: GovIdType::parse(row.try_get("gov_id_type")?).map_err(corrupt)?,
        gov_id_number: row.try_get("gov_id_number")?,
        gov_id_proof: row.try_get("gov_id_proof")?,
        branch: row.try_get("branch")?,
        ifsc: row.try_get("ifsc")?,
        date_of_birth: row.try_get("date_of_birth")?,
        account_type: AccountType::parse(row.try_get("account_type")?).map_err(corrupt)?,
        balance: Balance::new(row.try_get("balance")?).map_err(corrupt)?,
        login_secret: row.try_get("login_secret")?,
        transaction_secret: row.try_get("transaction_secret")?,
        login_track: lock_track(
            row.try_get("failed_attempts")?,
            row.try_get("is_locked")?,
            row.try_get("lock_time")?,
        ),
        tx_track: lock_track(
            row.try_get("tx_failed_attempts")?,
            row.try_get("tx_locked")?,
            row.try_get("tx_lock_time")?,
        ),
        status: AccountStatus::try_from(row.try_get::<String, _>("status")?).map_err(corrupt)?,
        deletion_requested: row.try_get("deletion_requested")?,
        is_deleted: row.try_get("is_deleted")?,
        loan,
        loan_last_paid_at: row.try_get("loan_last_paid_at")?,
        auto_repayment: row.try_get("auto_repayment")?,
        created_at: row.try_get("created_at")?,
        last_activity: row.try_get("last_activity")?,
    })
}

fn transaction_from_row(row: &PgRow) -> Result<TransactionRecord, StoreError> {
    let tx_type: String = row.try_get("tx_type")?;
    Ok(TransactionRecord {
        id: row.try_get("id")?,
        tx_type: TransactionType::parse(&tx_type)
            .ok_or_else(|| corrupt(format!("unknown transaction type {tx_type}")))?,
        from_account: row.try_get("from_account")?,
        to_account: row.try_get("to_account")?,
        amount: Amount::new(row.try_get("amount")?).map_err(corrupt)?,
        category: row.try_get("category")?,
        status: TransactionStatus::try_from(row.try_get::<String, _>("status")?).map_err(corrupt)?,
        created_at: row.try_get("created_at")?,
        rolled_back_by: row.try_get("rolled_back_by")?,
        rolled_back_at: row.try_get("rolled_back_at")?,
    })
}

fn loan_request_from_row(row: &PgRow) -> Result<LoanRequest, StoreError> {
    Ok(LoanRequest {
        id: row.try_get("id")?,
        account_number: row.try_get("account_number")?,
        amount: Amount::new(row.try_get("amount")?).map_err(corrupt)?,
        interest_rate: row.try_get("interest_rate")?,
        loan_type: row.try_get("loan_type")?,
        emi_plan: EmiPlan::parse(row.try_get("emi_plan")?).map_err(corrupt)?,
        gov_id_echo: row.try_get("gov_id_echo")?,
        kyc_proof: row.try_get("kyc_proof")?,
        status: LoanStatus::try_from(row.try_get::<String, _>("status")?).map_err(corrupt)?,
        admin_comment: row.try_get("admin_comment")?,
        processed_by: row.try_get("processed_by")?,
        requested_at: row.try_get("requested_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn deletion_request_from_row(row: &PgRow) -> Result<DeletionRequest, StoreError> {
    Ok(DeletionRequest {
        id: row.try_get("id")?,
        account_number: row.try_get("account_number")?,
        requester_name: row.try_get("requester_name")?,
        contact: row.try_get("contact")?,
        ifsc: row.try_get("ifsc")?,
        reason: row.try_get("reason")?,
        status: DeletionStatus::try_from(row.try_get::<String, _>("status")?).map_err(corrupt)?,
        admin_comment: row.try_get("admin_comment")?,
        processed_by: row.try_get("processed_by")?,
        requested_at: row.try_get("requested_at")?,
        processed_at: row.try_get("processed_at")?,
        had_loan: row.try_get("had_loan")?,
    })
}

fn admin_from_row(row: &PgRow) -> Result<AdminUser, StoreError> {
    Ok(AdminUser {
        username: row.try_get("username")?,
        holder_name: row.try_get("holder_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        password_hash: row.try_get("password_hash")?,
        login_track: lock_track(
            row.try_get("failed_attempts")?,
            row.try_get("is_locked")?,
            row.try_get("lock_time")?,
        ),
        created_at: row.try_get("created_at")?,
        last_login_at: row.try_get("last_login_at")?,
    })
}

// =========================================================================
// Port
// =========================================================================

#[async_trait]
impl LedgerStore for PgStore {
    async fn account(&self, account_number: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_number = $1"))
            .bind(account_number)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn account_by_gov_id(&self, gov_id_number: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE UPPER(gov_id_number) = UPPER($1)"
        ))
        .bind(gov_id_number.trim())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY account_number"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(account_from_row)
            .collect()
    }

    async fn transaction(&self, id: &str) -> Result<Option<TransactionRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE TRUE"));

        if let Some(from) = filter.from {
            qb.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND created_at <= ").push_bind(to);
        }
        if let Some(tx_type) = filter.tx_type {
            qb.push(" AND tx_type = ").push_bind(tx_type.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(category) = &filter.category {
            qb.push(" AND LOWER(category) = LOWER(").push_bind(category.clone()).push(")");
        }
        if let Some(account) = &filter.account {
            qb.push(" AND (from_account = ")
                .push_bind(account.clone())
                .push(" OR to_account = ")
                .push_bind(account.clone())
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC, seq DESC LIMIT ")
            .push_bind(filter.limit as i64)
            .push(" OFFSET ")
            .push_bind(filter.offset as i64);

        qb.build()
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(transaction_from_row)
            .collect()
    }

    async fn loan_request(&self, id: Uuid) -> Result<Option<LoanRequest>, StoreError> {
        let row = sqlx::query(&format!("SELECT {LOAN_COLUMNS} FROM loan_requests WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(loan_request_from_row).transpose()
    }

    async fn loan_requests(
        &self,
        account_number: Option<&str>,
        status: Option<LoanStatus>,
    ) -> Result<Vec<LoanRequest>, StoreError> {
        sqlx::query(&format!(
            r#"
            SELECT {LOAN_COLUMNS} FROM loan_requests
            WHERE ($1::TEXT IS NULL OR account_number = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY requested_at DESC
            "#
        ))
        .bind(account_number)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(loan_request_from_row)
        .collect()
    }

    async fn deletion_request(&self, id: Uuid) -> Result<Option<DeletionRequest>, StoreError> {
        let row = sqlx::query(&format!("SELECT {DELETION_COLUMNS} FROM deletion_requests WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(deletion_request_from_row).transpose()
    }

    async fn deletion_requests(&self, status: Option<DeletionStatus>) -> Result<Vec<DeletionRequest>, StoreError> {
        sqlx::query(&format!(
            r#"
            SELECT {DELETION_COLUMNS} FROM deletion_requests
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY requested_at ASC
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(deletion_request_from_row)
        .collect()
    }

    async fn admin(&self, username: &str) -> Result<Option<AdminUser>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users WHERE LOWER(username) = LOWER($1)"
        ))
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(admin_from_row).transpose()
    }

    async fn admins(&self) -> Result<Vec<AdminUser>, StoreError> {
        sqlx::query(&format!("SELECT {ADMIN_COLUMNS} FROM admin_users ORDER BY username"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(admin_from_row)
            .collect()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for op in batch.into_ops() {
            // Dropping `tx` on error rolls everything back
            self.apply(&mut tx, op).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_inactive(&self, idle_since: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let flipped: Vec<String> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET status = 'INACTIVE'
            WHERE status = 'ACTIVE' AND NOT is_deleted AND last_activity < $1
            RETURNING account_number
            "#,
        )
        .bind(idle_since)
        .fetch_all(&self.pool)
        .await?;

        if !flipped.is_empty() {
            tracing::info!(accounts = flipped.len(), "Marked idle accounts inactive");
        }
        Ok(flipped)
    }
}
