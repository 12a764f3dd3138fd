//! Query Handler
//!
//! Read-only views: balances, statements, transaction search, locked
//! accounts and rendered reports.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::{OperationContext, Role};
use crate::error::AppResult;
use crate::model::{Account, TransactionRecord};
use crate::report::{CsvReportRenderer, ReportRenderer};
use crate::store::TransactionFilter;

use super::LedgerCore;

/// Upper bound on rows returned by a full history listing
const HISTORY_LIMIT: usize = 10_000;

pub struct QueryHandler {
    core: LedgerCore,
    renderer: Arc<dyn ReportRenderer>,
}

impl QueryHandler {
    pub fn new(core: LedgerCore) -> Self {
        Self {
            core,
            renderer: Arc::new(CsvReportRenderer::new()),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ReportRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub async fn balance(&self, account_number: &str, context: &OperationContext) -> AppResult<Decimal> {
        let number = account_number.trim();
        self.core.authorize_account(context, number)?;
        let account = self.core.load_account(number).await?;
        account.ensure_not_deleted()?;
        Ok(account.balance.value())
    }

    /// Full history of one account, newest first
    pub async fn transactions_for(&self, account_number: &str, context: &OperationContext) -> AppResult<Vec<TransactionRecord>> {
        let number = account_number.trim();
        self.core.authorize_account(context, number)?;
        let filter = TransactionFilter::for_account(number).page(HISTORY_LIMIT, 0);
        Ok(self.core.store().transactions(&filter).await?)
    }

    /// Most recent `count` entries, newest first
    pub async fn mini_statement(
        &self,
        account_number: &str,
        count: usize,
        context: &OperationContext,
    ) -> AppResult<Vec<TransactionRecord>> {
        let number = account_number.trim();
        self.core.authorize_account(context, number)?;
        let filter = TransactionFilter::for_account(number).page(count, 0);
        Ok(self.core.store().transactions(&filter).await?)
    }

    /// Search; customers are confined to their own account
    pub async fn filter(&self, filter: TransactionFilter, context: &OperationContext) -> AppResult<Vec<TransactionRecord>> {
        let filter = match context.role {
            Role::Customer => {
                let own = context.session_account.clone().unwrap_or_default();
                context.require_session_for(filter.account.as_deref().unwrap_or(&own))?;
                filter.with_account(&own)
            }
            Role::Admin | Role::System => filter,
        };
        Ok(self.core.store().transactions(&filter).await?)
    }

    /// Accounts whose login track is locked
    pub async fn locked_accounts(&self, context: &OperationContext) -> AppResult<Vec<Account>> {
        context.require_admin()?;
        let accounts = self.core.store().accounts().await?;
        Ok(accounts.into_iter().filter(|a| a.login_track.is_locked()).collect())
    }

    pub async fn account_report(&self, access_key: Option<&str>, context: &OperationContext) -> AppResult<Vec<u8>> {
        context.require_admin()?;
        let accounts = self.core.store().accounts().await?;
        let document = self.renderer.render_accounts(&accounts, access_key)?;
        tracing::info!(rows = accounts.len(), bytes = document.len(), "Account report rendered");
        Ok(document)
    }

    pub async fn transaction_report(
        &self,
        filter: TransactionFilter,
        access_key: Option<&str>,
        context: &OperationContext,
    ) -> AppResult<Vec<u8>> {
        let transactions = self.filter(filter, context).await?;
        let document = self.renderer.render_transactions(&transactions, access_key)?;
        tracing::info!(rows = transactions.len(), bytes = document.len(), "Transaction report rendered");
        Ok(document)
    }
}
