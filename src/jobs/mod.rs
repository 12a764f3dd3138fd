//! Scheduled Jobs
//!
//! Background jobs for periodic maintenance tasks: expiring one-time
//! codes, forgetting stale duplicate-request keys and marking idle
//! accounts INACTIVE.

use chrono::{DateTime, Duration as ChronoDuration, Months, Utc};
use std::time::Duration;
use tokio::time::interval;

use crate::audit::{AuditAction, AuditLogBuilder};
use crate::config::Config;
use crate::domain::OperationContext;
use crate::handlers::LedgerCore;
use crate::store::StoreError;

// =========================================================================
// One-time code purge
// =========================================================================

/// Drop consumed and expired one-time codes
pub async fn purge_expired_otps(core: &LedgerCore) -> Result<u64, JobError> {
    let rows_deleted = core.otp().purge_expired(Utc::now()) as u64;

    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Purged expired one-time codes");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Duplicate guard sweep
// =========================================================================

/// Forget duplicate-request keys older than the window and release idle
/// account lock slots
pub async fn sweep_duplicate_guard(core: &LedgerCore) -> Result<u64, JobError> {
    let rows_deleted = core.guard().sweep(Utc::now()) as u64;
    let slots_released = core.locks().prune();

    if rows_deleted > 0 || slots_released > 0 {
        tracing::debug!(
            rows_deleted = rows_deleted,
            slots_released = slots_released,
            "Swept duplicate-request keys"
        );
    }

    Ok(rows_deleted)
}

// =========================================================================
// Inactivity marking
// =========================================================================

/// Flip ACTIVE accounts with no activity for the configured months to INACTIVE
pub async fn mark_inactive_accounts(core: &LedgerCore) -> Result<u64, JobError> {
    let months = core.policy().inactivity_months;
    let idle_since = idle_cutoff(Utc::now(), months);

    let flipped = core.store().mark_inactive(idle_since).await?;
    if flipped.is_empty() {
        return Ok(0);
    }

    let context = OperationContext::system();
    for account in &flipped {
        core.audit()
            .record(
                AuditLogBuilder::new(AuditAction::AccountInactive)
                    .account(account)
                    .description(format!("No activity for {months} months")),
                &context,
            )
            .await;
    }

    tracing::info!(rows_affected = flipped.len(), "Marked idle accounts INACTIVE");
    Ok(flipped.len() as u64)
}

fn idle_cutoff(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or_else(|| now - ChronoDuration::days(30 * i64::from(months)))
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for one-time code purge (default: 1 minute)
    pub otp_purge_interval: Duration,
    /// Interval for duplicate guard sweep (default: 1 minute)
    pub guard_sweep_interval: Duration,
    /// Interval for inactivity marking (default: 1 hour)
    pub inactivity_check_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            otp_purge_interval: Duration::from_secs(60),
            guard_sweep_interval: Duration::from_secs(60),
            inactivity_check_interval: Duration::from_secs(3600),
        }
    }
}

impl JobSchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        let every = Duration::from_secs(config.job_interval_secs);
        Self {
            otp_purge_interval: every,
            guard_sweep_interval: every,
            ..Self::default()
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    core: LedgerCore,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    /// Create a new job scheduler
    pub fn new(core: LedgerCore) -> Self {
        Self {
            core,
            config: JobSchedulerConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(core: LedgerCore, config: JobSchedulerConfig) -> Self {
        Self { core, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut otp_interval = interval(self.config.otp_purge_interval);
        let mut guard_interval = interval(self.config.guard_sweep_interval);
        let mut inactivity_interval = interval(self.config.inactivity_check_interval);

        loop {
            tokio::select! {
                _ = otp_interval.tick() => {
                    if let Err(e) = purge_expired_otps(&self.core).await {
                        tracing::error!(error = %e, "One-time code purge failed");
                    }
                }
                _ = guard_interval.tick() => {
                    if let Err(e) = sweep_duplicate_guard(&self.core).await {
                        tracing::error!(error = %e, "Duplicate guard sweep failed");
                    }
                }
                _ = inactivity_interval.tick() => {
                    if let Err(e) = mark_inactive_accounts(&self.core).await {
                        tracing::error!(error = %e, "Inactivity marking failed");
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match purge_expired_otps(&self.core).await {
            Ok(count) => report.otps_purged = count,
            Err(e) => report.errors.push(format!("One-time code purge: {}", e)),
        }

        match sweep_duplicate_guard(&self.core).await {
            Ok(count) => report.guard_keys_swept = count,
            Err(e) => report.errors.push(format!("Duplicate guard sweep: {}", e)),
        }

        match mark_inactive_accounts(&self.core).await {
            Ok(count) => report.accounts_marked_inactive = count,
            Err(e) => report.errors.push(format!("Inactivity marking: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub otps_purged: u64,
    pub guard_keys_swept: u64,
    pub accounts_marked_inactive: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;
    use crate::handlers::test_support::harness;
    use crate::idempotency::RequestKey;
    use crate::model::account::fixtures::account;
    use crate::model::AccountStatus;
    use crate::store::{WriteBatch, WriteOp};
    use rust_decimal_macros::dec;

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.otp_purge_interval, Duration::from_secs(60));
        assert_eq!(config.guard_sweep_interval, Duration::from_secs(60));
        assert_eq!(config.inactivity_check_interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_idle_cutoff() {
        let now = "2026-08-31T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let cutoff = idle_cutoff(now, 6);
        assert_eq!(cutoff, "2026-02-28T12:00:00Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[tokio::test]
    async fn test_purge_and_sweep() {
        let core = harness().core;
        let long_ago = Utc::now() - ChronoDuration::minutes(30);
        core.otp().issue_at("12345678901", long_ago);
        core.otp().issue("10987654321");

        let key = RequestKey::deposit("12345678901", &Amount::from_integer(5).unwrap(), None);
        core.guard().seen_at(&key, long_ago);

        assert_eq!(purge_expired_otps(&core).await.unwrap(), 1);
        assert_eq!(sweep_duplicate_guard(&core).await.unwrap(), 1);
        assert_eq!(core.otp().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_inactive_accounts() {
        let h = harness();
        let core = h.core.clone();
        let mut idle = account("12345678901", dec!(0));
        idle.last_activity = Utc::now() - ChronoDuration::days(200);
        core.store()
            .commit(
                WriteBatch::new()
                    .push(WriteOp::InsertAccount(idle))
                    .push(WriteOp::InsertAccount(account("10987654321", dec!(0)))),
            )
            .await
            .unwrap();

        let report = JobScheduler::new(core.clone()).run_all_once().await;
        assert_eq!(report.accounts_marked_inactive, 1);
        assert!(report.errors.is_empty());

        let idle = core.store().account("12345678901").await.unwrap().unwrap();
        assert_eq!(idle.status, AccountStatus::Inactive);
        assert_eq!(h.audit.count(AuditAction::AccountInactive), 1);

        assert_eq!(mark_inactive_accounts(&core).await.unwrap(), 0);
    }

    #[test]
    fn test_maintenance_report_default() {
        let report = MaintenanceReport::default();
        assert_eq!(report.otps_purged, 0);
        assert_eq!(report.errors.len(), 0);
    }
}
