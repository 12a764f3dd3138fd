//! Database module
//!
//! Connectivity and schema checks. The schema itself lives in
//! `migrations/` as raw SQL.

use sqlx::PgPool;

/// Tables the ledger store and audit sink write to
const REQUIRED_TABLES: [&str; 6] = [
    "accounts",
    "admin_users",
    "transactions",
    "loan_requests",
    "deletion_requests",
    "audit_log",
];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    tracing::debug!(tables = REQUIRED_TABLES.len(), "Schema verified");
    Ok(true)
}
