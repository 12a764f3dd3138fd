//! Report Renderer
//!
//! Read-side projection of account and transaction listings into a
//! document. The CSV renderer writes one serialized row per record; with
//! an access key the CSV is wrapped in an AES-256 encrypted ZIP archive.

use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;
use zip::write::FileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

use crate::model::{Account, TransactionRecord};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to flush report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build protected report: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub trait ReportRenderer: Send + Sync {
    fn render_accounts(&self, accounts: &[Account], access_key: Option<&str>) -> Result<Vec<u8>, ReportError>;

    fn render_transactions(
        &self,
        transactions: &[TransactionRecord],
        access_key: Option<&str>,
    ) -> Result<Vec<u8>, ReportError>;
}

#[derive(Debug, Serialize)]
struct AccountRow<'a> {
    account_number: &'a str,
    holder_name: &'a str,
    account_type: &'static str,
    branch: &'a str,
    ifsc: &'a str,
    balance: Decimal,
    status: &'static str,
    login_locked: bool,
    tx_locked: bool,
    has_loan: bool,
    created_at: DateTime<Utc>,
}

impl<'a> From<&'a Account> for AccountRow<'a> {
    fn from(a: &'a Account) -> Self {
        Self {
            account_number: &a.account_number,
            holder_name: &a.holder_name,
            account_type: a.account_type.as_str(),
            branch: &a.branch,
            ifsc: &a.ifsc,
            balance: a.balance.value(),
            status: a.status.as_str(),
            login_locked: a.login_track.is_locked(),
            tx_locked: a.tx_track.is_locked(),
            has_loan: a.has_loan(),
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct TransactionRow<'a> {
    id: &'a str,
    tx_type: &'static str,
    from_account: Option<&'a str>,
    to_account: Option<&'a str>,
    amount: Decimal,
    category: &'a str,
    status: &'static str,
    created_at: DateTime<Utc>,
    rolled_back_by: Option<&'a str>,
}

impl<'a> From<&'a TransactionRecord> for TransactionRow<'a> {
    fn from(t: &'a TransactionRecord) -> Self {
        Self {
            id: &t.id,
            tx_type: t.tx_type.as_str(),
            from_account: t.from_account.as_deref(),
            to_account: t.to_account.as_deref(),
            amount: t.amount.value(),
            category: &t.category,
            status: t.status.as_str(),
            created_at: t.created_at,
            rolled_back_by: t.rolled_back_by.as_deref(),
        }
    }
}

/// CSV output; a non-blank access key yields `<name>.csv` inside an
/// AES-256 encrypted ZIP archive
#[derive(Debug, Default, Clone)]
pub struct CsvReportRenderer;

impl CsvReportRenderer {
    pub fn new() -> Self {
        Self
    }

    fn write<T: Serialize>(
        name: &str,
        rows: impl Iterator<Item = T>,
        access_key: Option<&str>,
    ) -> Result<Vec<u8>, ReportError> {
        let mut writer = Writer::from_writer(Vec::new());
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        let csv = writer.into_inner().map_err(|e| ReportError::Io(e.into_error()))?;

        match access_key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Self::protect(name, &csv, key),
            None => Ok(csv),
        }
    }

    fn protect(name: &str, csv: &[u8], key: &str) -> Result<Vec<u8>, ReportError> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options: FileOptions<'_, ()> = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .with_aes_encryption(AesMode::Aes256, key);

        zip.start_file(format!("{name}.csv"), options)?;
        zip.write_all(csv)?;
        Ok(zip.finish()?.into_inner())
    }
}

impl ReportRenderer for CsvReportRenderer {
    fn render_accounts(&self, accounts: &[Account], access_key: Option<&str>) -> Result<Vec<u8>, ReportError> {
        Self::write("accounts", accounts.iter().map(AccountRow::from), access_key)
    }

    fn render_transactions(
        &self,
        transactions: &[TransactionRecord],
        access_key: Option<&str>,
    ) -> Result<Vec<u8>, ReportError> {
        Self::write("transactions", transactions.iter().map(TransactionRow::from), access_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;
    use crate::model::account::fixtures::account;
    use crate::model::TransactionType;
    use rust_decimal_macros::dec;

    #[test]
    fn test_accounts_csv() {
        let accounts = vec![account("12345678901", dec!(5100)), account("10987654321", dec!(500))];
        let bytes = CsvReportRenderer::new().render_accounts(&accounts, None).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        assert!(lines.next().unwrap().starts_with("account_number,holder_name"));
        assert!(lines.next().unwrap().starts_with("12345678901,Asha Rao,SAVINGS,Pune,ASTN00PUN03,5100"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_transactions_csv() {
        let tx = TransactionRecord::new(
            TransactionType::Transfer,
            Some("12345678901".into()),
            Some("10987654321".into()),
            Amount::from_integer(2000).unwrap(),
            None,
            Utc::now(),
        );
        let text = String::from_utf8(CsvReportRenderer::new().render_transactions(&[tx], None).unwrap()).unwrap();
        assert!(text.contains("TRANSFER,12345678901,10987654321,2000.00,General,SUCCESS"));
    }

    #[test]
    fn test_access_key_encrypts_report() {
        use std::io::Read;
        use zip::ZipArchive;

        let accounts = vec![account("12345678901", dec!(5100))];
        let bytes = CsvReportRenderer::new().render_accounts(&accounts, Some("s3cret")).unwrap();
        assert!(!String::from_utf8_lossy(&bytes).contains("Asha Rao"));

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(archive.by_name("accounts.csv").is_err());
        assert!(archive.by_name_decrypt("accounts.csv", b"wrong").is_err());

        let mut text = String::new();
        archive
            .by_name_decrypt("accounts.csv", b"s3cret")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert!(text.contains("12345678901,Asha Rao"));
    }

    #[test]
    fn test_blank_access_key_is_plain_csv() {
        let bytes = CsvReportRenderer::new().render_accounts(&[], Some("  ")).unwrap();
        assert!(String::from_utf8(bytes).unwrap().starts_with("account_number"));
    }
}
