//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use bank_ledger::audit::InMemoryAuditSink;
use bank_ledger::handlers::{
    AccountHandler, AdminHandler, AuthHandler, CreateAccountCommand, DeletionHandler, LedgerHandler, LoanHandler, QueryHandler,
    TransactionLogHandler,
};
use bank_ledger::notify::RecordingGateway;
use bank_ledger::security::CredentialVerifier;
use bank_ledger::store::InMemoryStore;
use bank_ledger::{LedgerCore, LedgerPolicy, OperationContext};

pub const LOGIN_PIN: &str = "1357";
pub const TX_PIN: &str = "2468";

/// A ledger over in-memory collaborators plus every handler
pub struct Bank {
    pub core: LedgerCore,
    pub audit: Arc<InMemoryAuditSink>,
    pub gateway: Arc<RecordingGateway>,
}

impl Bank {
    pub fn new() -> Self {
        let audit = Arc::new(InMemoryAuditSink::new());
        let gateway = Arc::new(RecordingGateway::new());
        let credentials = CredentialVerifier::with_cost(8, 1, 1).expect("argon2 params");
        let core = LedgerCore::new(
            Arc::new(InMemoryStore::new()),
            audit.clone(),
            gateway.clone(),
            LedgerPolicy::default(),
        )
        .with_credentials(credentials);
        Self { core, audit, gateway }
    }

    /// Wrap an externally built core; `audit` and `gateway` stay detached
    pub fn with_core(core: LedgerCore) -> Self {
        Self {
            core,
            audit: Arc::new(InMemoryAuditSink::new()),
            gateway: Arc::new(RecordingGateway::new()),
        }
    }

    pub fn accounts(&self) -> AccountHandler {
        AccountHandler::new(self.core.clone())
    }

    pub fn ledger(&self) -> LedgerHandler {
        LedgerHandler::new(self.core.clone())
    }

    pub fn loans(&self) -> LoanHandler {
        LoanHandler::new(self.core.clone())
    }

    pub fn deletions(&self) -> DeletionHandler {
        DeletionHandler::new(self.core.clone())
    }

    pub fn admins(&self) -> AdminHandler {
        AdminHandler::new(self.core.clone())
    }

    pub fn auth(&self) -> AuthHandler {
        AuthHandler::new(self.core.clone())
    }

    pub fn queries(&self) -> QueryHandler {
        QueryHandler::new(self.core.clone())
    }

    pub fn transaction_log(&self) -> TransactionLogHandler {
        TransactionLogHandler::new(self.core.clone())
    }

    /// Open an account through the public path; `seq` keeps identities unique
    pub async fn open(&self, seq: u32, account_type: &str, opening_deposit: &str) -> Customer {
        let holder = Customer {
            number: String::new(),
            ifsc: String::new(),
            gov_id: format!("ABCDE{:04}F", seq),
            email: format!("customer{seq}@example.com"),
            phone: format!("98765{:05}", seq),
        };
        let command = CreateAccountCommand {
            holder_name: "Meera Iyer".to_string(),
            email: holder.email.clone(),
            phone: holder.phone.clone(),
            address: "21 Linking Road, Mumbai".to_string(),
            gender: "FEMALE".to_string(),
            gov_id_type: "PAN".to_string(),
            gov_id_number: holder.gov_id.clone(),
            gov_id_proof: vec![0x25, 0x50, 0x44, 0x46],
            branch: "Mumbai".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1991, 3, 9).expect("valid date"),
            account_type: account_type.to_string(),
            opening_deposit: opening_deposit.to_string(),
            login_pin: LOGIN_PIN.to_string(),
            transaction_pin: Some(TX_PIN.to_string()),
        };
        let created = self
            .accounts()
            .create(command, &OperationContext::system())
            .await
            .expect("account opens");
        Customer {
            number: created.account_number,
            ifsc: created.ifsc,
            ..holder
        }
    }

    /// PIN plus one-time code; returns the session-bound context
    pub async fn login(&self, customer: &Customer) -> OperationContext {
        let auth = self.auth();
        auth.login(&customer.number, LOGIN_PIN, &OperationContext::system())
            .await
            .expect("login PIN accepted");
        let code = self.last_code(&customer.phone);
        auth.complete_login(&customer.number, &code)
            .expect("one-time code accepted")
            .context()
    }

    /// Password plus one-time code for an admin; returns the session context
    pub async fn admin_login(&self, username: &str, password: &str, phone: &str) -> OperationContext {
        let auth = self.auth();
        auth.admin_login(username, password, &OperationContext::system())
            .await
            .expect("admin password accepted");
        let code = self.last_code(phone);
        auth.complete_admin_login(username, &code)
            .await
            .expect("one-time code accepted")
            .context()
    }

    pub fn last_code(&self, recipient: &str) -> String {
        self.gateway
            .sent_to(recipient)
            .last()
            .and_then(|m| {
                m.text()
                    .split(|c: char| !c.is_ascii_digit())
                    .find(|w| w.len() == 6)
                    .map(str::to_string)
            })
            .expect("no code delivered")
    }

    pub async fn balance(&self, account: &str) -> Decimal {
        self.queries()
            .balance(account, &OperationContext::system())
            .await
            .expect("balance readable")
    }
}

#[derive(Debug, Clone)]
pub struct Customer {
    pub number: String,
    pub ifsc: String,
    pub gov_id: String,
    pub email: String,
    pub phone: String,
}
