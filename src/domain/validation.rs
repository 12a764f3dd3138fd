//! KYC field validation
//!
//! Format rules for account identity and contact fields, plus the static
//! branch to IFSC mapping.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::DomainError;

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).unwrap_or_else(|e| panic!("bad pattern {source}: {e}")))
}

macro_rules! rule {
    ($name:ident, $source:expr) => {
        fn $name() -> &'static Regex {
            static CELL: OnceLock<Regex> = OnceLock::new();
            pattern(&CELL, $source)
        }
    };
}

rule!(account_number_re, r"^\d{11}$");
rule!(name_re, r"^[A-Za-z ]{3,}$");
rule!(email_re, r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$");
rule!(pin_re, r"^\d{4}$");
rule!(phone_re, r"^\d{10}$");
rule!(ifsc_re, r"^[A-Za-z]{4}0[A-Za-z0-9]{6}$");
rule!(aadhar_re, r"^\d{12}$");
rule!(pan_re, r"^[A-Z]{5}[0-9]{4}[A-Z]$");
rule!(voter_re, r"^[A-Z]{3}[0-9]{7}$");
rule!(
    driving_license_re,
    r"^([A-Z]{2}[0-9]{2}[0-9]{4}[0-9]{7}|[A-Z]{2}-[0-9]{2}/[0-9]{4}/[0-9]{7})$"
);

/// Branch → IFSC code
const BRANCHES: &[(&str, &str)] = &[
    ("Mumbai", "ASTN00MUM01"),
    ("Bangalore", "ASTN00BLR02"),
    ("Pune", "ASTN00PUN03"),
    ("Hyderabad", "ASTN00HYD04"),
];

/// Accepted government ID documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GovIdType {
    Aadhar,
    Pan,
    VoterId,
    DrivingLicense,
}

impl GovIdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GovIdType::Aadhar => "Aadhar",
            GovIdType::Pan => "PAN",
            GovIdType::VoterId => "Voter ID",
            GovIdType::DrivingLicense => "Driving License",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim() {
            "Aadhar" => Ok(GovIdType::Aadhar),
            "PAN" => Ok(GovIdType::Pan),
            "Voter ID" => Ok(GovIdType::VoterId),
            "Driving License" => Ok(GovIdType::DrivingLicense),
            other => Err(DomainError::invalid_field(
                "government ID type",
                format!("unsupported type '{other}'"),
            )),
        }
    }

    /// Check an ID number against this document's format
    pub fn validate_number(&self, number: &str) -> Result<(), DomainError> {
        let re = match self {
            GovIdType::Aadhar => aadhar_re(),
            GovIdType::Pan => pan_re(),
            GovIdType::VoterId => voter_re(),
            GovIdType::DrivingLicense => driving_license_re(),
        };
        if re.is_match(number) {
            Ok(())
        } else {
            Err(DomainError::invalid_field(
                "government ID",
                format!("not a valid {} number", self.as_str()),
            ))
        }
    }
}

impl std::fmt::Display for GovIdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gender values accepted on the profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "MALE",
            Gender::Female => "FEMALE",
            Gender::Other => "OTHER",
            Gender::PreferNotToSay => "PREFER_NOT_TO_SAY",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MALE" => Ok(Gender::Male),
            "FEMALE" => Ok(Gender::Female),
            "OTHER" => Ok(Gender::Other),
            "PREFER_NOT_TO_SAY" => Ok(Gender::PreferNotToSay),
            _ => Err(DomainError::invalid_field("gender", "unsupported value")),
        }
    }
}

fn check(re: &Regex, field: &'static str, value: &str, reason: &str) -> Result<(), DomainError> {
    if re.is_match(value) {
        Ok(())
    } else {
        Err(DomainError::invalid_field(field, reason))
    }
}

pub fn validate_account_number(value: &str) -> Result<(), DomainError> {
    check(account_number_re(), "account number", value, "must be exactly 11 digits")
}

pub fn validate_holder_name(value: &str) -> Result<(), DomainError> {
    check(name_re(), "holder name", value.trim(), "letters and spaces only, at least 3")
}

pub fn validate_email(value: &str) -> Result<(), DomainError> {
    check(email_re(), "email", value.trim(), "not a valid address")
}

pub fn validate_phone(value: &str) -> Result<(), DomainError> {
    check(phone_re(), "phone", value.trim(), "must be exactly 10 digits")
}

pub fn validate_pin(value: &str) -> Result<(), DomainError> {
    check(pin_re(), "PIN", value, "must be exactly 4 digits")
}

/// Admin passwords: at least 6 characters, no surrounding whitespace
pub fn validate_password(value: &str) -> Result<(), DomainError> {
    if value.chars().count() < 6 || value.trim() != value {
        return Err(DomainError::invalid_field(
            "password",
            "at least 6 characters without leading or trailing spaces",
        ));
    }
    Ok(())
}

pub fn validate_ifsc(value: &str) -> Result<(), DomainError> {
    check(ifsc_re(), "IFSC", value.trim(), "invalid format")
}

pub fn validate_address(value: &str) -> Result<(), DomainError> {
    let len = value.trim().chars().count();
    if (5..=200).contains(&len) {
        Ok(())
    } else {
        Err(DomainError::invalid_field("address", "must be 5 to 200 characters"))
    }
}

/// Resolve a branch name to its IFSC code (case-insensitive)
pub fn ifsc_for_branch(branch: &str) -> Result<&'static str, DomainError> {
    let branch = branch.trim();
    BRANCHES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(branch))
        .map(|(_, ifsc)| *ifsc)
        .ok_or_else(|| DomainError::invalid_field("branch", format!("unknown branch '{branch}'")))
}

/// Case-insensitive, whitespace-trimmed comparison used for IFSC and ID echoes
pub fn same_code(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Whole years between `dob` and `today`; fails for a future date of birth
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> Result<u32, DomainError> {
    if dob > today {
        return Err(DomainError::invalid_field("date of birth", "cannot be in the future"));
    }
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    Ok(years.max(0) as u32)
}
