//! Field rules applied before the wizard leaves a step.
//!
//! Every validator returns either the normalized values to merge back into
//! the draft or the full set of field messages, never both.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use super::domain::{
    ConsentInfo, DocumentCategory, DocumentInfo, Draft, PaymentInfo, PersonalInfo, WizardStep,
};

/// Kenyan mobile numbers in international (`+2547…`) or local (`07…`) form.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\+254|0)[17]\d{8}$").expect("valid phone regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@.]+(?:\.[^\s@.]+)+$").expect("valid email regex")
});

pub const CONSENT_REQUIRED_MESSAGE: &str =
    "You must provide consent to proceed with the background check.";

const MIN_NAME_LEN: usize = 2;
const MIN_ADDRESS_LEN: usize = 5;
const MIN_PAYMENT_PHONE_LEN: usize = 10;
const MIN_TRANSACTION_CODE_LEN: usize = 5;

/// Field-level messages keyed by the field's snapshot name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<&'static str, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_insert_with(|| message.into());
    }

    pub fn field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.fields.iter().map(|(field, message)| (*field, message.as_str()))
    }

    fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

pub fn validate_personal(info: &PersonalInfo) -> Result<PersonalInfo, ValidationErrors> {
    let normalized = PersonalInfo {
        first_name: info.first_name.trim().to_string(),
        second_name: info.second_name.trim().to_string(),
        phone: info.phone.split_whitespace().collect(),
        email: info.email.trim().to_string(),
        id_number: info.id_number.trim().to_string(),
        country: info.country.trim().to_string(),
        county: info.county.trim().to_string(),
        physical_address: info.physical_address.trim().to_string(),
    };

    let mut errors = ValidationErrors::new();
    if char_len(&normalized.first_name) < MIN_NAME_LEN {
        errors.add("firstName", "First name must be at least 2 characters");
    }
    if char_len(&normalized.second_name) < MIN_NAME_LEN {
        errors.add("secondName", "Second name must be at least 2 characters");
    }
    if !PHONE_RE.is_match(&normalized.phone) {
        errors.add(
            "phone",
            "Invalid phone number format. Use format +254XXXXXXXXX",
        );
    }
    if !EMAIL_RE.is_match(&normalized.email) {
        errors.add("email", "Invalid email address");
    }
    if normalized.id_number.is_empty() {
        errors.add("idNumber", "ID number is required");
    }
    if normalized.country.is_empty() {
        errors.add("country", "Country is required");
    }
    if normalized.county.is_empty() {
        errors.add("county", "County/State is required");
    }
    if char_len(&normalized.physical_address) < MIN_ADDRESS_LEN {
        errors.add(
            "physicalAddress",
            "Physical address must be at least 5 characters",
        );
    }

    errors.into_result(normalized)
}

/// Every category needs at least one file, and the first file (the one
/// that gets uploaded) must still have its content in memory.
pub fn validate_documents(documents: &DocumentInfo) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    for category in DocumentCategory::ALL {
        match documents.files(category).and_then(<[_]>::first) {
            None => errors.add(
                category.key(),
                format!("{} is required", category.label()),
            ),
            Some(first) if !first.has_content() => errors.add(
                category.key(),
                format!(
                    "Re-attach your {}: saved progress keeps file details, not file contents",
                    category.label()
                ),
            ),
            Some(_) => {}
        }
    }
    errors.into_result(())
}

pub fn validate_payment(info: &PaymentInfo) -> Result<PaymentInfo, ValidationErrors> {
    let normalized = PaymentInfo {
        phone_number: info.phone_number.trim().to_string(),
        transaction_code: info.transaction_code.trim().to_string(),
    };

    let mut errors = ValidationErrors::new();
    if char_len(&normalized.phone_number) < MIN_PAYMENT_PHONE_LEN {
        errors.add("phoneNumber", "Phone number is required");
    }
    if char_len(&normalized.transaction_code) < MIN_TRANSACTION_CODE_LEN {
        errors.add("transactionCode", "Transaction code is required");
    }

    errors.into_result(normalized)
}

pub fn validate_consent(info: &ConsentInfo) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if !info.consent_given {
        errors.add("consentGiven", CONSENT_REQUIRED_MESSAGE);
    }
    errors.into_result(())
}

/// Validate the section owned by `step` and return the draft with normalized
/// values merged in.
pub fn validate_step(step: WizardStep, draft: &Draft) -> Result<Draft, ValidationErrors> {
    let mut accepted = draft.clone();
    match step {
        WizardStep::Personal => accepted.personal = validate_personal(&draft.personal)?,
        WizardStep::Documents => validate_documents(&draft.documents)?,
        WizardStep::Payment => accepted.payment = validate_payment(&draft.payment)?,
        WizardStep::Consent => validate_consent(&draft.consent)?,
        WizardStep::Review | WizardStep::Submitted => {}
    }
    Ok(accepted)
}
