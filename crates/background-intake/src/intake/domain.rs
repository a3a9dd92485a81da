use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wizard steps in the order the applicant walks through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WizardStep {
    Personal,
    Documents,
    Payment,
    Consent,
    Review,
    Submitted,
}

impl WizardStep {
    pub const fn index(self) -> u8 {
        match self {
            WizardStep::Personal => 1,
            WizardStep::Documents => 2,
            WizardStep::Payment => 3,
            WizardStep::Consent => 4,
            WizardStep::Review => 5,
            WizardStep::Submitted => 6,
        }
    }

    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(WizardStep::Personal),
            2 => Some(WizardStep::Documents),
            3 => Some(WizardStep::Payment),
            4 => Some(WizardStep::Consent),
            5 => Some(WizardStep::Review),
            6 => Some(WizardStep::Submitted),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            WizardStep::Personal => "Personal Information",
            WizardStep::Documents => "Documents",
            WizardStep::Payment => "Payment",
            WizardStep::Consent => "Consent",
            WizardStep::Review => "Review",
            WizardStep::Submitted => "Submitted",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, WizardStep::Submitted)
    }

    pub const fn following(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub const fn preceding(self) -> Option<Self> {
        Self::from_index(self.index() - 1)
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Applicant contact and identity details collected on the first step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub first_name: String,
    pub second_name: String,
    pub phone: String,
    pub email: String,
    pub id_number: String,
    pub country: String,
    pub county: String,
    pub physical_address: String,
}

/// Supporting document categories required for a background check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentCategory {
    GoodConduct,
    DriversLicense,
    LogBook,
    Insurance,
}

impl DocumentCategory {
    pub const ALL: [DocumentCategory; 4] = [
        DocumentCategory::GoodConduct,
        DocumentCategory::DriversLicense,
        DocumentCategory::LogBook,
        DocumentCategory::Insurance,
    ];

    /// Key used in persisted progress snapshots.
    pub const fn key(self) -> &'static str {
        match self {
            DocumentCategory::GoodConduct => "goodConduct",
            DocumentCategory::DriversLicense => "driversLicense",
            DocumentCategory::LogBook => "logBook",
            DocumentCategory::Insurance => "insurance",
        }
    }

    /// Column prefix in the submissions table.
    pub const fn column_prefix(self) -> &'static str {
        match self {
            DocumentCategory::GoodConduct => "good_conduct",
            DocumentCategory::DriversLicense => "drivers_license",
            DocumentCategory::LogBook => "log_book",
            DocumentCategory::Insurance => "insurance",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            DocumentCategory::GoodConduct => "Certificate of Good Conduct",
            DocumentCategory::DriversLicense => "Driver's License",
            DocumentCategory::LogBook => "Log Book",
            DocumentCategory::Insurance => "Insurance",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "goodconduct" => Some(DocumentCategory::GoodConduct),
            "driverslicense" | "driverlicense" => Some(DocumentCategory::DriversLicense),
            "logbook" => Some(DocumentCategory::LogBook),
            "insurance" => Some(DocumentCategory::Insurance),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Name, size and type of an attachment, without its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// An attachment selected by the applicant and held in memory until upload.
///
/// Files rehydrated from saved progress only carry metadata; `content` is
/// `None` until the applicant attaches the file again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    content: Option<Bytes>,
}

impl StagedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, content: Bytes) -> Self {
        Self {
            name: name.into(),
            size: content.len() as u64,
            mime_type: mime_type.into(),
            content: Some(content),
        }
    }

    pub fn from_metadata(metadata: FileMetadata) -> Self {
        Self {
            name: metadata.name,
            size: metadata.size,
            mime_type: metadata.mime_type,
            content: None,
        }
    }

    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn metadata(&self) -> FileMetadata {
        FileMetadata {
            name: self.name.clone(),
            size: self.size,
            mime_type: self.mime_type.clone(),
        }
    }
}

/// Staged attachments per category. `None` means no files were chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    pub good_conduct: Option<Vec<StagedFile>>,
    pub drivers_license: Option<Vec<StagedFile>>,
    pub log_book: Option<Vec<StagedFile>>,
    pub insurance: Option<Vec<StagedFile>>,
}

impl DocumentInfo {
    pub fn files(&self, category: DocumentCategory) -> Option<&[StagedFile]> {
        self.slot(category).as_deref()
    }

    pub(crate) fn slot(&self, category: DocumentCategory) -> &Option<Vec<StagedFile>> {
        match category {
            DocumentCategory::GoodConduct => &self.good_conduct,
            DocumentCategory::DriversLicense => &self.drivers_license,
            DocumentCategory::LogBook => &self.log_book,
            DocumentCategory::Insurance => &self.insurance,
        }
    }

    pub(crate) fn slot_mut(&mut self, category: DocumentCategory) -> &mut Option<Vec<StagedFile>> {
        match category {
            DocumentCategory::GoodConduct => &mut self.good_conduct,
            DocumentCategory::DriversLicense => &mut self.drivers_license,
            DocumentCategory::LogBook => &mut self.log_book,
            DocumentCategory::Insurance => &mut self.insurance,
        }
    }

    /// Replace a category's files; an empty list collapses to "no files".
    pub fn set(&mut self, category: DocumentCategory, files: Option<Vec<StagedFile>>) {
        *self.slot_mut(category) = files.filter(|files| !files.is_empty());
    }
}

/// Consent flag and the moment it was given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentInfo {
    pub consent_given: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_date: Option<DateTime<Utc>>,
}

/// Manual payment confirmation entered by the applicant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub phone_number: String,
    pub transaction_code: String,
}

/// The in-progress aggregate of everything the wizard has collected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub personal: PersonalInfo,
    pub documents: DocumentInfo,
    pub consent: ConsentInfo,
    pub payment: PaymentInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonalField {
    FirstName(String),
    SecondName(String),
    Phone(String),
    Email(String),
    IdNumber(String),
    Country(String),
    County(String),
    PhysicalAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentField {
    PhoneNumber(String),
    TransactionCode(String),
}

/// A single-field edit addressed to one section of the draft.
///
/// Attachments are only added through staging, which applies the type and
/// size filter; the documents section can only be cleared here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate {
    Personal(PersonalField),
    ClearDocuments(DocumentCategory),
    Consent(bool),
    Payment(PaymentField),
}

impl FieldUpdate {
    /// The wizard step that owns the edited section.
    pub const fn step(&self) -> WizardStep {
        match self {
            FieldUpdate::Personal(_) => WizardStep::Personal,
            FieldUpdate::ClearDocuments(_) => WizardStep::Documents,
            FieldUpdate::Payment(_) => WizardStep::Payment,
            FieldUpdate::Consent(_) => WizardStep::Consent,
        }
    }
}

impl Draft {
    /// Merge one field into its section, leaving every other field untouched.
    ///
    /// Giving consent stamps `now` unless consent was already recorded;
    /// withdrawing it clears the timestamp.
    pub fn apply(&mut self, update: FieldUpdate, now: DateTime<Utc>) {
        match update {
            FieldUpdate::Personal(field) => {
                let personal = &mut self.personal;
                match field {
                    PersonalField::FirstName(value) => personal.first_name = value,
                    PersonalField::SecondName(value) => personal.second_name = value,
                    PersonalField::Phone(value) => personal.phone = value,
                    PersonalField::Email(value) => personal.email = value,
                    PersonalField::IdNumber(value) => personal.id_number = value,
                    PersonalField::Country(value) => personal.country = value,
                    PersonalField::County(value) => personal.county = value,
                    PersonalField::PhysicalAddress(value) => personal.physical_address = value,
                }
            }
            FieldUpdate::ClearDocuments(category) => self.documents.set(category, None),
            FieldUpdate::Consent(given) => {
                if given {
                    if !self.consent.consent_given || self.consent.consent_date.is_none() {
                        self.consent.consent_date = Some(now);
                    }
                } else {
                    self.consent.consent_date = None;
                }
                self.consent.consent_given = given;
            }
            FieldUpdate::Payment(field) => match field {
                PaymentField::PhoneNumber(value) => self.payment.phone_number = value,
                PaymentField::TransactionCode(value) => self.payment.transaction_code = value,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn filled() -> Draft {
        let mut draft = Draft::default();
        draft.personal = PersonalInfo {
            first_name: "Jane".to_string(),
            second_name: "Wanjiru".to_string(),
            phone: "+254712345678".to_string(),
            email: "jane@x.com".to_string(),
            id_number: "12345678".to_string(),
            country: "Kenya".to_string(),
            county: "Nairobi".to_string(),
            physical_address: "14 Riverside Drive".to_string(),
        };
        draft.payment = PaymentInfo {
            phone_number: "0712345678".to_string(),
            transaction_code: "QWE12RTY34".to_string(),
        };
        draft
    }

    #[test]
    fn personal_update_touches_only_the_named_field() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let original = filled();
        let mut draft = original.clone();

        draft.apply(FieldUpdate::Personal(PersonalField::County("Kiambu".to_string())), now);

        assert_eq!(draft.personal.county, "Kiambu");
        let mut expected = original.personal.clone();
        expected.county = "Kiambu".to_string();
        assert_eq!(draft.personal, expected);
        assert_eq!(draft.payment, original.payment);
        assert_eq!(draft.consent, original.consent);
        assert_eq!(draft.documents, original.documents);
    }

    #[test]
    fn payment_update_leaves_sibling_untouched() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let mut draft = filled();

        draft.apply(
            FieldUpdate::Payment(PaymentField::TransactionCode("NEW00CODE".to_string())),
            now,
        );

        assert_eq!(draft.payment.transaction_code, "NEW00CODE");
        assert_eq!(draft.payment.phone_number, "0712345678");
        assert_eq!(draft.personal, filled().personal);
    }

    #[test]
    fn consent_stamps_and_clears_timestamp() {
        let first = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let mut draft = Draft::default();

        draft.apply(FieldUpdate::Consent(true), first);
        assert!(draft.consent.consent_given);
        assert_eq!(draft.consent.consent_date, Some(first));

        draft.apply(FieldUpdate::Consent(true), later);
        assert_eq!(draft.consent.consent_date, Some(first), "re-confirming keeps the original stamp");

        draft.apply(FieldUpdate::Consent(false), later);
        assert!(!draft.consent.consent_given);
        assert_eq!(draft.consent.consent_date, None);
    }

    #[test]
    fn empty_document_list_collapses_to_none() {
        let mut documents = DocumentInfo::default();
        documents.set(DocumentCategory::LogBook, Some(Vec::new()));
        assert!(documents.files(DocumentCategory::LogBook).is_none());
    }

    #[test]
    fn clearing_documents_touches_one_category() {
        let now = Utc::now();
        let mut draft = Draft::default();
        for category in [DocumentCategory::LogBook, DocumentCategory::Insurance] {
            draft.documents.set(
                category,
                Some(vec![StagedFile::new(
                    "scan.pdf",
                    "application/pdf",
                    Bytes::from_static(b"%PDF"),
                )]),
            );
        }

        draft.apply(FieldUpdate::ClearDocuments(DocumentCategory::LogBook), now);

        assert!(draft.documents.files(DocumentCategory::LogBook).is_none());
        assert!(draft.documents.files(DocumentCategory::Insurance).is_some());
    }

    #[test]
    fn steps_walk_in_order() {
        assert_eq!(WizardStep::Personal.following(), Some(WizardStep::Documents));
        assert_eq!(WizardStep::Consent.following(), Some(WizardStep::Review));
        assert_eq!(WizardStep::Personal.preceding(), None);
        assert_eq!(WizardStep::Submitted.following(), None);
        assert_eq!(WizardStep::from_index(0), None);
    }

    #[test]
    fn category_keys_parse_loosely() {
        assert_eq!(
            DocumentCategory::from_key("drivers-license"),
            Some(DocumentCategory::DriversLicense)
        );
        assert_eq!(
            DocumentCategory::from_key("goodConduct"),
            Some(DocumentCategory::GoodConduct)
        );
        assert_eq!(DocumentCategory::from_key("passport"), None);
    }
}
