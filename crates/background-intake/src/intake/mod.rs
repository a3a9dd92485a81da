//! Background-check intake wizard.
//!
//! An applicant walks through personal details, supporting documents,
//! payment confirmation and consent before reviewing and submitting. Drafts
//! survive restarts through the progress store; attachments are only held
//! in memory until the gateway uploads them.

pub mod controller;
pub mod domain;
pub mod gateway;
pub mod progress;
pub mod sqlite;
pub mod staging;
pub mod storage;
pub mod validation;

#[cfg(test)]
mod tests;

pub use controller::{WizardController, WizardError, WizardOptions};
pub use domain::{
    ConsentInfo, DocumentCategory, DocumentInfo, Draft, FieldUpdate, FileMetadata, PaymentField,
    PaymentInfo, PersonalField, PersonalInfo, StagedFile, WizardStep,
};
pub use gateway::{
    GatewayError, StoredDocument, SubmissionGateway, SubmissionReceipt, SubmissionRecord,
};
pub use progress::{
    FileProgressStore, InMemoryProgressStore, ProgressAutosave, ProgressRecorder,
    ProgressSnapshot, ProgressStore, ProgressStoreError, PROGRESS_KEY,
};
pub use sqlite::SqliteSubmissionStore;
pub use staging::{StagingPolicy, StagingReport, MAX_FILE_SIZE};
pub use storage::{
    LocalObjectStorage, ObjectStorage, StorageError, StoreError, StoredObject, SubmissionStore,
    UploadOptions,
};
pub use validation::{validate_step, ValidationErrors, CONSENT_REQUIRED_MESSAGE};
