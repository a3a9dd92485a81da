use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::intake::controller::{WizardController, WizardOptions};
use crate::intake::domain::{
    DocumentCategory, FieldUpdate, PaymentField, PersonalField, StagedFile, WizardStep,
};
use crate::intake::gateway::{SubmissionGateway, SubmissionRecord};
use crate::intake::progress::InMemoryProgressStore;
use crate::intake::storage::{
    ObjectStorage, StorageError, StoreError, StoredObject, SubmissionStore, UploadOptions,
};

pub(super) type TestController =
    WizardController<InMemoryProgressStore, RecordingObjectStorage, RecordingSubmissionStore>;

#[derive(Debug, Clone)]
pub(super) struct UploadCall {
    pub path: String,
    pub options: UploadOptions,
    pub bytes: usize,
}

/// Object storage fake that records uploads and can fail on a file name.
#[derive(Default)]
pub(super) struct RecordingObjectStorage {
    uploads: Mutex<Vec<UploadCall>>,
    fail_on: Mutex<Option<String>>,
    yield_before_upload: AtomicBool,
}

impl RecordingObjectStorage {
    pub fn failing_on(file_name: &str) -> Self {
        let storage = Self::default();
        storage.fail_on(Some(file_name));
        storage
    }

    pub fn fail_on(&self, file_name: Option<&str>) {
        *self.fail_on.lock().expect("fail_on mutex poisoned") = file_name.map(str::to_string);
    }

    /// Yield to the scheduler before each upload so concurrent callers interleave.
    pub fn yielding() -> Self {
        let storage = Self::default();
        storage.yield_before_upload.store(true, Ordering::SeqCst);
        storage
    }

    pub fn uploads(&self) -> Vec<UploadCall> {
        self.uploads.lock().expect("uploads mutex poisoned").clone()
    }
}

#[async_trait]
impl ObjectStorage for RecordingObjectStorage {
    async fn upload(
        &self,
        path: &str,
        content: Bytes,
        options: &UploadOptions,
    ) -> Result<StoredObject, StorageError> {
        if self.yield_before_upload.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let failing = self.fail_on.lock().expect("fail_on mutex poisoned").clone();
        if let Some(name) = failing {
            if path.ends_with(&name) {
                return Err(StorageError::Rejected("bucket quota exceeded".to_string()));
            }
        }
        self.uploads
            .lock()
            .expect("uploads mutex poisoned")
            .push(UploadCall {
                path: path.to_string(),
                options: options.clone(),
                bytes: content.len(),
            });
        Ok(StoredObject {
            path: path.to_string(),
        })
    }
}

/// Submission store fake that keeps inserted rows in memory.
#[derive(Default)]
pub(super) struct RecordingSubmissionStore {
    rows: Mutex<Vec<(String, SubmissionRecord)>>,
    unavailable: AtomicBool,
}

impl RecordingSubmissionStore {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<(String, SubmissionRecord)> {
        self.rows.lock().expect("rows mutex poisoned").clone()
    }
}

#[async_trait]
impl SubmissionStore for RecordingSubmissionStore {
    async fn insert(&self, table: &str, record: &SubmissionRecord) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.rows
            .lock()
            .expect("rows mutex poisoned")
            .push((table.to_string(), record.clone()));
        Ok(())
    }
}

pub(super) struct Harness {
    pub store: Arc<InMemoryProgressStore>,
    pub objects: Arc<RecordingObjectStorage>,
    pub records: Arc<RecordingSubmissionStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_objects(RecordingObjectStorage::default())
    }

    pub fn with_objects(objects: RecordingObjectStorage) -> Self {
        Self {
            store: Arc::new(InMemoryProgressStore::default()),
            objects: Arc::new(objects),
            records: Arc::new(RecordingSubmissionStore::default()),
        }
    }

    pub fn gateway(&self) -> SubmissionGateway<RecordingObjectStorage, RecordingSubmissionStore> {
        SubmissionGateway::new(self.objects.clone(), self.records.clone())
    }

    pub fn controller(&self) -> TestController {
        WizardController::new(self.store.clone(), self.gateway(), WizardOptions::default())
    }
}

pub(super) fn pdf(name: &str, size: usize) -> StagedFile {
    StagedFile::new(name, "application/pdf", Bytes::from(vec![0u8; size]))
}

pub(super) fn fill_personal(controller: &TestController) {
    for field in [
        PersonalField::FirstName("Jane".to_string()),
        PersonalField::SecondName("Wanjiru".to_string()),
        PersonalField::Phone("+254712345678".to_string()),
        PersonalField::Email("jane@x.com".to_string()),
        PersonalField::IdNumber("12345678".to_string()),
        PersonalField::Country("Kenya".to_string()),
        PersonalField::County("Nairobi".to_string()),
        PersonalField::PhysicalAddress("14 Riverside Drive".to_string()),
    ] {
        controller
            .update(FieldUpdate::Personal(field))
            .expect("personal update accepted");
    }
}

pub(super) fn attach_all(controller: &TestController) {
    for category in DocumentCategory::ALL {
        let report = controller
            .add_files(category, vec![pdf(&format!("{}.pdf", category.key()), 2048)])
            .expect("files staged");
        assert_eq!(report.accepted, 1);
    }
}

pub(super) fn fill_payment(controller: &TestController) {
    controller
        .update(FieldUpdate::Payment(PaymentField::PhoneNumber(
            "0712345678".to_string(),
        )))
        .expect("payment phone accepted");
    controller
        .update(FieldUpdate::Payment(PaymentField::TransactionCode(
            "QWE12RTY34".to_string(),
        )))
        .expect("transaction code accepted");
}

/// Walk a fresh controller all the way to the review step.
pub(super) fn drive_to_review(controller: &TestController) {
    fill_personal(controller);
    assert_eq!(controller.next().expect("personal valid"), WizardStep::Documents);
    attach_all(controller);
    assert_eq!(controller.next().expect("documents valid"), WizardStep::Payment);
    fill_payment(controller);
    assert_eq!(controller.next().expect("payment valid"), WizardStep::Consent);
    controller
        .update(FieldUpdate::Consent(true))
        .expect("consent accepted");
    assert_eq!(controller.next().expect("consent valid"), WizardStep::Review);
}
