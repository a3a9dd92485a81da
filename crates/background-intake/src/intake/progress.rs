//! Resumable wizard progress.
//!
//! A [`ProgressSnapshot`] is the draft with attachment bytes stripped, stored
//! as JSON under a single well-known key. Read and write failures are logged
//! and treated as "no saved progress"; they never interrupt the wizard.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::domain::{
    ConsentInfo, DocumentCategory, DocumentInfo, Draft, FileMetadata, PaymentInfo, PersonalInfo,
    StagedFile, WizardStep,
};

/// Storage key shared with earlier releases of the intake form.
pub const PROGRESS_KEY: &str = "saaryFormData";

pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(1000);

#[derive(Debug, thiserror::Error)]
pub enum ProgressStoreError {
    #[error("progress storage i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("progress storage unavailable: {0}")]
    Unavailable(String),
}

/// String key-value storage private to one applicant's device.
pub trait ProgressStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, ProgressStoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), ProgressStoreError>;
    fn remove(&self, key: &str) -> Result<(), ProgressStoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryProgressStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryProgressStore {
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }
}

impl ProgressStore for InMemoryProgressStore {
    fn read(&self, key: &str) -> Result<Option<String>, ProgressStoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| ProgressStoreError::Unavailable("store mutex poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), ProgressStoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ProgressStoreError::Unavailable("store mutex poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ProgressStoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ProgressStoreError::Unavailable("store mutex poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per entry inside a directory.
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ProgressStoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !valid {
            return Err(ProgressStoreError::Unavailable(format!(
                "unsupported progress key '{key}'"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl ProgressStore for FileProgressStore {
    fn read(&self, key: &str) -> Result<Option<String>, ProgressStoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), ProgressStoreError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        let staging = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ProgressStoreError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Attachment metadata per category; bytes are never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    pub good_conduct: Option<Vec<FileMetadata>>,
    pub drivers_license: Option<Vec<FileMetadata>>,
    pub log_book: Option<Vec<FileMetadata>>,
    pub insurance: Option<Vec<FileMetadata>>,
}

impl DocumentSnapshot {
    fn slot(&self, category: DocumentCategory) -> &Option<Vec<FileMetadata>> {
        match category {
            DocumentCategory::GoodConduct => &self.good_conduct,
            DocumentCategory::DriversLicense => &self.drivers_license,
            DocumentCategory::LogBook => &self.log_book,
            DocumentCategory::Insurance => &self.insurance,
        }
    }

    pub fn files(&self, category: DocumentCategory) -> Option<&[FileMetadata]> {
        self.slot(category).as_deref()
    }
}

impl From<&DocumentInfo> for DocumentSnapshot {
    fn from(documents: &DocumentInfo) -> Self {
        let project = |category: DocumentCategory| -> Option<Vec<FileMetadata>> {
            documents
                .files(category)
                .map(|files| files.iter().map(StagedFile::metadata).collect())
        };
        Self {
            good_conduct: project(DocumentCategory::GoodConduct),
            drivers_license: project(DocumentCategory::DriversLicense),
            log_book: project(DocumentCategory::LogBook),
            insurance: project(DocumentCategory::Insurance),
        }
    }
}

impl DocumentSnapshot {
    fn into_documents(self) -> DocumentInfo {
        let revive = |files: Option<Vec<FileMetadata>>| {
            files
                .map(|files| files.into_iter().map(StagedFile::from_metadata).collect::<Vec<_>>())
                .filter(|files| !files.is_empty())
        };
        DocumentInfo {
            good_conduct: revive(self.good_conduct),
            drivers_license: revive(self.drivers_license),
            log_book: revive(self.log_book),
            insurance: revive(self.insurance),
        }
    }
}

/// Serialized projection of a draft plus the step it was on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub personal_info: PersonalInfo,
    pub document_info: DocumentSnapshot,
    #[serde(default)]
    pub consent_info: ConsentInfo,
    #[serde(default)]
    pub payment_info: PaymentInfo,
    #[serde(default)]
    pub form_progress: u8,
    pub last_saved: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn capture(draft: &Draft, step: WizardStep, saved_at: DateTime<Utc>) -> Self {
        Self {
            personal_info: draft.personal.clone(),
            document_info: DocumentSnapshot::from(&draft.documents),
            consent_info: draft.consent.clone(),
            payment_info: draft.payment.clone(),
            form_progress: step.index(),
            last_saved: saved_at,
        }
    }

    /// Rebuild the draft; restored attachments carry metadata only.
    pub fn into_draft(self) -> Draft {
        Draft {
            personal: self.personal_info,
            documents: self.document_info.into_documents(),
            consent: self.consent_info,
            payment: self.payment_info,
        }
    }

    /// Saved step, restarting at the first step when it is not resumable.
    pub fn step(&self) -> WizardStep {
        match WizardStep::from_index(self.form_progress) {
            Some(step) if !step.is_terminal() => step,
            _ => WizardStep::Personal,
        }
    }
}

/// Save/load/clear of the snapshot under [`PROGRESS_KEY`].
#[derive(Debug)]
pub struct ProgressRecorder<S> {
    store: Arc<S>,
    key: String,
}

impl<S> ProgressRecorder<S>
where
    S: ProgressStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            key: PROGRESS_KEY.to_string(),
        }
    }

    /// Write the snapshot; failures are logged and reported as `false`.
    pub fn save(&self, snapshot: &ProgressSnapshot) -> bool {
        let encoded = match serde_json::to_string(snapshot) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "unable to encode progress snapshot");
                return false;
            }
        };
        match self.store.write(&self.key, &encoded) {
            Ok(()) => {
                debug!(key = %self.key, step = snapshot.form_progress, "progress saved");
                true
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "error saving form progress");
                false
            }
        }
    }

    pub fn load(&self) -> Option<ProgressSnapshot> {
        let raw = match self.store.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key = %self.key, error = %err, "error loading form progress");
                return None;
            }
        };
        match serde_json::from_str::<ProgressSnapshot>(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(key = %self.key, error = %err, "discarding unreadable form progress");
                None
            }
        }
    }

    pub fn clear(&self) {
        match self.store.remove(&self.key) {
            Ok(()) => info!(key = %self.key, "saved progress cleared"),
            Err(err) => warn!(key = %self.key, error = %err, "error clearing form progress"),
        }
    }
}

struct PendingSave {
    generation: u64,
    snapshot: ProgressSnapshot,
    timer: JoinHandle<()>,
}

/// Debounced writer: each schedule cancels the pending timer and starts a
/// new one, so at most one write happens per idle interval and it carries
/// the latest draft.
///
/// Timers write while holding the pending slot and only if their own
/// generation is still the pending one, so once [`cancel`](Self::cancel)
/// returns no earlier schedule can write.
pub struct ProgressAutosave<S> {
    recorder: Arc<ProgressRecorder<S>>,
    idle: Duration,
    pending: Arc<Mutex<Option<PendingSave>>>,
    generation: AtomicU64,
}

impl<S> ProgressAutosave<S>
where
    S: ProgressStore + 'static,
{
    pub fn new(recorder: Arc<ProgressRecorder<S>>, idle: Duration) -> Self {
        Self {
            recorder,
            idle,
            pending: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn recorder(&self) -> &ProgressRecorder<S> {
        &self.recorder
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|pending| pending.is_some())
            .unwrap_or(false)
    }

    /// Queue `draft` for saving once edits go quiet.
    ///
    /// Outside a tokio runtime the snapshot is written immediately.
    pub fn schedule(&self, draft: &Draft, step: WizardStep) {
        let snapshot = ProgressSnapshot::capture(draft, step, Utc::now());

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                self.cancel();
                self.recorder.save(&snapshot);
                return;
            }
        };

        let Ok(mut pending) = self.pending.lock() else {
            warn!("autosave state poisoned; saving immediately");
            self.recorder.save(&snapshot);
            return;
        };
        if let Some(previous) = pending.take() {
            previous.timer.abort();
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let recorder = Arc::clone(&self.recorder);
        let slot = Arc::clone(&self.pending);
        let idle = self.idle;
        let timer = runtime.spawn(async move {
            tokio::time::sleep(idle).await;
            let Ok(mut pending) = slot.lock() else {
                return;
            };
            if pending.as_ref().map(|due| due.generation) != Some(generation) {
                return;
            }
            if let Some(mut due) = pending.take() {
                due.snapshot.last_saved = Utc::now();
                recorder.save(&due.snapshot);
            }
        });

        *pending = Some(PendingSave {
            generation,
            snapshot,
            timer,
        });
    }

    /// Write the pending snapshot now, if any.
    pub fn flush(&self) -> bool {
        let Ok(mut pending) = self.pending.lock() else {
            return false;
        };
        match pending.take() {
            Some(mut due) => {
                due.timer.abort();
                due.snapshot.last_saved = Utc::now();
                self.recorder.save(&due.snapshot)
            }
            None => false,
        }
    }

    /// Drop the pending snapshot without writing it.
    pub fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(due) = pending.take() {
                due.timer.abort();
            }
        }
    }
}

impl<S> Drop for ProgressAutosave<S> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(due) = pending.take() {
                due.timer.abort();
            }
        }
    }
}
