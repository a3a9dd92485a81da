use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{error, info, instrument};

use super::domain::{DocumentCategory, Draft, PersonalInfo, StagedFile};
use super::storage::{ObjectStorage, StoreError, SubmissionStore, UploadOptions};

pub const DEFAULT_BUCKET: &str = "submissions";
pub const DEFAULT_SUBMISSIONS_TABLE: &str = "form_submissions";
const UPLOAD_PREFIX: &str = "submissions";
const UPLOAD_CACHE_CONTROL: &str = "3600";

/// One persisted attachment as it appears in the submissions table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredDocument {
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub storage_path: String,
}

/// Typed cell value for a flat submission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Text(Option<String>),
    Integer(Option<i64>),
    Boolean(bool),
}

/// The single flat row written for a completed application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub personal: PersonalInfo,
    pub documents: BTreeMap<DocumentCategory, StoredDocument>,
    pub consent_given: bool,
    pub consent_date: DateTime<Utc>,
    pub payment_phone_number: Option<String>,
    pub payment_transaction_code: Option<String>,
}

fn text(value: &str) -> ColumnValue {
    ColumnValue::Text(Some(value.to_string()))
}

fn optional_text(value: &Option<String>) -> ColumnValue {
    ColumnValue::Text(value.clone())
}

impl SubmissionRecord {
    pub fn document(&self, category: DocumentCategory) -> Option<&StoredDocument> {
        self.documents.get(&category)
    }

    /// Column name and value pairs in table order. Absent documents yield
    /// null cells.
    pub fn columns(&self) -> Vec<(String, ColumnValue)> {
        let personal = &self.personal;
        let mut columns = vec![
            ("first_name".to_string(), text(&personal.first_name)),
            ("second_name".to_string(), text(&personal.second_name)),
            ("phone".to_string(), text(&personal.phone)),
            ("email".to_string(), text(&personal.email)),
            ("id_number".to_string(), text(&personal.id_number)),
            ("country".to_string(), text(&personal.country)),
            ("county".to_string(), text(&personal.county)),
            ("physical_address".to_string(), text(&personal.physical_address)),
        ];

        for category in DocumentCategory::ALL {
            let prefix = category.column_prefix();
            let stored = self.documents.get(&category);
            columns.push((
                format!("{prefix}_file_name"),
                ColumnValue::Text(stored.map(|doc| doc.file_name.clone())),
            ));
            columns.push((
                format!("{prefix}_file_size"),
                ColumnValue::Integer(
                    stored.map(|doc| i64::try_from(doc.file_size).unwrap_or(i64::MAX)),
                ),
            ));
            columns.push((
                format!("{prefix}_file_type"),
                ColumnValue::Text(stored.map(|doc| doc.file_type.clone())),
            ));
            columns.push((
                format!("{prefix}_storage_path"),
                ColumnValue::Text(stored.map(|doc| doc.storage_path.clone())),
            ));
        }

        columns.push((
            "consent_given".to_string(),
            ColumnValue::Boolean(self.consent_given),
        ));
        columns.push((
            "consent_date".to_string(),
            text(&self.consent_date.to_rfc3339()),
        ));
        columns.push((
            "payment_phone_number".to_string(),
            optional_text(&self.payment_phone_number),
        ));
        columns.push((
            "payment_transaction_code".to_string(),
            optional_text(&self.payment_transaction_code),
        ));
        columns
    }
}

impl Serialize for SubmissionRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let columns = self.columns();
        let mut map = serializer.serialize_map(Some(columns.len()))?;
        for (name, value) in &columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// What the applicant gets back after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub submission_id: String,
    pub submitted_at: DateTime<Utc>,
    pub uploaded: Vec<(DocumentCategory, String)>,
    pub record: SubmissionRecord,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("consent must be given before submitting")]
    ConsentMissing,
    #[error("Error uploading {category} file '{file_name}': {message}")]
    Upload {
        category: DocumentCategory,
        file_name: String,
        message: String,
    },
    #[error("There was an error submitting your form. Please try again.")]
    Insert(#[source] StoreError),
}

/// Replaces each whitespace run with a single underscore.
pub fn sanitize_file_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

pub fn upload_path(millis: i64, category: DocumentCategory, file_name: &str) -> String {
    format!(
        "{UPLOAD_PREFIX}/{millis}_{}_{}",
        category.key(),
        sanitize_file_name(file_name)
    )
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Uploads attachments and records the finished application.
pub struct SubmissionGateway<O, R>
where
    O: ObjectStorage,
    R: SubmissionStore,
{
    objects: Arc<O>,
    records: Arc<R>,
    table: String,
}

impl<O, R> SubmissionGateway<O, R>
where
    O: ObjectStorage,
    R: SubmissionStore,
{
    pub fn new(objects: Arc<O>, records: Arc<R>) -> Self {
        Self {
            objects,
            records,
            table: DEFAULT_SUBMISSIONS_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    #[instrument(skip_all, fields(table = %self.table))]
    pub async fn submit(&self, draft: &Draft) -> Result<SubmissionReceipt, GatewayError> {
        self.submit_at(draft, Utc::now()).await
    }

    /// Same as [`submit`](Self::submit) with an explicit submission instant.
    pub async fn submit_at(
        &self,
        draft: &Draft,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, GatewayError> {
        if !draft.consent.consent_given {
            return Err(GatewayError::ConsentMissing);
        }

        let millis = now.timestamp_millis();
        let mut documents = BTreeMap::new();
        let mut uploaded = Vec::new();

        for category in DocumentCategory::ALL {
            // Only the first file per category is persisted.
            let Some(file) = draft.documents.files(category).and_then(<[_]>::first) else {
                continue;
            };
            let stored = self.upload_one(millis, category, file).await?;
            uploaded.push((category, stored.storage_path.clone()));
            documents.insert(category, stored);
        }

        let record = SubmissionRecord {
            personal: draft.personal.clone(),
            documents,
            consent_given: draft.consent.consent_given,
            consent_date: draft.consent.consent_date.unwrap_or(now),
            payment_phone_number: non_blank(&draft.payment.phone_number),
            payment_transaction_code: non_blank(&draft.payment.transaction_code),
        };

        if let Err(err) = self.records.insert(&self.table, &record).await {
            error!(error = %err, "submission insert failed");
            return Err(GatewayError::Insert(err));
        }

        let submission_id = format!("BGC-{millis}");
        info!(
            submission_id = %submission_id,
            documents = uploaded.len(),
            "background check submission recorded"
        );
        Ok(SubmissionReceipt {
            submission_id,
            submitted_at: now,
            uploaded,
            record,
        })
    }

    async fn upload_one(
        &self,
        millis: i64,
        category: DocumentCategory,
        file: &StagedFile,
    ) -> Result<StoredDocument, GatewayError> {
        let upload_error = |message: String| GatewayError::Upload {
            category,
            file_name: file.name.clone(),
            message,
        };

        let content = file.content().cloned().ok_or_else(|| {
            upload_error("file content is no longer available; attach it again".to_string())
        })?;

        let path = upload_path(millis, category, &file.name);
        let options = UploadOptions {
            cache_control: UPLOAD_CACHE_CONTROL.to_string(),
            upsert: false,
            content_type: Some(file.mime_type.clone()),
        };

        match self.objects.upload(&path, content, &options).await {
            Ok(stored) => Ok(StoredDocument {
                file_name: file.name.clone(),
                file_size: file.size,
                file_type: file.mime_type.clone(),
                storage_path: stored.path,
            }),
            Err(err) => {
                error!(category = %category, file = %file.name, error = %err, "upload failed");
                Err(upload_error(err.to_string()))
            }
        }
    }
}
