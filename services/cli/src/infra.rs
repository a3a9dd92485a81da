use background_intake::config::StorageConfig;
use background_intake::error::AppError;
use background_intake::intake::staging::format_file_size;
use background_intake::intake::{
    DocumentCategory, FileProgressStore, LocalObjectStorage, ProgressRecorder, ProgressStore,
    SqliteSubmissionStore, StagedFile, PROGRESS_KEY,
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Local collaborators backing a CLI wizard session.
pub(crate) struct LocalStack {
    pub(crate) progress: Arc<FileProgressStore>,
    pub(crate) objects: Arc<LocalObjectStorage>,
    pub(crate) records: Arc<SqliteSubmissionStore>,
}

pub(crate) async fn connect(storage: &StorageConfig) -> Result<LocalStack, AppError> {
    let records = connect_records(storage).await?;
    Ok(LocalStack {
        progress: Arc::new(FileProgressStore::new(&storage.progress_dir)),
        objects: Arc::new(LocalObjectStorage::new(
            &storage.object_store_dir,
            &storage.bucket,
        )),
        records: Arc::new(records),
    })
}

async fn connect_records(storage: &StorageConfig) -> Result<SqliteSubmissionStore, AppError> {
    if let Some(parent) = sqlite_parent_dir(&storage.database_url) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let store =
        SqliteSubmissionStore::connect(&storage.database_url, &storage.submissions_table).await?;
    Ok(store)
}

/// Directory that must exist before SQLite can create the database file.
fn sqlite_parent_dir(url: &str) -> Option<PathBuf> {
    if url.contains(":memory:") {
        return None;
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    Path::new(path)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

pub(crate) async fn migrate(storage: &StorageConfig) -> Result<(), AppError> {
    let store = connect_records(storage).await?;
    let rows = store.count(&storage.submissions_table).await?;
    info!(table = %storage.submissions_table, rows, "migration complete");
    println!(
        "Submissions table '{}' ready ({} row(s))",
        storage.submissions_table, rows
    );
    Ok(())
}

pub(crate) fn show_progress(storage: &StorageConfig, raw: bool) -> Result<(), AppError> {
    let store = Arc::new(FileProgressStore::new(&storage.progress_dir));
    if raw {
        match store.read(PROGRESS_KEY)? {
            Some(contents) => println!("{contents}"),
            None => println!("No saved progress in {}", storage.progress_dir.display()),
        }
        return Ok(());
    }

    let Some(snapshot) = ProgressRecorder::new(store).load() else {
        println!("No saved progress in {}", storage.progress_dir.display());
        return Ok(());
    };

    let step = snapshot.step();
    println!("Saved progress (last saved {})", snapshot.last_saved.to_rfc3339());
    println!("- Resumes at step {}: {}", step.index(), step);
    let personal = &snapshot.personal_info;
    let applicant = format!("{} {}", personal.first_name, personal.second_name);
    if applicant.trim().is_empty() {
        println!("- Applicant: (not entered)");
    } else {
        println!("- Applicant: {}", applicant.trim());
    }
    println!("- Documents:");
    for category in DocumentCategory::ALL {
        match snapshot.document_info.files(category) {
            Some(files) => {
                let listed = files
                    .iter()
                    .map(|file| format!("{} ({})", file.name, format_file_size(file.size)))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("    {}: {}", category.label(), listed);
            }
            None => println!("    {}: none", category.label()),
        }
    }
    println!(
        "- Consent: {}",
        if snapshot.consent_info.consent_given {
            "given"
        } else {
            "not given"
        }
    );
    Ok(())
}

pub(crate) fn clear_progress(storage: &StorageConfig) -> Result<(), AppError> {
    let store = FileProgressStore::new(&storage.progress_dir);
    store.remove(PROGRESS_KEY)?;
    println!("Saved progress cleared");
    Ok(())
}

/// Parses `CATEGORY=PATH` for `--attach`.
pub(crate) fn parse_attachment(raw: &str) -> Result<(DocumentCategory, PathBuf), String> {
    let (category, path) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected CATEGORY=PATH, got '{raw}'"))?;
    let category = DocumentCategory::from_key(category).ok_or_else(|| {
        format!(
            "unknown document category '{category}' (expected one of goodConduct, driversLicense, logBook, insurance)"
        )
    })?;
    if path.trim().is_empty() {
        return Err(format!("missing file path for '{category}'"));
    }
    Ok((category, PathBuf::from(path.trim())))
}

/// Read an attachment from disk, guessing its MIME type from the extension.
pub(crate) async fn load_attachment(path: &Path) -> Result<StagedFile, AppError> {
    let content = tokio::fs::read(path).await?;
    let mime_type = mime_guess::from_path(path).first_or_octet_stream();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(StagedFile::new(
        name,
        mime_type.essence_str(),
        Bytes::from(content),
    ))
}
