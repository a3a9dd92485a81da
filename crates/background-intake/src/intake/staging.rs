use std::fmt;

use tracing::{debug, warn};

use super::domain::{DocumentCategory, DocumentInfo, StagedFile};

/// 5 MiB per attachment.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Attachment filter applied when files are staged.
#[derive(Debug, Clone)]
pub struct StagingPolicy {
    allowed_types: Vec<mime::Mime>,
    max_file_size: u64,
}

impl Default for StagingPolicy {
    fn default() -> Self {
        Self {
            allowed_types: vec![mime::APPLICATION_PDF, mime::IMAGE_JPEG, mime::IMAGE_PNG],
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl StagingPolicy {
    fn is_allowed_type(&self, declared: &str) -> bool {
        match declared.trim().parse::<mime::Mime>() {
            Ok(parsed) => self
                .allowed_types
                .iter()
                .any(|allowed| allowed.essence_str() == parsed.essence_str()),
            Err(_) => false,
        }
    }

    /// Returns why the file would be refused, if it would be.
    pub fn check(&self, file: &StagedFile) -> Option<RejectionReason> {
        if !self.is_allowed_type(&file.mime_type) {
            return Some(RejectionReason::UnsupportedType {
                mime_type: file.mime_type.clone(),
            });
        }
        if file.size > self.max_file_size {
            return Some(RejectionReason::TooLarge {
                size: file.size,
                limit: self.max_file_size,
            });
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    UnsupportedType { mime_type: String },
    TooLarge { size: u64, limit: u64 },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::UnsupportedType { mime_type } => {
                write!(f, "type '{mime_type}' is not PDF, JPG or PNG")
            }
            RejectionReason::TooLarge { size, limit } => write!(
                f,
                "{} exceeds the {} limit",
                format_file_size(*size),
                format_file_size(*limit)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub name: String,
    pub reason: RejectionReason,
}

/// Outcome of staging a batch: what was kept and what was refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingReport {
    pub accepted: usize,
    pub rejected: Vec<RejectedFile>,
}

impl StagingReport {
    /// Non-fatal notice for the applicant when part of the batch was refused.
    pub fn warning(&self) -> Option<String> {
        if self.rejected.is_empty() {
            return None;
        }
        let details = self
            .rejected
            .iter()
            .map(|file| format!("{} ({})", file.name, file.reason))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!(
            "{} file(s) were not added. Please ensure files are PDF, JPG, or PNG and under 5MB: {}",
            self.rejected.len(),
            details
        ))
    }
}

impl DocumentInfo {
    /// Append the acceptable candidates to `category`, reporting the rest.
    ///
    /// Restored entries without content are dropped once a fresh file is
    /// accepted for the category, so the file uploaded first is always one
    /// with content.
    pub fn stage(
        &mut self,
        category: DocumentCategory,
        candidates: Vec<StagedFile>,
        policy: &StagingPolicy,
    ) -> StagingReport {
        let mut report = StagingReport::default();
        let mut accepted = Vec::new();

        for file in candidates {
            match policy.check(&file) {
                Some(reason) => report.rejected.push(RejectedFile {
                    name: file.name,
                    reason,
                }),
                None => accepted.push(file),
            }
        }

        report.accepted = accepted.len();
        if !accepted.is_empty() {
            let files = self.slot_mut(category).get_or_insert_with(Vec::new);
            files.retain(StagedFile::has_content);
            files.extend(accepted);
        }

        if let Some(warning) = report.warning() {
            warn!(category = %category, rejected = report.rejected.len(), "{warning}");
        }
        debug!(category = %category, accepted = report.accepted, "staged attachments");
        report
    }

    /// Drop one staged file; the category reverts to "no files" once empty.
    pub fn unstage(&mut self, category: DocumentCategory, index: usize) -> Option<StagedFile> {
        let slot = self.slot_mut(category);
        let files = slot.as_mut()?;
        if index >= files.len() {
            return None;
        }
        let removed = files.remove(index);
        if files.is_empty() {
            *slot = None;
        }
        Some(removed)
    }
}

pub fn format_file_size(size: u64) -> String {
    if size < 1024 {
        format!("{size} B")
    } else if size < 1024 * 1024 {
        format!("{:.1} KB", size as f64 / 1024.0)
    } else {
        format!("{:.1} MB", size as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn file(name: &str, mime_type: &str, size: usize) -> StagedFile {
        StagedFile::new(name, mime_type, Bytes::from(vec![0u8; size]))
    }

    #[test]
    fn accepted_files_append_to_existing_list() {
        let policy = StagingPolicy::default();
        let mut documents = DocumentInfo::default();

        documents.stage(
            DocumentCategory::Insurance,
            vec![file("cover.pdf", "application/pdf", 10)],
            &policy,
        );
        let report = documents.stage(
            DocumentCategory::Insurance,
            vec![file("sticker.png", "image/png", 20)],
            &policy,
        );

        assert_eq!(report.accepted, 1);
        let names: Vec<_> = documents
            .files(DocumentCategory::Insurance)
            .expect("files staged")
            .iter()
            .map(|file| file.name.as_str())
            .collect();
        assert_eq!(names, vec!["cover.pdf", "sticker.png"]);
    }

    #[test]
    fn rejected_files_warn_but_valid_ones_are_kept() {
        let policy = StagingPolicy::default();
        let mut documents = DocumentInfo::default();

        let report = documents.stage(
            DocumentCategory::LogBook,
            vec![
                file("logbook.jpg", "image/jpeg", 1024),
                file("notes.docx", "application/msword", 10),
                file("huge.pdf", "application/pdf", (MAX_FILE_SIZE + 1) as usize),
            ],
            &policy,
        );

        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 2);
        assert!(matches!(
            report.rejected[0].reason,
            RejectionReason::UnsupportedType { .. }
        ));
        assert!(matches!(
            report.rejected[1].reason,
            RejectionReason::TooLarge { .. }
        ));
        let warning = report.warning().expect("warning for rejected files");
        assert!(warning.starts_with("2 file(s) were not added"));
        assert_eq!(
            documents.files(DocumentCategory::LogBook).map(<[_]>::len),
            Some(1)
        );
    }

    #[test]
    fn fresh_file_replaces_restored_entries() {
        use crate::intake::domain::FileMetadata;

        let policy = StagingPolicy::default();
        let mut documents = DocumentInfo::default();
        documents.set(
            DocumentCategory::Insurance,
            Some(vec![StagedFile::from_metadata(FileMetadata {
                name: "old cover.pdf".to_string(),
                size: 10,
                mime_type: "application/pdf".to_string(),
            })]),
        );

        documents.stage(
            DocumentCategory::Insurance,
            vec![file("notes.txt", "text/plain", 10)],
            &policy,
        );
        assert_eq!(
            documents.files(DocumentCategory::Insurance).map(<[_]>::len),
            Some(1),
            "a rejected batch leaves the restored entry alone"
        );

        documents.stage(
            DocumentCategory::Insurance,
            vec![file("cover.pdf", "application/pdf", 10)],
            &policy,
        );
        let files = documents
            .files(DocumentCategory::Insurance)
            .expect("files staged");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "cover.pdf");
        assert!(files[0].has_content());
    }

    #[test]
    fn file_at_exact_limit_is_accepted() {
        let policy = StagingPolicy::default();
        let candidate = file("exact.pdf", "application/pdf", MAX_FILE_SIZE as usize);
        assert_eq!(policy.check(&candidate), None);
    }

    #[test]
    fn mime_parameters_do_not_block_allowed_types() {
        let policy = StagingPolicy::default();
        let candidate = file("scan.jpg", "image/jpeg; name=scan", 10);
        assert_eq!(policy.check(&candidate), None);
    }

    #[test]
    fn all_rejected_leaves_category_empty() {
        let policy = StagingPolicy::default();
        let mut documents = DocumentInfo::default();

        documents.stage(
            DocumentCategory::GoodConduct,
            vec![file("clip.mp4", "video/mp4", 10)],
            &policy,
        );

        assert!(documents.files(DocumentCategory::GoodConduct).is_none());
    }

    #[test]
    fn removing_last_file_reverts_to_no_files() {
        let policy = StagingPolicy::default();
        let mut documents = DocumentInfo::default();
        documents.stage(
            DocumentCategory::DriversLicense,
            vec![
                file("front.png", "image/png", 10),
                file("back.png", "image/png", 10),
            ],
            &policy,
        );

        let removed = documents
            .unstage(DocumentCategory::DriversLicense, 0)
            .expect("first file removed");
        assert_eq!(removed.name, "front.png");
        assert!(documents.files(DocumentCategory::DriversLicense).is_some());

        documents.unstage(DocumentCategory::DriversLicense, 0);
        assert!(documents.files(DocumentCategory::DriversLicense).is_none());
        assert!(documents.unstage(DocumentCategory::DriversLicense, 0).is_none());
    }

    #[test]
    fn formats_sizes_like_the_upload_list() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2.0 MB");
    }
}
