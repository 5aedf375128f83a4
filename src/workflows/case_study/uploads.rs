use mime::Mime;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::UploadLimits;

/// Where an uploaded file lands on the case study record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSlot {
    CaseMaterial,
    AdditionalMaterial,
    Submission,
    WrittenCorrection,
    ModelSolution,
    ScoringSheet,
}

impl ArtifactSlot {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CaseMaterial => "case material",
            Self::AdditionalMaterial => "additional material",
            Self::Submission => "submission",
            Self::WrittenCorrection => "written correction",
            Self::ModelSolution => "model solution",
            Self::ScoringSheet => "scoring sheet",
        }
    }

    pub fn accepts(self, kind: FileKind) -> bool {
        match self {
            Self::ScoringSheet => matches!(kind, FileKind::Pdf | FileKind::Spreadsheet),
            _ => kind == FileKind::Pdf,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    Spreadsheet,
}

impl FileKind {
    pub fn from_mime(content_type: &Mime) -> Option<Self> {
        if content_type.essence_str() == mime::APPLICATION_PDF.essence_str() {
            return Some(Self::Pdf);
        }

        match content_type.essence_str() {
            "text/csv"
            | "application/csv"
            | "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                Some(Self::Spreadsheet)
            }
            _ => None,
        }
    }
}

/// File as received from a client, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("{slot} does not accept content type '{content_type}'")]
    WrongType {
        slot: &'static str,
        content_type: String,
    },
    #[error("{file_name} is {size} bytes, limit is {limit} bytes")]
    TooLarge {
        file_name: String,
        size: usize,
        limit: usize,
    },
    #[error("{file_name} is empty")]
    Empty { file_name: String },
    #[error("video corrections must be http(s) links, got '{0}'")]
    InvalidVideoLink(String),
}

/// Type and size gate applied before bytes reach blob storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    limits: UploadLimits,
}

impl UploadPolicy {
    pub fn new(limits: UploadLimits) -> Self {
        Self { limits }
    }

    pub fn limit_for(&self, kind: FileKind) -> usize {
        match kind {
            FileKind::Pdf => self.limits.max_pdf_bytes,
            FileKind::Spreadsheet => self.limits.max_spreadsheet_bytes,
        }
    }

    /// Validate a file for `slot`, returning its normalized content type.
    pub fn check(&self, slot: ArtifactSlot, file: &UploadedFile) -> Result<Mime, UploadError> {
        let wrong_type = || UploadError::WrongType {
            slot: slot.label(),
            content_type: file.content_type.clone(),
        };

        let content_type: Mime = file.content_type.trim().parse().map_err(|_| wrong_type())?;
        let kind = FileKind::from_mime(&content_type)
            .filter(|kind| slot.accepts(*kind))
            .ok_or_else(wrong_type)?;

        if file.bytes.is_empty() {
            return Err(UploadError::Empty {
                file_name: file.file_name.clone(),
            });
        }

        let limit = self.limit_for(kind);
        if file.bytes.len() > limit {
            return Err(UploadError::TooLarge {
                file_name: file.file_name.clone(),
                size: file.bytes.len(),
                limit,
            });
        }

        Ok(content_type)
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(UploadLimits::default())
    }
}

/// Videos are hosted externally; only the link is stored.
///
/// The link must parse as an absolute http(s) URL with a host. The trimmed input is stored as
/// written, not in its normalized form.
pub fn validate_video_link(url: &str) -> Result<String, UploadError> {
    let trimmed = url.trim();
    let acceptable = Url::parse(trimmed).is_ok_and(|parsed| {
        matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().is_some_and(|host| !host.is_empty())
    });
    if acceptable {
        Ok(trimmed.to_string())
    } else {
        Err(UploadError::InvalidVideoLink(trimmed.to_string()))
    }
}
