use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SheetError {
    #[error("landmark '{label}' not found on any page")]
    LandmarkNotFound { label: String },

    #[error("found {count} header-shaped drawings on page {page}, expected at most one")]
    AmbiguousHeaderImage { page: u32, count: usize },

    #[error("invalid table region on page {page}: {detail}")]
    MalformedRegion { page: u32, detail: String },

    #[error("column label '{label}' not found inside the table region on page {page}")]
    MissingColumnLabel { page: u32, label: String },

    #[error("cannot rebuild overflow row {row} on page {page}: {reason}")]
    UnparsableOverflowRow {
        page: u32,
        row: usize,
        reason: String,
    },

    #[error("table on page {page} has {count} columns, which matches no known layout")]
    UnexpectedColumnCount { page: u32, count: usize },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to load PDF: {0}")]
    PdfLoad(#[from] lopdf::Error),

    #[error("invalid page selection: {0}")]
    InvalidPageSelection(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("no pages available after applying selection")]
    NoPagesSelected,

    #[error("{}: {source}", path.display())]
    Sheet {
        path: PathBuf,
        #[source]
        source: SheetError,
    },
}

impl ExtractError {
    #[must_use]
    pub fn sheet(path: impl Into<PathBuf>, source: SheetError) -> Self {
        Self::Sheet {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn sheet_error(&self) -> Option<&SheetError> {
        match self {
            Self::Sheet { source, .. } => Some(source),
            _ => None,
        }
    }
}
