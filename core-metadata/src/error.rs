use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Failed to extract metadata: {0}")]
    ExtractionFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Lyrics fetch failed: {0}")]
    LyricsFetchFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tag parsing error: {0}")]
    Tag(#[from] lofty::error::LoftyError),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[cfg(feature = "lyrics")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl MetadataError {
    /// Whether the failure came from talking to a remote service.
    pub fn is_network(&self) -> bool {
        match self {
            MetadataError::LyricsFetchFailed(_) => true,
            #[cfg(feature = "lyrics")]
            MetadataError::Http(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;
