use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a hub client while resolving a file to bytes on disk.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("HTTP request failed: {0}")]
    Client(#[from] reqwest::Error),

    #[error("{status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("transfer interrupted, partial file left at {}: {source}", partial.display())]
    Transfer { partial: PathBuf, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to read confirmation: {0}")]
    Prompt(io::Error),

    #[error("failed to remove existing model {}: {source}", path.display())]
    RemoveExisting { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Download(#[from] HubError),

    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("failed to stat {}: {source}", path.display())]
    Metadata { path: PathBuf, source: io::Error },

    #[error("failed to write status output: {0}")]
    Output(io::Error),
}

impl FetchError {
    /// Errors raised between handing off to the hub client and the final size check.
    pub fn is_download_phase(&self) -> bool {
        matches!(
            self,
            Self::Download(_) | Self::Rename { .. } | Self::Metadata { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_carries_status_line() {
        let err = HubError::Status {
            status: reqwest::StatusCode::NOT_FOUND,
            url: "https://huggingface.co/org/repo/resolve/main/a.gguf".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "404 Not Found for https://huggingface.co/org/repo/resolve/main/a.gguf"
        );
    }

    #[test]
    fn test_download_phase_classification() {
        let download = FetchError::Download(HubError::Io(io::Error::other("boom")));
        assert!(download.is_download_phase());
        assert_eq!(download.to_string(), "I/O error: boom");

        let rename = FetchError::Rename {
            from: PathBuf::from("a"),
            to: PathBuf::from("b"),
            source: io::Error::other("denied"),
        };
        assert!(rename.is_download_phase());

        let setup = FetchError::CreateDir {
            path: PathBuf::from("models"),
            source: io::Error::other("read-only"),
        };
        assert!(!setup.is_download_phase());
        assert!(!FetchError::Prompt(io::Error::other("eof")).is_download_phase());
    }
}
