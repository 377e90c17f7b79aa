use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use crate::error::HubError;

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
pub const DEFAULT_REVISION: &str = "main";

// Configuration for talking to the hub
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub endpoint: String,
    pub revision: String,
    pub token: Option<String>,
    pub progress: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            revision: DEFAULT_REVISION.to_string(),
            token: None,
            progress: true,
        }
    }
}

/// Resolves a repository/filename pair to a file on local disk.
pub trait HubClient {
    /// Fetches `filename` from `repo_id` into `local_dir` as a regular file.
    ///
    /// # Returns
    ///
    /// The path the file was written to. It is not necessarily the path the
    /// caller wants the file to end up at.
    fn download(&self, repo_id: &str, filename: &str, local_dir: &Path)
        -> Result<PathBuf, HubError>;

    /// Page where an operator can fetch the repository files by hand.
    fn browse_url(&self, repo_id: &str) -> String {
        format!("{}/{}/tree/{}", DEFAULT_ENDPOINT, repo_id, DEFAULT_REVISION)
    }
}

pub struct HttpHubClient {
    client: Client,
    config: DownloadConfig,
}

impl HttpHubClient {
    pub fn new(config: DownloadConfig) -> Result<Self, HubError> {
        // Model files take minutes to stream, so only connecting is bounded.
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn file_url(&self, repo_id: &str, filename: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.endpoint(),
            repo_id,
            self.config.revision,
            filename
        )
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }

        match total {
            Some(len) => {
                let pb = ProgressBar::new(len);
                if let Ok(style) = ProgressStyle::with_template(
                    "[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                if let Ok(style) =
                    ProgressStyle::with_template("{spinner} {bytes} ({bytes_per_sec})")
                {
                    pb.set_style(style);
                }
                pb
            }
        }
    }
}

impl HubClient for HttpHubClient {
    fn download(
        &self,
        repo_id: &str,
        filename: &str,
        local_dir: &Path,
    ) -> Result<PathBuf, HubError> {
        let url = self.file_url(repo_id, filename);
        let destination = local_dir.join(filename);
        let parent = destination.parent().unwrap_or(local_dir);
        fs::create_dir_all(parent)?;

        info!(%url, "requesting model file");
        let mut request = self.client.get(&url);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let mut response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(HubError::Status { status, url });
        }

        let total = response.content_length();
        debug!(?total, "streaming response body");

        // Stage next to the destination so the final rename stays on one filesystem
        let mut staged = tempfile::Builder::new()
            .prefix(".")
            .suffix(".incomplete")
            .tempfile_in(parent)?;

        let pb = self.progress_bar(total);
        let copied = io::copy(&mut response, &mut pb.wrap_write(staged.as_file_mut()));
        let written = match copied {
            Ok(written) => written,
            Err(source) => {
                pb.abandon();
                let (_, partial) = staged.keep().map_err(io::Error::from)?;
                warn!(path = %partial.display(), "download interrupted");
                return Err(HubError::Transfer { partial, source });
            }
        };
        pb.finish_and_clear();

        // Temp files are created owner-only
        make_world_readable(staged.path())?;
        staged.persist(&destination).map_err(io::Error::from)?;
        debug!(written, path = %destination.display(), "model file written");

        Ok(destination)
    }

    fn browse_url(&self, repo_id: &str) -> String {
        format!("{}/{}/tree/{}", self.endpoint(), repo_id, self.config.revision)
    }
}

#[cfg(unix)]
fn make_world_readable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn make_world_readable(_path: &Path) -> io::Result<()> {
    Ok(())
}
