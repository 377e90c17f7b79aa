use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::download_model::HubClient;
use crate::error::FetchError;

pub const DEFAULT_REPO_ID: &str = "bartowski/Llama-3.2-3B-Instruct-GGUF";
pub const DEFAULT_FILENAME: &str = "Llama-3.2-3B-Instruct-Q4_K_M.gguf";
pub const DEFAULT_TARGET_DIR: &str = "assets/aka/models";
pub const DEFAULT_TARGET_FILE: &str = "model_v1.bin";

/// Anything smaller is reported as a possibly truncated download.
pub const MIN_EXPECTED_BYTES: u64 = 1_500_000_000;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

macro_rules! status {
    ($out:expr) => {
        writeln!($out).map_err(FetchError::Output)
    };
    ($out:expr, $($arg:tt)*) => {
        writeln!($out, $($arg)*).map_err(FetchError::Output)
    };
}

/// What to fetch and where the result has to live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub repo_id: String,
    pub filename: String,
    pub target_dir: PathBuf,
    pub target_file: String,
}

impl DownloadRequest {
    /// The canonical path the rest of the app loads the model from.
    pub fn target_path(&self) -> PathBuf {
        self.target_dir.join(&self.target_file)
    }
}

impl Default for DownloadRequest {
    fn default() -> Self {
        DownloadRequest {
            repo_id: DEFAULT_REPO_ID.to_string(),
            filename: DEFAULT_FILENAME.to_string(),
            target_dir: PathBuf::from(DEFAULT_TARGET_DIR),
            target_file: DEFAULT_TARGET_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A model was already in place and the operator kept it.
    Skipped,
    Downloaded { path: PathBuf, size_bytes: u64 },
}

impl Outcome {
    pub fn is_undersized(&self) -> bool {
        match self {
            Outcome::Skipped => false,
            Outcome::Downloaded { size_bytes, .. } => *size_bytes < MIN_EXPECTED_BYTES,
        }
    }
}

/// Bytes as binary gigabytes with two decimals.
pub fn format_gb(bytes: u64) -> String {
    format!("{:.2}", bytes as f64 / BYTES_PER_GB)
}

/// Puts the model at the canonical path, re-downloading only when asked to.
///
/// # Arguments
///
/// * `request` - What to download and where it must end up.
/// * `client` - Hub client doing the actual transfer.
/// * `input` - Where the re-download confirmation is read from.
/// * `out` - Where status lines are printed.
/// * `assume_yes` - Re-download an existing model without asking.
///
/// # Returns
///
/// The outcome, or the first error hit. Nothing is retried.
pub fn run<C, R, W>(
    request: &DownloadRequest,
    client: &C,
    input: &mut R,
    out: &mut W,
    assume_yes: bool,
) -> Result<Outcome, FetchError>
where
    C: HubClient + ?Sized,
    R: BufRead,
    W: Write,
{
    let target = request.target_path();

    status!(out, "=== Downloading {} ===", request.filename)?;
    status!(out, "Repository: {}", request.repo_id)?;
    status!(out, "File: {}", request.filename)?;
    status!(out, "Target: {}", target.display())?;
    status!(out)?;

    fs::create_dir_all(&request.target_dir).map_err(|source| FetchError::CreateDir {
        path: request.target_dir.clone(),
        source,
    })?;

    if let Ok(existing) = fs::metadata(&target) {
        status!(
            out,
            "Model already exists: {} ({} GB)",
            target.display(),
            format_gb(existing.len())
        )?;

        if !confirm(input, out, "Do you want to re-download? (y/N): ", assume_yes)? {
            status!(out, "Skipping download")?;
            return Ok(Outcome::Skipped);
        }

        fs::remove_file(&target).map_err(|source| FetchError::RemoveExisting {
            path: target.clone(),
            source,
        })?;
        debug!(path = %target.display(), "removed existing model");
    }

    status!(out, "Downloading model (this may take a while)...")?;
    status!(out)?;

    let downloaded = client.download(&request.repo_id, &request.filename, &request.target_dir)?;
    status!(out, "Downloaded to: {}", downloaded.display())?;

    if downloaded != target {
        move_into_place(&downloaded, &target)?;
        prune_empty_parents(&downloaded, &request.target_dir);
        status!(out, "Renamed to: {}", target.display())?;
    }

    let size_bytes = fs::metadata(&target)
        .map_err(|source| FetchError::Metadata {
            path: target.clone(),
            source,
        })?
        .len();

    status!(out)?;
    status!(out, "=== Download complete ===")?;
    status!(out, "Model saved to: {}", target.display())?;
    status!(out, "File size: {} GB", format_gb(size_bytes))?;
    status!(out)?;

    let outcome = Outcome::Downloaded {
        path: target,
        size_bytes,
    };
    if outcome.is_undersized() {
        warn!(size_bytes, "model file smaller than expected");
        status!(out, "WARNING: File size is less than expected (~2GB)")?;
        status!(out, "The download might be incomplete. Please check the file.")?;
    } else {
        status!(out, "Model downloaded successfully!")?;
    }

    Ok(outcome)
}

/// Runs the fetch and reports failures, returning the process exit code.
pub fn execute<C, R, W>(
    request: &DownloadRequest,
    client: &C,
    input: &mut R,
    out: &mut W,
    assume_yes: bool,
) -> u8
where
    C: HubClient + ?Sized,
    R: BufRead,
    W: Write,
{
    match run(request, client, input, out, assume_yes) {
        Ok(Outcome::Skipped) => {
            debug!("kept existing model");
            EXIT_SUCCESS
        }
        Ok(Outcome::Downloaded { path, size_bytes }) => {
            debug!(path = %path.display(), size_bytes, "model in place");
            EXIT_SUCCESS
        }
        Err(err) => {
            error!(%err, "fetch failed");
            if let Err(report_err) = report_failure(request, client, &err, out) {
                warn!(%report_err, "could not print failure report");
            }
            EXIT_FAILURE
        }
    }
}

fn report_failure<C, W>(
    request: &DownloadRequest,
    client: &C,
    err: &FetchError,
    out: &mut W,
) -> Result<(), FetchError>
where
    C: HubClient + ?Sized,
    W: Write,
{
    status!(out)?;
    if !err.is_download_phase() {
        return status!(out, "ERROR: {}", err);
    }

    status!(out, "ERROR: Download failed: {}", err)?;
    status!(out)?;
    status!(out, "Alternative: Download manually from:")?;
    status!(out, "{}", client.browse_url(&request.repo_id))?;
    status!(out)?;
    status!(out, "Then copy the file to: {}", request.target_path().display())
}

/// Anything other than `y` (any case) declines.
fn confirm<R, W>(
    input: &mut R,
    out: &mut W,
    question: &str,
    assume_yes: bool,
) -> Result<bool, FetchError>
where
    R: BufRead,
    W: Write,
{
    if assume_yes {
        status!(out, "{}y", question)?;
        return Ok(true);
    }

    write!(out, "{}", question).map_err(FetchError::Output)?;
    out.flush().map_err(FetchError::Output)?;

    let mut answer = String::new();
    input.read_line(&mut answer).map_err(FetchError::Prompt)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn move_into_place(from: &Path, to: &Path) -> Result<(), FetchError> {
    let rename_err = |source| FetchError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    if to.exists() {
        fs::remove_file(to).map_err(rename_err)?;
    }

    if let Err(err) = fs::rename(from, to) {
        // rename(2) cannot cross filesystems
        debug!(%err, "rename failed, copying instead");
        fs::copy(from, to)
            .and_then(|_| fs::remove_file(from))
            .map_err(rename_err)?;
    }

    Ok(())
}

/// Removes directories a nested remote filename left empty, up to `root`.
fn prune_empty_parents(moved: &Path, root: &Path) {
    let mut dir = moved.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        if let Err(err) = fs::remove_dir(current) {
            debug!(%err, path = %current.display(), "leaving directory in place");
            break;
        }
        dir = current.parent();
    }
}
