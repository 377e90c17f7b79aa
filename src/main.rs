use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::download_model::{DownloadConfig, HttpHubClient, DEFAULT_ENDPOINT, DEFAULT_REVISION};
use crate::fetcher::{
    DownloadRequest, DEFAULT_FILENAME, DEFAULT_REPO_ID, DEFAULT_TARGET_DIR, DEFAULT_TARGET_FILE,
    EXIT_FAILURE,
};

mod download_model;
mod error;
mod fetcher;

/// Downloads the bundled model file from the Hugging Face hub into its fixed location.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Repository to download from
    #[arg(long, default_value = DEFAULT_REPO_ID)]
    repo_id: String,

    /// File to fetch from the repository
    #[arg(long, default_value = DEFAULT_FILENAME)]
    filename: String,

    /// Directory the model is stored in
    #[arg(long, default_value = DEFAULT_TARGET_DIR)]
    target_dir: PathBuf,

    /// Name the model is stored under
    #[arg(long, default_value = DEFAULT_TARGET_FILE)]
    target_file: String,

    /// Git revision of the repository
    #[arg(long, default_value = DEFAULT_REVISION)]
    revision: String,

    /// Base URL of the hub
    #[arg(long, env = "HF_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Access token for gated or private repositories
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Re-download an existing model without asking
    #[arg(short, long)]
    yes: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl Args {
    fn request(&self) -> DownloadRequest {
        DownloadRequest {
            repo_id: self.repo_id.clone(),
            filename: self.filename.clone(),
            target_dir: self.target_dir.clone(),
            target_file: self.target_file.clone(),
        }
    }

    fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            endpoint: self.endpoint.clone(),
            revision: self.revision.clone(),
            token: self.token.clone(),
            progress: !self.no_progress,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    // Nothing on disk is touched until the HTTP client is usable
    let client = match HttpHubClient::new(args.download_config()) {
        Ok(client) => client,
        Err(err) => {
            println!("ERROR: HTTP client could not be initialised: {}", err);
            println!("Check that the system TLS libraries and CA certificates are installed");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let code = fetcher::execute(
        &args.request(),
        &client,
        &mut stdin.lock(),
        &mut stdout.lock(),
        args.yes,
    );

    ExitCode::from(code)
}
