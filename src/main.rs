//! CLI entry point for the wget2go download tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wget2go::config::{Config, FileConfig};
use wget2go::crawl::Crawler;
use wget2go::download::{ChunkDownloader, HttpClient};

mod cli;

use cli::Cli;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    Success,
    Partial,
    Failure,
}

impl ProcessExit {
    const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Partial => 1,
            Self::Failure => 2,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(&args);

    match run(args).await {
        Ok(outcome) => ExitCode::from(outcome.code()),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(ProcessExit::Failure.code())
        }
    }
}

fn init_tracing(args: &Cli) {
    let default_level = if args.verbose {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Cli) -> Result<ProcessExit> {
    if args.urls.is_empty() {
        bail!("no URLs given; see --help");
    }

    let mut config = Config::default();
    if let Some(file) = FileConfig::discover().context("loading config file")? {
        config.apply_file(&file).context("applying config file")?;
    }
    config.apply_env().context("applying environment")?;
    args.apply_to(&mut config).context("applying arguments")?;
    let config = Arc::new(config);

    let client = Arc::new(HttpClient::new(Arc::clone(&config))?);

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            signal_token.cancel();
        }
    });

    let mut failed = 0usize;
    for url in &args.urls {
        if cancel.is_cancelled() {
            break;
        }

        let result = if config.recursive {
            let output_dir = config
                .output_file
                .clone()
                .unwrap_or_else(|| PathBuf::from("."));
            let crawler = Crawler::new(Arc::clone(&client), Arc::clone(&config));
            crawler
                .download(url, &output_dir, &cancel)
                .await
                .map_err(anyhow::Error::from)
        } else {
            let downloader = ChunkDownloader::new(Arc::clone(&client), Arc::clone(&config));
            downloader
                .download(url, None, &cancel)
                .await
                .map(|path| info!(url = %url, path = %path.display(), "saved"))
                .map_err(anyhow::Error::from)
        };

        if let Err(e) = result {
            error!(url = %url, "download failed: {e:#}");
            failed += 1;
        }
    }

    if cancel.is_cancelled() {
        return Ok(ProcessExit::Failure);
    }
    Ok(if failed == 0 {
        ProcessExit::Success
    } else if failed < args.urls.len() {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    })
}
