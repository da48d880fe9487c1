//! CLI entry point for the content gateway.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use clap::Parser;
use content_gateway::content::filename::sanitize_filename;
use content_gateway::{
    AcquisitionOptions, AcquisitionService, ContentUnit, HttpFetcher, HttpTimeouts,
    StaticTokenProvider, StorageRoot, TenantConfig, TokenProvider, TracingSink,
    build_default_decoder_registry, build_default_scraper_registry, build_default_upload_service,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{FileConfig, load_file_config};
use cli::{AcquireArgs, Args, Command, TenantArgs, UploadArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");
    let file_config = load_file_config(args.config.as_deref())?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            signal_token.cancel();
        }
    });

    match args.command {
        Command::Scrape(acquire) => run_acquire(&acquire, &file_config, true, &cancel).await,
        Command::Download(acquire) => run_acquire(&acquire, &file_config, false, &cancel).await,
        Command::Upload(upload) => run_upload(&upload, &file_config, &cancel).await,
    }
}

async fn run_acquire(
    args: &AcquireArgs,
    file_config: &FileConfig,
    decode: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let tenant = load_tenant(&args.tenant, file_config)?;
    let timeouts = timeouts(&args.tenant, file_config);
    let tokens = token_provider(&args.tenant);

    let preview_chars = match args.preview_chars {
        Some(chars) => usize::try_from(chars).context("preview_chars out of range")?,
        None => file_config
            .preview_chars
            .unwrap_or(content_gateway::acquisition::DEFAULT_PREVIEW_CHARS),
    };
    let options = AcquisitionOptions {
        verbose_diagnostics: args.verbose_diagnostics
            || file_config.verbose_diagnostics.unwrap_or(false),
        preview_chars,
    };

    let service = AcquisitionService::new(
        Arc::new(build_default_scraper_registry(tokens, timeouts)?),
        Arc::new(build_default_decoder_registry()),
        Arc::new(HttpFetcher::with_timeouts(timeouts)?),
    )
    .with_sink(Arc::new(TracingSink))
    .with_options(options);

    let units = if decode {
        service.scrape(&tenant, &args.url, cancel).await?
    } else {
        service.download(&tenant, &args.url, cancel).await?
    };

    for unit in &units {
        println!(
            "{}\t{}\t{} bytes\t{}",
            unit.display_name(),
            unit.mime_type(),
            unit.payload_len(),
            unit.source_uri()
        );
    }

    if let Some(dir) = &args.output {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory '{}'", dir.display()))?;
        for unit in &units {
            let path = write_unit(dir, unit)?;
            info!(path = %path.display(), "Saved content");
        }
    }
    Ok(())
}

async fn run_upload(
    args: &UploadArgs,
    file_config: &FileConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let tenant = load_tenant(&args.tenant, file_config)?;
    let timeouts = timeouts(&args.tenant, file_config);
    let service = build_default_upload_service(token_provider(&args.tenant), timeouts)?;

    let bytes = fs::read(&args.file)
        .with_context(|| format!("Failed to read '{}'", args.file.display()))?;
    let filename = match &args.name {
        Some(name) => name.clone(),
        None => args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("'{}' has no file name", args.file.display()))?,
    };
    let roots: Vec<StorageRoot> = args
        .roots
        .iter()
        .map(|uri| StorageRoot::new(uri.clone()).writable())
        .collect();

    match service
        .upload(&tenant, &roots, &filename, Bytes::from(bytes), cancel)
        .await?
    {
        Some(reference) => {
            println!("{}", reference.uri);
            Ok(())
        }
        None => bail!(
            "No storage root accepted '{filename}'\n  Suggestion: Check the root URIs and run with -v for per-root errors"
        ),
    }
}

fn load_tenant(args: &TenantArgs, file_config: &FileConfig) -> Result<TenantConfig> {
    let path = args.tenant.as_ref().or(file_config.tenant_config.as_ref());
    let tenant = match path {
        Some(path) => TenantConfig::from_path(path)?,
        None => {
            debug!("No tenant configuration given, using anonymous tenant");
            TenantConfig::new("anonymous")
        }
    };
    Ok(args
        .features
        .iter()
        .fold(tenant, |tenant, feature| tenant.with_feature(feature.trim())))
}

fn timeouts(args: &TenantArgs, file_config: &FileConfig) -> HttpTimeouts {
    let defaults = HttpTimeouts::default();
    HttpTimeouts {
        connect_timeout_secs: args
            .connect_timeout
            .or(file_config.connect_timeout_secs)
            .unwrap_or(defaults.connect_timeout_secs),
        read_timeout_secs: args
            .read_timeout
            .or(file_config.read_timeout_secs)
            .unwrap_or(defaults.read_timeout_secs),
    }
}

fn token_provider(args: &TenantArgs) -> Arc<dyn TokenProvider> {
    let provider = args
        .tokens
        .iter()
        .fold(StaticTokenProvider::new(), |provider, (host, token)| {
            provider.with_token(host.clone(), token.clone())
        });
    Arc::new(provider)
}

/// Writes `unit` under `dir`, suffixing the name when it already exists.
fn write_unit(dir: &Path, unit: &ContentUnit) -> Result<PathBuf> {
    let name = sanitize_filename(&unit.display_name());
    let mut path = dir.join(&name);
    let (stem, ext) = match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name.as_str(), ""),
    };
    let mut attempt = 1;
    while path.exists() {
        path = dir.join(format!("{stem}-{attempt}{ext}"));
        attempt += 1;
    }
    fs::write(&path, unit.payload())
        .with_context(|| format!("Failed to write '{}'", path.display()))?;
    Ok(path)
}
