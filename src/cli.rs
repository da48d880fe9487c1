//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Acquire and normalize content for a tenant.
///
/// Scrapers with delegated credentials are tried first; anything they do not
/// claim is fetched anonymously.
#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/content-gateway/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Gateway operations.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Retrieve a URL and decode it into readable text
    Scrape(AcquireArgs),

    /// Retrieve a URL and keep the original bytes
    Download(AcquireArgs),

    /// Write a local file to the first accepting storage root
    Upload(UploadArgs),
}

/// Options shared by every subcommand that talks to a tenant.
#[derive(ClapArgs, Debug, Clone)]
pub struct TenantArgs {
    /// Tenant configuration JSON file
    #[arg(long)]
    pub tenant: Option<PathBuf>,

    /// Delegated bearer token for a host, as HOST=TOKEN (repeatable)
    #[arg(long = "token", value_name = "HOST=TOKEN", value_parser = parse_host_token)]
    pub tokens: Vec<(String, String)>,

    /// Tenant feature flag to enable on top of the tenant file (repeatable)
    #[arg(long = "feature", value_name = "NAME")]
    pub features: Vec<String>,

    /// HTTP connect timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// HTTP read timeout in seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub read_timeout: Option<u64>,
}

/// Arguments for `scrape` and `download`.
#[derive(ClapArgs, Debug, Clone)]
pub struct AcquireArgs {
    /// URL to acquire
    pub url: String,

    #[command(flatten)]
    pub tenant: TenantArgs,

    /// Directory to write retrieved content into
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log raw and decoded payload previews
    #[arg(long)]
    pub verbose_diagnostics: bool,

    /// Characters per payload preview (1-65536)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=65_536))]
    pub preview_chars: Option<u64>,
}

/// Arguments for `upload`.
#[derive(ClapArgs, Debug, Clone)]
pub struct UploadArgs {
    /// Local file to upload
    pub file: PathBuf,

    /// Writable storage root URI, tried in the given order (repeatable)
    #[arg(long = "root", required = true)]
    pub roots: Vec<String>,

    /// Name to store the file as (defaults to the local file name)
    #[arg(long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub tenant: TenantArgs,
}

fn parse_host_token(raw: &str) -> Result<(String, String), String> {
    let (host, token) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected HOST=TOKEN, got '{raw}'"))?;
    let host = host.trim();
    let token = token.trim();
    if host.is_empty() || token.is_empty() {
        return Err(format!("expected HOST=TOKEN, got '{raw}'"));
    }
    Ok((host.to_ascii_lowercase(), token.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_scrape_parses_url_and_flags() {
        let args = Args::try_parse_from([
            "gateway",
            "scrape",
            "https://example.com/page.html",
            "--tenant",
            "tenant.json",
            "--output",
            "out",
            "--verbose-diagnostics",
        ])
        .unwrap();
        let Command::Scrape(acquire) = args.command else {
            panic!("expected scrape");
        };
        assert_eq!(acquire.url, "https://example.com/page.html");
        assert_eq!(acquire.tenant.tenant, Some(PathBuf::from("tenant.json")));
        assert_eq!(acquire.output, Some(PathBuf::from("out")));
        assert!(acquire.verbose_diagnostics);
    }

    #[test]
    fn test_cli_verbose_flag_is_global() {
        let args =
            Args::try_parse_from(["gateway", "download", "https://example.com/a", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Command::Download(_)));
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["gateway", "-q", "scrape", "https://x.test/"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_token_flag_parses_pairs() {
        let args = Args::try_parse_from([
            "gateway",
            "scrape",
            "https://x.test/",
            "--token",
            "Contoso.SharePoint.com=abc",
            "--token",
            "github.com=def",
        ])
        .unwrap();
        let Command::Scrape(acquire) = args.command else {
            panic!("expected scrape");
        };
        assert_eq!(
            acquire.tenant.tokens,
            vec![
                ("contoso.sharepoint.com".to_string(), "abc".to_string()),
                ("github.com".to_string(), "def".to_string()),
            ]
        );
    }

    #[test]
    fn test_cli_feature_flag_is_repeatable() {
        let args = Args::try_parse_from([
            "gateway",
            "download",
            "https://github.com/o/r/blob/main/a.md",
            "--feature",
            "github",
            "--feature",
            "beta",
        ])
        .unwrap();
        let Command::Download(acquire) = args.command else {
            panic!("expected download");
        };
        assert_eq!(acquire.tenant.features, vec!["github", "beta"]);
    }

    #[test]
    fn test_cli_token_flag_rejects_malformed_pair() {
        let result = Args::try_parse_from(["gateway", "scrape", "https://x.test/", "--token", "abc"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_timeout_range_enforced() {
        let result = Args::try_parse_from([
            "gateway",
            "download",
            "https://x.test/",
            "--read-timeout",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_upload_requires_root() {
        let result = Args::try_parse_from(["gateway", "upload", "notes.md"]);
        assert!(result.is_err());

        let args = Args::try_parse_from([
            "gateway",
            "upload",
            "notes.md",
            "--root",
            "https://contoso.sharepoint.com/sites/T/Docs",
            "--name",
            "summary.md",
        ])
        .unwrap();
        let Command::Upload(upload) = args.command else {
            panic!("expected upload");
        };
        assert_eq!(upload.roots.len(), 1);
        assert_eq!(upload.name.as_deref(), Some("summary.md"));
    }

    #[test]
    fn test_cli_missing_subcommand_is_error() {
        let result = Args::try_parse_from(["gateway"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["gateway", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
