//!
//! jcu-common auth server binary
//! -----------------------------
//! Loads flat settings from a JSON file and serves the login/logout routes.
//! Configuration via CLI flags and environment variables:
//! `--settings <path>` / `JCU_SETTINGS`, `--port <port>` / `JCU_HTTP_PORT`.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use jcu_common::settings::Settings;

const DEFAULT_HTTP_PORT: u16 = 8080;

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    let i = args.iter().position(|a| a == flag)?;
    args.get(i + 1).cloned()
}

fn parse_port(value: &str, source: &str) -> Result<u16> {
    value.parse::<u16>().with_context(|| format!("invalid port `{value}` from {source}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let settings_path = parse_arg(&args, "--settings")
        .or_else(|| env::var("JCU_SETTINGS").ok())
        .map(PathBuf::from)
        .context("no settings file given (use --settings <path> or JCU_SETTINGS)")?;
    let http_port = match parse_arg(&args, "--port") {
        Some(p) => parse_port(&p, "--port")?,
        None => match env::var("JCU_HTTP_PORT") {
            Ok(p) => parse_port(&p, "JCU_HTTP_PORT")?,
            Err(_) => DEFAULT_HTTP_PORT,
        },
    };

    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "startup",
        "jcu-auth-server starting: RUST_LOG='{}', http_port={}, settings='{}'",
        rust_log,
        http_port,
        settings_path.display()
    );

    let settings = Settings::from_json_file(&settings_path)
        .with_context(|| format!("while loading settings from {}", settings_path.display()))?;
    jcu_common::server::run_with_settings(settings, http_port).await
}
