use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LogLevel};

/// Target of the connect/disconnect events. Always recorded at info,
/// whatever the configured level.
pub const AUDIT_TARGET: &str = "audit";

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level; output goes to stderr so listings on stdout stay clean.
pub fn init(level: LogLevel, format: LogFormat) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(level, rust_log.as_deref()))
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Text => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().with_target(true).try_init(),
    };
}

fn filter(level: LogLevel, rust_log: Option<&str>) -> EnvFilter {
    let base = rust_log
        .map(str::trim)
        .filter(|directives| !directives.is_empty())
        .unwrap_or(level.as_filter());
    EnvFilter::new(format!("{base},{AUDIT_TARGET}=info"))
}

/// The invoking user, preferring the account behind `sudo`.
pub fn invoking_user() -> String {
    std::env::var("SUDO_USER")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}
