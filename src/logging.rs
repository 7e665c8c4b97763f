//! Logging setup.
//!
//! Two streams:
//! - Diagnostics go through `tracing` to stderr, filtered by `RUST_LOG`
//!   or the configured level.
//! - Access lines (`[HH:MM:SS] <summary>`) go to stdout, one per request.

use chrono::{DateTime, Local, TimeZone};
use std::io::Write;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Install the global tracing subscriber.
pub fn init(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Write an access line for one request to stdout.
pub fn access(summary: &str) {
    let line = access_line(&Local::now(), summary);
    let mut stdout = std::io::stdout().lock();
    // Ignore a closed stdout.
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.flush();
}

fn access_line<Tz: TimeZone>(at: &DateTime<Tz>, summary: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("[{}] {}", at.format("%H:%M:%S"), summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_access_line_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 4, 7).unwrap();
        assert_eq!(
            access_line(&at, "GET /test HTTP/1.1"),
            "[09:04:07] GET /test HTTP/1.1"
        );
    }
}
