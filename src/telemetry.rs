//! Logging setup.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: tracing filter directives (default: `r8r_mintlify=info`)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "r8r_mintlify=info";

/// Build the log filter from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
pub fn env_filter() -> EnvFilter {
    filter_from(std::env::var("RUST_LOG").ok().as_deref())
}

fn filter_from(directives: Option<&str>) -> EnvFilter {
    match directives.map(str::trim) {
        Some(d) if !d.is_empty() => {
            EnvFilter::try_new(d).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
        }
        _ => EnvFilter::new(DEFAULT_FILTER),
    }
}

/// Install the global tracing subscriber.
///
/// Logs go to stderr so that command output on stdout stays valid JSON.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(env_filter()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(filter_from(None).to_string(), DEFAULT_FILTER);
        assert_eq!(filter_from(Some("  ")).to_string(), DEFAULT_FILTER);
    }

    #[test]
    fn test_custom_filter() {
        assert_eq!(
            filter_from(Some("r8r_mintlify=debug")).to_string(),
            "r8r_mintlify=debug"
        );
    }
}
