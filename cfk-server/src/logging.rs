//! Structured logging setup.
//!
//! `EnvFilter` + the standard `fmt` layer, as the reference codebase's
//! workspace already depends on `tracing`/`tracing-subscriber` without
//! making much use of either. The one gateway-specific piece is
//! [`redact`], applied to any header value before it is attached to a
//! span or log record.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,cfk_server=debug"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

/// Redacts header values that could leak credentials into logs.
/// Case-insensitive on `Authorization` and `X-Api-Key`.
pub fn redact_header(name: &str, value: &str) -> String {
    if name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case("x-api-key") {
        "***redacted***".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_known_sensitive_headers() {
        assert_eq!(redact_header("Authorization", "Bearer secret"), "***redacted***");
        assert_eq!(redact_header("X-Api-Key", "abc123"), "***redacted***");
        assert_eq!(redact_header("x-api-key", "abc123"), "***redacted***");
    }

    #[test]
    fn leaves_other_headers_untouched() {
        assert_eq!(redact_header("Content-Type", "application/json"), "application/json");
    }
}
