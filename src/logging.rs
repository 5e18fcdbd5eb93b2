// src/logging.rs
//! Tracing setup plus the small helpers used to keep personal data out of logs.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const ENV_DEV_LOG: &str = "HEALTHTRACK_DEV_LOG";

/// Dev environment: debug build OR SHUTTLE_ENV in {local, development, dev}.
pub(crate) fn is_dev_env() -> bool {
    cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        )
}

/// Verbose logs need BOTH HEALTHTRACK_DEV_LOG=1 and a dev environment.
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var(ENV_DEV_LOG).ok().as_deref() == Some("1");
    on && is_dev_env()
}

/// Install a compact fmt subscriber. Safe to call when the runtime already
/// installed one (the second install is ignored).
pub fn init_tracing() {
    let default = if dev_logging_enabled() {
        "healthtrack=debug,info"
    } else {
        "healthtrack=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// Short, stable id for a value that must not appear in logs verbatim.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("testuser");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("testuser"));
        assert_ne!(a, anon_hash("testuser2"));
    }
}
