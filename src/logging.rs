//! Tracing initialization
//!
//! Log level comes from `RUST_LOG` when set, falling back to `LOG_LEVEL`
//! (default `info`). `LOG_FORMAT=json` switches to JSON output for log
//! aggregation; anything else keeps the human-readable format.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let fallback = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // try_init so tests that initialize twice don't panic
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}
