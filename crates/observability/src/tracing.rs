//! Subscriber setup for the wallet services.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG`; the default keeps application logs at
/// `info` and quiets per-statement sqlx chatter. Set `LOG_FORMAT=pretty`
/// for human-readable local output instead of JSON lines.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx::query=warn"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let pretty = std::env::var("LOG_FORMAT").is_ok_and(|v| v == "pretty");
    // try_init so tests that embed the app can install their own subscriber.
    let _ = if pretty {
        builder.try_init()
    } else {
        builder.json().try_init()
    };
}
