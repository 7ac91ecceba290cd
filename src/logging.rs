use std::str::FromStr;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. `RUST_LOG`, when set, wins over `level`.
/// A bare level gets quieter defaults for the HTTP and RPC client crates.
pub fn setup_logging(level: &str, json: bool) {
    let directives = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| level.trim().to_string());
    let directives = if directives.contains(',') || directives.contains('=') {
        directives
    } else {
        format!("{},hyper=info,reqwest=info,h2=info,rustls=info,solana_client=warn", directives)
    };
    let filter = EnvFilter::from_str(&directives).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_target(false).with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).compact())
            .init();
    }

    tracing::info!(
        filter = %directives,
        format = if json { "json" } else { "compact" },
        "Logging initialized"
    );
}
