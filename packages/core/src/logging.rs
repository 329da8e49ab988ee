use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: engine events at info, sqlx
/// per-statement logging muted.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialize structured logging for the application.
///
/// Call once from `main`. A second call is a no-op.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok();

    if installed {
        info!("Logging initialized");
    }
}
