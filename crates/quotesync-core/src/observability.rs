use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

pub const ENV_LOG: &str = "QUOTESYNC_LOG";
pub const ENV_LOG_FORMAT: &str = "QUOTESYNC_LOG_FORMAT";

static INIT: OnceCell<()> = OnceCell::new();

/// Output shape of the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match std::env::var(ENV_LOG_FORMAT) {
            Ok(value) if value.trim().eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

fn resolve_env_filter() -> EnvFilter {
    if let Ok(directives) = std::env::var(ENV_LOG) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the tracing subscriber once per process.
///
/// Environment variables:
/// - `QUOTESYNC_LOG`: filter directives (`info`, `quotesync_core=debug`, ...).
/// - `RUST_LOG`: fallback filter when `QUOTESYNC_LOG` is unset or invalid.
/// - `QUOTESYNC_LOG_FORMAT`: `json` for JSON lines, anything else for compact console output.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_tracing() {
    INIT.get_or_init(|| {
        let env_filter = resolve_env_filter();
        match LogFormat::from_env() {
            LogFormat::Json => {
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            LogFormat::Compact => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}
