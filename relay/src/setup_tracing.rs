use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::PanicHookInfo;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::{Layer, fmt};

const ENV_DEBUG: &str = "RELAY_DEBUG";

/// Routes panics through `tracing` so that they end up as a single log line.
fn report_panic(panic_info: &PanicHookInfo<'_>) {
    // noop unless RUST_BACKTRACE or RUST_LIB_BACKTRACE is set
    let backtrace = Backtrace::capture();
    let payload = panic_info
        .payload()
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<String>()
                .map(String::as_str)
        });

    match (
        panic_info.location(),
        payload,
        backtrace.status() == BacktraceStatus::Captured,
    ) {
        (Some(location), Some(payload), false) => tracing::error!(
            "{}:{}:{}: {}",
            location.file(),
            location.line(),
            location.column(),
            payload,
        ),
        _ => tracing::error!("{}\n{}", panic_info, backtrace),
    }
}

fn debug_mode() -> bool {
    std::env::var(ENV_DEBUG).is_ok_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Installs the global subscriber. RUST_LOG overrides the default level, which is `info`, or
/// `debug` with human readable output when RELAY_DEBUG=true.
pub(super) fn register() {
    let debug_mode = debug_mode();
    let default_level = if debug_mode {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let layer = if debug_mode {
        fmt::layer().boxed()
    } else {
        // JSON, flattened
        fmt::layer()
            .with_ansi(false)
            .json()
            .flatten_event(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .init();

    std::panic::set_hook(Box::new(report_panic));
}
