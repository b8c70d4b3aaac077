//! Tracing bootstrap for binaries and test harnesses.
//!
//! The core emits structured `tracing` events throughout (offer
//! admission, graph expansion, message release, completion). This
//! module wires up a subscriber so those events land somewhere useful:
//! an env-filtered fmt layer plus `tracing-error`'s span-trace layer,
//! after loading `.env` so `RUST_LOG` can live there.

use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the default subscriber.
///
/// Filter comes from `RUST_LOG` (falling back to `info`). Safe to call
/// more than once; only the first installation wins, which is what test
/// binaries want.
pub fn init() {
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(true))
        .with(ErrorLayer::default())
        .try_init();
}
