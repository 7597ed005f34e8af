//! Provide tracing, tailored to the collector.
//!
//! The daemon calls [`init_journald_or_stdout`] once at startup, after the
//! configuration is loaded, to install a subscriber. Everything else uses
//! `use crate::tracing::prelude::*` for the `trace!()` .. `error!()` macros.

use std::env;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Initialize logging.
///
/// Under systemd, events go to journald; otherwise to stdout, filtered by
/// `RUST_LOG` with `default_level` (e.g. "info", from the config file) used
/// when the variable is unset.
pub fn init_journald_or_stdout(default_level: &str) {
    let level = parse_level(default_level);

    if env::var("JOURNAL_STREAM").is_ok() {
        match tracing_journald::layer() {
            Ok(layer) => tracing_subscriber::registry()
                .with(level)
                .with(layer)
                .init(),
            Err(e) => {
                use_stdout(level);
                error!(error = %e, "Failed to initialize journald logging, using stdout.");
            }
        }
    } else {
        use_stdout(level);
    }
}

/// Map a configured level name onto a filter, falling back to INFO.
pub fn parse_level(name: &str) -> LevelFilter {
    name.parse().unwrap_or(LevelFilter::INFO)
}

fn use_stdout(level: LevelFilter) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
        .init();
}

// Local time to the nearest second; the default UTC timer is long and hard
// to line up against a test stand log sheet.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{stamp}")
    }
}
