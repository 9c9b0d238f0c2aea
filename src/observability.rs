//! This module provides logging and diagnostics hooks for chunk retrieval.
//!
//! A background downloader is only debuggable if its scheduling decisions are
//! visible. The `log_metric!` macro emits structured key-value records through
//! the `log` facade under the `chunkwire::metric` target, so they can be
//! filtered independently of ordinary diagnostics.

use std::fs::OpenOptions;
use std::sync::Once;

use log::LevelFilter;

use crate::error::{ChunkError, Result};

/// Logs a structured key-value metric at debug level.
///
/// # Example
/// ```
/// use chunkwire::log_metric;
/// let chunk_index = 4;
/// log_metric!("event"="chunk_dispatched", "chunk"=&chunk_index);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        if $crate::__log::log_enabled!(target: "chunkwire::metric", $crate::__log::Level::Debug) {
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+
            $crate::__log::debug!(target: "chunkwire::metric", "{{ {} }}", parts.join(", "));
        }
    };
}

static INIT_LOGGER: Once = Once::new();

/// Installs an `env_logger` backend once per process.
///
/// Records are printed as `[LEVEL] message`. When `log_file` is given they
/// are appended to that file instead of stderr. Later calls are no-ops.
pub fn init_logging(level: LevelFilter, log_file: Option<&str>) -> Result<()> {
    let target = match log_file {
        Some(filename) => Some(
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(filename)
                .map_err(|e| {
                    ChunkError::Configuration(format!("cannot open log file '{}': {}", filename, e))
                })?,
        ),
        None => None,
    };

    INIT_LOGGER.call_once(move || {
        let mut builder = env_logger::Builder::new();
        builder.is_test(false);
        builder.filter_level(level);
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())?;
            buf.flush()?;
            Ok(())
        });
        if let Some(file) = target {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        let _ = builder.try_init();
    });
    Ok(())
}
