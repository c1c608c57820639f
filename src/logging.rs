//! Log level control.
//!
//! The crate itself only emits `tracing` events. These helpers are a convenience for
//! applications that have no subscriber of their own: the first call installs a global fmt
//! subscriber behind a reloadable level filter, later calls adjust that filter in place.

use std::sync::{Mutex, PoisonError};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, Registry};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoggingError {
    /// Another global subscriber was installed first.
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(String),
    #[error("failed to update log level: {0}")]
    Reload(String),
}

static HANDLE: Mutex<Option<reload::Handle<LevelFilter, Registry>>> = Mutex::new(None);

/// Set the maximum level of events that are printed.
pub fn set_log_level(level: LevelFilter) -> Result<(), LoggingError> {
    let mut handle = HANDLE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = handle.as_ref() {
        return handle.modify(|filter| *filter = level).map_err(|e| LoggingError::Reload(e.to_string()));
    }

    let (filter, reload_handle) = reload::Layer::new(level);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| LoggingError::AlreadyInstalled(e.to_string()))?;
    *handle = Some(reload_handle);
    tracing::debug!(%level, "Log level set");
    Ok(())
}

/// Shorthand for `set_log_level(LevelFilter::DEBUG)`.
pub fn enable_verbose_logging() -> Result<(), LoggingError> {
    set_log_level(LevelFilter::DEBUG)
}

/// Level currently applied by the installed subscriber, if this module installed one.
pub fn current_level() -> Option<LevelFilter> {
    let handle = HANDLE.lock().unwrap_or_else(PoisonError::into_inner);
    handle.as_ref().and_then(|h| h.clone_current())
}
