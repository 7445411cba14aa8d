use log::{debug, error, info, log_enabled, warn, Level, LevelFilter};

/// Initializes the logger with the `env_logger` crate.
///
/// The level comes from `RUST_LOG`; without it only warnings and errors are
/// shown.
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
}

/// Initializes the logger at a fixed level, ignoring `RUST_LOG`.
///
/// Wire traffic (`-> cmd` / `<- reply`) is logged at debug level.
///
/// # Examples
/// ```rust,no_run
/// use lora_reliable::logging::init_logger_with_level;
/// use log::LevelFilter;
///
/// init_logger_with_level(LevelFilter::Debug);
/// log::debug!("-> mac pause");
/// ```
pub fn init_logger_with_level(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

/// Map a `-v` count to a level: 0 warn, 1 info, 2 debug, 3+ trace.
pub fn verbosity_to_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}
