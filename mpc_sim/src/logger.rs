//! Logger setup for the simulation.

use std::path::Path;
use std::time::Instant;

use log::{info, Level, LevelFilter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Error initialising the log file: {0}")]
    LogFile(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    Fern(log::SetLoggerError),
}

/// Initialise logging to stdout and, if given, to a log file.
///
/// Must only be called once.
pub fn logger_init(min_level: LevelFilter, log_file: Option<&Path>) -> Result<(), LoggerInitError> {
    let start = Instant::now();

    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            // If debug or trace include the target, otherwise don't include it
            if record.level() > Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    start.elapsed().as_secs_f64(),
                    level_to_str(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    start.elapsed().as_secs_f64(),
                    level_to_str(record.level()),
                    message
                ))
            }
        })
        .level(min_level)
        .chain(std::io::stdout());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path).map_err(LoggerInitError::LogFile)?);
    }

    dispatch.apply().map_err(LoggerInitError::Fern)?;

    info!("Logging initialised");
    info!("    Log level: {min_level:?}");
    if let Some(path) = log_file {
        info!("    Log file path: {path:?}");
    }

    Ok(())
}

fn level_to_str(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info => "INF",
        Level::Warn => "WRN",
        Level::Error => "ERR",
    }
}
