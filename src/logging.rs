//! Logging configuration for the watcher
//!
//! Uses log4rs with two appenders:
//! 1. ConsoleAppender - stderr output
//! 2. RollingFileAppender - log files with rotation

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Max size of a single log file before rotation
const LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated files kept
const LOG_FILE_COUNT: u32 = 5;

/// Default log directory (`<data_local_dir>/algorun-watch/logs`)
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("algorun-watch")
        .join("logs")
}

/// Parse a level name, falling back to `Info`
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    level
        .and_then(|l| LevelFilter::from_str(l).ok())
        .unwrap_or(LevelFilter::Info)
}

/// Initialize log4rs with console and rolling file appenders
///
/// Console output goes to stderr so stdout stays free for snapshots.
///
/// # Log File Configuration
/// - File: `{log_dir}/algorun-watch.1.log`
/// - Max size: 10 MB per file, 5 files
/// - Pattern: `{timestamp} [{level}] {target} - {message}`
pub fn init_logger(
    log_dir: &Path,
    level: LevelFilter,
) -> Result<log4rs::Handle, Box<dyn std::error::Error>> {
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build();

    std::fs::create_dir_all(log_dir)?;

    let log_file = log_dir.join("algorun-watch.1.log");
    let log_pattern = log_dir.join("algorun-watch.{}.log");
    let log_pattern = log_pattern
        .to_str()
        .ok_or("log directory is not valid UTF-8")?;

    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(log_pattern, LOG_FILE_COUNT)?;
    let trigger = SizeTrigger::new(LOG_FILE_SIZE);
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}",
        )))
        .build(log_file, Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(
            Root::builder()
                .appender("console")
                .appender("logfile")
                .build(level),
        )?;

    Ok(log4rs::init_config(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("WARN")), LevelFilter::Warn);
        assert_eq!(parse_level(Some("loud")), LevelFilter::Info);
        assert_eq!(parse_level(None), LevelFilter::Info);
    }

    #[test]
    fn test_default_log_dir() {
        assert!(default_log_dir().ends_with("algorun-watch/logs"));
    }
}
