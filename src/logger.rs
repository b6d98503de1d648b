// log4rs setup: console plus a timestamped file per server start

use chrono::Local;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} - {l} - {m}{n}";

/// `{log_dir}/{YYYY-MM-DD-HH_MM}.log`
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y-%m-%d-%H_%M").to_string();
    log_dir.join(format!("{timestamp}.log"))
}

fn console_appender() -> Appender {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    Appender::builder().build("console", Box::new(console))
}

fn build_config(log_dir: &Path, level: LevelFilter) -> Result<Config, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build(log_file_path(log_dir))?;

    let config = Config::builder()
        .appender(console_appender())
        .appender(Appender::builder().build("file", Box::new(file_appender)))
        .build(
            Root::builder()
                .appender("console")
                .appender("file")
                .build(level),
        )?;
    Ok(config)
}

/// Initialize the global logger. Falls back to console-only when the log
/// directory is unusable.
pub fn setup_logging(log_dir: &Path, level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let config = match build_config(log_dir, level) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Failed to set up file logging in {}: {e}; logging to console only",
                log_dir.display()
            );
            Config::builder()
                .appender(console_appender())
                .build(Root::builder().appender("console").build(level))?
        }
    };
    log4rs::init_config(config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_is_timestamped_under_dir() {
        let path = log_file_path(Path::new("logs"));
        assert_eq!(path.parent(), Some(Path::new("logs")));
        let name = path.file_name().unwrap().to_string_lossy();
        // e.g. 2024-05-01-13_07.log
        assert_eq!(name.len(), "YYYY-MM-DD-HH_MM.log".len());
        assert!(name.ends_with(".log"));
        assert_eq!(&name[10..11], "-");
        assert_eq!(&name[13..14], "_");
    }

    #[test]
    fn test_config_builds_for_writable_dir() {
        let dir = std::env::temp_dir().join(format!("hard-chat-logs-{}", uuid::Uuid::new_v4()));
        assert!(build_config(&dir, LevelFilter::Debug).is_ok());
        assert!(dir.is_dir());
        std::fs::remove_dir_all(dir).unwrap();
    }
}
