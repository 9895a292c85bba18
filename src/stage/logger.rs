use std::fmt;

use slog::{o, Drain, Key, Level, Logger, Never, OwnedKVList, Record, Serializer, KV};

use crate::config::Config;

/// Log formatting and filtering.
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    pub level: String,
    pub date_format: String,
    pub time_format: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "debug".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            time_format: "%H:%M:%S%.3f".to_string(),
        }
    }
}

impl LoggerConfig {
    pub(crate) fn slog_level(&self) -> Level {
        match self.level.to_ascii_lowercase().as_str() {
            "critical" => Level::Critical,
            "error" => Level::Error,
            "warning" | "warn" => Level::Warning,
            "info" => Level::Info,
            "trace" => Level::Trace,
            _ => Level::Debug,
        }
    }
}

/// The default logger: a stdout drain honouring the configured level.
/// Callers embedding the stage into a larger application typically inject
/// their own `slog::Logger` through the builder instead.
pub fn default_log(cfg: &Config) -> Logger {
    let drain = StdoutDrain {
        level: cfg.log.slog_level(),
        date_format: cfg.log.date_format.clone(),
        time_format: cfg.log.time_format.clone(),
    };
    Logger::root(drain.fuse(), o!())
}

struct StdoutDrain {
    level: Level,
    date_format: String,
    time_format: String,
}

impl Drain for StdoutDrain {
    type Ok = ();
    type Err = Never;

    fn log(&self, record: &Record, values: &OwnedKVList) -> Result<(), Never> {
        if !record.level().is_at_least(self.level) {
            return Ok(());
        }

        let now = chrono::Utc::now();
        let mut line = format!(
            "{} {} {} [{}] {}",
            now.format(&self.date_format),
            now.format(&self.time_format),
            record.level().as_short_str(),
            record.module(),
            record.msg()
        );

        let mut serializer = PlainSerializer(&mut line);
        let _ = record.kv().serialize(record, &mut serializer);
        let _ = values.serialize(record, &mut serializer);

        println!("{}", line);
        Ok(())
    }
}

struct PlainSerializer<'a>(&'a mut String);

impl<'a> Serializer for PlainSerializer<'a> {
    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments) -> slog::Result {
        use std::fmt::Write;
        write!(self.0, ", {}={}", key, val).map_err(|_| slog::Error::Other)
    }
}
