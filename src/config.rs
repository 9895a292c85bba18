use crate::kernel::{MailboxConfig, OverflowPolicy};
use crate::stage::{DirectoryConfig, LoggerConfig};

/// Stage-wide configuration with compiled-in defaults, amendable from a
/// TOML file.
#[derive(Clone)]
pub struct Config {
    pub debug: bool,
    pub log: LoggerConfig,
    pub mailbox: MailboxConfig,
    pub directory: DirectoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: true,
            log: LoggerConfig::default(),
            mailbox: MailboxConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

impl Config {
    // Option<()> allows ? while parsing toml values; the result is ignored.
    fn merge(&mut self, v: &toml::Value) -> Option<()> {
        let v = v.as_table()?;
        if let Some(debug) = v.get("debug").and_then(toml::Value::as_bool) {
            self.debug = debug;
        }
        if let Some(log) = v.get("log") {
            self.log.merge(log);
        }
        if let Some(mailbox) = v.get("mailbox") {
            self.mailbox.merge(mailbox);
        }
        if let Some(directory) = v.get("directory") {
            self.directory.merge(directory);
        }
        None
    }
}

impl LoggerConfig {
    fn merge(&mut self, v: &toml::Value) -> Option<()> {
        let v = v.as_table()?;
        if let Some(level) = v.get("level").and_then(toml::Value::as_str) {
            self.level = level.to_string();
        }
        if let Some(date_format) = v.get("date_format").and_then(toml::Value::as_str) {
            self.date_format = date_format.to_string();
        }
        if let Some(time_format) = v.get("time_format").and_then(toml::Value::as_str) {
            self.time_format = time_format.to_string();
        }
        None
    }
}

impl MailboxConfig {
    fn merge(&mut self, v: &toml::Value) -> Option<()> {
        let v = v.as_table()?;
        if let Some(capacity) = v.get("capacity").and_then(toml::Value::as_integer) {
            self.capacity = capacity.max(0) as usize;
        }
        if let Some(policy) = v.get("overflow_policy").and_then(toml::Value::as_str) {
            self.overflow_policy = match policy {
                "drop_oldest" => OverflowPolicy::DropOldest,
                "drop_newest" => OverflowPolicy::DropNewest,
                _ => OverflowPolicy::Reject,
            };
        }
        None
    }
}

impl DirectoryConfig {
    fn merge(&mut self, v: &toml::Value) -> Option<()> {
        let v = v.as_table()?;
        if let Some(buckets) = v.get("buckets").and_then(toml::Value::as_integer) {
            self.buckets = (buckets.max(1)) as usize;
        }
        if let Some(capacity) = v.get("bucket_capacity").and_then(toml::Value::as_integer) {
            self.bucket_capacity = capacity.max(0) as usize;
        }
        None
    }
}

/// Loads the stage configuration.
///
/// Starts from defaults and merges the TOML file named by the `STAGE_CONF`
/// environment variable, falling back to `config/stage.toml`. A missing or
/// unparsable file leaves the defaults untouched.
pub fn load_config() -> Config {
    use std::{
        env,
        fs::File,
        io::{self, Read},
    };

    let mut cfg = Config::default();

    let path = env::var("STAGE_CONF").unwrap_or_else(|_| "config/stage.toml".into());
    let amendment = File::open(path)
        .and_then(|mut f| {
            let mut s = String::new();
            f.read_to_string(&mut s)?;
            Ok(s)
        })
        .and_then(|s| {
            toml::from_str::<toml::Value>(&s).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        });
    if let Ok(amendment) = amendment {
        cfg.merge(&amendment);
    }

    cfg
}
