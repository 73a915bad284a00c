//! Service configuration.
//!
//! Every setting has a default and can be overridden through an environment
//! variable of the same (upper-case) name.
//!
//! | Key | Default |
//! |---|---|
//! | `SERIAL_PORT` | `/dev/ttyUSB0` |
//! | `BAUD_RATE` | `9600` |
//! | `SERIAL_TIMEOUT_MS` | `1000` |
//! | `LINK_MAX_RETRIES` | `3` |
//! | `DATABASE_PATH` | `data/rentals.db` |
//! | `MONITOR_INTERVAL_SECS` | `5` |
//! | `RENTAL_DURATION_MINUTES` | `120` |
//! | `CONTROLLER_REQUEST_CAP_MS` | `12000` |
//! | `CART_COUNT` | `5` |
//! | `LOG_LEVEL` | `info` |
//!
//! The request cap must cover an unlock queued behind another full
//! transaction; see [`ServiceConfig::min_request_cap`]. An explicit cap below
//! that bound is rejected, the default is raised to it.

use std::str::FromStr;
use std::time::Duration;

use cartwise_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_CART_COUNT, DEFAULT_MAX_RETRIES, DEFAULT_MONITOR_INTERVAL_SECS,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_RENTAL_DURATION_MINUTES, DEFAULT_REQUEST_CAP_MS,
    LOCKERS_PER_BOARD,
};
use cartwise_core::{Error, Result};
use cartwise_hardware::{ControllerConfig, LinkConfig, PortSettings};
use cartwise_storage::DatabaseConfig;
use cartwise_storage::connection::DEFAULT_DATABASE_PATH;

/// Serial port used when nothing is configured.
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub serial_port: String,
    pub baud_rate: u32,
    pub serial_timeout: Duration,
    pub link_max_retries: u32,
    pub database_path: String,
    pub monitor_interval: Duration,
    pub rental_duration: chrono::Duration,
    /// Hard cap for a single controller call, at least [`Self::min_request_cap`].
    pub request_cap: Duration,
    /// Carts `1..=cart_count` are seeded into lockers `0..cart_count`.
    pub cart_count: u8,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            serial_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            link_max_retries: DEFAULT_MAX_RETRIES,
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            monitor_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECS),
            rental_duration: chrono::Duration::minutes(DEFAULT_RENTAL_DURATION_MINUTES),
            request_cap: Duration::from_millis(DEFAULT_REQUEST_CAP_MS),
            cart_count: DEFAULT_CART_COUNT,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; unset keys keep their default.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first key whose value does not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use cartwise_service::ServiceConfig;
    ///
    /// let config = ServiceConfig::from_lookup(|key| match key {
    ///     "BAUD_RATE" => Some("19200".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.baud_rate, 19200);
    /// assert_eq!(config.cart_count, 5);
    /// ```
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(port) = lookup("SERIAL_PORT") {
            config.serial_port = normalize_serial_port(port.trim(), cfg!(target_os = "linux"));
        }
        if let Some(baud) = parse(&lookup, "BAUD_RATE")? {
            config.baud_rate = baud;
        }
        if let Some(ms) = parse::<u64>(&lookup, "SERIAL_TIMEOUT_MS")? {
            config.serial_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = parse::<u32>(&lookup, "LINK_MAX_RETRIES")? {
            if retries == 0 {
                return Err(invalid("LINK_MAX_RETRIES", "0", "must be at least 1"));
            }
            config.link_max_retries = retries;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            config.database_path = path.trim().to_string();
        }
        if let Some(secs) = parse::<u64>(&lookup, "MONITOR_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(invalid("MONITOR_INTERVAL_SECS", "0", "must be at least 1"));
            }
            config.monitor_interval = Duration::from_secs(secs);
        }
        if let Some(minutes) = parse::<i64>(&lookup, "RENTAL_DURATION_MINUTES")? {
            if minutes <= 0 {
                return Err(invalid(
                    "RENTAL_DURATION_MINUTES",
                    &minutes.to_string(),
                    "must be positive",
                ));
            }
            config.rental_duration = chrono::Duration::minutes(minutes);
        }
        let explicit_cap = parse::<u64>(&lookup, "CONTROLLER_REQUEST_CAP_MS")?;
        if let Some(ms) = explicit_cap {
            config.request_cap = Duration::from_millis(ms);
        }
        if let Some(count) = parse::<u8>(&lookup, "CART_COUNT")? {
            if count > LOCKERS_PER_BOARD {
                return Err(invalid(
                    "CART_COUNT",
                    &count.to_string(),
                    "a board has 16 lockers",
                ));
            }
            config.cart_count = count;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level.trim().to_lowercase();
        }

        if explicit_cap.is_some() {
            config.validate()?;
        } else {
            config.request_cap = config.request_cap.max(config.min_request_cap());
        }
        Ok(config)
    }

    /// Smallest request cap under which an unlock cannot time out while the
    /// board still acts on it.
    ///
    /// A caller may wait for one transaction already on the wire plus the
    /// busy-clear pulse after it, then for its own transaction.
    pub fn min_request_cap(&self) -> Duration {
        self.link_config().worst_case_latency(self.serial_timeout) * 2
            + self.controller_config().busy_clear_delay
    }

    /// # Errors
    ///
    /// Returns `Error::Config` when `request_cap` is below [`Self::min_request_cap`].
    pub fn validate(&self) -> Result<()> {
        let min = self.min_request_cap();
        if self.request_cap < min {
            return Err(invalid(
                "CONTROLLER_REQUEST_CAP_MS",
                &self.request_cap.as_millis().to_string(),
                &format!("must be at least {} for this link", min.as_millis()),
            ));
        }
        Ok(())
    }

    pub fn with_serial_port(mut self, port: impl Into<String>) -> Self {
        self.serial_port = port.into();
        self
    }

    pub fn with_database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_rental_duration(mut self, duration: chrono::Duration) -> Self {
        self.rental_duration = duration;
        self
    }

    pub fn with_request_cap(mut self, cap: Duration) -> Self {
        self.request_cap = cap;
        self
    }

    pub fn with_cart_count(mut self, count: u8) -> Self {
        self.cart_count = count;
        self
    }

    pub fn port_settings(&self) -> PortSettings {
        PortSettings::new(&self.serial_port, self.baud_rate).with_read_timeout(self.serial_timeout)
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig::default().with_max_retries(self.link_max_retries)
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::default()
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.database_path)
    }
}

/// Map a Windows-style `COMx` name to `/dev/ttyCOMx` when running on Linux.
pub fn normalize_serial_port(port: &str, linux: bool) -> String {
    let looks_like_com = port
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("COM"));
    if linux && looks_like_com && !port.starts_with('/') {
        format!("/dev/tty{port}")
    } else {
        port.to_string()
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> Error {
    Error::Config(format!("{key}={value:?}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.serial_port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.monitor_interval, Duration::from_secs(5));
        assert_eq!(config.rental_duration, chrono::Duration::minutes(120));
        assert_eq!(config.request_cap, Duration::from_secs(12));
        assert_eq!(config.min_request_cap(), Duration::from_millis(10_200));
        assert_eq!(config.database_path, "data/rentals.db");
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("SERIAL_PORT", "/dev/ttyS1"),
            ("BAUD_RATE", "19200"),
            ("SERIAL_TIMEOUT_MS", "500"),
            ("LINK_MAX_RETRIES", "5"),
            ("MONITOR_INTERVAL_SECS", "2"),
            ("RENTAL_DURATION_MINUTES", "45"),
            ("CART_COUNT", "12"),
            ("LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();

        assert_eq!(config.serial_port, "/dev/ttyS1");
        assert_eq!(config.port_settings().read_timeout, Duration::from_millis(500));
        assert_eq!(config.link_config().max_retries, 5);
        assert_eq!(config.monitor_interval, Duration::from_secs(2));
        assert_eq!(config.rental_duration, chrono::Duration::minutes(45));
        assert_eq!(config.cart_count, 12);
        assert_eq!(config.log_level, "debug");
    }

    #[rstest]
    #[case("BAUD_RATE", "fast")]
    #[case("MONITOR_INTERVAL_SECS", "0")]
    #[case("RENTAL_DURATION_MINUTES", "-5")]
    #[case("CART_COUNT", "17")]
    #[case("CART_COUNT", "300")]
    #[case("LINK_MAX_RETRIES", "0")]
    fn test_invalid_value_names_key(#[case] key: &str, #[case] value: &str) {
        let error = ServiceConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
        assert!(matches!(&error, Error::Config(message) if message.contains(key)));
    }

    #[test]
    fn test_request_cap_below_worst_unlock_is_rejected() {
        let error =
            ServiceConfig::from_lookup(lookup(&[("CONTROLLER_REQUEST_CAP_MS", "3000")])).unwrap_err();
        assert!(matches!(&error, Error::Config(message)
            if message.contains("CONTROLLER_REQUEST_CAP_MS") && message.contains("10200")));

        let config =
            ServiceConfig::from_lookup(lookup(&[("CONTROLLER_REQUEST_CAP_MS", "10200")])).unwrap();
        assert_eq!(config.request_cap, Duration::from_millis(10_200));
    }

    #[test]
    fn test_default_cap_grows_with_the_link() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("SERIAL_TIMEOUT_MS", "3000"),
            ("LINK_MAX_RETRIES", "4"),
        ]))
        .unwrap();

        assert!(config.request_cap > Duration::from_millis(DEFAULT_REQUEST_CAP_MS));
        assert_eq!(config.request_cap, config.min_request_cap());
        config.validate().unwrap();

        let short = config.with_request_cap(Duration::from_secs(5));
        assert!(matches!(short.validate(), Err(Error::Config(_))));
    }

    #[rstest]
    #[case("COM4", true, "/dev/ttyCOM4")]
    #[case("com1", true, "/dev/ttycom1")]
    #[case("COM4", false, "COM4")]
    #[case("/dev/ttyUSB0", true, "/dev/ttyUSB0")]
    #[case("/dev/COM3", true, "/dev/COM3")]
    fn test_serial_port_normalization(
        #[case] port: &str,
        #[case] linux: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(normalize_serial_port(port, linux), expected);
    }
}
