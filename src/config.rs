//! Station configuration
//!
//! One TOML document, every field defaulted so a partial (or empty) file is
//! valid. Loaded from the path given on the command line or from
//! `<config dir>/rovlink/config.toml`, where a default file is written on
//! first start.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, Level};

use crate::controller::shaping::DeadzoneShape;
use crate::telemetry::inertial::{DEFAULT_ACCEL_LSB_PER_G, DEFAULT_GYRO_LSB_PER_DPS};
use crate::worker::period_from_rate;

const CONFIG_DIR: &str = "rovlink";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No user config directory available")]
    NoConfigDir,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_rate(field: &'static str, rate_hz: f64) -> Result<Duration, ConfigError> {
    period_from_rate(rate_hz)
        .ok_or_else(|| invalid(field, format!("{} Hz is not a usable rate", rate_hz)))
}

fn check_host(field: &'static str, host: &str) -> Result<(), ConfigError> {
    if host.trim().is_empty() {
        Err(invalid(field, "host must not be empty"))
    } else {
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    /// `trace`, `debug`, `info`, `warn` or `error`
    pub log_level: String,
    /// Seconds between two status lines in the station log
    pub status_interval_secs: u64,
    /// Outgoing command stream
    pub command: CommandConfig,
    pub controller: ControllerConfig,
    /// Resource-stats listener
    pub resource: ReceiverConfig,
    /// Inertial-sensor listener and sensor scales
    pub inertial: InertialConfig,
    /// Optional sender of codec records
    pub forwarder: ForwarderConfig,
    /// Optional listener for codec records
    pub record: RecordConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            status_interval_secs: 5,
            command: CommandConfig::default(),
            controller: ControllerConfig::default(),
            resource: ReceiverConfig::default(),
            inertial: InertialConfig::default(),
            forwarder: ForwarderConfig::default(),
            record: RecordConfig::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CommandConfig {
    /// Vehicle address, IP or resolvable host name
    pub host: String,
    pub port: u16,
    /// Packets per second; sent whether or not the command changed
    pub rate_hz: f64,
    /// Record commands in memory instead of sending them
    pub dry_run: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            host: "192.168.2.50".to_string(),
            port: 9000,
            rate_hz: 20.0,
            dry_run: false,
        }
    }
}

/// Raw device indices of the inputs the processor reads.
///
/// Axis/button numbering is backend specific, see
/// [`crate::controller::backend`] for the gilrs table.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AxisMap {
    pub left_x: usize,
    pub left_y: usize,
    pub right_x: usize,
    pub right_y: usize,
    pub left_trigger: usize,
    pub right_trigger: usize,
}

impl Default for AxisMap {
    fn default() -> Self {
        Self {
            left_x: 0,
            left_y: 1,
            right_x: 2,
            right_y: 3,
            left_trigger: 4,
            right_trigger: 5,
        }
    }
}

impl AxisMap {
    /// The stick axes that get rest-offset calibration
    pub fn sticks(&self) -> [usize; 4] {
        [self.left_x, self.left_y, self.right_x, self.right_y]
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ButtonMap {
    /// Held: left stick drives pitch/roll instead of surge/sway
    pub shift: usize,
    pub light_up: usize,
    pub light_down: usize,
}

impl Default for ButtonMap {
    fn default() -> Self {
        Self {
            shift: 4,
            light_up: 11,
            light_down: 12,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    /// Run without a controller when `false`; commands then only change
    /// through the command API
    pub enabled: bool,
    pub poll_rate_hz: f64,
    /// Delay between attempts to find a device while none is connected
    pub reconnect_interval_ms: u64,
    /// Resting magnitude above which an axis is treated as off-center
    pub stuck_threshold: f32,
    pub deadzone_shape: DeadzoneShape,
    /// Stick deflection ignored around center, in [0, 1)
    pub deadzone: f32,
    /// Smallest output produced right outside the deadzone, in [0, 1]
    pub anti_deadzone: f32,
    /// Blend towards a cubic response; 0 is linear
    pub expo: f32,
    /// Largest change of an output field per tick, in command units (0 = off)
    pub max_step: i32,
    pub light_step: f32,
    pub axes: AxisMap,
    pub buttons: ButtonMap,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_rate_hz: 60.0,
            reconnect_interval_ms: 1000,
            stuck_threshold: 0.5,
            deadzone_shape: DeadzoneShape::Axis,
            deadzone: 0.1,
            anti_deadzone: 0.06,
            expo: 0.25,
            max_step: 16,
            light_step: 0.1,
            axes: AxisMap::default(),
            buttons: ButtonMap::default(),
        }
    }
}

impl ControllerConfig {
    /// Time between two controller polls.
    ///
    /// Fails for a `poll_rate_hz` that is not positive and finite, or whose
    /// period does not fit a [`Duration`].
    pub fn poll_period(&self) -> Result<Duration, ConfigError> {
        check_rate("controller.poll_rate_hz", self.poll_rate_hz)
    }

    /// `reconnect_interval_ms` as a [`Duration`]
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Checks the controller section on its own; also run by
    /// [`LinkConfig::validate`] and before a controller thread is spawned
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_rate("controller.poll_rate_hz", self.poll_rate_hz)?;
        if !(0.0..1.0).contains(&self.deadzone) {
            return Err(invalid("controller.deadzone", "must be in [0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.anti_deadzone) {
            return Err(invalid("controller.anti_deadzone", "must be in [0, 1]"));
        }
        if !(self.expo.is_finite() && self.expo >= 0.0) {
            return Err(invalid("controller.expo", "must be >= 0"));
        }
        if !(self.stuck_threshold > 0.0 && self.stuck_threshold <= 1.0) {
            return Err(invalid("controller.stuck_threshold", "must be in (0, 1]"));
        }
        if self.max_step < 0 {
            return Err(invalid("controller.max_step", "must be >= 0"));
        }
        if !(self.light_step > 0.0 && self.light_step <= 1.0) {
            return Err(invalid("controller.light_step", "must be in (0, 1]"));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(invalid("controller.reconnect_interval_ms", "must be > 0"));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Local address to bind, `0.0.0.0` for every interface
    pub host: String,
    /// Local port; 0 picks a free one
    pub port: u16,
    /// Longest wait for one datagram before the receive task checks for stop
    pub recv_timeout_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 12346,
            recv_timeout_ms: 1000,
        }
    }
}

impl ReceiverConfig {
    /// `recv_timeout_ms` as a [`Duration`]
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    fn validate(&self, section: &'static str) -> Result<(), ConfigError> {
        check_host(section, &self.host)?;
        if self.recv_timeout_ms == 0 {
            return Err(invalid(section, "recv_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InertialConfig {
    pub host: String,
    pub port: u16,
    pub recv_timeout_ms: u64,
    /// Accelerometer counts per g for the configured range
    pub accel_lsb_per_g: f64,
    /// Gyroscope counts per degree per second for the configured range
    pub gyro_lsb_per_dps: f64,
}

impl Default for InertialConfig {
    fn default() -> Self {
        let receiver = ReceiverConfig::default();
        Self {
            host: receiver.host,
            port: 5002,
            recv_timeout_ms: receiver.recv_timeout_ms,
            accel_lsb_per_g: DEFAULT_ACCEL_LSB_PER_G,
            gyro_lsb_per_dps: DEFAULT_GYRO_LSB_PER_DPS,
        }
    }
}

impl InertialConfig {
    /// Socket settings in the shape shared by every receiver
    pub fn receiver(&self) -> ReceiverConfig {
        ReceiverConfig {
            host: self.host.clone(),
            port: self.port,
            recv_timeout_ms: self.recv_timeout_ms,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ForwarderConfig {
    pub enabled: bool,
    /// Consumer of the codec records
    pub host: String,
    pub port: u16,
    /// Records per second, each a snapshot of the store at send time
    pub rate_hz: f64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "192.168.2.60".to_string(),
            port: 9100,
            rate_hz: 10.0,
        }
    }
}

/// Listener for codec records relayed by another station
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct RecordConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub recv_timeout_ms: u64,
}

impl Default for RecordConfig {
    fn default() -> Self {
        let receiver = ReceiverConfig::default();
        Self {
            enabled: false,
            host: receiver.host,
            port: 5003,
            recv_timeout_ms: receiver.recv_timeout_ms,
        }
    }
}

impl RecordConfig {
    /// Socket settings in the shape shared by every receiver
    pub fn receiver(&self) -> ReceiverConfig {
        ReceiverConfig {
            host: self.host.clone(),
            port: self.port,
            recv_timeout_ms: self.recv_timeout_ms,
        }
    }
}

impl LinkConfig {
    /// Parsed `log_level`, case-insensitive.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for anything but a tracing level name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rovlink::config::LinkConfig;
    /// use tracing::Level;
    ///
    /// let config = LinkConfig {
    ///     log_level: "DEBUG".to_string(),
    ///     ..LinkConfig::default()
    /// };
    /// assert_eq!(config.log_level().unwrap(), Level::DEBUG);
    ///
    /// let config = LinkConfig {
    ///     log_level: "verbose".to_string(),
    ///     ..LinkConfig::default()
    /// };
    /// assert!(config.log_level().is_err());
    /// ```
    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.log_level
            .parse::<Level>()
            .map_err(|e| invalid("log_level", e.to_string()))
    }

    /// Period of the station's status log line
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }

    /// Checks every section; nothing is started with a config that fails here
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log_level()?;
        if self.status_interval_secs == 0 {
            return Err(invalid("status_interval_secs", "must be > 0"));
        }

        check_host("command.host", &self.command.host)?;
        if self.command.port == 0 {
            return Err(invalid("command.port", "destination port must not be 0"));
        }
        check_rate("command.rate_hz", self.command.rate_hz)?;

        self.controller.validate()?;
        self.resource.validate("resource")?;
        self.inertial.receiver().validate("inertial")?;
        for (field, scale) in [
            ("inertial.accel_lsb_per_g", self.inertial.accel_lsb_per_g),
            ("inertial.gyro_lsb_per_dps", self.inertial.gyro_lsb_per_dps),
        ] {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(invalid(field, "scale must be > 0"));
            }
        }

        if self.forwarder.enabled {
            check_host("forwarder.host", &self.forwarder.host)?;
            if self.forwarder.port == 0 {
                return Err(invalid("forwarder.port", "destination port must not be 0"));
            }
            check_rate("forwarder.rate_hz", self.forwarder.rate_hz)?;
        }
        if self.record.enabled {
            self.record.receiver().validate("record")?;
        }
        Ok(())
    }

    /// Parses a TOML document. Missing keys and sections take their
    /// defaults; unknown keys are ignored.
    ///
    /// The result is not validated, call [`LinkConfig::validate`] (or use
    /// [`LinkConfig::load`], which does both).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rovlink::config::LinkConfig;
    ///
    /// let config = LinkConfig::from_toml(
    ///     r#"
    ///     [command]
    ///     host = "10.0.0.2"
    ///     rate_hz = 50.0
    ///     "#,
    /// )
    /// .unwrap();
    /// assert_eq!(config.command.host, "10.0.0.2");
    /// assert_eq!(config.command.port, 9000);
    /// config.validate().unwrap();
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serializes every field, defaults included, so the output doubles as
    /// a documented template
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// `<user config dir>/rovlink/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    /// Reads and validates `path`
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Writes the default configuration to `path` unless a file already exists
    pub async fn ensure_default(path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if tokio::fs::try_exists(path).await.map_err(write_err)? {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        tokio::fs::write(path, Self::default().to_toml()?)
            .await
            .map_err(write_err)?;
        info!("Wrote default config to {}", path.display());
        Ok(())
    }

    /// Loads `explicit` if given, otherwise the default location (created on
    /// first use). Returns the config and the path it came from.
    pub async fn load_or_default(explicit: Option<PathBuf>) -> Result<(Self, PathBuf), ConfigError> {
        let path = match explicit {
            Some(path) => path,
            None => {
                let path = Self::default_path()?;
                Self::ensure_default(&path).await?;
                path
            }
        };
        let config = Self::load(&path).await?;
        Ok((config, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        LinkConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config = LinkConfig::from_toml(
            r#"
            log_level = "debug"

            [command]
            host = "10.0.0.2"

            [controller]
            deadzone_shape = "radial"
            max_step = 50

            [controller.buttons]
            shift = 9

            [inertial]
            port = 6000
            accel_lsb_per_g = 8192.0
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level().unwrap(), Level::DEBUG);
        assert_eq!(config.command.host, "10.0.0.2");
        assert_eq!(config.command.port, 9000);
        assert_eq!(config.controller.deadzone_shape, DeadzoneShape::Radial);
        assert_eq!(config.controller.max_step, 50);
        assert_eq!(config.controller.buttons.shift, 9);
        assert_eq!(config.controller.buttons.light_up, 11);
        assert_eq!(config.inertial.port, 6000);
        assert_eq!(config.inertial.host, "0.0.0.0");
        assert_eq!(config.inertial.accel_lsb_per_g, 8192.0);
        assert_eq!(config.resource.port, 12346);
        assert!(!config.record.enabled);
        assert_eq!(config.record.port, 5003);
        config.validate().unwrap();
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = LinkConfig::default();
        let parsed = LinkConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases: Vec<fn(&mut LinkConfig)> = vec![
            |c| c.command.rate_hz = 0.0,
            |c| c.command.rate_hz = f64::NAN,
            |c| c.command.rate_hz = 1e-20,
            |c| c.command.port = 0,
            |c| c.command.host = " ".to_string(),
            |c| c.controller.deadzone = 1.0,
            |c| c.controller.deadzone = -0.1,
            |c| c.controller.expo = -1.0,
            |c| c.controller.poll_rate_hz = -60.0,
            |c| c.controller.poll_rate_hz = 0.0,
            |c| c.controller.poll_rate_hz = 1e-20,
            |c| c.resource.recv_timeout_ms = 0,
            |c| c.inertial.gyro_lsb_per_dps = 0.0,
            |c| c.log_level = "loud".to_string(),
            |c| {
                c.forwarder.enabled = true;
                c.forwarder.port = 0;
            },
            |c| {
                c.record.enabled = true;
                c.record.recv_timeout_ms = 0;
            },
        ];
        for (i, mutate) in cases.into_iter().enumerate() {
            let mut config = LinkConfig::default();
            mutate(&mut config);
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { .. })),
                "case {} accepted",
                i
            );
        }
    }

    #[test]
    fn test_poll_period() {
        let mut controller = ControllerConfig::default();
        assert_eq!(controller.poll_period().unwrap(), Duration::from_secs_f64(1.0 / 60.0));
        for rate in [0.0, -1.0, 1e-20, f64::INFINITY] {
            controller.poll_rate_hz = rate;
            assert!(controller.poll_period().is_err(), "rate {}", rate);
        }
    }

    #[test]
    fn test_disabled_forwarder_is_not_validated() {
        let mut config = LinkConfig::default();
        config.forwarder.port = 0;
        config.validate().unwrap();
    }

    #[tokio::test]
    async fn test_ensure_default_then_load() {
        let dir = std::env::temp_dir().join(format!("rovlink-config-{}", std::process::id()));
        let path = dir.join("nested").join(CONFIG_FILE);

        LinkConfig::ensure_default(&path).await.unwrap();
        let loaded = LinkConfig::load(&path).await.unwrap();
        assert_eq!(loaded, LinkConfig::default());

        // an existing file is left alone
        tokio::fs::write(&path, "status_interval_secs = 30\n")
            .await
            .unwrap();
        LinkConfig::ensure_default(&path).await.unwrap();
        let (loaded, from) = LinkConfig::load_or_default(Some(path.clone()))
            .await
            .unwrap();
        assert_eq!(loaded.status_interval_secs, 30);
        assert_eq!(from, path);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_reports_parse_errors() {
        let path = std::env::temp_dir().join(format!("rovlink-bad-{}.toml", std::process::id()));
        tokio::fs::write(&path, "[command]\nport = \"nine\"\n")
            .await
            .unwrap();
        assert!(matches!(
            LinkConfig::load(&path).await,
            Err(ConfigError::Parse(_))
        ));
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
