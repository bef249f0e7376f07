//! Daemon configuration
//!
//! All settings come from the environment (optionally loaded from .env).
//! Bridge address, credential and light id have no usable defaults and are
//! required; everything else falls back to the defaults below. A variable
//! that is present but malformed is a startup error, never a silent default.

use crate::error::{Error, Result};
use crate::hue_client::LightAppearance;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bridge host (IP or host:port), e.g. "192.168.1.42"
    pub bridge_ip: String,
    /// Bridge API credential
    pub username: String,
    /// Light identifier used in bridge resource paths
    pub light_number: String,
    /// Color and intensity applied when the light turns on
    pub appearance: LightAppearance,
    /// Fast reconcile cadence
    pub tick_interval: Duration,
    /// Resync cadence while on-air
    pub resync_active: Duration,
    /// Resync cadence while idle
    pub resync_idle: Duration,
    /// Consecutive idle ticks the counter must exceed before off is sent
    pub off_debounce_ticks: u32,
    /// Capability subtree to probe in the consent ledger
    pub capability: String,
    /// Directory for the rolling daemon log
    pub log_dir: PathBuf,
}

impl AppConfig {
    /// Build the configuration from the process environment
    pub fn from_env() -> Result<AppConfig> {
        let brightness: u8 = parsed("ONAIR_BRIGHTNESS", 254)?;
        if !(1..=254).contains(&brightness) {
            return Err(Error::Config(format!(
                "ONAIR_BRIGHTNESS must be between 1 and 254, got {}",
                brightness
            )));
        }
        let saturation: u8 = parsed("ONAIR_SATURATION", 254)?;
        if saturation > 254 {
            return Err(Error::Config(format!(
                "ONAIR_SATURATION must be between 0 and 254, got {}",
                saturation
            )));
        }

        Ok(AppConfig {
            bridge_ip: required("HUE_BRIDGE_IP")?,
            username: required("HUE_USERNAME")?,
            light_number: required("HUE_LIGHT_NUMBER")?,
            appearance: LightAppearance {
                hue: parsed("ONAIR_HUE", 0)?,
                bri: brightness,
                sat: saturation,
            },
            tick_interval: duration_secs("TICK_INTERVAL_SECS", 1)?,
            resync_active: duration_secs("RESYNC_ACTIVE_SECS", 30)?,
            resync_idle: duration_secs("RESYNC_IDLE_SECS", 600)?,
            off_debounce_ticks: parsed("OFF_DEBOUNCE_TICKS", 3)?,
            capability: std::env::var("CONSENT_CAPABILITY")
                .unwrap_or_else(|_| "webcam".to_string()),
            log_dir: std::env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),
        })
    }
}

/// Read a required variable, rejecting empty values
fn required(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!("{} is not set", name))),
    }
}

/// Read an optional variable, parsing it if present
fn parsed<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| {
            Error::Config(format!("{} is not a valid value: {}", name, value))
        }),
        Err(_) => Ok(default),
    }
}

/// Read an optional whole-seconds interval, rejecting zero
fn duration_secs(name: &str, default: u64) -> Result<Duration> {
    let secs: u64 = parsed(name, default)?;
    if secs == 0 {
        return Err(Error::Config(format!("{} must be at least 1 second", name)));
    }
    Ok(Duration::from_secs(secs))
}
