//! Hue Bridge Client
//!
//! ## Responsibilities
//!
//! - Write the light's on/off state through the bridge REST API
//! - Read the light resource back so callers only ever see device-confirmed
//!   state, never an assumed one
//! - Collapse transport failures into the two kinds the control loop
//!   handles (bridge unreachable vs request rejected)

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Color and intensity applied whenever the light turns on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightAppearance {
    /// Hue angle (0 to 65535 wraps the color wheel, 0 is red)
    pub hue: u16,
    /// Brightness (1 to 254)
    pub bri: u8,
    /// Saturation (0 to 254)
    pub sat: u8,
}

impl Default for LightAppearance {
    fn default() -> Self {
        Self {
            hue: 0,
            bri: 254,
            sat: 254,
        }
    }
}

/// Networked light behind a bridge
///
/// Both operations return the on/off state the device reports, so a caller
/// can record confirmed state without a second round trip.
#[async_trait]
pub trait LightBridge: Send + Sync {
    /// Write the on/off state and return what the device reports afterwards
    async fn set_state(&self, on: bool) -> Result<bool>;

    /// Read the current on/off state
    async fn get_state(&self) -> Result<bool>;
}

/// State write body for the bridge API
#[derive(Debug, Clone, Serialize)]
struct SetStateBody {
    on: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    hue: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    bri: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    sat: Option<u8>,
}

/// Light resource as returned by the bridge (unknown fields ignored)
#[derive(Debug, Clone, Deserialize)]
struct LightResource {
    state: LightStateDto,
}

/// Reported light state
#[derive(Debug, Clone, Deserialize)]
struct LightStateDto {
    on: bool,
}

/// Hue-compatible bridge client
pub struct HueClient {
    client: reqwest::Client,
    bridge_ip: String,
    username: String,
    light_number: String,
    appearance: LightAppearance,
}

impl HueClient {
    /// Create a client with the default 10 second call timeout
    pub fn new(
        bridge_ip: &str,
        username: &str,
        light_number: &str,
        appearance: LightAppearance,
    ) -> Self {
        Self::with_timeout(
            bridge_ip,
            username,
            light_number,
            appearance,
            Duration::from_secs(10),
        )
    }

    /// Create a client with a custom call timeout
    ///
    /// The timeout bounds every bridge call so a dead bridge can never stall
    /// the control loop past its own cadence handling.
    pub fn with_timeout(
        bridge_ip: &str,
        username: &str,
        light_number: &str,
        appearance: LightAppearance,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            bridge_ip: bridge_ip.to_string(),
            username: username.to_string(),
            light_number: light_number.to_string(),
            appearance,
        }
    }

    /// URL of the light resource
    fn light_url(&self) -> String {
        format!(
            "http://{}/api/{}/lights/{}",
            self.bridge_ip,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.light_number)
        )
    }

    /// URL of the light's state endpoint
    fn state_url(&self) -> String {
        format!("{}/state", self.light_url())
    }

    /// Body for a state write; appearance only accompanies an on write
    fn state_body(&self, on: bool) -> SetStateBody {
        if on {
            SetStateBody {
                on: true,
                hue: Some(self.appearance.hue),
                bri: Some(self.appearance.bri),
                sat: Some(self.appearance.sat),
            }
        } else {
            SetStateBody {
                on: false,
                hue: None,
                bri: None,
                sat: None,
            }
        }
    }

    /// Fetch the light resource and extract the reported on/off state
    async fn read_state(&self) -> Result<bool> {
        let url = self.light_url();
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Rejected(format!(
                "light read failed with status {}: {}",
                status, body
            )));
        }

        let light: LightResource = resp
            .json()
            .await
            .map_err(|e| Error::Rejected(format!("cannot parse light resource: {}", e)))?;
        Ok(light.state.on)
    }
}

#[async_trait]
impl LightBridge for HueClient {
    async fn set_state(&self, on: bool) -> Result<bool> {
        let url = self.state_url();
        let body = self.state_body(on);

        tracing::debug!(url = %url, on = on, "Sending light state write");

        let resp = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                body = %text,
                "Bridge rejected light state write"
            );
            return Err(Error::Rejected(format!(
                "state write failed with status {}: {}",
                status, text
            )));
        }

        // Report what the device says, not what was asked for
        self.read_state().await
    }

    async fn get_state(&self) -> Result<bool> {
        self.read_state().await
    }
}

/// Collapse reqwest failures into the kinds the control loop handles
fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::Unreachable(e.to_string())
    } else {
        Error::Rejected(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> HueClient {
        HueClient::new(
            "192.168.1.42",
            "0123456789abcdef0123456789abcdef",
            "3",
            LightAppearance::default(),
        )
    }

    #[test]
    fn test_light_url() {
        let client = test_client();
        assert_eq!(
            client.light_url(),
            "http://192.168.1.42/api/0123456789abcdef0123456789abcdef/lights/3"
        );
    }

    #[test]
    fn test_state_url() {
        let client = test_client();
        assert_eq!(
            client.state_url(),
            "http://192.168.1.42/api/0123456789abcdef0123456789abcdef/lights/3/state"
        );
    }

    #[test]
    fn test_on_body_carries_appearance() {
        let client = HueClient::new(
            "192.168.1.42",
            "user",
            "3",
            LightAppearance {
                hue: 46920,
                bri: 120,
                sat: 200,
            },
        );
        let body = serde_json::to_value(client.state_body(true)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"on": true, "hue": 46920, "bri": 120, "sat": 200})
        );
    }

    #[test]
    fn test_off_body_is_bare() {
        let client = test_client();
        let body = serde_json::to_value(client.state_body(false)).unwrap();
        assert_eq!(body, serde_json::json!({"on": false}));
    }

    #[test]
    fn test_light_resource_parsing_ignores_extra_fields() {
        let payload = r#"{
            "state": {
                "on": true,
                "bri": 254,
                "hue": 0,
                "sat": 254,
                "colormode": "hs",
                "reachable": true
            },
            "type": "Extended color light",
            "name": "On air",
            "modelid": "LCT007",
            "uniqueid": "00:17:88:01:00:aa:bb:cc-0b"
        }"#;
        let light: LightResource = serde_json::from_str(payload).unwrap();
        assert!(light.state.on);
    }
}
