//! Caller-supplied inputs for the portal and the settings API.

use std::path::Path;

use serde::{Deserialize, Serialize};

static DEFAULT_AP_NAME: Option<&str> = std::option_env!("DEFAULT_AP_NAME");
static DEFAULT_AP_PASSWORD: Option<&str> = std::option_env!("DEFAULT_AP_PASSWORD");

/// Mode the device boots into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    #[default]
    AccessPoint,
    ApiServer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    pub ap_name: String,
    /// Empty means an open access point
    pub ap_password: String,
    /// Portal page, resolved against `asset_root`
    pub ap_filename: String,
    /// 0 disables the access point watchdog
    pub ap_timeout_secs: u64,
    pub wifi_connect_retries: u32,
    pub wifi_connect_interval_ms: u64,
    pub web_port: u16,
    pub dns_port: u16,
    pub asset_root: String,
    pub calibration_width: usize,
    pub debug: bool,
    pub start_mode: StartMode,
    pub station_ssid: Option<String>,
    pub station_password: Option<String>,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            ap_name: DEFAULT_AP_NAME.unwrap_or("EdgeSensor").to_string(),
            ap_password: DEFAULT_AP_PASSWORD.unwrap_or_default().to_string(),
            ap_filename: "/index.html".to_string(),
            ap_timeout_secs: 0,
            wifi_connect_retries: 20,
            wifi_connect_interval_ms: 500,
            web_port: 80,
            dns_port: 53,
            asset_root: "/spiffs".to_string(),
            calibration_width: 8,
            debug: false,
            start_mode: StartMode::AccessPoint,
            station_ssid: None,
            station_password: None,
        }
    }
}

impl PortalSettings {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        let settings = Self::from_json(&raw)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Station credentials, when both are present and the SSID is not empty.
    pub fn station(&self) -> Option<(&str, &str)> {
        match (&self.station_ssid, &self.station_password) {
            (Some(ssid), pass) if !ssid.is_empty() => {
                Some((ssid.as_str(), pass.as_deref().unwrap_or_default()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let s = PortalSettings::from_json(
            r#"{"ap_name":"LightPad","ap_timeout_secs":120,"start_mode":"api_server"}"#,
        )
        .unwrap();
        assert_eq!(s.ap_name, "LightPad");
        assert_eq!(s.ap_timeout_secs, 120);
        assert_eq!(s.start_mode, StartMode::ApiServer);
        assert_eq!(s.web_port, 80);
        assert_eq!(s.ap_filename, "/index.html");
    }

    #[test]
    fn test_station_requires_ssid() {
        let mut s = PortalSettings::default();
        assert_eq!(s.station(), None);
        s.station_ssid = Some(String::new());
        assert_eq!(s.station(), None);
        s.station_ssid = Some("home".to_string());
        assert_eq!(s.station(), Some(("home", "")));
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(PortalSettings::from_json("{\"web_port\": \"eighty\"}").is_err());
    }
}
