//! Handlers for the built-in routes.

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::params::{ParameterRegistry, Shared};
use crate::platform::Radio;
use crate::store::{ConfigBlob, Storage, StoreError};
use crate::web::{
    self, AssetSource, Reply, Request, MIME_JSON, MIME_PLAIN,
};

/// One `/scan` entry.
#[derive(Debug, Serialize)]
struct ScanEntry {
    ssid: String,
    strength: i32,
    security: bool,
}

/// Write the structure to its region and commit, logging the outcome.
pub(crate) fn persist_config<C: ConfigBlob>(
    storage: &mut Storage,
    config: &Shared<C>,
) -> Result<(), StoreError> {
    let result = storage.write_config(&*config.borrow());
    match &result {
        Ok(()) => log::info!("Configuration committed"),
        Err(e) => log::error!("Configuration commit failed: {}", e),
    }
    result
}

pub(crate) fn persist_calibration(
    storage: &mut Storage,
    pitch: &str,
    velocity: &str,
    reset_magic: bool,
) -> Result<(), StoreError> {
    log::info!(
        "Storing MIDI values for pitch: {:?} velocity: {:?}",
        pitch,
        velocity
    );
    let result = storage.store_calibration(pitch, velocity, reset_magic);
    match &result {
        Ok(()) => log::info!("Calibration committed: true"),
        Err(e) => log::error!("Calibration committed: false ({})", e),
    }
    result
}

/// Stream a static file, or `None` when it cannot be opened.
pub(crate) fn stream_file(
    assets: &dyn AssetSource,
    file: &str,
    mime: &'static str,
) -> Option<Reply> {
    match assets.open(file) {
        Ok(bytes) => Some(Reply::new(StatusCode::OK, mime, bytes)),
        Err(e) => {
            log::warn!("file open failed: {} ({})", file, e);
            None
        }
    }
}

fn json_text(obj: &serde_json::Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// POST `/`: save pitch/velocity from a JSON body or form fields.
pub(crate) fn handle_calibration_post(req: &Request, storage: &mut Storage) -> Reply {
    let (pitch, velocity) = if web::is_json(req) {
        let obj = web::decode_json(req.body());
        (json_text(&obj, "pitch"), json_text(&obj, "velocity"))
    } else {
        (
            web::arg(req, "pitch").unwrap_or_default(),
            web::arg(req, "velocity").unwrap_or_default(),
        )
    };

    if pitch.is_empty() {
        return Reply::new(StatusCode::BAD_REQUEST, MIME_PLAIN, "Invalid pitch.");
    }

    // a failed commit is logged; the client still gets its answer
    let _ = persist_calibration(storage, &pitch, &velocity, false);

    Reply::new(
        StatusCode::NO_CONTENT,
        MIME_PLAIN,
        "Saved. Will attempt to reboot.",
    )
}

/// GET `/scan`
pub(crate) fn handle_scan_get(radio: &mut dyn Radio, verbose: bool) -> Reply {
    crate::verbose!(verbose, "Scanning WiFi networks...");
    let networks = match radio.scan_networks() {
        Ok(n) => n,
        Err(e) => {
            log::warn!("WiFi scan failed: {:?}", e);
            Vec::new()
        }
    };
    crate::verbose!(verbose, "scan complete, {} networks found", networks.len());

    let entries: Vec<ScanEntry> = networks
        .into_iter()
        .map(|n| {
            crate::verbose!(
                verbose,
                "Name: {} - Strength: {} - Security: {}",
                n.ssid,
                n.rssi,
                if n.open { "none" } else { "enabled" }
            );
            ScanEntry {
                ssid: n.ssid,
                strength: n.rssi as i32,
                security: !n.open,
            }
        })
        .collect();

    match serde_json::to_vec(&entries) {
        Ok(body) => Reply::new(StatusCode::OK, MIME_JSON, body),
        Err(e) => {
            log::error!("Failed to encode scan result: {}", e);
            Reply::new(StatusCode::OK, MIME_JSON, "[]")
        }
    }
}

/// GET `/settings`: every field that is not write-only.
pub(crate) fn handle_settings_get(registry: &ParameterRegistry) -> Reply {
    let body = Value::Object(registry.export_json()).to_string();
    Reply::new(StatusCode::OK, MIME_JSON, body)
}

/// PUT `/settings`: apply writable fields, persist, then answer 204.
pub(crate) fn handle_settings_put<C: ConfigBlob>(
    req: &Request,
    registry: &ParameterRegistry,
    storage: &mut Storage,
    config: &Shared<C>,
) -> Reply {
    let obj = match web::parse_json_object(req.body()) {
        Ok(obj) => obj,
        Err(e) => {
            log::warn!("Rejecting settings body: {}", e);
            return Reply::new(StatusCode::BAD_REQUEST, MIME_JSON, "");
        }
    };

    let applied = registry.import_json(&obj);
    log::info!("Applied {} settings", applied);

    // the commit has finished (or failed and been logged) before the 204 leaves
    let _ = persist_config(storage, config);

    Reply::new(StatusCode::NO_CONTENT, MIME_JSON, "")
}
