//! Persistent typed settings for a small networked device, served through a
//! captive configuration portal or a headless REST endpoint.

/// Log at `info` when verbose output is enabled, at `debug` otherwise.
macro_rules! verbose {
    ($flag:expr, $($arg:tt)+) => {
        if $flag {
            log::info!($($arg)+)
        } else {
            log::debug!($($arg)+)
        }
    };
}
pub(crate) use verbose;

pub mod captive_portal;
pub mod dns;
pub mod mock;
pub mod params;
pub mod platform;
pub mod settings;
pub mod store;
pub mod web;

pub use captive_portal::{ConfigManager, Mode};
pub use params::{shared, Field, ParameterRegistry, Policy, Shared};
pub use platform::Platform;
pub use settings::{PortalSettings, StartMode};
pub use store::{BlobReader, BlobWriter, Calibration, ConfigBlob, Storage, StoreError};
