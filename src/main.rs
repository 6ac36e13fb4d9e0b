use std::time::Duration;

use edge_config::params::shared;
use edge_config::web::{Reply, Routes, MIME_PLAIN};
use edge_config::{
    BlobReader, BlobWriter, ConfigBlob, ConfigManager, Field, Platform, Policy, PortalSettings,
};
use http::{Method, StatusCode};

const FIRMWARE_VERSION: i8 = 3;
const TICK: Duration = Duration::from_millis(10);

/// What this device keeps across restarts.
#[derive(Debug, Default, Clone)]
struct DeviceConfig {
    name: [u8; 20],
    enabled: bool,
    hour: i8,
    password: [u8; 20],
}

impl ConfigBlob for DeviceConfig {
    const SIZE: usize = 42;

    fn encode(&self, out: &mut [u8]) {
        BlobWriter::new(out)
            .bytes(&self.name)
            .bool(self.enabled)
            .i8(self.hour)
            .bytes(&self.password);
    }

    fn decode(&mut self, bytes: &[u8]) {
        let mut r = BlobReader::new(bytes);
        r.bytes(&mut self.name);
        self.enabled = r.bool();
        self.hour = r.i8();
        r.bytes(&mut self.password);
    }
}

struct Metadata {
    version: i8,
}

fn hello(routes: &mut Routes) {
    routes.on("/custom", Method::GET, |_| {
        Reply::new(StatusCode::OK, MIME_PLAIN, "Hello, World!")
    });
}

fn run(settings: PortalSettings, platform: Platform) -> anyhow::Result<()> {
    let mut manager = ConfigManager::new(settings, platform, DeviceConfig::default())?;

    let config = manager.config();
    let metadata = shared(Metadata {
        version: FIRMWARE_VERSION,
    });
    manager.add_parameter(
        "name",
        Field::text(&config, |c: &mut DeviceConfig| &mut c.name),
        Policy::ReadWrite,
    );
    manager.add_parameter(
        "enabled",
        Field::bool(&config, |c: &mut DeviceConfig| &mut c.enabled),
        Policy::ReadWrite,
    );
    manager.add_parameter(
        "hour",
        Field::int(&config, |c: &mut DeviceConfig| &mut c.hour),
        Policy::ReadWrite,
    );
    manager.add_parameter(
        "password",
        Field::text(&config, |c: &mut DeviceConfig| &mut c.password),
        Policy::WriteOnly,
    );
    manager.add_parameter(
        "version",
        Field::int(&metadata, |m: &mut Metadata| &mut m.version),
        Policy::ReadOnly,
    );

    manager.set_ap_extension(hello);
    manager.set_api_extension(hello);
    manager.begin();

    let mode = manager.start_configured()?;
    log::info!("Serving in {:?} mode", mode);

    loop {
        manager.tick();
        std::thread::sleep(TICK);
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    use edge_config::captive_portal::install_default_page;
    use edge_config::platform::{HostSystem, HostTransport, SimulatedRadio};
    use edge_config::store::{FileStore, Layout};
    use edge_config::web::FsAssets;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => PortalSettings::load(path)?,
        None => PortalSettings {
            asset_root: "www".to_string(),
            ..Default::default()
        },
    };
    let store_path = args.next().unwrap_or_else(|| "edge-config.bin".to_string());

    let asset_root = std::path::Path::new(&settings.asset_root);
    if let Err(e) = install_default_page(asset_root, &settings.ap_filename) {
        log::warn!("Could not install portal page: {}", e);
    }

    let layout = Layout::new(settings.calibration_width, DeviceConfig::SIZE);
    let platform = Platform {
        store: Box::new(FileStore::open(&store_path, layout.total_size())?),
        radio: Box::new(SimulatedRadio::default()),
        system: Box::new(HostSystem::new()),
        transport: Box::new(HostTransport),
        assets: Box::new(FsAssets::new(&settings.asset_root)),
    };
    run(settings, platform)
}

#[cfg(target_os = "espidf")]
fn mount_spiffs(base: &str) -> anyhow::Result<()> {
    use esp_idf_svc::sys;

    let base_path = std::ffi::CString::new(base)?;
    let conf = sys::esp_vfs_spiffs_conf_t {
        base_path: base_path.as_ptr(),
        partition_label: std::ptr::null(),
        max_files: 5,
        format_if_mount_failed: false,
    };
    sys::esp!(unsafe { sys::esp_vfs_spiffs_register(&conf) })?;
    log::info!("SPIFFS mounted at {}", base);
    Ok(())
}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use edge_config::platform::{EspRadio, EspSystem, EspTransport};
    use edge_config::store::{Layout, NvsStore};
    use edge_config::web::FsAssets;
    use esp_idf_svc::eventloop::EspSystemEventLoop;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    let peripherals = esp_idf_svc::hal::prelude::Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let partition = esp_idf_svc::nvs::EspDefaultNvsPartition::take()?;
    let nvs = esp_idf_svc::nvs::EspDefaultNvs::new(partition, "config", true)?;

    let settings = PortalSettings::default();
    if let Err(e) = mount_spiffs(&settings.asset_root) {
        log::error!("Failed to mount SPIFFS: {:?}", e);
    }

    let layout = Layout::new(settings.calibration_width, DeviceConfig::SIZE);
    let platform = Platform {
        store: Box::new(NvsStore::new(nvs, layout.total_size())?),
        radio: Box::new(EspRadio::new(peripherals.modem, sysloop)),
        system: Box::new(EspSystem::new()),
        transport: Box::new(EspTransport),
        assets: Box::new(FsAssets::new(&settings.asset_root)),
    };
    run(settings, platform)
}
