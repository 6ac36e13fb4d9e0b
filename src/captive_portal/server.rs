//! The configuration manager: captive portal mode and REST settings mode.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use http::Method;

use super::handlers;
use super::redirect;
use crate::dns::DnsResponder;
use crate::params::{shared, Field, ParameterRegistry, Policy, Shared};
use crate::platform::{Platform, Radio, System, Transport};
use crate::settings::{PortalSettings, StartMode};
use crate::store::{Calibration, ConfigBlob, Layout, Storage, StoreError};
use crate::web::{
    self, AssetSource, Builtin, Exchange, HttpListener, LocalAddr, Matched, Reply, Request,
    RouteExtension, Routes, MIME_HTML,
};

/// Fixed gateway address of the soft AP.
pub const AP_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
const AP_PREFIX: u8 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    AccessPoint,
    ApiServer,
}

struct WebServer {
    listener: Box<dyn HttpListener>,
    routes: Routes,
}

/// Owns the user structure, its registry and the persisted region, and
/// serves one of the two modes.
pub struct ConfigManager<C: ConfigBlob + 'static> {
    settings: PortalSettings,
    storage: Storage,
    registry: ParameterRegistry,
    config: Shared<C>,
    radio: Box<dyn Radio>,
    system: Box<dyn System>,
    transport: Box<dyn Transport>,
    assets: Box<dyn AssetSource>,
    mode: Option<Mode>,
    dns: Option<Box<dyn DnsResponder>>,
    web: Option<WebServer>,
    ap_address: Option<Ipv4Addr>,
    ap_start: Duration,
    ap_extension: Option<Box<dyn RouteExtension>>,
    api_extension: Option<Box<dyn RouteExtension>>,
}

impl<C: ConfigBlob + 'static> ConfigManager<C> {
    pub fn new(settings: PortalSettings, platform: Platform, config: C) -> anyhow::Result<Self> {
        let layout = Layout::new(settings.calibration_width, C::SIZE);
        let storage = Storage::new(platform.store, layout)?;
        Ok(Self {
            settings,
            storage,
            registry: ParameterRegistry::new(),
            config: shared(config),
            radio: platform.radio,
            system: platform.system,
            transport: platform.transport,
            assets: platform.assets,
            mode: None,
            dns: None,
            web: None,
            ap_address: None,
            ap_start: Duration::ZERO,
            ap_extension: None,
            api_extension: None,
        })
    }

    /// Handle to the user structure; fields are bound through it.
    pub fn config(&self) -> Shared<C> {
        self.config.clone()
    }

    pub fn settings(&self) -> &PortalSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ParameterRegistry {
        &self.registry
    }

    pub fn add_parameter(&mut self, name: &str, field: Field, policy: Policy) -> bool {
        self.registry.add_parameter(name, field, policy)
    }

    /// Runs once when the access point starts, after the base routes.
    pub fn set_ap_extension(&mut self, ext: impl RouteExtension + 'static) {
        self.ap_extension = Some(Box::new(ext));
    }

    /// Runs once when the settings API starts, after the base routes.
    pub fn set_api_extension(&mut self, ext: impl RouteExtension + 'static) {
        self.api_extension = Some(Box::new(ext));
    }

    /// Load the stored structure and report what the region holds.
    pub fn begin(&mut self) {
        let verbose = self.settings.debug;
        crate::verbose!(verbose, "MAC: {}", self.radio.mac_address());

        match self.storage.stored_calibration() {
            Ok(stored) => crate::verbose!(
                verbose,
                "Calibration marker: {:?} pitch: {:?} velocity: {:?}",
                stored.magic,
                stored.pitch,
                stored.velocity
            ),
            Err(e) => log::error!("Reading calibration failed: {}", e),
        }

        if let Err(e) = self.read_config() {
            log::error!("Reading configuration failed: {}", e);
        }
    }

    pub fn read_config(&mut self) -> Result<(), StoreError> {
        self.storage.read_config(&mut *self.config.borrow_mut())
    }

    pub fn write_config(&mut self) -> Result<(), StoreError> {
        handlers::persist_config(&mut self.storage, &self.config)
    }

    pub fn save(&mut self) -> Result<(), StoreError> {
        self.write_config()
    }

    pub fn store_calibration(
        &mut self,
        pitch: &str,
        velocity: &str,
        reset_magic: bool,
    ) -> Result<(), StoreError> {
        handlers::persist_calibration(&mut self.storage, pitch, velocity, reset_magic)
    }

    pub fn calibration(&self) -> Result<Option<Calibration>, StoreError> {
        self.storage.calibration()
    }

    pub fn clear_calibration(&mut self, reboot: bool) -> Result<(), StoreError> {
        self.store_calibration("", "", true)?;
        if reboot {
            self.restart();
        }
        Ok(())
    }

    pub fn clear_settings(&mut self, reboot: bool) -> Result<(), StoreError> {
        self.registry.clear_all();
        self.write_config()?;
        if reboot {
            self.restart();
        }
        Ok(())
    }

    fn restart(&mut self) {
        log::warn!("Restarting");
        self.system.restart();
    }

    /// Poll the station link up to the configured number of times.
    pub fn wifi_connected(&mut self) -> bool {
        let interval = Duration::from_millis(self.settings.wifi_connect_interval_ms);
        for attempt in 0..self.settings.wifi_connect_retries {
            if self.radio.is_connected() {
                log::info!("WiFi connected after {} checks", attempt + 1);
                return true;
            }
            self.system.delay(interval);
        }
        log::warn!(
            "WiFi not connected after {} checks",
            self.settings.wifi_connect_retries
        );
        false
    }

    pub fn connect_station(&mut self, ssid: &str, password: &str) -> bool {
        log::info!("Joining {}", ssid);
        if let Err(e) = self.radio.join(ssid, password) {
            log::error!("Joining {} failed: {:?}", ssid, e);
            return false;
        }
        self.wifi_connected()
    }

    pub fn start(&mut self, mode: StartMode) -> anyhow::Result<()> {
        match mode {
            StartMode::AccessPoint => self.start_ap(),
            StartMode::ApiServer => self.start_api(),
        }
    }

    /// Start in the configured mode. The API server needs a station link
    /// first; without one the portal comes up instead.
    pub fn start_configured(&mut self) -> anyhow::Result<Mode> {
        let station = self
            .settings
            .station()
            .map(|(ssid, pass)| (ssid.to_string(), pass.to_string()));
        let mode = match (self.settings.start_mode, station) {
            (StartMode::ApiServer, Some((ssid, pass))) if self.connect_station(&ssid, &pass) => {
                StartMode::ApiServer
            }
            (StartMode::ApiServer, _) => {
                log::warn!("No station link, falling back to access point");
                StartMode::AccessPoint
            }
            (StartMode::AccessPoint, _) => StartMode::AccessPoint,
        };
        self.start(mode)?;
        Ok(match mode {
            StartMode::AccessPoint => Mode::AccessPoint,
            StartMode::ApiServer => Mode::ApiServer,
        })
    }

    fn ensure_idle(&self) -> anyhow::Result<()> {
        if let Some(mode) = self.mode {
            anyhow::bail!("already serving in {:?} mode, restart to switch", mode);
        }
        Ok(())
    }

    fn base_routes() -> Routes {
        let mut routes = Routes::new();
        routes
            .builtin("/", Method::GET, Builtin::PortalPage)
            .builtin("/", Method::POST, Builtin::SaveCalibration)
            .builtin("/scan", Method::GET, Builtin::Scan);
        routes
    }

    pub fn start_ap(&mut self) -> anyhow::Result<()> {
        self.ensure_idle()?;

        let ip = self.radio.start_access_point(
            &self.settings.ap_name,
            &self.settings.ap_password,
            AP_GATEWAY,
            AP_PREFIX,
        )?;
        log::info!("SoftAP started: {} ({})", self.settings.ap_name, ip);

        let dns = self.transport.bind_dns(self.settings.dns_port, ip)?;

        let mut routes = Self::base_routes();
        if let Some(ext) = self.ap_extension.as_mut() {
            ext.register(&mut routes);
        }
        let listener = self.transport.bind_http(self.settings.web_port)?;

        self.dns = Some(dns);
        self.web = Some(WebServer { listener, routes });
        self.ap_address = Some(ip);
        self.ap_start = self.system.uptime();
        self.mode = Some(Mode::AccessPoint);
        Ok(())
    }

    pub fn start_api(&mut self) -> anyhow::Result<()> {
        self.ensure_idle()?;

        let mut routes = Self::base_routes();
        routes
            .builtin("/settings", Method::GET, Builtin::SettingsGet)
            .builtin("/settings", Method::PUT, Builtin::SettingsPut);
        if let Some(ext) = self.api_extension.as_mut() {
            ext.register(&mut routes);
        }
        let listener = self.transport.bind_http(self.settings.web_port)?;

        self.web = Some(WebServer { listener, routes });
        self.mode = Some(Mode::ApiServer);
        log::info!("Settings API listening on port {}", self.settings.web_port);
        Ok(())
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// Address the device serves on; known only in access point mode.
    pub fn local_address(&self) -> Option<SocketAddr> {
        self.ap_address
            .map(|ip| SocketAddr::from((ip, self.settings.web_port)))
    }

    fn ap_expired(&self) -> bool {
        if self.mode != Some(Mode::AccessPoint) || self.settings.ap_timeout_secs == 0 {
            return false;
        }
        let elapsed = self.system.uptime().saturating_sub(self.ap_start);
        elapsed >= Duration::from_secs(self.settings.ap_timeout_secs)
    }

    /// One scheduler pass: watchdog, one DNS query, one HTTP request.
    pub fn tick(&mut self) {
        if self.ap_expired() {
            log::warn!(
                "Access point open for {}s, restarting",
                self.settings.ap_timeout_secs
            );
            self.restart();
            return;
        }

        if let Some(dns) = self.dns.as_mut() {
            dns.process_pending();
        }

        let exchange = match self.web.as_mut().map(|w| w.listener.poll()) {
            Some(Ok(Some(exchange))) => exchange,
            Some(Ok(None)) | None => return,
            Some(Err(e)) => {
                log::warn!("HTTP accept failed: {:?}", e);
                return;
            }
        };
        self.serve(exchange);
    }

    fn serve(&mut self, exchange: Exchange) {
        let Exchange { request, responder } = exchange;
        let reply = self.dispatch(&request);
        log::debug!(
            "{} {} -> {}",
            request.method(),
            request.uri().path(),
            reply.status()
        );
        if let Err(e) = responder.send(reply) {
            log::warn!("Sending reply failed: {:?}", e);
        }
    }

    fn dispatch(&mut self, req: &Request) -> Reply {
        let matched = self
            .web
            .as_ref()
            .and_then(|w| w.routes.lookup(req.method(), req.uri().path()));

        let reply = match matched {
            Some(Matched::Builtin(which)) => self.builtin(which, req),
            Some(Matched::Custom(idx)) => self.web.as_mut().and_then(|w| w.routes.call(idx, req)),
            Some(Matched::Asset { file, mime }) => {
                handlers::stream_file(self.assets.as_ref(), &file, mime)
            }
            None => None,
        };

        reply.unwrap_or_else(|| self.not_found(req))
    }

    fn builtin(&mut self, which: Builtin, req: &Request) -> Option<Reply> {
        let reply = match which {
            Builtin::PortalPage => {
                return handlers::stream_file(
                    self.assets.as_ref(),
                    &self.settings.ap_filename,
                    MIME_HTML,
                )
            }
            Builtin::SaveCalibration => handlers::handle_calibration_post(req, &mut self.storage),
            Builtin::Scan => handlers::handle_scan_get(self.radio.as_mut(), self.settings.debug),
            Builtin::SettingsGet => handlers::handle_settings_get(&self.registry),
            Builtin::SettingsPut => handlers::handle_settings_put(
                req,
                &self.registry,
                &mut self.storage,
                &self.config,
            ),
        };
        Some(reply)
    }

    fn not_found(&self, req: &Request) -> Reply {
        let own = match req.extensions().get::<LocalAddr>() {
            Some(LocalAddr(addr)) => addr.to_string(),
            None => format!(
                "{}:{}",
                self.ap_address.unwrap_or(Ipv4Addr::UNSPECIFIED),
                self.settings.web_port
            ),
        };
        let host = web::host_header(req);
        redirect::handle_not_found(host, &own, self.settings.debug)
    }
}
