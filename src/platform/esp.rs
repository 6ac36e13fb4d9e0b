//! ESP-IDF radio and system hooks.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    ipv4::{self, Mask, Subnet},
    netif::{EspNetif, NetifConfiguration},
    wifi::{
        AccessPointConfiguration, AuthMethod, BlockingWifi, ClientConfiguration,
        Configuration as WifiConfig, EspWifi,
    },
};

use super::{format_mac, DriverSlot, NetworkInfo, Radio, System, Transport};
use crate::dns::{DnsResponder, UdpDnsResponder};
use crate::web::{EspHttpListener, HttpListener};

type Driver = BlockingWifi<EspWifi<'static>>;

pub struct EspRadio {
    slot: DriverSlot<Modem, Driver>,
    sysloop: EspSystemEventLoop,
    mac: String,
}

impl EspRadio {
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Self {
        let mut mac = [0u8; 6];
        unsafe {
            esp_idf_svc::sys::esp_read_mac(
                mac.as_mut_ptr(),
                esp_idf_svc::sys::esp_mac_type_t_ESP_MAC_WIFI_STA,
            );
        }
        Self {
            slot: DriverSlot::new(modem),
            sysloop,
            mac: format_mac(&mac),
        }
    }

    /// The Wi-Fi driver, created on first use and shared by station and AP.
    /// A running driver is stopped so it can be reconfigured.
    fn stopped_driver(&mut self) -> anyhow::Result<&mut Driver> {
        let sysloop = self.sysloop.clone();
        let wifi = self.slot.get_or_init(|modem| {
            Ok(BlockingWifi::wrap(
                EspWifi::new(modem, sysloop.clone(), None)?,
                sysloop,
            )?)
        })?;
        if wifi.is_started()? {
            log::info!("Stopping Wi-Fi to reconfigure");
            wifi.stop()?;
        }
        Ok(wifi)
    }
}

fn auth_for(password: &str) -> AuthMethod {
    if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    }
}

impl Radio for EspRadio {
    fn start_access_point(
        &mut self,
        ssid: &str,
        password: &str,
        gateway: Ipv4Addr,
        prefix: u8,
    ) -> anyhow::Result<Ipv4Addr> {
        let gateway = ipv4::Ipv4Addr::from(gateway.octets());

        let ap_netif_config = NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Router(ipv4::RouterConfiguration {
                subnet: Subnet {
                    gateway,
                    mask: Mask(prefix),
                },
                dhcp_enabled: true,
                dns: Some(gateway),
                secondary_dns: None,
            })),
            ..NetifConfiguration::wifi_default_router()
        };
        let ap_netif = EspNetif::new_with_conf(&ap_netif_config)?;

        let ap_config = AccessPointConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| anyhow::anyhow!("AP name too long: {}", ssid))?,
            ssid_hidden: false,
            channel: 1,
            auth_method: auth_for(password),
            password: password
                .try_into()
                .map_err(|_| anyhow::anyhow!("AP password too long"))?,
            max_connections: 4,
            ..Default::default()
        };

        let wifi = self.stopped_driver()?;
        wifi.wifi_mut().swap_netif_ap(ap_netif)?;
        // scanning from the portal needs the station side up as well
        wifi.set_configuration(&WifiConfig::Mixed(
            ClientConfiguration::default(),
            ap_config,
        ))?;
        wifi.start()?;

        let ip = wifi.wifi().ap_netif().get_ip_info()?.ip;
        Ok(Ipv4Addr::from(ip.octets()))
    }

    fn scan_networks(&mut self) -> anyhow::Result<Vec<NetworkInfo>> {
        let wifi = self
            .slot
            .get_mut()
            .ok_or_else(|| anyhow::anyhow!("Wi-Fi driver not started"))?;
        let found = wifi.scan()?;
        Ok(found
            .into_iter()
            .map(|ap| NetworkInfo {
                ssid: ap.ssid.to_string(),
                rssi: ap.signal_strength,
                open: matches!(ap.auth_method, None | Some(AuthMethod::None)),
            })
            .collect())
    }

    fn join(&mut self, ssid: &str, password: &str) -> anyhow::Result<()> {
        let client = ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| anyhow::anyhow!("SSID too long: {}", ssid))?,
            password: password
                .try_into()
                .map_err(|_| anyhow::anyhow!("password too long"))?,
            auth_method: auth_for(password),
            ..Default::default()
        };

        let wifi = self.stopped_driver()?;
        wifi.set_configuration(&WifiConfig::Client(client))?;
        wifi.start()?;
        // non-blocking: the caller polls is_connected
        wifi.wifi_mut().connect()?;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.slot
            .get()
            .map(|w| w.is_connected().unwrap_or(false))
            .unwrap_or(false)
    }

    fn mac_address(&self) -> String {
        self.mac.clone()
    }
}

pub struct EspSystem {
    boot: Instant,
}

impl EspSystem {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }
}

impl Default for EspSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for EspSystem {
    fn uptime(&self) -> Duration {
        self.boot.elapsed()
    }

    fn delay(&mut self, d: Duration) {
        std::thread::sleep(d);
    }

    fn restart(&mut self) {
        log::warn!("Restarting");
        unsafe { esp_idf_svc::sys::esp_restart() }
    }
}

/// `EspHttpServer` for the web server, an lwIP UDP socket for DNS.
#[derive(Default)]
pub struct EspTransport;

impl Transport for EspTransport {
    fn bind_http(&mut self, port: u16) -> anyhow::Result<Box<dyn HttpListener>> {
        Ok(Box::new(EspHttpListener::bind(port)?))
    }

    fn bind_dns(&mut self, port: u16, answer: Ipv4Addr) -> anyhow::Result<Box<dyn DnsResponder>> {
        Ok(Box::new(UdpDnsResponder::bind(port, answer)?))
    }
}
