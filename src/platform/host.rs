use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use super::{format_mac, NetworkInfo, Radio, System};
#[cfg(not(target_os = "espidf"))]
use super::Transport;
#[cfg(not(target_os = "espidf"))]
use crate::dns::{DnsResponder, UdpDnsResponder};
#[cfg(not(target_os = "espidf"))]
use crate::web::{HttpListener, TinyHttpListener};

/// Radio for running the portal on a workstation.
///
/// The "access point" is the loopback interface and scans return a fixed
/// list, so the portal pages can be exercised from a browser.
pub struct SimulatedRadio {
    networks: Vec<NetworkInfo>,
    joined: Option<String>,
}

impl SimulatedRadio {
    pub fn new(networks: Vec<NetworkInfo>) -> Self {
        Self {
            networks,
            joined: None,
        }
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new(vec![
            NetworkInfo {
                ssid: "studio".to_string(),
                rssi: -48,
                open: false,
            },
            NetworkInfo {
                ssid: "guest".to_string(),
                rssi: -71,
                open: true,
            },
        ])
    }
}

impl Radio for SimulatedRadio {
    fn start_access_point(
        &mut self,
        ssid: &str,
        _password: &str,
        gateway: Ipv4Addr,
        prefix: u8,
    ) -> anyhow::Result<Ipv4Addr> {
        log::info!(
            "Simulated AP {:?} would use {}/{}, serving on loopback",
            ssid,
            gateway,
            prefix
        );
        Ok(Ipv4Addr::LOCALHOST)
    }

    fn scan_networks(&mut self) -> anyhow::Result<Vec<NetworkInfo>> {
        Ok(self.networks.clone())
    }

    fn join(&mut self, ssid: &str, _password: &str) -> anyhow::Result<()> {
        self.joined = self
            .networks
            .iter()
            .find(|n| n.ssid == ssid)
            .map(|n| n.ssid.clone());
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        self.joined.is_some()
    }

    fn mac_address(&self) -> String {
        format_mac(&[0x02, 0x00, 0x00, 0x00, 0x00, 0x01])
    }
}

pub struct HostSystem {
    boot: Instant,
}

impl HostSystem {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }
}

impl Default for HostSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for HostSystem {
    fn uptime(&self) -> Duration {
        self.boot.elapsed()
    }

    fn delay(&mut self, d: Duration) {
        std::thread::sleep(d);
    }

    fn restart(&mut self) {
        log::warn!("Restart requested, exiting");
        std::process::exit(0);
    }
}

/// `tiny_http` for the web server, a std UDP socket for DNS.
#[cfg(not(target_os = "espidf"))]
#[derive(Default)]
pub struct HostTransport;

#[cfg(not(target_os = "espidf"))]
impl Transport for HostTransport {
    fn bind_http(&mut self, port: u16) -> anyhow::Result<Box<dyn HttpListener>> {
        Ok(Box::new(TinyHttpListener::bind(port)?))
    }

    fn bind_dns(&mut self, port: u16, answer: Ipv4Addr) -> anyhow::Result<Box<dyn DnsResponder>> {
        Ok(Box::new(UdpDnsResponder::bind(port, answer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_join_needs_known_ssid() {
        let mut radio = SimulatedRadio::default();
        radio.join("nowhere", "").unwrap();
        assert!(!radio.is_connected());
        radio.join("studio", "secret").unwrap();
        assert!(radio.is_connected());
    }
}
