//! Narrow interfaces to the radio, the clock and the socket layer.

mod host;
#[cfg(target_os = "espidf")]
mod esp;

use std::net::Ipv4Addr;
use std::time::Duration;

#[cfg(not(target_os = "espidf"))]
pub use host::HostTransport;
pub use host::{HostSystem, SimulatedRadio};
#[cfg(target_os = "espidf")]
pub use esp::{EspRadio, EspSystem, EspTransport};

use crate::dns::DnsResponder;
use crate::store::NvStore;
use crate::web::{AssetSource, HttpListener};

/// One entry of a Wi-Fi scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ssid: String,
    /// dBm
    pub rssi: i8,
    pub open: bool,
}

pub trait Radio {
    /// Bring up the soft AP on `gateway/prefix` and return the address it
    /// answers on.
    fn start_access_point(
        &mut self,
        ssid: &str,
        password: &str,
        gateway: Ipv4Addr,
        prefix: u8,
    ) -> anyhow::Result<Ipv4Addr>;

    fn scan_networks(&mut self) -> anyhow::Result<Vec<NetworkInfo>>;

    /// Start joining a network in station mode; does not wait.
    fn join(&mut self, ssid: &str, password: &str) -> anyhow::Result<()>;

    fn is_connected(&mut self) -> bool;

    fn mac_address(&self) -> String;
}

pub trait System {
    /// Time since boot.
    fn uptime(&self) -> Duration;

    fn delay(&mut self, d: Duration);

    /// On hardware this never returns.
    fn restart(&mut self);
}

pub trait Transport {
    fn bind_http(&mut self, port: u16) -> anyhow::Result<Box<dyn HttpListener>>;

    fn bind_dns(&mut self, port: u16, answer: Ipv4Addr) -> anyhow::Result<Box<dyn DnsResponder>>;
}

/// Everything the manager needs from the board, handed over once.
pub struct Platform {
    pub store: Box<dyn NvStore>,
    pub radio: Box<dyn Radio>,
    pub system: Box<dyn System>,
    pub transport: Box<dyn Transport>,
    pub assets: Box<dyn AssetSource>,
}

/// A radio peripheral that can be turned into a driver exactly once.
///
/// Station join and access point bring-up share the driver made by whichever
/// runs first.
pub struct DriverSlot<M, D> {
    modem: Option<M>,
    driver: Option<D>,
}

impl<M, D> DriverSlot<M, D> {
    pub fn new(modem: M) -> Self {
        Self {
            modem: Some(modem),
            driver: None,
        }
    }

    /// The existing driver, or one made from the modem by `init`.
    pub fn get_or_init(
        &mut self,
        init: impl FnOnce(M) -> anyhow::Result<D>,
    ) -> anyhow::Result<&mut D> {
        if self.driver.is_none() {
            let modem = self
                .modem
                .take()
                .ok_or_else(|| anyhow::anyhow!("modem already taken by a failed driver start"))?;
            self.driver = Some(init(modem)?);
        }
        self.driver
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Wi-Fi driver unavailable"))
    }

    pub fn get(&self) -> Option<&D> {
        self.driver.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut D> {
        self.driver.as_mut()
    }
}

pub(crate) fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_is_made_once_and_reused() {
        let mut slot = DriverSlot::new("modem");
        let mut inits = 0;

        *slot
            .get_or_init(|m| {
                inits += 1;
                Ok(format!("{}-sta", m))
            })
            .unwrap() += "+ap";
        let driver = slot
            .get_or_init(|m| {
                inits += 1;
                Ok(format!("{}-again", m))
            })
            .unwrap();

        assert_eq!(driver.as_str(), "modem-sta+ap");
        assert_eq!(inits, 1);
    }

    #[test]
    fn test_failed_init_consumes_the_modem() {
        let mut slot: DriverSlot<&str, String> = DriverSlot::new("modem");
        assert!(slot.get_or_init(|_| anyhow::bail!("no RF")).is_err());
        assert!(slot.get().is_none());

        let err = slot.get_or_init(|m| Ok(m.to_string())).unwrap_err();
        assert!(err.to_string().contains("modem already taken"));
    }
}
