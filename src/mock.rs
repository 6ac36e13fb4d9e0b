//! In-memory collaborators for driving the manager in tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::time::Duration;

use http::{header, Method};

use crate::dns::DnsResponder;
use crate::platform::{DriverSlot, NetworkInfo, Radio, System, Transport};
use crate::web::{AssetSource, Exchange, HttpListener, LocalAddr, Reply, Request, Responder};

pub const LOCAL_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 80);

/// Build a request as the listener would hand it out.
pub fn request(method: Method, uri: &str, content_type: Option<&str>, body: &str) -> Request {
    let mut builder = http::Request::builder().method(method).uri(uri);
    if let Some(ct) = content_type {
        builder = builder.header(header::CONTENT_TYPE, ct);
    }
    let mut req = builder
        .body(body.as_bytes().to_vec())
        .unwrap_or_default();
    req.extensions_mut().insert(LocalAddr(LOCAL_ADDR));
    req
}

pub fn get(uri: &str) -> Request {
    request(Method::GET, uri, None, "")
}

pub fn form(method: Method, uri: &str, body: &str) -> Request {
    request(
        method,
        uri,
        Some("application/x-www-form-urlencoded"),
        body,
    )
}

pub fn json(method: Method, uri: &str, body: &str) -> Request {
    request(method, uri, Some(crate::web::MIME_JSON), body)
}

pub fn with_host(mut req: Request, host: &str) -> Request {
    if let Ok(v) = header::HeaderValue::from_str(host) {
        req.headers_mut().insert(header::HOST, v);
    }
    req
}

#[derive(Default)]
struct NetState {
    pending: VecDeque<Request>,
    replies: Vec<Reply>,
    http_port: Option<u16>,
    dns: Option<(u16, Ipv4Addr)>,
    dns_polls: usize,
}

/// Scripted sockets. Clones share state.
#[derive(Clone, Default)]
pub struct MockNet {
    state: Rc<RefCell<NetState>>,
}

impl MockNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, req: Request) {
        self.state.borrow_mut().pending.push_back(req);
    }

    pub fn take_replies(&self) -> Vec<Reply> {
        std::mem::take(&mut self.state.borrow_mut().replies)
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn http_port(&self) -> Option<u16> {
        self.state.borrow().http_port
    }

    pub fn dns(&self) -> Option<(u16, Ipv4Addr)> {
        self.state.borrow().dns
    }

    pub fn dns_polls(&self) -> usize {
        self.state.borrow().dns_polls
    }
}

struct MockListener {
    net: MockNet,
}

struct MockResponder {
    net: MockNet,
}

struct MockDns {
    net: MockNet,
}

impl HttpListener for MockListener {
    fn poll(&mut self) -> anyhow::Result<Option<Exchange>> {
        let next = self.net.state.borrow_mut().pending.pop_front();
        Ok(next.map(|request| Exchange {
            request,
            responder: Box::new(MockResponder {
                net: self.net.clone(),
            }),
        }))
    }
}

impl Responder for MockResponder {
    fn send(self: Box<Self>, reply: Reply) -> anyhow::Result<()> {
        self.net.state.borrow_mut().replies.push(reply);
        Ok(())
    }
}

impl DnsResponder for MockDns {
    fn process_pending(&mut self) -> bool {
        self.net.state.borrow_mut().dns_polls += 1;
        false
    }
}

impl Transport for MockNet {
    fn bind_http(&mut self, port: u16) -> anyhow::Result<Box<dyn HttpListener>> {
        self.state.borrow_mut().http_port = Some(port);
        Ok(Box::new(MockListener { net: self.clone() }))
    }

    fn bind_dns(&mut self, port: u16, answer: Ipv4Addr) -> anyhow::Result<Box<dyn DnsResponder>> {
        self.state.borrow_mut().dns = Some((port, answer));
        Ok(Box::new(MockDns { net: self.clone() }))
    }
}

/// Radio mode the mock driver was last configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    Station,
    Mixed,
}

struct RadioState {
    /// one modem, one driver, as on hardware
    slot: DriverSlot<(), DriverMode>,
    driver_inits: usize,
    networks: Vec<NetworkInfo>,
    access_point: Option<(String, String)>,
    joined: Option<String>,
    /// `is_connected` turns true after this many polls
    connect_after: Option<usize>,
    polls: usize,
}

impl Default for RadioState {
    fn default() -> Self {
        Self {
            slot: DriverSlot::new(()),
            driver_inits: 0,
            networks: Vec::new(),
            access_point: None,
            joined: None,
            connect_after: None,
            polls: 0,
        }
    }
}

impl RadioState {
    fn configure(&mut self, mode: DriverMode) -> anyhow::Result<()> {
        let inits = &mut self.driver_inits;
        let driver = self.slot.get_or_init(|()| {
            *inits += 1;
            Ok(mode)
        })?;
        *driver = mode;
        Ok(())
    }
}

/// Clones share state.
#[derive(Clone, Default)]
pub struct MockRadio {
    state: Rc<RefCell<RadioState>>,
}

impl MockRadio {
    pub fn new(networks: Vec<NetworkInfo>) -> Self {
        let radio = Self::default();
        radio.state.borrow_mut().networks = networks;
        radio
    }

    /// Connect on the `polls`-th status check; `None` never connects.
    pub fn connect_after(&self, polls: Option<usize>) {
        self.state.borrow_mut().connect_after = polls;
    }

    pub fn access_point(&self) -> Option<(String, String)> {
        self.state.borrow().access_point.clone()
    }

    pub fn joined(&self) -> Option<String> {
        self.state.borrow().joined.clone()
    }

    pub fn status_polls(&self) -> usize {
        self.state.borrow().polls
    }

    /// How many times the modem was turned into a driver.
    pub fn driver_inits(&self) -> usize {
        self.state.borrow().driver_inits
    }

    pub fn driver_mode(&self) -> Option<DriverMode> {
        self.state.borrow().slot.get().copied()
    }
}

impl Radio for MockRadio {
    fn start_access_point(
        &mut self,
        ssid: &str,
        password: &str,
        gateway: Ipv4Addr,
        _prefix: u8,
    ) -> anyhow::Result<Ipv4Addr> {
        let mut s = self.state.borrow_mut();
        s.configure(DriverMode::Mixed)?;
        s.access_point = Some((ssid.to_string(), password.to_string()));
        Ok(gateway)
    }

    fn scan_networks(&mut self) -> anyhow::Result<Vec<NetworkInfo>> {
        Ok(self.state.borrow().networks.clone())
    }

    fn join(&mut self, ssid: &str, _password: &str) -> anyhow::Result<()> {
        let mut s = self.state.borrow_mut();
        s.configure(DriverMode::Station)?;
        s.joined = Some(ssid.to_string());
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        let mut s = self.state.borrow_mut();
        s.polls += 1;
        matches!(s.connect_after, Some(n) if s.polls >= n)
    }

    fn mac_address(&self) -> String {
        "02:00:00:00:00:01".to_string()
    }
}

/// Manual clock. `delay` advances it; `restart` is only counted.
#[derive(Clone, Default)]
pub struct MockSystem {
    now: Rc<Cell<Duration>>,
    restarts: Rc<Cell<usize>>,
}

impl MockSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now.set(self.now.get() + d);
    }

    pub fn restarts(&self) -> usize {
        self.restarts.get()
    }
}

impl System for MockSystem {
    fn uptime(&self) -> Duration {
        self.now.get()
    }

    fn delay(&mut self, d: Duration) {
        self.advance(d);
    }

    fn restart(&mut self) {
        self.restarts.set(self.restarts.get() + 1);
    }
}

#[derive(Default)]
pub struct MockAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MockAssets {
    pub fn with(mut self, file: &str, content: &str) -> Self {
        self.files
            .insert(file.to_string(), content.as_bytes().to_vec());
        self
    }
}

impl AssetSource for MockAssets {
    fn open(&self, file: &str) -> std::io::Result<Vec<u8>> {
        self.files
            .get(file)
            .cloned()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }
}
