//! HTTP plumbing shared by both modes: request/reply types, the listener
//! interface and the route table.

#[cfg(target_os = "espidf")]
mod esp;
mod form;
mod queue;
#[cfg(not(target_os = "espidf"))]
mod tiny;

#[cfg(target_os = "espidf")]
pub use esp::EspHttpListener;
pub use form::{arg, decode_json, host_header, is_json, parse_json_object};
pub use queue::{request_queue, QueueListener, RequestQueue, MAX_BODY, REPLY_TIMEOUT};
#[cfg(not(target_os = "espidf"))]
pub use tiny::TinyHttpListener;

use std::net::SocketAddr;

use http::{header, HeaderValue, Method, StatusCode};

pub const MIME_HTML: &str = "text/html";
pub const MIME_JSON: &str = "application/json";
pub const MIME_PLAIN: &str = "text/plain";
pub const MIME_CSS: &str = "text/css";
pub const MIME_JS: &str = "application/javascript";

pub type Request = http::Request<Vec<u8>>;

/// Address of the local end of the connection a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAddr(pub SocketAddr);

/// A response plus whether the connection must be dropped right after it.
#[derive(Debug)]
pub struct Reply {
    pub response: http::Response<Vec<u8>>,
    pub close: bool,
}

impl Reply {
    pub fn new(status: StatusCode, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        let mut response = http::Response::new(body.into());
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            response,
            close: false,
        }
    }

    /// 302 with an empty body; the socket is closed after sending.
    pub fn redirect(location: &str) -> Self {
        let mut reply = Self::new(StatusCode::FOUND, MIME_PLAIN, Vec::new());
        match HeaderValue::from_str(location) {
            Ok(v) => {
                reply.response.headers_mut().insert(header::LOCATION, v);
            }
            Err(e) => log::error!("Bad redirect target {:?}: {}", location, e),
        }
        reply.close = true;
        reply
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, MIME_PLAIN, "File Not Found")
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn header(&self, name: header::HeaderName) -> Option<&str> {
        self.response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        self.response.body()
    }
}

/// Sends the reply for one accepted request.
pub trait Responder {
    fn send(self: Box<Self>, reply: Reply) -> anyhow::Result<()>;
}

pub struct Exchange {
    pub request: Request,
    pub responder: Box<dyn Responder>,
}

/// The HTTP server primitive. `poll` hands out at most one pending request.
pub trait HttpListener {
    fn poll(&mut self) -> anyhow::Result<Option<Exchange>>;
}

pub type Handler = Box<dyn FnMut(&Request) -> Reply>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    PortalPage,
    SaveCalibration,
    Scan,
    SettingsGet,
    SettingsPut,
}

enum Target {
    Builtin(Builtin),
    Custom(Handler),
    Asset { file: String, mime: &'static str },
}

struct Route {
    path: String,
    method: Method,
    target: Target,
}

/// What a lookup resolved to. Custom handlers are referenced by index so the
/// caller can release its borrow of the table before running built-ins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Matched {
    Builtin(Builtin),
    Custom(usize),
    Asset { file: String, mime: &'static str },
}

#[derive(Default)]
pub struct Routes {
    routes: Vec<Route>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Earlier registrations win on duplicates.
    pub fn on<F>(&mut self, path: &str, method: Method, handler: F) -> &mut Self
    where
        F: FnMut(&Request) -> Reply + 'static,
    {
        self.push(path, method, Target::Custom(Box::new(handler)))
    }

    /// Serve `file` (relative to the asset root) on GET `path`, typed by its
    /// extension.
    pub fn asset(&mut self, path: &str, file: &str) -> &mut Self {
        let target = Target::Asset {
            file: file.to_string(),
            mime: mime_for(file),
        };
        self.push(path, Method::GET, target)
    }

    pub(crate) fn builtin(&mut self, path: &str, method: Method, which: Builtin) -> &mut Self {
        self.push(path, method, Target::Builtin(which))
    }

    fn push(&mut self, path: &str, method: Method, target: Target) -> &mut Self {
        self.routes.push(Route {
            path: path.to_string(),
            method,
            target,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn contains(&self, path: &str, method: &Method) -> bool {
        self.lookup(method, path).is_some()
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<Matched> {
        let (idx, route) = self
            .routes
            .iter()
            .enumerate()
            .find(|(_, r)| r.path == path && r.method == *method)?;
        Some(match &route.target {
            Target::Builtin(b) => Matched::Builtin(*b),
            Target::Custom(_) => Matched::Custom(idx),
            Target::Asset { file, mime } => Matched::Asset {
                file: file.clone(),
                mime: *mime,
            },
        })
    }

    pub(crate) fn call(&mut self, idx: usize, req: &Request) -> Option<Reply> {
        match &mut self.routes.get_mut(idx)?.target {
            Target::Custom(handler) => Some(handler(req)),
            _ => None,
        }
    }
}

/// Hook for the caller to add routes when a mode starts.
pub trait RouteExtension {
    fn register(&mut self, routes: &mut Routes);
}

impl<F> RouteExtension for F
where
    F: FnMut(&mut Routes),
{
    fn register(&mut self, routes: &mut Routes) {
        self(routes)
    }
}

pub fn mime_for(path: &str) -> &'static str {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") | Some("htm") => MIME_HTML,
        Some("css") => MIME_CSS,
        Some("js") => MIME_JS,
        Some("json") => MIME_JSON,
        _ => MIME_PLAIN,
    }
}

/// Where static files come from.
pub trait AssetSource {
    fn open(&self, file: &str) -> std::io::Result<Vec<u8>>;
}

/// Files below a directory; on ESP-IDF that is the SPIFFS mount point.
pub struct FsAssets {
    root: std::path::PathBuf,
}

impl FsAssets {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for FsAssets {
    fn open(&self, file: &str) -> std::io::Result<Vec<u8>> {
        let rel = file.trim_start_matches('/');
        if rel.split('/').any(|seg| seg == "..") {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "path escapes asset root",
            ));
        }
        std::fs::read(self.root.join(rel))
    }
}
