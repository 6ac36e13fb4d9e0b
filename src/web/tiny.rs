use std::io::Read;
use std::net::SocketAddr;

use http::StatusCode;
use tiny_http::{Header, Response, Server};

use super::queue::{request_queue, QueueListener, RequestQueue, MAX_BODY, REPLY_TIMEOUT};
use super::{Exchange, HttpListener, Reply, Request, MIME_PLAIN};

/// `tiny_http` server for workstation builds.
///
/// Connections are read on tiny_http's threads plus one short-lived thread
/// per request, so a slow client never reaches `poll`.
pub struct TinyHttpListener {
    queue: QueueListener,
    addr: Option<SocketAddr>,
}

impl TinyHttpListener {
    pub fn bind(port: u16) -> anyhow::Result<Self> {
        let server = Server::http(("0.0.0.0", port))
            .map_err(|e| anyhow::anyhow!("binding HTTP port {}: {}", port, e))?;
        let addr = server.server_addr().to_ip();
        let (tx, queue) = request_queue();

        std::thread::Builder::new()
            .name("http-accept".to_string())
            .spawn(move || accept_loop(server, tx))?;

        log::info!("Webserver enabled on port: {}", port);
        Ok(Self { queue, addr })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }
}

impl HttpListener for TinyHttpListener {
    fn poll(&mut self) -> anyhow::Result<Option<Exchange>> {
        self.queue.poll()
    }
}

fn accept_loop(server: Server, queue: RequestQueue) {
    for raw in server.incoming_requests() {
        let queue = queue.clone();
        let spawned = std::thread::Builder::new()
            .name("http-request".to_string())
            .spawn(move || serve(raw, &queue));
        if let Err(e) = spawned {
            log::warn!("Could not spawn request thread: {}", e);
        }
    }
    log::warn!("HTTP accept loop ended");
}

fn serve(mut raw: tiny_http::Request, queue: &RequestQueue) {
    let reply = match convert(&mut raw) {
        Ok(request) => {
            log::debug!(
                "{} {} from {:?}",
                request.method(),
                request.uri(),
                raw.remote_addr()
            );
            queue.submit(request, REPLY_TIMEOUT)
        }
        Err(e) => {
            log::warn!("Bad request from {:?}: {}", raw.remote_addr(), e);
            Reply::new(StatusCode::BAD_REQUEST, MIME_PLAIN, "Bad Request")
        }
    };
    if let Err(e) = raw.respond(to_response(reply)) {
        log::debug!("Writing reply failed: {}", e);
    }
}

fn convert(raw: &mut tiny_http::Request) -> anyhow::Result<Request> {
    let mut builder = http::Request::builder()
        .method(raw.method().as_str())
        .uri(raw.url());
    for h in raw.headers() {
        builder = builder.header(h.field.as_str().as_str(), h.value.as_str());
    }
    if let Some(len) = raw.body_length() {
        if len > MAX_BODY {
            anyhow::bail!("body of {} bytes too large", len);
        }
    }

    let mut body = Vec::new();
    Read::take(raw.as_reader(), MAX_BODY as u64 + 1).read_to_end(&mut body)?;
    if body.len() > MAX_BODY {
        anyhow::bail!("body too large");
    }

    Ok(builder.body(body)?)
}

fn to_response(reply: Reply) -> Response<std::io::Cursor<Vec<u8>>> {
    let (parts, body) = reply.response.into_parts();
    let status = parts.status;
    let body = if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        Vec::new()
    } else {
        body
    };

    let mut response = Response::from_data(body).with_status_code(status.as_u16());
    for (name, value) in parts.headers.iter() {
        match Header::from_bytes(name.as_str().as_bytes(), value.as_bytes()) {
            Ok(h) => response.add_header(h),
            Err(()) => log::warn!("Skipping unencodable header {}", name),
        }
    }
    if reply.close {
        if let Ok(h) = Header::from_bytes(&b"Connection"[..], &b"close"[..]) {
            response.add_header(h);
        }
    }
    response
}
