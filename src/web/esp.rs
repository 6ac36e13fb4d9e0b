use esp_idf_svc::{
    http::{
        server::{Configuration, EspHttpConnection, EspHttpServer, Request},
        Headers, Method,
    },
    io::{Read, Write},
};
use http::StatusCode;

use super::queue::{request_queue, QueueListener, RequestQueue, MAX_BODY, REPLY_TIMEOUT};
use super::{Exchange, HttpListener};

/// Headers the handlers look at.
const FORWARDED_HEADERS: [&str; 3] = ["Host", "Content-Type", "Content-Length"];

/// `EspHttpServer` with one wildcard handler per method.
///
/// The handlers run on the httpd task and wait there for `tick` to answer.
pub struct EspHttpListener {
    _server: EspHttpServer<'static>,
    queue: QueueListener,
}

impl EspHttpListener {
    pub fn bind(port: u16) -> anyhow::Result<Self> {
        let mut server = EspHttpServer::new(&Configuration {
            http_port: port,
            stack_size: 8192,
            uri_match_wildcard: true,
            ..Default::default()
        })?;
        let (tx, queue) = request_queue();

        for method in [Method::Get, Method::Post, Method::Put, Method::Delete] {
            let tx = tx.clone();
            let name = method_name(&method);
            server.fn_handler::<anyhow::Error, _>("/*", method, move |req| forward(req, name, &tx))?;
        }

        log::info!("Webserver enabled on port: {}", port);
        Ok(Self {
            _server: server,
            queue,
        })
    }
}

impl HttpListener for EspHttpListener {
    fn poll(&mut self) -> anyhow::Result<Option<Exchange>> {
        self.queue.poll()
    }
}

fn method_name(method: &Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
        Method::Put => "PUT",
        Method::Delete => "DELETE",
        _ => "OPTIONS",
    }
}

fn forward(
    mut req: Request<&mut EspHttpConnection<'_>>,
    method: &str,
    queue: &RequestQueue,
) -> anyhow::Result<()> {
    let len = req.content_len().unwrap_or(0) as usize;
    if len > MAX_BODY {
        log::warn!("Rejecting {} byte body for {}", len, req.uri());
        req.into_response(413, None, &[])?;
        return Ok(());
    }

    let mut builder = http::Request::builder()
        .method(method)
        .uri(req.uri());
    for name in FORWARDED_HEADERS {
        if let Some(value) = req.header(name) {
            builder = builder.header(name, value);
        }
    }

    let mut body = vec![0u8; len];
    req.read_exact(&mut body)
        .map_err(|e| anyhow::anyhow!("reading request body: {:?}", e))?;
    let request = builder.body(body)?;

    let reply = queue.submit(request, REPLY_TIMEOUT);
    let status = reply.status();

    let mut headers: Vec<(String, String)> = reply
        .response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    if reply.close {
        headers.push(("Connection".to_string(), "close".to_string()));
    }
    let headers: Vec<(&str, &str)> = headers
        .iter()
        .map(|(n, v)| (n.as_str(), v.as_str()))
        .collect();

    let mut resp = req.into_response(status.as_u16(), status.canonical_reason(), &headers)?;
    if status != StatusCode::NO_CONTENT && status != StatusCode::NOT_MODIFIED {
        resp.write_all(reply.body())?;
    }
    Ok(())
}
