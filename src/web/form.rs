use http::header;
use serde_json::{Map, Value};

use super::{Request, MIME_JSON};

pub fn is_json(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().starts_with(MIME_JSON))
        .unwrap_or(false)
}

pub fn host_header(req: &Request) -> &str {
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// Decode a JSON object; anything else is an error.
pub fn parse_json_object(body: &[u8]) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Object(obj) => Ok(obj),
        other => anyhow::bail!("expected a JSON object, got {}", other),
    }
}

/// Lenient variant: empty or malformed input yields an empty object.
pub fn decode_json(body: &[u8]) -> Map<String, Value> {
    if body.is_empty() {
        return Map::new();
    }
    parse_json_object(body).unwrap_or_default()
}

fn decode_component(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(v) => v.into_owned(),
        Err(_) => spaced,
    }
}

fn pairs(s: &str) -> impl Iterator<Item = (String, String)> + '_ {
    s.split('&').filter(|kv| !kv.is_empty()).map(|kv| {
        let (k, v) = kv.split_once('=').unwrap_or((kv, ""));
        (decode_component(k), decode_component(v))
    })
}

/// A form argument from the query string or an urlencoded body. Query
/// arguments are checked first.
pub fn arg(req: &Request, name: &str) -> Option<String> {
    if let Some(query) = req.uri().query() {
        if let Some((_, v)) = pairs(query).find(|(k, _)| k == name) {
            return Some(v);
        }
    }
    if is_json(req) {
        return None;
    }
    let body = std::str::from_utf8(req.body()).ok()?;
    pairs(body).find(|(k, _)| k == name).map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn post(uri: &str, content_type: &str, body: &str) -> Request {
        http::Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(body.as_bytes().to_vec())
            .unwrap()
    }

    #[test]
    fn test_form_body_args() {
        let req = post(
            "/",
            "application/x-www-form-urlencoded",
            "pitch=60&velocity=100&note=C%234+sharp",
        );
        assert_eq!(arg(&req, "pitch").as_deref(), Some("60"));
        assert_eq!(arg(&req, "velocity").as_deref(), Some("100"));
        assert_eq!(arg(&req, "note").as_deref(), Some("C#4 sharp"));
        assert_eq!(arg(&req, "missing"), None);
    }

    #[test]
    fn test_query_args() {
        let req = post("/?pitch=61", "text/plain", "");
        assert_eq!(arg(&req, "pitch").as_deref(), Some("61"));
    }

    #[test]
    fn test_json_body_not_parsed_as_form() {
        let req = post("/", "application/json; charset=utf-8", "pitch=60");
        assert!(is_json(&req));
        assert_eq!(arg(&req, "pitch"), None);
    }

    #[test]
    fn test_decode_json_is_lenient() {
        assert!(decode_json(b"").is_empty());
        assert!(decode_json(b"{not json").is_empty());
        assert!(decode_json(b"[1,2]").is_empty());
        assert_eq!(decode_json(br#"{"a":1}"#)["a"], 1);
    }

    #[test]
    fn test_parse_json_object_is_strict() {
        assert!(parse_json_object(b"").is_err());
        assert!(parse_json_object(b"42").is_err());
        assert!(parse_json_object(b"{}").is_ok());
    }

    #[test]
    fn test_host_header() {
        let req = http::Request::builder()
            .uri("/")
            .header(header::HOST, "192.168.1.1:80")
            .body(Vec::new())
            .unwrap();
        assert_eq!(host_header(&req), "192.168.1.1:80");
        assert_eq!(host_header(&post("/", "text/plain", "")), "");
    }
}
