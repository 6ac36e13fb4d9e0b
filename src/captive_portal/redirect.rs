//! Unmatched requests: connectivity-check redirect or plain 404.

use crate::web::Reply;

/// True when every character is a digit or a dot. An empty host counts.
pub fn is_ip(s: &str) -> bool {
    s.chars().all(|c| c == '.' || c.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalDecision {
    NotFound,
    Redirect(String),
}

/// `own` is the device's `address:port`. A non-IP host that is not the
/// device itself is an OS connectivity check and gets bounced to the portal.
pub fn decide(host: &str, own: &str) -> PortalDecision {
    if !is_ip(host) && host != own {
        PortalDecision::Redirect(format!("http://{}", own))
    } else {
        PortalDecision::NotFound
    }
}

pub fn handle_not_found(host: &str, own: &str, verbose: bool) -> Reply {
    match decide(host, own) {
        PortalDecision::Redirect(location) => {
            crate::verbose!(verbose, "Unknown URL: {}", host);
            // empty body means no length header, so the socket is closed for the client
            Reply::redirect(&location)
        }
        PortalDecision::NotFound => Reply::not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{header, StatusCode};

    const OWN: &str = "192.168.1.1:80";

    #[test]
    fn test_is_ip() {
        assert!(is_ip("10.0.0.5"));
        assert!(is_ip(""));
        assert!(!is_ip("192.168.1.1:80"));
        assert!(!is_ip("captive.apple.com"));
    }

    #[test]
    fn test_same_origin_is_404() {
        assert_eq!(decide("192.168.1.1:80", OWN), PortalDecision::NotFound);
        let reply = handle_not_found("192.168.1.1:80", OWN, false);
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
        assert_eq!(reply.body(), b"File Not Found");
        assert!(!reply.close);
    }

    #[test]
    fn test_connectivity_check_is_redirected() {
        assert_eq!(
            decide("connectivitycheck.example.com", OWN),
            PortalDecision::Redirect("http://192.168.1.1:80".to_string())
        );
        let reply = handle_not_found("connectivitycheck.example.com", OWN, true);
        assert_eq!(reply.status(), StatusCode::FOUND);
        assert_eq!(reply.header(header::LOCATION), Some("http://192.168.1.1:80"));
        assert!(reply.body().is_empty());
        assert!(reply.close);
    }

    #[test]
    fn test_foreign_ip_is_404() {
        assert_eq!(decide("10.0.0.5", OWN), PortalDecision::NotFound);
    }
}
