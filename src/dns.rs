//! Wildcard DNS responder for captive-portal resolution.

use std::net::{Ipv4Addr, UdpSocket};

pub const DNS_PORT: u16 = 53;
const DNS_RESPONSE_TTL: u32 = 60;
const QTYPE_A: u16 = 1;
const QCLASS_IN: u16 = 1;

pub trait DnsResponder {
    /// Handle at most one pending query. Returns whether one was answered.
    fn process_pending(&mut self) -> bool;
}

struct DnsQuestion {
    /// Length of the question section
    len: usize,
    qtype: u16,
    name: String,
}

fn parse_dns_question(packet: &[u8]) -> Option<DnsQuestion> {
    if packet.len() < 12 {
        return None;
    }
    // only plain queries
    if packet[2] & 0x80 != 0 {
        return None;
    }

    let mut idx = 12;
    let mut name = String::new();

    loop {
        let label_len = *packet.get(idx)? as usize;
        idx += 1;
        if label_len == 0 {
            break;
        }
        // compression pointers never appear in a question we accept
        if label_len & 0xC0 != 0 || idx + label_len > packet.len() {
            return None;
        }
        let label = std::str::from_utf8(&packet[idx..idx + label_len]).ok()?;
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(label);
        idx += label_len;
    }

    if idx + 4 > packet.len() {
        return None;
    }

    let qtype = u16::from_be_bytes([packet[idx], packet[idx + 1]]);
    idx += 4;

    Some(DnsQuestion {
        len: idx - 12,
        qtype,
        name,
    })
}

/// Answer every A query with `answer_ip`; other types get NOERROR and no
/// records.
fn build_dns_response(query: &[u8], answer_ip: Ipv4Addr, question: &DnsQuestion) -> Vec<u8> {
    let question_end = 12 + question.len;
    let answer = question.qtype == QTYPE_A;

    let mut response = Vec::with_capacity(question_end + 16);
    response.extend_from_slice(&query[0..2]);
    // standard response, recursion desired copied, recursion available
    response.push(0x80 | (query[2] & 0x01));
    response.push(0x80);
    response.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    response.extend_from_slice(&(answer as u16).to_be_bytes()); // ANCOUNT
    response.extend_from_slice(&[0, 0, 0, 0]); // NSCOUNT, ARCOUNT
    response.extend_from_slice(&query[12..question_end]);

    if answer {
        response.extend_from_slice(&[0xC0, 0x0C]); // pointer to question name
        response.extend_from_slice(&QTYPE_A.to_be_bytes());
        response.extend_from_slice(&QCLASS_IN.to_be_bytes());
        response.extend_from_slice(&DNS_RESPONSE_TTL.to_be_bytes());
        response.extend_from_slice(&4u16.to_be_bytes());
        response.extend_from_slice(&answer_ip.octets());
    }

    response
}

pub struct UdpDnsResponder {
    socket: UdpSocket,
    answer_ip: Ipv4Addr,
}

impl UdpDnsResponder {
    pub fn bind(port: u16, answer_ip: Ipv4Addr) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_nonblocking(true)?;
        log::info!("DNS server responding with {}", answer_ip);
        Ok(Self { socket, answer_ip })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }
}

impl DnsResponder for UdpDnsResponder {
    fn process_pending(&mut self) -> bool {
        let mut frame = [0u8; 512];
        let (len, remote) = match self.socket.recv_from(&mut frame) {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return false,
            Err(e) => {
                log::warn!("DNS receive error: {}", e);
                return false;
            }
        };

        let query = &frame[..len];
        let Some(question) = parse_dns_question(query) else {
            log::trace!("Ignoring malformed DNS query");
            return false;
        };

        let response = build_dns_response(query, self.answer_ip, &question);
        if let Err(e) = self.socket.send_to(&response, remote) {
            log::warn!("DNS send error: {}", e);
            return false;
        }

        log::trace!(
            "DNS {} -> {} (qtype {})",
            if question.name.is_empty() {
                "(root)"
            } else {
                question.name.as_str()
            },
            self.answer_ip,
            question.qtype
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn query(name: &str, qtype: u16) -> Vec<u8> {
        let mut q = vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        for label in name.split('.') {
            q.push(label.len() as u8);
            q.extend_from_slice(label.as_bytes());
        }
        q.push(0);
        q.extend_from_slice(&qtype.to_be_bytes());
        q.extend_from_slice(&QCLASS_IN.to_be_bytes());
        q
    }

    #[test]
    fn test_parse_question() {
        let q = query("connectivitycheck.example.com", QTYPE_A);
        let question = parse_dns_question(&q).unwrap();
        assert_eq!(question.name, "connectivitycheck.example.com");
        assert_eq!(question.qtype, QTYPE_A);
        assert_eq!(12 + question.len, q.len());
    }

    #[test]
    fn test_rejects_truncated() {
        let q = query("example.com", QTYPE_A);
        assert!(parse_dns_question(&q[..q.len() - 2]).is_none());
        assert!(parse_dns_question(&q[..8]).is_none());
    }

    #[test]
    fn test_a_answer() {
        let q = query("example.com", QTYPE_A);
        let question = parse_dns_question(&q).unwrap();
        let r = build_dns_response(&q, Ipv4Addr::new(192, 168, 1, 1), &question);
        assert_eq!(&r[0..2], &[0x12, 0x34]);
        assert_eq!(r[2], 0x81);
        assert_eq!(&r[6..8], &[0, 1]);
        assert_eq!(&r[r.len() - 4..], &[192, 168, 1, 1]);
    }

    #[test]
    fn test_other_type_gets_empty_noerror() {
        let q = query("example.com", 28); // AAAA
        let question = parse_dns_question(&q).unwrap();
        let r = build_dns_response(&q, Ipv4Addr::new(192, 168, 1, 1), &question);
        assert_eq!(r[3] & 0x0F, 0);
        assert_eq!(&r[6..8], &[0, 0]);
        assert_eq!(r.len(), q.len());
    }

    #[test]
    fn test_udp_round_trip() {
        let mut dns = UdpDnsResponder::bind(0, Ipv4Addr::new(192, 168, 1, 1)).unwrap();
        assert!(!dns.process_pending());

        let port = dns.local_addr().unwrap().port();
        let client = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        client
            .send_to(&query("captive.apple.com", QTYPE_A), ("127.0.0.1", port))
            .unwrap();

        let mut answered = false;
        for _ in 0..200 {
            if dns.process_pending() {
                answered = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(answered);

        let mut buf = [0u8; 512];
        let (n, _) = client.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[n - 4..n], &[192, 168, 1, 1]);
    }
}
