use crate::error::ProbeError;
use crate::util::hex;

const SERVER_HELLO_TYPE: u8 = 0x02;
const EXT_NPN: u16 = 0x3374;
const EXT_ALPN: u16 = 0x0010;

// Fixed body offsets. Valid only because our ClientHello omits the
// extensions (session tickets, renegotiation-info) that would shift the
// server's response layout; this is a narrow-purpose probe, not a general
// TLS decoder.
const OFFSET_VERSION: usize = 4;
const OFFSET_SESSION_ID_LEN: usize = 38;
const OFFSET_EXTENSIONS: usize = 42;

/// The first ServerHello record of a handshake, reduced to the fields the
/// probe cares about. Constructed once per handshake attempt.
#[derive(Debug, Clone, Default)]
pub struct ServerHello {
    pub version_major: u8,
    pub version_minor: u8,
    pub session_id: String,
    pub has_npn_extension: bool,
    pub npn_protocols: Vec<String>,
    pub has_alpn_extension: bool,
    pub alpn_protocols: Vec<String>,
}

/// Outcome of one extension-walk step, so graceful degradation on truncated
/// input is explicit rather than an artifact of caught panics.
enum WalkStep {
    Parsed { next: usize },
    Truncated,
}

impl ServerHello {
    pub fn supports_spdy(&self) -> bool {
        self.npn_protocols.iter().any(|p| p.contains("spdy"))
    }

    pub fn supports_http2(&self) -> bool {
        self.alpn_protocols.iter().any(|p| p.contains("h2"))
    }

    /// Parses a raw ServerHello body (the bytes after the 5-byte record
    /// header). A non-ServerHello first byte is an error; a body truncated
    /// anywhere past that returns whatever was fully parsed before the
    /// truncation point.
    pub fn parse(body: &[u8]) -> Result<ServerHello, ProbeError> {
        match body.first() {
            Some(&SERVER_HELLO_TYPE) => {}
            Some(_) => {
                return Err(ProbeError::ProtocolFormat(
                    "first handshake message is not a ServerHello",
                ))
            }
            None => return Err(ProbeError::ProtocolFormat("empty handshake body")),
        }
        if body.len() <= OFFSET_VERSION + 1 {
            return Err(ProbeError::ProtocolFormat("ServerHello too short"));
        }

        let mut hello = ServerHello {
            version_major: body[OFFSET_VERSION],
            version_minor: body[OFFSET_VERSION + 1],
            ..ServerHello::default()
        };

        let session_id_len = match body.get(OFFSET_SESSION_ID_LEN) {
            Some(&len) => len as usize,
            None => return Ok(hello),
        };
        if session_id_len > 0 {
            match body.get(OFFSET_SESSION_ID_LEN + 1..OFFSET_SESSION_ID_LEN + 1 + session_id_len) {
                Some(id) => hello.session_id = hex::encode(id),
                None => return Ok(hello),
            }
        }

        let ext_base = OFFSET_EXTENSIONS + session_id_len;
        let ext_total = match read_u16(body, ext_base) {
            Some(len) => len as usize,
            None => return Ok(hello),
        };
        if ext_total == 0 {
            return Ok(hello);
        }

        // walk [2-byte type][2-byte length][data] records until the declared
        // region or the buffer runs out
        let region_end = (ext_base + 2 + ext_total).min(body.len());
        let mut offset = ext_base + 2;
        while offset < region_end {
            match walk_extension(body, offset, &mut hello) {
                WalkStep::Parsed { next } => offset = next,
                WalkStep::Truncated => break,
            }
        }

        Ok(hello)
    }
}

fn walk_extension(body: &[u8], offset: usize, hello: &mut ServerHello) -> WalkStep {
    let ext_type = match read_u16(body, offset) {
        Some(t) => t,
        None => return WalkStep::Truncated,
    };
    let data_len = match read_u16(body, offset + 2) {
        Some(len) => len as usize,
        None => return WalkStep::Truncated,
    };
    let data = match body.get(offset + 4..offset + 4 + data_len) {
        Some(data) => data,
        None => return WalkStep::Truncated,
    };

    match ext_type {
        EXT_NPN => {
            hello.has_npn_extension = true;
            hello.npn_protocols = parse_protocol_list(data);
        }
        EXT_ALPN => {
            // ALPN repeats the list length in a redundant 2-byte prefix;
            // skip it and consume the rest.
            if data_len >= 2 {
                hello.has_alpn_extension = true;
                hello.alpn_protocols = parse_protocol_list(&data[2..]);
            }
        }
        _ => {}
    }

    WalkStep::Parsed {
        next: offset + 4 + data_len,
    }
}

/// A protocol list is `[1-byte length][ASCII name]` repeated until the data
/// is consumed. A name running past the end is dropped, not an error.
fn parse_protocol_list(data: &[u8]) -> Vec<String> {
    let mut protocols = Vec::new();
    let mut curr = 0usize;
    while curr < data.len() {
        let name_len = data[curr] as usize;
        match data.get(curr + 1..curr + 1 + name_len) {
            Some(name) => protocols.push(String::from_utf8_lossy(name).into_owned()),
            None => break,
        }
        curr += 1 + name_len;
    }
    protocols
}

fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::buffer::ByteAccumulator;

    fn hello_body(session_id: &[u8], extensions: &[u8]) -> Vec<u8> {
        let mut acc = ByteAccumulator::new();
        acc.push(0x02);
        // uint24 handshake length, unchecked by the parser
        acc.extend(&[0x00, 0x00, 0x00]);
        acc.extend(&[0x03, 0x03]);
        acc.extend(&[0u8; 32]); // server random
        acc.push(session_id.len() as u8);
        acc.extend(session_id);
        // cipher suite + compression method
        acc.extend(&[0xc0, 0x2f, 0x00]);
        if !extensions.is_empty() {
            acc.extend_u16(extensions.len() as u16);
            acc.extend(extensions);
        }
        acc.to_vec()
    }

    fn npn_extension(names: &[&str]) -> Vec<u8> {
        let mut list = ByteAccumulator::new();
        for name in names {
            list.push(name.len() as u8);
            list.extend(name.as_bytes());
        }
        let mut acc = ByteAccumulator::new();
        acc.extend_u16(0x3374);
        acc.extend_u16(list.len() as u16);
        acc.extend(&list.to_vec());
        acc.to_vec()
    }

    fn alpn_extension(names: &[&str]) -> Vec<u8> {
        let mut list = ByteAccumulator::new();
        for name in names {
            list.push(name.len() as u8);
            list.extend(name.as_bytes());
        }
        let mut acc = ByteAccumulator::new();
        acc.extend_u16(0x0010);
        acc.extend_u16(list.len() as u16 + 2);
        acc.extend_u16(list.len() as u16);
        acc.extend(&list.to_vec());
        acc.to_vec()
    }

    #[test]
    fn rejects_non_server_hello() {
        // an alert body, for instance
        let err = ServerHello::parse(&[0x15, 0x03, 0x03]).unwrap_err();
        assert!(matches!(err, ProbeError::ProtocolFormat(_)));
    }

    #[test]
    fn parses_version_and_empty_session_id() {
        let body = hello_body(&[], &[]);
        let hello = ServerHello::parse(&body).unwrap();
        assert_eq!(hello.version_major, 3);
        assert_eq!(hello.version_minor, 3);
        assert_eq!(hello.session_id, "");
        assert!(!hello.has_npn_extension);
        assert!(!hello.has_alpn_extension);
    }

    #[test]
    fn captures_session_id_as_hex() {
        let body = hello_body(&[0xde, 0xad, 0xbe, 0xef], &[]);
        let hello = ServerHello::parse(&body).unwrap();
        assert_eq!(hello.session_id, "deadbeef");
    }

    #[test]
    fn extracts_npn_protocols_in_order() {
        let ext = npn_extension(&["spdy/3.1", "http/1.1"]);
        let body = hello_body(&[], &ext);
        let hello = ServerHello::parse(&body).unwrap();
        assert!(hello.has_npn_extension);
        assert_eq!(hello.npn_protocols, vec!["spdy/3.1", "http/1.1"]);
        assert!(hello.supports_spdy());
    }

    #[test]
    fn spdy_requires_a_spdy_name() {
        let ext = npn_extension(&["http/1.1"]);
        let body = hello_body(&[], &ext);
        let hello = ServerHello::parse(&body).unwrap();
        assert!(hello.has_npn_extension);
        assert!(!hello.supports_spdy());

        let empty = ServerHello::default();
        assert!(!empty.supports_spdy());
    }

    #[test]
    fn alpn_skips_the_redundant_sub_length() {
        let ext = alpn_extension(&["h2", "http/1.1"]);
        let body = hello_body(&[], &ext);
        let hello = ServerHello::parse(&body).unwrap();
        assert!(hello.has_alpn_extension);
        assert_eq!(hello.alpn_protocols, vec!["h2", "http/1.1"]);
        assert!(hello.supports_http2());
    }

    #[test]
    fn walks_past_unknown_extensions() {
        let mut exts = ByteAccumulator::new();
        // renegotiation_info, one data byte
        exts.extend(&[0xff, 0x01, 0x00, 0x01, 0x00]);
        exts.extend(&npn_extension(&["spdy/3"]));
        let body = hello_body(&[0xaa], &exts.to_vec());
        let hello = ServerHello::parse(&body).unwrap();
        assert_eq!(hello.session_id, "aa");
        assert_eq!(hello.npn_protocols, vec!["spdy/3"]);
    }

    #[test]
    fn truncated_bodies_never_panic() {
        let ext = npn_extension(&["spdy/3.1", "http/1.1"]);
        let full = hello_body(&[0xde, 0xad], &ext);
        for cut in 1..full.len() {
            // every prefix must either parse or fail cleanly
            let _ = ServerHello::parse(&full[..cut]);
        }
    }

    #[test]
    fn truncated_extension_region_keeps_what_parsed() {
        let mut exts = ByteAccumulator::new();
        exts.extend(&npn_extension(&["spdy/3.1"]));
        exts.extend(&alpn_extension(&["h2"]));
        let body = hello_body(&[], &exts.to_vec());

        // cut inside the ALPN extension's data
        let cut = body.len() - 2;
        let hello = ServerHello::parse(&body[..cut]).unwrap();
        assert!(hello.has_npn_extension);
        assert_eq!(hello.npn_protocols, vec!["spdy/3.1"]);
        assert!(!hello.has_alpn_extension);
    }

    #[test]
    fn declared_region_bounds_the_walk() {
        let ext = npn_extension(&["spdy/3.1"]);
        let mut body = hello_body(&[], &ext);
        // trailing garbage past the declared extensions region
        body.extend_from_slice(&[0x33, 0x74, 0x00, 0xff]);
        let hello = ServerHello::parse(&body).unwrap();
        assert_eq!(hello.npn_protocols, vec!["spdy/3.1"]);
    }
}
