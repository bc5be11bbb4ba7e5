use super::buffer::ByteAccumulator;
use crate::error::ProbeError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Fixed, broadly-compatible cipher suite list offered in every ClientHello
/// (34 bytes: ChaCha20-Poly1305 and ECDHE suites down to the RSA fallbacks).
const CIPHER_SUITES_HEX: &str =
    "cc14cc13cc15c02bc02f009ec00ac0140039c009c0130033009c0035002f000a00ff";
const CIPHER_SUITES_LEN: u16 = 34;

/// NPN "tickler": type 0x3374 with zero length, advertising client NPN
/// support without listing protocols, per the SPDY-era convention.
const NPN_EXTENSION: [u8; 4] = [0x33, 0x74, 0x00, 0x00];

/// Protocols offered when the optional ALPN extension is enabled. Mirrors
/// what Chrome advertised in the SPDY transition era.
const ALPN_PROTOCOLS: [&str; 4] = ["http/1.1", "spdy/3.1", "h2-14", "h2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsVersion {
    Ssl3,
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Version marker inside the ClientHello body. TLS 1.3 keeps the 1.2
    /// marker on the wire.
    pub fn hello_bytes(self) -> [u8; 2] {
        match self {
            TlsVersion::Ssl3 => [0x03, 0x00],
            TlsVersion::Tls10 => [0x03, 0x01],
            TlsVersion::Tls11 => [0x03, 0x02],
            TlsVersion::Tls12 | TlsVersion::Tls13 => [0x03, 0x03],
        }
    }

    /// Version marker in the outer record header. Only an explicit SSLv3
    /// probe uses the 0x0300 marker; everything else says TLS 1.0.
    pub fn record_bytes(self) -> [u8; 2] {
        match self {
            TlsVersion::Ssl3 => [0x03, 0x00],
            _ => [0x03, 0x01],
        }
    }
}

impl fmt::Display for TlsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TlsVersion::Ssl3 => "SSLv3",
            TlsVersion::Tls10 => "TLSv1.0",
            TlsVersion::Tls11 => "TLSv1.1",
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        };
        write!(f, "{}", label)
    }
}

/// Builds one TLS ClientHello record for `hostname`, network byte order
/// throughout. The record is assembled inside out: extensions first, then
/// each length-prefixed wrapper is prepended once the inner size is known.
pub fn build(hostname: &str, version: TlsVersion, offer_alpn: bool) -> Result<Vec<u8>, ProbeError> {
    let mut acc = ByteAccumulator::new();

    acc.extend(&sni_extension(hostname));
    acc.extend(&NPN_EXTENSION);
    if offer_alpn {
        acc.extend(&alpn_extension());
    }

    // total extensions length
    acc.prepend_u16(acc.len() as u16);

    // one compression method: null
    acc.prepend_hex("0100")?;

    acc.prepend_hex(CIPHER_SUITES_HEX)?;
    acc.prepend_u16(CIPHER_SUITES_LEN);

    // empty session id
    acc.prepend(&[0x00]);

    acc.prepend(&random_bytes());
    acc.prepend(&unix_time_bytes());

    acc.prepend(&version.hello_bytes());

    // handshake header: type 0x01 plus a 3-byte length whose high byte is
    // always zero for messages this small
    acc.prepend_u16(acc.len() as u16);
    acc.prepend_hex("0100")?;

    // outer record header
    acc.prepend_u16(acc.len() as u16);
    let record = version.record_bytes();
    acc.prepend(&[0x16, record[0], record[1]]);

    Ok(acc.to_vec())
}

/// SNI carries the raw ASCII hostname so the server picks the right
/// certificate: type 0x0000, then hostname length plus 5 / plus 3 for the
/// nested list lengths.
fn sni_extension(hostname: &str) -> Vec<u8> {
    let host = hostname.as_bytes();
    let mut acc = ByteAccumulator::with_capacity(host.len() + 9);
    acc.extend(&[0x00, 0x00]);
    acc.extend_u16(host.len() as u16 + 5);
    acc.extend_u16(host.len() as u16 + 3);
    acc.push(0x00);
    acc.extend_u16(host.len() as u16);
    acc.extend(host);
    acc.to_vec()
}

fn alpn_extension() -> Vec<u8> {
    let mut list = ByteAccumulator::new();
    for proto in ALPN_PROTOCOLS {
        list.push(proto.len() as u8);
        list.extend(proto.as_bytes());
    }
    let mut acc = ByteAccumulator::new();
    acc.extend(&[0x00, 0x10]);
    acc.extend_u16(list.len() as u16 + 2);
    acc.extend_u16(list.len() as u16);
    acc.extend(&list.to_vec());
    acc.to_vec()
}

fn unix_time_bytes() -> [u8; 4] {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    secs.to_be_bytes()
}

fn random_bytes() -> [u8; 28] {
    let mut bytes = [0u8; 28];
    rand::thread_rng().fill(&mut bytes);
    bytes
}
