use crate::wire::TlsVersion;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetSpec {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub target: Option<TargetSpec>,
    pub input: Option<String>,
    pub concurrency: usize,
    pub rate: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub head_timeout: Duration,
    pub overall_timeout: Duration,
    pub offer_alpn: bool,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

#[derive(Clone, Debug, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jsonl,
    Pretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Jsonl => write!(f, "jsonl"),
            OutputFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Classification of a certificate trust problem. A probe may record several
/// at once (a self-signed certificate can also be expired); an empty set
/// means the certificate validated cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertError {
    NotYetActive,
    Expired,
    Generic,
    IncorrectHost,
    SelfSigned,
}

/// Aggregated outcome of one probe. Fields default to false/empty whenever a
/// stage is skipped or fails; nothing is ever left "unknown". Treated as
/// immutable once the evaluator returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub host: String,
    pub port: u16,
    pub timestamp: String,

    pub connectivity_tls: bool,
    pub speaks_tls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_protocol: Option<TlsVersion>,
    pub cert_errors: Vec<CertError>,

    pub has_npn_extension: bool,
    pub npn_protocols: Vec<String>,
    pub has_alpn_extension: bool,
    pub alpn_protocols: Vec<String>,
    pub session_id: String,

    pub tls_server_header: String,
    pub hsts_header: String,

    pub connectivity_http: bool,
    pub http_server_header: String,
    pub redirects_to_tls: bool,
}

impl ProbeResult {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timestamp: crate::util::now_iso8601(),
            connectivity_tls: false,
            speaks_tls: false,
            tls_protocol: None,
            cert_errors: Vec::new(),
            has_npn_extension: false,
            npn_protocols: Vec::new(),
            has_alpn_extension: false,
            alpn_protocols: Vec::new(),
            session_id: String::new(),
            tls_server_header: String::new(),
            hsts_header: String::new(),
            connectivity_http: false,
            http_server_header: String::new(),
            redirects_to_tls: false,
        }
    }

    pub fn supports_spdy(&self) -> bool {
        self.npn_protocols.iter().any(|p| p.contains("spdy"))
    }

    pub fn supports_http2(&self) -> bool {
        self.alpn_protocols.iter().any(|p| p.contains("h2"))
    }

    /// True when the server offers plain HTTP over NPN, so clients that do
    /// not speak SPDY still have a negotiated fallback.
    pub fn supports_http_fallback(&self) -> bool {
        self.npn_protocols
            .iter()
            .any(|p| p.to_lowercase().contains("http"))
    }

    pub fn certificate_valid(&self) -> bool {
        self.cert_errors.is_empty()
    }

    pub fn uses_hsts(&self) -> bool {
        !self.hsts_header.is_empty()
    }

    /// The max-age the HSTS directive is cached for, 0 when the header is
    /// absent or malformed.
    pub fn hsts_max_age(&self) -> u64 {
        static MAX_AGE: OnceLock<Regex> = OnceLock::new();
        let re = MAX_AGE.get_or_init(|| Regex::new(r"(?i)max-age=(\d+)").expect("valid regex"));
        re.captures(&self.hsts_header)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    }
}
