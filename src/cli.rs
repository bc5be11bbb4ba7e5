use crate::model::OutputFormat;
use clap::{ArgAction, Parser};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(author, version, about = "Probes hosts for TLS, certificate health and SPDY/HTTP2 negotiation support", long_about = None)]
pub struct Cli {
    /// Single host to probe
    #[arg(short = 'H', long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// TLS port to probe on the host
    #[arg(short = 'p', long = "port", default_value_t = 443)]
    pub port: u16,

    /// File containing targets (one host[:port] per line)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<String>,

    /// Concurrency limit
    #[arg(long = "concurrency", default_value_t = 8)]
    pub concurrency: usize,

    /// New probes per second (token bucket fill rate)
    #[arg(long = "rate", default_value_t = 8)]
    pub rate: u32,

    /// Connect timeout in milliseconds
    #[arg(long = "connect-timeout", default_value_t = 8000)]
    pub connect_timeout_ms: u64,

    /// Read timeout for handshake responses in milliseconds
    #[arg(long = "read-timeout", default_value_t = 8000)]
    pub read_timeout_ms: u64,

    /// Timeout for HEAD requests in milliseconds
    #[arg(long = "head-timeout", default_value_t = 9000)]
    pub head_timeout_ms: u64,

    /// Overall timeout per target in milliseconds
    #[arg(long = "overall-timeout", default_value_t = 30000)]
    pub overall_timeout_ms: u64,

    /// Offer an ALPN protocol list in the ClientHello in addition to NPN
    #[arg(long = "alpn", action = ArgAction::SetTrue)]
    pub alpn: bool,

    /// Output format
    #[arg(long = "output", default_value_t = OutputFormat::Jsonl)]
    pub output: OutputFormat,
}

impl Cli {
    pub fn into_config(self) -> anyhow::Result<crate::model::Config> {
        if self.host.is_none() && self.input.is_none() {
            anyhow::bail!("either --host or --input is required");
        }

        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be greater than zero");
        }

        if self.rate == 0 {
            anyhow::bail!("rate must be greater than zero");
        }

        let target = self.host.map(|host| crate::model::TargetSpec {
            host,
            port: self.port,
        });

        Ok(crate::model::Config {
            target,
            input: self.input,
            concurrency: self.concurrency,
            rate: self.rate,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            head_timeout: Duration::from_millis(self.head_timeout_ms),
            overall_timeout: Duration::from_millis(self.overall_timeout_ms),
            offer_alpn: self.alpn,
            output: crate::model::OutputConfig {
                format: self.output,
            },
        })
    }
}
