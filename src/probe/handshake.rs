use crate::error::ProbeError;
use crate::probe::connector;
use crate::wire::{client_hello, ByteAccumulator, ServerHello, TlsVersion};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

const RECORD_HEADER_LEN: usize = 5;

/// Sends a hand-built ClientHello and parses the server's first handshake
/// record. This is the probe no platform TLS stack can perform: it reads the
/// raw NPN/ALPN extension bytes out of the ServerHello. Reads run under
/// `read_timeout`; a peer that connects and then goes silent cannot stall
/// the probe.
pub async fn exchange_hellos(
    host: &str,
    port: u16,
    version: TlsVersion,
    offer_alpn: bool,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<ServerHello, ProbeError> {
    let mut stream = connector::connect(host, port, connect_timeout).await?;

    let hello = client_hello::build(host, version, offer_alpn)?;
    stream.write_all(&hello).await?;
    stream.flush().await?;

    let mut header = [0u8; RECORD_HEADER_LEN];
    bounded(read_timeout, stream.read_exact(&mut header)).await??;

    // bytes 3-4 of the record header carry the body length
    let body_len = u16::from_be_bytes([header[3], header[4]]) as usize;

    let mut body = ByteAccumulator::with_capacity(body_len);
    bounded(read_timeout, body.extend_from(&mut stream, body_len)).await??;

    let hello = ServerHello::parse(&body.to_vec())?;
    debug!(
        host,
        port,
        npn = hello.has_npn_extension,
        alpn = hello.has_alpn_extension,
        "exchanged hellos"
    );
    Ok(hello)
}

async fn bounded<F, T>(deadline: Duration, fut: F) -> Result<T, ProbeError>
where
    F: std::future::Future<Output = T>,
{
    timeout(deadline, fut)
        .await
        .map_err(|_| ProbeError::Timeout(deadline))
}
