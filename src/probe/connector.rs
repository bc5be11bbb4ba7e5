use crate::error::ProbeError;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Opens a TCP connection to `host:port` under a hard wall-clock deadline,
/// independent of the platform's own connect timeout. Dropping the timed-out
/// connect future tears down the in-flight attempt; nothing is leaked or
/// retried. All state is per call, so concurrent connects to different hosts
/// cannot observe each other.
pub async fn connect(host: &str, port: u16, deadline: Duration) -> Result<TcpStream, ProbeError> {
    match timeout(deadline, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => Err(ProbeError::Connect(err)),
        Err(_) => Err(ProbeError::Timeout(deadline)),
    }
}
