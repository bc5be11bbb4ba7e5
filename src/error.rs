use std::time::Duration;

/// Failures the probe stages can report. The evaluator converts every one of
/// these into absent/false capability flags; nothing here escapes a probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// TCP connect failed outright (resolution failure, refusal, ...).
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// A deadline-bounded phase did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The response bytes do not match the expected ServerHello shape.
    #[error("malformed handshake response: {0}")]
    ProtocolFormat(&'static str),

    /// A hex digit string could not be decoded.
    #[error("invalid hex input: {0}")]
    Hex(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
