use crate::model::{Config, TargetSpec};
use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const DEFAULT_PORT: u16 = 443;

/// Streams the targets to probe: the single `--host` target, the lines of an
/// `--input` file, or both.
pub fn stream_targets(cfg: &Config) -> anyhow::Result<ReceiverStream<TargetSpec>> {
    let (tx, rx) = mpsc::channel(256);

    if let Some(spec) = cfg.target.clone() {
        let tx = tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(spec).await;
        });
    }

    if let Some(path) = cfg.input.clone() {
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Err(err) = read_file(path, tx).await {
                tracing::error!(error = %err, "failed to read input file");
            }
        });
    }

    drop(tx);
    Ok(ReceiverStream::new(rx))
}

async fn read_file(path: String, tx: mpsc::Sender<TargetSpec>) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("cannot open input {}", path))?;
    let mut reader = BufReader::new(file).lines();
    while let Some(line) = reader.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some(spec) = parse_target(trimmed) {
            tx.send(spec).await.ok();
        } else {
            tracing::warn!(line = %trimmed, "skipping invalid target");
        }
    }
    Ok(())
}

/// A target line is a bare hostname (port defaults to 443) or `host:port`.
/// Bracketed IPv6 literals keep their colons.
fn parse_target(line: &str) -> Option<TargetSpec> {
    if let Some(rest) = line.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(port) => port.parse().ok()?,
            None if tail.is_empty() => DEFAULT_PORT,
            None => return None,
        };
        return Some(TargetSpec {
            host: host.to_string(),
            port,
        });
    }

    match line.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port: u16 = port.parse().ok()?;
            Some(TargetSpec {
                host: host.trim().to_string(),
                port,
            })
        }
        Some(_) => None, // unbracketed IPv6 is ambiguous
        None => Some(TargetSpec {
            host: line.to_string(),
            port: DEFAULT_PORT,
        }),
    }
}
