use crate::model::{OutputConfig, OutputFormat, ProbeResult};
use serde_json::json;
use std::io::{BufWriter, Stdout, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// Writes one record per probed target to stdout, as JSONL for machines or
/// a pretty block for humans. Cloned freely across probe tasks; writes are
/// serialized through the shared writer.
#[derive(Clone)]
pub struct OutputSink {
    cfg: OutputConfig,
    writer: Arc<Mutex<BufWriter<Stdout>>>,
}

impl OutputSink {
    pub fn new(cfg: OutputConfig) -> Self {
        Self {
            cfg,
            writer: Arc::new(Mutex::new(BufWriter::new(std::io::stdout()))),
        }
    }

    pub fn emit(&self, result: &ProbeResult) -> anyhow::Result<()> {
        let mut writer = self.lock();
        match self.cfg.format {
            OutputFormat::Jsonl => {
                writeln!(writer, "{}", render_json(result)?)?;
            }
            OutputFormat::Pretty => {
                write_pretty(&mut *writer, result)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        self.lock().flush()?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BufWriter<Stdout>> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// The emitted object is the raw result plus the derived judgements, so
/// consumers never re-implement the derivation rules.
fn render_json(result: &ProbeResult) -> anyhow::Result<serde_json::Value> {
    let mut value = serde_json::to_value(result)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert("supports_spdy".into(), json!(result.supports_spdy()));
        map.insert("supports_http2".into(), json!(result.supports_http2()));
        map.insert(
            "supports_http_fallback".into(),
            json!(result.supports_http_fallback()),
        );
        map.insert(
            "certificate_valid".into(),
            json!(result.certificate_valid()),
        );
        map.insert("uses_hsts".into(), json!(result.uses_hsts()));
        map.insert("hsts_max_age".into(), json!(result.hsts_max_age()));
    }
    Ok(value)
}

fn write_pretty(writer: &mut impl Write, result: &ProbeResult) -> std::io::Result<()> {
    writeln!(writer, "{}:{} ({})", result.host, result.port, result.timestamp)?;
    writeln!(
        writer,
        "  tcp: {}  tls: {}",
        if result.connectivity_tls { "open" } else { "unreachable" },
        match (&result.speaks_tls, &result.tls_protocol) {
            (true, Some(version)) => version.to_string(),
            (true, None) => "yes".to_string(),
            (false, _) => "no".to_string(),
        }
    )?;
    if result.speaks_tls {
        if result.certificate_valid() {
            writeln!(writer, "  cert: valid")?;
        } else {
            writeln!(writer, "  cert: {:?}", result.cert_errors)?;
        }
        writeln!(
            writer,
            "  npn: [{}]  spdy: {}",
            result.npn_protocols.join(", "),
            result.supports_spdy()
        )?;
        writeln!(
            writer,
            "  alpn: [{}]  http/2: {}",
            result.alpn_protocols.join(", "),
            result.supports_http2()
        )?;
        if result.uses_hsts() {
            writeln!(writer, "  hsts: max-age={}", result.hsts_max_age())?;
        }
    }
    writeln!(
        writer,
        "  http: {}{}",
        if result.connectivity_http { "reachable" } else { "unreachable" },
        if result.redirects_to_tls { ", redirects to tls" } else { "" }
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_includes_derived_fields() {
        let mut result = ProbeResult::new("example.com", 443);
        result.speaks_tls = true;
        result.npn_protocols = vec!["spdy/3.1".into()];
        result.hsts_header = "max-age=600".into();

        let value = render_json(&result).unwrap();
        assert_eq!(value["host"], "example.com");
        assert_eq!(value["supports_spdy"], true);
        assert_eq!(value["supports_http2"], false);
        assert_eq!(value["certificate_valid"], true);
        assert_eq!(value["uses_hsts"], true);
        assert_eq!(value["hsts_max_age"], 600);
    }

    #[test]
    fn pretty_rendering_mentions_the_target() {
        let result = ProbeResult::new("example.com", 443);
        let mut out = Vec::new();
        write_pretty(&mut out, &result).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("example.com:443"));
        assert!(text.contains("tcp: unreachable"));
    }
}
