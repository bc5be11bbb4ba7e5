use crate::model::{Config, ProbeResult, TargetSpec};
use crate::probe::head::HeadRequestor;
use crate::probe::{handshake, inspector};
use crate::wire::TlsVersion;
use tracing::{debug, warn};

/// Runs every probe stage against one target and aggregates the outcome.
/// Stages execute sequentially; each failure is folded into absent/false
/// flags, so a result always comes back.
pub async fn evaluate(spec: &TargetSpec, cfg: &Config) -> ProbeResult {
    let host = spec.host.as_str();
    let mut result = ProbeResult::new(host, spec.port);

    let inspection = inspector::inspect(
        host,
        spec.port,
        cfg.connect_timeout,
        cfg.read_timeout,
    )
    .await;
    result.connectivity_tls = inspection.connectivity_works;
    result.speaks_tls = inspection.speaks_tls;
    result.tls_protocol = inspection.protocol;

    let requestor = match HeadRequestor::new(cfg.head_timeout) {
        Ok(requestor) => Some(requestor),
        Err(err) => {
            warn!(error = %err, "failed to build head requestor");
            None
        }
    };

    if inspection.speaks_tls {
        result.cert_errors = inspection.cert_errors;

        // probe the TLS port for NPN/ALPN support at the negotiated version
        let version = inspection.protocol.unwrap_or(TlsVersion::Tls12);
        match handshake::exchange_hellos(
            host,
            spec.port,
            version,
            cfg.offer_alpn,
            cfg.connect_timeout,
            cfg.read_timeout,
        )
        .await
        {
            Ok(hello) => {
                result.has_npn_extension = hello.has_npn_extension;
                result.npn_protocols = hello.npn_protocols;
                result.has_alpn_extension = hello.has_alpn_extension;
                result.alpn_protocols = hello.alpn_protocols;
                result.session_id = hello.session_id;
            }
            Err(err) => {
                debug!(host, port = spec.port, error = %err, "handshake probe failed");
            }
        }

        // the TLS site's headers tell us the server software and HSTS policy
        if let Some(requestor) = &requestor {
            if let Some(response) = requestor
                .head(&format!("https://{}:{}/", host, spec.port))
                .await
            {
                result.tls_server_header = response.header("server");
                result.hsts_header = response.header("strict-transport-security");
            }
        }
    }

    // always see what a plain request to port 80 does
    if let Some(requestor) = &requestor {
        if let Some(response) = requestor.head(&format!("http://{}/", host)).await {
            result.connectivity_http = true;

            if result.speaks_tls {
                result.redirects_to_tls = redirects_to_tls(host, &response.final_url);
            } else {
                // no TLS endpoint, so the plain server header is the only
                // hint about what the host is running
                result.http_server_header = response.header("server");
            }
        }
    }

    result
}

/// A port-80 request counts as redirected to TLS when it lands on an https
/// URL whose host contains the probed hostname.
fn redirects_to_tls(host: &str, final_url: &url::Url) -> bool {
    final_url.scheme() == "https"
        && final_url
            .host_str()
            .map(|h| h.to_lowercase().contains(&host.to_lowercase()))
            .unwrap_or(false)
}
