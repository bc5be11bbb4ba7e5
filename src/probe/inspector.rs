use crate::model::CertError;
use crate::probe::connector;
use crate::wire::TlsVersion;
use openssl::asn1::Asn1Time;
use openssl::nid::Nid;
use openssl::ssl::{Ssl, SslConnector, SslMethod, SslRef, SslVerifyMode, SslVersion};
use openssl::x509::{X509NameRef, X509Ref};
use std::cmp::Ordering;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tokio_openssl::SslStream;
use tracing::{debug, warn};

/// What a full platform TLS handshake revealed about a host.
#[derive(Debug, Clone, Default)]
pub struct Inspection {
    pub connectivity_works: bool,
    pub speaks_tls: bool,
    pub protocol: Option<TlsVersion>,
    pub cert_errors: Vec<CertError>,
}

/// Connects and performs one TLS handshake as a client. The verify hook
/// accepts every certificate so inspection completes regardless of trust
/// outcome, but stages a classification for each problem the platform
/// reports. The hook can run on a different thread of control than the
/// caller, so its findings go into a mutex-guarded staging list that is only
/// merged into the result after the handshake call has returned.
pub async fn inspect(
    host: &str,
    port: u16,
    connect_timeout: Duration,
    handshake_timeout: Duration,
) -> Inspection {
    let mut inspection = Inspection::default();

    let stream = match connector::connect(host, port, connect_timeout).await {
        Ok(stream) => stream,
        Err(err) => {
            debug!(host, port, error = %err, "tcp connect failed");
            return inspection;
        }
    };
    inspection.connectivity_works = true;

    let staging: Arc<Mutex<Vec<CertError>>> = Arc::new(Mutex::new(Vec::new()));
    let ssl = match configure_ssl(host, staging.clone()) {
        Ok(ssl) => ssl,
        Err(err) => {
            warn!(host, error = %err, "failed to configure TLS connector");
            return inspection;
        }
    };

    let mut tls_stream = match SslStream::new(ssl, stream) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(host, error = %err, "failed to initialize TLS stream");
            return inspection;
        }
    };

    match timeout(handshake_timeout, Pin::new(&mut tls_stream).connect()).await {
        Ok(Ok(())) => {
            inspection.speaks_tls = true;
            inspection.protocol = negotiated_version(tls_stream.ssl());
            let staged = lock_staging(&staging);
            inspection.cert_errors = staged.clone();
        }
        Ok(Err(err)) => {
            // a socket-layer failure means the TCP path itself is broken;
            // anything else is an open connection that does not speak TLS
            if err.io_error().is_some() {
                inspection.connectivity_works = false;
            }
            debug!(host, port, error = %err, "tls handshake failed");
        }
        Err(_) => {
            debug!(host, port, "tls handshake timed out");
        }
    }

    inspection
}

fn configure_ssl(host: &str, staging: Arc<Mutex<Vec<CertError>>>) -> anyhow::Result<Ssl> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    let hook_host = host.to_string();
    builder.set_verify_callback(SslVerifyMode::PEER, move |preverify_ok, ctx| {
        if !preverify_ok {
            // classify the leaf, which is what the operator cares about; the
            // certificate data is only borrowed for the span of this call
            let leaf = ctx.chain().and_then(|chain| chain.get(0));
            if let Some(cert) = leaf.or_else(|| ctx.current_cert()) {
                let facts = CertFacts::from_cert(cert);
                let mut staged = lock_staging(&staging);
                classify(&hook_host, &facts, &mut staged);
            }
        }
        // always accept so the handshake completes and inspection can finish
        true
    });

    let ssl = builder.build().configure()?.into_ssl(host)?;
    Ok(ssl)
}

fn lock_staging(staging: &Mutex<Vec<CertError>>) -> std::sync::MutexGuard<'_, Vec<CertError>> {
    match staging.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The bits of a certificate the classifier needs, copied out so nothing
/// borrowed from the verify context outlives the callback.
#[derive(Debug, Clone, Default)]
struct CertFacts {
    subject_cn: String,
    issuer_cn: String,
    not_yet_active: bool,
    expired: bool,
}

impl CertFacts {
    fn from_cert(cert: &X509Ref) -> Self {
        let now = Asn1Time::days_from_now(0).ok();
        let not_yet_active = now
            .as_deref()
            .map(|now| matches!(now.compare(cert.not_before()), Ok(Ordering::Less)))
            .unwrap_or(false);
        let expired = now
            .as_deref()
            .map(|now| matches!(now.compare(cert.not_after()), Ok(Ordering::Greater)))
            .unwrap_or(false);

        CertFacts {
            subject_cn: common_name(cert.subject_name()),
            issuer_cn: common_name(cert.issuer_name()),
            not_yet_active,
            expired,
        }
    }
}

/// Normalized (lowercased) common name, empty when the certificate has none.
fn common_name(name: &X509NameRef) -> String {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|cn| cn.to_lowercase())
        .unwrap_or_default()
}

/// Applies the classification rules independently; several may match for one
/// certificate. Only falls back to Generic when nothing has been staged yet.
fn classify(host: &str, facts: &CertFacts, staged: &mut Vec<CertError>) {
    if facts.subject_cn != host.to_lowercase() {
        record(staged, CertError::IncorrectHost);
    }
    if facts.subject_cn == facts.issuer_cn {
        record(staged, CertError::SelfSigned);
    }
    if facts.not_yet_active {
        record(staged, CertError::NotYetActive);
    } else if facts.expired {
        record(staged, CertError::Expired);
    }
    if staged.is_empty() {
        record(staged, CertError::Generic);
    }
}

// The verify hook fires once per chain element, so the same classification
// can be attempted more than once.
fn record(staged: &mut Vec<CertError>, error: CertError) {
    if !staged.contains(&error) {
        staged.push(error);
    }
}

fn negotiated_version(ssl: &SslRef) -> Option<TlsVersion> {
    let version = ssl.version2()?;
    if version == SslVersion::SSL3 {
        Some(TlsVersion::Ssl3)
    } else if version == SslVersion::TLS1 {
        Some(TlsVersion::Tls10)
    } else if version == SslVersion::TLS1_1 {
        Some(TlsVersion::Tls11)
    } else if version == SslVersion::TLS1_2 {
        Some(TlsVersion::Tls12)
    } else if version == SslVersion::TLS1_3 {
        Some(TlsVersion::Tls13)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(subject: &str, issuer: &str) -> CertFacts {
        CertFacts {
            subject_cn: subject.into(),
            issuer_cn: issuer.into(),
            not_yet_active: false,
            expired: false,
        }
    }

    #[test]
    fn wrong_host_and_self_issued_accumulate() {
        let mut staged = Vec::new();
        classify("example.com", &facts("other.com", "other.com"), &mut staged);
        assert!(staged.contains(&CertError::IncorrectHost));
        assert!(staged.contains(&CertError::SelfSigned));
        assert_eq!(staged.len(), 2);
    }

    #[test]
    fn matching_host_is_not_incorrect() {
        let mut staged = Vec::new();
        classify("Example.COM", &facts("example.com", "some ca"), &mut staged);
        assert!(!staged.contains(&CertError::IncorrectHost));
    }

    #[test]
    fn expired_cert_is_flagged() {
        let mut staged = Vec::new();
        let mut f = facts("example.com", "some ca");
        f.expired = true;
        classify("example.com", &f, &mut staged);
        assert_eq!(staged, vec![CertError::Expired]);
    }

    #[test]
    fn not_yet_active_wins_over_expired() {
        let mut staged = Vec::new();
        let mut f = facts("example.com", "some ca");
        f.not_yet_active = true;
        f.expired = true;
        classify("example.com", &f, &mut staged);
        assert_eq!(staged, vec![CertError::NotYetActive]);
    }

    #[test]
    fn clean_facts_with_reported_error_fall_back_to_generic() {
        let mut staged = Vec::new();
        classify("example.com", &facts("example.com", "some ca"), &mut staged);
        assert_eq!(staged, vec![CertError::Generic]);
    }

    #[test]
    fn repeated_hook_invocations_do_not_duplicate() {
        let mut staged = Vec::new();
        let f = facts("other.com", "other.com");
        classify("example.com", &f, &mut staged);
        classify("example.com", &f, &mut staged);
        assert_eq!(staged.len(), 2);
    }

    #[tokio::test]
    async fn closed_port_means_no_connectivity() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let inspection = inspect(
            "127.0.0.1",
            port,
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
        .await;
        assert!(!inspection.connectivity_works);
        assert!(!inspection.speaks_tls);
        assert!(inspection.cert_errors.is_empty());
    }

    #[tokio::test]
    async fn non_tls_listener_connects_but_does_not_speak_tls() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(b"220 not a tls server\r\n").await;
            }
        });

        let inspection = inspect(
            "127.0.0.1",
            port,
            Duration::from_millis(500),
            Duration::from_millis(1000),
        )
        .await;
        assert!(inspection.connectivity_works);
        assert!(!inspection.speaks_tls);
        assert!(inspection.protocol.is_none());
    }
}
