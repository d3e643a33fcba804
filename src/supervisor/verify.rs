//! Pre-flight domain verification
//!
//! Before a run starts, the supervisor checks that the domain resolves and
//! accepts TCP connections. A domain that fails either check is never crawled.
//! The certificate served on the TLS port is inspected as well; a failed
//! handshake only leaves the certificate fields empty.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;

/// Outcome of verifying one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub domain: String,
    pub dns_ok: bool,
    pub socket_ok: bool,

    /// Certificate issuer, when the verifier inspects TLS
    pub tls_issuer: Option<String>,

    /// Certificate expiry, when the verifier inspects TLS
    pub tls_expiry: Option<DateTime<Utc>>,
}

impl VerificationReport {
    /// A run may start only if both checks passed
    pub fn is_reachable(&self) -> bool {
        self.dns_ok && self.socket_ok
    }
}

/// Checks that a domain can be crawled at all
#[async_trait]
pub trait DomainVerifier: Send + Sync {
    async fn verify(&self, domain: &str, port: u16) -> VerificationReport;
}

/// Issuer and expiry of a server's leaf certificate
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateInfo {
    /// Organization of the issuer, else its common name
    pub issuer: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

/// Reads issuer and expiry from a DER-encoded certificate
pub fn parse_certificate(der: &[u8]) -> Option<CertificateInfo> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;

    let issuer = cert.issuer();
    let issuer = issuer
        .iter_organization()
        .chain(issuer.iter_common_name())
        .find_map(|attr| attr.as_str().ok())
        .map(str::to_string);
    let expiry = Utc
        .timestamp_opt(cert.validity().not_after.timestamp(), 0)
        .single();

    Some(CertificateInfo { issuer, expiry })
}

fn tls_connector() -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Verifier that resolves the domain, opens a TCP connection, and reads the
/// certificate served on the TLS port
#[derive(Clone)]
pub struct NetworkVerifier {
    timeout: Duration,
    tls_port: u16,
    connector: TlsConnector,
}

impl NetworkVerifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            tls_port: 443,
            connector: tls_connector(),
        }
    }

    /// Inspects certificates on `port` instead of 443
    pub fn with_tls_port(mut self, port: u16) -> Self {
        self.tls_port = port;
        self
    }

    /// Performs a TLS handshake and reads the leaf certificate
    ///
    /// Returns `None` when the handshake fails, times out, or the server sends
    /// no certificate.
    pub async fn inspect_certificate(&self, domain: &str) -> Option<CertificateInfo> {
        let server_name = match ServerName::try_from(domain) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!("No TLS server name for {}: {}", domain, e);
                return None;
            }
        };

        let handshake = async {
            let tcp = TcpStream::connect((domain, self.tls_port)).await?;
            let stream = self.connector.connect(server_name, tcp).await?;
            Ok::<_, std::io::Error>(stream)
        };

        let stream = match tokio::time::timeout(self.timeout, handshake).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::debug!("TLS handshake with {} failed: {}", domain, e);
                return None;
            }
            Err(_) => {
                tracing::debug!("TLS handshake with {} timed out", domain);
                return None;
            }
        };

        let (_, session) = stream.get_ref();
        let leaf = session.peer_certificates()?.first()?;
        parse_certificate(&leaf.0)
    }
}

impl Default for NetworkVerifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl DomainVerifier for NetworkVerifier {
    async fn verify(&self, domain: &str, port: u16) -> VerificationReport {
        let mut report = VerificationReport {
            domain: domain.to_string(),
            dns_ok: false,
            socket_ok: false,
            tls_issuer: None,
            tls_expiry: None,
        };

        let addrs: Vec<_> =
            match tokio::time::timeout(self.timeout, lookup_host((domain, port))).await {
                Ok(Ok(addrs)) => addrs.collect(),
                Ok(Err(e)) => {
                    tracing::warn!("DNS lookup for {} failed: {}", domain, e);
                    return report;
                }
                Err(_) => {
                    tracing::warn!("DNS lookup for {} timed out", domain);
                    return report;
                }
            };

        report.dns_ok = !addrs.is_empty();

        for addr in addrs {
            match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => {
                    report.socket_ok = true;
                    break;
                }
                Ok(Err(e)) => tracing::debug!("Connect to {} failed: {}", addr, e),
                Err(_) => tracing::debug!("Connect to {} timed out", addr),
            }
        }

        if report.socket_ok {
            if let Some(cert) = self.inspect_certificate(domain).await {
                report.tls_issuer = cert.issuer;
                report.tls_expiry = cert.expiry;
            }
        }

        report
    }
}
