//! Opening transports: plain TCP or TLS over TCP.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use pin_project_lite::pin_project;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig as TlsConfig, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::Url;

use crate::Error;

/// A bidirectional byte stream a connection can run on.
pub trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Io for T {}

pub type BoxedIo = Box<dyn Io>;

/// What connections are pooled by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Certificates are verified; only meaningful for `https`.
    pub verify_tls: bool,
}

impl ConnectionKey {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self { scheme: scheme.into(), host: host.into(), port, verify_tls: true }
    }

    pub fn from_url(url: &Url, verify_tls: bool) -> Result<Self, Error> {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(Error::invalid_url(url, format!("unsupported scheme {scheme}")));
        }
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(|| Error::invalid_url(url, "missing host"))?;
        let port = url.port_or_known_default().ok_or_else(|| Error::invalid_url(url, "missing port"))?;

        Ok(Self { scheme: scheme.to_string(), host: host.to_string(), port, verify_tls })
    }

    pub fn is_tls(&self) -> bool {
        self.scheme == "https"
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Opens transports for the pool.
///
/// Implement this to run the client over something other than TCP, such as
/// in-memory pipes in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, key: &ConnectionKey) -> io::Result<BoxedIo>;
}

/// TCP, wrapped in TLS for `https`.
pub struct TcpConnector {
    connect_timeout: Duration,
    verified: Arc<TlsConfig>,
    unverified: Arc<TlsConfig>,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        let verified = TlsConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(rustls_platform_verifier::Verifier::new()))
            .with_no_client_auth();
        let unverified = TlsConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier::new()))
            .with_no_client_auth();

        Self { connect_timeout, verified: Arc::new(verified), unverified: Arc::new(unverified) }
    }

    /// Uses `config` for verified TLS connections instead of the platform
    /// verifier.
    #[must_use]
    pub fn with_tls_config(mut self, config: Arc<TlsConfig>) -> Self {
        self.verified = config;
        self
    }
}

impl fmt::Debug for TcpConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnector").field("connect_timeout", &self.connect_timeout).finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, key: &ConnectionKey) -> io::Result<BoxedIo> {
        let addr = format!("{}:{}", key.host.trim_start_matches('[').trim_end_matches(']'), key.port);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_elapsed| io::Error::new(io::ErrorKind::TimedOut, format!("connect to {key} timed out")))??;
        stream.set_nodelay(true)?;
        debug!(%key, "tcp connected");

        if !key.is_tls() {
            return Ok(Box::new(stream));
        }

        let config = if key.verify_tls { Arc::clone(&self.verified) } else { Arc::clone(&self.unverified) };
        let server_name = ServerName::try_from(key.host.trim_start_matches('[').trim_end_matches(']').to_string())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let tls_stream = TlsConnector::from(config).connect(server_name, stream).await?;
        debug!(%key, verify = key.verify_tls, "tls handshake complete");
        Ok(Box::new(tls_stream))
    }
}

/// Accepts any certificate; used when `require_ssl_verification` is off.
/// Handshake signatures are still checked.
#[derive(Debug)]
struct NoVerifier(Arc<CryptoProvider>);

impl NoVerifier {
    fn new() -> Self {
        Self(Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
    }
}

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// When bytes last moved on a connection.
#[derive(Debug)]
pub struct Activity {
    last: Mutex<Instant>,
}

impl Activity {
    pub fn new() -> Self {
        Self { last: Mutex::new(Instant::now()) }
    }

    pub fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn last(&self) -> Instant {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

pin_project! {
    /// Transport wrapper recording read activity, so a watchdog can tell a
    /// slow response from a stalled one.
    pub struct Tracked<IO> {
        #[pin]
        inner: IO,
        activity: Arc<Activity>,
    }
}

impl<IO> Tracked<IO> {
    pub fn new(inner: IO, activity: Arc<Activity>) -> Self {
        Self { inner, activity }
    }
}

impl<IO: AsyncRead> AsyncRead for Tracked<IO> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);
        if matches!(result, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            this.activity.touch();
        }
        result
    }
}

impl<IO: AsyncWrite> AsyncWrite for Tracked<IO> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
