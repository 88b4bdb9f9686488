//! Ephemeral self-signed identity for TLS termination.
//!
//! A fresh key pair and certificate are generated at every start and held
//! in memory only. Clients must trust the exact certificate to connect.

use std::fmt;
use std::sync::Arc;

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_ECDSA_P256_SHA256,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use time::{Duration, OffsetDateTime};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::error::CryptoError;

/// Default host name for the listener certificate.
pub const DEFAULT_TLS_HOST: &str = "relay.local";

/// Organization written into the certificate subject.
pub const CERT_ORGANIZATION: &str = "relay";

/// Certificate lifetime.
pub const CERT_VALIDITY: Duration = Duration::days(365);

/// In-memory key pair and self-signed certificate.
pub struct CertificateIdentity {
    host: String,
    cert_der: CertificateDer<'static>,
    key_der: PrivatePkcs8KeyDer<'static>,
    not_before: OffsetDateTime,
    not_after: OffsetDateTime,
}

impl CertificateIdentity {
    /// Generate a new identity for `host`.
    ///
    /// The certificate carries `host` as its common name and as its only
    /// DNS name, a random 128-bit serial, and is valid for one year from
    /// now for server authentication.
    pub fn generate(host: &str) -> Result<Self, CryptoError> {
        let key_pair =
            KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(CryptoError::KeyGeneration)?;

        let mut params =
            CertificateParams::new(vec![host.to_string()]).map_err(CryptoError::Params)?;

        let mut serial: [u8; 16] = rand::random();
        // Keep the DER INTEGER positive.
        serial[0] &= 0x7f;
        params.serial_number = Some(SerialNumber::from_slice(&serial));

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, host);
        distinguished_name.push(DnType::OrganizationName, CERT_ORGANIZATION);
        params.distinguished_name = distinguished_name;

        let not_before = OffsetDateTime::now_utc();
        let not_after = not_before + CERT_VALIDITY;
        params.not_before = not_before;
        params.not_after = not_after;

        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![
            KeyUsagePurpose::KeyEncipherment,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let cert = params
            .self_signed(&key_pair)
            .map_err(CryptoError::Signing)?;

        debug!(host, %not_after, "Generated self-signed certificate");

        Ok(Self {
            host: host.to_string(),
            cert_der: cert.der().clone(),
            key_der: PrivatePkcs8KeyDer::from(key_pair.serialize_der()),
            not_before,
            not_after,
        })
    }

    /// Host name the certificate was issued for.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// DER-encoded certificate.
    pub fn cert_der(&self) -> &CertificateDer<'static> {
        &self.cert_der
    }

    /// Start of the validity window.
    pub fn not_before(&self) -> OffsetDateTime {
        self.not_before
    }

    /// End of the validity window.
    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// rustls server configuration presenting this identity.
    pub fn server_config(&self) -> Result<ServerConfig, CryptoError> {
        let provider = rustls::crypto::ring::default_provider();

        let config = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(
                vec![self.cert_der.clone()],
                PrivateKeyDer::Pkcs8(self.key_der.clone_key()),
            )?;

        Ok(config)
    }

    /// TLS acceptor presenting this identity.
    pub fn tls_acceptor(&self) -> Result<TlsAcceptor, CryptoError> {
        Ok(TlsAcceptor::from(Arc::new(self.server_config()?)))
    }
}

impl fmt::Debug for CertificateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateIdentity")
            .field("host", &self.host)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}
