//! Self-signed certificate lifecycle.
//!
//! [`SelfSignedProvider`] owns a P-256 signing key generated once at
//! construction and the currently valid leaf certificate built from it.
//! The handshake-time accessor [`SelfSignedProvider::current`] lazily
//! re-issues the leaf once its validity window has elapsed: the root key is
//! stable across rotations, only the leaf certificate and its serial number
//! change. The provider implements [`ResolvesServerCert`] so it can be
//! installed directly as the per-handshake certificate callback of a rustls
//! server configuration.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SerialNumber, PKCS_ECDSA_P256_SHA256,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::{CertifiedKey, SigningKey};
use time::OffsetDateTime;

/// Subject organization written into every issued certificate.
pub const CERT_ORGANIZATION: &str = "Embers Service";

/// Certificate lifecycle errors.
///
/// `KeyGeneration` and `CertificateBuild` are fatal at construction: the
/// provider is never returned partially initialized. `Handshake` is scoped
/// to a single accessor call during steady-state rotation; the previous
/// certificate stays in place and the next handshake retries.
#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("Failed to generate signing key: {0}")]
    KeyGeneration(String),

    #[error("Failed to build certificate: {0}")]
    CertificateBuild(String),

    #[error("Cannot supply certificate for handshake: {0}")]
    Handshake(String),
}

/// How long issued certificates live, plus advisory clock-skew slack.
#[derive(Debug, Clone, Copy)]
pub struct RotationConfig {
    /// Validity window of each issued certificate, measured from its
    /// issuance instant.
    pub time_to_live: Duration,
    /// Advisory slack for peers judging a certificate around a rotation
    /// boundary. The provider never extends its own expiry arithmetic by
    /// this amount; it is exposed through [`SelfSignedProvider::wiggle_room`]
    /// for client-side tolerance only.
    pub wiggle_room: Duration,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            time_to_live: Duration::from_secs(3600),
            wiggle_room: Duration::from_secs(600),
        }
    }
}

/// Point-in-time view of the active certificate, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct CertificateSnapshot {
    /// Serial number, strictly increasing across rotations, starting at 1.
    pub serial: u64,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    /// DER encoding of the active certificate.
    pub cert_der: CertificateDer<'static>,
}

/// The certificate currently served to handshakes. Replaced as a whole
/// under the provider lock; never mutated in place.
struct ActiveCertificate {
    certified: Arc<CertifiedKey>,
    snapshot: CertificateSnapshot,
}

/// Owns the root key material and the active self-signed certificate,
/// regenerating the certificate on first use after expiry.
pub struct SelfSignedProvider {
    // Root key material: generated once, read-only afterwards.
    key_pair: KeyPair,
    signing_key: Arc<dyn SigningKey>,
    config: RotationConfig,
    state: Mutex<ActiveCertificate>,
}

impl std::fmt::Debug for SelfSignedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("SelfSignedProvider")
            .field("serial", &snapshot.serial)
            .field("not_before", &snapshot.not_before)
            .field("not_after", &snapshot.not_after)
            .field("config", &self.config)
            .finish()
    }
}

impl SelfSignedProvider {
    /// Generates fresh P-256 root key material and issues the first
    /// certificate synchronously.
    ///
    /// Fails fast: on error no provider is returned, and a caller that
    /// requested TLS must abort startup rather than fall back to plain
    /// serving.
    pub fn new(config: RotationConfig) -> Result<Self, CertificateError> {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;
        Self::from_key_pair(key_pair, config)
    }

    /// Builds a provider around an existing key pair.
    ///
    /// The key pair must be ECDSA P-256; anything else is rejected as a
    /// key-generation failure.
    pub fn from_key_pair(
        key_pair: KeyPair,
        config: RotationConfig,
    ) -> Result<Self, CertificateError> {
        if !key_pair.is_compatible(&PKCS_ECDSA_P256_SHA256) {
            return Err(CertificateError::KeyGeneration(
                "signing key is not ECDSA P-256".to_string(),
            ));
        }

        let key_der = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let signing_key = rustls::crypto::aws_lc_rs::sign::any_supported_type(&key_der)
            .map_err(|e| CertificateError::KeyGeneration(e.to_string()))?;

        let first = issue(&key_pair, signing_key.clone(), 1, config.time_to_live)?;

        Ok(Self {
            key_pair,
            signing_key,
            config,
            state: Mutex::new(first),
        })
    }

    /// Returns the certificate to present for a handshake, regenerating it
    /// first if the validity window has elapsed.
    ///
    /// Exactly one regeneration runs per expiry event: callers racing an
    /// expiry serialize on the provider lock, and every caller observes
    /// either the pre-rotation or post-rotation certificate. A failed
    /// regeneration is returned to this caller only; the previous
    /// certificate stays in place and the next call retries.
    pub fn current(&self) -> Result<Arc<CertifiedKey>, CertificateError> {
        let lock_start = Instant::now();
        let mut state = self.state.lock().expect("certificate state lock poisoned");

        if OffsetDateTime::now_utc() >= state.snapshot.not_after {
            let gen_start = Instant::now();
            let serial = state.snapshot.serial + 1;

            let next = issue(
                &self.key_pair,
                self.signing_key.clone(),
                serial,
                self.config.time_to_live,
            )
            .map_err(|e| {
                CertificateError::Handshake(format!("certificate rotation failed: {e}"))
            })?;

            tracing::debug!(
                serial,
                dur_seconds = gen_start.elapsed().as_secs_f64(),
                dur_with_lock_seconds = lock_start.elapsed().as_secs_f64(),
                not_before = %next.snapshot.not_before,
                not_after = %next.snapshot.not_after,
                "Service certificate regeneration complete"
            );

            *state = next;
        }

        Ok(state.certified.clone())
    }

    /// Snapshot of the active certificate's serial and validity window.
    pub fn snapshot(&self) -> CertificateSnapshot {
        self.state
            .lock()
            .expect("certificate state lock poisoned")
            .snapshot
            .clone()
    }

    /// Advisory clock-skew slack configured for this provider. Informs
    /// client-side acceptance tolerance only; it never moves the expiry
    /// used for regeneration.
    pub fn wiggle_room(&self) -> Duration {
        self.config.wiggle_room
    }

    /// The rotation configuration supplied at construction.
    pub fn rotation_config(&self) -> RotationConfig {
        self.config
    }
}

impl ResolvesServerCert for SelfSignedProvider {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        match self.current() {
            Ok(certified) => Some(certified),
            Err(err) => {
                // Fails this handshake only; the accept loop keeps running.
                tracing::error!(error = %err, "No certificate available for TLS handshake");
                None
            }
        }
    }
}

/// Issues a self-signed leaf with the given serial, valid from now for
/// `ttl`, signed by the provider's root key.
fn issue(
    key_pair: &KeyPair,
    signing_key: Arc<dyn SigningKey>,
    serial: u64,
    ttl: Duration,
) -> Result<ActiveCertificate, CertificateError> {
    let not_before = OffsetDateTime::now_utc();
    let not_after = not_before
        + time::Duration::try_from(ttl)
            .map_err(|e| CertificateError::CertificateBuild(e.to_string()))?;

    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, CERT_ORGANIZATION);
    params.distinguished_name = dn;

    // CA certificate acting as its own leaf: no SANs, so clients must skip
    // verification or pin the certificate explicitly.
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    params.serial_number = Some(SerialNumber::from(serial));
    params.not_before = not_before;
    params.not_after = not_after;

    let cert = params
        .self_signed(key_pair)
        .map_err(|e| CertificateError::CertificateBuild(e.to_string()))?;

    let cert_der = cert.der().clone();
    let certified = Arc::new(CertifiedKey::new(vec![cert_der.clone()], signing_key));

    Ok(ActiveCertificate {
        certified,
        snapshot: CertificateSnapshot {
            serial,
            not_before,
            not_after,
            cert_der,
        },
    })
}
