//! RSA-SHA256 signing context built once from the configured trust material.

use crate::config::SigningConfig;
use crate::error::SignatureError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::Path;

const SELF_TEST_MESSAGE: &[u8] = b"<Data><Header><MsgId>SELF-TEST</MsgId></Header></Data>";

/// RSA-PKCS1v15 over SHA-256, base64-encoded.
pub fn sign(message: &[u8], key: &RsaPrivateKey) -> Result<String, SignatureError> {
    let signing_key = SigningKey::<Sha256>::new(key.clone());
    let signature = signing_key
        .try_sign(message)
        .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;
    Ok(STANDARD.encode(signature.to_bytes()))
}

/// Returns `false` for any mismatch, including undecodable signatures.
pub fn verify(message: &[u8], signature_b64: &str, key: &RsaPublicKey) -> bool {
    let compact: String = signature_b64.split_whitespace().collect();
    let Ok(raw) = STANDARD.decode(compact) else {
        return false;
    };
    let Ok(signature) = Signature::try_from(raw.as_slice()) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(key.clone())
        .verify(message, &signature)
        .is_ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified,
    /// Verification is switched off; the document was not checked.
    Skipped,
    Rejected,
}

/// Immutable signing material shared by every request for the life of the process.
pub struct SigningContext {
    private_key: Option<RsaPrivateKey>,
    own_key: Option<RsaPublicKey>,
    peer_key: Option<RsaPublicKey>,
    verify_signatures: bool,
}

impl SigningContext {
    pub fn new(
        private_key: Option<RsaPrivateKey>,
        own_key: Option<RsaPublicKey>,
        peer_key: Option<RsaPublicKey>,
    ) -> Self {
        Self {
            private_key,
            own_key,
            peer_key,
            verify_signatures: true,
        }
    }

    /// A context with no material at all; every signing call fails.
    pub fn empty() -> Self {
        Self::new(None, None, None)
    }

    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_signatures = enabled;
        self
    }

    /// Loads the trust material named in `config`.
    ///
    /// Never fails: problems are logged and the affected piece is left out, so the process
    /// still starts and signing fails per request instead.
    pub fn load(config: &SigningConfig) -> Self {
        let private_key = match load_private_key(&config.private_key_path) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::error!(path = %config.private_key_path.display(), error = %e, "private key not loaded");
                None
            }
        };

        let own_key = match load_public_key(&config.certificate_path) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::error!(path = %config.certificate_path.display(), error = %e, "certificate not loaded");
                None
            }
        };

        let peer_key = config
            .counterparty_certificate_path
            .as_deref()
            .and_then(|path| match load_public_key(path) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "counterparty certificate not loaded");
                    None
                }
            });

        let private_key = private_key.filter(|key| {
            let public = own_key.clone().unwrap_or_else(|| RsaPublicKey::from(key));
            let passed = sign(SELF_TEST_MESSAGE, key)
                .map(|sig| verify(SELF_TEST_MESSAGE, &sig, &public))
                .unwrap_or(false);
            if !passed {
                tracing::error!("private key does not match the configured certificate, signing disabled");
            }
            passed
        });

        if !config.verify_signatures {
            tracing::warn!("inbound signature verification is DISABLED");
        }
        tracing::info!(
            can_sign = private_key.is_some(),
            has_peer_certificate = peer_key.is_some(),
            "trust material loaded"
        );

        Self {
            private_key,
            own_key,
            peer_key,
            verify_signatures: config.verify_signatures,
        }
    }

    pub fn can_sign(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn verification_enabled(&self) -> bool {
        self.verify_signatures
    }

    pub fn sign(&self, message: &[u8]) -> Result<String, SignatureError> {
        let key = self.private_key.as_ref().ok_or_else(|| {
            SignatureError::MaterialUnavailable("private key not loaded".to_string())
        })?;
        sign(message, key)
    }

    /// Checks an inbound document body against the counterparty key.
    pub fn verify_inbound(
        &self,
        message: &[u8],
        signature_b64: Option<&str>,
    ) -> Result<VerificationOutcome, SignatureError> {
        if !self.verify_signatures {
            tracing::warn!("signature check skipped: verification disabled");
            return Ok(VerificationOutcome::Skipped);
        }
        let signature = signature_b64
            .filter(|s| !s.trim().is_empty())
            .ok_or(SignatureError::MissingSignature)?;
        let key = self
            .peer_key
            .as_ref()
            .or(self.own_key.as_ref())
            .ok_or_else(|| {
                SignatureError::MaterialUnavailable("no certificate to verify against".to_string())
            })?;
        if verify(message, signature, key) {
            Ok(VerificationOutcome::Verified)
        } else {
            Ok(VerificationOutcome::Rejected)
        }
    }
}

fn load_private_key(path: &Path) -> Result<RsaPrivateKey, SignatureError> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| SignatureError::MaterialUnavailable(format!("{}: {e}", path.display())))?;
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|e| SignatureError::InvalidKey(e.to_string()))
}

/// Reads an X.509 certificate PEM, or a bare public key PEM, and returns its RSA key.
fn load_public_key(path: &Path) -> Result<RsaPublicKey, SignatureError> {
    let bytes = std::fs::read(path)
        .map_err(|e| SignatureError::MaterialUnavailable(format!("{}: {e}", path.display())))?;
    let (_, pem) = x509_parser::pem::parse_x509_pem(&bytes)
        .map_err(|e| SignatureError::InvalidKey(format!("not a PEM file: {e}")))?;

    if pem.label == "CERTIFICATE" {
        let cert = pem
            .parse_x509()
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
        if !cert.validity().is_valid() {
            return Err(SignatureError::InvalidKey(format!(
                "certificate {} is outside its validity window",
                path.display()
            )));
        }
        RsaPublicKey::from_public_key_der(cert.public_key().raw)
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))
    } else {
        RsaPublicKey::from_public_key_der(&pem.contents)
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))
    }
}
