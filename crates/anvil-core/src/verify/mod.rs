//! Commit signature verification.
//!
//! Verification never fails ingestion: every error path in this module
//! degrades to `false` and the commit is recorded with
//! `SignatureStatus::Invalid`. The external-tool dependency (ssh-keygen)
//! sits behind the [`SignatureVerifier`] trait so tests can inject a
//! fixed-result fake instead of requiring the real binary.

pub mod pgp;
pub mod ssh;

use async_trait::async_trait;

use crate::domain::{SignatureBlock, SignatureKind, SigningKey};

/// Verifies a signature block over a commit's signed payload.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Returns whether the signature validates against the key for the given
    /// principal (the author email for SSH allow-list purposes). Never
    /// errors; unverifiable input is simply `false`.
    async fn verify(
        &self,
        payload: &[u8],
        signature: &SignatureBlock,
        key: &SigningKey,
        principal: &str,
    ) -> bool;
}

/// Production verifier dispatching on the signature kind.
#[derive(Debug, Default)]
pub struct ToolVerifier;

impl ToolVerifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SignatureVerifier for ToolVerifier {
    async fn verify(
        &self,
        payload: &[u8],
        signature: &SignatureBlock,
        key: &SigningKey,
        principal: &str,
    ) -> bool {
        match signature.kind {
            SignatureKind::Ssh => {
                ssh::verify_ssh_signature(payload, &signature.armored, &key.public_key, principal)
                    .await
            }
            SignatureKind::Pgp => {
                pgp::verify_pgp_signature(payload, &signature.armored, &key.public_key)
            }
        }
    }
}

/// Test verifier returning a fixed result regardless of input.
#[derive(Debug, Clone, Copy)]
pub struct FixedVerifier {
    pub result: bool,
}

impl FixedVerifier {
    pub fn accepting() -> Self {
        Self { result: true }
    }

    pub fn rejecting() -> Self {
        Self { result: false }
    }
}

#[async_trait]
impl SignatureVerifier for FixedVerifier {
    async fn verify(
        &self,
        _payload: &[u8],
        _signature: &SignatureBlock,
        _key: &SigningKey,
        _principal: &str,
    ) -> bool {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignatureBlock;

    #[tokio::test]
    async fn fixed_verifier_returns_configured_result() {
        let block = SignatureBlock::from_armored("-----BEGIN SSH SIGNATURE-----\nx");
        let key = SigningKey {
            fingerprint: "SHA256:zzz".to_string(),
            public_key: "ssh-ed25519 AAAA".to_string(),
        };
        assert!(
            FixedVerifier::accepting()
                .verify(b"payload", &block, &key, "a@x.com")
                .await
        );
        assert!(
            !FixedVerifier::rejecting()
                .verify(b"payload", &block, &key, "a@x.com")
                .await
        );
    }
}
