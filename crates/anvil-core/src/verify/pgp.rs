//! PGP signature verification via the rPGP implementation.

use pgp::composed::{Deserializable, SignedPublicKey, StandaloneSignature};
use tracing::debug;

/// Verify an armored PGP signature over `payload` against an armored public
/// key. Returns `true` only when the key parses, the key's own signatures
/// check out, and the detached signature validates over the payload. Every
/// failure degrades to `false`.
pub fn verify_pgp_signature(payload: &[u8], signature: &str, public_key: &str) -> bool {
    let (key, _) = match SignedPublicKey::from_string(public_key) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(error = %err, "pgp public key failed to parse");
            return false;
        }
    };

    if let Err(err) = key.verify() {
        debug!(error = %err, "pgp public key failed self-verification");
        return false;
    }

    let (sig, _) = match StandaloneSignature::from_string(signature) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(error = %err, "pgp signature failed to parse");
            return false;
        }
    };

    sig.verify(&key, payload).is_ok()
}
