//! Secret fingerprints.
//!
//! Client secrets and bearer tokens are only ever rendered as a short
//! digest so that two log lines can be correlated without exposing the value.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Length of the rendered fingerprint, in base64 characters.
const FINGERPRINT_LEN: usize = 12;

/// Render a one-way fingerprint of `secret`.
///
/// Empty secrets render as `<unset>` so a missing value stays visible.
pub fn fingerprint(secret: &str) -> String {
    if secret.is_empty() {
        return "<unset>".to_string();
    }

    let digest = Sha256::digest(secret.as_bytes());
    let mut encoded = STANDARD_NO_PAD.encode(digest);
    encoded.truncate(FINGERPRINT_LEN);
    format!("sha256:{}", encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_hides_secret() {
        let fp = fingerprint("super-secret-token");
        assert!(fp.starts_with("sha256:"));
        assert!(!fp.contains("super-secret-token"));
        assert_eq!(fp.len(), "sha256:".len() + FINGERPRINT_LEN);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }

    #[test]
    fn test_fingerprint_empty() {
        assert_eq!(fingerprint(""), "<unset>");
    }
}
