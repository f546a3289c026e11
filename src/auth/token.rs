//! HMAC signing for session cookies and persisted session records.

use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Signs opaque values with the configured session signing key.
///
/// The signer is cheap to clone; it only holds the derived key bytes.
#[derive(Clone)]
pub struct TokenSigner {
    mac: HmacSha256,
}

impl TokenSigner {
    #[must_use]
    pub fn new(signing_key: &SecretString) -> Self {
        // HMAC accepts keys of any length, so this cannot fail.
        let mac = HmacSha256::new_from_slice(signing_key.expose_secret().as_bytes())
            .expect("HMAC accepts keys of any length");
        Self { mac }
    }

    fn mac(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }

    /// Produce `<value>.<hex mac>` for the session cookie.
    #[must_use]
    pub fn sign(&self, value: &str) -> String {
        let mac = self.mac(value.as_bytes());
        format!("{value}.{}", hex_encode(&mac))
    }

    /// Recover the signed value, or `None` when the signature does not
    /// verify. An invalid signature is indistinguishable from a missing
    /// value to the caller.
    #[must_use]
    pub fn unsign(&self, signed: &str) -> Option<String> {
        let (value, sig_hex) = signed.rsplit_once('.')?;
        let presented = hex_decode(sig_hex)?;
        let expected = self.mac(value.as_bytes());
        if constant_time_eq(&presented, &expected) {
            Some(value.to_string())
        } else {
            None
        }
    }

    /// Sign a serialized record for at-rest storage:
    /// `base64(payload).hex(mac)`.
    #[must_use]
    pub fn seal(&self, payload: &[u8]) -> String {
        let body = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload);
        let mac = self.mac(body.as_bytes());
        format!("{body}.{}", hex_encode(&mac))
    }

    /// Verify and decode a sealed record. Tampered or truncated input
    /// yields `None`.
    #[must_use]
    pub fn open(&self, sealed: &str) -> Option<Vec<u8>> {
        let (body, sig_hex) = sealed.trim_end().rsplit_once('.')?;
        let presented = hex_decode(sig_hex)?;
        let expected = self.mac(body.as_bytes());
        if !constant_time_eq(&presented, &expected) {
            return None;
        }
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(body)
            .ok()
    }
}

/// Constant-time equality for tokens and MACs.
///
/// Length is not secret here; only the comparison over equal-length bytes
/// must not short-circuit.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::new(), |mut acc, byte| {
        let _ = write!(acc, "{byte:02x}");
        acc
    })
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(&SecretString::from(
            "0123456789abcdef0123456789abcdef".to_string(),
        ))
    }

    #[test]
    fn sign_round_trip() {
        let signer = signer();
        let signed = signer.sign("session-id");
        assert_eq!(signer.unsign(&signed), Some("session-id".to_string()));
    }

    #[test]
    fn unsign_rejects_tampered_value() {
        let signer = signer();
        let signed = signer.sign("session-id");
        let tampered = signed.replacen("session", "sessiom", 1);
        assert_eq!(signer.unsign(&tampered), None);
    }

    #[test]
    fn unsign_rejects_tampered_signature() {
        let signer = signer();
        let mut signed = signer.sign("session-id");
        let last = signed.pop().map_or('0', |c| if c == '0' { '1' } else { '0' });
        signed.push(last);
        assert_eq!(signer.unsign(&signed), None);
    }

    #[test]
    fn unsign_rejects_missing_separator() {
        assert_eq!(signer().unsign("no-separator-here"), None);
    }

    #[test]
    fn different_keys_do_not_verify() {
        let other = TokenSigner::new(&SecretString::from(
            "fedcba9876543210fedcba9876543210".to_string(),
        ));
        let signed = signer().sign("session-id");
        assert_eq!(other.unsign(&signed), None);
    }

    #[test]
    fn seal_round_trip() {
        let signer = signer();
        let sealed = signer.seal(b"{\"remember\":true}");
        assert_eq!(signer.open(&sealed), Some(b"{\"remember\":true}".to_vec()));
    }

    #[test]
    fn open_rejects_bit_flip() {
        let signer = signer();
        let sealed = signer.seal(b"payload");
        let mut bytes = sealed.into_bytes();
        bytes[0] ^= 0x01;
        let flipped = String::from_utf8(bytes).expect("still utf8");
        assert_eq!(signer.open(&flipped), None);
    }

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
