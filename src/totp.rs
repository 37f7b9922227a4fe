use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::EngineError;

/// RFC 4648 Base32 alphabet
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Length of one TOTP time window in seconds
pub const TIME_STEP_SECONDS: u64 = 30;

const CODE_MODULUS: u32 = 1_000_000;

/// Generate the 6-digit TOTP code for `secret` at `time`.
///
/// The secret is upper-cased and stripped of spaces before decoding. Any
/// character outside the Base32 alphabet is rejected with
/// [`EngineError::InvalidSecret`]. Instants before the epoch count as step 0.
pub fn generate(secret: &str, time: SystemTime) -> Result<String, EngineError> {
    let unix_seconds = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    generate_at(secret, unix_seconds)
}

/// Generate the code for the current system time
pub fn generate_now(secret: &str) -> Result<String, EngineError> {
    generate(secret, SystemTime::now())
}

/// Generate the code for a Unix timestamp in seconds
pub fn generate_at(secret: &str, unix_seconds: u64) -> Result<String, EngineError> {
    let key = decode_base32(secret)?;
    let counter = unix_seconds / TIME_STEP_SECONDS;

    // HMAC accepts keys of any length, so construction cannot fail
    let mut mac = <Hmac<Sha1> as Mac>::new_from_slice(&key)
        .map_err(|e| EngineError::InvalidSecret(e.to_string()))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);

    Ok(format!("{:06}", binary % CODE_MODULUS))
}

/// Seconds left before the code for `unix_seconds` rolls over
pub fn seconds_remaining(unix_seconds: u64) -> u64 {
    TIME_STEP_SECONDS - unix_seconds % TIME_STEP_SECONDS
}

/// Decode a Base32 secret, dropping trailing bits that do not fill a byte
fn decode_base32(secret: &str) -> Result<Vec<u8>, EngineError> {
    let normalized: String = secret
        .chars()
        .filter(|c| *c != ' ')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let mut bytes = Vec::with_capacity(normalized.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for c in normalized.chars() {
        let value = BASE32_ALPHABET
            .iter()
            .position(|&b| char::from(b) == c)
            .ok_or_else(|| EngineError::InvalidSecret(format!("invalid Base32 character: {c}")))?;

        buffer = (buffer << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            bytes.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// "12345678901234567890" from RFC 6238 Appendix B, Base32 encoded
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_rfc6238_reference_vectors() {
        // Low six digits of the published 8-digit SHA1 codes
        let vectors = [
            (59, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
            (20_000_000_000, "353130"),
        ];

        for (time, expected) in vectors {
            assert_eq!(generate_at(RFC_SECRET, time).unwrap(), expected, "t={time}");
        }
    }

    #[test]
    fn test_common_demo_secret() {
        let at = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(generate("JBSWY3DPEHPK3PXP", at).unwrap(), "324550");
        assert_eq!(generate_at("JBSWY3DPEHPK3PXP", 59).unwrap(), "996554");
    }

    #[test]
    fn test_secret_is_normalized() {
        let expected = generate_at("JBSWY3DPEHPK3PXP", 1_234_567_890).unwrap();
        assert_eq!(
            generate_at("jbsw y3dp ehpk 3pxp", 1_234_567_890).unwrap(),
            expected
        );
    }

    #[test]
    fn test_same_window_same_code() {
        let first = generate_at(RFC_SECRET, 1_111_111_110).unwrap();
        let last = generate_at(RFC_SECRET, 1_111_111_139).unwrap();
        assert_eq!(first, last);
    }

    #[test]
    fn test_invalid_character_is_named() {
        let err = generate_at("JBSWY3DPEHPK3PX1", 0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSecret(_)));
        assert!(err.to_string().contains('1'));

        let err = generate_at("ABC=", 0).unwrap_err();
        assert!(err.to_string().contains('='));
    }

    #[test]
    fn test_decode_base32() {
        assert_eq!(decode_base32("JBSWY3DP").unwrap(), b"Hello");
        assert_eq!(decode_base32("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_seconds_remaining() {
        assert_eq!(seconds_remaining(0), 30);
        assert_eq!(seconds_remaining(59), 1);
        assert_eq!(seconds_remaining(61), 29);
    }

    #[test]
    fn test_codes_are_six_digits() {
        for t in (0..3000).step_by(30) {
            let code = generate_at(RFC_SECRET, t).unwrap();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
