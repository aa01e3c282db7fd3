//! Pairing-code format and the scannable payload.
//!
//! Codes are 8 characters from an unambiguous uppercase alphabet (no
//! `0/O` or `1/I/L`) so they survive manual transcription. For
//! camera-based transfer the same code is wrapped in a fixed-prefix
//! payload: `PFPAIR:<code>`. The payload carries no checksum — the
//! parser only validates prefix, length, and alphabet.

use rand::RngCore;

/// Characters a pairing code may contain: uppercase minus `I`/`O`,
/// digits minus `0`/`1`. Exactly 32 symbols, so a byte masked to 5 bits
/// indexes it uniformly.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Pairing-code length in characters.
pub const CODE_LEN: usize = 8;

/// Prefix of the scannable (QR) payload.
pub const SCAN_PREFIX: &str = "PFPAIR:";

/// Generate a fresh pairing code from the OS CSPRNG.
pub fn generate_code() -> String {
    let mut bytes = [0u8; CODE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| CODE_ALPHABET[(b & 0x1f) as usize] as char)
        .collect()
}

/// Wrap a code in the scannable payload shown in the admin console.
pub fn scan_payload(code: &str) -> String {
    format!("{SCAN_PREFIX}{code}")
}

/// Normalize scanner or keyboard input down to a bare code.
///
/// Accepts either the raw code or the full `PFPAIR:` payload, trims
/// whitespace, and rejects anything that is not plain alphanumeric of a
/// plausible length (camera OCR garbage, empty scans).
pub fn normalize_scanned(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let code = trimmed.strip_prefix(SCAN_PREFIX).unwrap_or(trimmed);
    if code.len() < 6 || code.len() > 32 {
        return None;
    }
    if !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_uses_alphabet() {
        let code = generate_code();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn generated_codes_differ() {
        assert_ne!(generate_code(), generate_code());
    }

    #[test]
    fn scan_payload_round_trips() {
        let payload = scan_payload("AB12CD34");
        assert_eq!(payload, "PFPAIR:AB12CD34");
        assert_eq!(normalize_scanned(&payload).as_deref(), Some("AB12CD34"));
    }

    #[test]
    fn normalize_accepts_bare_code_and_whitespace() {
        assert_eq!(normalize_scanned(" AB12CD34 ").as_deref(), Some("AB12CD34"));
    }

    #[test]
    fn normalize_accepts_shorter_codes() {
        assert_eq!(normalize_scanned("PFPAIR:AB12CD").as_deref(), Some("AB12CD"));
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(normalize_scanned("").is_none());
        assert!(normalize_scanned("PFPAIR:").is_none());
        assert!(normalize_scanned("short").is_none());
        assert!(normalize_scanned("PFPAIR:AB12 CD34").is_none());
        assert!(normalize_scanned("https://example.com/?x=1").is_none());
    }
}
