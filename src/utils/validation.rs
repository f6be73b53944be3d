//! Checksum helpers and artifact sanity limits.

/// Maximum number of genes accepted from a single artifact (DOS protection).
pub const MAX_GENES: usize = 100_000;

/// Maximum number of alleles accepted from a single artifact (DOS protection).
pub const MAX_ALLELES: usize = 1_000_000;

/// Validate that a string is a valid MD5 checksum (32 hex characters).
///
/// # Examples
///
/// ```
/// use vdjc_lib::utils::validation::is_valid_md5;
///
/// assert!(is_valid_md5("6aef897c3d6ff0c78aff06ac189178dd"));
/// assert!(!is_valid_md5("not-an-md5"));
/// assert!(!is_valid_md5("6aef897c3d6ff0c78aff06ac189178d")); // 31 chars
/// ```
#[must_use]
pub fn is_valid_md5(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// MD5 digest of `bytes` as lowercase hex.
///
/// Library versions are content signatures: the canonical serialization of
/// a snapshot's genes is digested so that equal content always yields the
/// same version id.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    let digest = md5::compute(bytes);
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hex() {
        // Well-known digest of the empty input.
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert!(is_valid_md5(&md5_hex(b"ACGT")));
    }

    #[test]
    fn test_md5_hex_deterministic() {
        assert_eq!(md5_hex(b"TRBV12-3"), md5_hex(b"TRBV12-3"));
        assert_ne!(md5_hex(b"TRBV12-3"), md5_hex(b"TRBV12-4"));
    }

    #[test]
    fn test_is_valid_md5_rejects_uppercase_mix() {
        assert!(is_valid_md5("ABCDEF0123456789abcdef0123456789"));
        assert!(!is_valid_md5("zzcdef0123456789abcdef0123456789"));
    }
}
