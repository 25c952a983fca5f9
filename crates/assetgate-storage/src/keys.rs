//! Object key validation and URL encoding shared by all adapters.

use assetgate_core::ChecksumAlgorithm;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::traits::{StorageError, StorageResult};

/// Longest key accepted by every supported provider
pub const MAX_KEY_BYTES: usize = 1024;

/// RFC 3986 unreserved characters stay literal, everything else is escaped.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const PATH_ENCODE: &AsciiSet = &QUERY_ENCODE.remove(b'/');

/// Reject keys that would escape their prefix or that providers refuse.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key is empty".to_string()));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(StorageError::InvalidKey(format!(
            "key exceeds {} bytes",
            MAX_KEY_BYTES
        )));
    }
    if key.starts_with('/') {
        return Err(StorageError::InvalidKey(
            "key must not start with '/'".to_string(),
        ));
    }
    if key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(
            "key must not contain '..' segments".to_string(),
        ));
    }
    if key.chars().any(char::is_control) {
        return Err(StorageError::InvalidKey(
            "key must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// Percent-encode a key for use in a URL path, keeping `/` separators.
pub fn encode_path(key: &str) -> String {
    utf8_percent_encode(key, PATH_ENCODE).to_string()
}

/// Percent-encode a query component (name or value).
pub fn encode_query(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ENCODE).to_string()
}

fn digest_len(algorithm: ChecksumAlgorithm) -> usize {
    match algorithm {
        ChecksumAlgorithm::Md5 => 16,
        ChecksumAlgorithm::Crc32 | ChecksumAlgorithm::Crc32c => 4,
        ChecksumAlgorithm::Sha1 => 20,
        ChecksumAlgorithm::Sha256 => 32,
    }
}

/// Checksums travel as base64 of the raw digest; reject anything a provider
/// would refuse at upload time.
pub fn validate_checksum(algorithm: ChecksumAlgorithm, value: &str) -> StorageResult<()> {
    let digest = STANDARD.decode(value.trim()).map_err(|_| {
        StorageError::invalid_request(
            "checksums",
            format!("{} checksum is not valid base64", algorithm),
        )
    })?;
    if digest.len() != digest_len(algorithm) {
        return Err(StorageError::invalid_request(
            "checksums",
            format!(
                "{} checksum decodes to {} bytes, expected {}",
                algorithm,
                digest.len(),
                digest_len(algorithm)
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksums_must_be_base64_digests() {
        assert!(validate_checksum(ChecksumAlgorithm::Md5, "Ojk9c3dhfxgoKVVHYwFbHQ==").is_ok());
        assert!(validate_checksum(ChecksumAlgorithm::Crc32c, "yZRlqg==").is_ok());
        assert!(validate_checksum(ChecksumAlgorithm::Md5, "not base64!").is_err());
        // Valid base64, wrong digest length
        assert!(validate_checksum(ChecksumAlgorithm::Sha256, "Ojk9c3dhfxgoKVVHYwFbHQ==").is_err());
    }

    #[test]
    fn rejects_traversal_and_absolute_keys() {
        assert!(validate_key("a/b/c.png").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/a").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a\nb").is_err());
        // dots inside a segment are fine
        assert!(validate_key("a/..b/c").is_ok());
    }

    #[test]
    fn encodes_like_sigv4() {
        assert_eq!(encode_path("dir/my file+1.png"), "dir/my%20file%2B1.png");
        assert_eq!(encode_query("a/b c"), "a%2Fb%20c");
        assert_eq!(encode_query("~-_."), "~-_.");
    }
}
