//! Validated SHA-256 hash values and local content hashing.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest;
use tokio::io::AsyncReadExt;

use crate::types::{Result, VerdictError};

const HASH_HEX_LEN: usize = 64;
const READ_CHUNK: usize = 64 * 1024;

/// A SHA-256 hash in lowercase hexadecimal form.
///
/// Construction validates the 64-hex-digit shape, so a `Sha256` can be put on
/// the wire without further checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256(String);

impl Sha256 {
    /// Hash an in-memory buffer
    pub fn digest(data: &[u8]) -> Self {
        Self(hex::encode(sha2::Sha256::digest(data)))
    }

    /// Hash the file at `path` without loading it into memory at once
    pub async fn hash_file(path: &Path) -> Result<Self> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = sha2::Sha256::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(value: &str) -> bool {
        value.len() == HASH_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl TryFrom<&str> for Sha256 {
    type Error = VerdictError;

    fn try_from(value: &str) -> Result<Self> {
        if Self::is_valid(value) {
            Ok(Self(value.to_ascii_lowercase()))
        } else {
            Err(VerdictError::client(
                "InvalidSha256",
                format!("not a 64-digit hex SHA-256: {:?}", value),
            ))
        }
    }
}

impl TryFrom<String> for Sha256 {
    type Error = VerdictError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl FromStr for Sha256 {
    type Err = VerdictError;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_from(s)
    }
}

impl From<Sha256> for String {
    fn from(value: Sha256) -> Self {
        value.0
    }
}

impl AsRef<str> for Sha256 {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EICAR_SHA256: &str = "275a021bbfb6489e54d471899f7db9d1663fc695ec2fe2a2c4538aabf651fd0f";

    #[test]
    fn test_accepts_mixed_case_and_normalizes() {
        let upper = EICAR_SHA256.to_ascii_uppercase();
        let sha = Sha256::try_from(upper.as_str()).unwrap();
        assert_eq!(sha.as_str(), EICAR_SHA256);
    }

    #[test]
    fn test_rejects_malformed_hashes() {
        let too_long = format!("{}0", EICAR_SHA256);
        for bad in [
            "",
            "abc",
            &EICAR_SHA256[..63],
            too_long.as_str(),
            "zz5a021bbfb6489e54d471899f7db9d1663fc695ec2fe2a2c4538aabf651fd0f",
            " 75a021bbfb6489e54d471899f7db9d1663fc695ec2fe2a2c4538aabf651fd0f",
        ] {
            let err = Sha256::try_from(bad).unwrap_err();
            assert!(matches!(err, VerdictError::Client(_)), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_digest_of_known_input() {
        let eicar = b"X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";
        assert_eq!(Sha256::digest(eicar).as_str(), EICAR_SHA256);
    }

    #[tokio::test]
    async fn test_hash_file_matches_digest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data = vec![7u8; READ_CHUNK * 2 + 13];
        file.write_all(&data).unwrap();

        let from_file = Sha256::hash_file(file.path()).await.unwrap();
        assert_eq!(from_file, Sha256::digest(&data));
    }

    #[tokio::test]
    async fn test_hash_missing_file_is_client_error() {
        let err = Sha256::hash_file(Path::new("/definitely/not/here.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, VerdictError::Client(_)));
    }

    #[test]
    fn test_serde_validates() {
        let ok: Sha256 = serde_json::from_str(&format!("\"{}\"", EICAR_SHA256)).unwrap();
        assert_eq!(ok.as_str(), EICAR_SHA256);
        assert!(serde_json::from_str::<Sha256>("\"nope\"").is_err());
    }
}
