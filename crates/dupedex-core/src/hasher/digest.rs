use crate::error::Error;
use std::fmt;

pub const DIGEST_LEN: usize = 32;

/// SHA-256 of a file's or archive member's full content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }

    /// Decode a stored value. Anything other than exactly 32 bytes is rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        let array: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidDigest(hex::encode(bytes)))?;
        Ok(Digest(array))
    }

    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let trimmed = s.trim();
        if trimmed.len() != DIGEST_LEN * 2 {
            return Err(Error::InvalidDigest(trimmed.to_string()));
        }
        let bytes = hex::decode(trimmed).map_err(|_| Error::InvalidDigest(trimmed.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}
