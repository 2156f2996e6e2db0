use crate::error::{ErrorKind, Result};
use std::fmt;
use std::str::FromStr;

/// The content-addressing key: the BLAKE3 hash of a file's raw bytes.
///
/// Two files have the same identity iff their byte content is identical
/// (collision probability is treated as zero). An identity is computed once
/// from the original bytes and never recomputed from the stored
/// (compressed) form.
///
/// Renders as 64 lowercase hex characters, which is also the only form
/// [`FromStr`] accepts: uppercase or mixed-case input would name a
/// different on-disk path than the store ever writes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; 32]);

impl Identity {
    /// Length of the hex rendering.
    pub const HEX_LEN: usize = 64;

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<blake3::Hash> for Identity {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl TryFrom<&[u8]> for Identity {
    type Error = crate::error::Error;
    fn try_from(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            ErrorKind::InvalidIdentity(format!("{} raw bytes, expected 32", bytes.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

impl FromStr for Identity {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != Self::HEX_LEN {
            exn::bail!(ErrorKind::InvalidIdentity(s.to_string()));
        }
        let mut bytes = [0u8; 32];
        for (i, pair) in s.as_bytes().chunks_exact(2).enumerate() {
            let (hi, lo) = match (hex_val(pair[0]), hex_val(pair[1])) {
                (Some(hi), Some(lo)) => (hi, lo),
                _ => exn::bail!(ErrorKind::InvalidIdentity(s.to_string())),
            };
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_roundtrip() {
        let identity = Identity::from(blake3::hash(b"hello world"));
        let hex = identity.to_string();
        assert_eq!(hex.len(), Identity::HEX_LEN);
        assert!(hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_eq!(hex.parse::<Identity>().unwrap(), identity);
    }

    #[test]
    fn deterministic_and_distinct() {
        assert_eq!(
            Identity::from(blake3::hash(b"same")),
            Identity::from(blake3::hash(b"same"))
        );
        assert_ne!(
            Identity::from(blake3::hash(b"one")),
            Identity::from(blake3::hash(b"two"))
        );
    }

    #[test]
    fn rejects_bad_input() {
        // Wrong length
        assert!("abc123".parse::<Identity>().is_err());
        // Uppercase hex names a path the store never writes
        let upper = Identity::from_bytes([0xab; 32]).to_string().to_uppercase();
        assert!(upper.parse::<Identity>().is_err());
        // Non-hex characters
        let junk = "zz".repeat(32);
        assert!(junk.parse::<Identity>().is_err());
    }

    #[test]
    fn raw_bytes_conversion() {
        let identity = Identity::from_bytes([7; 32]);
        let roundtrip = Identity::try_from(identity.as_bytes().as_slice()).unwrap();
        assert_eq!(roundtrip, identity);
        assert!(Identity::try_from([0u8; 31].as_slice()).is_err());
    }
}
