use sha1::{Digest, Sha1};
use std::fmt;

/// The 20-byte SHA-1 of the bencoded `info` dictionary.
///
/// This is the torrent's identity: it is sent in the wire handshake and in
/// every tracker announce. Two metainfo files describing the same content
/// with the same piece layout hash to the same value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    /// Wraps raw hash bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Hashes the raw bencoded bytes of an `info` value.
    pub fn from_info_bytes(info_bytes: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(info_bytes);
        Self(hasher.finalize().into())
    }

    /// Returns the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex rendering, 40 characters.
    pub fn to_hex(&self) -> String {
        self.0.iter().fold(String::with_capacity(40), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
    }

    /// Percent-encodes every byte for tracker announce URLs.
    pub fn url_encode(&self) -> String {
        self.0.iter().fold(String::with_capacity(60), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "%{:02x}", b);
            s
        })
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
