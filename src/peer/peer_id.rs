use crate::constants::CLIENT_PREFIX;
use rand::Rng as _;
use std::fmt;

/// A 20-byte peer identity, Azureus-style: client prefix then random bytes.
///
/// Generated once at startup and reused for every handshake and announce.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    pub fn generate() -> Self {
        let prefix = CLIENT_PREFIX.as_bytes();
        let mut id = [0u8; 20];
        id[..prefix.len()].copy_from_slice(prefix);
        rand::rng().fill(&mut id[prefix.len()..]);
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut id = [0u8; 20];
        if bytes.len() != id.len() {
            return None;
        }
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            if byte.is_ascii_graphic() {
                write!(f, "{}", *byte as char)?;
            } else {
                write!(f, "%{:02x}", byte)?;
            }
        }
        Ok(())
    }
}
