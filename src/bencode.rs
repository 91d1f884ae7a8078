//! Bencode encoding and decoding (BEP-3)
//!
//! Bencode is the self-delimiting binary encoding BitTorrent uses for
//! metainfo files and tracker responses: integers, byte strings, lists,
//! and dictionaries with sorted byte-string keys.

mod decode;
mod encode;
mod error;
mod value;

pub use decode::decode;
pub use encode::{encode, encode_into};
pub use error::BencodeError;
pub use value::Value;

#[cfg(test)]
mod tests;
