//! Torrent metainfo parsing (BEP-3)
//!
//! Parses `.torrent` files into [`Metainfo`], computing the info hash from
//! the raw bencoded `info` value and flattening the tracker tiers.

mod error;
mod info_hash;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use torrent::{File, Info, Metainfo};
