use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::{decode, encode, Value};
use bytes::Bytes;
use std::path::PathBuf;

/// A parsed torrent file.
///
/// # Examples
///
/// ```no_run
/// use remora::metainfo::Metainfo;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let data = std::fs::read("example.torrent")?;
/// let metainfo = Metainfo::from_bytes(&data)?;
/// println!("{}: {} bytes", metainfo.info.name, metainfo.info.total_length);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Metainfo {
    /// The info dictionary: files and piece layout.
    pub info: Info,
    /// SHA-1 of the raw bencoded `info` value.
    pub info_hash: InfoHash,
    /// Primary tracker URL.
    pub announce: Option<String>,
    /// Tracker tiers from `announce-list` (BEP-12).
    pub announce_list: Vec<Vec<String>>,
    raw_info: Bytes,
}

/// The `info` dictionary of a torrent.
#[derive(Debug, Clone)]
pub struct Info {
    /// Suggested name for the file or root directory.
    pub name: String,
    /// Bytes per piece; the final piece may be shorter.
    pub piece_length: u64,
    /// One SHA-1 per piece, in piece order.
    pub pieces: Vec<[u8; 20]>,
    /// Files in torrent order. Single-file torrents have one entry.
    pub files: Vec<File>,
    /// Sum of all file lengths.
    pub total_length: u64,
}

/// One file of a torrent.
#[derive(Debug, Clone)]
pub struct File {
    /// Path relative to the output directory.
    pub path: PathBuf,
    /// File size in bytes.
    pub length: u64,
    /// Byte offset of this file in the torrent's total ordering.
    pub offset: u64,
}

impl Metainfo {
    /// Parses a torrent file from its raw bytes.
    ///
    /// The `info` value is re-encoded (canonically, keys sorted) to compute
    /// the info hash, so the hash matches what other clients and trackers
    /// derive from the same dictionary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let root = decode(data)?;
        if root.as_dict().is_none() {
            return Err(MetainfoError::InvalidField("root"));
        }

        let info_value = root
            .get(b"info")
            .ok_or(MetainfoError::MissingField("info"))?;

        let raw_info = Bytes::from(encode(info_value));
        let info_hash = InfoHash::from_info_bytes(&raw_info);
        let info = parse_info(info_value)?;

        let announce = root
            .get(b"announce")
            .and_then(|v| v.as_str())
            .map(String::from);

        let announce_list = root
            .get(b"announce-list")
            .and_then(|v| v.as_list())
            .map(|tiers| {
                tiers
                    .iter()
                    .filter_map(|tier| tier.as_list())
                    .map(|urls| {
                        urls.iter()
                            .filter_map(|u| u.as_str().map(String::from))
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            info,
            info_hash,
            announce,
            announce_list,
            raw_info,
        })
    }

    /// The raw bencoded `info` value.
    pub fn raw_info(&self) -> &Bytes {
        &self.raw_info
    }

    /// All tracker URLs: `announce` first, then the flattened
    /// `announce-list`, deduplicated in order.
    pub fn trackers(&self) -> Vec<String> {
        let mut trackers: Vec<String> = Vec::new();

        if let Some(ref primary) = self.announce {
            trackers.push(primary.clone());
        }
        for tier in &self.announce_list {
            for url in tier {
                if !trackers.contains(url) {
                    trackers.push(url.clone());
                }
            }
        }

        trackers
    }
}

impl Info {
    /// Number of pieces.
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Size of piece `index`; the final piece carries the remainder.
    pub fn piece_size(&self, index: u32) -> u64 {
        let count = self.pieces.len() as u64;
        if count == 0 {
            return 0;
        }
        if u64::from(index) + 1 < count {
            self.piece_length
        } else {
            self.total_length - (count - 1) * self.piece_length
        }
    }
}

fn parse_info(value: &Value) -> Result<Info, MetainfoError> {
    let dict = value.as_dict().ok_or(MetainfoError::InvalidField("info"))?;

    let name = dict
        .get(b"name".as_slice())
        .and_then(|v| v.as_str())
        .ok_or(MetainfoError::MissingField("name"))?
        .to_string();

    let piece_length = dict
        .get(b"piece length".as_slice())
        .and_then(|v| v.as_integer())
        .filter(|&n| n > 0)
        .ok_or(MetainfoError::MissingField("piece length"))? as u64;

    let pieces_bytes = dict
        .get(b"pieces".as_slice())
        .and_then(|v| v.as_bytes())
        .ok_or(MetainfoError::MissingField("pieces"))?;

    if pieces_bytes.len() % 20 != 0 {
        return Err(MetainfoError::InvalidField("pieces"));
    }

    let pieces: Vec<[u8; 20]> = pieces_bytes
        .chunks_exact(20)
        .map(|chunk| {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(chunk);
            hash
        })
        .collect();

    let (files, total_length) = parse_files(dict, &name)?;

    Ok(Info {
        name,
        piece_length,
        pieces,
        files,
        total_length,
    })
}

fn parse_files(
    dict: &std::collections::BTreeMap<Bytes, Value>,
    name: &str,
) -> Result<(Vec<File>, u64), MetainfoError> {
    // Single-file form: a top-level "length".
    if let Some(length) = dict.get(b"length".as_slice()).and_then(|v| v.as_integer()) {
        let length = length as u64;
        let file = File {
            path: PathBuf::from(name),
            length,
            offset: 0,
        };
        return Ok((vec![file], length));
    }

    // Multi-file form: "files" is a list of {length, path: [components]}.
    let list = dict
        .get(b"files".as_slice())
        .and_then(|v| v.as_list())
        .ok_or(MetainfoError::MissingField("length or files"))?;

    let mut files = Vec::with_capacity(list.len());
    let mut offset = 0u64;

    for entry in list {
        let length = entry
            .get(b"length")
            .and_then(|v| v.as_integer())
            .ok_or(MetainfoError::MissingField("file length"))? as u64;

        let components = entry
            .get(b"path")
            .and_then(|v| v.as_list())
            .ok_or(MetainfoError::MissingField("file path"))?;

        let path: PathBuf = std::iter::once(name.to_string())
            .chain(
                components
                    .iter()
                    .filter_map(|c| c.as_str().map(String::from)),
            )
            .collect();

        files.push(File {
            path,
            length,
            offset,
        });
        offset += length;
    }

    if files.is_empty() {
        return Err(MetainfoError::InvalidField("files"));
    }

    Ok((files, offset))
}
