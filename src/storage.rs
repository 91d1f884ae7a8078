//! Disk I/O: mapping piece writes onto the torrent's file sequence.

mod error;
mod mapper;

pub use error::StorageError;
pub use mapper::{layout_files, FileMapper};

#[cfg(test)]
mod tests;
