use super::error::StorageError;
use crate::metainfo::{File as TorrentFile, Info};
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

/// Maps logical torrent offsets onto the on-disk file sequence.
///
/// One writable handle per declared file, opened fresh (truncated) at
/// init with parent directories created as needed. A write at logical
/// offset `O` lands in the file whose `[offset, offset + length)` range
/// contains `O`, splitting across boundaries; spans are written in order
/// and a failure surfaces without rolling back earlier spans. Handles
/// close when the mapper is dropped.
pub struct FileMapper {
    files: Vec<MappedFile>,
    piece_length: u64,
    total_length: u64,
    piece_count: usize,
}

struct MappedFile {
    length: u64,
    offset: u64,
    handle: Mutex<File>,
}

struct FileSpan {
    file_index: usize,
    file_offset: u64,
    length: u64,
}

fn validate_relative(path: &Path) -> Result<(), StorageError> {
    for component in path.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::PathTraversal(path.display().to_string()));
            }
            _ => {}
        }
    }
    Ok(())
}

impl FileMapper {
    /// Opens the full file set under `output_dir`, truncating any
    /// existing content.
    pub async fn create(output_dir: &Path, info: &Info) -> Result<Self, StorageError> {
        let mut files = Vec::with_capacity(info.files.len());

        for entry in &info.files {
            validate_relative(&entry.path)?;
            let path = output_dir.join(&entry.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let handle = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .await?;

            files.push(MappedFile {
                length: entry.length,
                offset: entry.offset,
                handle: Mutex::new(handle),
            });
        }

        Ok(Self {
            files,
            piece_length: info.piece_length,
            total_length: info.total_length,
            piece_count: info.piece_count(),
        })
    }

    /// Writes `data` at `offset_in_piece` within piece `piece_index`,
    /// splitting across file boundaries as needed.
    pub async fn write(
        &self,
        piece_index: u32,
        offset_in_piece: u32,
        data: &[u8],
    ) -> Result<(), StorageError> {
        let spans = self.spans(piece_index, offset_in_piece, data.len() as u64)?;
        let mut consumed = 0usize;

        for span in spans {
            let slice = &data[consumed..consumed + span.length as usize];
            let mut handle = self.files[span.file_index].handle.lock().await;
            handle.seek(SeekFrom::Start(span.file_offset)).await?;
            handle.write_all(slice).await?;
            consumed += span.length as usize;
        }

        Ok(())
    }

    /// Reads back a whole piece, concatenating across file boundaries.
    pub async fn read_piece(&self, piece_index: u32) -> Result<Bytes, StorageError> {
        let size = self.piece_size(piece_index)?;
        let spans = self.spans(piece_index, 0, size)?;
        let mut data = Vec::with_capacity(size as usize);

        for span in spans {
            let mut buf = vec![0u8; span.length as usize];
            let mut handle = self.files[span.file_index].handle.lock().await;
            handle.seek(SeekFrom::Start(span.file_offset)).await?;
            handle.read_exact(&mut buf).await?;
            data.extend_from_slice(&buf);
        }

        Ok(Bytes::from(data))
    }

    /// Flushes every file to disk.
    pub async fn sync_all(&self) -> Result<(), StorageError> {
        for file in &self.files {
            file.handle.lock().await.sync_data().await?;
        }
        Ok(())
    }

    /// Total bytes across all files.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    fn piece_size(&self, piece_index: u32) -> Result<u64, StorageError> {
        if piece_index as usize >= self.piece_count {
            return Err(StorageError::InvalidPieceIndex(piece_index));
        }
        if (piece_index as usize) + 1 < self.piece_count {
            Ok(self.piece_length)
        } else {
            Ok(self.total_length - (self.piece_count as u64 - 1) * self.piece_length)
        }
    }

    /// Computes the file spans covering `[O, O + length)` where
    /// `O = piece_index * piece_length + offset_in_piece`.
    fn spans(
        &self,
        piece_index: u32,
        offset_in_piece: u32,
        length: u64,
    ) -> Result<Vec<FileSpan>, StorageError> {
        if piece_index as usize >= self.piece_count {
            return Err(StorageError::InvalidPieceIndex(piece_index));
        }

        let start = piece_index as u64 * self.piece_length + u64::from(offset_in_piece);
        if start + length > self.total_length {
            return Err(StorageError::OutOfRange {
                piece: piece_index,
                offset: offset_in_piece,
            });
        }

        let mut spans = Vec::new();
        let mut cursor = start;
        let mut remaining = length;

        for (file_index, file) in self.files.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            let file_end = file.offset + file.length;
            if cursor >= file.offset && cursor < file_end {
                let take = remaining.min(file_end - cursor);
                spans.push(FileSpan {
                    file_index,
                    file_offset: cursor - file.offset,
                    length: take,
                });
                cursor += take;
                remaining -= take;
            }
        }

        Ok(spans)
    }
}

/// Builds the `Info`-shaped file list a mapper needs from raw entries,
/// computing prefix-sum offsets. Used by tests and by callers that
/// construct layouts without a metainfo file.
pub fn layout_files(entries: &[(PathBuf, u64)]) -> Vec<TorrentFile> {
    let mut files = Vec::with_capacity(entries.len());
    let mut offset = 0u64;
    for (path, length) in entries {
        files.push(TorrentFile {
            path: path.clone(),
            length: *length,
            offset,
        });
        offset += length;
    }
    files
}
