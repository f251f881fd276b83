//! SSTable Builder
//!
//! Writes sorted entries to a new SSTable file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{DaError, Result};
use crate::record::{encode_expiry, Record, MAX_VALUE_SIZE};

use super::{SSTable, HEADER_SIZE, MAGIC, TMP_SUFFIX, TOMBSTONE_MARKER, VERSION};

/// Builder for creating new SSTables from sorted entries
///
/// Output goes to `<path>.tmp`; `finish()` fsyncs and renames it to `path`,
/// atomically replacing any file already there.
pub struct SSTableBuilder {
    /// Final file path
    path: PathBuf,
    /// Path written while building
    tmp_path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Number of entries written
    entry_count: u64,
    /// Current write position (for index)
    current_offset: u64,
    /// Index block, encoded as entries are added
    index: Vec<u8>,
    /// Track min/max keys for metadata
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes header immediately; call `add()`/`add_tombstone()` in sorted order,
    /// then `finish()` to write index and footer.
    pub fn new(path: &Path) -> Result<Self> {
        let tmp_path = tmp_path_for(path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut writer = BufWriter::new(file);

        // Entry count placeholder, patched in finish()
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            tmp_path,
            writer,
            entry_count: 0,
            current_offset: HEADER_SIZE,
            index: Vec::new(),
            min_key: None,
            max_key: None,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Add a live record (must be called in sorted key order)
    pub fn add(&mut self, key: &[u8], record: &Record) -> Result<()> {
        if record.value.len() > MAX_VALUE_SIZE {
            return Err(DaError::InvalidArgument(format!(
                "value of {} bytes exceeds limit",
                record.value.len()
            )));
        }
        self.write_entry(key, Some(&record.value), encode_expiry(record.expires_at))
    }

    /// Add a tombstone (must be called in sorted key order)
    pub fn add_tombstone(&mut self, key: &[u8]) -> Result<()> {
        self.write_entry(key, None, 0)
    }

    /// Internal: write an entry (value=None means tombstone)
    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>, expires_at: u64) -> Result<()> {
        if let Some(max) = &self.max_key {
            if key <= max.as_slice() {
                return Err(DaError::Storage(
                    "SSTable keys must be added in strictly ascending order".to_string(),
                ));
            }
        }

        let key_len = key.len() as u32;
        let val_len = match value {
            Some(v) => v.len() as u32,
            None => TOMBSTONE_MARKER,
        };

        // Index slot mirrors the data header
        self.index.extend_from_slice(&key_len.to_le_bytes());
        self.index.extend_from_slice(&self.current_offset.to_le_bytes());
        self.index.extend_from_slice(&val_len.to_le_bytes());
        self.index.extend_from_slice(&expires_at.to_le_bytes());
        self.index.extend_from_slice(key);

        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());

        let mut header = [0u8; 16];
        header[0..4].copy_from_slice(&key_len.to_le_bytes());
        header[4..8].copy_from_slice(&val_len.to_le_bytes());
        header[8..16].copy_from_slice(&expires_at.to_le_bytes());

        self.writer.write_all(&header)?;
        self.writer.write_all(key)?;
        self.data_hasher.update(&header);
        self.data_hasher.update(key);

        let mut entry_size = header.len() as u64 + key.len() as u64;
        if let Some(v) = value {
            self.writer.write_all(v)?;
            self.data_hasher.update(v);
            entry_size += v.len() as u64;
        }

        self.current_offset += entry_size;
        self.entry_count += 1;

        Ok(())
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Discard the partial file without touching `path`
    pub fn abandon(self) -> Result<()> {
        drop(self.writer);
        fs::remove_file(&self.tmp_path)?;
        Ok(())
    }

    /// Finish building: write index block and footer, fsync, rename into place
    pub fn finish(mut self) -> Result<SSTable> {
        let index_offset = self.current_offset;
        let index_crc = crc32fast::hash(&self.index);
        let data_crc = self.data_hasher.finalize();

        self.writer.write_all(&self.index)?;
        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&index_crc.to_le_bytes())?;
        self.writer.flush()?;

        let mut file = self.writer.into_inner().map_err(|e| {
            DaError::Storage(format!("Failed to flush SSTable: {}", e))
        })?;
        file.seek(SeekFrom::Start(6))?; // After magic + version
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            sync_dir(parent)?;
        }

        Ok(SSTable {
            path: self.path,
            entry_count: self.entry_count,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
            file_size,
        })
    }
}

/// `sstable_000001.sst` → `sstable_000001.sst.tmp`
pub(crate) fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Persist directory entries (new files, renames)
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
