// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Host-file storage area for RingStore.
//
// Maps the area one-to-one onto a regular file. Files are freely rewritable,
// so the area always advertises `overwrite`; erasing writes the fill value
// over the block range. Useful for host-side tooling that inspects or
// prepares images destined for a device.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::area::{total_len, AreaProperties, StorageArea};
use crate::error::{AreaError, AreaResult};

/// A storage area backed by a host file.
#[derive(Debug)]
pub struct FileArea {
    props: AreaProperties,
    file: File,
    path: PathBuf,
}

impl FileArea {
    /// Create (or truncate) `path` and fill it with the erase value.
    pub fn create(path: impl AsRef<Path>, props: AreaProperties) -> AreaResult<Self> {
        let props = Self::rewritable(props)?;
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let block = vec![props.erase_value; props.erase_size];
        for _ in 0..props.erase_blocks {
            file.write_all(&block)?;
        }
        file.sync_all()?;

        debug!(path = %path.display(), size = props.size(), "created file area");
        Ok(Self { props, file, path })
    }

    /// Open an existing image. Its length must match the descriptor.
    pub fn open(path: impl AsRef<Path>, props: AreaProperties) -> AreaResult<Self> {
        let props = Self::rewritable(props)?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let len = file.metadata()?.len();
        if len != props.size() as u64 {
            return Err(AreaError::InvalidProperties(format!(
                "{} is {} bytes, area is {} bytes",
                path.display(),
                len,
                props.size()
            )));
        }

        debug!(path = %path.display(), size = props.size(), "opened file area");
        Ok(Self { props, file, path })
    }

    /// The path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush file contents to durable storage.
    pub fn sync(&self) -> AreaResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    fn rewritable(mut props: AreaProperties) -> AreaResult<AreaProperties> {
        props.validate()?;
        props.capabilities.overwrite = true;
        Ok(props)
    }
}

impl StorageArea for FileArea {
    fn properties(&self) -> &AreaProperties {
        &self.props
    }

    fn read(&self, offset: usize, bufs: &mut [&mut [u8]]) -> AreaResult<()> {
        let len = bufs.iter().map(|b| b.len()).sum();
        self.props.check_bounds(offset, len)?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset as u64))?;
        for buf in bufs.iter_mut() {
            file.read_exact(buf)?;
        }
        Ok(())
    }

    fn write(&mut self, offset: usize, bufs: &[&[u8]]) -> AreaResult<()> {
        self.props.check_write(offset, total_len(bufs))?;
        self.file.seek(SeekFrom::Start(offset as u64))?;
        for buf in bufs {
            self.file.write_all(buf)?;
        }
        Ok(())
    }

    fn erase(&mut self, start: usize, count: usize) -> AreaResult<()> {
        self.props.check_erase(start, count)?;
        let block = vec![self.props.erase_value; self.props.erase_size];
        self.file
            .seek(SeekFrom::Start((start * self.props.erase_size) as u64))?;
        for _ in 0..count {
            self.file.write_all(&block)?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn props() -> AreaProperties {
        AreaProperties::nor_flash(4, 128, 4)
    }

    #[test]
    fn test_create_fills_with_erase_value() {
        let dir = TempDir::new().unwrap();
        let area = FileArea::create(dir.path().join("area.img"), props()).unwrap();
        assert!(area.properties().capabilities.overwrite);

        let contents = std::fs::read(area.path()).unwrap();
        assert_eq!(contents.len(), 512);
        assert!(contents.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_write_read_erase() {
        let dir = TempDir::new().unwrap();
        let mut area = FileArea::create(dir.path().join("area.img"), props()).unwrap();

        area.write(128, &[b"ring", b"stor"]).unwrap();
        let mut buf = [0u8; 8];
        area.read_exact(128, &mut buf).unwrap();
        assert_eq!(&buf, b"ringstor");

        area.erase(1, 1).unwrap();
        area.read_exact(128, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 8]);
    }

    #[test]
    fn test_reopen_preserves_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("area.img");
        {
            let mut area = FileArea::create(&path, props()).unwrap();
            area.write_all(64, &[1, 2, 3, 4]).unwrap();
            area.sync().unwrap();
        }
        let area = FileArea::open(&path, props()).unwrap();
        let mut buf = [0u8; 4];
        area.read_exact(64, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_open_rejects_size_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.img");
        std::fs::write(&path, [0xFFu8; 100]).unwrap();
        assert!(matches!(
            FileArea::open(&path, props()),
            Err(AreaError::InvalidProperties(_))
        ));
    }

    #[test]
    fn test_misaligned_write_rejected() {
        let dir = TempDir::new().unwrap();
        let mut area = FileArea::create(dir.path().join("area.img"), props()).unwrap();
        assert!(matches!(
            area.write_all(2, &[0u8; 4]),
            Err(AreaError::Misaligned { .. })
        ));
    }
}
