// ABOUTME: In-memory ZIP packaging and unpacking for export/import runs
// ABOUTME: Enforces unique entry names; no working file touches disk

use crate::util::file_extension;
use crate::{Error, Result};
use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub const DOCUMENT_EXTENSION: &str = "md";
pub const ARCHIVE_EXTENSION: &str = "zip";

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ArchiveEntry {
            name: name.into(),
            bytes,
        }
    }

    pub fn is_document(&self) -> bool {
        file_extension(&self.name) == DOCUMENT_EXTENSION
    }
}

pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    names: HashSet<String>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        ArchiveBuilder {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            names: HashSet::new(),
        }
    }

    pub fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(Error::Archive(format!("duplicate archive entry: {}", name)));
        }
        self.writer
            .start_file(name, SimpleFileOptions::default())
            .map_err(|e| Error::Archive(e.to_string()))?;
        self.writer.write_all(bytes)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self
            .writer
            .finish()
            .map_err(|e| Error::Archive(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        ArchiveBuilder::new()
    }
}

/// Reads every file entry of a ZIP into memory, in archive order.
pub fn read_archive(bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| Error::Archive(e.to_string()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| Error::Archive(e.to_string()))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        entries.push(ArchiveEntry::new(name, bytes));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_read_roundtrip() {
        let mut builder = ArchiveBuilder::new();
        builder.add_entry("posts/hello.md", b"# Hello\n").unwrap();
        builder.add_entry("_images/pic.png", &[0x89, 0x50]).unwrap();
        assert_eq!(builder.len(), 2);

        let bytes = builder.finish().unwrap();
        let entries = read_archive(&bytes).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "posts/hello.md");
        assert!(entries[0].is_document());
        assert_eq!(entries[0].bytes, b"# Hello\n");
        assert!(!entries[1].is_document());
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut builder = ArchiveBuilder::new();
        builder.add_entry("a.md", b"one").unwrap();
        let err = builder.add_entry("a.md", b"two").unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }

    #[test]
    fn test_read_garbage_is_archive_error() {
        let err = read_archive(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }
}
