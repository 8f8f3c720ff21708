//! Message archival/replay storage is out of scope (spec §1); the cluster
//! only needs the narrow read/write interface it presents.

use std::sync::{Arc, Mutex};

use crate::ids::Position;

/// Durably appends replicated bytes. The leader writes through this
/// before advancing `commit_position`; followers write through it as they
/// receive data.
pub trait Archiver: Send {
    fn append(&mut self, position: Position, bytes: &[u8]);
}

/// Reads back archived bytes so the leader can (re-)publish them, either
/// on the normal data path or in response to a `Resend` request.
pub trait ArchiveReader: Send {
    /// Reads up to `max_len` bytes starting at `from`, returning what was
    /// actually available (which may be less, or empty if nothing new has
    /// been archived yet).
    fn read(&mut self, from: Position, max_len: usize) -> Vec<u8>;
}

/// An in-memory archive backing both traits, for tests and the
/// single-process demo harness.
#[derive(Default)]
pub struct MemoryArchive {
    bytes: Vec<u8>,
}

impl Archiver for MemoryArchive {
    fn append(&mut self, position: Position, bytes: &[u8]) {
        let end = position as usize;
        let start = end - bytes.len();
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(bytes);
    }
}

impl ArchiveReader for MemoryArchive {
    fn read(&mut self, from: Position, max_len: usize) -> Vec<u8> {
        let start = from as usize;
        if start >= self.bytes.len() {
            return Vec::new();
        }
        let end = (start + max_len).min(self.bytes.len());
        self.bytes[start..end].to_vec()
    }
}

/// A [`MemoryArchive`] shared between an [`Archiver`] writer handle and an
/// [`ArchiveReader`] reader handle backed by the same bytes, so data a
/// writer appends is visible to whoever reads it back -- as it would be
/// for a real append-only log file opened by both a writer and a reader.
#[derive(Default, Clone)]
pub struct SharedMemoryArchive(Arc<Mutex<MemoryArchive>>);

impl SharedMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits into a boxed writer/reader pair suitable for [`crate::shared::Shared`]'s
    /// `archiver`/`archive_reader` fields.
    pub fn split(&self) -> (Box<dyn Archiver>, Box<dyn ArchiveReader>) {
        (Box::new(self.clone()), Box::new(self.clone()))
    }
}

impl Archiver for SharedMemoryArchive {
    fn append(&mut self, position: Position, bytes: &[u8]) {
        self.0.lock().unwrap().append(position, bytes);
    }
}

impl ArchiveReader for SharedMemoryArchive {
    fn read(&mut self, from: Position, max_len: usize) -> Vec<u8> {
        self.0.lock().unwrap().read(from, max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_archive_reader_sees_writer_appends() {
        let archive = SharedMemoryArchive::new();
        let (mut writer, mut reader) = archive.split();
        writer.append(5, b"hello");
        assert_eq!(reader.read(0, 16), b"hello".to_vec());
    }
}
