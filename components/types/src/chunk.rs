use std::{
    collections::{btree_map, BTreeMap},
    fs::File,
    io,
    path::PathBuf,
    sync::Arc,
};

use snafu::{Location, Snafu};
use tracing::debug;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("chunk {} discovered twice within one source", number))]
    DuplicateChunk {
        number: u32,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Where the payload bytes of a chunk live.
#[derive(Debug)]
pub enum ChunkSource {
    /// One file per chunk; the whole file is the payload. The descriptor is
    /// opened on first use and dropped again when the read cursor leaves the
    /// chunk, so a recording of thousands of pieces never pins thousands of
    /// descriptors at once.
    Scattered { path: PathBuf, file: Option<File> },
    /// A slice of a packed block file. The descriptor is shared with every
    /// other chunk carved out of the same file and closes when the last of
    /// them goes away.
    Block { file: Arc<File>, position: u64 },
}

impl Clone for ChunkSource {
    fn clone(&self) -> Self {
        match self {
            // a copy opens its own descriptor when it first needs one
            ChunkSource::Scattered { path, .. } => ChunkSource::Scattered {
                path: path.clone(),
                file: None,
            },
            ChunkSource::Block { file, position } => ChunkSource::Block {
                file: file.clone(),
                position: *position,
            },
        }
    }
}

/// One piece of a recording.
///
/// `offset` is the position of the chunk in the logical stream; it is
/// assigned exactly once, when the discovered set is turned into a virtual
/// file, and from then on consecutive chunks in number order satisfy
/// `offset + size == next.offset`.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub number: u32,
    pub size: u64,
    pub offset: u64,
    pub source: ChunkSource,
}

impl Chunk {
    pub fn scattered(path: PathBuf, number: u32, size: u64) -> Self {
        Chunk {
            number,
            size,
            offset: 0,
            source: ChunkSource::Scattered { path, file: None },
        }
    }

    pub fn block(file: Arc<File>, number: u32, position: u64, size: u64) -> Self {
        Chunk {
            number,
            size,
            offset: 0,
            source: ChunkSource::Block { file, position },
        }
    }

    /// First byte past this chunk in the logical stream.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// The descriptor to read this chunk from, plus the physical position of
    /// the chunk's first payload byte inside it. Opens the scattered
    /// descriptor on demand.
    pub fn reader(&mut self) -> io::Result<(&File, u64)> {
        match &mut self.source {
            ChunkSource::Scattered { path, file } => {
                let opened = match file.take() {
                    Some(already_open) => already_open,
                    None => {
                        let opened = File::open(&path)?;
                        debug!("opened chunk {}", path.display());
                        opened
                    }
                };
                Ok((file.insert(opened), 0))
            }
            ChunkSource::Block { file, position } => Ok((file, *position)),
        }
    }

    /// Drop the lazily opened descriptor, if any. Shared block descriptors
    /// stay open; they belong to the whole recording.
    pub fn release(&mut self) {
        if let ChunkSource::Scattered { path, file } = &mut self.source {
            if file.take().is_some() {
                debug!("released chunk {}", path.display());
            }
        }
    }
}

/// The chunks of one recording, ordered by chunk number.
#[derive(Debug, Default)]
pub struct Chunks(BTreeMap<u32, Chunk>);

impl Chunks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly discovered chunk. Two chunks with the same number
    /// within one source mean the recording is damaged, so that is an error
    /// rather than a silent overwrite.
    pub fn insert(&mut self, chunk: Chunk) -> Result<()> {
        match self.0.entry(chunk.number) {
            btree_map::Entry::Vacant(slot) => {
                slot.insert(chunk);
                Ok(())
            }
            btree_map::Entry::Occupied(_) => DuplicateChunkSnafu {
                number: chunk.number,
            }
            .fail(),
        }
    }

    /// Fold a per-mountpoint scan result into this set. A number already
    /// present keeps its first occurrence; the collisions are returned so the
    /// caller can report where they came from.
    pub fn merge(&mut self, other: Chunks) -> Vec<u32> {
        let mut collisions = Vec::new();
        for (number, chunk) in other.0 {
            match self.0.entry(number) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(chunk);
                }
                btree_map::Entry::Occupied(_) => collisions.push(number),
            }
        }
        collisions
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.0.values()
    }

    pub fn max_number(&self) -> Option<u32> {
        self.0.keys().next_back().copied()
    }
}

impl IntoIterator for Chunks {
    type Item = Chunk;
    type IntoIter = btree_map::IntoValues<u32, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_values()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn ordered_by_number_regardless_of_insert_order() {
        let mut chunks = Chunks::new();
        for number in [7u32, 0, 3] {
            chunks
                .insert(Chunk::scattered(PathBuf::from("x"), number, 1))
                .unwrap();
        }
        let numbers: Vec<u32> = chunks.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![0, 3, 7]);
        assert_eq!(chunks.max_number(), Some(7));
    }

    #[test]
    fn duplicate_insert_is_an_error() {
        let mut chunks = Chunks::new();
        chunks
            .insert(Chunk::scattered(PathBuf::from("a"), 4, 10))
            .unwrap();
        let err = chunks
            .insert(Chunk::scattered(PathBuf::from("b"), 4, 10))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateChunk { number: 4, .. }));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn merge_keeps_first_and_reports_collisions() {
        let mut shared = Chunks::new();
        shared
            .insert(Chunk::scattered(PathBuf::from("first"), 1, 5))
            .unwrap();

        let mut local = Chunks::new();
        local
            .insert(Chunk::scattered(PathBuf::from("second"), 1, 5))
            .unwrap();
        local
            .insert(Chunk::scattered(PathBuf::from("third"), 2, 5))
            .unwrap();

        let collisions = shared.merge(local);
        assert_eq!(collisions, vec![1]);
        assert_eq!(shared.len(), 2);
        let first = shared.iter().next().unwrap();
        match &first.source {
            ChunkSource::Scattered { path, .. } => assert_eq!(path, &PathBuf::from("first")),
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn scattered_reader_opens_lazily_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.00000000");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"payload")
            .unwrap();

        let mut chunk = Chunk::scattered(path, 0, 7);
        assert!(matches!(
            chunk.source,
            ChunkSource::Scattered { file: None, .. }
        ));

        let (_, position) = chunk.reader().unwrap();
        assert_eq!(position, 0);
        assert!(matches!(
            chunk.source,
            ChunkSource::Scattered { file: Some(_), .. }
        ));

        // a clone never inherits the open descriptor
        let copy = chunk.clone();
        assert!(matches!(
            copy.source,
            ChunkSource::Scattered { file: None, .. }
        ));

        chunk.release();
        assert!(matches!(
            chunk.source,
            ChunkSource::Scattered { file: None, .. }
        ));
    }

    #[test]
    fn missing_scattered_file_fails_open() {
        let mut chunk = Chunk::scattered(PathBuf::from("/nonexistent/rec.00000000"), 0, 1);
        assert!(chunk.reader().is_err());
    }
}
