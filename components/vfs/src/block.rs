use std::{
    fs::{self, File},
    io::{self, Read},
    os::unix::fs::FileExt,
    path::Path,
    sync::{Arc, Mutex},
    thread,
};

use byteorder::{ByteOrder, LittleEndian};
use snafu::{ensure, ResultExt};
use tracing::{debug, error};
use vbsfs_common::{BLOCK_HEADER_BYTES, FILE_HEADER_BYTES, MARK6_SG_SYNC_WORD, MARK6_SG_VERSION};
use vbsfs_types::chunk::{Chunk, Chunks};

use crate::err::{CorruptBlockHeaderSnafu, Result, UnknownIOSnafu};

struct FileHeader {
    sync_word: u64,
    version: i32,
    // block_size, packet_format and packet_size complete the header;
    // nothing here consults them
}

fn read_file_header(file: &mut File) -> io::Result<FileHeader> {
    let mut buf = [0u8; FILE_HEADER_BYTES];
    file.read_exact(&mut buf)?;
    Ok(FileHeader {
        sync_word: LittleEndian::read_u64(&buf[0..8]),
        version: LittleEndian::read_i32(&buf[8..12]),
    })
}

/// Collect the chunks of a block-file recording, one worker per mountpoint.
/// Workers fill a private set first and only merge under the lock, which
/// keeps contention low and duplicate detection deterministic. Every worker
/// is joined before this returns.
pub(crate) fn scan_recording<P: AsRef<Path> + Sync>(
    recname: &str,
    mountpoints: &[P],
) -> Result<Chunks> {
    let shared = Mutex::new(Chunks::new());
    let mut outcome: Result<()> = Ok(());
    thread::scope(|scope| {
        let shared = &shared;
        let workers: Vec<_> = mountpoints
            .iter()
            .map(|mp| scope.spawn(move || scan_mountpoint(recname, mp.as_ref(), shared)))
            .collect();
        for worker in workers {
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
    });
    outcome?;
    Ok(shared.into_inner().unwrap())
}

fn scan_mountpoint(recname: &str, mountpoint: &Path, shared: &Mutex<Chunks>) -> Result<()> {
    let path = mountpoint.join(recname);
    match fs::symlink_metadata(&path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            debug!("lstat fails on {} - {}", path.display(), e);
            return Ok(());
        }
    }

    let local = scan_block_file(&path)?;
    let mut shared = shared.lock().unwrap();
    // the same block written to more than one mountpoint is suspicious but
    // not fatal; the first copy found wins
    for number in shared.merge(local) {
        error!("duplicate chunk {} found in {}", number, path.display());
    }
    Ok(())
}

/// Parse one block file into chunks. The descriptor stays open and is shared
/// by every chunk carved out of it, for the lifetime of the virtual file.
fn scan_block_file(path: &Path) -> Result<Chunks> {
    // existence was checked just above, so failing to open is a real error
    let mut file = File::open(path).context(UnknownIOSnafu)?;

    let header = match read_file_header(&mut file) {
        Ok(header) => header,
        Err(e) => {
            debug!("{}: fail to read block file header - {}", path.display(), e);
            return Ok(Chunks::new());
        }
    };
    if header.sync_word != MARK6_SG_SYNC_WORD {
        debug!("{}: did not find sync word in header", path.display());
        return Ok(Chunks::new());
    }
    if header.version != MARK6_SG_VERSION {
        debug!(
            "{}: unsupported block file version {}",
            path.display(),
            header.version
        );
        return Ok(Chunks::new());
    }

    let file = Arc::new(file);
    let mut chunks = Chunks::new();
    let mut pos = FILE_HEADER_BYTES as u64;
    let mut header_buf = [0u8; BLOCK_HEADER_BYTES];
    loop {
        match file.read_exact_at(&mut header_buf, pos) {
            Ok(()) => {}
            // a short read is the regular end of the file
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                debug!(
                    "{}: failed to read block header @{} - {}",
                    path.display(),
                    pos,
                    e
                );
                break;
            }
        }
        let number = LittleEndian::read_i32(&header_buf[0..4]);
        // wb_size counts the block header itself
        let wb_size = LittleEndian::read_i32(&header_buf[4..8]);
        ensure!(
            number >= 0 && wb_size >= BLOCK_HEADER_BYTES as i32,
            CorruptBlockHeaderSnafu {
                path,
                pos,
                number,
                size: wb_size,
            }
        );

        chunks.insert(Chunk::block(
            file.clone(),
            number as u32,
            pos + BLOCK_HEADER_BYTES as u64,
            (wb_size as u64) - BLOCK_HEADER_BYTES as u64,
        ))?;
        pos += wb_size as u64;
    }
    debug!("{}: {} blocks", path.display(), chunks.len());
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use byteorder::WriteBytesExt;

    use super::*;

    fn write_file_header<W: Write>(w: &mut W, sync_word: u64, version: i32) {
        w.write_u64::<LittleEndian>(sync_word).unwrap();
        w.write_i32::<LittleEndian>(version).unwrap();
        w.write_i32::<LittleEndian>(0).unwrap(); // block_size
        w.write_i32::<LittleEndian>(0).unwrap(); // packet_format
        w.write_i32::<LittleEndian>(0).unwrap(); // packet_size
    }

    fn write_block<W: Write>(w: &mut W, number: i32, payload: &[u8]) {
        w.write_i32::<LittleEndian>(number).unwrap();
        w.write_i32::<LittleEndian>((BLOCK_HEADER_BYTES + payload.len()) as i32)
            .unwrap();
        w.write_all(payload).unwrap();
    }

    fn block_file(dir: &Path, name: &str, blocks: &[(i32, &[u8])]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        write_file_header(&mut file, MARK6_SG_SYNC_WORD, MARK6_SG_VERSION);
        for (number, payload) in blocks {
            write_block(&mut file, *number, payload);
        }
        path
    }

    #[test]
    fn parses_blocks_with_positions_past_their_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = block_file(dir.path(), "rec", &[(0, b"AAAAAAAA"), (1, b"BBBB")]);

        let chunks = scan_block_file(&path).unwrap();
        assert_eq!(chunks.len(), 2);
        let spans: Vec<(u32, u64, u64)> = chunks
            .iter()
            .map(|c| {
                let position = match &c.source {
                    vbsfs_types::chunk::ChunkSource::Block { position, .. } => *position,
                    other => panic!("unexpected source {:?}", other),
                };
                (c.number, position, c.size)
            })
            .collect();
        let first_payload = (FILE_HEADER_BYTES + BLOCK_HEADER_BYTES) as u64;
        let second_payload = first_payload + 8 + BLOCK_HEADER_BYTES as u64;
        assert_eq!(
            spans,
            vec![(0, first_payload, 8), (1, second_payload, 4)]
        );
    }

    #[test]
    fn wrong_sync_word_is_skipped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec");
        let mut file = File::create(&path).unwrap();
        write_file_header(&mut file, 0xdead_beef, MARK6_SG_VERSION);
        write_block(&mut file, 0, b"AAAA");

        assert!(scan_block_file(&path).unwrap().is_empty());
    }

    #[test]
    fn wrong_version_is_skipped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec");
        let mut file = File::create(&path).unwrap();
        write_file_header(&mut file, MARK6_SG_SYNC_WORD, 1);
        write_block(&mut file, 0, b"AAAA");

        assert!(scan_block_file(&path).unwrap().is_empty());
    }

    #[test]
    fn truncated_header_is_not_this_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec");
        File::create(&path).unwrap().write_all(b"tiny").unwrap();

        assert!(scan_block_file(&path).unwrap().is_empty());
    }

    #[test]
    fn negative_block_number_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = block_file(dir.path(), "rec", &[(-1, b"AAAA")]);

        let err = scan_block_file(&path).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::CorruptBlockHeader { number: -1, .. }
        ));
    }

    #[test]
    fn non_positive_block_size_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec");
        let mut file = File::create(&path).unwrap();
        write_file_header(&mut file, MARK6_SG_SYNC_WORD, MARK6_SG_VERSION);
        file.write_i32::<LittleEndian>(0).unwrap();
        file.write_i32::<LittleEndian>(0).unwrap();

        let err = scan_block_file(&path).unwrap_err();
        assert!(matches!(err, crate::Error::CorruptBlockHeader { .. }));
    }

    #[test]
    fn duplicate_block_number_in_one_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = block_file(dir.path(), "rec", &[(3, b"AAAA"), (3, b"BBBB")]);

        let err = scan_block_file(&path).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::ChunkError {
                source: vbsfs_types::chunk::Error::DuplicateChunk { number: 3, .. },
            }
        ));
    }

    #[test]
    fn duplicate_across_mountpoints_keeps_first() {
        let root = tempfile::tempdir().unwrap();
        for mp in ["disk0", "disk1"] {
            let dir = root.path().join(mp);
            fs::create_dir(&dir).unwrap();
            block_file(&dir, "rec", &[(0, b"AAAA")]);
        }
        block_file(&root.path().join("disk1"), "rec2", &[(1, b"BBBB")]);

        let mountpoints = [root.path().join("disk0"), root.path().join("disk1")];
        let chunks = scan_recording("rec", &mountpoints).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn workers_cover_all_mountpoints() {
        let root = tempfile::tempdir().unwrap();
        for (mp, number) in [("disk0", 1), ("disk1", 0), ("disk2", 2)] {
            let dir = root.path().join(mp);
            fs::create_dir(&dir).unwrap();
            block_file(&dir, "rec", &[(number, b"12345678")]);
        }

        let mountpoints = [
            root.path().join("disk0"),
            root.path().join("disk1"),
            root.path().join("disk2"),
            root.path().join("disk3"),
        ];
        let chunks = scan_recording("rec", &mountpoints).unwrap();
        let numbers: Vec<u32> = chunks.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
    }
}
