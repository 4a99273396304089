pub const VBSFS: &str = "vbsfs";

/// A recording handle as returned by the open calls.
///
/// Handles are minted downwards from [HANDLE_START] so they stay clearly
/// apart from kernel file descriptors when both travel through the same
/// integer-typed plumbing.
pub type Handle = i32;
pub const HANDLE_START: Handle = i32::MAX;

/// Width of the zero-padded decimal suffix on scattered chunk files,
/// as in `recording.00000042`.
pub const CHUNK_SUFFIX_DIGITS: usize = 8;

// On-disk layout of the packed block format. The producer writes these
// little-endian; the sizes are part of the format and never change.
pub const MARK6_SG_SYNC_WORD: u64 = 0xfeed_6666;
pub const MARK6_SG_VERSION: i32 = 2;
pub const FILE_HEADER_BYTES: usize = 24;
pub const BLOCK_HEADER_BYTES: usize = 8;
