use std::path::PathBuf;

use snafu::{Location, Snafu};
use vbsfs_types::{chunk, Errno, ToErrno};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid argument"))]
    InvalidArgument {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("read buffer is not a usable address"))]
    BadAddress {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("no open recording behind handle {}", handle))]
    BadHandle {
        handle: i32,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("no chunks found for recording '{}'", name))]
    NotFound {
        name: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "bogus block header @{} in {}: block# {}, sz={}",
        pos,
        path.display(),
        number,
        size
    ))]
    CorruptBlockHeader {
        path: PathBuf,
        pos: u64,
        number: i32,
        size: i32,
        #[snafu(implicit)]
        location: Location,
    },

    ChunkError {
        source: chunk::Error,
    },

    UnknownIO {
        #[snafu(implicit)]
        location: Location,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<chunk::Error> for Error {
    fn from(value: chunk::Error) -> Self {
        Self::ChunkError { source: value }
    }
}

impl ToErrno for Error {
    fn to_errno(&self) -> Errno {
        match self {
            Self::InvalidArgument { .. } => libc::EINVAL,
            Self::BadAddress { .. } => libc::EFAULT,
            Self::BadHandle { .. } => libc::EBADF,
            Self::NotFound { .. } => libc::ENOENT,
            Self::CorruptBlockHeader { .. } => libc::EIO,
            Self::ChunkError { .. } => libc::EEXIST,
            Self::UnknownIO { source, .. } => source.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}
