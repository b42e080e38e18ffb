use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The handle needed for the operation is closed and could not be reopened.
    DeviceNotOpen,
    /// Positioning the LBA device failed, carries the OS errno.
    Seek(i32),
    ShortRead,
    ShortWrite,
    /// The control driver rejected an ioctl, carries the OS errno.
    Ioctl(i32),
    /// The block layer rejected a discard request, carries the OS errno.
    Discard(i32),
    /// Any other OS level I/O failure, carries the OS errno.
    Io(i32),
    InvalidArgument,
    VerifyMismatch,
    Failed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::DeviceNotOpen => write!(f, "device not open"),
            ErrorKind::Seek(errno) => write!(f, "seek failed (errno {})", errno),
            ErrorKind::ShortRead => write!(f, "short read"),
            ErrorKind::ShortWrite => write!(f, "short write"),
            ErrorKind::Ioctl(errno) => write!(f, "ioctl failed (errno {})", errno),
            ErrorKind::Discard(errno) => write!(f, "discard failed (errno {})", errno),
            ErrorKind::Io(errno) => write!(f, "i/o error (errno {})", errno),
            ErrorKind::InvalidArgument => write!(f, "invalid argument"),
            ErrorKind::VerifyMismatch => write!(f, "read back data does not match"),
            ErrorKind::Failed => write!(f, "operation failed"),
        }
    }
}

impl std::error::Error for ErrorKind {}

pub(crate) fn errno(err: &std::io::Error) -> i32 {
    err.raw_os_error().unwrap_or(libc::EIO)
}

impl From<std::io::Error> for ErrorKind {
    fn from(err: std::io::Error) -> Self {
        ErrorKind::Io(errno(&err))
    }
}
