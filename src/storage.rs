use crate::error::ErrorKind;
use std::path::Path;

/// Raw byte-addressed access to the LBA device node.
///
/// Implementations report what the OS did; deciding whether a short transfer is an
/// error is left to the caller.
pub trait BlockDevice {
    fn seek(&mut self, offset: u64) -> Result<u64, ErrorKind>;
    fn read(&mut self, data: &mut [u8]) -> Result<usize, ErrorKind>;
    fn write(&mut self, data: &[u8]) -> Result<usize, ErrorKind>;
    /// Length of the device in bytes.
    fn size(&mut self) -> Result<u64, ErrorKind>;
    fn discard(&mut self, offset: u64, len: u64) -> Result<(), ErrorKind>;
}

/// Out-of-band command channel to the flash vendor driver.
pub trait ControlChannel {
    /// Issue `request`, with `arg` passed to the driver as the in/out buffer when present.
    fn ioctl(&mut self, request: u32, arg: Option<&mut [u8]>) -> Result<(), ErrorKind>;
}

/// Opens device nodes by path.
pub trait Devices {
    type Block: BlockDevice;
    type Control: ControlChannel;

    fn open_block(&self, path: &Path) -> Result<Self::Block, ErrorKind>;
    fn open_control(&self, path: &Path) -> Result<Self::Control, ErrorKind>;
}
