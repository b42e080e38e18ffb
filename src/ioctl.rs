//! Request codes understood by the Rockchip flash vendor driver.
//!
//! Encoded the way the Linux `_IO`/`_IOW` macros lay them out.

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;

const IOC_SIZEMASK: u32 = (1 << 14) - 1;

const fn ioc(dir: u32, ty: u8, nr: u8, size: usize) -> u32 {
    (dir << IOC_DIRSHIFT)
        | (((size as u32) & IOC_SIZEMASK) << IOC_SIZESHIFT)
        | ((ty as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
}

pub const fn io(ty: u8, nr: u8) -> u32 {
    ioc(IOC_NONE, ty, nr, 0)
}

pub const fn iow(ty: u8, nr: u8, size: usize) -> u32 {
    ioc(IOC_WRITE, ty, nr, size)
}

const WORD: usize = core::mem::size_of::<u32>();

pub const READ_SECTOR: u32 = iow(b'r', 0x04, WORD);
pub const WRITE_SECTOR: u32 = iow(b'r', 0x05, WORD);
pub const END_WRITE_SECTOR: u32 = iow(b'r', 0x06, WORD);
pub const GET_FLASH_INFO: u32 = iow(b'r', 0x07, WORD);
pub const GET_BAD_BLOCK: u32 = iow(b'r', 0x08, WORD);
pub const GET_LOCK_FLAG: u32 = iow(b'r', 0x09, WORD);
pub const GET_PUBLIC_KEY: u32 = iow(b'r', 0x0a, WORD);

pub const DISABLE_NAND_LBA_WRITE: u32 = io(b'V', 0x05);
pub const ENABLE_NAND_LBA_WRITE: u32 = io(b'V', 0x06);
pub const DISABLE_NAND_LBA_READ: u32 = io(b'V', 0x07);
pub const ENABLE_NAND_LBA_READ: u32 = io(b'V', 0x08);

/// `BLKDISCARD` from `<linux/fs.h>`.
pub const BLKDISCARD: u32 = io(0x12, 119);
