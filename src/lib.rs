//! Device layer of a Rockchip firmware flashing tool.
//!
//! [`FlashComm`] drives one flash device through two handles: the raw LBA block node used
//! for sector reads and writes, and the vendor driver node used for ioctl commands. Both
//! are opened through a [`Devices`] provider, [`OsDevices`] on a real board.

mod comm;
mod config;
mod control;
mod error;
pub mod ioctl;
mod lba;
mod os;
mod storage;
mod util;

#[cfg(test)]
mod tests_util;

pub use comm::FlashComm;
pub use config::{DeviceConfig, EMMC_POINT_VAR};
pub use control::{BadBlockMap, FlashInfo, LockFlag, PublicKey};
pub use error::ErrorKind;
pub use lba::{LbaRange, PartitionLayout, StorageKind, Target};
pub use os::{FileBlockDevice, FileControl, OsDevices};
pub use storage::{BlockDevice, ControlChannel, Devices};

/// Bytes per sector. Every position and count in this crate is in sectors.
pub const SECTOR_SIZE: usize = 512;

/// Sectors reserved for the loader at the start of an eMMC without a GPT (4 MiB).
pub const GPT_OFFSET_SECTORS: u64 = 8192;
