use crate::error::ErrorKind;
use crate::{GPT_OFFSET_SECTORS, SECTOR_SIZE};

/// Flash technology behind the LBA device, fixed once the device is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Emmc,
    Nand,
}

/// Partition layout of the device as decided by whoever owns the partition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionLayout {
    Gpt,
    /// Parameter-file layout with the loader region reserved at the start of the device.
    Legacy,
}

impl Default for PartitionLayout {
    fn default() -> Self {
        PartitionLayout::Legacy
    }
}

/// What a transfer is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Data,
    /// Bootloader image, always addressed from the raw start of the device.
    Loader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbaRange {
    pub position: u64,
    pub count: u64,
}

impl LbaRange {
    pub fn new(position: u64, count: u64) -> Self {
        LbaRange { position, count }
    }

    pub fn byte_len(&self) -> Result<usize, ErrorKind> {
        let len = self
            .count
            .checked_mul(SECTOR_SIZE as u64)
            .ok_or(ErrorKind::InvalidArgument)?;
        usize::try_from(len).map_err(|_| ErrorKind::InvalidArgument)
    }

    /// Sector the transfer really starts at once the reserved loader region is accounted for.
    pub fn device_sector(
        &self,
        kind: StorageKind,
        layout: PartitionLayout,
        target: Target,
    ) -> Result<u64, ErrorKind> {
        let reserved = match (kind, layout, target) {
            (StorageKind::Emmc, PartitionLayout::Legacy, Target::Data) => GPT_OFFSET_SECTORS,
            _ => 0,
        };
        self.position
            .checked_add(reserved)
            .ok_or(ErrorKind::InvalidArgument)
    }

    pub fn byte_offset(
        &self,
        kind: StorageKind,
        layout: PartitionLayout,
        target: Target,
    ) -> Result<u64, ErrorKind> {
        self.device_sector(kind, layout, target)?
            .checked_mul(SECTOR_SIZE as u64)
            .ok_or(ErrorKind::InvalidArgument)
    }
}
