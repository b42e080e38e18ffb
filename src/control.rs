use crate::error::ErrorKind;
use crate::SECTOR_SIZE;
use log::error;
use zerocopy::{AsBytes, FromBytes, LayoutVerified};

/// Every reply buffer handed to the driver is one sector long.
pub(crate) const REPLY_LEN: usize = SECTOR_SIZE;

#[derive(AsBytes, FromBytes, Clone, Copy)]
#[repr(C, packed)]
pub(crate) struct RawFlashInfo {
    pub(crate) flash_size: u32,
    pub(crate) block_size: u16,
    pub(crate) page_size: u8,
    pub(crate) ecc_bits: u8,
    pub(crate) access_time: u8,
    pub(crate) manufacturer: u8,
    pub(crate) chip_select: u8,
}

/// Flash geometry as reported by the vendor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashInfo {
    /// Total size in sectors.
    pub flash_size: u32,
    /// Erase block size in sectors.
    pub block_size: u16,
    /// Page size in sectors.
    pub page_size: u8,
    pub ecc_bits: u8,
    pub access_time: u8,
    pub manufacturer: u8,
    /// Bitmask of populated chip selects.
    pub chip_select: u8,
}

impl FlashInfo {
    pub fn size_bytes(&self) -> u64 {
        self.flash_size as u64 * SECTOR_SIZE as u64
    }
}

impl From<RawFlashInfo> for FlashInfo {
    fn from(raw: RawFlashInfo) -> Self {
        FlashInfo {
            flash_size: raw.flash_size,
            block_size: raw.block_size,
            page_size: raw.page_size,
            ecc_bits: raw.ecc_bits,
            access_time: raw.access_time,
            manufacturer: raw.manufacturer,
            chip_select: raw.chip_select,
        }
    }
}

impl TryFrom<&[u8]> for FlashInfo {
    type Error = ErrorKind;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: Option<(LayoutVerified<_, RawFlashInfo>, _)> =
            LayoutVerified::new_from_prefix(bytes);
        if let Some((raw, _)) = raw {
            return Ok((*raw).into());
        }

        error!("Flash info reply too short: {} bytes.", bytes.len());
        Err(ErrorKind::Failed)
    }
}

/// One bit per erase block, set when the block is bad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadBlockMap {
    bits: Vec<u8>,
}

impl BadBlockMap {
    pub fn is_bad(&self, block: usize) -> bool {
        self.bits
            .get(block / 8)
            .map(|byte| byte & (1 << (block % 8)) != 0)
            .unwrap_or(false)
    }

    pub fn bad_blocks(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bits.len() * 8).filter(move |block| self.is_bad(*block))
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|byte| byte.count_ones() as usize).sum()
    }
}

impl From<&[u8]> for BadBlockMap {
    fn from(bytes: &[u8]) -> Self {
        BadBlockMap {
            bits: bytes.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockFlag(pub u32);

impl LockFlag {
    pub fn is_locked(&self) -> bool {
        self.0 != 0
    }
}

#[derive(AsBytes, FromBytes, Clone, Copy)]
#[repr(C, packed)]
struct RawLockFlag {
    flag: u32,
}

impl TryFrom<&[u8]> for LockFlag {
    type Error = ErrorKind;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: Option<(LayoutVerified<_, RawLockFlag>, _)> =
            LayoutVerified::new_from_prefix(bytes);
        if let Some((raw, _)) = raw {
            return Ok(LockFlag(raw.flag));
        }

        error!("Lock flag reply too short: {} bytes.", bytes.len());
        Err(ErrorKind::Failed)
    }
}

/// Public key block stored by the driver for secure boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True when the driver has no key provisioned.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl From<&[u8]> for PublicKey {
    fn from(bytes: &[u8]) -> Self {
        PublicKey(bytes.to_vec())
    }
}
