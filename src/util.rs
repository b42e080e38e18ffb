use zerocopy::{AsBytes, FromBytes};

pub(crate) static CRC: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_CKSUM);

/// Prefix of every sector transfer buffer handed to the control driver.
#[derive(Debug, AsBytes, FromBytes, Clone, Copy, PartialEq, Eq)]
#[repr(C, packed)]
pub(crate) struct SectorHeader {
    pub(crate) position: u32,
    pub(crate) count: u32,
}

pub(crate) const SECTOR_HEADER_LEN: usize = core::mem::size_of::<SectorHeader>();

impl SectorHeader {
    pub(crate) fn new(position: u32, count: u32) -> Self {
        SectorHeader { position, count }
    }

    /// Build a transfer buffer with the header followed by `payload_len` bytes.
    pub(crate) fn transfer_buffer(&self, payload_len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; SECTOR_HEADER_LEN + payload_len];
        buf[..SECTOR_HEADER_LEN].copy_from_slice(self.as_bytes());
        buf
    }

}
