use crate::config::DeviceConfig;
use crate::control::{BadBlockMap, FlashInfo, LockFlag, PublicKey, REPLY_LEN};
use crate::error::ErrorKind;
use crate::ioctl;
use crate::lba::{LbaRange, PartitionLayout, StorageKind, Target};
use crate::storage::{BlockDevice, ControlChannel, Devices};
use crate::util::{SectorHeader, CRC, SECTOR_HEADER_LEN};
use crate::SECTOR_SIZE;
use log::{debug, error, info, trace, warn};
use std::path::Path;

/// Sectors moved per transfer when checksumming a range.
const CHECKSUM_CHUNK_SECTORS: u64 = 128;

/// Communication with one flash device through its LBA node and its vendor control node.
pub struct FlashComm<D: Devices> {
    devices: D,
    config: DeviceConfig,
    kind: StorageKind,
    layout: PartitionLayout,
    /// Cached flash size in sectors, only known up front for eMMC.
    flash_sectors: Option<u64>,
    lba: Option<D::Block>,
    control: Option<D::Control>,
}

fn open_first<T, F>(what: &str, paths: &[&Path], open: F) -> Option<T>
where
    F: Fn(&Path) -> Result<T, ErrorKind>,
{
    for path in paths {
        match open(path) {
            Ok(dev) => {
                info!("{} opened: {}", what, path.display());
                return Some(dev);
            }
            Err(e) => error!("{} open failed: {} ({})", what, path.display(), e),
        }
    }
    None
}

impl<D: Devices> FlashComm<D> {
    /// Detect the storage kind and acquire device handles.
    ///
    /// Open failures are logged and leave the affected handle closed. Operations needing
    /// it fail with [`ErrorKind::DeviceNotOpen`].
    pub fn open(devices: D, config: DeviceConfig) -> Self {
        let mut kind = StorageKind::Nand;
        let mut flash_sectors = None;

        if let Some(point) = config.emmc_point.as_deref() {
            match devices.open_block(point) {
                Ok(mut emmc) => {
                    kind = StorageKind::Emmc;
                    match emmc.size() {
                        Ok(bytes) => {
                            flash_sectors = Some(bytes / SECTOR_SIZE as u64);
                            info!("emmc {}: {} bytes", point.display(), bytes);
                        }
                        Err(e) => error!("emmc {}: size query failed ({})", point.display(), e),
                    }
                }
                Err(e) => info!("emmc open {} failed ({}), using nand", point.display(), e),
            }
        } else {
            info!("no emmc point configured, using nand");
        }

        let (control_paths, lba_path) = match kind {
            StorageKind::Emmc => (
                [
                    config.emmc_vendor_control.as_path(),
                    config.emmc_control.as_path(),
                ],
                config.emmc_point.as_deref(),
            ),
            StorageKind::Nand => (
                [
                    config.nand_vendor_control.as_path(),
                    config.nand_control.as_path(),
                ],
                Some(config.nand_lba.as_path()),
            ),
        };
        let control = open_first("control", &control_paths, |p| devices.open_control(p));
        let lba = match lba_path {
            Some(path) => open_first("lba", &[path], |p| devices.open_block(p)),
            None => None,
        };

        let layout = config.layout;
        FlashComm {
            devices,
            config,
            kind,
            layout,
            flash_sectors,
            lba,
            control,
        }
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.kind
    }

    pub fn layout(&self) -> PartitionLayout {
        self.layout
    }

    /// Update the partition layout once the owner of the partition table has decided it.
    pub fn set_layout(&mut self, layout: PartitionLayout) {
        debug!("partition layout {:?} -> {:?}", self.layout, layout);
        self.layout = layout;
    }

    pub fn devices(&self) -> &D {
        &self.devices
    }

    pub fn is_lba_open(&self) -> bool {
        self.lba.is_some()
    }

    pub fn is_control_open(&self) -> bool {
        self.control.is_some()
    }

    /// Make sure the LBA handle is usable, reopening the NAND LBA node if needed.
    ///
    /// eMMC handles are only acquired at construction and never reopened here.
    pub fn ensure_lba(&mut self) -> Result<&mut D::Block, ErrorKind> {
        if self.lba.is_none() {
            if self.kind == StorageKind::Emmc {
                error!("emmc lba device not open");
                return Err(ErrorKind::DeviceNotOpen);
            }
            let path = self.config.nand_lba.as_path();
            match self.devices.open_block(path) {
                Ok(dev) => {
                    info!("lba reopened: {}", path.display());
                    self.lba = Some(dev);
                }
                Err(e) => {
                    error!("lba reopen failed: {} ({})", path.display(), e);
                    return Err(ErrorKind::DeviceNotOpen);
                }
            }
        }
        self.lba.as_mut().ok_or(ErrorKind::DeviceNotOpen)
    }

    /// Flash size in sectors.
    pub fn flash_size(&mut self) -> Result<u64, ErrorKind> {
        if let Some(sectors) = self.flash_sectors {
            return Ok(sectors);
        }
        let bytes = self.ensure_lba()?.size().map_err(|e| {
            error!("flash size query failed ({})", e);
            e
        })?;
        Ok(bytes / SECTOR_SIZE as u64)
    }

    pub fn read_lba(
        &mut self,
        position: u64,
        count: u64,
        data: &mut [u8],
    ) -> Result<(), ErrorKind> {
        let range = LbaRange::new(position, count);
        let offset = range.byte_offset(self.kind, self.layout, Target::Data)?;
        let len = range.byte_len()?;
        let dev = self.ensure_lba()?;
        if data.len() < len {
            error!("read_lba: buffer {} < {} bytes", data.len(), len);
            return Err(ErrorKind::InvalidArgument);
        }
        if len == 0 {
            return Ok(());
        }
        trace!("read_lba pos: {} count: {} offset: {:#x}", position, count, offset);

        dev.seek(offset).map_err(|e| {
            error!("read_lba: seek to {:#x} failed ({})", offset, e);
            e
        })?;
        let nbytes = dev.read(&mut data[..len]).map_err(|e| {
            error!("read_lba: read at {:#x} failed ({})", offset, e);
            e
        })?;
        if nbytes != len {
            error!("read_lba: short read {} of {} bytes at {:#x}", nbytes, len, offset);
            return Err(ErrorKind::ShortRead);
        }
        Ok(())
    }

    pub fn write_lba(&mut self, position: u64, count: u64, data: &[u8]) -> Result<(), ErrorKind> {
        self.write_range(LbaRange::new(position, count), Target::Data, data)
    }

    /// Write a bootloader image, addressed from the raw start of the device whatever the layout.
    pub fn write_lba_loader(
        &mut self,
        position: u64,
        count: u64,
        data: &[u8],
    ) -> Result<(), ErrorKind> {
        self.write_range(LbaRange::new(position, count), Target::Loader, data)
    }

    fn write_range(
        &mut self,
        range: LbaRange,
        target: Target,
        data: &[u8],
    ) -> Result<(), ErrorKind> {
        let offset = range.byte_offset(self.kind, self.layout, target)?;
        let len = range.byte_len()?;
        let backoff = self.config.short_write_backoff;
        let dev = self.ensure_lba()?;
        if data.len() < len {
            error!("write_lba: buffer {} < {} bytes", data.len(), len);
            return Err(ErrorKind::InvalidArgument);
        }
        if len == 0 {
            return Ok(());
        }
        trace!(
            "write_lba pos: {} count: {} offset: {:#x} target: {:?}",
            range.position,
            range.count,
            offset,
            target
        );

        dev.seek(offset).map_err(|e| {
            error!("write_lba: seek to {:#x} failed ({})", offset, e);
            e
        })?;
        let nbytes = dev.write(&data[..len]).map_err(|e| {
            error!("write_lba: write at {:#x} failed ({})", offset, e);
            e
        })?;
        if nbytes != len {
            warn!("write_lba: short write {} of {} bytes at {:#x}", nbytes, len, offset);
            std::thread::sleep(backoff);
            return Err(ErrorKind::ShortWrite);
        }
        Ok(())
    }

    /// Discard a sector range on the LBA device.
    pub fn erase_lba(&mut self, position: u64, count: u64) -> Result<(), ErrorKind> {
        let range = LbaRange::new(position, count);
        let offset = range.byte_offset(self.kind, self.layout, Target::Data)?;
        let len = range.byte_len()? as u64;
        let dev = self.ensure_lba()?;
        if len == 0 {
            return Ok(());
        }
        debug!("erase_lba pos: {} count: {} offset: {:#x}", position, count, offset);
        dev.discard(offset, len).map_err(|e| {
            error!("erase_lba: discard {:#x}+{:#x} failed ({})", offset, len, e);
            e
        })
    }

    /// CRC-32 of a sector range as read back from the device.
    pub fn lba_checksum(&mut self, position: u64, count: u64) -> Result<u32, ErrorKind> {
        let mut digest = CRC.digest();
        let mut buf = vec![0u8; CHECKSUM_CHUNK_SECTORS as usize * SECTOR_SIZE];
        let mut done = 0;
        while done < count {
            let chunk = core::cmp::min(CHECKSUM_CHUNK_SECTORS, count - done);
            let len = chunk as usize * SECTOR_SIZE;
            self.read_lba(position + done, chunk, &mut buf[..len])?;
            digest.update(&buf[..len]);
            done += chunk;
        }
        Ok(digest.finalize())
    }

    /// Read back the range `data` was written to and compare it.
    pub fn verify_lba(&mut self, position: u64, data: &[u8]) -> Result<(), ErrorKind> {
        if data.len() % SECTOR_SIZE != 0 {
            return Err(ErrorKind::InvalidArgument);
        }
        let count = (data.len() / SECTOR_SIZE) as u64;
        let expected = CRC.checksum(data);
        let actual = self.lba_checksum(position, count)?;
        if expected != actual {
            error!(
                "verify_lba pos: {} count: {} crc {:#010x} != {:#010x}",
                position, count, actual, expected
            );
            return Err(ErrorKind::VerifyMismatch);
        }
        Ok(())
    }

    /// Both handles are open, reopening the NAND LBA node if it was lost.
    pub fn test_device_ready(&mut self) -> Result<(), ErrorKind> {
        self.ensure_lba()?;
        if self.control.is_none() {
            return Err(ErrorKind::DeviceNotOpen);
        }
        Ok(())
    }

    fn control_ioctl(
        &mut self,
        name: &str,
        request: u32,
        arg: Option<&mut [u8]>,
    ) -> Result<(), ErrorKind> {
        let control = match self.control.as_mut() {
            Some(control) => control,
            None => {
                error!("{}: control device not open", name);
                return Err(ErrorKind::DeviceNotOpen);
            }
        };
        trace!("{}: ioctl {:#x}", name, request);
        control.ioctl(request, arg).map_err(|e| {
            error!("{}: ioctl {:#x} failed ({})", name, request, e);
            e
        })
    }

    fn control_reply(&mut self, name: &str, request: u32) -> Result<Vec<u8>, ErrorKind> {
        let mut reply = vec![0u8; REPLY_LEN];
        self.control_ioctl(name, request, Some(&mut reply[..]))?;
        Ok(reply)
    }

    pub fn read_bad_block(&mut self) -> Result<BadBlockMap, ErrorKind> {
        let reply = self.control_reply("read_bad_block", ioctl::GET_BAD_BLOCK)?;
        Ok(BadBlockMap::from(&reply[..]))
    }

    pub fn read_flash_info(&mut self) -> Result<FlashInfo, ErrorKind> {
        let reply = self.control_reply("read_flash_info", ioctl::GET_FLASH_INFO)?;
        FlashInfo::try_from(&reply[..])
    }

    pub fn get_lock_flag(&mut self) -> Result<LockFlag, ErrorKind> {
        let reply = self.control_reply("get_lock_flag", ioctl::GET_LOCK_FLAG)?;
        LockFlag::try_from(&reply[..])
    }

    pub fn get_public_key(&mut self) -> Result<PublicKey, ErrorKind> {
        let reply = self.control_reply("get_public_key", ioctl::GET_PUBLIC_KEY)?;
        Ok(PublicKey::from(&reply[..]))
    }

    /// Read sectors through the vendor driver rather than the LBA node.
    pub fn read_sector(
        &mut self,
        position: u32,
        count: u32,
        data: &mut [u8],
    ) -> Result<(), ErrorKind> {
        let len = LbaRange::new(position as u64, count as u64).byte_len()?;
        if data.len() < len {
            return Err(ErrorKind::InvalidArgument);
        }
        let mut buf = SectorHeader::new(position, count).transfer_buffer(len);
        self.control_ioctl("read_sector", ioctl::READ_SECTOR, Some(&mut buf[..]))?;
        data[..len].copy_from_slice(&buf[SECTOR_HEADER_LEN..]);
        Ok(())
    }

    /// Write sectors through the vendor driver rather than the LBA node.
    pub fn write_sector(
        &mut self,
        position: u32,
        count: u32,
        data: &[u8],
    ) -> Result<(), ErrorKind> {
        let len = LbaRange::new(position as u64, count as u64).byte_len()?;
        if data.len() < len {
            return Err(ErrorKind::InvalidArgument);
        }
        let mut buf = SectorHeader::new(position, count).transfer_buffer(len);
        buf[SECTOR_HEADER_LEN..].copy_from_slice(&data[..len]);
        self.control_ioctl("write_sector", ioctl::WRITE_SECTOR, Some(&mut buf[..]))
    }

    /// Tell the driver a sequence of `write_sector` calls is complete.
    pub fn end_write_sector(&mut self) -> Result<(), ErrorKind> {
        let mut buf = [0u8; REPLY_LEN];
        self.control_ioctl("end_write_sector", ioctl::END_WRITE_SECTOR, Some(&mut buf[..]))
    }

    pub fn enable_nand_lba_read(&mut self) -> Result<(), ErrorKind> {
        self.control_ioctl("enable_nand_lba_read", ioctl::ENABLE_NAND_LBA_READ, None)
    }

    pub fn disable_nand_lba_read(&mut self) -> Result<(), ErrorKind> {
        self.control_ioctl("disable_nand_lba_read", ioctl::DISABLE_NAND_LBA_READ, None)
    }

    pub fn enable_nand_lba_write(&mut self) -> Result<(), ErrorKind> {
        self.control_ioctl("enable_nand_lba_write", ioctl::ENABLE_NAND_LBA_WRITE, None)
    }

    pub fn disable_nand_lba_write(&mut self) -> Result<(), ErrorKind> {
        self.control_ioctl("disable_nand_lba_write", ioctl::DISABLE_NAND_LBA_WRITE, None)
    }
}

impl<D: Devices> Drop for FlashComm<D> {
    fn drop(&mut self) {
        debug!(
            "closing flash comm (lba open: {}, control open: {})",
            self.lba.is_some(),
            self.control.is_some()
        );
    }
}
