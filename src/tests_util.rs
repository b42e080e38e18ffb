use crate::config::DeviceConfig;
use crate::error::ErrorKind;
use crate::ioctl;
use crate::lba::PartitionLayout;
use crate::storage::{BlockDevice, ControlChannel, Devices};
use crate::util::{SectorHeader, SECTOR_HEADER_LEN};
use crate::SECTOR_SIZE;
use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use zerocopy::LayoutVerified;

pub(crate) const EMMC_POINT: &str = "/dev/block/mmcblk0";

pub(crate) fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic non-repeating-per-sector test data.
pub(crate) fn pattern(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i * 31 + i / SECTOR_SIZE * 7) % 251) as u8)
        .collect()
}

pub(crate) fn emmc_config(layout: PartitionLayout) -> DeviceConfig {
    DeviceConfig {
        emmc_point: Some(PathBuf::from(EMMC_POINT)),
        layout,
        short_write_backoff: Duration::ZERO,
        ..DeviceConfig::default()
    }
}

pub(crate) fn nand_config() -> DeviceConfig {
    DeviceConfig {
        short_write_backoff: Duration::ZERO,
        ..DeviceConfig::default()
    }
}

/// Decode the transfer prefix the way the vendor driver sees it.
pub(crate) fn parse_sector_header(bytes: &[u8]) -> Option<SectorHeader> {
    let header: Option<(LayoutVerified<_, SectorHeader>, _)> =
        LayoutVerified::new_from_prefix(bytes);
    header.map(|(header, _)| *header)
}

pub(crate) fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rkflash-{}-{}", std::process::id(), name))
}

/// Regular file standing in for a device node, removed on drop.
pub(crate) struct ScratchFile(PathBuf);

impl ScratchFile {
    pub(crate) fn new(name: &str, len: u64) -> Self {
        let path = scratch_path(name);
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(len).unwrap();
        ScratchFile(path)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[derive(Default)]
pub(crate) struct RamState {
    pub(crate) data: Vec<u8>,
    pub(crate) pos: u64,
    pub(crate) seeks: Vec<u64>,
    pub(crate) reads: usize,
    pub(crate) writes: usize,
    pub(crate) discards: Vec<(u64, u64)>,
    /// Cap on bytes moved per read, to simulate short reads.
    pub(crate) read_limit: Option<usize>,
    pub(crate) write_limit: Option<usize>,
    pub(crate) seek_errno: Option<i32>,
    pub(crate) discard_errno: Option<i32>,
}

/// In-memory block device. Clones share the same backing store.
#[derive(Clone, Default)]
pub(crate) struct RamBlockDevice(Rc<RefCell<RamState>>);

impl RamBlockDevice {
    pub(crate) fn new(nbytes: usize) -> Self {
        RamBlockDevice(Rc::new(RefCell::new(RamState {
            data: vec![0u8; nbytes],
            ..RamState::default()
        })))
    }

    pub(crate) fn state(&self) -> RefMut<'_, RamState> {
        self.0.borrow_mut()
    }
}

impl BlockDevice for RamBlockDevice {
    fn seek(&mut self, offset: u64) -> Result<u64, ErrorKind> {
        let mut state = self.state();
        if let Some(errno) = state.seek_errno {
            return Err(ErrorKind::Seek(errno));
        }
        state.seeks.push(offset);
        state.pos = offset;
        Ok(offset)
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize, ErrorKind> {
        let mut state = self.state();
        state.reads += 1;
        let start = core::cmp::min(state.pos as usize, state.data.len());
        let limits = [
            data.len(),
            state.data.len() - start,
            state.read_limit.unwrap_or(usize::MAX),
        ];
        let nbytes = *limits.iter().min().unwrap();
        data[..nbytes].copy_from_slice(&state.data[start..start + nbytes]);
        state.pos += nbytes as u64;
        Ok(nbytes)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ErrorKind> {
        let mut state = self.state();
        state.writes += 1;
        let start = core::cmp::min(state.pos as usize, state.data.len());
        let limits = [
            data.len(),
            state.data.len() - start,
            state.write_limit.unwrap_or(usize::MAX),
        ];
        let nbytes = *limits.iter().min().unwrap();
        state.data[start..start + nbytes].copy_from_slice(&data[..nbytes]);
        state.pos += nbytes as u64;
        Ok(nbytes)
    }

    fn size(&mut self) -> Result<u64, ErrorKind> {
        let mut state = self.state();
        if let Some(errno) = state.seek_errno {
            return Err(ErrorKind::Seek(errno));
        }
        state.pos = state.data.len() as u64;
        Ok(state.pos)
    }

    fn discard(&mut self, offset: u64, len: u64) -> Result<(), ErrorKind> {
        let mut state = self.state();
        if let Some(errno) = state.discard_errno {
            return Err(ErrorKind::Discard(errno));
        }
        let end = (offset + len) as usize;
        if end > state.data.len() {
            return Err(ErrorKind::Discard(libc::EINVAL));
        }
        state.data[offset as usize..end].fill(0);
        state.discards.push((offset, len));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct ControlState {
    pub(crate) requests: Vec<u32>,
    pub(crate) replies: HashMap<u32, Vec<u8>>,
    pub(crate) failures: HashMap<u32, i32>,
    /// Backing store for the driver's own sector read/write path.
    pub(crate) sectors: Vec<u8>,
}

/// Vendor driver stand-in. Clones share state.
#[derive(Clone, Default)]
pub(crate) struct FakeControl(Rc<RefCell<ControlState>>);

impl FakeControl {
    pub(crate) fn new(nsectors: usize) -> Self {
        FakeControl(Rc::new(RefCell::new(ControlState {
            sectors: vec![0u8; nsectors * SECTOR_SIZE],
            ..ControlState::default()
        })))
    }

    pub(crate) fn state(&self) -> RefMut<'_, ControlState> {
        self.0.borrow_mut()
    }

    pub(crate) fn reply(&self, request: u32, bytes: &[u8]) {
        self.state().replies.insert(request, bytes.to_vec());
    }

    pub(crate) fn fail(&self, request: u32, errno: i32) {
        self.state().failures.insert(request, errno);
    }
}

impl ControlChannel for FakeControl {
    fn ioctl(&mut self, request: u32, arg: Option<&mut [u8]>) -> Result<(), ErrorKind> {
        let mut state = self.state();
        state.requests.push(request);
        if let Some(errno) = state.failures.get(&request) {
            return Err(ErrorKind::Ioctl(*errno));
        }

        let arg = match arg {
            Some(arg) => arg,
            None => return Ok(()),
        };
        match request {
            ioctl::READ_SECTOR | ioctl::WRITE_SECTOR => {
                let header = parse_sector_header(arg).ok_or(ErrorKind::Ioctl(libc::EINVAL))?;
                let start = header.position as usize * SECTOR_SIZE;
                let end = start + header.count as usize * SECTOR_SIZE;
                let payload = &mut arg[SECTOR_HEADER_LEN..];
                if end > state.sectors.len() || payload.len() < end - start {
                    return Err(ErrorKind::Ioctl(libc::EINVAL));
                }
                if request == ioctl::READ_SECTOR {
                    payload[..end - start].copy_from_slice(&state.sectors[start..end]);
                } else {
                    state.sectors[start..end].copy_from_slice(&payload[..end - start]);
                }
            }
            _ => {
                if let Some(reply) = state.replies.get(&request) {
                    let nbytes = core::cmp::min(reply.len(), arg.len());
                    arg[..nbytes].copy_from_slice(&reply[..nbytes]);
                }
            }
        }
        Ok(())
    }
}

/// Device nodes keyed by path. Paths not registered fail to open with `ENOENT`.
#[derive(Default)]
pub(crate) struct FakeDevices {
    blocks: RefCell<HashMap<PathBuf, RamBlockDevice>>,
    controls: RefCell<HashMap<PathBuf, FakeControl>>,
    pub(crate) attempts: RefCell<Vec<PathBuf>>,
}

impl FakeDevices {
    pub(crate) fn with_block<P: AsRef<Path>>(self, path: P, dev: &RamBlockDevice) -> Self {
        self.add_block(path, dev);
        self
    }

    pub(crate) fn with_control<P: AsRef<Path>>(self, path: P, control: &FakeControl) -> Self {
        self.controls
            .borrow_mut()
            .insert(path.as_ref().to_path_buf(), control.clone());
        self
    }

    pub(crate) fn add_block<P: AsRef<Path>>(&self, path: P, dev: &RamBlockDevice) {
        self.blocks
            .borrow_mut()
            .insert(path.as_ref().to_path_buf(), dev.clone());
    }

    pub(crate) fn attempted<P: AsRef<Path>>(&self, path: P) -> usize {
        self.attempts
            .borrow()
            .iter()
            .filter(|p| p.as_path() == path.as_ref())
            .count()
    }
}

impl Devices for FakeDevices {
    type Block = RamBlockDevice;
    type Control = FakeControl;

    fn open_block(&self, path: &Path) -> Result<RamBlockDevice, ErrorKind> {
        self.attempts.borrow_mut().push(path.to_path_buf());
        self.blocks
            .borrow()
            .get(path)
            .cloned()
            .ok_or(ErrorKind::Io(libc::ENOENT))
    }

    fn open_control(&self, path: &Path) -> Result<FakeControl, ErrorKind> {
        self.attempts.borrow_mut().push(path.to_path_buf());
        self.controls
            .borrow()
            .get(path)
            .cloned()
            .ok_or(ErrorKind::Io(libc::ENOENT))
    }
}
