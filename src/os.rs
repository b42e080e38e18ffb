use crate::error::{errno, ErrorKind};
use crate::ioctl;
use crate::storage::{BlockDevice, ControlChannel, Devices};
use log::{debug, trace};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Device nodes on the running system.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsDevices;

impl Devices for OsDevices {
    type Block = FileBlockDevice;
    type Control = FileControl;

    fn open_block(&self, path: &Path) -> Result<FileBlockDevice, ErrorKind> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)?;
        debug!("opened block device {}", path.display());
        Ok(FileBlockDevice {
            file,
            path: path.to_path_buf(),
        })
    }

    fn open_control(&self, path: &Path) -> Result<FileControl, ErrorKind> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        debug!("opened control device {}", path.display());
        Ok(FileControl {
            file,
            path: path.to_path_buf(),
        })
    }
}

#[derive(Debug)]
pub struct FileBlockDevice {
    file: File,
    path: PathBuf,
}

impl FileBlockDevice {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockDevice for FileBlockDevice {
    fn seek(&mut self, offset: u64) -> Result<u64, ErrorKind> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| ErrorKind::Seek(errno(&e)))
    }

    fn read(&mut self, data: &mut [u8]) -> Result<usize, ErrorKind> {
        let nbytes = loop {
            match self.file.read(data) {
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                res => break res?,
            }
        };
        trace!("rd {} of {} bytes from {}", nbytes, data.len(), self.path.display());
        Ok(nbytes)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ErrorKind> {
        let nbytes = loop {
            match self.file.write(data) {
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                res => break res?,
            }
        };
        trace!("wr {} of {} bytes to {}", nbytes, data.len(), self.path.display());
        Ok(nbytes)
    }

    fn size(&mut self) -> Result<u64, ErrorKind> {
        self.file
            .seek(SeekFrom::End(0))
            .map_err(|e| ErrorKind::Seek(errno(&e)))
    }

    fn discard(&mut self, offset: u64, len: u64) -> Result<(), ErrorKind> {
        let mut range = [offset, len];
        // SAFETY: BLKDISCARD reads two u64s from the pointer, which outlives the call.
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                ioctl::BLKDISCARD as _,
                range.as_mut_ptr(),
            )
        };
        if ret < 0 {
            return Err(ErrorKind::Discard(errno(&std::io::Error::last_os_error())));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FileControl {
    file: File,
    path: PathBuf,
}

impl FileControl {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ControlChannel for FileControl {
    fn ioctl(&mut self, request: u32, arg: Option<&mut [u8]>) -> Result<(), ErrorKind> {
        let ptr = match arg {
            Some(buf) => buf.as_mut_ptr() as *mut libc::c_void,
            None => core::ptr::null_mut(),
        };
        // SAFETY: the driver only touches the caller's buffer, which is sized for the request.
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, ptr) };
        if ret < 0 {
            return Err(ErrorKind::Ioctl(errno(&std::io::Error::last_os_error())));
        }
        Ok(())
    }
}
