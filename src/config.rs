use crate::lba::PartitionLayout;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the eMMC raw block device path.
pub const EMMC_POINT_VAR: &str = "emmc_point_name";

pub const EMMC_VENDOR_CONTROL_DEV: &str = "/dev/vendor_storage";
pub const EMMC_CONTROL_DEV: &str = "/dev/rkemmc_sys";
pub const NAND_VENDOR_CONTROL_DEV: &str = "/dev/vendor_storage";
pub const NAND_CONTROL_DEV: &str = "/dev/rknand_sys_storage";
pub const NAND_LBA_DEV: &str = "/dev/rknand0";

const SHORT_WRITE_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// eMMC block device to try first. Absent means the board is treated as NAND.
    pub emmc_point: Option<PathBuf>,
    pub emmc_vendor_control: PathBuf,
    pub emmc_control: PathBuf,
    pub nand_vendor_control: PathBuf,
    pub nand_control: PathBuf,
    pub nand_lba: PathBuf,
    pub layout: PartitionLayout,
    /// Pause taken once after a short write before it is reported.
    pub short_write_backoff: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            emmc_point: None,
            emmc_vendor_control: PathBuf::from(EMMC_VENDOR_CONTROL_DEV),
            emmc_control: PathBuf::from(EMMC_CONTROL_DEV),
            nand_vendor_control: PathBuf::from(NAND_VENDOR_CONTROL_DEV),
            nand_control: PathBuf::from(NAND_CONTROL_DEV),
            nand_lba: PathBuf::from(NAND_LBA_DEV),
            layout: PartitionLayout::default(),
            short_write_backoff: SHORT_WRITE_BACKOFF,
        }
    }
}

impl DeviceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Build a configuration resolving environment variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let emmc_point = lookup(EMMC_POINT_VAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        DeviceConfig {
            emmc_point,
            ..Self::default()
        }
    }

    pub fn with_layout(mut self, layout: PartitionLayout) -> Self {
        self.layout = layout;
        self
    }
}
