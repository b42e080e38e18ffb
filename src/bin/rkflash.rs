use log::{error, info, warn, LevelFilter};
use rkflash::{DeviceConfig, FlashComm, LbaRange, OsDevices, PartitionLayout, SECTOR_SIZE};
use std::error::Error;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(name = "rkflash", about = "Read, write and query Rockchip flash devices")]
struct Opt {
    /// eMMC block device to try first, overrides $emmc_point_name.
    #[structopt(long, parse(from_os_str))]
    emmc_point: Option<PathBuf>,

    /// Device uses a GPT, so data sectors are not shifted past the loader region.
    #[structopt(long)]
    gpt: bool,

    #[structopt(short, long, parse(from_occurrences))]
    verbose: u8,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Show storage kind, flash size and driver flash info.
    Info,
    /// Copy sectors from the device into a file.
    Read {
        position: u64,
        count: u64,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
    /// Write a file to the device, zero padded to whole sectors.
    Write {
        position: u64,
        #[structopt(parse(from_os_str))]
        input: PathBuf,
        /// Address from the raw start of the device.
        #[structopt(long)]
        loader: bool,
        /// Read the range back and compare after writing.
        #[structopt(long)]
        verify: bool,
    },
    /// Discard sectors.
    Erase { position: u64, count: u64 },
    LockFlag,
    BadBlocks,
    PublicKey,
    /// Gate NAND LBA access.
    NandLba {
        #[structopt(possible_values = &["read", "write"])]
        access: String,
        #[structopt(long)]
        disable: bool,
    },
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Zeroed buffer for `count` sectors, refused rather than aborting when it cannot exist.
fn sector_buffer(position: u64, count: u64) -> Result<Vec<u8>, Box<dyn Error>> {
    let len = LbaRange::new(position, count).byte_len()?;
    let mut data = Vec::new();
    data.try_reserve_exact(len)?;
    data.resize(len, 0);
    Ok(data)
}

fn run(opt: Opt) -> Result<(), Box<dyn Error>> {
    let mut config = DeviceConfig::from_env();
    if opt.emmc_point.is_some() {
        config.emmc_point = opt.emmc_point;
    }
    if opt.gpt {
        config.layout = PartitionLayout::Gpt;
    }
    let mut comm = FlashComm::open(OsDevices, config);

    match opt.cmd {
        Command::Info => {
            println!("storage: {:?}", comm.storage_kind());
            println!("layout: {:?}", comm.layout());
            println!("flash size: {} sectors", comm.flash_size()?);
            match comm.read_flash_info() {
                Ok(info) => println!("{:#?}", info),
                Err(e) => println!("flash info unavailable: {}", e),
            }
        }
        Command::Read {
            position,
            count,
            output,
        } => {
            let mut data = sector_buffer(position, count)?;
            comm.read_lba(position, count, &mut data)?;
            std::fs::write(&output, &data)?;
            info!("read {} sectors at {} into {}", count, position, output.display());
        }
        Command::Write {
            position,
            input,
            loader,
            verify,
        } => {
            let mut data = std::fs::read(&input)?;
            let count = ((data.len() + SECTOR_SIZE - 1) / SECTOR_SIZE) as u64;
            data.resize(count as usize * SECTOR_SIZE, 0);
            if loader {
                comm.write_lba_loader(position, count, &data)?;
                if verify {
                    warn!("--verify is ignored for loader writes");
                }
            } else {
                comm.write_lba(position, count, &data)?;
                if verify {
                    comm.verify_lba(position, &data)?;
                }
            }
            info!("wrote {} sectors at {} from {}", count, position, input.display());
        }
        Command::Erase { position, count } => comm.erase_lba(position, count)?,
        Command::LockFlag => {
            let flag = comm.get_lock_flag()?;
            println!("lock flag: {:#x} (locked: {})", flag.0, flag.is_locked());
        }
        Command::BadBlocks => {
            let map = comm.read_bad_block()?;
            println!("{} bad blocks", map.count());
            for block in map.bad_blocks() {
                println!("{}", block);
            }
        }
        Command::PublicKey => {
            let key = comm.get_public_key()?;
            if key.is_empty() {
                println!("no public key");
            } else {
                println!("{}", hex(key.as_bytes()));
            }
        }
        Command::NandLba { access, disable } => match (access.as_str(), disable) {
            ("read", false) => comm.enable_nand_lba_read()?,
            ("read", true) => comm.disable_nand_lba_read()?,
            (_, false) => comm.enable_nand_lba_write()?,
            (_, true) => comm.disable_nand_lba_write()?,
        },
    }
    Ok(())
}

fn main() {
    let opt = Opt::from_args();
    let level = match opt.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::builder()
        .format_timestamp_nanos()
        .filter_level(level)
        .init();

    if let Err(e) = run(opt) {
        error!("{}", e);
        std::process::exit(1);
    }
}
