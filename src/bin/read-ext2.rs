use std::io::{self, Write};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use ext2_reader::format::{human_readable_size, listing_date, listing_line, Timestamp};
use ext2_reader::{Error, Ext2File, Result, Volume};

/// Environment variable holding the log level filter, e.g. `debug`.
const LOG_ENV_VAR: &str = "EXT2_LOG";

/// Dummy type to help us implement a logger using the `log` crate.
struct Logger;

static LOGGER: Logger = Logger;

const CLEAR_FORMAT: &str = "\x1b[0m";

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            let color_code = match record.level() {
                log::Level::Error => "\x1b[31m",
                log::Level::Warn => "\x1b[33m",
                log::Level::Info => "\x1b[32m",
                // White is actually kinda grey. Bright white is white.
                log::Level::Debug | log::Level::Trace => "\x1b[37m",
            };
            eprintln!("{color_code}[{}]{CLEAR_FORMAT} {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logging() {
    let level = std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|value| log::LevelFilter::from_str(&value).ok())
        .unwrap_or(log::LevelFilter::Warn);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
    log::debug!("Logging initialized at {level}");
}

enum Command<'a> {
    Summary,
    List(&'a str),
    Cat(&'a str),
    Stat(&'a str),
}

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map_or("read-ext2", String::as_str);
    let (disk_file, command) = match &args[..] {
        [_, disk_file] => (disk_file, Command::Summary),
        [_, disk_file, cmd, path] if cmd == "ls" => (disk_file, Command::List(path)),
        [_, disk_file, cmd, path] if cmd == "cat" => (disk_file, Command::Cat(path)),
        [_, disk_file, cmd, path] if cmd == "stat" => (disk_file, Command::Stat(path)),
        _ => {
            eprintln!("Usage: {program} <disk_file> [ls|cat|stat <path>]");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(disk_file, &command) {
        eprintln!("{program}: {err}");
        std::process::exit(1);
    }
}

fn run(disk_file: &str, command: &Command<'_>) -> Result<()> {
    let volume = Volume::open(disk_file)?;
    match *command {
        Command::Summary => {
            print_summary(&volume);
            println!();
            list(&volume, "/")?;
        }
        Command::List(path) => list(&volume, path)?,
        Command::Cat(path) => cat(&volume, path)?,
        Command::Stat(path) => stat(&volume, path)?,
    }
    volume.close();
    Ok(())
}

fn print_summary(volume: &Volume) {
    let superblock = volume.superblock();
    println!("Volume name: {}", volume.label());
    println!("UUID: {}", superblock.uuid());
    println!("Magic: {:#06X}", volume.magic());
    println!("Revision: {}", superblock.rev_level());
    println!(
        "Blocks: {} x {} bytes ({})",
        volume.block_count(),
        volume.block_size().bytes(),
        human_readable_size(volume.capacity())
    );
    println!(
        "Inodes: {} ({} bytes each)",
        volume.inodes_count(),
        superblock.inode_size()
    );
    println!("Block groups: {}", volume.block_group_descriptors().len());
    println!("Compatible features: {:?}", superblock.feature_compat());
    println!("Incompatible features: {:?}", superblock.feature_incompat());
    println!("Read-only features: {:?}", superblock.feature_ro_compat());
    let last_mounted = superblock.last_mounted();
    if !last_mounted.is_empty() {
        println!("Last mounted on: {last_mounted}");
    }
}

fn list(volume: &Volume, path: &str) -> Result<()> {
    let dir = Ext2File::open(volume, path)?;
    let current_year = current_year();
    let mut out = io::stdout().lock();
    for entry in dir.entries()? {
        let child = dir.open_child(entry.name())?;
        let line = listing_line(
            &child.mode().to_mode_string(),
            child.hard_links(),
            child.uid(),
            child.gid(),
            child.size(),
            &listing_date(child.modified_time(), current_year),
            entry.name(),
        );
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn cat(volume: &Volume, path: &str) -> Result<()> {
    let mut file = Ext2File::open(volume, path)?;
    if file.is_directory() {
        return Err(Error::InvalidOperation("cannot cat a directory"));
    }
    io::copy(&mut file, &mut io::stdout().lock())?;
    Ok(())
}

fn stat(volume: &Volume, path: &str) -> Result<()> {
    let file = Ext2File::open(volume, path)?;
    println!("Path: {}", file.path());
    println!("Name: {}", file.file_name());
    if let Some(parent) = file.parent_path() {
        println!("Parent: {parent}");
    }
    println!("Inode: {}", file.inode_number());
    println!("Type: {:?}", file.file_type());
    println!("Mode: {} ({:o})", file.mode().to_mode_string(), file.mode().permissions());
    println!("Size: {} ({})", file.size(), human_readable_size(file.size()));
    println!("Links: {}", file.hard_links());
    println!("Uid: {} Gid: {}", file.uid(), file.gid());
    println!("Access: {}", time(file.access_time()));
    println!("Change: {}", time(file.creation_time()));
    println!("Modify: {}", time(file.modified_time()));
    if file.deleted_time() != 0 {
        println!("Deleted: {}", time(file.deleted_time()));
    }
    Ok(())
}

fn time(seconds: u32) -> Timestamp {
    Timestamp::from_unix(u64::from(seconds))
}

fn current_year() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs());
    Timestamp::from_unix(now).year
}
