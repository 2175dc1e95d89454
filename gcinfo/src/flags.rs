use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use gcinfo_format::GC_INFO_VERSION;

#[derive(Parser)]
#[command(name = "gcinfo", version, about = "Inspect GC info blobs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print header, safe points, ranges, slots and live roots of a blob
    Dump(DumpArgs),
}

#[derive(Args)]
pub struct DumpArgs {
    /// File holding the blob
    pub file: PathBuf,

    /// Target the blob was generated for
    #[arg(long, value_enum, default_value_t = TargetArch::host())]
    pub target: TargetArch,

    /// Format version of the blob
    #[arg(long, default_value_t = GC_INFO_VERSION)]
    pub version: u32,

    /// The file contains hex digits instead of raw bytes
    #[arg(long)]
    pub hex: bool,

    /// Only report roots at this code offset (decimal or 0x-prefixed hex)
    #[arg(long, value_name = "OFFSET", value_parser = parse_offset)]
    pub offset: Option<u32>,

    /// Report roots as if the frame was aborted by an exception
    #[arg(long)]
    pub aborted: bool,

    /// Report roots at every interruptible offset, not only at safe points
    #[arg(long, conflicts_with = "offset")]
    pub all_offsets: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum TargetArch {
    X64,
    Arm,
    Arm64,
    #[value(name = "loongarch64")]
    LoongArch64,
    #[value(name = "riscv64")]
    RiscV64,
    Interpreter,
}

impl TargetArch {
    pub fn host() -> TargetArch {
        if cfg!(target_arch = "x86_64") {
            TargetArch::X64
        } else if cfg!(target_arch = "arm") {
            TargetArch::Arm
        } else if cfg!(target_arch = "aarch64") {
            TargetArch::Arm64
        } else if cfg!(target_arch = "loongarch64") {
            TargetArch::LoongArch64
        } else if cfg!(target_arch = "riscv64") {
            TargetArch::RiscV64
        } else {
            TargetArch::Interpreter
        }
    }
}

fn parse_offset(value: &str) -> Result<u32, String> {
    let result = match value.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };

    result.map_err(|err| format!("invalid code offset '{}': {}", value, err))
}
