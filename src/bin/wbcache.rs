//! Binary entry point for the page file inspection CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use wbcache::{
    admin::{dump_page, verify_file, PageDump, VerifyReport},
    logging::init_logging,
    primitives::pager::DEFAULT_PAGE_SIZE,
};

#[derive(Parser, Debug)]
#[command(
    name = "wbcache",
    version,
    about = "Inspect page files written by the write-back cache",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[arg(
        long,
        global = true,
        env = "WBCACHE_LOG",
        default_value = "warn",
        help = "Log filter directive (e.g. info, wbcache=debug)"
    )]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Check magic and checksum of every page frame")]
    Verify {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, help = "Page size in bytes")]
        page_size: u32,
    },

    #[command(about = "Print the header and payload prefix of one page")]
    Dump {
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, help = "Page size in bytes")]
        page_size: u32,

        #[arg(long, help = "Zero-based page index")]
        page: u64,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log)?;

    match cli.command {
        Command::Verify { path, page_size } => {
            let report = verify_file(&path, page_size)?;
            emit(&cli.format, &report, |_| print_verify_text(&report))?;
            if !report.success {
                std::process::exit(2);
            }
        }
        Command::Dump {
            path,
            page_size,
            page,
        } => {
            let dump = dump_page(&path, page_size, page)?;
            emit(&cli.format, &dump, |_| print_dump_text(&dump))?;
        }
    }
    Ok(())
}

fn emit<T, F>(format: &OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(OutputFormat),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(OutputFormat::Text),
    }
    Ok(())
}

fn print_verify_text(report: &VerifyReport) {
    println!(
        "Verify (page_size={}) => success={} pages={} valid={} unwritten={} corrupt={} trailing_bytes={}",
        report.page_size,
        report.success,
        report.counts.pages_scanned,
        report.counts.valid_pages,
        report.counts.unwritten_pages,
        report.counts.corrupt_pages,
        report.counts.trailing_bytes,
    );
    for finding in &report.findings {
        println!("- {:?}: {}", finding.severity, finding.message);
    }
}

fn print_dump_text(dump: &PageDump) {
    println!("Page {} => {:?}", dump.page_index, dump.state);
    if let Some(reason) = dump.reason {
        println!("  reason={reason}");
    }
    println!(
        "  magic=0x{:016x} crc32=0x{:08x} lsn={}:{}",
        dump.magic, dump.crc32, dump.wal_segment, dump.wal_position
    );
    println!("  payload[..]={}", dump.payload_prefix);
}
