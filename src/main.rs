mod config;
mod convert;
mod export;
mod sniff;
mod stats;

use clap::{Parser, Subcommand};
use rusqlite::{Connection, OpenFlags};

#[derive(Parser)]
#[command(version, about = "Export images stored as BLOBs in a SQLite database")]
struct Args {
    #[command(flatten)]
    source: config::Opts,
    #[arg(short = 'n', long = "dry-run", global = true, help = "don't actually write any files")]
    dry_run: bool,
    #[command(subcommand)]
    command: Command
}

#[derive(Subcommand)]
enum Command {
    Export(export::Args),
    Stats(stats::Args)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    // the source database is never written to, on any path
    let db = Connection::open_with_flags(
        &args.source.file,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
    )?;

    use Command::*;
    match args.command {
        Export(margs) => export::run(db, &args.source, margs),
        Stats(margs) => stats::run(db, &args.source, margs)
    }
}
