use std::{borrow::Cow, fs, io, num::NonZeroUsize, path::PathBuf};

use clap::Parser;
use rusqlite::{types::ValueRef, Connection};
use thiserror::Error;

use crate::{config, convert, sniff::{self, Format}};

#[derive(Parser)]
pub struct Args {
    #[arg(long, help = "overwrite existing output files instead of skipping them")]
    force: bool,
    #[arg(long, help = "write one outcome line per row to the log file")]
    keep_log: bool,
    #[arg(long, help = "preserve the detected image format instead of converting to JPEG")]
    keep_image_format: bool,
    #[arg(long, value_name = "N", help = "stop after N successful exports")]
    limit: Option<NonZeroUsize>,
    #[arg(long, default_value = config::DEFAULT_OUT_DIR, help = "directory to write images into")]
    out_dir: PathBuf,
    #[arg(long, default_value = config::DEFAULT_LOG_PATH, help = "path of the per-run log file")]
    log_path: PathBuf,
    #[arg(from_global)]
    dry_run: bool
}

#[derive(Debug, Error)]
enum RowError {
    #[error("undecodable image payload: {0}")]
    Corrupt(image::ImageError),
    #[error("jpeg encode failed: {0}")]
    Encode(image::ImageError),
    #[error("key is empty, contains NUL, or names a directory")]
    UnsafeKey,
    #[error("write failed: {0}")]
    Write(io::Error)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Written,
    SkippedExists,
    SkippedDryRun,
    Corrupt,
    Failed
}

impl Outcome {
    fn as_str(self) -> &'static str {
        use Outcome::*;
        match self {
            Written => "written",
            SkippedExists => "skipped-exists",
            SkippedDryRun => "skipped-dry-run",
            Corrupt => "skipped-corrupt",
            Failed => "failed"
        }
    }
}

#[derive(Debug, Default)]
struct Totals {
    written: usize,
    skipped_exists: usize,
    dry_run: usize,
    corrupt: usize,
    failed: usize
}

#[derive(Debug)]
struct Report {
    totals: Totals,
    log: Vec<String>,
    total_rows: usize,
    processed: usize,
    preexisting: usize
}

pub fn run(db: Connection, src: &config::Opts, args: Args) -> anyhow::Result<()> {
    let report = export(&db, src, &args)?;

    // dry-run creates no files at all, the log included
    if args.keep_log && !args.dry_run {
        // one run, one log; earlier runs are overwritten
        fs::write(&args.log_path, report.log.join("\n") + "\n")?;
    }

    println!();
    println!("===== summary =====");
    println!("rows in table:       {}", report.total_rows);
    println!("rows processed:      {}", report.processed);
    println!("already on disk:     {}", report.preexisting);
    if args.dry_run {
        println!("would export:        {}", report.totals.dry_run);
    } else {
        println!("exported:            {}", report.totals.written);
    }
    println!("skipped (existing):  {}", report.totals.skipped_exists);
    println!("skipped (corrupt):   {}", report.totals.corrupt);
    println!("failed:              {}", report.totals.failed);
    println!("===================");

    Ok(())
}

fn export(db: &Connection, src: &config::Opts, args: &Args) -> anyhow::Result<Report> {
    if !args.dry_run {
        fs::create_dir_all(&args.out_dir)?;
    }

    let preexisting = match fs::read_dir(&args.out_dir) {
        Ok(entries) => entries.filter_map(Result::ok).count(),
        // dry run against a directory that doesn't exist yet
        Err(_) => 0
    };

    let total_rows: usize = db.query_row(&src.count_query(), (), |row| row.get(0))?;

    let mut totals = Totals::default();
    let mut log = Vec::new();
    let mut processed = 0usize;

    let mut stmt = db.prepare(&src.row_query())?;
    let mut rows = stmt.query(())?;

    loop {
        if args.limit.is_some_and(|n| totals.written + totals.dry_run >= n.get()) {
            break;
        }
        let Some(row) = rows.next()? else { break };
        processed += 1;

        let key = value_text(row.get_ref(0)?);
        let stamp = value_text(row.get_ref(1)?);
        let data = row.get_ref(2)?.as_blob()?;

        let (detected, outcome, detail) = process(data, &key, args);

        use Outcome::*;
        match outcome {
            Written => totals.written += 1,
            SkippedExists => totals.skipped_exists += 1,
            SkippedDryRun => totals.dry_run += 1,
            Corrupt => totals.corrupt += 1,
            Failed => totals.failed += 1
        }

        let mut line = format!("{key}\t{stamp}\t{detected}\t{}", outcome.as_str());
        if let Some(detail) = detail {
            line.push('\t');
            line.push_str(&detail);
        }
        log.push(line);
    }

    Ok(Report { totals, log, total_rows, processed, preexisting })
}

/// Everything that happens to one row. Infallible at the run level; any
/// trouble becomes this row's outcome and the next row is unaffected.
fn process(data: &[u8], key: &str, args: &Args) -> (Format, Outcome, Option<String>) {
    let detected = sniff::detect(data);

    let prepared = sanitize_key(key).and_then(|stem| {
        prepare(detected, data, args.keep_image_format).map(|(bytes, ext)| (stem, bytes, ext))
    });

    let (stem, bytes, ext) = match prepared {
        Ok(p) => p,
        Err(e @ RowError::Corrupt(_)) => {
            tracing::warn!(key, "corrupt image payload");
            return (detected, Outcome::Corrupt, Some(e.to_string()));
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "row failed");
            return (detected, Outcome::Failed, Some(e.to_string()));
        }
    };

    let dest = args.out_dir.join(format!("{stem}.{ext}"));

    if dest.exists() && !args.force {
        return (detected, Outcome::SkippedExists, None);
    }
    if args.dry_run {
        return (detected, Outcome::SkippedDryRun, Some(format!("would write {}", dest.display())));
    }

    match fs::write(&dest, &bytes) {
        Ok(()) => {
            if !args.keep_image_format && detected != Format::Jpeg {
                tracing::debug!(key, from = %detected, "converted to jpeg");
            }
            (detected, Outcome::Written, None)
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "write failed");
            (detected, Outcome::Failed, Some(RowError::Write(e).to_string()))
        }
    }
}

/// Decide what to write for one payload without touching the filesystem.
/// Every payload is decoded once; that decode is the corruption gate.
fn prepare(detected: Format, data: &[u8], keep_format: bool) -> Result<(Cow<'_, [u8]>, &'static str), RowError> {
    let img = convert::decode(data).map_err(RowError::Corrupt)?;

    if keep_format {
        let ext = match detected {
            // the prefix sniffer can't name it but the decoder could
            Format::Unknown => convert::decoder_ext(data).unwrap_or("bin"),
            f => f.ext()
        };
        return Ok((Cow::Borrowed(data), ext));
    }

    if detected == Format::Jpeg {
        // already the target format; pass the original bytes through
        return Ok((Cow::Borrowed(data), "jpg"));
    }

    let jpeg = convert::to_jpeg(&img).map_err(RowError::Encode)?;
    Ok((Cow::Owned(jpeg), "jpg"))
}

/// Path separators are escaped; anything that could climb out of the
/// output directory is rejected outright.
fn sanitize_key(key: &str) -> Result<String, RowError> {
    if key.is_empty() || key.contains('\0') {
        return Err(RowError::UnsafeKey);
    }
    let stem: String = key
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect();
    if stem == "." || stem == ".." {
        return Err(RowError::UnsafeKey);
    }
    Ok(stem)
}

/// Keys and timestamps are rendered from whatever type the column holds;
/// an integer key is as good a filename stem as a text one.
fn value_text(v: ValueRef<'_>) -> String {
    match v {
        ValueRef::Null => "-".into(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(r) => r.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len())
    }
}
