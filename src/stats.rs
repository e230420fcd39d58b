use std::collections::BTreeMap;

use clap::Parser;
use rusqlite::Connection;

use crate::{config, sniff::{self, Format}};

#[derive(Parser)]
pub struct Args {}

pub fn run(db: Connection, src: &config::Opts, _args: Args) -> anyhow::Result<()> {
    let total: usize = db.query_row(&src.count_query(), (), |row| row.get(0))?;
    let with_payload: usize = db.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE {} IS NOT NULL",
            src.table, src.image_column
        ),
        (),
        |row| row.get(0)
    )?;

    println!("rows in table:       {total}");
    println!("rows with payloads:  {with_payload}");

    let counts = histogram(&db, src)?;
    if !counts.is_empty() {
        println!("detected formats:");
        for (format, n) in counts {
            println!("  {format}: {n}");
        }
    }

    Ok(())
}

/// Sniff every payload from a 16-byte prefix fetched in SQL; no full blob
/// ever leaves the database.
fn histogram(db: &Connection, src: &config::Opts) -> anyhow::Result<BTreeMap<Format, usize>> {
    let mut stmt = db.prepare(&format!(
        "SELECT substr({}, 1, 16) FROM {} WHERE {} IS NOT NULL",
        src.image_column, src.table, src.image_column
    ))?;
    let mut rows = stmt.query(())?;

    let mut counts = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let prefix = row.get_ref(0)?.as_blob()?;
        *counts.entry(sniff::detect(prefix)).or_insert(0) += 1;
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn src() -> config::Opts {
        config::Opts {
            file: "unused.db".into(),
            table: "images".into(),
            key_column: "key".into(),
            time_column: "created_at".into(),
            image_column: "image".into()
        }
    }

    #[test]
    fn test_histogram_counts_by_sniffed_format() {
        let img = RgbImage::from_pixel(2, 2, Rgb([1, 2, 3]));
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageFormat::Png).unwrap();

        let db = Connection::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE images(key TEXT PRIMARY KEY, created_at TEXT NOT NULL, image BLOB)"
        ).unwrap();
        db.execute("INSERT INTO images VALUES ('a1', '2024-01-01', ?)", (png.get_ref(),)).unwrap();
        db.execute("INSERT INTO images VALUES ('a2', '2024-01-02', ?)", (&b"ten bytes!"[..],)).unwrap();
        db.execute("INSERT INTO images VALUES ('a3', '2024-01-03', NULL)", ()).unwrap();

        let counts = histogram(&db, &src()).unwrap();
        assert_eq!(counts.get(&Format::Png), Some(&1));
        assert_eq!(counts.get(&Format::Unknown), Some(&1));
        assert_eq!(counts.values().sum::<usize>(), 2);
    }
}
