use std::path::PathBuf;

pub const DEFAULT_DB: &str = "images.db";
pub const DEFAULT_TABLE: &str = "images";
pub const DEFAULT_KEY_COLUMN: &str = "key";
pub const DEFAULT_TIME_COLUMN: &str = "created_at";
pub const DEFAULT_IMAGE_COLUMN: &str = "image";
pub const DEFAULT_OUT_DIR: &str = "exported";
pub const DEFAULT_LOG_PATH: &str = "export_log.txt";

/// Where the rows live. Built once from the CLI and handed around by
/// reference; nothing mutates it after parse.
#[derive(clap::Args)]
pub struct Opts {
    #[arg(short, long = "file", global = true, default_value = DEFAULT_DB, help = "Path to the source database file")]
    pub file: PathBuf,
    #[arg(long, global = true, default_value = DEFAULT_TABLE, help = "table holding the image rows")]
    pub table: String,
    #[arg(long, global = true, default_value = DEFAULT_KEY_COLUMN, help = "column with the unique row key")]
    pub key_column: String,
    #[arg(long, global = true, default_value = DEFAULT_TIME_COLUMN, help = "column with the row timestamp")]
    pub time_column: String,
    #[arg(long, global = true, default_value = DEFAULT_IMAGE_COLUMN, help = "column with the image payload")]
    pub image_column: String
}

impl Opts {
    /// Rows with no payload are excluded at the source; ordering by the
    /// timestamp column keeps runs deterministic for a given database.
    pub fn row_query(&self) -> String {
        format!(
            "SELECT {}, {}, {} FROM {} WHERE {} IS NOT NULL ORDER BY {} ASC",
            self.key_column, self.time_column, self.image_column,
            self.table, self.image_column, self.time_column
        )
    }

    pub fn count_query(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", self.table)
    }
}
