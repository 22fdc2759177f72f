//! CLI command implementations.
//!
//! The CLI is a demonstration harness around the record store surface; it
//! holds no logic of its own beyond loading the JSON configuration and
//! printing results.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::observability::{Logger, MetricsRegistry, Severity};
use crate::records::{
    fix_table_size, table_size, CachedRecords, RecordFile, RecordStore, StoreOptions,
};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path of the table file (required)
    pub file: String,

    /// Record length in bytes (required)
    pub record_size: usize,

    /// Write-buffer byte budget (optional, default 16 KiB)
    #[serde(default = "default_budget_bytes")]
    pub write_buffer_bytes: usize,

    /// Read-cache byte budget (optional, default 16 KiB)
    #[serde(default = "default_budget_bytes")]
    pub read_cache_bytes: usize,
}

fn default_budget_bytes() -> usize {
    16 * 1024
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config(format!("failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config(format!("invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.file.is_empty() {
            return Err(CliError::config("file must not be empty"));
        }
        if self.record_size == 0 {
            return Err(CliError::config("record_size must be > 0"));
        }
        Ok(())
    }

    /// Table file path.
    pub fn file_path(&self) -> &Path {
        Path::new(&self.file)
    }

    /// Store options carrying the configured budgets.
    pub fn store_options(&self, metrics: Option<Arc<MetricsRegistry>>) -> StoreOptions {
        StoreOptions {
            write_buffer_bytes: self.write_buffer_bytes,
            read_cache_bytes: self.read_cache_bytes,
            metrics,
        }
    }
}

/// Parse arguments and dispatch to a command.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    if cli.verbose {
        Logger::set_min_severity(Severity::Trace);
    }
    match cli.command {
        Command::Info { config } => info(&config),
        Command::Fix { config } => fix(&config),
        Command::Dump {
            config,
            start,
            count,
        } => dump(&config, start, count),
        Command::Demo { config } => demo(&config),
    }
}

/// Print the record count of the configured table file.
pub fn info(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let records = table_size(config.file_path(), config.record_size)?;
    let line = json!({
        "file": config.file,
        "record_size": config.record_size,
        "records": records,
    });
    println!("{}", line);
    Ok(())
}

/// Repair a table file damaged by a partial trailing record.
pub fn fix(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let repaired = fix_table_size(config.file_path(), config.record_size)?;
    let records = table_size(config.file_path(), config.record_size)?;
    let line = json!({
        "file": config.file,
        "repaired": repaired,
        "records": records,
    });
    println!("{}", line);
    Ok(())
}

/// Hex-dump a range of records through the uncached base layer.
pub fn dump(config_path: &Path, start: u64, count: Option<u64>) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let mut store = RecordFile::open(config.file_path(), config.record_size)?;
    let size = store.size()?;
    let end = match count {
        Some(count) => size.min(start.saturating_add(count)),
        None => size,
    };

    let mut record = vec![0u8; config.record_size];
    for index in start..end {
        store.get(index, &mut record)?;
        println!("{:>10}  {}", index, hex_line(&record));
    }
    store.close()?;
    Ok(())
}

fn hex_line(record: &[u8]) -> String {
    let mut line = String::with_capacity(record.len() * 3);
    for (i, byte) in record.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&format!("{:02x}", byte));
    }
    line
}

/// Exercise a cached store end to end and print transfer metrics.
///
/// Writes a fixed scenario into `<file>.demo`: a handful of tagged records,
/// a thousand filler records, three tail markers, then removals and an
/// overwrite, verifying every read along the way.
pub fn demo(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let demo_path = Path::new(&config.file).with_extension("demo");
    if demo_path.exists() {
        fs::remove_file(&demo_path)?;
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let options = config.store_options(Some(Arc::clone(&metrics)));
    let mut store = CachedRecords::open_with(&demo_path, config.record_size, options)?;

    let record_size = config.record_size;
    let pattern = |template: &str| -> Vec<u8> {
        template.bytes().cycle().take(record_size).collect()
    };

    store.add(&pattern("01234567"))?;
    store.add(&pattern("ABCDEFGH"))?;
    store.add(&pattern("abcdefgh"))?;
    store.add(&pattern("--------"))?;
    store.add(&pattern("********"))?;
    for _ in 0..1000 {
        store.add(&pattern("++++++++"))?;
    }
    store.add(&pattern("=======0"))?;
    store.add(&pattern("=======1"))?;
    store.add(&pattern("=======2"))?;

    let total = store.size()?;
    let last = store.clean_last()?;
    let second_last = store.clean_last()?;

    let mut read_back = vec![0u8; record_size];
    store.get(1, &mut read_back)?;
    let before_put = read_back.clone();
    store.put(1, &pattern("AbCdEfGh"))?;
    store.get(1, &mut read_back)?;

    let final_size = store.size()?;
    store.close()?;

    let snapshot = metrics.snapshot();
    let line = json!({
        "file": demo_path.display().to_string(),
        "records_written": total,
        "removed_last": String::from_utf8_lossy(&last),
        "removed_second_last": String::from_utf8_lossy(&second_last),
        "record_1_before": String::from_utf8_lossy(&before_put),
        "record_1_after": String::from_utf8_lossy(&read_back),
        "size": final_size,
        "metrics": {
            "bytes_read": snapshot.bytes_read,
            "bytes_written": snapshot.bytes_written,
            "records_appended": snapshot.records_appended,
            "buffer_flushes": snapshot.buffer_flushes,
            "cache_refills": snapshot.cache_refills,
        },
    });
    println!("{}", line);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("recfile.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn config_defaults_apply() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"file": "./t.rec", "record_size": 8}"#);
        let config = Config::load(&path).unwrap();
        assert_eq!(config.record_size, 8);
        assert_eq!(config.write_buffer_bytes, 16 * 1024);
        assert_eq!(config.read_cache_bytes, 16 * 1024);
    }

    #[test]
    fn config_rejects_zero_record_size() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"file": "./t.rec", "record_size": 0}"#);
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn config_rejects_missing_file_field() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"record_size": 8}"#);
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn demo_runs_against_a_temp_table() {
        let dir = TempDir::new().unwrap();
        let table = dir.path().join("t.rec");
        let body = format!(
            r#"{{"file": {:?}, "record_size": 8, "write_buffer_bytes": 64, "read_cache_bytes": 64}}"#,
            table.display().to_string()
        );
        let config_path = write_config(&dir, &body);

        demo(&config_path).unwrap();

        // The demo leaves its table behind for inspection.
        let demo_path = table.with_extension("demo");
        let len = fs::metadata(&demo_path).unwrap().len();
        assert_eq!(len % 8, 0);
        assert_eq!(len / 8, 1006);
    }
}
