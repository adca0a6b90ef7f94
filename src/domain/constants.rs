pub const REPORT_HEADER: &str = "File;SID;Name;SamAccountName;EmailAddress";
pub const REPORT_DELIMITER: char = ';';
pub const UTF8_BOM: char = '\u{feff}';

pub const MARKER_NOT_FOUND: &str = "NOT_FOUND";
pub const MARKER_TRANSLATE_ERROR: &str = "TRANSLATE_ERROR";
pub const MARKER_QUERY_ERROR: &str = "QUERY_ERROR";

/// Name column value for identifiers the directory does not know.
pub const REPORT_NAME_NOT_FOUND: &str = "NOT_FOUND";
/// Name column value for identifiers whose lookup failed this run.
pub const REPORT_NAME_ERROR: &str = "ERROR";

// Sentinels written into the `name` field by the first-generation cache format.
pub const LEGACY_NAME_NOT_FOUND: &str = "NOT_FOUND";
pub const LEGACY_NAME_ERROR: &str = "ERROR";

pub const ACCOUNT_OBJECT_CLASS: &str = "user";

pub const DEFAULT_INPUT_FILE: &str = "files.txt";
pub const DEFAULT_OUTPUT_FILE: &str = "results.csv";
pub const DEFAULT_CACHE_FILE: &str = "ad_cache.json";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const LOG_FILE_NAME: &str = "log.txt";
pub const DEFAULT_WORKERS: usize = 15;
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_BATCH_CONCURRENCY: usize = 1;
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_OWNER_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LOG_LEVEL: &str = "INFO";
pub const DEFAULT_POWERSHELL: &str = "powershell";
