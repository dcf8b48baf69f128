/// Job ids are allocated by the store from an AUTOINCREMENT column and
/// are never reused for the lifetime of the database file.
pub type JobId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
