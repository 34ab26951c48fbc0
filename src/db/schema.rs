//! Database schema and migrations for linkshare.
//!
//! Migrations are applied sequentially when the database is first opened or
//! upgraded. The schema_version table tracks which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: file catalog
    r#"
CREATE TABLE files (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    token           TEXT NOT NULL UNIQUE,
    original_name   TEXT NOT NULL,
    storage_key     TEXT NOT NULL,
    mime_type       TEXT NOT NULL,
    size_bytes      INTEGER NOT NULL,
    created_at      TEXT NOT NULL
);
"#,
    // v2: lookups by storage key for manual cleanup tooling
    r#"
CREATE INDEX idx_files_storage_key ON files(storage_key);
"#,
];
