//! SQL schema for the Knit SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// AUTOINCREMENT keeps ids strictly monotonic even across deletes, which the
/// seniority tie-break relies on. The CHECK constraints enforce the two
/// structural invariants: a row is primary exactly when it is unlinked, and
/// every row carries at least one identity field.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS contacts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    email           TEXT,
    phone_number    TEXT,
    linked_id       INTEGER REFERENCES contacts(id),
    link_precedence TEXT NOT NULL,   -- 'primary' | 'secondary'
    created_at      TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    updated_at      TEXT NOT NULL,
    deleted_at      TEXT,            -- soft delete; set rows are invisible
    CHECK (email IS NOT NULL OR phone_number IS NOT NULL),
    CHECK ((link_precedence = 'primary') = (linked_id IS NULL))
);

CREATE INDEX IF NOT EXISTS contacts_email_idx  ON contacts(email);
CREATE INDEX IF NOT EXISTS contacts_phone_idx  ON contacts(phone_number);
CREATE INDEX IF NOT EXISTS contacts_linked_idx ON contacts(linked_id);

PRAGMA user_version = 1;
";
