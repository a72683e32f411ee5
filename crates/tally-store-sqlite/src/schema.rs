//! SQL schema for the Tally SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS members (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    username      TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    team          TEXT NOT NULL,
    role          TEXT NOT NULL DEFAULT 'user',   -- 'admin' | 'user'
    password_hash TEXT,                           -- argon2 PHC string
    created_at    TEXT NOT NULL                   -- ISO 8601 UTC
);

CREATE TABLE IF NOT EXISTS evaluation_items (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    major_category TEXT NOT NULL,
    minor_category TEXT NOT NULL,
    name           TEXT NOT NULL,                 -- '<major> - <minor>'
    description    TEXT NOT NULL DEFAULT '',
    display_order  INTEGER NOT NULL DEFAULT 999
);

-- One row per (evaluator, evaluated, item, month); resubmission updates it.
CREATE TABLE IF NOT EXISTS evaluations (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    evaluator_id INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
    evaluated_id INTEGER NOT NULL REFERENCES members(id) ON DELETE CASCADE,
    item_id      INTEGER NOT NULL REFERENCES evaluation_items(id) ON DELETE CASCADE,
    score        INTEGER NOT NULL CHECK (score BETWEEN 1 AND 10),
    year_month   TEXT NOT NULL,                   -- 'YYYY-MM'
    updated_at   TEXT NOT NULL,
    UNIQUE (evaluator_id, evaluated_id, item_id, year_month)
);

CREATE INDEX IF NOT EXISTS evaluations_evaluated_idx ON evaluations(evaluated_id, year_month);
CREATE INDEX IF NOT EXISTS evaluations_period_idx    ON evaluations(year_month);
CREATE INDEX IF NOT EXISTS members_team_idx          ON members(team);

PRAGMA user_version = 1;
";
