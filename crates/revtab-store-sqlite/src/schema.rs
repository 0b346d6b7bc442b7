//! SQL schema for the revtab SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Every version of the raw table ever recorded. Rows are never updated or
-- deleted.
CREATE TABLE IF NOT EXISTS raw_version_list (
    release_date TEXT NOT NULL,   -- YYYY-MM-DD
    parse_time   TEXT NOT NULL,   -- YYYY-MM-DD HH:MM:SS.ffffff
    PRIMARY KEY (release_date, parse_time)
);

-- Interned key strings. Ids are never reused; rows are never deleted.
CREATE TABLE IF NOT EXISTS measurement_type_pool (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS location_pool (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS week_pool (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL UNIQUE
);

-- Diffs between consecutive versions in (release_date, parse_time) order.
-- Rows at a version are only ever deleted to be recomputed by chain repair.
CREATE TABLE IF NOT EXISTS raw_diffs (
    release_date        TEXT    NOT NULL,
    parse_time          TEXT    NOT NULL,
    measurement_type_id INTEGER NOT NULL REFERENCES measurement_type_pool(id),
    location_id         INTEGER NOT NULL REFERENCES location_pool(id),
    week_id             INTEGER NOT NULL REFERENCES week_pool(id),
    new_value           TEXT,   -- NULL means the cell was removed
    PRIMARY KEY (release_date, parse_time, measurement_type_id, location_id, week_id),
    FOREIGN KEY (release_date, parse_time)
        REFERENCES raw_version_list(release_date, parse_time),
    CHECK (new_value IS NULL OR new_value != '')
);

CREATE INDEX IF NOT EXISTS raw_diffs_cell_idx
    ON raw_diffs(measurement_type_id, location_id, week_id, release_date, parse_time);

-- Raw versions already processed by the point projection.
CREATE TABLE IF NOT EXISTS point_version_list (
    release_date TEXT NOT NULL,
    parse_time   TEXT NOT NULL,
    PRIMARY KEY (release_date, parse_time),
    FOREIGN KEY (release_date, parse_time)
        REFERENCES raw_version_list(release_date, parse_time)
);

CREATE TABLE IF NOT EXISTS point_diffs (
    release_date TEXT    NOT NULL,
    parse_time   TEXT    NOT NULL,
    location_id  INTEGER NOT NULL REFERENCES location_pool(id),
    epiweek      INTEGER NOT NULL,   -- YYYYWW
    new_value    INTEGER,            -- NULL means the point was removed
    PRIMARY KEY (release_date, parse_time, location_id, epiweek),
    FOREIGN KEY (release_date, parse_time)
        REFERENCES point_version_list(release_date, parse_time)
);

CREATE INDEX IF NOT EXISTS point_diffs_point_idx
    ON point_diffs(location_id, epiweek, release_date, parse_time);

PRAGMA user_version = 1;
";

/// Drops every table, dependants first.
pub const DROP_ALL: &str = "
DROP TABLE IF EXISTS point_diffs;
DROP TABLE IF EXISTS point_version_list;
DROP TABLE IF EXISTS raw_diffs;
DROP TABLE IF EXISTS week_pool;
DROP TABLE IF EXISTS location_pool;
DROP TABLE IF EXISTS measurement_type_pool;
DROP TABLE IF EXISTS raw_version_list;

PRAGMA user_version = 0;
";
