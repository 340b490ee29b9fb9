//! SQLite schema for extracted charts.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Chart entries
// =============================================================================

/// One row per (date, position). Artist lists are JSON arrays in credit order;
/// `artists` is main followed by featured.
const CHART_ENTRIES_TABLE_V1: Table = Table {
    name: "chart_entries",
    columns: &[
        sqlite_column!("date", &SqlType::Text, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("song", &SqlType::Text, non_null = true),
        sqlite_column!("artists", &SqlType::Text, non_null = true),
        sqlite_column!("main_artists", &SqlType::Text, non_null = true),
        sqlite_column!("featured_artists", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_chart_entries_song", "song")],
    unique_constraints: &[&["date", "position"]],
};

// =============================================================================
// Version 2 - Extraction run history
// =============================================================================

const EXTRACTION_RUNS_TABLE_V2: Table = Table {
    name: "extraction_runs",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("chart_name", &SqlType::Text, non_null = true),
        sqlite_column!("start_date", &SqlType::Text, non_null = true),
        sqlite_column!("end_date", &SqlType::Text, non_null = true),
        sqlite_column!("requested", &SqlType::Integer, non_null = true),
        sqlite_column!("succeeded", &SqlType::Integer, non_null = true),
        sqlite_column!("skipped", &SqlType::Integer, non_null = true),
        sqlite_column!("persisted", &SqlType::Integer, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("error_message", &SqlType::Text),
        sqlite_column!("elapsed_ms", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "finished_at",
            &SqlType::Text,
            non_null = true,
            default_value = Some("(datetime('now'))")
        ),
    ],
    indices: &[("idx_extraction_runs_end_date", "end_date")],
    unique_constraints: &[],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    EXTRACTION_RUNS_TABLE_V2.create(conn)
}

pub const CHART_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[CHART_ENTRIES_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[CHART_ENTRIES_TABLE_V1, EXTRACTION_RUNS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];
