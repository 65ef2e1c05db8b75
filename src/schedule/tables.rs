//! The fixed table map for static GTFS bundles.

/// How a table's file reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// One parameterized insert per record.
    RowInsert,
    /// Header read locally, body streamed through the bulk loader.
    Bulk,
    /// No loader assigned yet; the file is extracted but never loaded.
    Skip,
}

/// One entry of the table map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GtfsTable {
    pub file_name: &'static str,
    pub table_name: &'static str,
    pub required: bool,
    pub strategy: LoadStrategy,
}

/// Tables in load order. Parents come before the tables referencing them.
pub const GTFS_TABLES: &[GtfsTable] = &[
    GtfsTable {
        file_name: "agency.txt",
        table_name: "agency",
        required: true,
        strategy: LoadStrategy::RowInsert,
    },
    GtfsTable {
        file_name: "routes.txt",
        table_name: "routes",
        required: true,
        strategy: LoadStrategy::RowInsert,
    },
    GtfsTable {
        file_name: "trips.txt",
        table_name: "trips",
        required: true,
        strategy: LoadStrategy::Bulk,
    },
    GtfsTable {
        file_name: "stops.txt",
        table_name: "stops",
        required: true,
        strategy: LoadStrategy::Bulk,
    },
    GtfsTable {
        file_name: "stop_times.txt",
        table_name: "stop_times",
        required: true,
        strategy: LoadStrategy::Bulk,
    },
    GtfsTable {
        file_name: "calendar.txt",
        table_name: "calendar",
        required: true,
        strategy: LoadStrategy::RowInsert,
    },
    GtfsTable {
        file_name: "calendar_dates.txt",
        table_name: "calendar_dates",
        required: true,
        strategy: LoadStrategy::RowInsert,
    },
    // TODO: give shapes and transfers a real strategy once their tables exist downstream.
    GtfsTable {
        file_name: "shapes.txt",
        table_name: "shapes",
        required: false,
        strategy: LoadStrategy::Skip,
    },
    GtfsTable {
        file_name: "transfers.txt",
        table_name: "transfers",
        required: false,
        strategy: LoadStrategy::Skip,
    },
];

/// Looks up the table entry for an archive member's file name.
pub fn table_for_file(file_name: &str) -> Option<&'static GtfsTable> {
    GTFS_TABLES.iter().find(|t| t.file_name == file_name)
}

pub fn required_tables() -> impl Iterator<Item = &'static GtfsTable> {
    GTFS_TABLES.iter().filter(|t| t.required)
}
