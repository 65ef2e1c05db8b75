pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod parser;
pub mod realtime;
pub mod schedule;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
