pub mod cache;
pub mod config;
pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;
pub mod service;
pub mod sql;
pub mod timeslot;
pub mod wal;
pub mod wire;
