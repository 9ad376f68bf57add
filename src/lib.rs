pub mod clock;
pub mod command;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod status;
pub mod store;
pub mod wal;
