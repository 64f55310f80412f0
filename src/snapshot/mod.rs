pub mod aria;
pub mod builder;
pub mod ranking;
pub mod snapshot_model;
