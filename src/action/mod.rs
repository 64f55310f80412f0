pub mod action_model;
pub mod executor;
