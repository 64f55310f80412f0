pub mod controller;
pub mod overlay;
pub mod progress;
