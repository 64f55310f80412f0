pub mod budget;
pub mod history;
pub mod screenshot;
