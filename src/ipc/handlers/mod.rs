pub mod core;
pub mod results;
pub mod setup;
pub mod students;
pub mod transcript;
