pub mod attendance;
pub mod classes;
pub mod core;
pub mod setup;
pub mod students;
pub mod teachers;
