pub mod cli;
pub mod collections;
pub mod file;
pub mod log;
