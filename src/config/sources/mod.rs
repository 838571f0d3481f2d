//! Individual configuration sources

pub mod environment;
pub mod space_file;
