/// Local filesystem walking and staged atomic output.
pub mod fs;

pub use fs::{FileStream, Staging, path_is_within, resolve_path};
