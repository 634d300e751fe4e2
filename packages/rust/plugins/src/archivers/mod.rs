//! Built-in archivers.

mod http;

pub use http::{HttpArchiver, HttpArchiverSettings, url_to_file_name};
