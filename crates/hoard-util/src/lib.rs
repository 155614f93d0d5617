pub mod fs;
pub mod http;

pub use crate::fs::{read_json, write_json};
pub use crate::http::build_client;
