pub mod api;
pub mod controllers;
pub mod resources;
pub mod util;

pub use util::errors::{Error, Result};
