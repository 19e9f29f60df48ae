mod handler;
mod model;

pub use handler::{create_emergency, list_active, resolve_emergency};
