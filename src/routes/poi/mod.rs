mod handler;
mod model;

pub use handler::{create_poi, delete_poi, find_nearby};
