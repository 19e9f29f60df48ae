mod handler;
mod model;

pub use handler::{delete_location, get_group_locations, update_location};
