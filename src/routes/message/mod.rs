mod handler;
mod model;

pub use handler::{create_message, get_messages, stream_messages};
