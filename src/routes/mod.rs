pub mod emergency;
pub mod group;
pub mod location;
pub mod message;
pub mod poi;
pub mod user;
