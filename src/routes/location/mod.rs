mod handler;
mod model;

pub use handler::{get_circle_locations, location_stream, update_location};
pub use model::{PersistingSink, StoredUserLocation};
