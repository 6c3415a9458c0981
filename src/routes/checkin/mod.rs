mod handler;
mod model;

pub use handler::{create_check_in, get_check_ins};
pub use model::CheckIn;
