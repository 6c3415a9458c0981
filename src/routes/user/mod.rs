mod handler;
mod model;

pub use handler::{check_token, get_me, login, logout, register};
pub use model::User;
