mod handler;
mod model;

pub use handler::{
    create_circle, get_members, join_circle, leave_circle, my_circles, update_settings,
};
pub use model::{Circle, CircleInfo};
