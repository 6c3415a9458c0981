/// 缓存键模块
/// 提供各种缓存键与频道名生成函数

// 用户缓存键模块
pub mod user_keys;

// 圈子缓存键模块
pub mod circle_keys;

pub use circle_keys::{circle_events_channel, circle_id_key, circle_invite_key};
pub use user_keys::{user_gate_key, user_session_key, user_status_key};
