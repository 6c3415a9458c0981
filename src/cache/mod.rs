/// 缓存模块
/// Redis 键生成与缓存/广播操作

pub mod keys;
pub mod operations;
