/// 位置共享管线的核心逻辑：
/// 原始采样 → 更新闸门 → 移动状态分类 → 会话状态 → 持久化与广播
pub mod gate;
pub mod movement;
pub mod session;
pub mod store;
