/// 缓存操作模块

// 会话身份缓存
pub mod session;

// 用户在线状态与实时位置缓存
pub mod presence;

// 圈子事件广播
pub mod events;
