/// 会话身份缓存键前缀
const USER_SESSION_PREFIX: &str = "user:session:";

/// 用户状态缓存键前缀
const USER_STATUS_PREFIX: &str = "user:status:";

/// 位置更新最小间隔闸门键前缀
const USER_GATE_PREFIX: &str = "user:gate:";

/// 生成会话身份缓存键
pub fn user_session_key(user_id: &str) -> String {
    format!("{}{}", USER_SESSION_PREFIX, user_id)
}

/// 生成用户状态缓存键
pub fn user_status_key(user_id: &str) -> String {
    format!("{}{}", USER_STATUS_PREFIX, user_id)
}

/// 生成单次上报路径的最小间隔闸门键
pub fn user_gate_key(user_id: &str) -> String {
    format!("{}{}", USER_GATE_PREFIX, user_id)
}
