/// 圈子ID缓存键前缀
const CIRCLE_ID_PREFIX: &str = "circle:id:";

/// 邀请码索引缓存键前缀
const CIRCLE_INVITE_PREFIX: &str = "circle:invite:";

/// 圈子事件广播频道前缀
const CIRCLE_EVENTS_PREFIX: &str = "circle:events:";

/// 生成圈子缓存键
pub fn circle_id_key(circle_id: &str) -> String {
    format!("{}{}", CIRCLE_ID_PREFIX, circle_id)
}

/// 生成邀请码索引缓存键
pub fn circle_invite_key(invite_code: &str) -> String {
    format!("{}{}", CIRCLE_INVITE_PREFIX, invite_code)
}

/// 生成圈子事件 pub/sub 频道名（位置更新与安全打卡共用）
pub fn circle_events_channel(circle_id: &str) -> String {
    format!("{}{}", CIRCLE_EVENTS_PREFIX, circle_id)
}
