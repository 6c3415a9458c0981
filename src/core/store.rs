use serde::{Deserialize, Serialize};

use super::gate::Location;

/// 会话生命周期状态机：匿名 → 认证中 → 已认证，登出回到匿名。
/// 认证失败回到匿名并设置错误标记。不存在其他状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Anonymous,
    Authenticating,
    Authenticated,
}

/// 位置共享开关。`PermissionDenied` 与"已开启但还没有采样"
/// 必须可区分，所以单独建一个状态而不是复用 Off。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingState {
    Off,
    On,
    PermissionDenied,
}

/// 会话中缓存的用户身份
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: String,
    pub name: String,
}

/// 广播给圈子其他成员的单元：用户 × 圈子 × 位置快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLocation {
    pub user_id: String,
    pub circle_id: String,
    pub location: Location,
}

/// 会话内存状态。外部文档存储才是持久的权威，这里只是当前会话的
/// 缓存，每次外部变更通知都要据此调和。
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub user: Option<SessionUser>,
    pub current_location: Option<Location>,
    pub circle_ids: Vec<String>,
    pub selected_circle: Option<String>,
    pub user_locations: Vec<UserLocation>,
    pub sharing: SharingState,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Anonymous
    }
}

impl Default for SharingState {
    fn default() -> Self {
        SharingState::Off
    }
}

/// 状态机的全部事件种类
#[derive(Debug, Clone)]
pub enum SessionEvent {
    AuthStarted,
    SetUser(Option<SessionUser>),
    AuthFailed(String),
    SetCircles(Vec<String>),
    SetSelectedCircle(Option<String>),
    SetCurrentLocation(Location),
    UpdateUserLocation(UserLocation),
    SetLoading(bool),
    SetError(Option<String>),
    ToggleLocationSharing,
    PermissionDenied,
}

impl SessionState {
    /// 同步状态迁移。给定当前状态和事件必须完备：任何分支都不会
    /// panic，未识别的组合保持原状。状态的唯一写入方是会话任务，
    /// 其他组件只读取或投递事件。
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::AuthStarted => {
                self.phase = SessionPhase::Authenticating;
                self.error = None;
            }
            SessionEvent::SetUser(Some(user)) => {
                self.phase = SessionPhase::Authenticated;
                self.user = Some(user);
                self.error = None;
            }
            SessionEvent::SetUser(None) => {
                // 登出：清空整个会话，回到匿名
                *self = SessionState::default();
            }
            SessionEvent::AuthFailed(message) => {
                self.phase = SessionPhase::Anonymous;
                self.user = None;
                self.error = Some(message);
            }
            SessionEvent::SetCircles(circle_ids) => {
                if let Some(selected) = &self.selected_circle {
                    if !circle_ids.contains(selected) {
                        self.selected_circle = None;
                    }
                }
                self.circle_ids = circle_ids;
            }
            SessionEvent::SetSelectedCircle(circle_id) => {
                self.selected_circle = circle_id;
            }
            SessionEvent::SetCurrentLocation(location) => {
                self.current_location = Some(location);
            }
            SessionEvent::UpdateUserLocation(update) => {
                self.upsert_user_location(update);
            }
            SessionEvent::SetLoading(loading) => {
                self.loading = loading;
            }
            SessionEvent::SetError(error) => {
                self.error = error;
            }
            SessionEvent::ToggleLocationSharing => {
                self.sharing = match self.sharing {
                    SharingState::On => SharingState::Off,
                    // 从权限拒绝状态切换视为用户重试开启
                    SharingState::Off | SharingState::PermissionDenied => SharingState::On,
                };
            }
            SessionEvent::PermissionDenied => {
                self.sharing = SharingState::PermissionDenied;
            }
        }
    }

    /// 按用户 upsert：已存在则原位替换位置（保持在序列中的位置），
    /// 不存在则追加。跨用户的到达顺序没有保证，所以只关心
    /// 每个用户最后一次写入。
    fn upsert_user_location(&mut self, update: UserLocation) {
        match self
            .user_locations
            .iter_mut()
            .find(|entry| entry.user_id == update.user_id)
        {
            Some(entry) => *entry = update,
            None => self.user_locations.push(update),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn location(latitude: f64) -> Location {
        Location {
            latitude,
            longitude: 121.47,
            accuracy: None,
            speed: None,
            heading: None,
            address: None,
            movement_status: crate::core::movement::classify(None),
            timestamp: Utc::now(),
        }
    }

    fn user_location(user_id: &str, latitude: f64) -> UserLocation {
        UserLocation {
            user_id: user_id.to_string(),
            circle_id: "c1".to_string(),
            location: location(latitude),
        }
    }

    #[test]
    fn login_lifecycle() {
        let mut state = SessionState::default();
        assert_eq!(state.phase, SessionPhase::Anonymous);

        state.apply(SessionEvent::AuthStarted);
        assert_eq!(state.phase, SessionPhase::Authenticating);

        state.apply(SessionEvent::SetUser(Some(SessionUser {
            user_id: "u1".into(),
            name: "小王".into(),
        })));
        assert_eq!(state.phase, SessionPhase::Authenticated);
        assert!(state.error.is_none());
    }

    #[test]
    fn auth_failure_returns_to_anonymous_with_error() {
        let mut state = SessionState::default();
        state.apply(SessionEvent::AuthStarted);
        state.apply(SessionEvent::AuthFailed("密码错误".into()));

        assert_eq!(state.phase, SessionPhase::Anonymous);
        assert!(state.user.is_none());
        assert_eq!(state.error.as_deref(), Some("密码错误"));
    }

    #[test]
    fn logout_clears_session() {
        let mut state = SessionState::default();
        state.apply(SessionEvent::SetUser(Some(SessionUser {
            user_id: "u1".into(),
            name: "小王".into(),
        })));
        state.apply(SessionEvent::UpdateUserLocation(user_location("u2", 31.0)));
        state.apply(SessionEvent::ToggleLocationSharing);

        state.apply(SessionEvent::SetUser(None));
        assert_eq!(state.phase, SessionPhase::Anonymous);
        assert!(state.user_locations.is_empty());
        assert_eq!(state.sharing, SharingState::Off);
    }

    #[test]
    fn upsert_replaces_in_place_and_appends_new() {
        let mut state = SessionState::default();
        state.apply(SessionEvent::UpdateUserLocation(user_location("u1", 31.0)));
        state.apply(SessionEvent::UpdateUserLocation(user_location("u2", 32.0)));
        state.apply(SessionEvent::UpdateUserLocation(user_location("u1", 33.0)));

        assert_eq!(state.user_locations.len(), 2);
        // u1 原位更新，仍然排在 u2 前面
        assert_eq!(state.user_locations[0].user_id, "u1");
        assert_eq!(state.user_locations[0].location.latitude, 33.0);
        assert_eq!(state.user_locations[1].user_id, "u2");
    }

    #[test]
    fn upsert_twice_leaves_single_entry() {
        let mut state = SessionState::default();
        state.apply(SessionEvent::UpdateUserLocation(user_location("u1", 31.0)));
        state.apply(SessionEvent::UpdateUserLocation(user_location("u1", 31.5)));

        assert_eq!(state.user_locations.len(), 1);
        assert_eq!(state.user_locations[0].location.latitude, 31.5);
    }

    #[test]
    fn permission_denied_distinct_from_off() {
        let mut state = SessionState::default();
        state.apply(SessionEvent::ToggleLocationSharing);
        assert_eq!(state.sharing, SharingState::On);

        state.apply(SessionEvent::PermissionDenied);
        assert_eq!(state.sharing, SharingState::PermissionDenied);
        assert_ne!(state.sharing, SharingState::Off);

        // 再次切换视为重试开启
        state.apply(SessionEvent::ToggleLocationSharing);
        assert_eq!(state.sharing, SharingState::On);
    }

    #[test]
    fn set_circles_drops_stale_selection() {
        let mut state = SessionState::default();
        state.apply(SessionEvent::SetCircles(vec!["c1".into(), "c2".into()]));
        state.apply(SessionEvent::SetSelectedCircle(Some("c2".into())));

        state.apply(SessionEvent::SetCircles(vec!["c1".into()]));
        assert!(state.selected_circle.is_none());
    }
}
