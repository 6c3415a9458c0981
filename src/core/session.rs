use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::AppError;

use super::gate::{GateDecision, Location, RawSample, UpdateGate};
use super::store::{SessionEvent, SessionState, SessionUser, SharingState, UserLocation};

/// 被接受的位置更新的去向（持久化 + 圈子广播）。
/// 用 trait 注入方便在没有数据库的环境下测试会话任务。
#[async_trait]
pub trait LocationSink: Send + Sync + 'static {
    async fn deliver(&self, user_id: &str, location: &Location) -> Result<(), AppError>;
}

/// 投递给会话任务的命令
#[derive(Debug)]
pub enum SessionCommand {
    /// 设备上报的原始采样
    Sample(RawSample),
    /// 设备报告定位权限被拒绝
    PermissionDenied,
    /// 切换位置共享开关
    ToggleSharing,
    /// 订阅收到的其他成员位置更新
    RemoteUpdate(UserLocation),
    /// 读取当前会话状态快照
    Snapshot(oneshot::Sender<SessionState>),
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub min_interval: Duration,
    pub debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(5),
            debounce: Duration::from_secs(1),
        }
    }
}

/// 会话生命周期管理器的句柄。
///
/// 一个接入的设备会话对应一个任务，任务独占闸门、单发去抖定时器和
/// 会话状态——所有状态迁移都在这一个逻辑线程上执行，不需要加锁。
/// `shutdown` 保证在清空会话前取消未触发的去抖定时器并停掉命令
/// 循环，不会有过期回调写入已结束的会话。
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn spawn(
        user: SessionUser,
        circle_ids: Vec<String>,
        config: SessionConfig,
        sink: Arc<dyn LocationSink>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(run(user, circle_ids, config, sink, rx));
        Self { tx, task }
    }

    /// 返回 false 表示会话已经结束
    pub async fn send(&self, command: SessionCommand) -> bool {
        self.tx.send(command).await.is_ok()
    }

    pub async fn snapshot(&self) -> Option<SessionState> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SessionCommand::Snapshot(tx)).await.is_err() {
            return None;
        }
        rx.await.ok()
    }

    pub async fn shutdown(self) {
        let _ = self.tx.send(SessionCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

async fn run(
    user: SessionUser,
    circle_ids: Vec<String>,
    config: SessionConfig,
    sink: Arc<dyn LocationSink>,
    mut rx: mpsc::Receiver<SessionCommand>,
) {
    let user_id = user.user_id.clone();
    let mut state = SessionState::default();
    state.apply(SessionEvent::SetUser(Some(user)));
    state.apply(SessionEvent::SetCircles(circle_ids));
    // 设备打开位置流即视为开启共享
    state.apply(SessionEvent::ToggleLocationSharing);

    let mut gate = UpdateGate::new(config.min_interval, config.debounce);
    // 单发去抖定时器：None 表示未武装
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            command = rx.recv() => {
                match command {
                    None | Some(SessionCommand::Shutdown) => break,
                    Some(SessionCommand::Sample(sample)) => {
                        if state.sharing != SharingState::On {
                            continue;
                        }
                        match gate.offer(sample, Instant::now().into_std()) {
                            GateDecision::Accept(location) => {
                                deadline = None;
                                deliver(&mut state, &user_id, location, sink.as_ref()).await;
                            }
                            GateDecision::Deferred { deadline: next } => {
                                // 取消旧定时器并重新武装，永远只有一个在飞
                                deadline = Some(Instant::from_std(next));
                            }
                        }
                    }
                    Some(SessionCommand::PermissionDenied) => {
                        deadline = None;
                        state.apply(SessionEvent::PermissionDenied);
                    }
                    Some(SessionCommand::ToggleSharing) => {
                        state.apply(SessionEvent::ToggleLocationSharing);
                        if state.sharing != SharingState::On {
                            deadline = None;
                        }
                    }
                    Some(SessionCommand::RemoteUpdate(update)) => {
                        state.apply(SessionEvent::UpdateUserLocation(update));
                    }
                    Some(SessionCommand::Snapshot(reply)) => {
                        let _ = reply.send(state.clone());
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                if let Some(location) = gate.fire(Instant::now().into_std()) {
                    deliver(&mut state, &user_id, location, sink.as_ref()).await;
                }
            }
        }
    }
    // 任务退出即注销定时器和订阅；登出后的会话不会再被写入
}

async fn deliver(
    state: &mut SessionState,
    user_id: &str,
    location: Location,
    sink: &dyn LocationSink,
) {
    state.apply(SessionEvent::SetCurrentLocation(location.clone()));
    state.apply(SessionEvent::UpdateUserLocation(UserLocation {
        user_id: user_id.to_string(),
        circle_id: state.selected_circle.clone().unwrap_or_default(),
        location: location.clone(),
    }));

    // 写失败只丢弃这一条采样，由下一条被接受的采样自然重试
    if let Err(e) = sink.deliver(user_id, &location).await {
        tracing::warn!("丢弃位置更新（用户 {}）: {}", user_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        delivered: Mutex<Vec<Location>>,
        fail: bool,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn count(&self) -> usize {
            self.delivered.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl LocationSink for RecordingSink {
        async fn deliver(&self, _user_id: &str, location: &Location) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::BackendUnavailable("connection refused".into()));
            }
            self.delivered.lock().expect("lock").push(location.clone());
            Ok(())
        }
    }

    fn test_user() -> SessionUser {
        SessionUser {
            user_id: "u1".into(),
            name: "小王".into(),
        }
    }

    fn sample(latitude: f64) -> RawSample {
        RawSample {
            latitude,
            longitude: 121.47,
            accuracy: Some(5.0),
            speed: Some(1.0),
            heading: None,
        }
    }

    async fn wait_for_latitude(session: &SessionHandle, latitude: f64) -> bool {
        for _ in 0..50 {
            if let Some(state) = session.snapshot().await {
                if state
                    .current_location
                    .as_ref()
                    .is_some_and(|l| l.latitude == latitude)
                {
                    return true;
                }
            }
            tokio::task::yield_now().await;
        }
        false
    }

    #[tokio::test(start_paused = true)]
    async fn first_sample_delivered_immediately() {
        let sink = RecordingSink::new();
        let session = SessionHandle::spawn(
            test_user(),
            vec!["c1".into()],
            SessionConfig::default(),
            sink.clone(),
        );

        assert!(session.send(SessionCommand::Sample(sample(31.0))).await);
        assert!(wait_for_latitude(&session, 31.0).await);
        assert_eq!(sink.count(), 1);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_sample_accepted_after_interval() {
        let sink = RecordingSink::new();
        let session = SessionHandle::spawn(
            test_user(),
            vec!["c1".into()],
            SessionConfig::default(),
            sink.clone(),
        );

        session.send(SessionCommand::Sample(sample(31.0))).await;
        assert!(wait_for_latitude(&session, 31.0).await);

        // 间隔快满时到达的采样会先暂存，去抖到期后补发
        tokio::time::advance(Duration::from_millis(4500)).await;
        session.send(SessionCommand::Sample(sample(31.5))).await;
        let _ = session.snapshot().await;
        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(wait_for_latitude(&session, 31.5).await);
        assert_eq!(sink.count(), 2);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_samples_within_interval_are_dropped() {
        let sink = RecordingSink::new();
        let session = SessionHandle::spawn(
            test_user(),
            vec!["c1".into()],
            SessionConfig::default(),
            sink.clone(),
        );

        session.send(SessionCommand::Sample(sample(31.0))).await;
        assert!(wait_for_latitude(&session, 31.0).await);

        // 1 秒后的采样在去抖到期时仍不满足最小间隔，被丢弃
        tokio::time::advance(Duration::from_secs(1)).await;
        session.send(SessionCommand::Sample(sample(31.5))).await;
        let _ = session.snapshot().await;
        tokio::time::advance(Duration::from_secs(2)).await;

        let state = session.snapshot().await.expect("snapshot");
        assert_eq!(
            state.current_location.expect("location").latitude,
            31.0
        );
        assert_eq!(sink.count(), 1);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_debounce() {
        let sink = RecordingSink::new();
        let session = SessionHandle::spawn(
            test_user(),
            vec!["c1".into()],
            SessionConfig::default(),
            sink.clone(),
        );

        session.send(SessionCommand::Sample(sample(31.0))).await;
        assert!(wait_for_latitude(&session, 31.0).await);
        tokio::time::advance(Duration::from_millis(4500)).await;
        session.send(SessionCommand::Sample(sample(31.5))).await;
        let _ = session.snapshot().await;

        // 去抖还没到期就登出，暂存采样不得再被投递
        session.shutdown().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_stops_sampling() {
        let sink = RecordingSink::new();
        let session = SessionHandle::spawn(
            test_user(),
            vec!["c1".into()],
            SessionConfig::default(),
            sink.clone(),
        );

        session.send(SessionCommand::PermissionDenied).await;
        session.send(SessionCommand::Sample(sample(31.0))).await;

        let state = session.snapshot().await.expect("snapshot");
        assert_eq!(state.sharing, SharingState::PermissionDenied);
        assert!(state.current_location.is_none());
        assert_eq!(sink.count(), 0);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn backend_failure_drops_single_sample() {
        let sink = RecordingSink::failing();
        let session = SessionHandle::spawn(
            test_user(),
            vec!["c1".into()],
            SessionConfig::default(),
            sink.clone(),
        );

        session.send(SessionCommand::Sample(sample(31.0))).await;

        // 写失败只是丢样本，会话状态照常更新，任务不会崩
        assert!(wait_for_latitude(&session, 31.0).await);
        assert_eq!(sink.count(), 0);

        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn remote_updates_upsert_into_state() {
        let sink = RecordingSink::new();
        let session = SessionHandle::spawn(
            test_user(),
            vec!["c1".into()],
            SessionConfig::default(),
            sink.clone(),
        );

        let remote = |latitude: f64| UserLocation {
            user_id: "u2".into(),
            circle_id: "c1".into(),
            location: Location::from_sample(&sample(latitude), chrono::Utc::now()),
        };
        session.send(SessionCommand::RemoteUpdate(remote(30.0))).await;
        session.send(SessionCommand::RemoteUpdate(remote(30.5))).await;

        let state = session.snapshot().await.expect("snapshot");
        assert_eq!(state.user_locations.len(), 1);
        assert_eq!(state.user_locations[0].location.latitude, 30.5);

        session.shutdown().await;
    }
}
