use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::movement::{self, MovementStatus};

/// 设备上报的原始定位采样
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSample {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

/// 经过闸门接受后的完整位置快照，附带推导出的移动状态。
/// 一旦生成不再修改，只会被下一次采样整体替换。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub address: Option<String>,
    pub movement_status: MovementStatus,
    pub timestamp: DateTime<Utc>,
}

impl Location {
    pub fn from_sample(sample: &RawSample, at: DateTime<Utc>) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy: sample.accuracy,
            speed: sample.speed,
            heading: sample.heading,
            address: None,
            movement_status: movement::classify(sample.speed),
            timestamp: at,
        }
    }
}

/// `offer` 的判定结果
#[derive(Debug)]
pub enum GateDecision {
    /// 采样被接受，可以持久化并广播
    Accept(Location),
    /// 采样被暂存，到 `deadline` 时调用 `fire` 再评估
    Deferred { deadline: Instant },
}

/// 位置更新闸门：限制高频采样流的写入/广播频率。
///
/// 规则：会话的第一条采样无条件接受；之后距上一次**被接受**的更新
/// 不足最小间隔（默认 5 秒）的采样进入去抖窗口（默认 1 秒），窗口内
/// 只保留最新的一条，窗口到期时再评估。到期仍不满足最小间隔的暂存
/// 采样直接丢弃，由后续采样自然重试。
///
/// 本身不持有定时器，所有时间由调用方注入，方便单线程会话任务驱动。
pub struct UpdateGate {
    min_interval: Duration,
    debounce: Duration,
    last_accepted: Option<Instant>,
    pending: Option<RawSample>,
}

impl UpdateGate {
    pub fn new(min_interval: Duration, debounce: Duration) -> Self {
        Self {
            min_interval,
            debounce,
            last_accepted: None,
            pending: None,
        }
    }

    /// 送入一条新采样。返回 `Deferred` 时调用方必须取消旧的去抖
    /// 定时器并按新 deadline 重新武装，保证定时器永远只有一个。
    pub fn offer(&mut self, sample: RawSample, now: Instant) -> GateDecision {
        if self.interval_elapsed(now) {
            self.pending = None;
            GateDecision::Accept(self.accept(sample, now))
        } else {
            // 去抖窗口内只保留最新的暂存采样
            self.pending = Some(sample);
            GateDecision::Deferred {
                deadline: now + self.debounce,
            }
        }
    }

    /// 去抖窗口到期时调用。暂存采样满足最小间隔则接受，否则丢弃。
    pub fn fire(&mut self, now: Instant) -> Option<Location> {
        let sample = self.pending.take()?;
        if self.interval_elapsed(now) {
            Some(self.accept(sample, now))
        } else {
            None
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        match self.last_accepted {
            // 会话的第一条采样总是被接受
            None => true,
            Some(last) => now.duration_since(last) >= self.min_interval,
        }
    }

    fn accept(&mut self, sample: RawSample, now: Instant) -> Location {
        self.last_accepted = Some(now);
        Location::from_sample(&sample, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::movement::MovementStatus;

    fn sample(latitude: f64, speed: Option<f64>) -> RawSample {
        RawSample {
            latitude,
            longitude: 121.47,
            accuracy: Some(10.0),
            speed,
            heading: None,
        }
    }

    fn gate() -> UpdateGate {
        UpdateGate::new(Duration::from_secs(5), Duration::from_secs(1))
    }

    #[test]
    fn first_sample_always_accepted() {
        let mut gate = gate();
        match gate.offer(sample(31.23, Some(1.0)), Instant::now()) {
            GateDecision::Accept(loc) => {
                assert_eq!(loc.latitude, 31.23);
                assert_eq!(loc.movement_status, MovementStatus::Walking);
            }
            GateDecision::Deferred { .. } => panic!("first sample must be accepted"),
        }
    }

    #[test]
    fn sample_within_interval_is_deferred() {
        let mut gate = gate();
        let t0 = Instant::now();
        let _ = gate.offer(sample(31.0, None), t0);

        let decision = gate.offer(sample(31.1, None), t0 + Duration::from_secs(1));
        match decision {
            GateDecision::Deferred { deadline } => {
                assert_eq!(deadline, t0 + Duration::from_secs(2));
                assert!(gate.has_pending());
            }
            GateDecision::Accept(_) => panic!("sample inside interval must be deferred"),
        }
    }

    #[test]
    fn newer_sample_replaces_pending() {
        let mut gate = gate();
        let t0 = Instant::now();
        let _ = gate.offer(sample(31.0, None), t0);
        let _ = gate.offer(sample(31.1, None), t0 + Duration::from_secs(1));
        let _ = gate.offer(sample(31.2, None), t0 + Duration::from_millis(1500));

        // 间隔已满足时，暂存的是最新一条
        let loc = gate.fire(t0 + Duration::from_secs(5)).expect("accepted");
        assert_eq!(loc.latitude, 31.2);
        assert!(!gate.has_pending());
    }

    #[test]
    fn pending_discarded_when_interval_not_elapsed() {
        let mut gate = gate();
        let t0 = Instant::now();
        let _ = gate.offer(sample(31.0, None), t0);
        let _ = gate.offer(sample(31.1, None), t0 + Duration::from_secs(2));

        assert!(gate.fire(t0 + Duration::from_secs(3)).is_none());
        assert!(!gate.has_pending());
    }

    #[test]
    fn burst_then_quiet_accepts_at_zero_and_six() {
        // 采样时刻 0s/1s/2s/6s，只有 0s 和 6s 被接受
        let mut gate = gate();
        let t0 = Instant::now();
        let mut accepted = Vec::new();

        for (offset, lat) in [(0u64, 31.0), (1, 31.1), (2, 31.2)] {
            if let GateDecision::Accept(loc) = gate.offer(sample(lat, None), t0 + Duration::from_secs(offset)) {
                accepted.push(loc.latitude);
            }
        }
        // 2s 那条的去抖窗口在 3s 到期，此时间隔不足，暂存被丢弃
        assert!(gate.fire(t0 + Duration::from_secs(3)).is_none());

        if let GateDecision::Accept(loc) = gate.offer(sample(31.6, None), t0 + Duration::from_secs(6)) {
            accepted.push(loc.latitude);
        }

        assert_eq!(accepted, vec![31.0, 31.6]);
    }

    #[test]
    fn acceptance_bound_holds_under_flooding() {
        // 每 100ms 一条采样持续 20 秒，接受数不超过 ⌈20/5⌉ + 1
        let mut gate = gate();
        let t0 = Instant::now();
        let mut accepted = 0usize;
        let mut deadline: Option<Instant> = None;

        for tick in 0..=200u64 {
            let now = t0 + Duration::from_millis(tick * 100);
            // 模拟单发去抖定时器：到期才触发，新采样会重新武装
            if let Some(d) = deadline {
                if now >= d {
                    if gate.fire(d).is_some() {
                        accepted += 1;
                    }
                    deadline = None;
                }
            }
            match gate.offer(sample(31.0, None), now) {
                GateDecision::Accept(_) => accepted += 1,
                GateDecision::Deferred { deadline: d } => deadline = Some(d),
            }
        }

        assert!(accepted <= 20 / 5 + 1, "accepted {} updates", accepted);
        assert!(accepted >= 1);
    }
}
