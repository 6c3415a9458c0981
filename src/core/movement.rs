use serde::{Deserialize, Serialize};

// 移动状态分类阈值（米/秒）
const WALKING_THRESHOLD: f64 = 0.28; // 约 1 km/h
const DRIVING_THRESHOLD: f64 = 2.78; // 约 10 km/h

/// 根据速度推导出的移动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementStatus {
    Stationary,
    Walking,
    Driving,
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementStatus::Stationary => "stationary",
            MovementStatus::Walking => "walking",
            MovementStatus::Driving => "driving",
        }
    }

    /// 从存储的字符串还原，未知值一律当作静止
    pub fn from_str_or_stationary(s: &str) -> Self {
        match s {
            "walking" => MovementStatus::Walking,
            "driving" => MovementStatus::Driving,
            _ => MovementStatus::Stationary,
        }
    }
}

/// 把速度标量映射为移动状态。
///
/// 缺失、负数或非法（NaN）的速度按 0 处理，返回静止而不是报错。
pub fn classify(speed: Option<f64>) -> MovementStatus {
    let speed = match speed {
        Some(s) if s.is_finite() && s > 0.0 => s,
        _ => 0.0,
    };

    if speed < WALKING_THRESHOLD {
        MovementStatus::Stationary
    } else if speed < DRIVING_THRESHOLD {
        MovementStatus::Walking
    } else {
        MovementStatus::Driving
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_speed_is_stationary() {
        assert_eq!(classify(Some(0.0)), MovementStatus::Stationary);
    }

    #[test]
    fn missing_speed_is_stationary() {
        assert_eq!(classify(None), MovementStatus::Stationary);
    }

    #[test]
    fn negative_and_nan_speed_are_stationary() {
        assert_eq!(classify(Some(-3.0)), MovementStatus::Stationary);
        assert_eq!(classify(Some(f64::NAN)), MovementStatus::Stationary);
    }

    #[test]
    fn half_meter_per_second_is_walking() {
        assert_eq!(classify(Some(0.5)), MovementStatus::Walking);
    }

    #[test]
    fn threshold_boundaries() {
        // 下边界含、上边界不含
        assert_eq!(classify(Some(0.27)), MovementStatus::Stationary);
        assert_eq!(classify(Some(0.28)), MovementStatus::Walking);
        assert_eq!(classify(Some(2.77)), MovementStatus::Walking);
        assert_eq!(classify(Some(2.78)), MovementStatus::Driving);
        assert_eq!(classify(Some(33.0)), MovementStatus::Driving);
    }

    #[test]
    fn status_round_trips_through_storage_string() {
        for status in [
            MovementStatus::Stationary,
            MovementStatus::Walking,
            MovementStatus::Driving,
        ] {
            assert_eq!(MovementStatus::from_str_or_stationary(status.as_str()), status);
        }
        assert_eq!(
            MovementStatus::from_str_or_stationary("teleporting"),
            MovementStatus::Stationary
        );
    }
}
