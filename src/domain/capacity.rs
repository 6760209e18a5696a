// ==========================================
// 磨粉厂筒仓台账系统 - 容量换算
// ==========================================
// 职责: 料位百分比 <-> 吨位 换算, 料位分档
// 红线: 写入路径不做截断, 仅展示时截断/四舍五入
// ==========================================

use serde::{Deserialize, Serialize};

/// 往返换算允许误差 (吨 / 百分点)
pub const LEVEL_TOLERANCE: f64 = 0.1;

/// 有效容量: 缺失、非正数、非有限值都视为未知
fn effective_capacity(capacity_tons: Option<f64>) -> Option<f64> {
    capacity_tons.filter(|c| c.is_finite() && *c > 0.0)
}

/// 吨位 -> 百分比
///
/// 容量未知时返回 None, 调用方必须直接提供吨位。
pub fn percent_from_tons(tons: f64, capacity_tons: Option<f64>) -> Option<f64> {
    effective_capacity(capacity_tons).map(|c| tons / c * 100.0)
}

/// 百分比 -> 吨位
pub fn tons_from_percent(percent: f64, capacity_tons: Option<f64>) -> Option<f64> {
    effective_capacity(capacity_tons).map(|c| percent / 100.0 * c)
}

/// 展示用百分比 (截断到 [0, 100])
pub fn display_percent(percent: f64) -> f64 {
    percent.clamp(0.0, 100.0)
}

/// 展示用一位小数
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ==========================================
// LevelBand - 料位分档
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LevelBand {
    Normal,   // 正常
    Medium,   // 中等
    High,     // 偏高
    Critical, // 接近满仓
}

/// 分档阈值 (百分比下界)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelBandThresholds {
    pub medium_pct: f64,
    pub high_pct: f64,
    pub critical_pct: f64,
}

impl Default for LevelBandThresholds {
    fn default() -> Self {
        Self {
            medium_pct: 40.0,
            high_pct: 60.0,
            critical_pct: 80.0,
        }
    }
}

impl LevelBandThresholds {
    /// 按百分比分档
    pub fn classify(&self, percent: f64) -> LevelBand {
        if percent >= self.critical_pct {
            LevelBand::Critical
        } else if percent >= self.high_pct {
            LevelBand::High
        } else if percent >= self.medium_pct {
            LevelBand::Medium
        } else {
            LevelBand::Normal
        }
    }

    /// 阈值必须严格递增
    pub fn is_valid(&self) -> bool {
        self.medium_pct < self.high_pct && self.high_pct < self.critical_pct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_and_tons_conversion() {
        assert_eq!(percent_from_tons(10.0, Some(50.0)), Some(20.0));
        assert_eq!(tons_from_percent(62.5, Some(40.0)), Some(25.0));
    }

    #[test]
    fn test_conversion_without_capacity() {
        assert_eq!(percent_from_tons(10.0, None), None);
        assert_eq!(tons_from_percent(10.0, None), None);
        assert_eq!(percent_from_tons(10.0, Some(0.0)), None);
        assert_eq!(tons_from_percent(10.0, Some(f64::NAN)), None);
    }

    #[test]
    fn test_roundtrip_within_tolerance() {
        for capacity in [0.5, 1.0, 7.3, 40.0, 50.0, 333.3, 1200.0] {
            let mut tons = 0.0;
            while tons <= capacity {
                let percent = percent_from_tons(tons, Some(capacity)).unwrap();
                let back = tons_from_percent(percent, Some(capacity)).unwrap();
                assert!((back - tons).abs() <= LEVEL_TOLERANCE, "c={capacity} t={tons}");
                tons += capacity / 17.0;
            }
        }
    }

    #[test]
    fn test_no_clamp_on_write() {
        // 超过 100% 的换算结果原样返回
        assert_eq!(percent_from_tons(60.0, Some(50.0)), Some(120.0));
        assert_eq!(display_percent(120.0), 100.0);
        assert_eq!(display_percent(-3.0), 0.0);
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(14.04), 14.0);
        assert_eq!(round1(14.05_f64 + 1e-9), 14.1);
    }

    #[test]
    fn test_level_band_classify() {
        let t = LevelBandThresholds::default();
        assert!(t.is_valid());
        assert_eq!(t.classify(0.0), LevelBand::Normal);
        assert_eq!(t.classify(39.9), LevelBand::Normal);
        assert_eq!(t.classify(40.0), LevelBand::Medium);
        assert_eq!(t.classify(60.0), LevelBand::High);
        assert_eq!(t.classify(80.0), LevelBand::Critical);
        assert_eq!(t.classify(100.0), LevelBand::Critical);
    }
}
