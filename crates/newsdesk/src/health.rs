use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::path::Path;

use crate::io::dated_dirs;

const STALE_AFTER_HOURS: i64 = 36;

#[derive(Debug, Clone, PartialEq)]
pub enum Health {
    Healthy { age: Duration },
    Stale { age: Duration },
    NoData,
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Health::Healthy { .. })
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_healthy() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Healthy { age } => write!(f, "✅ 健康：最新資料 {} 前", format_age(*age)),
            Health::Stale { age } => write!(f, "❌ 資料已過期：{}", format_age(*age)),
            Health::NoData => write!(f, "❌ 無資料資料夾"),
        }
    }
}

/// Freshness of the newest `data/Y/M/D` directory, dated at midnight UTC
pub fn check(data_root: &Path, now: DateTime<Utc>) -> Result<Health> {
    let Some(newest) = dated_dirs(data_root)?.pop() else {
        return Ok(Health::NoData);
    };

    let Some(midnight) = newest.date.and_hms_opt(0, 0, 0) else {
        return Ok(Health::NoData);
    };
    let age = now - midnight.and_utc();

    if age > Duration::hours(STALE_AFTER_HOURS) {
        Ok(Health::Stale { age })
    } else {
        Ok(Health::Healthy { age })
    }
}

fn format_age(age: Duration) -> String {
    let minutes = age.num_minutes();
    if minutes < 0 {
        return "0h 0m".to_string();
    }
    format!("{}h {}m", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 5, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_no_data() {
        let tmp = TempDir::new().unwrap();
        let health = check(tmp.path(), now()).unwrap();
        assert_eq!(health, Health::NoData);
        assert_eq!(health.exit_code(), 1);
    }

    #[test]
    fn test_fresh_data_is_healthy() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("2026/02/01")).unwrap();
        fs::create_dir_all(tmp.path().join("2026/02/04")).unwrap();
        let health = check(tmp.path(), now()).unwrap();
        assert_eq!(
            health,
            Health::Healthy {
                age: Duration::minutes(34 * 60 + 30)
            }
        );
        assert_eq!(health.exit_code(), 0);
        assert_eq!(health.to_string(), "✅ 健康：最新資料 34h 30m 前");
    }

    #[test]
    fn test_old_data_is_stale() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("2026/02/03")).unwrap();
        let health = check(tmp.path(), now()).unwrap();
        assert!(matches!(health, Health::Stale { .. }));
        assert_eq!(health.exit_code(), 1);
    }
}
