//! Clock Service
//!
//! "now" (UTC timestamp) 와 "today" (고정 timezone 의 로컬 날짜) 제공.
//! 연체 판정은 로컬 날짜 기준이므로 timezone 은 설정으로 고정한다.

use std::sync::RwLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};

/// 시간 공급자
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn offset(&self) -> FixedOffset;

    /// 고정 timezone 기준 오늘 날짜
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.offset()).date_naive()
    }
}

/// 시스템 시계
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// UTC 기준 분 단위 offset (WIB = 420)
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes * 60).map(Self::new)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// 수동으로 움직이는 시계 (테스트, 재계산용)
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: RwLock::new(now),
            offset,
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}
