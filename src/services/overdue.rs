//! Overdue Sweeper
//!
//! 연체는 이벤트가 아니라 날짜의 함수이므로, 납부 상태를 읽기 전에 sweep 을 먼저 돌린다.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::db::Database;
use crate::error::Result;
use crate::services::clock::Clock;

pub struct OverdueSweeper {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl OverdueSweeper {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// 주어진 날짜 기준 sweep. 전환된 회차 수를 돌려준다.
    pub async fn mark_overdue_schedules(&self, today: NaiveDate) -> Result<u64> {
        let marked = self
            .db
            .mark_overdue_schedules(today, self.clock.now())
            .await?;

        if marked > 0 {
            tracing::info!(%today, marked, "schedules marked overdue");
        } else {
            tracing::debug!(%today, "no schedules became overdue");
        }
        Ok(marked)
    }

    /// Clock 의 오늘 날짜 기준 sweep
    pub async fn run(&self) -> Result<u64> {
        self.mark_overdue_schedules(self.clock.today()).await
    }
}
