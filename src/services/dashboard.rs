//! Dashboard
//!
//! 대시보드 로딩 시 sweep 을 먼저 돌린 뒤 잔액 합계와 납부 알림을 계산한다.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::error::Result;
use crate::services::clock::Clock;
use crate::services::overdue::OverdueSweeper;
use crate::services::query::{ActiveDebtView, DebtQueries, UpcomingDue};
use crate::types::{DueUrgency, Rupiah};

/// 납부 알림 1건
#[derive(Debug, Clone, Serialize)]
pub struct DueAlert {
    #[serde(flatten)]
    pub due: UpcomingDue,
    pub days_until_due: i64,
    pub urgency: DueUrgency,
}

/// 대시보드 스냅샷
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub today: NaiveDate,
    pub overdue_marked: u64,
    pub total_remaining: Rupiah,
    pub active_debts: Vec<ActiveDebtView>,
    pub due_alerts: Vec<DueAlert>,
}

pub struct Dashboard {
    queries: Arc<DebtQueries>,
    sweeper: Arc<OverdueSweeper>,
    clock: Arc<dyn Clock>,
    /// 오늘부터 며칠 뒤까지 알림에 포함할지
    alert_window_days: i64,
}

impl Dashboard {
    pub fn new(
        queries: Arc<DebtQueries>,
        sweeper: Arc<OverdueSweeper>,
        clock: Arc<dyn Clock>,
        alert_window_days: i64,
    ) -> Self {
        Self {
            queries,
            sweeper,
            clock,
            alert_window_days,
        }
    }

    /// sweep → 조회
    pub async fn load(&self) -> Result<DashboardSnapshot> {
        let today = self.clock.today();
        let overdue_marked = self.sweeper.mark_overdue_schedules(today).await?;

        let total_remaining = self.queries.observe_total_remaining().latest().await?;
        let active_debts = self.queries.observe_active_debts_with_schedule().latest().await?;
        let due_alerts = self.due_alerts_on(today).await?;

        tracing::debug!(
            %today,
            total_remaining,
            active = active_debts.len(),
            alerts = due_alerts.len(),
            "dashboard loaded"
        );

        Ok(DashboardSnapshot {
            today,
            overdue_marked,
            total_remaining,
            active_debts,
            due_alerts,
        })
    }

    /// 알림 구간 내 미납 회차 + 긴급도 (sweep 은 호출자가 먼저 수행)
    pub async fn due_alerts_on(&self, today: NaiveDate) -> Result<Vec<DueAlert>> {
        let max_date = today + Duration::days(self.alert_window_days);
        let upcoming = self.queries.get_upcoming_due(max_date).await?;

        Ok(upcoming
            .into_iter()
            .map(|due| {
                let days_until_due = due.days_until_due(today);
                DueAlert {
                    urgency: DueUrgency::classify(days_until_due),
                    days_until_due,
                    due,
                }
            })
            .collect())
    }
}
