//! Query / Aggregation Facade
//!
//! 읽기 전용 view. `observe_*` 는 관련 테이블 commit 마다 다시 계산되는 `Observer` 를,
//! `get_*` 는 1회성 결과를 돌려준다.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;
use crate::services::live::{LiveQuery, Observer, Table};
use crate::types::{Debt, DebtPayment, DebtSchedule, DueUrgency, KasbonEntry, Rupiah};

// ============ Views ============

/// Active 부채 + 진행 상황
#[derive(Debug, Clone, Serialize)]
pub struct ActiveDebtView {
    pub debt: Debt,
    /// 가장 빠른 미납 회차 (Installment 만)
    pub next_schedule: Option<DebtSchedule>,
    pub paid_count: u32,
    pub total_count: u32,
    /// 자유 상환 건수 (Personal/Tab)
    pub payment_count: u32,
    /// paid_count / total_count (0.0 - 1.0, 회차가 없으면 0)
    pub percentage: f64,
    /// (total - remaining) / total
    pub amount_progress: f64,
}

/// 납부 예정 회차
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingDue {
    pub schedule: DebtSchedule,
    pub debt_name: String,
    pub platform_name: Option<String>,
}

impl UpcomingDue {
    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        self.schedule.days_until_due(today)
    }

    pub fn urgency(&self, today: NaiveDate) -> DueUrgency {
        DueUrgency::classify(self.days_until_due(today))
    }
}

pub fn schedule_percentage(paid_count: u32, total_count: u32) -> f64 {
    if total_count == 0 {
        return 0.0;
    }
    f64::from(paid_count) / f64::from(total_count)
}

// ============ Live Queries ============

pub struct ActiveDebtsQuery;

#[async_trait]
impl LiveQuery for ActiveDebtsQuery {
    type Output = Vec<ActiveDebtView>;

    fn depends_on(&self) -> &'static [Table] {
        &[Table::Debts, Table::Schedules, Table::Payments]
    }

    async fn run(&self, db: &Database) -> Result<Self::Output> {
        let debts = db.active_debts().await?;

        let mut next_open: HashMap<Uuid, DebtSchedule> = HashMap::new();
        for schedule in db.open_schedules_of_active_debts().await? {
            next_open.entry(schedule.debt_id).or_insert(schedule);
        }

        let schedule_counts: HashMap<Uuid, (u32, u32)> = db
            .schedule_counts()
            .await?
            .into_iter()
            .map(|row| (row.debt_id, (clamp_count(row.paid_count), clamp_count(row.total_count))))
            .collect();

        let payment_counts: HashMap<Uuid, u32> = db
            .payment_counts()
            .await?
            .into_iter()
            .map(|row| (row.debt_id, clamp_count(row.payment_count)))
            .collect();

        Ok(debts
            .into_iter()
            .map(|debt| {
                let (paid_count, total_count) =
                    schedule_counts.get(&debt.id).copied().unwrap_or((0, 0));
                let amount_progress = debt.amount_progress();
                ActiveDebtView {
                    next_schedule: next_open.remove(&debt.id),
                    payment_count: payment_counts.get(&debt.id).copied().unwrap_or(0),
                    paid_count,
                    total_count,
                    percentage: schedule_percentage(paid_count, total_count),
                    amount_progress,
                    debt,
                }
            })
            .collect())
    }
}

pub struct TotalRemainingQuery;

#[async_trait]
impl LiveQuery for TotalRemainingQuery {
    type Output = Rupiah;

    fn depends_on(&self) -> &'static [Table] {
        &[Table::Debts]
    }

    async fn run(&self, db: &Database) -> Result<Self::Output> {
        db.total_remaining().await
    }
}

pub struct CompletedDebtsQuery;

#[async_trait]
impl LiveQuery for CompletedDebtsQuery {
    type Output = Vec<Debt>;

    fn depends_on(&self) -> &'static [Table] {
        &[Table::Debts]
    }

    async fn run(&self, db: &Database) -> Result<Self::Output> {
        db.completed_debts().await
    }
}

pub struct PaymentsQuery {
    pub debt_id: Uuid,
}

#[async_trait]
impl LiveQuery for PaymentsQuery {
    type Output = Vec<DebtPayment>;

    fn depends_on(&self) -> &'static [Table] {
        &[Table::Payments]
    }

    fn debt_scope(&self) -> Option<Uuid> {
        Some(self.debt_id)
    }

    async fn run(&self, db: &Database) -> Result<Self::Output> {
        db.payments_for(self.debt_id).await
    }
}

pub struct KasbonEntriesQuery {
    pub debt_id: Uuid,
}

#[async_trait]
impl LiveQuery for KasbonEntriesQuery {
    type Output = Vec<KasbonEntry>;

    fn depends_on(&self) -> &'static [Table] {
        &[Table::KasbonEntries]
    }

    fn debt_scope(&self) -> Option<Uuid> {
        Some(self.debt_id)
    }

    async fn run(&self, db: &Database) -> Result<Self::Output> {
        db.kasbon_entries_for(self.debt_id).await
    }
}

pub struct SchedulesQuery {
    pub debt_id: Uuid,
}

#[async_trait]
impl LiveQuery for SchedulesQuery {
    type Output = Vec<DebtSchedule>;

    fn depends_on(&self) -> &'static [Table] {
        &[Table::Schedules]
    }

    fn debt_scope(&self) -> Option<Uuid> {
        Some(self.debt_id)
    }

    async fn run(&self, db: &Database) -> Result<Self::Output> {
        db.schedules_for(self.debt_id).await
    }
}

// ============ Facade ============

pub struct DebtQueries {
    db: Arc<Database>,
}

impl DebtQueries {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn observe_active_debts_with_schedule(&self) -> Observer<ActiveDebtsQuery> {
        Observer::new(self.db.clone(), ActiveDebtsQuery)
    }

    pub fn observe_total_remaining(&self) -> Observer<TotalRemainingQuery> {
        Observer::new(self.db.clone(), TotalRemainingQuery)
    }

    pub fn observe_completed_debts(&self) -> Observer<CompletedDebtsQuery> {
        Observer::new(self.db.clone(), CompletedDebtsQuery)
    }

    pub fn observe_payments(&self, debt_id: Uuid) -> Observer<PaymentsQuery> {
        Observer::new(self.db.clone(), PaymentsQuery { debt_id })
    }

    pub fn observe_kasbon_entries(&self, debt_id: Uuid) -> Observer<KasbonEntriesQuery> {
        Observer::new(self.db.clone(), KasbonEntriesQuery { debt_id })
    }

    pub fn observe_schedules(&self, debt_id: Uuid) -> Observer<SchedulesQuery> {
        Observer::new(self.db.clone(), SchedulesQuery { debt_id })
    }

    /// id 로 조회 (soft delete 된 부채도 반환, `is_deleted` 로 구분)
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Debt>> {
        self.db.find_debt(id).await
    }

    pub async fn get_schedules(&self, debt_id: Uuid) -> Result<Vec<DebtSchedule>> {
        self.db.schedules_for(debt_id).await
    }

    /// max_date 이하 미납 회차 (납부일 오름차순)
    pub async fn get_upcoming_due(&self, max_date: NaiveDate) -> Result<Vec<UpcomingDue>> {
        let rows = self.db.upcoming_due(max_date).await?;
        tracing::debug!(%max_date, count = rows.len(), "upcoming due loaded");

        rows.into_iter()
            .map(|row| {
                Ok(UpcomingDue {
                    schedule: DebtSchedule::try_from(row.schedule)?,
                    debt_name: row.debt_name,
                    platform_name: row.platform_name,
                })
            })
            .collect()
    }
}

fn clamp_count(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_percentage() {
        assert_eq!(schedule_percentage(0, 0), 0.0);
        assert_eq!(schedule_percentage(3, 6), 0.5);
        assert_eq!(schedule_percentage(6, 6), 1.0);
    }
}
