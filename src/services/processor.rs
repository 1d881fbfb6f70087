//! Payment Processor
//!
//! 부채 잔액을 바꾸는 모든 명령 (생성, 할부 상환, 자유 상환, 카스본 추가, 삭제).
//!
//! # Atomicity
//!
//! 각 명령은 `LedgerTx` 하나 안에서 모든 쓰기를 수행하고 commit 한다.
//! 중간에 실패하면 어떤 쓰기도 남지 않는다.
//!
//! # Per-debt Serialization
//!
//! 같은 부채에 대한 명령은 `DebtLocks` 로 도착 순서대로 직렬화된다.
//! 서로 다른 부채의 명령은 서로 기다리지 않고, 쓰기 트랜잭션 자체는
//! `Database` 의 writer lock 아래에서 하나씩 commit 된다 (SQLite 단일 writer).

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::db::{Database, LedgerTx};
use crate::error::{LedgerError, Result};
use crate::services::clock::Clock;
use crate::services::validation::{validate_amount, validate_new_debt, NewDebtRequest};
use crate::types::{
    Debt, DebtPayment, DebtSchedule, DebtType, ExpenseRecord, KasbonEntry, PaymentEffect, Rupiah,
    ScheduleStatus,
};

/// 부채 id 별 비동기 Mutex
#[derive(Default)]
pub struct DebtLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl DebtLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 해당 부채의 락 획득 (guard drop 시 해제)
    pub async fn acquire(&self, debt_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // 아무도 쥐고 있지 않은 락 정리
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(debt_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

/// 상환 결과
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    /// commit 후 부채 상태
    pub debt: Debt,
    pub effect: PaymentEffect,
    pub expense: ExpenseRecord,
    /// 할부 상환이면 Paid 처리된 회차
    pub schedule: Option<DebtSchedule>,
    /// 자유 상환이면 추가된 상환 기록
    pub payment: Option<DebtPayment>,
}

/// 부채 명령 처리기
pub struct PaymentProcessor {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    locks: DebtLocks,
}

impl PaymentProcessor {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            locks: DebtLocks::new(),
        }
    }

    // ============ Creation ============

    /// 부채 + 스케줄을 한 트랜잭션으로 저장
    ///
    /// Installment 는 `installment_count` 개의 스케줄이 있어야 하고,
    /// Personal/Tab 은 스케줄이 없어야 한다.
    pub async fn save_debt(&self, debt: &Debt, schedules: &[DebtSchedule]) -> Result<()> {
        check_schedule_set(debt, schedules)?;

        let mut tx = self.db.begin().await?;
        tx.insert_debt(debt).await?;
        tx.insert_schedules(schedules).await?;
        tx.commit().await?;

        tracing::info!(
            debt_id = %debt.id,
            debt_type = %debt.debt_type(),
            total = debt.total_amount,
            schedules = schedules.len(),
            "debt saved"
        );
        Ok(())
    }

    /// 검증 → 스케줄 생성 → 저장
    pub async fn create_debt(&self, request: NewDebtRequest) -> Result<Debt> {
        let validated = validate_new_debt(request, self.clock.now())?;
        self.save_debt(&validated.debt, &validated.schedules).await?;
        Ok(validated.debt)
    }

    // ============ Payments ============

    /// 할부 회차 상환
    ///
    /// 1. 잔액 = max(0, 잔액 - amount)
    /// 2. 회차 Paid, actual_amount = amount, paid_at = now
    /// 3. expense ledger 기록
    /// 4. 잔액 0 이면 Completed
    pub async fn pay_installment(
        &self,
        debt_id: Uuid,
        schedule_id: Uuid,
        amount: Rupiah,
    ) -> Result<PaymentReceipt> {
        validate_amount(amount, "payment amount")?;
        let _guard = self.locks.acquire(debt_id).await;

        let now = self.clock.now();
        let today = self.clock.today();
        let mut tx = self.db.begin().await?;

        let mut debt = load_mutable_debt(&mut tx, debt_id).await?;
        require_type(&debt, "pay_installment", &[DebtType::Installment], "installment")?;

        let mut schedule = match tx.find_schedule(schedule_id).await? {
            Some(schedule) if schedule.debt_id == debt_id => schedule,
            _ => return Err(LedgerError::schedule_not_found(schedule_id)),
        };
        if schedule.is_paid() {
            return Err(LedgerError::AlreadyPaid(schedule_id));
        }

        let effect = debt.apply_payment(amount, now);
        tx.update_debt_balance(&debt).await?;

        schedule.status = ScheduleStatus::Paid;
        schedule.actual_amount = Some(amount);
        schedule.paid_at = Some(now);
        schedule.updated_at = now;
        tx.update_schedule(&schedule).await?;

        let expense = ExpenseRecord::debt_payment(&debt, amount, today, now);
        tx.insert_expense(&expense).await?;

        tx.commit().await?;

        tracing::info!(
            debt_id = %debt_id,
            installment = schedule.installment_number,
            amount,
            remaining = effect.new_remaining,
            completed = effect.completed_now,
            "installment paid"
        );

        Ok(PaymentReceipt {
            debt,
            effect,
            expense,
            schedule: Some(schedule),
            payment: None,
        })
    }

    /// Personal/Tab 자유 상환
    pub async fn pay_debt(
        &self,
        debt_id: Uuid,
        amount: Rupiah,
        note: &str,
    ) -> Result<PaymentReceipt> {
        validate_amount(amount, "payment amount")?;
        let _guard = self.locks.acquire(debt_id).await;

        let now = self.clock.now();
        let today = self.clock.today();
        let mut tx = self.db.begin().await?;

        let mut debt = load_mutable_debt(&mut tx, debt_id).await?;
        require_type(
            &debt,
            "pay_debt",
            &[DebtType::Personal, DebtType::Tab],
            "personal or tab",
        )?;

        let payment = DebtPayment {
            id: Uuid::new_v4(),
            debt_id,
            amount,
            note: note.trim().to_string(),
            paid_at: now,
            created_at: now,
        };
        tx.insert_payment(&payment).await?;

        let effect = debt.apply_payment(amount, now);
        tx.update_debt_balance(&debt).await?;

        let expense = ExpenseRecord::debt_payment(&debt, amount, today, now);
        tx.insert_expense(&expense).await?;

        tx.commit().await?;

        tracing::info!(
            debt_id = %debt_id,
            amount,
            remaining = effect.new_remaining,
            completed = effect.completed_now,
            "debt payment recorded"
        );

        Ok(PaymentReceipt {
            debt,
            effect,
            expense,
            schedule: None,
            payment: Some(payment),
        })
    }

    /// 카스본 추가 (Tab 전용): total, remaining 동시 증가, expense 기록 없음
    pub async fn add_kasbon_entry(
        &self,
        debt_id: Uuid,
        amount: Rupiah,
        note: &str,
    ) -> Result<KasbonEntry> {
        validate_amount(amount, "kasbon amount")?;
        let _guard = self.locks.acquire(debt_id).await;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let mut debt = load_mutable_debt(&mut tx, debt_id).await?;
        require_type(&debt, "add_kasbon_entry", &[DebtType::Tab], "tab")?;

        let entry = KasbonEntry {
            id: Uuid::new_v4(),
            debt_id,
            amount,
            note: note.trim().to_string(),
            created_at: now,
        };
        tx.insert_kasbon(&entry).await?;

        debt.apply_kasbon(amount, now)?;
        tx.update_debt_balance(&debt).await?;

        tx.commit().await?;

        tracing::info!(
            debt_id = %debt_id,
            amount,
            total = debt.total_amount,
            remaining = debt.remaining_amount,
            "kasbon added"
        );
        Ok(entry)
    }

    // ============ Maintenance ============

    /// 이름/메모 수정
    pub async fn update_debt_info(&self, debt_id: Uuid, name: &str, note: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("debt name must not be blank"));
        }
        let _guard = self.locks.acquire(debt_id).await;
        self.db
            .update_debt_info(debt_id, name, note.trim(), self.clock.now())
            .await
    }

    /// Soft delete (히스토리 보존)
    pub async fn soft_delete(&self, debt_id: Uuid) -> Result<()> {
        let _guard = self.locks.acquire(debt_id).await;
        self.db.soft_delete(debt_id, self.clock.now()).await?;
        tracing::info!(debt_id = %debt_id, "debt soft-deleted");
        Ok(())
    }

    /// Hard delete (자식 레코드 cascade 삭제)
    pub async fn hard_delete(&self, debt_id: Uuid) -> Result<()> {
        let _guard = self.locks.acquire(debt_id).await;
        self.db.hard_delete(debt_id).await?;
        tracing::info!(debt_id = %debt_id, "debt deleted with history");
        Ok(())
    }
}

// ============ Guards ============

/// 변경 가능한 부채 로드: 없거나 soft delete 면 NotFound, Completed 면 DebtCompleted
async fn load_mutable_debt(tx: &mut LedgerTx<'_>, debt_id: Uuid) -> Result<Debt> {
    let debt = match tx.find_debt(debt_id).await? {
        Some(debt) if !debt.is_deleted => debt,
        _ => {
            tracing::warn!(debt_id = %debt_id, "mutation on unknown debt rejected");
            return Err(LedgerError::debt_not_found(debt_id));
        }
    };
    if debt.is_completed() {
        tracing::warn!(debt_id = %debt_id, "mutation on completed debt rejected");
        return Err(LedgerError::DebtCompleted(debt_id));
    }
    Ok(debt)
}

fn require_type(
    debt: &Debt,
    operation: &'static str,
    allowed: &[DebtType],
    expected: &'static str,
) -> Result<()> {
    if allowed.contains(&debt.debt_type()) {
        return Ok(());
    }
    tracing::warn!(debt_id = %debt.id, operation, actual = %debt.debt_type(), "wrong debt type");
    Err(LedgerError::WrongDebtType {
        operation,
        expected,
        actual: debt.debt_type(),
    })
}

fn check_schedule_set(debt: &Debt, schedules: &[DebtSchedule]) -> Result<()> {
    if schedules.iter().any(|s| s.debt_id != debt.id) {
        return Err(LedgerError::validation("schedule belongs to a different debt"));
    }

    match debt.installment_terms() {
        Some(terms) => {
            let mut numbers: Vec<u32> = schedules.iter().map(|s| s.installment_number).collect();
            numbers.sort_unstable();
            let expected: Vec<u32> = (1..=terms.installment_count).collect();
            if numbers != expected {
                return Err(LedgerError::Validation(format!(
                    "installment debt needs schedules numbered 1..={}",
                    terms.installment_count
                )));
            }
        }
        None if !schedules.is_empty() => {
            return Err(LedgerError::Validation(format!(
                "{} debt cannot have a payment schedule",
                debt.debt_type()
            )));
        }
        None => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_debt_locks_serialize_same_id() {
        let locks = Arc::new(DebtLocks::new());
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;

        let locks2 = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = locks2.acquire(id).await;
        });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_debt_locks_independent_ids() {
        let locks = DebtLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let _b = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.tracked().await, 2);
    }

    #[tokio::test]
    async fn test_unused_locks_pruned() {
        let locks = DebtLocks::new();
        drop(locks.acquire(Uuid::new_v4()).await);
        let _held = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.tracked().await, 1);
    }
}
