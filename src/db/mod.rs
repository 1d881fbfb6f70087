//! Database Module
//!
//! SQLx(SQLite) 기반 저장소. 트랜잭션 경계는 `LedgerTx` 하나로 통일하고,
//! commit 이 성공한 뒤에만 `ChangeHub` 로 변경 알림을 보낸다.
//!
//! # Transaction Rules
//!
//! - 잔액을 바꾸는 작업은 모두 `Database::begin()` → `LedgerTx::commit()` 안에서 수행
//! - commit 전에 drop 된 `LedgerTx` 는 rollback (sqlx `Transaction` drop 동작)
//! - 부채 → 자식 테이블은 `ON DELETE CASCADE`
//! - SQLite 는 writer 가 하나뿐이므로 쓰기(트랜잭션, 단일 UPDATE/DELETE)는
//!   프로세스 전역 writer lock 을 쥔 상태에서만 시작한다. 읽기는 lock 없이 WAL 로 동시 진행.

mod models;

pub use models::*;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::services::live::{ChangeHub, ChangeSet, Table};
use crate::types::{Debt, DebtPayment, DebtSchedule, ExpenseRecord, KasbonEntry};

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: SqlitePool,
    changes: ChangeHub,
    writer: Arc<Mutex<()>>,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 설정값 (기본 5)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    /// - foreign_keys: ON (cascade delete)
    /// - journal_mode: WAL (읽기가 commit 을 막지 않음)
    /// - busy_timeout: 5초 (다른 프로세스가 쓰는 중이면 대기)
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await?;

        Ok(Self::with_pool(pool))
    }

    /// In-memory 데이터베이스 (테스트용)
    ///
    /// 커넥션이 닫히면 데이터가 사라지므로 단일 커넥션을 계속 유지한다.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self::with_pool(pool))
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            changes: ChangeHub::default(),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn changes(&self) -> &ChangeHub {
        &self.changes
    }

    /// 쓰기 트랜잭션 시작
    ///
    /// writer lock 을 먼저 잡으므로 SHARED → RESERVED 승격 중 다른 트랜잭션과
    /// 교착되지 않는다. lock 은 commit 또는 drop(rollback) 까지 유지된다.
    pub async fn begin(&self) -> Result<LedgerTx<'_>> {
        let writer = self.writer.clone().lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(LedgerTx {
            tx,
            _writer: writer,
            changes: &self.changes,
            touched: Vec::new(),
            debt_ids: Vec::new(),
        })
    }

    async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    // ============ Single-statement Commands ============

    /// Unpaid 이고 due_date < today 인 스케줄을 Overdue 로 일괄 전환
    ///
    /// 단일 UPDATE 이므로 그 자체로 원자적이며, 같은 today 로 반복 호출해도 결과가 같다.
    pub async fn mark_overdue_schedules(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let _writer = self.write_lock().await;
        let affected = sqlx::query(
            r#"
            UPDATE debt_schedules
            SET status = 'overdue', updated_at = ?
            WHERE status = 'unpaid' AND due_date < ?
            "#,
        )
        .bind(now)
        .bind(today)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected > 0 {
            self.changes.publish(ChangeSet::new(&[Table::Schedules], None));
        }
        Ok(affected)
    }

    /// Soft delete (자식 레코드는 유지)
    pub async fn soft_delete(&self, debt_id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let _writer = self.write_lock().await;
        let affected = sqlx::query(
            "UPDATE debts SET is_deleted = 1, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(now)
        .bind(debt_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(LedgerError::debt_not_found(debt_id));
        }
        self.changes.publish(ChangeSet::new(&[Table::Debts], Some(debt_id)));
        Ok(())
    }

    /// Hard delete (스케줄/상환/카스본 cascade 삭제)
    pub async fn hard_delete(&self, debt_id: Uuid) -> Result<()> {
        let _writer = self.write_lock().await;
        let affected = sqlx::query("DELETE FROM debts WHERE id = ?")
            .bind(debt_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(LedgerError::debt_not_found(debt_id));
        }
        self.changes.publish(ChangeSet::new(
            &[
                Table::Debts,
                Table::Schedules,
                Table::Payments,
                Table::KasbonEntries,
                Table::Transactions,
            ],
            Some(debt_id),
        ));
        Ok(())
    }

    /// 이름/메모 수정 (잔액과 variant 는 건드리지 않음)
    pub async fn update_debt_info(
        &self,
        debt_id: Uuid,
        name: &str,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let _writer = self.write_lock().await;
        let affected = sqlx::query(
            "UPDATE debts SET name = ?, note = ?, updated_at = ? WHERE id = ? AND is_deleted = 0",
        )
        .bind(name)
        .bind(note)
        .bind(now)
        .bind(debt_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(LedgerError::debt_not_found(debt_id));
        }
        self.changes.publish(ChangeSet::new(&[Table::Debts], Some(debt_id)));
        Ok(())
    }

    // ============ Queries ============

    /// id 로 부채 조회 (soft delete 된 부채 포함)
    pub async fn find_debt(&self, id: Uuid) -> Result<Option<Debt>> {
        let row = sqlx::query_as::<_, DebtRow>(&format!(
            "SELECT {} FROM debts WHERE id = ?",
            DEBT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Debt::try_from).transpose()
    }

    /// 삭제되지 않은 Active 부채 (생성 순)
    pub async fn active_debts(&self) -> Result<Vec<Debt>> {
        self.debts_with_status("active").await
    }

    /// 삭제되지 않은 Completed 부채 (히스토리)
    pub async fn completed_debts(&self) -> Result<Vec<Debt>> {
        self.debts_with_status("completed").await
    }

    async fn debts_with_status(&self, status: &str) -> Result<Vec<Debt>> {
        let rows = sqlx::query_as::<_, DebtRow>(&format!(
            "SELECT {} FROM debts WHERE is_deleted = 0 AND status = ? ORDER BY created_at ASC",
            DEBT_COLUMNS
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Debt::try_from).collect()
    }

    /// 부채의 전체 스케줄 (회차 순)
    pub async fn schedules_for(&self, debt_id: Uuid) -> Result<Vec<DebtSchedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {} FROM debt_schedules WHERE debt_id = ? ORDER BY installment_number ASC",
            SCHEDULE_COLUMNS
        ))
        .bind(debt_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DebtSchedule::try_from).collect()
    }

    /// Active 부채들의 미납(Unpaid/Overdue) 스케줄 (부채별 회차 순)
    pub async fn open_schedules_of_active_debts(&self) -> Result<Vec<DebtSchedule>> {
        let rows = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT
                s.id AS id,
                s.debt_id AS debt_id,
                s.installment_number AS installment_number,
                s.due_date AS due_date,
                s.expected_amount AS expected_amount,
                s.actual_amount AS actual_amount,
                s.status AS status,
                s.paid_at AS paid_at,
                s.created_at AS created_at,
                s.updated_at AS updated_at
            FROM debt_schedules s
            JOIN debts d ON d.id = s.debt_id
            WHERE d.is_deleted = 0 AND d.status = 'active' AND s.status != 'paid'
            ORDER BY s.debt_id, s.installment_number ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DebtSchedule::try_from).collect()
    }

    /// 부채별 (전체 회차 수, 납부 회차 수)
    pub async fn schedule_counts(&self) -> Result<Vec<ScheduleCountRow>> {
        let rows = sqlx::query_as::<_, ScheduleCountRow>(
            r#"
            SELECT
                debt_id,
                COUNT(*) AS total_count,
                SUM(CASE WHEN status = 'paid' THEN 1 ELSE 0 END) AS paid_count
            FROM debt_schedules
            GROUP BY debt_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// 부채별 상환 건수
    pub async fn payment_counts(&self) -> Result<Vec<PaymentCountRow>> {
        let rows = sqlx::query_as::<_, PaymentCountRow>(
            "SELECT debt_id, COUNT(*) AS payment_count FROM debt_payments GROUP BY debt_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// 삭제되지 않은 Active 부채의 잔액 합계
    pub async fn total_remaining(&self) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(remaining_amount), 0)
            FROM debts
            WHERE is_deleted = 0 AND status = 'active'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// max_date 까지 납부해야 할 미납 스케줄 (납부일 오름차순)
    pub async fn upcoming_due(&self, max_date: NaiveDate) -> Result<Vec<UpcomingDueRow>> {
        let rows = sqlx::query_as::<_, UpcomingDueRow>(
            r#"
            SELECT
                s.id AS id,
                s.debt_id AS debt_id,
                s.installment_number AS installment_number,
                s.due_date AS due_date,
                s.expected_amount AS expected_amount,
                s.actual_amount AS actual_amount,
                s.status AS status,
                s.paid_at AS paid_at,
                s.created_at AS created_at,
                s.updated_at AS updated_at,
                d.name AS debt_name,
                d.platform_name AS platform_name
            FROM debt_schedules s
            JOIN debts d ON d.id = s.debt_id
            WHERE s.status != 'paid'
              AND s.due_date <= ?
              AND d.is_deleted = 0
              AND d.status = 'active'
            ORDER BY s.due_date ASC, s.installment_number ASC
            "#,
        )
        .bind(max_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// 상환 기록 (최신순)
    pub async fn payments_for(&self, debt_id: Uuid) -> Result<Vec<DebtPayment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, debt_id, amount, note, paid_at, created_at
            FROM debt_payments
            WHERE debt_id = ?
            ORDER BY paid_at DESC, created_at DESC
            "#,
        )
        .bind(debt_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DebtPayment::from).collect())
    }

    /// 카스본 기록 (최신순)
    pub async fn kasbon_entries_for(&self, debt_id: Uuid) -> Result<Vec<KasbonEntry>> {
        let rows = sqlx::query_as::<_, KasbonRow>(
            r#"
            SELECT id, debt_id, amount, note, created_at
            FROM kasbon_entries
            WHERE debt_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(debt_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(KasbonEntry::from).collect())
    }

    /// 부채에 연결된 expense ledger 기록
    pub async fn expenses_for(&self, debt_id: Uuid) -> Result<Vec<ExpenseRecord>> {
        let rows = sqlx::query_as::<_, ExpenseRow>(
            r#"
            SELECT id, amount, category, note, debt_id, date, created_at
            FROM transactions
            WHERE kind = 'expense' AND debt_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(debt_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ExpenseRecord::from).collect())
    }
}

/// `transactions` row (expense 만 다룸)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExpenseRow {
    pub id: Uuid,
    pub amount: i64,
    pub category: String,
    pub note: String,
    pub debt_id: Option<Uuid>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl From<ExpenseRow> for ExpenseRecord {
    fn from(row: ExpenseRow) -> Self {
        ExpenseRecord {
            id: row.id,
            amount: row.amount,
            category: row.category,
            note: row.note,
            debt_id: row.debt_id,
            date: row.date,
            created_at: row.created_at,
        }
    }
}

/// 원자적 작업 단위
///
/// 모든 쓰기는 이 트랜잭션 안에서 이뤄지고, `commit()` 성공 후에만
/// 건드린 테이블에 대한 변경 알림이 나간다.
pub struct LedgerTx<'a> {
    // tx 가 먼저 drop(rollback) 된 뒤 writer lock 이 풀린다
    tx: Transaction<'static, Sqlite>,
    _writer: OwnedMutexGuard<()>,
    changes: &'a ChangeHub,
    touched: Vec<Table>,
    debt_ids: Vec<Uuid>,
}

impl<'a> LedgerTx<'a> {
    fn touch(&mut self, table: Table, debt_id: Uuid) {
        if !self.touched.contains(&table) {
            self.touched.push(table);
        }
        if !self.debt_ids.contains(&debt_id) {
            self.debt_ids.push(debt_id);
        }
    }

    /// 한 부채만 건드렸으면 그 id, 여러 부채면 None (전체 대상 알림)
    fn changed_debt(&self) -> Option<Uuid> {
        match self.debt_ids.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub async fn find_debt(&mut self, id: Uuid) -> Result<Option<Debt>> {
        let row = sqlx::query_as::<_, DebtRow>(&format!(
            "SELECT {} FROM debts WHERE id = ?",
            DEBT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Debt::try_from).transpose()
    }

    pub async fn find_schedule(&mut self, id: Uuid) -> Result<Option<DebtSchedule>> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {} FROM debt_schedules WHERE id = ?",
            SCHEDULE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(DebtSchedule::try_from).transpose()
    }

    pub async fn insert_debt(&mut self, debt: &Debt) -> Result<()> {
        let row = DebtRow::from(debt);
        sqlx::query(
            r#"
            INSERT INTO debts (
                id, name, debt_type, total_amount, remaining_amount, note, status,
                start_date, created_at, updated_at, is_deleted,
                platform_name, installment_per_month, installment_count, due_day,
                interest_rate, penalty_type, penalty_rate,
                borrower_name, relationship, agreed_return_date,
                merchant_name, merchant_type
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.debt_type)
        .bind(row.total_amount)
        .bind(row.remaining_amount)
        .bind(&row.note)
        .bind(&row.status)
        .bind(row.start_date)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(row.is_deleted)
        .bind(&row.platform_name)
        .bind(row.installment_per_month)
        .bind(row.installment_count)
        .bind(row.due_day)
        .bind(row.interest_rate)
        .bind(&row.penalty_type)
        .bind(row.penalty_rate)
        .bind(&row.borrower_name)
        .bind(&row.relationship)
        .bind(row.agreed_return_date)
        .bind(&row.merchant_name)
        .bind(&row.merchant_type)
        .execute(&mut *self.tx)
        .await?;

        self.touch(Table::Debts, debt.id);
        Ok(())
    }

    /// 잔액/원금/상태 갱신
    pub async fn update_debt_balance(&mut self, debt: &Debt) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE debts
            SET total_amount = ?, remaining_amount = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(debt.total_amount)
        .bind(debt.remaining_amount)
        .bind(debt.status.as_str())
        .bind(debt.updated_at)
        .bind(debt.id)
        .execute(&mut *self.tx)
        .await?;

        self.touch(Table::Debts, debt.id);
        Ok(())
    }

    pub async fn insert_schedules(&mut self, schedules: &[DebtSchedule]) -> Result<()> {
        for schedule in schedules {
            sqlx::query(
                r#"
                INSERT INTO debt_schedules (
                    id, debt_id, installment_number, due_date, expected_amount,
                    actual_amount, status, paid_at, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(schedule.id)
            .bind(schedule.debt_id)
            .bind(i64::from(schedule.installment_number))
            .bind(schedule.due_date)
            .bind(schedule.expected_amount)
            .bind(schedule.actual_amount)
            .bind(schedule.status.as_str())
            .bind(schedule.paid_at)
            .bind(schedule.created_at)
            .bind(schedule.updated_at)
            .execute(&mut *self.tx)
            .await?;

            self.touch(Table::Schedules, schedule.debt_id);
        }
        Ok(())
    }

    pub async fn update_schedule(&mut self, schedule: &DebtSchedule) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE debt_schedules
            SET actual_amount = ?, status = ?, paid_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(schedule.actual_amount)
        .bind(schedule.status.as_str())
        .bind(schedule.paid_at)
        .bind(schedule.updated_at)
        .bind(schedule.id)
        .execute(&mut *self.tx)
        .await?;

        self.touch(Table::Schedules, schedule.debt_id);
        Ok(())
    }

    pub async fn insert_payment(&mut self, payment: &DebtPayment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO debt_payments (id, debt_id, amount, note, paid_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.id)
        .bind(payment.debt_id)
        .bind(payment.amount)
        .bind(&payment.note)
        .bind(payment.paid_at)
        .bind(payment.created_at)
        .execute(&mut *self.tx)
        .await?;

        self.touch(Table::Payments, payment.debt_id);
        Ok(())
    }

    pub async fn insert_kasbon(&mut self, entry: &KasbonEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kasbon_entries (id, debt_id, amount, note, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id)
        .bind(entry.debt_id)
        .bind(entry.amount)
        .bind(&entry.note)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;

        self.touch(Table::KasbonEntries, entry.debt_id);
        Ok(())
    }

    /// Transaction Ledger 에 지출 기록 추가
    pub async fn insert_expense(&mut self, expense: &ExpenseRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, kind, amount, category, note, debt_id, date, created_at)
            VALUES (?, 'expense', ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(expense.id)
        .bind(expense.amount)
        .bind(&expense.category)
        .bind(&expense.note)
        .bind(expense.debt_id)
        .bind(expense.date)
        .bind(expense.created_at)
        .execute(&mut *self.tx)
        .await?;

        if let Some(debt_id) = expense.debt_id {
            self.touch(Table::Transactions, debt_id);
        }
        Ok(())
    }

    /// Commit 후 변경 알림 전송
    pub async fn commit(self) -> Result<()> {
        let debt_id = self.changed_debt();
        self.tx.commit().await?;
        if !self.touched.is_empty() {
            self.changes.publish(ChangeSet::new(&self.touched, debt_id));
        }
        Ok(())
    }
}
