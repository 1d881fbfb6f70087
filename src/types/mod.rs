//! Debt Aggregate
//!
//! 부채(Debt)와 그 자식 레코드(스케줄, 상환, 카스본)의 도메인 타입.
//! 저장소 컬럼 구조와 무관한 순수 in-memory 표현이며,
//! 잔액 변경 규칙(상환, 카스본 추가)도 여기에 둔다.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LedgerError, Result};

/// 금액 (Rupiah, 소수 단위 없음)
pub type Rupiah = i64;

/// Expense ledger 에 기록되는 부채 상환 카테고리
pub const DEBT_PAYMENT_CATEGORY: &str = "debt payment";

// ============ Enums ============

/// 부채 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtType {
    /// 할부 (BNPL, 리스 등 고정 월 납부)
    Installment,
    /// 개인 간 대출 (스케줄 없음)
    Personal,
    /// 카스본 (가게 외상 장부)
    Tab,
}

impl DebtType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtType::Installment => "installment",
            DebtType::Personal => "personal",
            DebtType::Tab => "tab",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "installment" => Some(DebtType::Installment),
            "personal" => Some(DebtType::Personal),
            "tab" => Some(DebtType::Tab),
            _ => None,
        }
    }
}

impl fmt::Display for DebtType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 연체 페널티 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyType {
    #[default]
    None,
    Fixed,
    Percentage,
}

impl PenaltyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyType::None => "none",
            PenaltyType::Fixed => "fixed",
            PenaltyType::Percentage => "percentage",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(PenaltyType::None),
            "fixed" => Some(PenaltyType::Fixed),
            "percentage" => Some(PenaltyType::Percentage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    Active,
    Completed,
}

impl DebtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtStatus::Active => "active",
            DebtStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(DebtStatus::Active),
            "completed" => Some(DebtStatus::Completed),
            _ => None,
        }
    }
}

/// 할부 회차 상태
///
/// Unpaid → Paid (상환), Unpaid → Overdue (sweep), Overdue → Paid (연체 상환).
/// Paid 는 종착 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Unpaid,
    Paid,
    Overdue,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Unpaid => "unpaid",
            ScheduleStatus::Paid => "paid",
            ScheduleStatus::Overdue => "overdue",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "unpaid" => Some(ScheduleStatus::Unpaid),
            "paid" => Some(ScheduleStatus::Paid),
            "overdue" => Some(ScheduleStatus::Overdue),
            _ => None,
        }
    }
}

// ============ Variant Detail ============

/// 할부 조건
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentTerms {
    pub platform_name: String,
    pub installment_per_month: Rupiah,
    pub installment_count: u32,
    /// 매월 납부일 (1-31, 짧은 달은 말일로 당겨짐)
    pub due_day: u32,
    pub interest_rate: f64,
    pub penalty_type: PenaltyType,
    pub penalty_rate: f64,
}

/// 개인 간 대출
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalLoan {
    pub borrower_name: String,
    pub relationship: String,
    pub agreed_return_date: Option<NaiveDate>,
}

/// 카스본 (가게 외상)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabAccount {
    pub merchant_name: String,
    pub merchant_type: String,
}

/// 부채 종류별 상세 정보
///
/// variant 태그가 곧 `DebtType` 이므로 두 값이 어긋날 수 없다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebtDetail {
    Installment(InstallmentTerms),
    Personal(PersonalLoan),
    Tab(TabAccount),
}

impl DebtDetail {
    pub fn debt_type(&self) -> DebtType {
        match self {
            DebtDetail::Installment(_) => DebtType::Installment,
            DebtDetail::Personal(_) => DebtType::Personal,
            DebtDetail::Tab(_) => DebtType::Tab,
        }
    }
}

// ============ Aggregate Root ============

/// 부채 (aggregate root)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: Uuid,
    pub name: String,
    pub detail: DebtDetail,
    /// 원금 (카스본 추가로만 증가)
    pub total_amount: Rupiah,
    /// 남은 잔액 (항상 >= 0)
    pub remaining_amount: Rupiah,
    pub note: String,
    pub status: DebtStatus,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// 상환 1건이 잔액에 준 효과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaymentEffect {
    pub previous_remaining: Rupiah,
    pub new_remaining: Rupiah,
    /// 이번 상환으로 Completed 가 되었는지
    pub completed_now: bool,
}

impl Debt {
    pub fn debt_type(&self) -> DebtType {
        self.detail.debt_type()
    }

    pub fn is_completed(&self) -> bool {
        self.status == DebtStatus::Completed
    }

    pub fn installment_terms(&self) -> Option<&InstallmentTerms> {
        match &self.detail {
            DebtDetail::Installment(terms) => Some(terms),
            _ => None,
        }
    }

    /// 상환 반영: remaining' = max(0, remaining - amount), 0 이 되면 Completed
    pub fn apply_payment(&mut self, amount: Rupiah, now: DateTime<Utc>) -> PaymentEffect {
        let previous_remaining = self.remaining_amount;
        let new_remaining = remaining_after_payment(previous_remaining, amount);
        let was_completed = self.is_completed();

        self.remaining_amount = new_remaining;
        if new_remaining == 0 {
            self.status = DebtStatus::Completed;
        }
        self.updated_at = now;

        PaymentEffect {
            previous_remaining,
            new_remaining,
            completed_now: !was_completed && self.is_completed(),
        }
    }

    /// 카스본 반영: total 과 remaining 을 같은 금액만큼 증가
    ///
    /// 어느 한쪽이라도 overflow 하면 아무것도 바꾸지 않고 `Validation` 에러.
    pub fn apply_kasbon(&mut self, amount: Rupiah, now: DateTime<Utc>) -> Result<()> {
        let (total, remaining) = self
            .total_amount
            .checked_add(amount)
            .zip(self.remaining_amount.checked_add(amount))
            .ok_or_else(|| LedgerError::validation("kasbon amount overflows the debt total"))?;

        self.total_amount = total;
        self.remaining_amount = remaining;
        self.updated_at = now;
        Ok(())
    }

    /// 금액 기준 상환 진행률 (0.0 - 1.0)
    pub fn amount_progress(&self) -> f64 {
        if self.total_amount <= 0 {
            return 0.0;
        }
        let paid = (self.total_amount - self.remaining_amount).max(0);
        paid as f64 / self.total_amount as f64
    }
}

/// 상환 후 잔액 (음수는 0으로 clamp)
pub fn remaining_after_payment(remaining: Rupiah, amount: Rupiah) -> Rupiah {
    remaining.saturating_sub(amount).max(0)
}

// ============ Children ============

/// 할부 회차 1건
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtSchedule {
    pub id: Uuid,
    pub debt_id: Uuid,
    /// 1부터 시작, 부채 내에서 unique
    pub installment_number: u32,
    pub due_date: NaiveDate,
    pub expected_amount: Rupiah,
    pub actual_amount: Option<Rupiah>,
    pub status: ScheduleStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DebtSchedule {
    pub fn is_paid(&self) -> bool {
        self.status == ScheduleStatus::Paid
    }

    /// 해당 날짜 기준으로 sweep 대상인지
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.status == ScheduleStatus::Unpaid && self.due_date < today
    }

    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        (self.due_date - today).num_days()
    }
}

/// 개인 대출 / 카스본 상환 기록 (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtPayment {
    pub id: Uuid,
    pub debt_id: Uuid,
    pub amount: Rupiah,
    pub note: String,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// 카스본 추가 기록 (append-only, 잔액 증가)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KasbonEntry {
    pub id: Uuid,
    pub debt_id: Uuid,
    pub amount: Rupiah,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// Transaction Ledger 에 남기는 지출 기록
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: Uuid,
    pub amount: Rupiah,
    pub category: String,
    pub note: String,
    pub debt_id: Option<Uuid>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl ExpenseRecord {
    pub fn debt_payment(debt: &Debt, amount: Rupiah, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            category: DEBT_PAYMENT_CATEGORY.to_string(),
            note: format!("Bayar hutang: {}", debt.name),
            debt_id: Some(debt.id),
            date,
            created_at: now,
        }
    }
}

// ============ Due Alerts ============

/// 납부일 긴급도
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueUrgency {
    Overdue,  // D+1 이후
    Critical, // D-2 ~ D-day
    Warning,  // D-7 ~ D-3
    Normal,
}

impl DueUrgency {
    pub fn classify(days_until_due: i64) -> Self {
        if days_until_due < 0 {
            DueUrgency::Overdue
        } else if days_until_due <= 2 {
            DueUrgency::Critical
        } else if days_until_due <= 7 {
            DueUrgency::Warning
        } else {
            DueUrgency::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tab_debt(total: Rupiah) -> Debt {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Debt {
            id: Uuid::new_v4(),
            name: "Warung Bu Sri".to_string(),
            detail: DebtDetail::Tab(TabAccount {
                merchant_name: "Bu Sri".to_string(),
                merchant_type: "warung".to_string(),
            }),
            total_amount: total,
            remaining_amount: total,
            note: String::new(),
            status: DebtStatus::Active,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }

    #[test]
    fn test_remaining_after_payment_clamps() {
        assert_eq!(remaining_after_payment(600_000, 100_000), 500_000);
        assert_eq!(remaining_after_payment(100_000, 150_000), 0);
        assert_eq!(remaining_after_payment(0, 1), 0);
    }

    #[test]
    fn test_apply_payment_completes_exactly_at_zero() {
        let mut debt = tab_debt(50_000);
        let now = debt.created_at;

        let effect = debt.apply_payment(20_000, now);
        assert_eq!(effect.new_remaining, 30_000);
        assert!(!effect.completed_now);
        assert_eq!(debt.status, DebtStatus::Active);

        let effect = debt.apply_payment(30_000, now);
        assert_eq!(effect.new_remaining, 0);
        assert!(effect.completed_now);
        assert!(debt.is_completed());

        // 이미 완료된 부채는 다시 completed_now 가 되지 않음
        let effect = debt.apply_payment(1, now);
        assert!(!effect.completed_now);
        assert!(debt.is_completed());
    }

    #[test]
    fn test_apply_kasbon_widens_both_amounts() {
        let mut debt = tab_debt(50_000);
        debt.apply_kasbon(20_000, debt.created_at).unwrap();
        assert_eq!(debt.total_amount, 70_000);
        assert_eq!(debt.remaining_amount, 70_000);
    }

    #[test]
    fn test_apply_kasbon_rejects_overflow() {
        let mut debt = tab_debt(Rupiah::MAX - 10);
        debt.apply_payment(5, debt.created_at);

        let err = debt.apply_kasbon(11, debt.created_at).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(debt.total_amount, Rupiah::MAX - 10);
        assert_eq!(debt.remaining_amount, Rupiah::MAX - 15);
    }

    #[test]
    fn test_amount_progress() {
        let mut debt = tab_debt(200_000);
        assert_eq!(debt.amount_progress(), 0.0);
        debt.apply_payment(50_000, debt.created_at);
        assert!((debt.amount_progress() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_due_urgency_thresholds() {
        assert_eq!(DueUrgency::classify(-1), DueUrgency::Overdue);
        assert_eq!(DueUrgency::classify(0), DueUrgency::Critical);
        assert_eq!(DueUrgency::classify(2), DueUrgency::Critical);
        assert_eq!(DueUrgency::classify(3), DueUrgency::Warning);
        assert_eq!(DueUrgency::classify(7), DueUrgency::Warning);
        assert_eq!(DueUrgency::classify(8), DueUrgency::Normal);
    }

    #[test]
    fn test_enum_string_mapping() {
        for t in [DebtType::Installment, DebtType::Personal, DebtType::Tab] {
            assert_eq!(DebtType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ScheduleStatus::parse("overdue"), Some(ScheduleStatus::Overdue));
        assert_eq!(PenaltyType::parse("bogus"), None);
    }
}
