//! Database Models
//!
//! Row 구조체와 도메인 타입 사이의 매핑 레이어.
//! `debts` 테이블은 세 variant 를 nullable 컬럼으로 평탄화하므로,
//! variant 별 NULL 처리는 이 파일에서만 한다.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::types::{
    Debt, DebtDetail, DebtPayment, DebtSchedule, DebtStatus, DebtType, InstallmentTerms,
    KasbonEntry, PenaltyType, PersonalLoan, ScheduleStatus, TabAccount,
};

/// `debts` row (평탄화된 형태)
#[derive(Debug, Clone, FromRow)]
pub struct DebtRow {
    pub id: Uuid,
    pub name: String,
    pub debt_type: String,
    pub total_amount: i64,
    pub remaining_amount: i64,
    pub note: String,
    pub status: String,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,

    // installment
    pub platform_name: Option<String>,
    pub installment_per_month: Option<i64>,
    pub installment_count: Option<i64>,
    pub due_day: Option<i64>,
    pub interest_rate: Option<f64>,
    pub penalty_type: Option<String>,
    pub penalty_rate: Option<f64>,

    // personal
    pub borrower_name: Option<String>,
    pub relationship: Option<String>,
    pub agreed_return_date: Option<NaiveDate>,

    // tab
    pub merchant_name: Option<String>,
    pub merchant_type: Option<String>,
}

/// SELECT 컬럼 목록 (`DebtRow` 필드 순서와 동일)
pub const DEBT_COLUMNS: &str = "id, name, debt_type, total_amount, remaining_amount, note, status, \
     start_date, created_at, updated_at, is_deleted, \
     platform_name, installment_per_month, installment_count, due_day, \
     interest_rate, penalty_type, penalty_rate, \
     borrower_name, relationship, agreed_return_date, \
     merchant_name, merchant_type";

impl From<&Debt> for DebtRow {
    fn from(debt: &Debt) -> Self {
        let mut row = DebtRow {
            id: debt.id,
            name: debt.name.clone(),
            debt_type: debt.debt_type().as_str().to_string(),
            total_amount: debt.total_amount,
            remaining_amount: debt.remaining_amount,
            note: debt.note.clone(),
            status: debt.status.as_str().to_string(),
            start_date: debt.start_date,
            created_at: debt.created_at,
            updated_at: debt.updated_at,
            is_deleted: debt.is_deleted,
            platform_name: None,
            installment_per_month: None,
            installment_count: None,
            due_day: None,
            interest_rate: None,
            penalty_type: None,
            penalty_rate: None,
            borrower_name: None,
            relationship: None,
            agreed_return_date: None,
            merchant_name: None,
            merchant_type: None,
        };

        match &debt.detail {
            DebtDetail::Installment(terms) => {
                row.platform_name = Some(terms.platform_name.clone());
                row.installment_per_month = Some(terms.installment_per_month);
                row.installment_count = Some(i64::from(terms.installment_count));
                row.due_day = Some(i64::from(terms.due_day));
                row.interest_rate = Some(terms.interest_rate);
                row.penalty_type = Some(terms.penalty_type.as_str().to_string());
                row.penalty_rate = Some(terms.penalty_rate);
            }
            DebtDetail::Personal(loan) => {
                row.borrower_name = Some(loan.borrower_name.clone());
                row.relationship = Some(loan.relationship.clone());
                row.agreed_return_date = loan.agreed_return_date;
            }
            DebtDetail::Tab(tab) => {
                row.merchant_name = Some(tab.merchant_name.clone());
                row.merchant_type = Some(tab.merchant_type.clone());
            }
        }

        row
    }
}

impl TryFrom<DebtRow> for Debt {
    type Error = LedgerError;

    fn try_from(row: DebtRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let debt_type = DebtType::parse(&row.debt_type)
            .ok_or_else(|| corrupt(id, "debt_type", &row.debt_type))?;
        let status =
            DebtStatus::parse(&row.status).ok_or_else(|| corrupt(id, "status", &row.status))?;

        let detail = match debt_type {
            DebtType::Installment => {
                let penalty_type = match row.penalty_type.as_deref() {
                    None => PenaltyType::None,
                    Some(raw) => PenaltyType::parse(raw)
                        .ok_or_else(|| corrupt(id, "penalty_type", raw))?,
                };
                DebtDetail::Installment(InstallmentTerms {
                    platform_name: row.platform_name.unwrap_or_default(),
                    installment_per_month: required(
                        id,
                        "installment_per_month",
                        row.installment_per_month,
                    )?,
                    installment_count: to_u32(
                        id,
                        "installment_count",
                        required(id, "installment_count", row.installment_count)?,
                    )?,
                    due_day: to_u32(id, "due_day", required(id, "due_day", row.due_day)?)?,
                    interest_rate: row.interest_rate.unwrap_or(0.0),
                    penalty_type,
                    penalty_rate: row.penalty_rate.unwrap_or(0.0),
                })
            }
            DebtType::Personal => DebtDetail::Personal(PersonalLoan {
                borrower_name: required(id, "borrower_name", row.borrower_name)?,
                relationship: row.relationship.unwrap_or_default(),
                agreed_return_date: row.agreed_return_date,
            }),
            DebtType::Tab => DebtDetail::Tab(TabAccount {
                merchant_name: required(id, "merchant_name", row.merchant_name)?,
                merchant_type: row.merchant_type.unwrap_or_default(),
            }),
        };

        Ok(Debt {
            id,
            name: row.name,
            detail,
            total_amount: row.total_amount,
            remaining_amount: row.remaining_amount,
            note: row.note,
            status,
            start_date: row.start_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            is_deleted: row.is_deleted,
        })
    }
}

/// `debt_schedules` row
#[derive(Debug, Clone, FromRow)]
pub struct ScheduleRow {
    pub id: Uuid,
    pub debt_id: Uuid,
    pub installment_number: i64,
    pub due_date: NaiveDate,
    pub expected_amount: i64,
    pub actual_amount: Option<i64>,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const SCHEDULE_COLUMNS: &str = "id, debt_id, installment_number, due_date, expected_amount, \
     actual_amount, status, paid_at, created_at, updated_at";

impl TryFrom<ScheduleRow> for DebtSchedule {
    type Error = LedgerError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let status = ScheduleStatus::parse(&row.status)
            .ok_or_else(|| corrupt(row.id, "status", &row.status))?;

        Ok(DebtSchedule {
            id: row.id,
            debt_id: row.debt_id,
            installment_number: to_u32(row.id, "installment_number", row.installment_number)?,
            due_date: row.due_date,
            expected_amount: row.expected_amount,
            actual_amount: row.actual_amount,
            status,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `debt_payments` row
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: Uuid,
    pub debt_id: Uuid,
    pub amount: i64,
    pub note: String,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentRow> for DebtPayment {
    fn from(row: PaymentRow) -> Self {
        DebtPayment {
            id: row.id,
            debt_id: row.debt_id,
            amount: row.amount,
            note: row.note,
            paid_at: row.paid_at,
            created_at: row.created_at,
        }
    }
}

/// `kasbon_entries` row
#[derive(Debug, Clone, FromRow)]
pub struct KasbonRow {
    pub id: Uuid,
    pub debt_id: Uuid,
    pub amount: i64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl From<KasbonRow> for KasbonEntry {
    fn from(row: KasbonRow) -> Self {
        KasbonEntry {
            id: row.id,
            debt_id: row.debt_id,
            amount: row.amount,
            note: row.note,
            created_at: row.created_at,
        }
    }
}

/// 납부 예정 조회용 join row (schedule + debt 이름/플랫폼)
#[derive(Debug, Clone, FromRow)]
pub struct UpcomingDueRow {
    #[sqlx(flatten)]
    pub schedule: ScheduleRow,
    pub debt_name: String,
    pub platform_name: Option<String>,
}

/// 부채별 스케줄 집계
#[derive(Debug, Clone, FromRow)]
pub struct ScheduleCountRow {
    pub debt_id: Uuid,
    pub total_count: i64,
    pub paid_count: i64,
}

/// 부채별 상환 건수
#[derive(Debug, Clone, FromRow)]
pub struct PaymentCountRow {
    pub debt_id: Uuid,
    pub payment_count: i64,
}

// ============ Helpers ============

fn corrupt(id: Uuid, column: &str, value: &str) -> LedgerError {
    LedgerError::CorruptRow(format!("row {}: invalid {} '{}'", id, column, value))
}

fn required<T>(id: Uuid, column: &str, value: Option<T>) -> Result<T, LedgerError> {
    value.ok_or_else(|| LedgerError::CorruptRow(format!("row {}: missing {}", id, column)))
}

fn to_u32(id: Uuid, column: &str, value: i64) -> Result<u32, LedgerError> {
    u32::try_from(value).map_err(|_| corrupt(id, column, &value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn installment_debt() -> Debt {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap();
        Debt {
            id: Uuid::new_v4(),
            name: "Cicilan HP".to_string(),
            detail: DebtDetail::Installment(InstallmentTerms {
                platform_name: "Kredivo".to_string(),
                installment_per_month: 100_000,
                installment_count: 6,
                due_day: 31,
                interest_rate: 2.6,
                penalty_type: PenaltyType::Percentage,
                penalty_rate: 0.1,
            }),
            total_amount: 600_000,
            remaining_amount: 600_000,
            note: String::new(),
            status: DebtStatus::Active,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }

    #[test]
    fn test_installment_flatten_and_restore() {
        let debt = installment_debt();
        let row = DebtRow::from(&debt);

        assert_eq!(row.debt_type, "installment");
        assert_eq!(row.due_day, Some(31));
        assert_eq!(row.penalty_type.as_deref(), Some("percentage"));
        assert!(row.borrower_name.is_none());
        assert!(row.merchant_name.is_none());

        let restored = Debt::try_from(row).unwrap();
        assert_eq!(restored, debt);
    }

    #[test]
    fn test_personal_row_only_sets_personal_columns() {
        let mut debt = installment_debt();
        debt.detail = DebtDetail::Personal(PersonalLoan {
            borrower_name: "Andi".to_string(),
            relationship: "teman".to_string(),
            agreed_return_date: NaiveDate::from_ymd_opt(2026, 3, 1),
        });

        let row = DebtRow::from(&debt);
        assert_eq!(row.debt_type, "personal");
        assert!(row.installment_count.is_none());
        assert_eq!(row.agreed_return_date, NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(Debt::try_from(row).unwrap(), debt);
    }

    #[test]
    fn test_missing_variant_column_is_corrupt() {
        let mut row = DebtRow::from(&installment_debt());
        row.due_day = None;

        let err = Debt::try_from(row).unwrap_err();
        assert!(matches!(err, LedgerError::CorruptRow(ref msg) if msg.contains("due_day")));
    }

    #[test]
    fn test_unknown_debt_type_is_corrupt() {
        let mut row = DebtRow::from(&installment_debt());
        row.debt_type = "leasing".to_string();
        assert!(matches!(Debt::try_from(row), Err(LedgerError::CorruptRow(_))));
    }
}
