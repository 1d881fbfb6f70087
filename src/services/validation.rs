//! Validation Layer
//!
//! 부채 생성/상환 입력 검증. 검증을 통과한 입력만 `Debt` 와 스케줄로 변환된다.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::services::schedule::{generate_schedules, ScheduleParams};
use crate::types::{Debt, DebtDetail, DebtSchedule, DebtStatus, Rupiah};

/// 부채 생성 요청
#[derive(Debug, Clone, Deserialize)]
pub struct NewDebtRequest {
    pub name: String,
    pub total_amount: Rupiah,
    #[serde(default)]
    pub note: String,
    pub start_date: NaiveDate,
    pub detail: DebtDetail,
}

/// 저장 가능한 부채 + 스케줄 (Installment 외에는 빈 스케줄)
#[derive(Debug, Clone)]
pub struct ValidatedDebt {
    pub debt: Debt,
    pub schedules: Vec<DebtSchedule>,
}

/// 생성 요청 검증 후 Debt 구성
///
/// # Rules
///
/// - 공통: name 공백 불가, total_amount > 0
/// - Installment: installment_count > 0, installment_per_month > 0, due_day 1-31
/// - Personal: borrower_name 공백 불가
/// - Tab: merchant_name 공백 불가
pub fn validate_new_debt(request: NewDebtRequest, now: DateTime<Utc>) -> Result<ValidatedDebt> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("debt name must not be blank"));
    }
    validate_amount(request.total_amount, "total amount")?;

    match &request.detail {
        DebtDetail::Installment(terms) => {
            if terms.installment_count == 0 {
                return Err(LedgerError::validation("installment count must be greater than 0"));
            }
            validate_amount(terms.installment_per_month, "installment per month")?;
            if !(1..=31).contains(&terms.due_day) {
                return Err(LedgerError::validation("due day must be between 1 and 31"));
            }
            validate_rate(terms.interest_rate, "interest rate")?;
            validate_rate(terms.penalty_rate, "penalty rate")?;
        }
        DebtDetail::Personal(loan) => {
            if loan.borrower_name.trim().is_empty() {
                return Err(LedgerError::validation("borrower name must not be blank"));
            }
        }
        DebtDetail::Tab(tab) => {
            if tab.merchant_name.trim().is_empty() {
                return Err(LedgerError::validation("merchant name must not be blank"));
            }
        }
    }

    let debt = Debt {
        id: Uuid::new_v4(),
        name: name.to_string(),
        detail: request.detail,
        total_amount: request.total_amount,
        remaining_amount: request.total_amount,
        note: request.note.trim().to_string(),
        status: DebtStatus::Active,
        start_date: request.start_date,
        created_at: now,
        updated_at: now,
        is_deleted: false,
    };

    let schedules = match debt.installment_terms() {
        Some(terms) => {
            let params = ScheduleParams::from_terms(debt.id, terms, debt.start_date);
            generate_schedules(&params, now)?
        }
        None => Vec::new(),
    };

    Ok(ValidatedDebt { debt, schedules })
}

/// 금액 > 0
pub fn validate_amount(amount: Rupiah, field: &str) -> Result<()> {
    if amount <= 0 {
        return Err(LedgerError::Validation(format!("{} must be greater than 0", field)));
    }
    Ok(())
}

fn validate_rate(rate: f64, field: &str) -> Result<()> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(LedgerError::Validation(format!("{} must be a non-negative number", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InstallmentTerms, PenaltyType, PersonalLoan, TabAccount};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 2, 0, 0).unwrap()
    }

    fn request(detail: DebtDetail) -> NewDebtRequest {
        NewDebtRequest {
            name: "Cicilan motor".to_string(),
            total_amount: 600_000,
            note: String::new(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            detail,
        }
    }

    fn terms() -> InstallmentTerms {
        InstallmentTerms {
            platform_name: "Akulaku".to_string(),
            installment_per_month: 100_000,
            installment_count: 6,
            due_day: 31,
            interest_rate: 0.0,
            penalty_type: PenaltyType::None,
            penalty_rate: 0.0,
        }
    }

    #[test]
    fn test_installment_builds_schedules() {
        let validated =
            validate_new_debt(request(DebtDetail::Installment(terms())), now()).unwrap();

        assert_eq!(validated.debt.remaining_amount, 600_000);
        assert_eq!(validated.debt.status, DebtStatus::Active);
        assert_eq!(validated.schedules.len(), 6);
        assert!(validated.schedules.iter().all(|s| s.debt_id == validated.debt.id));
    }

    #[test]
    fn test_personal_and_tab_have_no_schedules() {
        let personal = validate_new_debt(
            request(DebtDetail::Personal(PersonalLoan {
                borrower_name: "Budi".to_string(),
                relationship: "saudara".to_string(),
                agreed_return_date: None,
            })),
            now(),
        )
        .unwrap();
        assert!(personal.schedules.is_empty());

        let tab = validate_new_debt(
            request(DebtDetail::Tab(TabAccount {
                merchant_name: "Warung Madura".to_string(),
                merchant_type: "warung".to_string(),
            })),
            now(),
        )
        .unwrap();
        assert!(tab.schedules.is_empty());
    }

    #[test]
    fn test_shared_rules() {
        let mut blank = request(DebtDetail::Installment(terms()));
        blank.name = "   ".to_string();
        assert!(matches!(validate_new_debt(blank, now()), Err(LedgerError::Validation(_))));

        let mut zero = request(DebtDetail::Installment(terms()));
        zero.total_amount = 0;
        assert!(matches!(validate_new_debt(zero, now()), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_installment_rules() {
        let mut bad_day = terms();
        bad_day.due_day = 32;
        assert!(validate_new_debt(request(DebtDetail::Installment(bad_day)), now()).is_err());

        let mut bad_count = terms();
        bad_count.installment_count = 0;
        assert!(validate_new_debt(request(DebtDetail::Installment(bad_count)), now()).is_err());

        let mut bad_rate = terms();
        bad_rate.interest_rate = f64::NAN;
        assert!(validate_new_debt(request(DebtDetail::Installment(bad_rate)), now()).is_err());
    }

    #[test]
    fn test_blank_counterparty_rejected() {
        let personal = request(DebtDetail::Personal(PersonalLoan {
            borrower_name: "".to_string(),
            relationship: String::new(),
            agreed_return_date: None,
        }));
        let err = validate_new_debt(personal, now()).unwrap_err();
        assert!(err.to_string().contains("borrower name"));

        let tab = request(DebtDetail::Tab(TabAccount {
            merchant_name: " ".to_string(),
            merchant_type: String::new(),
        }));
        let err = validate_new_debt(tab, now()).unwrap_err();
        assert!(err.to_string().contains("merchant name"));
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(1, "amount").is_ok());
        assert!(validate_amount(0, "amount").is_err());
        assert!(validate_amount(-5, "amount").is_err());
    }
}
