//! Schedule Generator
//!
//! 할부 조건으로부터 월별 납부 스케줄을 만든다. 부수효과 없는 순수 함수.
//!
//! # Due Date Rule
//!
//! ```text
//! i 번째 회차 월 = start_date 의 월 + (i - 1)
//! due_date     = 그 달의 min(due_day, 말일)
//!
//! due_day = 31, start = 2026-01-15
//!   #1 2026-01-31  #2 2026-02-28  #3 2026-03-31  #4 2026-04-30 ...
//! ```

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::types::{DebtSchedule, InstallmentTerms, Rupiah, ScheduleStatus};

/// 스케줄 생성 입력
#[derive(Debug, Clone, Copy)]
pub struct ScheduleParams {
    pub debt_id: Uuid,
    pub installment_count: u32,
    pub installment_per_month: Rupiah,
    pub due_day: u32,
    pub start_date: NaiveDate,
}

impl ScheduleParams {
    pub fn from_terms(debt_id: Uuid, terms: &InstallmentTerms, start_date: NaiveDate) -> Self {
        Self {
            debt_id,
            installment_count: terms.installment_count,
            installment_per_month: terms.installment_per_month,
            due_day: terms.due_day,
            start_date,
        }
    }
}

/// 회차 수만큼 Unpaid 스케줄 생성 (회차 번호 1..=count)
pub fn generate_schedules(
    params: &ScheduleParams,
    now: DateTime<Utc>,
) -> Result<Vec<DebtSchedule>> {
    if params.installment_count == 0 {
        return Err(LedgerError::validation("installment count must be greater than 0"));
    }
    if params.installment_per_month <= 0 {
        return Err(LedgerError::validation("installment per month must be greater than 0"));
    }
    if !(1..=31).contains(&params.due_day) {
        return Err(LedgerError::validation("due day must be between 1 and 31"));
    }

    let first_month = params
        .start_date
        .with_day(1)
        .ok_or_else(|| LedgerError::validation("invalid start date"))?;

    (1..=params.installment_count)
        .map(|number| {
            let due_date = due_date_for(first_month, number - 1, params.due_day)?;
            Ok(DebtSchedule {
                id: Uuid::new_v4(),
                debt_id: params.debt_id,
                installment_number: number,
                due_date,
                expected_amount: params.installment_per_month,
                actual_amount: None,
                status: ScheduleStatus::Unpaid,
                paid_at: None,
                created_at: now,
                updated_at: now,
            })
        })
        .collect()
}

/// first_month 로부터 months_ahead 달 뒤의 납부일
fn due_date_for(first_month: NaiveDate, months_ahead: u32, due_day: u32) -> Result<NaiveDate> {
    let month = first_month
        .checked_add_months(Months::new(months_ahead))
        .ok_or_else(|| LedgerError::validation("schedule date out of range"))?;
    let day = due_day.min(days_in_month(month.year(), month.month()));

    NaiveDate::from_ymd_opt(month.year(), month.month(), day)
        .ok_or_else(|| LedgerError::validation("schedule date out of range"))
}

/// 해당 월의 일 수
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn params(count: u32, due_day: u32, start: NaiveDate) -> ScheduleParams {
        ScheduleParams {
            debt_id: Uuid::new_v4(),
            installment_count: count,
            installment_per_month: 100_000,
            due_day,
            start_date: start,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_due_day_clamped_to_month_end() {
        let schedules = generate_schedules(&params(6, 31, date(2026, 1, 15)), now()).unwrap();
        let due: Vec<NaiveDate> = schedules.iter().map(|s| s.due_date).collect();

        assert_eq!(
            due,
            vec![
                date(2026, 1, 31),
                date(2026, 2, 28),
                date(2026, 3, 31),
                date(2026, 4, 30),
                date(2026, 5, 31),
                date(2026, 6, 30),
            ]
        );
        assert!(schedules.iter().all(|s| s.expected_amount == 100_000));
        assert!(schedules.iter().all(|s| s.status == ScheduleStatus::Unpaid));
        assert!(schedules.iter().all(|s| s.actual_amount.is_none()));
    }

    #[test]
    fn test_leap_year_february() {
        let schedules = generate_schedules(&params(2, 30, date(2028, 1, 1)), now()).unwrap();
        assert_eq!(schedules[1].due_date, date(2028, 2, 29));
    }

    #[test]
    fn test_crosses_year_boundary() {
        let schedules = generate_schedules(&params(3, 10, date(2026, 11, 20)), now()).unwrap();
        let due: Vec<NaiveDate> = schedules.iter().map(|s| s.due_date).collect();
        assert_eq!(due, vec![date(2026, 11, 10), date(2026, 12, 10), date(2027, 1, 10)]);
    }

    #[test]
    fn test_installment_numbers_are_contiguous() {
        let schedules = generate_schedules(&params(12, 5, date(2026, 3, 1)), now()).unwrap();
        let numbers: Vec<u32> = schedules.iter().map(|s| s.installment_number).collect();
        assert_eq!(numbers, (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn test_rejects_invalid_terms() {
        assert!(generate_schedules(&params(0, 5, date(2026, 1, 1)), now()).is_err());
        assert!(generate_schedules(&params(3, 0, date(2026, 1, 1)), now()).is_err());
        assert!(generate_schedules(&params(3, 32, date(2026, 1, 1)), now()).is_err());

        let mut bad_amount = params(3, 5, date(2026, 1, 1));
        bad_amount.installment_per_month = 0;
        assert!(generate_schedules(&bad_amount, now()).is_err());
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2026, 2), 28);
        assert_eq!(days_in_month(2028, 2), 29);
        assert_eq!(days_in_month(2026, 12), 31);
        assert_eq!(days_in_month(2026, 4), 30);
    }
}
