//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어
//!
//! # Services
//! - `PaymentProcessor`: 부채 생성, 상환, 카스본, 삭제 명령
//! - `OverdueSweeper`: 날짜 기준 연체 전환
//! - `DebtQueries`: 읽기 전용 view (live query 포함)
//! - `Dashboard`: sweep 후 잔액 합계 / 납부 알림
//! - `Clock`: now / today 공급

pub mod clock;
pub mod dashboard;
pub mod live;
pub mod overdue;
pub mod processor;
pub mod query;
pub mod schedule;
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dashboard::{Dashboard, DashboardSnapshot, DueAlert};
pub use live::{ChangeHub, ChangeSet, LiveQuery, Observer, Table};
pub use overdue::OverdueSweeper;
pub use processor::{DebtLocks, PaymentProcessor, PaymentReceipt};
pub use query::{ActiveDebtView, DebtQueries, UpcomingDue};
pub use schedule::{generate_schedules, ScheduleParams};
pub use validation::{validate_new_debt, NewDebtRequest, ValidatedDebt};
