//! Error Handling Module
//!
//! Typed failures for every ledger operation.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.

use thiserror::Error;
use uuid::Uuid;

use crate::types::DebtType;

/// Ledger 에러 타입
///
/// # Categories
///
/// - 입력 오류: `Validation`, `WrongDebtType` (호출자가 다시 입력받음)
/// - 상태 오류: `NotFound`, `AlreadyPaid`, `DebtCompleted`
/// - 저장소 오류: `Database`, `Migration`, `CorruptRow` (원인 보존, 재시도 없음)
#[derive(Debug, Error)]
pub enum LedgerError {
    // ============ Input ============
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{operation} requires a {expected} debt, but this debt is {actual}")]
    WrongDebtType {
        operation: &'static str,
        expected: &'static str,
        actual: DebtType,
    },

    // ============ State ============
    #[error("{0} not found")]
    NotFound(String),

    #[error("Schedule {0} is already paid")]
    AlreadyPaid(Uuid),

    #[error("Debt {0} is already completed")]
    DebtCompleted(Uuid),

    // ============ Storage ============
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(message.into())
    }

    pub fn debt_not_found(id: Uuid) -> Self {
        LedgerError::NotFound(format!("Debt {}", id))
    }

    pub fn schedule_not_found(id: Uuid) -> Self {
        LedgerError::NotFound(format!("Schedule {}", id))
    }

    /// 호출자가 입력을 고쳐 다시 시도할 수 있는 에러인지
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LedgerError::Validation(_)
                | LedgerError::WrongDebtType { .. }
                | LedgerError::NotFound(_)
                | LedgerError::AlreadyPaid(_)
                | LedgerError::DebtCompleted(_)
        )
    }
}

/// SQLx 에러를 LedgerError로 변환
impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("SQLx error: {:?}", err);
        LedgerError::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
