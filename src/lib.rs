//! Debt Ledger Engine
//!
//! # Overview
//!
//! 긱 드라이버용 가계부의 부채 관리 코어.
//! 할부(Installment), 개인 대출(Personal), 카스본(Tab) 세 종류의 부채에 대해
//! 스케줄 생성, 원자적 잔액 변경, 연체 판정, 실시간 조회 view 를 제공한다.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Caller (UI / use case)                │
//! └──────────────────────────────────────────────────────────┘
//!          │ command                           ▲ Observer<T>
//!          ▼                                   │
//! ┌──────────────────┐   ┌─────────────┐   ┌───┴──────────┐
//! │ Validation       │──▶│ Payment     │   │ DebtQueries  │
//! │ Schedule Gen.    │   │ Processor   │   │ Dashboard    │
//! └──────────────────┘   └──────┬──────┘   └───▲──────────┘
//!                               │ LedgerTx     │ ChangeSet
//!                               ▼              │
//!                        ┌──────────────────────┴───┐
//!                        │ Database (SQLx / SQLite) │
//!                        │ ChangeHub (broadcast)    │
//!                        └──────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 타입
//! - `types`: 부채 aggregate 도메인 타입
//! - `db`: 저장소, 트랜잭션, row 매핑
//! - `services`: 명령 처리, sweep, 조회, 대시보드
//!
//! ## Usage
//!
//! ```rust,ignore
//! use debt_ledger::{Config, LedgerState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let ledger = LedgerState::open(&config).await?;
//!
//!     let snapshot = ledger.dashboard.load().await?;
//!     println!("remaining: {}", snapshot.total_remaining);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod types;


// Re-exports for convenience
pub use config::Config;
pub use db::Database;
pub use error::{LedgerError, Result};
pub use services::{Clock, Dashboard, DebtQueries, OverdueSweeper, PaymentProcessor, SystemClock};

/// 부채 코어 전역 상태
#[derive(Clone)]
pub struct LedgerState {
    pub db: Arc<Database>,
    pub clock: Arc<dyn Clock>,
    pub processor: Arc<PaymentProcessor>,
    pub queries: Arc<DebtQueries>,
    pub sweeper: Arc<OverdueSweeper>,
    pub dashboard: Arc<Dashboard>,
}

impl LedgerState {
    /// 설정으로 DB 연결 + 마이그레이션 후 서비스 구성
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let clock = SystemClock::from_offset_minutes(config.utc_offset_minutes)
            .ok_or_else(|| anyhow::anyhow!("invalid UTC offset: {}", config.utc_offset_minutes))?;

        let db = Database::connect(&config.database_url, config.max_connections).await?;
        db.run_migrations().await?;

        Ok(Self::new(
            Arc::new(db),
            Arc::new(clock),
            config.due_alert_window_days,
        ))
    }

    /// 이미 준비된 DB 와 시계로 구성
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, due_alert_window_days: i64) -> Self {
        let processor = Arc::new(PaymentProcessor::new(db.clone(), clock.clone()));
        let queries = Arc::new(DebtQueries::new(db.clone()));
        let sweeper = Arc::new(OverdueSweeper::new(db.clone(), clock.clone()));
        let dashboard = Arc::new(Dashboard::new(
            queries.clone(),
            sweeper.clone(),
            clock.clone(),
            due_alert_window_days,
        ));

        Self {
            db,
            clock,
            processor,
            queries,
            sweeper,
            dashboard,
        }
    }
}
