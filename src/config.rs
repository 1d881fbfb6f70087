//! Configuration Module
//!
//! 환경변수에서 설정을 읽는다. 필수 값은 없고 모두 기본값이 있다.

use std::env;

use anyhow::{Context, Result};

/// 애플리케이션 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 연결 문자열
    /// 형식: sqlite://path/to/file.db?mode=rwc
    pub database_url: String,

    /// 커넥션 풀 최대 크기 (기본값: 5)
    pub max_connections: u32,

    /// 로컬 timezone 의 UTC offset (분, 기본값: 420 = WIB)
    pub utc_offset_minutes: i32,

    /// 납부 알림 구간 (일, 기본값: 7)
    pub due_alert_window_days: i64,

    /// 환경 (development, staging, production)
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Config {
    /// 환경변수에서 설정 로드
    ///
    /// # Optional Environment Variables
    ///
    /// - `DATABASE_URL`: SQLite 연결 문자열
    /// - `DB_MAX_CONNECTIONS`: 커넥션 풀 크기
    /// - `LEDGER_UTC_OFFSET_MINUTES`: 로컬 timezone offset (분)
    /// - `DUE_ALERT_WINDOW_DAYS`: 납부 알림 구간
    /// - `ENVIRONMENT`: development | staging | production
    pub fn from_env() -> Result<Self> {
        let environment = match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" => Environment::Production,
            "staging" => Environment::Staging,
            _ => Environment::Development,
        };

        let utc_offset_minutes: i32 = env::var("LEDGER_UTC_OFFSET_MINUTES")
            .unwrap_or_else(|_| "420".to_string())
            .parse()
            .context("LEDGER_UTC_OFFSET_MINUTES must be a valid number")?;
        if utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!("LEDGER_UTC_OFFSET_MINUTES must be within +/- 1439");
        }

        let due_alert_window_days: i64 = env::var("DUE_ALERT_WINDOW_DAYS")
            .unwrap_or_else(|_| "7".to_string())
            .parse()
            .context("DUE_ALERT_WINDOW_DAYS must be a valid number")?;
        if due_alert_window_days < 0 {
            anyhow::bail!("DUE_ALERT_WINDOW_DAYS must not be negative");
        }

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://debt_ledger.db?mode=rwc".to_string()),

            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("DB_MAX_CONNECTIONS must be a valid number")?,

            utc_offset_minutes,
            due_alert_window_days,
            environment,
        })
    }

    /// 프로덕션 환경인지 확인
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}
