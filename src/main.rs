//! Debt Ledger maintenance runner
//!
//! DB 마이그레이션 → 연체 sweep → 대시보드 스냅샷을 JSON 으로 출력.
//!
//! ```text
//! DATABASE_URL=sqlite://ledger.db?mode=rwc RUST_LOG=debt_ledger=info debt-ledger
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use debt_ledger::{Config, LedgerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "debt_ledger=debug,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("🚀 Starting Debt Ledger runner");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!("📋 Configuration loaded ({:?})", config.environment);

    // 데이터베이스 연결 + 마이그레이션
    let ledger = LedgerState::open(&config).await?;
    ledger.db.health_check().await?;
    tracing::info!("🗄️  Database ready");

    // sweep + 대시보드
    let snapshot = ledger.dashboard.load().await?;
    tracing::info!(
        "📅 {} overdue marked, {} active debts, {} due alerts",
        snapshot.overdue_marked,
        snapshot.active_debts.len(),
        snapshot.due_alerts.len()
    );

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
