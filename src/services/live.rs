//! Live Query Service
//!
//! Commit 이후 변경 알림을 브로드캐스트하고, 구독 중인 view 를 다시 계산한다.
//!
//! # Architecture
//! ```text
//! ┌──────────────┐  commit   ┌─────────────┐  ChangeSet  ┌─────────────────┐
//! │   LedgerTx   │──────────▶│  ChangeHub  │────────────▶│ Observer<Query> │──▶ re-run
//! └──────────────┘           │ (broadcast) │────────────▶│ Observer<Query> │──▶ re-run
//!                            └─────────────┘             └─────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Result;

/// 변경 알림 대상 테이블
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Table {
    Debts,
    Schedules,
    Payments,
    KasbonEntries,
    Transactions,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Table::Debts => write!(f, "debts"),
            Table::Schedules => write!(f, "debt_schedules"),
            Table::Payments => write!(f, "debt_payments"),
            Table::KasbonEntries => write!(f, "kasbon_entries"),
            Table::Transactions => write!(f, "transactions"),
        }
    }
}

/// Commit 1회에 대한 변경 내역
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub tables: Vec<Table>,
    /// 단일 부채에 대한 변경이면 해당 id
    pub debt_id: Option<Uuid>,
}

impl ChangeSet {
    pub fn new(tables: &[Table], debt_id: Option<Uuid>) -> Self {
        let mut deduped: Vec<Table> = Vec::with_capacity(tables.len());
        for table in tables {
            if !deduped.contains(table) {
                deduped.push(*table);
            }
        }
        Self {
            tables: deduped,
            debt_id,
        }
    }

    pub fn touches(&self, tables: &[Table]) -> bool {
        self.tables.iter().any(|t| tables.contains(t))
    }

    /// 특정 부채로 한정된 view 에 영향을 주는지 (`debt_id` 가 없는 변경은 전체 대상)
    pub fn affects(&self, tables: &[Table], scope: Option<Uuid>) -> bool {
        let in_scope = match (scope, self.debt_id) {
            (Some(wanted), Some(changed)) => wanted == changed,
            _ => true,
        };
        in_scope && self.touches(tables)
    }
}

/// 변경 알림 허브
pub struct ChangeHub {
    tx: broadcast::Sender<ChangeSet>,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// 변경 알림 전송 (구독자가 없으면 버려짐)
    pub fn publish(&self, change: ChangeSet) {
        tracing::debug!(tables = ?change.tables, debt_id = ?change.debt_id, "change published");
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// 변경 시마다 다시 실행되는 조회
#[async_trait]
pub trait LiveQuery: Send + Sync {
    type Output: Send;

    /// 이 조회 결과에 영향을 주는 테이블
    fn depends_on(&self) -> &'static [Table];

    /// 단일 부채 view 면 그 id
    fn debt_scope(&self) -> Option<Uuid> {
        None
    }

    async fn run(&self, db: &Database) -> Result<Self::Output>;
}

/// 연속 갱신되는 view
///
/// 첫 `next()` 는 현재 값을, 이후에는 관련 테이블이 commit 될 때마다 새 값을 돌려준다.
/// 구독은 생성 시점에 시작되므로 첫 조회와 구독 사이의 commit 도 놓치지 않는다.
pub struct Observer<Q: LiveQuery> {
    db: Arc<Database>,
    query: Q,
    rx: broadcast::Receiver<ChangeSet>,
    primed: bool,
}

impl<Q: LiveQuery> Observer<Q> {
    pub fn new(db: Arc<Database>, query: Q) -> Self {
        let rx = db.changes().subscribe();
        Self {
            db,
            query,
            rx,
            primed: false,
        }
    }

    /// 다음 view 값. 허브가 닫히면 `None`.
    pub async fn next(&mut self) -> Option<Result<Q::Output>> {
        if !self.primed {
            self.primed = true;
            return Some(self.query.run(&self.db).await);
        }

        loop {
            match self.rx.recv().await {
                Ok(change)
                    if change.affects(self.query.depends_on(), self.query.debt_scope()) =>
                {
                    return Some(self.query.run(&self.db).await);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    // 놓친 알림이 있으면 바로 재계산
                    tracing::debug!(skipped, "observer lagged, re-deriving view");
                    return Some(self.query.run(&self.db).await);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// 대기 중인 알림이 있으면 모두 소비하고 최신 값 하나만 계산
    pub async fn latest(&mut self) -> Result<Q::Output> {
        loop {
            match self.rx.try_recv() {
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        self.primed = true;
        self.query.run(&self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_set_dedup_and_touch() {
        let change = ChangeSet::new(&[Table::Debts, Table::Schedules, Table::Debts], None);
        assert_eq!(change.tables, vec![Table::Debts, Table::Schedules]);
        assert!(change.touches(&[Table::Schedules]));
        assert!(!change.touches(&[Table::KasbonEntries, Table::Payments]));
    }

    #[test]
    fn test_change_set_scope() {
        let mine = Uuid::new_v4();
        let change = ChangeSet::new(&[Table::Payments], Some(Uuid::new_v4()));
        assert!(!change.affects(&[Table::Payments], Some(mine)));
        assert!(change.affects(&[Table::Payments], None));

        let own = ChangeSet::new(&[Table::Payments], Some(mine));
        assert!(own.affects(&[Table::Payments], Some(mine)));
        assert!(!own.affects(&[Table::KasbonEntries], Some(mine)));

        // sweep 처럼 부채를 특정하지 않는 변경
        let global = ChangeSet::new(&[Table::Schedules], None);
        assert!(global.affects(&[Table::Schedules], Some(mine)));
    }

    #[tokio::test]
    async fn test_hub_broadcast() {
        let hub = ChangeHub::default();
        let mut rx = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        let id = Uuid::new_v4();
        hub.publish(ChangeSet::new(&[Table::KasbonEntries], Some(id)));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.debt_id, Some(id));
        assert_eq!(received.tables, vec![Table::KasbonEntries]);
    }

    #[test]
    fn test_table_names() {
        assert_eq!(Table::Schedules.to_string(), "debt_schedules");
        assert_eq!(Table::KasbonEntries.to_string(), "kasbon_entries");
    }
}
