//! Zone membership sweeps.
//!
//! After an operator changes a zone's polygon or roster, every user and open
//! cart that could be affected is re-resolved against the full zone set. The
//! plan is computed in memory by `geomarket_core::reconcile::plan_sweep`,
//! then applied one entity per transaction. Each transaction locks its row
//! and re-derives the decision from what it finds there, so a location change
//! committed after the plan was made wins over it.
//!
//! A sweep only lists members committed before it starts. Location commits
//! still in flight when a zone edit commits are ruled out by the zone set
//! lock (see `db::locks`): the edit waits for them, and later commits
//! resolve against the edited zones.
//!
//! Sweeps of one zone from this process queue on an in-memory gate before
//! touching the pool; the advisory lock then orders them against other
//! processes.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tokio::task::JoinSet;
use tracing::{Instrument, instrument};

use geomarket_core::reconcile::{Reassignment, plan_sweep};
use geomarket_core::zoning::resolve_id;
use geomarket_core::{CartId, CartItemId, UserId, ZoneId};

use crate::db::locks::ZoneSweepLock;
use crate::db::{RepositoryError, carts, users, zones};
use crate::models::Zone;

/// Entities applied concurrently within one sweep.
const DEFAULT_CONCURRENCY: usize = 4;

/// Errors that abort a whole sweep. Per-entity failures are counted instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("zone {0} not found")]
    ZoneNotFound(ZoneId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("sweep task failed: {0}")]
    Task(String),
}

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub zone_id: Option<ZoneId>,
    pub users_reassigned: usize,
    pub carts_reassigned: usize,
    pub items_pruned: usize,
    /// Entities that vanished, closed, or failed to apply.
    pub skipped: usize,
    /// Of `skipped`, the ones that failed with an error.
    pub failed: usize,
}

impl SyncReport {
    fn for_zone(zone_id: ZoneId) -> Self {
        Self {
            zone_id: Some(zone_id),
            ..Self::default()
        }
    }

    pub(crate) fn record_user(&mut self, outcome: Option<Reassignment<UserId>>) {
        match outcome {
            Some(outcome) if outcome.is_change() => self.users_reassigned += 1,
            Some(_) => {}
            None => self.skipped += 1,
        }
    }

    pub(crate) fn record_cart(&mut self, outcome: Option<CartOutcome>) {
        match outcome {
            Some(outcome) => {
                if outcome.from != outcome.to {
                    self.carts_reassigned += 1;
                }
                self.items_pruned += outcome.removed.len();
            }
            None => self.skipped += 1,
        }
    }

    fn record_failure(&mut self) {
        self.skipped += 1;
        self.failed += 1;
    }
}

/// What reconciling one cart did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartOutcome {
    pub from: Option<ZoneId>,
    pub to: Option<ZoneId>,
    pub removed: Vec<CartItemId>,
    pub version: i32,
}

/// Re-resolve one cart under `zones` and prune what its resulting zone does
/// not allow. Returns `None` if the cart is gone or no longer open.
///
/// Must run inside a transaction; the cart row stays locked until it ends.
pub(crate) async fn reconcile_cart_in(
    conn: &mut PgConnection,
    id: CartId,
    zones: &[Zone],
) -> Result<Option<CartOutcome>, RepositoryError> {
    let Some(cart) = carts::lock_cart(&mut *conn, id).await? else {
        return Ok(None);
    };
    if !cart.status.is_open() {
        return Ok(None);
    }

    let to = resolve_id(cart.location.as_ref(), zones);
    let mut version = cart.version;
    if to != cart.zone_id {
        version = carts::update_cart_zone(&mut *conn, id, to).await?;
    }
    let removed = carts::prune_items_outside_zone(&mut *conn, id, to).await?;
    if to == cart.zone_id && !removed.is_empty() {
        version = carts::bump_version(&mut *conn, id).await?;
    }

    Ok(Some(CartOutcome {
        from: cart.zone_id,
        to,
        removed,
        version,
    }))
}

/// Re-resolve one user under `zones`. Returns `None` if the user is gone.
///
/// Must run inside a transaction; the user row stays locked until it ends.
pub(crate) async fn reconcile_user_in(
    conn: &mut PgConnection,
    id: UserId,
    zones: &[Zone],
) -> Result<Option<Reassignment<UserId>>, RepositoryError> {
    let Some(user) = users::lock_user(&mut *conn, id).await? else {
        return Ok(None);
    };

    let to = resolve_id(user.location.as_ref(), zones);
    if to != user.zone_id {
        users::update_user_zone(&mut *conn, id, to).await?;
    }

    Ok(Some(Reassignment {
        id,
        from: user.zone_id,
        to,
    }))
}

enum Applied {
    User(Option<Reassignment<UserId>>),
    Cart(Option<CartOutcome>),
}

async fn apply_user(pool: PgPool, id: UserId, zones: Arc<[Zone]>) -> Result<Applied, RepositoryError> {
    let mut tx = pool.begin().await?;
    let outcome = reconcile_user_in(&mut *tx, id, &zones).await?;
    tx.commit().await?;
    Ok(Applied::User(outcome))
}

async fn apply_cart(pool: PgPool, id: CartId, zones: Arc<[Zone]>) -> Result<Applied, RepositoryError> {
    let mut tx = pool.begin().await?;
    let outcome = reconcile_cart_in(&mut *tx, id, &zones).await?;
    tx.commit().await?;
    if let Some(outcome) = &outcome
        && (outcome.from != outcome.to || !outcome.removed.is_empty())
    {
        tracing::info!(
            cart_id = %id,
            from = ?outcome.from,
            to = ?outcome.to,
            removed = outcome.removed.len(),
            "Cart reconciled"
        );
    }
    Ok(Applied::Cart(outcome))
}

/// One gate per zone with a sweep running or waiting in this process.
#[derive(Clone, Default)]
struct ZoneGates(Arc<Mutex<HashMap<ZoneId, Arc<Mutex<()>>>>>);

impl ZoneGates {
    /// Wait for this process's turn to sweep `zone_id`.
    async fn enter(&self, zone_id: ZoneId) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.0.lock().await;
            gates.retain(|_, gate| Arc::strong_count(gate) > 1);
            Arc::clone(gates.entry(zone_id).or_default())
        };
        gate.lock_owned().await
    }
}

/// Recomputes zone membership after zone edits.
#[derive(Clone)]
pub struct ZoneMembershipSynchronizer {
    pool: PgPool,
    concurrency: usize,
    gates: ZoneGates,
}

impl ZoneMembershipSynchronizer {
    /// Create a synchronizer applying up to four entities at a time.
    ///
    /// Clones share the per-zone gates.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            concurrency: DEFAULT_CONCURRENCY,
            gates: ZoneGates::default(),
        }
    }

    /// Set how many entities are applied concurrently (at least one).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Sweep one zone. Sweeps of the same zone queue behind each other.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ZoneNotFound` if the zone does not exist (nothing
    /// changes), or a repository error if the candidates cannot be loaded.
    #[instrument(skip(self), fields(zone_id = %zone_id))]
    pub async fn sync(&self, zone_id: ZoneId) -> Result<SyncReport, SyncError> {
        let _turn = self.gates.enter(zone_id).await;
        let lock = ZoneSweepLock::acquire(&self.pool, zone_id).await?;
        let result = self.sweep(zone_id).await;
        if let Err(e) = lock.release().await {
            tracing::warn!(error = %e, "Failed to release zone sweep lock");
        }

        if let Ok(report) = &result {
            tracing::info!(
                users_reassigned = report.users_reassigned,
                carts_reassigned = report.carts_reassigned,
                items_pruned = report.items_pruned,
                skipped = report.skipped,
                failed = report.failed,
                "Zone sweep complete"
            );
        }
        result
    }

    /// Sweep every zone, one after another.
    ///
    /// Zones deleted while the run is in progress are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the zone list cannot be loaded or a sweep fails.
    #[instrument(skip(self))]
    pub async fn sync_all(&self) -> Result<Vec<SyncReport>, SyncError> {
        let all = zones::list_zones(&self.pool).await?;
        let mut reports = Vec::with_capacity(all.len());
        for zone in all {
            match self.sync(zone.id).await {
                Ok(report) => reports.push(report),
                Err(SyncError::ZoneNotFound(zone_id)) => {
                    tracing::info!(%zone_id, "Zone deleted during full sweep");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reports)
    }

    async fn sweep(&self, zone_id: ZoneId) -> Result<SyncReport, SyncError> {
        let all: Arc<[Zone]> = zones::list_zones(&self.pool).await?.into();
        let zone = all
            .iter()
            .find(|zone| zone.id == zone_id)
            .ok_or(SyncError::ZoneNotFound(zone_id))?;
        let bounds = zone.polygon.bounds();

        let user_members =
            users::list_users_by_zone_or_with_coordinates(&self.pool, zone_id, bounds).await?;
        let cart_members =
            carts::list_open_carts_by_zone_or_with_coordinates(&self.pool, zone_id, bounds)
                .await?;
        let plan = plan_sweep(zone_id, &all, &user_members, &cart_members);
        tracing::debug!(
            users = plan.users.len(),
            carts = plan.carts.len(),
            cart_changes = plan.cart_changes(),
            "Sweep planned"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for user in plan.users {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Task(e.to_string()))?;
            let (pool, zones) = (self.pool.clone(), Arc::clone(&all));
            tasks.spawn(
                async move {
                    let _permit = permit;
                    (user.id.as_i32(), apply_user(pool, user.id, zones).await)
                }
                .in_current_span(),
            );
        }

        for cart in plan.carts {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Task(e.to_string()))?;
            let (pool, zones) = (self.pool.clone(), Arc::clone(&all));
            tasks.spawn(
                async move {
                    let _permit = permit;
                    (cart.id.as_i32(), apply_cart(pool, cart.id, zones).await)
                }
                .in_current_span(),
            );
        }

        let mut report = SyncReport::for_zone(zone_id);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Applied::User(outcome)))) => report.record_user(outcome),
                Ok((_, Ok(Applied::Cart(outcome)))) => report.record_cart(outcome),
                Ok((entity_id, Err(e))) => {
                    tracing::warn!(entity_id, error = %e, "Sweep step failed, continuing");
                    report.record_failure();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Sweep task panicked, continuing");
                    report.record_failure();
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(from: Option<i32>, to: Option<i32>) -> CartOutcome {
        CartOutcome {
            from: from.map(ZoneId::new),
            to: to.map(ZoneId::new),
            removed: Vec::new(),
            version: 1,
        }
    }

    #[test]
    fn test_report_counts_cart_outcomes() {
        let mut report = SyncReport::for_zone(ZoneId::new(1));
        report.record_cart(Some(change(Some(1), None)));
        report.record_cart(Some(CartOutcome {
            removed: vec![CartItemId::new(1), CartItemId::new(2)],
            ..change(Some(1), Some(1))
        }));
        report.record_cart(None);

        assert_eq!(report.carts_reassigned, 1);
        assert_eq!(report.items_pruned, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_report_counts_user_outcomes_and_failures() {
        let mut report = SyncReport::for_zone(ZoneId::new(1));
        report.record_user(Some(Reassignment {
            id: UserId::new(1),
            from: Some(ZoneId::new(1)),
            to: None,
        }));
        report.record_user(Some(Reassignment {
            id: UserId::new(2),
            from: None,
            to: None,
        }));
        report.record_failure();

        assert_eq!(report.users_reassigned, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_gates_serialize_one_zone_only() {
        let gates = ZoneGates::default();
        let held = gates.enter(ZoneId::new(1)).await;

        let same = gates.clone();
        let waiting = tokio::spawn(async move { same.enter(ZoneId::new(1)).await });
        tokio::task::yield_now().await;
        assert!(!waiting.is_finished());

        let other = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            gates.enter(ZoneId::new(2)),
        )
        .await;
        assert!(other.is_ok());

        drop(held);
        let next = tokio::time::timeout(std::time::Duration::from_secs(1), waiting).await;
        assert!(matches!(next, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn test_gates_forget_idle_zones() {
        let gates = ZoneGates::default();
        drop(gates.enter(ZoneId::new(1)).await);
        drop(gates.enter(ZoneId::new(2)).await);

        let held = gates.enter(ZoneId::new(3)).await;
        assert_eq!(gates.0.lock().await.len(), 1);
        drop(held);
    }
}
