use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Asset;
use crate::services::AssetRegistry;
use crate::storage::AssetClient;

/// What happened to one candidate key after its assets were deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ReclaimOutcome {
    /// Backend bytes deleted and the file marked reclaimed
    Reclaimed,
    /// Another asset, in any project, still points at the key
    StillReferenced,
    /// Another collector owns the reclaim, or the key gained a reference
    /// between the check and the claim
    ClaimedElsewhere,
    /// Claim held but the backend delete or bookkeeping failed. The file stays
    /// pending until an upload takes over the expired claim.
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyReclaim {
    pub key: String,
    pub outcome: ReclaimOutcome,
}

/// Result of a delete request
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub deleted_asset_ids: Vec<String>,
    pub reclaims: Vec<KeyReclaim>,
}

/// Reclaims backend bytes of files no asset references any more.
///
/// Runs after the asset rows are committed. Nothing here can fail the delete
/// that triggered it: every problem ends up as a per-key outcome.
pub struct GarbageCollector {
    registry: AssetRegistry,
    client: Arc<dyn AssetClient>,
    /// Waited on before the reference check and before each claim
    #[cfg(test)]
    rendezvous: Option<Arc<tokio::sync::Barrier>>,
}

impl GarbageCollector {
    pub fn new(registry: AssetRegistry, client: Arc<dyn AssetClient>) -> Self {
        Self {
            registry,
            client,
            #[cfg(test)]
            rendezvous: None,
        }
    }

    #[cfg(test)]
    pub fn with_rendezvous(mut self, barrier: Arc<tokio::sync::Barrier>) -> Self {
        self.rendezvous = Some(barrier);
        self
    }

    #[cfg(test)]
    async fn rendezvous(&self) {
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
    }

    #[cfg(not(test))]
    async fn rendezvous(&self) {}

    pub async fn collect(&self, deleted: &[Asset]) -> Vec<KeyReclaim> {
        let mut candidates: Vec<String> = Vec::new();
        for asset in deleted {
            if !candidates.contains(&asset.key) {
                candidates.push(asset.key.clone());
            }
        }
        if candidates.is_empty() {
            return Vec::new();
        }

        self.rendezvous().await;
        let referenced = match self.registry.referenced_keys(&candidates).await {
            Ok(referenced) => referenced,
            Err(e) => {
                tracing::warn!("Reference check failed for {} keys: {}", candidates.len(), e);
                let reason = e.to_string();
                return candidates
                    .into_iter()
                    .map(|key| KeyReclaim {
                        key,
                        outcome: ReclaimOutcome::Failed(reason.clone()),
                    })
                    .collect();
            }
        };

        let mut reclaims = Vec::with_capacity(candidates.len());
        for key in candidates {
            let outcome = if referenced.contains(&key) {
                tracing::debug!("Key {} still referenced, keeping bytes", key);
                ReclaimOutcome::StillReferenced
            } else {
                self.reclaim(&key).await.unwrap_or_else(|e| {
                    tracing::warn!("Reclaim of {} failed: {}", key, e);
                    ReclaimOutcome::Failed(e.to_string())
                })
            };
            reclaims.push(KeyReclaim { key, outcome });
        }
        reclaims
    }

    async fn reclaim(&self, key: &str) -> Result<ReclaimOutcome> {
        self.rendezvous().await;
        let token = Uuid::new_v4().to_string();
        if !self.registry.claim_orphan(key, &token).await? {
            tracing::debug!("Key {} not claimable, skipping", key);
            return Ok(ReclaimOutcome::ClaimedElsewhere);
        }

        if let Err(e) = self.client.delete(key).await {
            tracing::warn!(
                "Backend delete of {} on {} failed, file left pending: {}",
                key,
                self.client.storage_type(),
                e
            );
            return Ok(ReclaimOutcome::Failed(e.to_string()));
        }

        if !self.registry.mark_reclaimed(key, &token).await? {
            tracing::warn!("Claim on {} was taken over before it was marked reclaimed", key);
            return Ok(ReclaimOutcome::Failed("claim taken over".to_string()));
        }

        tracing::info!("Reclaimed {}", key);
        Ok(ReclaimOutcome::Reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{AssetKind, FileState};
    use crate::services::testing::RecordingClient;

    async fn setup() -> (GarbageCollector, AssetRegistry, Arc<RecordingClient>) {
        let registry = AssetRegistry::new(Database::in_memory().await.unwrap());
        registry.create_project("p1", "u1", "One").await.unwrap();
        registry.create_project("p2", "u2", "Two").await.unwrap();
        registry.insert_file("K", 3, "image/png").await.unwrap();
        registry.attach_asset("a1", "p1", "K", AssetKind::Image, "a.png").await.unwrap();
        registry.attach_asset("a2", "p2", "K", AssetKind::Image, "b.png").await.unwrap();

        let client = Arc::new(RecordingClient::new(1024));
        let gc = GarbageCollector::new(registry.clone(), client.clone());
        (gc, registry, client)
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn shared_key_survives_partial_delete() {
        let (gc, registry, client) = setup().await;

        let deleted = registry.remove_assets("p1", &ids(&["a1"])).await.unwrap();
        let reclaims = gc.collect(&deleted).await;

        assert_eq!(reclaims.len(), 1);
        assert_eq!(reclaims[0].outcome, ReclaimOutcome::StillReferenced);
        assert_eq!(client.total_deletes(), 0);
        let file = registry.get_file("K").await.unwrap().unwrap();
        assert_eq!(file.state(), FileState::Referenced);
    }

    #[tokio::test]
    async fn last_reference_reclaims_once() {
        let (gc, registry, client) = setup().await;

        let first = registry.remove_assets("p1", &ids(&["a1"])).await.unwrap();
        gc.collect(&first).await;
        let second = registry.remove_assets("p2", &ids(&["a2"])).await.unwrap();
        let reclaims = gc.collect(&second).await;

        assert_eq!(reclaims[0].outcome, ReclaimOutcome::Reclaimed);
        assert_eq!(client.delete_count("K"), 1);
        let file = registry.get_file("K").await.unwrap().unwrap();
        assert_eq!(file.state(), FileState::Reclaimed);
    }

    #[tokio::test]
    async fn backend_failure_leaves_file_pending() {
        let (gc, registry, client) = setup().await;
        client.fail_deletes(true);

        let mut deleted = registry.remove_assets("p1", &ids(&["a1"])).await.unwrap();
        deleted.extend(registry.remove_assets("p2", &ids(&["a2"])).await.unwrap());
        let reclaims = gc.collect(&deleted).await;

        assert_eq!(reclaims.len(), 1);
        assert!(matches!(reclaims[0].outcome, ReclaimOutcome::Failed(_)));
        let file = registry.get_file("K").await.unwrap().unwrap();
        assert_eq!(file.state(), FileState::OrphanedPendingDelete);
    }

    #[tokio::test]
    async fn overlapping_collectors_delete_once() {
        let (_, registry, client) = setup().await;
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let gc = GarbageCollector::new(registry.clone(), client.clone()).with_rendezvous(barrier);

        let a = registry.remove_assets("p1", &ids(&["a1"])).await.unwrap();
        let b = registry.remove_assets("p2", &ids(&["a2"])).await.unwrap();
        // Both collectors see K orphaned before either of them claims it
        let (ra, rb) = tokio::join!(gc.collect(&a), gc.collect(&b));

        assert_eq!(client.delete_count("K"), 1);
        let mut outcomes: Vec<_> = ra.iter().chain(rb.iter()).map(|r| r.outcome.clone()).collect();
        outcomes.sort_by_key(|o| matches!(o, ReclaimOutcome::ClaimedElsewhere));
        assert_eq!(outcomes, [ReclaimOutcome::Reclaimed, ReclaimOutcome::ClaimedElsewhere]);
        let file = registry.get_file("K").await.unwrap().unwrap();
        assert_eq!(file.state(), FileState::Reclaimed);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ReclaimOutcome::Failed("boom".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "failed", "reason": "boom" }));
        let json = serde_json::to_value(ReclaimOutcome::Reclaimed).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "reclaimed" }));
    }
}
