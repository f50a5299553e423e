//! # Sync Service
//!
//! State synchronization for a single user's scholar roster. One
//! authenticated user, one document: `post` replaces it wholesale,
//! `get` reads it back, and any client holding a valid token sees the
//! same durable state.
//!
//! ## Conflict policy
//!
//! Last write wins, full stop. There is no version check and no
//! field-level merge; two devices syncing concurrently race, and the
//! loser's edits are silently replaced. A document is only ever
//! swapped whole, never partially mutated, so the race can reorder
//! writes but cannot corrupt a roster.
//!
//! ## Collaborators
//!
//! Both collaborators arrive by constructor injection, never as
//! module-level singletons: an [`IdentityVerifier`] resolving bearer
//! tokens to user ids, and a [`RecordStore`] holding one opaque blob
//! per user. The service adds no locking of its own on top of the
//! store's write discipline.

use thiserror::Error;

use crate::auth::{AuthError, IdentityVerifier};
use crate::roster::{codec, CodecError, RosterDocument};
use crate::store::{RecordStore, StoreError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during a sync request.
///
/// The first three variants are request-level and map to client-facing
/// 4xx statuses; the rest are server-side failures the client can only
/// retry.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No authorization token accompanied the request. The verifier and
    /// the store are never consulted in this case.
    #[error("missing authorization token")]
    MissingAuthToken,

    /// The identity provider rejected the token (or could not be asked;
    /// an unreachable provider cannot vouch for anyone).
    #[error("invalid user")]
    Unauthenticated,

    /// A post carried no scholars payload.
    #[error("missing scholars data")]
    MissingPayload,

    /// The record store failed. Nothing is retried internally; the
    /// caller retries at the request level.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// The stored blob failed to encode or decode.
    #[error("roster codec failure: {0}")]
    Codec(#[from] CodecError),
}

// ---------------------------------------------------------------------------
// SyncService
// ---------------------------------------------------------------------------

/// Authenticated roster persistence over an opaque verifier and store.
pub struct SyncService<V, S> {
    verifier: V,
    store: S,
}

impl<V, S> SyncService<V, S>
where
    V: IdentityVerifier,
    S: RecordStore,
{
    /// Builds the service around its two collaborators. Lifecycle of
    /// both is owned by the composing process.
    pub fn new(verifier: V, store: S) -> Self {
        Self { verifier, store }
    }

    /// Replaces the caller's roster with `scholars` and returns what is
    /// now durably persisted.
    ///
    /// The response round-trips through the store rather than echoing
    /// the input, so the caller sees exactly the persisted state.
    ///
    /// # Errors
    ///
    /// [`SyncError::MissingAuthToken`] / [`SyncError::MissingPayload`]
    /// for request-validation failures, [`SyncError::Unauthenticated`]
    /// when the verifier rejects the token, [`SyncError::Store`] when
    /// the write (or read-back) fails.
    pub async fn post(
        &self,
        token: Option<&str>,
        scholars: Option<serde_json::Value>,
    ) -> Result<RosterDocument, SyncError> {
        let user_id = self.authenticate(token).await?;

        let payload = scholars.ok_or(SyncError::MissingPayload)?;

        let blob = codec::encode(&payload)?;
        self.store.upsert(&user_id, &blob)?;

        // Read back what actually landed; the response must reflect the
        // durable state, not the request body.
        let stored = self
            .store
            .get(&user_id)?
            .ok_or(StoreError::NotFound(user_id))?;

        Ok(RosterDocument {
            user_id,
            scholars: codec::decode(&stored)?,
        })
    }

    /// Fetches the caller's roster. A user who has never synced gets an
    /// empty roster, which is a successful state distinct from an auth
    /// or store failure.
    pub async fn get(&self, token: Option<&str>) -> Result<RosterDocument, SyncError> {
        let user_id = self.authenticate(token).await?;

        match self.store.get(&user_id)? {
            Some(blob) => Ok(RosterDocument {
                user_id,
                scholars: codec::decode(&blob)?,
            }),
            None => Ok(RosterDocument::empty(user_id)),
        }
    }

    /// Token-presence check, then verifier call. Runs before anything
    /// touches the store on either path.
    async fn authenticate(
        &self,
        token: Option<&str>,
    ) -> Result<crate::auth::UserId, SyncError> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(SyncError::MissingAuthToken),
        };

        self.verifier.verify(token).await.map_err(|e| {
            if let AuthError::Transport(reason) = &e {
                tracing::warn!(%reason, "identity provider unreachable");
            }
            SyncError::Unauthenticated
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserId;
    use crate::store::{SledRecordStore, StoreResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    /// Verifier backed by a fixed token table, counting how often it is
    /// consulted.
    struct TableVerifier {
        tokens: HashMap<String, UserId>,
        calls: Arc<AtomicUsize>,
    }

    impl TableVerifier {
        fn single(token: &str) -> (Self, UserId, Arc<AtomicUsize>) {
            let user = UserId::from_uuid(Uuid::new_v4());
            let calls = Arc::new(AtomicUsize::new(0));
            let verifier = Self {
                tokens: HashMap::from([(token.to_string(), user)]),
                calls: Arc::clone(&calls),
            };
            (verifier, user, calls)
        }
    }

    #[async_trait]
    impl IdentityVerifier for TableVerifier {
        async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens
                .get(token)
                .copied()
                .ok_or(AuthError::InvalidToken)
        }
    }

    /// Store whose every operation fails, for exercising the failure path.
    struct BrokenStore;

    impl RecordStore for BrokenStore {
        fn get(&self, _user_id: &UserId) -> StoreResult<Option<Vec<u8>>> {
            Err(StoreError::Sled(sled::Error::ReportableBug(
                "simulated outage".into(),
            )))
        }

        fn upsert(&self, _user_id: &UserId, _payload: &[u8]) -> StoreResult<()> {
            Err(StoreError::Sled(sled::Error::ReportableBug(
                "simulated outage".into(),
            )))
        }
    }

    fn service_with_token(
        token: &str,
    ) -> (SyncService<TableVerifier, SledRecordStore>, UserId) {
        let (verifier, user, _) = TableVerifier::single(token);
        let store = SledRecordStore::open_temporary().unwrap();
        (SyncService::new(verifier, store), user)
    }

    // -- 1. Round-trip: Get(Post(P)) == P ------------------------------------

    #[tokio::test]
    async fn post_then_get_roundtrips_payload() {
        let (service, user) = service_with_token("abc");
        let payload = json!([{ "addr": "0x1", "slp": 10 }]);

        let posted = service.post(Some("abc"), Some(payload.clone())).await.unwrap();
        assert_eq!(posted.user_id, user);
        assert_eq!(posted.scholars, payload);

        let fetched = service.get(Some("abc")).await.unwrap();
        assert_eq!(fetched.scholars, payload);
    }

    // -- 2. Replace-not-merge ------------------------------------------------

    #[tokio::test]
    async fn second_post_replaces_first_wholesale() {
        let (service, _) = service_with_token("abc");
        let first = json!([{ "addr": "0x1", "slp": 10, "name": "ellie" }]);
        let second = json!([{ "addr": "0x2" }]);

        service.post(Some("abc"), Some(first)).await.unwrap();
        service.post(Some("abc"), Some(second.clone())).await.unwrap();

        let fetched = service.get(Some("abc")).await.unwrap();
        assert_eq!(fetched.scholars, second);
        // No field of the first payload survives.
        assert!(fetched.scholars.to_string().find("ellie").is_none());
    }

    // -- 3. Auth gating: missing token short-circuits ------------------------

    #[tokio::test]
    async fn missing_token_never_calls_verifier() {
        let (verifier, _, calls) = TableVerifier::single("abc");
        let store = SledRecordStore::open_temporary().unwrap();
        let service = SyncService::new(verifier, store);

        let post = service.post(None, Some(json!([]))).await;
        assert!(matches!(post.unwrap_err(), SyncError::MissingAuthToken));

        let get = service.get(Some("")).await;
        assert!(matches!(get.unwrap_err(), SyncError::MissingAuthToken));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    // -- 4. Invalid token writes nothing -------------------------------------

    #[tokio::test]
    async fn invalid_token_is_unauthenticated_and_writes_nothing() {
        let (verifier, _, _) = TableVerifier::single("abc");
        let store = SledRecordStore::open_temporary().unwrap();
        let probe = store.clone();
        let service = SyncService::new(verifier, store);

        let result = service.post(Some("zzz-invalid"), Some(json!([1]))).await;
        assert!(matches!(result.unwrap_err(), SyncError::Unauthenticated));
        assert_eq!(probe.record_count(), 0);
    }

    // -- 5. Missing payload --------------------------------------------------

    #[tokio::test]
    async fn post_without_payload_is_rejected() {
        let (service, _) = service_with_token("abc");
        let result = service.post(Some("abc"), None).await;
        assert!(matches!(result.unwrap_err(), SyncError::MissingPayload));
    }

    // -- 6. Get with nothing stored returns empty roster ---------------------

    #[tokio::test]
    async fn get_before_first_post_returns_empty_roster() {
        let (service, user) = service_with_token("abc");
        let fetched = service.get(Some("abc")).await.unwrap();
        assert_eq!(fetched.user_id, user);
        assert_eq!(fetched.scholars, json!([]));
    }

    // -- 7. Store failure surfaces as such -----------------------------------

    #[tokio::test]
    async fn store_outage_surfaces_as_store_failure() {
        let (verifier, _, _) = TableVerifier::single("abc");
        let service = SyncService::new(verifier, BrokenStore);

        let result = service.post(Some("abc"), Some(json!([]))).await;
        assert!(matches!(result.unwrap_err(), SyncError::Store(_)));
    }

    // -- 8. Transport failure at the verifier is unauthenticated -------------

    #[tokio::test]
    async fn unreachable_verifier_is_unauthenticated() {
        struct DownVerifier;

        #[async_trait]
        impl IdentityVerifier for DownVerifier {
            async fn verify(&self, _token: &str) -> Result<UserId, AuthError> {
                Err(AuthError::Transport("connection refused".into()))
            }
        }

        let store = SledRecordStore::open_temporary().unwrap();
        let service = SyncService::new(DownVerifier, store);

        let result = service.get(Some("abc")).await;
        assert!(matches!(result.unwrap_err(), SyncError::Unauthenticated));
    }

    // -- 9. Users do not see each other's rosters ----------------------------

    #[tokio::test]
    async fn rosters_are_per_user() {
        let alice_user = UserId::from_uuid(Uuid::new_v4());
        let bob_user = UserId::from_uuid(Uuid::new_v4());
        let verifier = TableVerifier {
            tokens: HashMap::from([
                ("alice-token".to_string(), alice_user),
                ("bob-token".to_string(), bob_user),
            ]),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let store = SledRecordStore::open_temporary().unwrap();
        let service = SyncService::new(verifier, store);

        service
            .post(Some("alice-token"), Some(json!(["alice"])))
            .await
            .unwrap();

        let bobs = service.get(Some("bob-token")).await.unwrap();
        assert_eq!(bobs.scholars, json!([]));

        let alices = service.get(Some("alice-token")).await.unwrap();
        assert_eq!(alices.scholars, json!(["alice"]));
    }
}
