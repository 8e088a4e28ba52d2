//! Sessions: authenticated crypto contexts with serialized op dispatch
//!
//! Each session owns one worker task. Dispatched jobs go over an unbounded
//! channel, so they execute and complete in submission order and the caller
//! never blocks.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::{SkiError, SkiResult};
use crate::key_store::KeyStore;
use crate::key_types::CommunityId;
use crate::ops::{execute_op, OpArgs, OpContext, OpResult};
use crate::provider::SessionParams;
use crate::registry::SkiRegistry;
use crate::vault::KeyVault;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Opening = 0,
    Open = 1,
    Ending = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Opening,
            1 => SessionState::Open,
            2 => SessionState::Ending,
            _ => SessionState::Closed,
        }
    }
}

pub type OpCallback = Box<dyn FnOnce(SkiResult<OpResult>) + Send + 'static>;
pub type EndCallback = Box<dyn FnOnce(SkiResult<()>) + Send + 'static>;

enum Job {
    Op { args: OpArgs, on_complete: OpCallback },
    End { reason: String, on_complete: EndCallback },
}

impl Job {
    fn reject(self) {
        match self {
            Job::Op { on_complete, .. } => on_complete(Err(SkiError::SessionClosed)),
            Job::End { on_complete, .. } => on_complete(Err(SkiError::SessionClosed)),
        }
    }
}

/// A live crypto context for one identity
pub struct Session {
    session_id: Uuid,
    identity: String,
    community_id: CommunityId,
    registry: Arc<SkiRegistry>,
    state: Arc<AtomicU8>,
    jobs: mpsc::UnboundedSender<Job>,
    handle: Handle,
}

impl Session {
    /// Authenticate with the provider named by `params.invocation`, load the
    /// identity's stored keys and start the session worker.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(registry: Arc<SkiRegistry>, params: SessionParams) -> SkiResult<Session> {
        let session_id = Uuid::new_v4();
        let state = Arc::new(AtomicU8::new(SessionState::Opening as u8));

        info!(
            session_id = %session_id,
            identity = %params.identity,
            provider = %params.invocation,
            community_id = %params.community_id,
            "Starting session"
        );

        let provider = registry.provider(&params.invocation)?;
        let vault = provider.open_vault(&params).await?;

        let key_store = Arc::new(KeyStore::new());
        if let Err(e) = load_stored_keys(&key_store, vault.as_ref()).await {
            warn!(session_id = %session_id, error = %e, "Failed to load stored keys");
            key_store.clear().await;
            if let Err(close_err) = vault.close().await {
                warn!(session_id = %session_id, error = %close_err, "Failed to close vault");
            }
            return Err(e);
        }
        key_store.fetch_or_create_keyrings(&params.community_id).await;

        let ctx = OpContext {
            registry: registry.clone(),
            key_store,
            vault,
            community_id: params.community_id.clone(),
            keygen_max_attempts: params.keygen_max_attempts,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        state.store(SessionState::Open as u8, Ordering::SeqCst);
        tokio::spawn(run_worker(session_id, ctx, rx, state.clone()));

        info!(session_id = %session_id, "Session open");

        Ok(Session {
            session_id,
            identity: params.identity.clone(),
            community_id: params.community_id.clone(),
            registry,
            state,
            jobs: tx,
            handle: Handle::current(),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn community_id(&self) -> &CommunityId {
        &self.community_id
    }

    pub fn registry(&self) -> &Arc<SkiRegistry> {
        &self.registry
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Queue one operation. Returns immediately; `on_complete` runs exactly
    /// once on a runtime task, after every earlier op on this session.
    pub fn dispatch_op<F>(&self, args: OpArgs, on_complete: F)
    where
        F: FnOnce(SkiResult<OpResult>) + Send + 'static,
    {
        let job = Job::Op {
            args,
            on_complete: Box::new(on_complete),
        };
        if !self.is_open() {
            self.reject_later(job);
            return;
        }
        if let Err(mpsc::error::SendError(job)) = self.jobs.send(job) {
            self.reject_later(job);
        }
    }

    /// Begin shutdown. Ops queued before this call still run; later ones fail
    /// with `SessionClosed`. `on_complete` runs once the key material is gone.
    pub fn end_session<F>(&self, reason: impl Into<String>, on_complete: F)
    where
        F: FnOnce(SkiResult<()>) + Send + 'static,
    {
        let job = Job::End {
            reason: reason.into(),
            on_complete: Box::new(on_complete),
        };

        let claimed = self
            .state
            .compare_exchange(
                SessionState::Open as u8,
                SessionState::Ending as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !claimed {
            self.reject_later(job);
            return;
        }
        if let Err(mpsc::error::SendError(job)) = self.jobs.send(job) {
            self.reject_later(job);
        }
    }

    /// Dispatch and await the result
    pub async fn do_op(&self, args: OpArgs) -> SkiResult<OpResult> {
        let (tx, rx) = oneshot::channel();
        self.dispatch_op(args, move |result| {
            let _ = tx.send(result);
        });
        rx.await.map_err(|_| SkiError::SessionClosed)?
    }

    /// End the session and await finalization
    pub async fn end(&self, reason: impl Into<String>) -> SkiResult<()> {
        let (tx, rx) = oneshot::channel();
        self.end_session(reason, move |result| {
            let _ = tx.send(result);
        });
        rx.await.map_err(|_| SkiError::SessionClosed)?
    }

    fn reject_later(&self, job: Job) {
        self.handle.spawn(async move { job.reject() });
    }
}

async fn load_stored_keys(key_store: &KeyStore, vault: &dyn KeyVault) -> SkiResult<()> {
    for bundle in vault.load_bundles().await? {
        let community_id = bundle.community_id.clone();
        let keyrings = key_store.fetch_or_create_keyrings(&community_id).await;
        let not_merged = keyrings.merge_keys(bundle.keys).await?;
        if !not_merged.is_empty() {
            warn!(
                community_id = %community_id,
                rejected = not_merged.len(),
                "Stored keys collided on load"
            );
        }
    }
    Ok(())
}

async fn run_worker(
    session_id: Uuid,
    ctx: OpContext,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    state: Arc<AtomicU8>,
) {
    let mut ending = None;
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Op { args, on_complete } => {
                let result = execute_op(&ctx, args).await;
                on_complete(result);
            }
            Job::End { reason, on_complete } => {
                ending = Some((reason, on_complete));
                break;
            }
        }
    }

    state.store(SessionState::Ending as u8, Ordering::SeqCst);

    // Anything that raced in behind the end request is refused
    jobs.close();
    let mut rejected = 0usize;
    while let Ok(job) = jobs.try_recv() {
        job.reject();
        rejected += 1;
    }

    ctx.key_store.clear().await;
    let closed = ctx.vault.close().await;
    if let Err(e) = &closed {
        warn!(session_id = %session_id, error = %e, "Failed to close vault");
    }
    state.store(SessionState::Closed as u8, Ordering::SeqCst);

    match ending {
        Some((reason, on_complete)) => {
            info!(
                session_id = %session_id,
                reason = %reason,
                rejected = rejected,
                "Session closed"
            );
            on_complete(closed);
        }
        None => debug!(session_id = %session_id, "Session dropped without end request"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_types::{CryptoKitId, KeyDomain, KeyEntry, KeyType};
    use crate::kits::{AesGcmKit, DalekKit};
    use crate::providers::MemoryProvider;
    use std::sync::Mutex;

    fn registry() -> Arc<SkiRegistry> {
        let mut registry = SkiRegistry::new();
        registry.register_crypto_kit(Arc::new(DalekKit)).unwrap();
        registry.register_crypto_kit(Arc::new(AesGcmKit)).unwrap();
        registry.register_provider(Arc::new(MemoryProvider::new())).unwrap();
        Arc::new(registry)
    }

    fn params(credential: &str) -> SessionParams {
        SessionParams::new("mem", "alice", CommunityId::new(vec![1; 4]), credential.as_bytes())
    }

    fn generate_signing() -> OpArgs {
        OpArgs::GenerateKeys {
            key_reqs: vec![KeyEntry::request(KeyType::Signing, KeyDomain::Signing, CryptoKitId::DALEK)],
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let session = Session::start(registry(), params("pw")).await.unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.identity(), "alice");

        session.end("done").await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);

        assert!(matches!(
            session.do_op(generate_signing()).await,
            Err(SkiError::SessionClosed)
        ));
        assert!(matches!(session.end("again").await, Err(SkiError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let mut p = params("pw");
        p.invocation = "hsm".to_string();
        assert!(matches!(
            Session::start(registry(), p).await,
            Err(SkiError::ProviderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_queued_ops_complete_in_order_before_end() {
        let session = Session::start(registry(), params("pw")).await.unwrap();
        let completed = Arc::new(Mutex::new(Vec::new()));

        let mut waiters = Vec::new();
        for i in 0..20 {
            let (tx, rx) = oneshot::channel();
            let completed = completed.clone();
            session.dispatch_op(generate_signing(), move |result| {
                completed.lock().unwrap().push((i, result.is_ok()));
                let _ = tx.send(());
            });
            waiters.push(rx);
        }
        session.end("done").await.unwrap();

        for rx in waiters {
            rx.await.unwrap();
        }
        let completed = completed.lock().unwrap();
        let expected: Vec<_> = (0..20).map(|i| (i, true)).collect();
        assert_eq!(*completed, expected);
    }

    #[tokio::test]
    async fn test_keys_survive_session_restart() {
        let registry = registry();

        let session = Session::start(registry.clone(), params("pw")).await.unwrap();
        let key = session
            .do_op(generate_signing())
            .await
            .unwrap()
            .into_keys()
            .unwrap()
            .keys
            .remove(0);
        session.end("restart").await.unwrap();

        let session = Session::start(registry.clone(), params("pw")).await.unwrap();
        let resolved = session
            .do_op(OpArgs::ResolveKey { key_ref: key.key_ref() })
            .await
            .unwrap()
            .into_key()
            .unwrap();
        assert_eq!(resolved, key);
        session.end("done").await.unwrap();

        assert!(matches!(
            Session::start(registry, params("wrong")).await,
            Err(SkiError::AuthenticationFailed(_))
        ));
    }
}
