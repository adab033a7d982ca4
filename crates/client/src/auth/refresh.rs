//! Single-flight credential renewal.
//!
//! ```text
//! Idle --request--> Refreshing --success--> Idle   (waiters get the new credential)
//!                              --failure--> Idle   (waiters rejected, session torn down)
//! ```
//!
//! The renewal runs on its own task so a caller that stops awaiting cannot
//! leave the coordinator stuck in `Refreshing`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use super::{Credential, CredentialRenewer, CredentialStore};
use crate::error::ApiError;

/// Why a renewal did not produce a credential.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no credential to renew")]
    NoCredential,

    #[error("refresh token rejected: {0}")]
    Rejected(String),

    #[error("renewal failed: {0}")]
    Transport(String),

    #[error("renewal was abandoned")]
    Abandoned,
}

impl From<ApiError> for RefreshError {
    fn from(err: ApiError) -> Self {
        if err.is_retryable() {
            Self::Transport(err.to_string())
        } else {
            Self::Rejected(err.to_string())
        }
    }
}

/// Observable coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    Idle,
    Refreshing,
}

type Outcome = Result<Credential, RefreshError>;

enum RefreshState {
    Idle,
    Refreshing { waiters: Vec<oneshot::Sender<Outcome>> },
}

/// Serializes credential renewal for one session.
///
/// However many callers ask concurrently, at most one renewal call is in
/// flight; every caller that asked while it ran gets the same outcome, in
/// arrival order.
pub struct RefreshCoordinator {
    credentials: Arc<CredentialStore>,
    renewer: Arc<dyn CredentialRenewer>,
    state: Mutex<RefreshState>,
    renewals: AtomicU64,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(credentials: Arc<CredentialStore>, renewer: Arc<dyn CredentialRenewer>) -> Self {
        Self {
            credentials,
            renewer,
            state: Mutex::new(RefreshState::Idle),
            renewals: AtomicU64::new(0),
        }
    }

    /// Obtain a renewed credential.
    ///
    /// `rejected` is the access token the server just refused, if any. When
    /// the coordinator is idle and the stored credential is fresh and differs
    /// from it, another caller already renewed and that credential is returned
    /// without a network call.
    ///
    /// # Errors
    ///
    /// Returns the shared renewal failure. By then the session has been torn
    /// down.
    pub async fn request_refresh(self: &Arc<Self>, rejected: Option<&str>) -> Outcome {
        let receiver = {
            let mut state = self.lock_state();
            let (sender, receiver) = oneshot::channel();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    debug!(queued = waiters.len() + 1, "Joining in-flight renewal");
                    waiters.push(sender);
                }
                RefreshState::Idle => {
                    if let Some(current) = self.credentials.get() {
                        let superseded = rejected.is_none_or(|token| !current.has_access_token(token));
                        if superseded && !current.is_expired() {
                            debug!("Credential already renewed");
                            return Ok(current);
                        }
                    }
                    *state = RefreshState::Refreshing {
                        waiters: vec![sender],
                    };
                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.drive().await });
                }
            }
            receiver
        };

        receiver.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    /// If a renewal is running, wait for its outcome.
    ///
    /// Returns `None` immediately when idle.
    pub async fn wait_if_refreshing(&self) -> Option<Outcome> {
        let receiver = {
            let mut state = self.lock_state();
            match &mut *state {
                RefreshState::Idle => return None,
                RefreshState::Refreshing { waiters } => {
                    let (sender, receiver) = oneshot::channel();
                    waiters.push(sender);
                    receiver
                }
            }
        };
        Some(receiver.await.unwrap_or(Err(RefreshError::Abandoned)))
    }

    #[must_use]
    pub fn status(&self) -> RefreshStatus {
        match *self.lock_state() {
            RefreshState::Idle => RefreshStatus::Idle,
            RefreshState::Refreshing { .. } => RefreshStatus::Refreshing,
        }
    }

    /// Number of renewal calls issued so far.
    #[must_use]
    pub fn renewal_count(&self) -> u64 {
        self.renewals.load(Ordering::SeqCst)
    }

    #[instrument(skip(self))]
    async fn drive(self: Arc<Self>) {
        let reset = ResetOnDrop(&self.state);

        let outcome = self.renew_once().await;
        match &outcome {
            Ok(credential) => {
                if let Err(e) = self.credentials.set(credential.clone()).await {
                    warn!(error = %e, "Renewed credential could not be persisted");
                }
                info!("Credential renewed");
            }
            Err(e) => {
                error!(error = %e, "Credential renewal failed, ending session");
                self.credentials.clear().await;
            }
        }

        let waiters = match std::mem::replace(&mut *self.lock_state(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };
        drop(reset);

        for waiter in waiters {
            // A waiter whose caller went away is fine to skip.
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn renew_once(&self) -> Outcome {
        let current = self.credentials.get().ok_or(RefreshError::NoCredential)?;
        self.renewals.fetch_add(1, Ordering::SeqCst);
        Ok(self.renewer.renew(&current.refresh_token).await?)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("status", &self.status())
            .field("renewals", &self.renewal_count())
            .finish_non_exhaustive()
    }
}

/// Returns the coordinator to `Idle` if the renewal task unwinds; dropping
/// the waiters' senders rejects them with `Abandoned`.
struct ResetOnDrop<'a>(&'a Mutex<RefreshState>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, RefreshState::Refreshing { .. }) {
            *state = RefreshState::Idle;
        }
    }
}
