//! Permission broker.
//!
//! Admissible capabilities are granted as soon as they are requested.
//! Escalation capabilities are parked in a [`PendingEscalationRequest`] until
//! an external channel approves or denies them. Pending requests expire after
//! a TTL, and a request made before its package's current installation is
//! void. Both are checked on every broker call and by an optional background
//! sweeper.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::PackageId;
use warden_policy::{PermissionClass, SecurityPolicy};
use warden_storage::{KvStore, ScopedKvStore};

use crate::error::{RegistryError, RegistryResult};
use crate::record::InstalledPackageRecord;
use crate::registry::Registry;

/// Store namespace for pending escalation requests.
pub const PENDING_NAMESPACE: &str = "pending";

/// Unique identifier for a pending escalation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req:{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = RegistryError;

    /// Accepts both `req:<uuid>` and a bare uuid.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed.strip_prefix("req:").unwrap_or(trimmed);
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| RegistryError::InvalidRequestId(s.to_owned()))
    }
}

/// Broker timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerSettings {
    /// How long a pending request stays resolvable.
    pub request_ttl: Duration,
    /// Period of [`PermissionBroker::spawn_sweeper`].
    pub sweep_interval: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            request_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Escalation capabilities awaiting an explicit decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEscalationRequest {
    /// Request identifier.
    pub request_id: RequestId,
    /// Package the capabilities are for.
    pub package_id: PackageId,
    /// Escalation capabilities, deduplicated in request order.
    pub capabilities: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time after which the request can no longer be resolved.
    pub expires_at: DateTime<Utc>,
}

impl PendingEscalationRequest {
    /// Whether the request has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of [`PermissionBroker::request_capabilities`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityDecision {
    /// Everything requested is now granted.
    Granted {
        /// The package's full grant set after the call.
        capabilities: BTreeSet<String>,
    },
    /// Non-escalation capabilities were granted; the rest wait for approval.
    Pending {
        /// Present this to the approval channel.
        request_id: RequestId,
        /// Capabilities awaiting approval.
        escalation: Vec<String>,
        /// The package's grant set after the auto-grant.
        granted: BTreeSet<String>,
    },
}

/// Outcome of [`PermissionBroker::resolve_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The capabilities were merged into the package's grants.
    Approved {
        /// Package the request was for.
        package_id: PackageId,
        /// The package's grant set after the merge.
        granted: BTreeSet<String>,
    },
    /// The request was dropped.
    Denied {
        /// Package the request was for.
        package_id: PackageId,
    },
}

/// Grants capabilities to installed packages.
pub struct PermissionBroker {
    registry: Arc<Registry>,
    policy: Arc<SecurityPolicy>,
    settings: BrokerSettings,
    store: ScopedKvStore,
    pending: Mutex<HashMap<RequestId, PendingEscalationRequest>>,
}

impl fmt::Debug for PermissionBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionBroker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PermissionBroker {
    /// Create a broker, loading any persisted pending requests.
    ///
    /// Expired and unreadable requests are discarded.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the pending namespace cannot be listed.
    pub async fn open(
        registry: Arc<Registry>,
        policy: Arc<SecurityPolicy>,
        store: Arc<dyn KvStore>,
        settings: BrokerSettings,
    ) -> RegistryResult<Self> {
        let store = ScopedKvStore::new(store, PENDING_NAMESPACE)?;
        let now = Utc::now();
        let mut pending = HashMap::new();

        for key in store.list_keys().await? {
            match store.get_json::<PendingEscalationRequest>(&key).await {
                Ok(Some(request)) if !request.is_expired(now) => {
                    pending.insert(request.request_id, request);
                },
                Ok(Some(_)) => {
                    store.delete(&key).await?;
                },
                Ok(None) => {},
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding unreadable pending request");
                    store.delete(&key).await?;
                },
            }
        }
        debug!(pending = pending.len(), "Loaded pending requests");

        Ok(Self {
            registry,
            policy,
            settings,
            store,
            pending: Mutex::new(pending),
        })
    }

    /// Broker timing.
    #[must_use]
    pub fn settings(&self) -> BrokerSettings {
        self.settings
    }

    /// Grant what can be granted now and park the escalation subset.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotFound`] if the package is not installed
    /// - [`RegistryError::NotGrantable`] for a blocked or unrecognized
    ///   capability; nothing is granted in that case
    pub async fn request_capabilities(
        &self,
        package_id: &PackageId,
        requested: &[String],
    ) -> RegistryResult<CapabilityDecision> {
        self.purge_stale().await?;
        if !self.registry.contains(package_id).await {
            return Err(RegistryError::NotFound(package_id.clone()));
        }

        let mut immediate = Vec::new();
        let mut escalation: Vec<String> = Vec::new();
        for capability in requested {
            match self.policy.classify(capability) {
                PermissionClass::Escalation => {
                    if !escalation.contains(capability) {
                        escalation.push(capability.clone());
                    }
                },
                class if class.is_admissible() => immediate.push(capability.clone()),
                _ => return Err(RegistryError::NotGrantable(capability.clone())),
            }
        }

        let granted = self.registry.grant(package_id, immediate).await?;
        let already = &granted;
        escalation.retain(|c| !already.contains(c));
        if escalation.is_empty() {
            debug!(package_id = %package_id, granted = granted.len(), "Granted capabilities");
            return Ok(CapabilityDecision::Granted {
                capabilities: granted,
            });
        }

        let created_at = Utc::now();
        let ttl = TimeDelta::from_std(self.settings.request_ttl).unwrap_or(TimeDelta::MAX);
        let request = PendingEscalationRequest {
            request_id: RequestId::new(),
            package_id: package_id.clone(),
            capabilities: escalation.clone(),
            created_at,
            expires_at: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.store
            .set_json(&request.request_id.0.to_string(), &request)
            .await?;
        let request_id = request.request_id;
        self.pending.lock().await.insert(request_id, request);

        info!(
            package_id = %package_id,
            request_id = %request_id,
            escalation = ?escalation,
            "Escalation requires approval"
        );
        Ok(CapabilityDecision::Pending {
            request_id,
            escalation,
            granted,
        })
    }

    /// Approve or deny a pending request. Either way it is consumed.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::RequestNotFound`] for an unknown id
    /// - [`RegistryError::RequestExpired`] if the TTL has passed
    /// - [`RegistryError::NotFound`] if the package was uninstalled meanwhile
    /// - [`RegistryError::RequestSuperseded`] if the package was reinstalled
    ///   after the request was made
    pub async fn resolve_request(
        &self,
        request_id: RequestId,
        approve: bool,
    ) -> RegistryResult<Resolution> {
        let request = self
            .pending
            .lock()
            .await
            .remove(&request_id)
            .ok_or(RegistryError::RequestNotFound(request_id))?;
        self.store.delete(&request_id.0.to_string()).await?;

        if request.is_expired(Utc::now()) {
            warn!(request_id = %request_id, package_id = %request.package_id, "Pending request expired");
            return Err(RegistryError::RequestExpired(request_id));
        }
        let installed_at = self
            .registry
            .get_details(&request.package_id)
            .await
            .map(|r| r.installed_at)
            .ok_or_else(|| RegistryError::NotFound(request.package_id.clone()))?;
        if request.created_at < installed_at {
            warn!(request_id = %request_id, package_id = %request.package_id, "Pending request predates reinstall");
            return Err(RegistryError::RequestSuperseded(request_id));
        }

        if !approve {
            info!(request_id = %request_id, package_id = %request.package_id, "Escalation denied");
            return Ok(Resolution::Denied {
                package_id: request.package_id,
            });
        }

        let granted = self
            .registry
            .grant(&request.package_id, request.capabilities)
            .await?;
        info!(request_id = %request_id, package_id = %request.package_id, "Escalation approved");
        Ok(Resolution::Approved {
            package_id: request.package_id,
            granted,
        })
    }

    /// Remove some (or, for `None`, all) grants. Takes effect on the next
    /// [`has_capability`](Self::has_capability) call.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the package is not installed.
    pub async fn revoke(
        &self,
        package_id: &PackageId,
        capabilities: Option<&[String]>,
    ) -> RegistryResult<BTreeSet<String>> {
        self.purge_stale().await?;
        let left = self.registry.revoke(package_id, capabilities).await?;
        info!(package_id = %package_id, remaining = left.len(), "Revoked capabilities");
        Ok(left)
    }

    /// Whether `package_id` currently holds `capability`.
    pub async fn has_capability(&self, package_id: &PackageId, capability: &str) -> bool {
        self.registry
            .granted_capabilities(package_id)
            .await
            .is_ok_and(|granted| granted.contains(capability))
    }

    /// Current grants for `package_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the package is not installed.
    pub async fn granted_capabilities(
        &self,
        package_id: &PackageId,
    ) -> RegistryResult<BTreeSet<String>> {
        self.registry.granted_capabilities(package_id).await
    }

    /// Outstanding requests, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if expired entries cannot be removed.
    pub async fn pending_requests(&self) -> RegistryResult<Vec<PendingEscalationRequest>> {
        self.purge_stale().await?;
        let mut requests: Vec<_> = self.pending.lock().await.values().cloned().collect();
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }

    /// Uninstall `package_id` and drop its pending requests.
    ///
    /// # Errors
    ///
    /// Returns the registry error that stopped the removal, or a storage
    /// error if a pending request cannot be deleted.
    pub async fn uninstall(
        &self,
        package_id: &PackageId,
    ) -> RegistryResult<(InstalledPackageRecord, usize)> {
        let record = self.registry.uninstall(package_id).await?;
        let dropped = self.forget_package(package_id).await?;
        if dropped > 0 {
            debug!(package_id = %package_id, dropped, "Dropped pending requests of removed package");
        }
        Ok((record, dropped))
    }

    /// Drop every pending request for `package_id`. Returns how many.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a persisted request cannot be deleted.
    pub async fn forget_package(&self, package_id: &PackageId) -> RegistryResult<usize> {
        self.remove_where(|r| &r.package_id == package_id).await
    }

    /// Purge expired requests and requests whose package is gone or was
    /// reinstalled. Returns how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        match self.purge_stale().await {
            Ok(purged) => purged,
            Err(e) => {
                warn!(error = %e, "Pending request sweep failed");
                0
            },
        }
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every
    /// `settings.sweep_interval` until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        let period = self.settings.sweep_interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = broker.sweep_expired().await;
                        if purged > 0 {
                            debug!(purged, "Swept expired pending requests");
                        }
                    },
                }
            }
            debug!("Pending request sweeper stopped");
        })
    }

    async fn purge_stale(&self) -> RegistryResult<usize> {
        let now = Utc::now();
        let installed = self.registry.install_times().await;
        self.remove_where(|r| {
            r.is_expired(now)
                || !installed
                    .get(&r.package_id)
                    .is_some_and(|at| r.created_at >= *at)
        })
        .await
    }

    async fn remove_where<F>(&self, predicate: F) -> RegistryResult<usize>
    where
        F: Fn(&PendingEscalationRequest) -> bool,
    {
        let mut pending = self.pending.lock().await;
        let doomed: Vec<RequestId> = pending
            .values()
            .filter(|r| predicate(r))
            .map(|r| r.request_id)
            .collect();
        for request_id in &doomed {
            self.store.delete(&request_id.0.to_string()).await?;
            pending.remove(request_id);
        }
        Ok(doomed.len())
    }
}
