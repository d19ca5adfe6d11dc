//! The reconciliation core
//!
//! One [`Reconciler`] exists per resource kind. It implements the state
//! machine that drives a single CR toward its declared state: observe,
//! resolve references, tag, create or update or delete, late-initialize,
//! patch metadata+spec, patch status, schedule the next pass.
//!
//! The flow is deliberately resumable: every step leaves the CR in a state
//! from which the next reconcile can continue, and the latest observed state
//! travels alongside errors so conditions accrued before a failure still
//! reach the cluster.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use kube::runtime::controller::Action;
use kube::runtime::reflector::store::Writer;
use kube::runtime::{predicates, watcher, Controller, WatchStreamExt};
use kube::{Api, Client};
use serde_json::{json, Value};
use tracing::{debug, error, info, info_span, warn, Instrument, Level};

use crate::cache::Caches;
use crate::client::{merge_patch, strip_managed_fields, ApiReader, ClusterClient};
use crate::condition::{self, ConditionStatus};
use crate::config::{Config, DeletionPolicy};
use crate::error::Error;
use crate::manager::{
    GroupKind, ResourceManager, ResourceManagerFactory, ResourceDescriptor, SecretResolver,
    ServiceController, SessionContext,
};
use crate::resource::{Resource, SecretKeyReference, ANNOTATION_DELETION_POLICY, ANNOTATION_REGION};
use crate::retry::{retry_if, BackoffConfig, RetryError};
use crate::{
    Result, DEFAULT_OUT_OF_SYNC_REQUEUE, DEFAULT_RESYNC_PERIOD, READ_ONE_AFTER_CREATE_TIMEOUT,
};

/// Reconciles one kind of custom resource against its backing cloud resource
///
/// The reconciler holds only shared, read-only collaborators; all per-call
/// state lives on the stack of [`Reconciler::reconcile`]. A single instance
/// serves concurrent reconciles of different resources of its kind.
pub struct Reconciler {
    sc: Arc<dyn ServiceController>,
    rmf: Arc<dyn ResourceManagerFactory>,
    rd: Arc<dyn ResourceDescriptor>,
    kc: Arc<dyn ClusterClient>,
    api_reader: Arc<dyn ApiReader>,
    config: Config,
    caches: Caches,
    resync_period: Duration,
}

impl Reconciler {
    /// Create a reconciler for the kind served by the given factory.
    ///
    /// The resync period is resolved once, here: a per-kind entry in the
    /// configuration map wins, then the factory's own success-requeue
    /// period, then the configured default, then the built-in ten hours.
    pub fn new(
        sc: Arc<dyn ServiceController>,
        rmf: Arc<dyn ResourceManagerFactory>,
        config: Config,
        caches: Caches,
        cluster_client: Arc<dyn ClusterClient>,
        api_reader: Arc<dyn ApiReader>,
    ) -> Self {
        let rd = rmf.resource_descriptor();
        let resync_period = resync_period(rmf.as_ref(), &config);
        debug!(
            kind = %rd.group_kind(),
            resync_seconds = resync_period.as_secs(),
            "initiating reconciler"
        );
        Self {
            sc,
            rmf,
            rd,
            kc: cluster_client,
            api_reader,
            config,
            caches,
            resync_period,
        }
    }

    /// API group and kind reconciled by this reconciler
    pub fn group_kind(&self) -> GroupKind {
        self.rd.group_kind()
    }

    /// Period between two reconciles of a healthy resource
    pub fn resync_period(&self) -> Duration {
        self.resync_period
    }

    /// Bind this reconciler to a controller for its kind and run it until
    /// shutdown.
    ///
    /// Updates that do not change `metadata.generation` (status-only writes,
    /// including this reconciler's own status patches) are filtered out of
    /// the trigger stream; resyncs arrive through requeues instead.
    pub async fn run(self: Arc<Self>, client: Client) -> Result<()> {
        let resource = self.rd.api_resource();
        let api: Api<DynamicObject> = Api::all_with(client, &resource);

        let writer: Writer<DynamicObject> = Writer::new(resource.clone());
        let reader = writer.as_reader();
        let stream = watcher(api, watcher::Config::default())
            .default_backoff()
            .reflect(writer)
            .applied_objects()
            .predicate_filter(predicates::generation);

        info!(kind = %self.group_kind(), "starting controller");

        Controller::for_stream_with(stream, reader, resource)
            .shutdown_on_signal()
            .run(
                |object, reconciler: Arc<Self>| async move { reconciler.reconcile(object).await },
                |object, err, reconciler| reconciler.error_policy(object, err),
                self,
            )
            .for_each(|result| async move {
                match result {
                    Ok((object, action)) => {
                        debug!(name = %object.name, ?action, "reconciliation completed");
                    }
                    Err(err) => {
                        warn!(error = %err, "reconciliation error");
                    }
                }
            })
            .await;

        Ok(())
    }

    /// Reconcile a single resource
    ///
    /// Fetches a fresh copy of the CR, derives the session context,
    /// constructs a resource manager and dispatches to the deletion or sync
    /// flow. Whatever happens, the latest observed state (if any) is patched
    /// back to the cluster before the outcome is returned.
    pub async fn reconcile(self: Arc<Self>, object: Arc<DynamicObject>) -> Result<Action> {
        let namespace = object
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let name = object.metadata.name.clone().unwrap_or_default();

        // The informer cache can lag behind the API server; reconciling a
        // stale copy risks undoing newer spec changes, so the pass starts
        // from an uncached read.
        let desired = match self.get_resource(&namespace, &name).await {
            Ok(desired) => desired,
            Err(err) if err.is_cluster_not_found() => {
                // deleted between enqueue and fetch
                return Ok(Action::await_change());
            }
            Err(err) => return Err(err),
        };

        let account_id = self.owner_account_id(&desired);
        let role_arn = self.role_arn(&account_id);
        let region = self.region(&desired);
        let endpoint_url = self.endpoint_url(&desired);
        let gvk = desired.gvk().unwrap_or_else(|| {
            let ar = self.rd.api_resource();
            GroupVersionKind::gvk(&ar.group, &ar.version, &ar.kind)
        });

        let span = info_span!(
            "reconcile",
            account = %account_id,
            role = %role_arn,
            region = %region,
            kind = %self.rd.group_kind().kind,
            namespace = %namespace,
            name = %name,
        );

        let context = SessionContext {
            account_id,
            region,
            endpoint_url,
            role_arn,
            gvk,
        };

        async move {
            let session = self.sc.new_session(&context)?;
            let rm = self.rmf.manager_for(
                &self.config,
                Arc::clone(&self) as Arc<dyn SecretResolver>,
                session,
            )?;

            let mut latest = None;
            let outcome = self.reconcile_one(rm.as_ref(), &desired, &mut latest).await;
            self.handle_reconcile_error(&desired, latest.as_ref(), outcome)
                .await
        }
        .instrument(span)
        .await
    }

    /// Requeue policy applied by the controller runtime when
    /// [`Reconciler::reconcile`] returns an error
    pub fn error_policy(&self, object: Arc<DynamicObject>, err: &Error) -> Action {
        error!(
            error = %err,
            name = %object.metadata.name.as_deref().unwrap_or(""),
            "reconciliation failed"
        );
        Action::requeue(DEFAULT_OUT_OF_SYNC_REQUEUE)
    }

    async fn get_resource(&self, namespace: &str, name: &str) -> Result<Resource> {
        let object = self
            .api_reader
            .get_resource(&self.rd.api_resource(), namespace, name)
            .await?;
        Ok(self.rd.resource_from_object(object))
    }

    /// Clean up a deleted resource or converge a live one
    async fn reconcile_one(
        &self,
        rm: &dyn ResourceManager,
        desired: &Resource,
        latest: &mut Option<Resource>,
    ) -> Result<()> {
        if desired.is_being_deleted() {
            if self.deletion_policy(desired) == DeletionPolicy::Delete {
                // Broken references must not block cleanup; the refs may
                // only matter for fields the delete call ignores.
                let resolved = match rm
                    .resolve_references(self.api_reader.as_ref(), desired)
                    .await
                {
                    Ok(resolved) => resolved,
                    Err(_) => desired.clone(),
                };
                return self.delete_resource(rm, &resolved, latest).await;
            }

            info!("resource will not be deleted, deletion policy is retain");
            let mut retained = desired.clone();
            self.set_resource_unmanaged(&mut retained).await?;
            *latest = Some(retained);
            return self.handle_requeues(latest.as_ref());
        }

        self.sync(rm, desired, latest).await?;
        self.handle_requeues(latest.as_ref())
    }

    /// Converge the backing cloud resource toward the desired state
    ///
    /// Wraps the actual flow so the Synced condition is written on every
    /// exit path, including early error returns.
    async fn sync(
        &self,
        rm: &dyn ResourceManager,
        desired: &Resource,
        latest: &mut Option<Resource>,
    ) -> Result<()> {
        let mut desired = desired.clone();
        // Conditions describe the observations of this pass only
        condition::clear(&mut desired);

        let outcome = self.sync_inner(rm, &mut desired, latest).await;

        if latest.is_none() {
            // A failure before the first cloud observation (reference
            // resolution, tagging, an adopted resource gone missing) still
            // must surface as a condition on the CR.
            *latest = Some(desired.clone());
        }
        if let Some(res) = latest.as_mut() {
            self.ensure_conditions(rm, res, outcome.as_ref().err()).await;
        }
        outcome
    }

    async fn sync_inner(
        &self,
        rm: &dyn ResourceManager,
        desired: &mut Resource,
        latest: &mut Option<Resource>,
    ) -> Result<()> {
        let is_adopted = desired.is_adopted();
        debug!(is_adopted, "resolving references");
        *desired = rm
            .resolve_references(self.api_reader.as_ref(), desired)
            .await?;

        debug!("ensuring controller tags");
        rm.ensure_tags(desired, &self.sc.metadata()).await?;

        debug!("reading current cloud state");
        match rm.read_one(desired).await {
            Ok(observed) => {
                self.update_resource(rm, desired, observed, latest).await?;
            }
            Err(err) if err.is_not_found() => {
                if is_adopted {
                    // an adopted resource must be discovered, never created
                    return Err(Error::AdoptedResourceNotFound);
                }
                self.create_resource(rm, desired, latest).await?;
            }
            Err(err) => return Err(err),
        }

        self.late_initialize_resource(rm, latest).await
    }

    /// Create the backing cloud resource and record the observed result
    async fn create_resource(
        &self,
        rm: &dyn ResourceManager,
        desired: &mut Resource,
        latest: &mut Option<Resource>,
    ) -> Result<()> {
        if !self.rd.is_managed(desired) {
            // The finalizer must be on the CR before the cloud resource
            // exists, otherwise a crash between the two leaks the resource.
            self.set_resource_managed(desired).await?;

            // The finalizer patch round-tripped through the API server,
            // which drops resolved references and controller tags (neither
            // is persisted), so both are rebuilt before the create call.
            *desired = rm
                .resolve_references(self.api_reader.as_ref(), desired)
                .await?;
            rm.ensure_tags(desired, &self.sc.metadata()).await?;
        }

        debug!("creating cloud resource");
        let created = rm.create(desired).await?;
        let created = latest.insert(created);

        let observed = match rm.read_one(created).await {
            Ok(observed) => observed,
            Err(err) if err.is_not_found() => {
                // Eventually-consistent APIs can 404 a read issued right
                // after a successful create; retry within a bounded budget.
                self.delayed_read_one_after_create(rm, created).await?
            }
            Err(err) => return Err(err),
        };
        created.set_status_from(&observed);

        // The create call may have mutated annotations or spec fields
        // (e.g. recording the new resource's identifier)
        self.patch_resource_metadata_and_spec(desired, created).await?;
        info!("created new resource");
        Ok(())
    }

    /// Retry the post-create read until the cloud catches up
    async fn delayed_read_one_after_create(
        &self,
        rm: &dyn ResourceManager,
        res: &Resource,
    ) -> Result<Resource> {
        let backoff = BackoffConfig {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
            max_elapsed: Some(READ_ONE_AFTER_CREATE_TIMEOUT),
        };
        let outcome = retry_if(
            &backoff,
            "read_one_after_create",
            || rm.read_one(res),
            |err| err.is_not_found(),
        )
        .await;
        match outcome {
            Ok(observed) => Ok(observed),
            Err(RetryError::Exhausted { attempts, .. }) => {
                Err(Error::ReadOneFailAfterCreate { attempts })
            }
            Err(RetryError::Halted { source, .. }) => Err(source),
        }
    }

    /// Update the backing cloud resource when the spec drifted
    async fn update_resource(
        &self,
        rm: &dyn ResourceManager,
        desired: &Resource,
        observed: Resource,
        latest: &mut Option<Resource>,
    ) -> Result<()> {
        let current = latest.insert(observed);
        self.fail_on_resource_unmanaged(current)?;

        let delta = self.rd.delta(desired, current);
        if delta.different_at("Spec") {
            info!(
                differences = delta.differences.len(),
                "desired resource state has changed"
            );
            let updated = rm.update(desired, current, &delta).await?;
            let updated = latest.insert(updated);
            self.patch_resource_metadata_and_spec(desired, updated).await?;
            info!("updated resource");
        }
        Ok(())
    }

    /// Give the resource manager a chance to fill spec fields the cloud
    /// defaulted server-side
    async fn late_initialize_resource(
        &self,
        rm: &dyn ResourceManager,
        latest: &mut Option<Resource>,
    ) -> Result<()> {
        let Some(current) = latest.as_mut() else {
            return Ok(());
        };

        debug!("late initializing resource");
        match rm.late_initialize(current).await {
            Ok(initialized) => {
                let before = current.clone();
                *current = initialized;
                self.patch_resource_metadata_and_spec(&before, current).await
            }
            Err(err) => {
                // Some fields may have been initialized even though others
                // need a retry; patch what we got before propagating.
                if let Some(partial) = err.requeue_latest() {
                    let before = current.clone();
                    *current = partial.clone();
                    self.patch_resource_metadata_and_spec(&before, current)
                        .await?;
                }
                Err(err)
            }
        }
    }

    /// Destroy the backing cloud resource, then release the CR
    async fn delete_resource(
        &self,
        rm: &dyn ResourceManager,
        current: &Resource,
        latest: &mut Option<Resource>,
    ) -> Result<()> {
        debug!("reading cloud state before delete");
        let observed = match rm.read_one(current).await {
            Ok(observed) => observed,
            Err(err) if err.is_not_found() => {
                // Cloud resource already gone; only the finalizer is left
                let mut remaining = current.clone();
                self.set_resource_unmanaged(&mut remaining).await?;
                *latest = Some(remaining);
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        debug!("deleting cloud resource");
        match rm.delete(&observed).await {
            Ok(deleted) => {
                let mut remaining = match deleted {
                    Some(deleted) => {
                        let deleted = latest.insert(deleted);
                        // The delete call may have recorded progress markers
                        // in annotations or spec
                        if let Err(err) =
                            self.patch_resource_metadata_and_spec(current, deleted).await
                        {
                            debug!(error = %err, "failed to patch resource after delete");
                        }
                        deleted.clone()
                    }
                    None => current.clone(),
                };

                // Cloud cleanup is done; removing the finalizer lets the
                // cluster garbage-collect the CR
                self.set_resource_unmanaged(&mut remaining).await?;
                *latest = Some(remaining);
                info!("deleted resource");
                Ok(())
            }
            Err(err) => {
                // Asynchronously-completing deletions return the
                // requeue-after sentinel carrying the in-flight state
                if let Some(in_flight) = err.requeue_latest() {
                    let in_flight = latest.insert(in_flight.clone());
                    if let Err(patch_err) =
                        self.patch_resource_metadata_and_spec(current, in_flight).await
                    {
                        debug!(error = %patch_err, "failed to patch in-flight delete state");
                    }
                }
                Err(err)
            }
        }
    }

    /// Ensure exactly one Synced condition describes this pass
    ///
    /// Runs on every sync exit path. A Synced condition already written by
    /// the resource manager's custom logic is left untouched.
    async fn ensure_conditions(
        &self,
        rm: &dyn ResourceManager,
        res: &mut Resource,
        reconcile_err: Option<&Error>,
    ) {
        if condition::synced(res).is_some() {
            return;
        }

        let mut status = ConditionStatus::False;
        let mut message = condition::NOT_SYNCED_MESSAGE;
        let mut reason = None;

        match rm.is_synced(res).await {
            Ok(true) => {
                status = ConditionStatus::True;
                message = condition::SYNCED_MESSAGE;
            }
            Ok(false) => {}
            Err(err) => reason = Some(err.to_string()),
        }

        if let Some(err) = reconcile_err {
            reason = Some(err.to_string());
            if err.is_terminal() {
                // A terminal state is stable: the desired state will never
                // match the observed state, so Synced is definitively False.
                status = ConditionStatus::False;
                message = condition::NOT_SYNCED_MESSAGE;
            } else {
                // Any other failure leaves convergence undetermined
                status = ConditionStatus::Unknown;
                message = condition::UNKNOWN_SYNCED_MESSAGE;
            }
        }

        condition::set_synced(res, status, Some(message.to_string()), reason);
    }

    /// Mark the CR as managed (finalizer present) and persist the change
    async fn set_resource_managed(&self, res: &mut Resource) -> Result<()> {
        if self.rd.is_managed(res) {
            return Ok(());
        }
        let orig = res.clone();
        self.rd.mark_managed(res);
        self.patch_resource_metadata_and_spec(&orig, res).await?;
        debug!("marked resource as managed");
        Ok(())
    }

    /// Remove the finalizer and persist the change, releasing the CR to the
    /// cluster's garbage collection
    async fn set_resource_unmanaged(&self, res: &mut Resource) -> Result<()> {
        if !self.rd.is_managed(res) {
            return Ok(());
        }
        let orig = res.clone();
        self.rd.mark_unmanaged(res);
        self.patch_resource_metadata_and_spec(&orig, res).await?;
        debug!("removed resource from management");
        Ok(())
    }

    /// Fail with the Terminal sentinel when an update reaches a CR that lost
    /// its finalizer
    fn fail_on_resource_unmanaged(&self, res: &mut Resource) -> Result<()> {
        if self.rd.is_managed(res) {
            return Ok(());
        }
        condition::set_terminal(
            res,
            ConditionStatus::True,
            Some(condition::NOT_MANAGED_MESSAGE.to_string()),
            Some(condition::NOT_MANAGED_REASON.to_string()),
        );
        Err(Error::Terminal)
    }

    /// Schedule the steady-state requeue based on the Synced condition
    fn handle_requeues(&self, latest: Option<&Resource>) -> Result<()> {
        let Some(res) = latest else {
            return Ok(());
        };
        let Some(synced) = condition::synced(res) else {
            return Ok(());
        };
        match synced.status {
            ConditionStatus::True => {
                debug!(
                    after_seconds = self.resync_period.as_secs(),
                    "requeueing for periodic resync"
                );
                Err(Error::requeue_after(self.resync_period))
            }
            _ => {
                debug!("requeueing after finding resource synced condition false");
                Err(Error::requeue_after_with_cause(
                    DEFAULT_OUT_OF_SYNC_REQUEUE,
                    Error::TemporaryOutOfSync,
                ))
            }
        }
    }

    /// Map the pass outcome to a controller action, patching status first
    ///
    /// When a latest observed state exists its status is always patched
    /// back, error or not; conditions recorded during a failed pass would
    /// otherwise never reach the cluster. Patch failures are logged, never
    /// allowed to mask the pass outcome.
    async fn handle_reconcile_error(
        &self,
        desired: &Resource,
        latest: Option<&Resource>,
        outcome: Result<()>,
    ) -> Result<Action> {
        if let Some(latest) = latest {
            if let Err(err) = self.patch_resource_status(desired, latest).await {
                warn!(error = %err, "failed to patch resource status");
            }
        }

        let err = match outcome {
            Ok(()) => return Ok(Action::await_change()),
            Err(err) => err,
        };

        match err {
            Error::Terminal => Ok(Action::await_change()),
            Error::RequeueAfter { after, cause, .. } => {
                match cause {
                    Some(cause) => debug!(
                        error = %cause,
                        after_seconds = after.as_secs(),
                        "requeue needed after error"
                    ),
                    None => debug!(after_seconds = after.as_secs(), "requeueing"),
                }
                Ok(Action::requeue(after))
            }
            Error::Requeue { cause } => {
                match cause {
                    Some(cause) => debug!(error = %cause, "requeue needed after error"),
                    None => debug!("requeueing immediately"),
                }
                Ok(Action::requeue(Duration::ZERO))
            }
            err => Err(err),
        }
    }

    /// Patch the CR's metadata and spec to match `latest`
    ///
    /// `latest` is mutated: it adopts the server's returned object (with the
    /// fresh `resourceVersion`, so it can be patched again within the same
    /// pass) but keeps its own status. The patch response echoes the request
    /// body's status subtree, which would clobber the observed status.
    async fn patch_resource_metadata_and_spec(
        &self,
        desired: &Resource,
        latest: &mut Resource,
    ) -> Result<()> {
        let desired_meta = serde_json::to_value(desired.meta())?;
        let latest_meta = serde_json::to_value(latest.meta())?;
        if desired_meta == latest_meta && !self.rd.delta(desired, latest).different_at("Spec") {
            debug!("no metadata or spec difference between desired and latest");
            return Ok(());
        }

        let patch = merge_patch::diff(&desired.to_value()?, &latest.to_value()?);
        if tracing::enabled!(Level::DEBUG) {
            let mut document = patch.clone();
            strip_managed_fields(&mut document);
            debug!(patch = %document, "patching resource metadata and spec");
        }

        let original_status = latest.status_value();
        let response = self
            .kc
            .patch_resource(
                &self.rd.api_resource(),
                latest.namespace(),
                latest.name(),
                &patch,
            )
            .await?;
        *latest = self.rd.resource_from_object(response);
        latest.set_status_value(original_status);
        Ok(())
    }

    /// Patch the CR's status subresource to match `latest`
    ///
    /// A 404 from the cluster means the CR was deleted while this pass ran;
    /// there is nothing left to record, so the error is swallowed.
    async fn patch_resource_status(&self, desired: &Resource, latest: &Resource) -> Result<()> {
        let base = desired.status_value().unwrap_or(Value::Null);
        let target = latest.status_value().unwrap_or(Value::Null);
        if base == target {
            debug!("no status difference between desired and latest");
            return Ok(());
        }

        let patch = json!({ "status": merge_patch::diff(&base, &target) });
        if tracing::enabled!(Level::DEBUG) {
            debug!(patch = %patch, "patching resource status");
        }

        match self
            .kc
            .patch_status(
                &self.rd.api_resource(),
                latest.namespace(),
                latest.name(),
                &patch,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_cluster_not_found() => {
                debug!("resource deleted before status patch");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Owner account precedence: status identifiers, then the namespace
    /// override, then the operator configuration
    fn owner_account_id(&self, res: &Resource) -> String {
        if let Some(account_id) = res.identifiers().owner_account_id {
            return account_id;
        }
        if let Some(account_id) = self.caches.namespaces.owner_account_id(res.namespace()) {
            return account_id;
        }
        self.config.account_id.clone()
    }

    /// Role to assume for the owning account; empty when none is registered
    fn role_arn(&self, account_id: &str) -> String {
        self.caches.accounts.role_arn(account_id).unwrap_or_default()
    }

    /// Region precedence: status identifiers, then the resource annotation,
    /// then the namespace override, then the operator configuration
    fn region(&self, res: &Resource) -> String {
        if let Some(region) = res.identifiers().region {
            return region;
        }
        if let Some(region) = res.annotation(ANNOTATION_REGION) {
            return region.to_string();
        }
        if let Some(region) = self.caches.namespaces.default_region(res.namespace()) {
            return region;
        }
        self.config.region.clone()
    }

    /// Endpoint precedence: the namespace override, then the operator
    /// configuration
    fn endpoint_url(&self, res: &Resource) -> String {
        if let Some(endpoint_url) = self.caches.namespaces.endpoint_url(res.namespace()) {
            return endpoint_url;
        }
        self.config.endpoint_url.clone()
    }

    /// Deletion policy precedence: the resource annotation, then the
    /// namespace override scoped by service alias, then the operator
    /// configuration
    fn deletion_policy(&self, res: &Resource) -> DeletionPolicy {
        if let Some(policy) = res
            .annotation(ANNOTATION_DELETION_POLICY)
            .and_then(|value| value.parse().ok())
        {
            return policy;
        }
        if let Some(policy) = self
            .caches
            .namespaces
            .deletion_policy(res.namespace(), &self.sc.metadata().service_alias)
        {
            return policy;
        }
        self.config.deletion_policy
    }
}

#[async_trait]
impl SecretResolver for Reconciler {
    /// Resolve a secret key reference through a direct cluster read.
    ///
    /// Only Opaque secrets are honored; a missing secret or key resolves to
    /// [`Error::SecretNotFound`].
    async fn secret_value_from_reference(
        &self,
        reference: &SecretKeyReference,
    ) -> Result<String> {
        let namespace = reference.namespace.as_deref().unwrap_or("default");

        let secret = self
            .api_reader
            .get_secret(namespace, &reference.name)
            .await
            .map_err(|_| Error::SecretNotFound)?;

        if secret.type_.as_deref().unwrap_or("Opaque") != "Opaque" {
            return Err(Error::SecretTypeNotSupported);
        }

        secret
            .data
            .as_ref()
            .and_then(|data| data.get(&reference.key))
            .map(|value| String::from_utf8_lossy(&value.0).to_string())
            .ok_or(Error::SecretNotFound)
    }
}

/// Resolve the per-kind resync period from its four sources
fn resync_period(rmf: &dyn ResourceManagerFactory, config: &Config) -> Duration {
    // the map was validated at startup; a malformed flag cannot reach here
    let overrides = config.parse_resource_resync_seconds().unwrap_or_default();
    let kind = rmf.resource_descriptor().group_kind().kind.to_lowercase();
    if let Some(seconds) = overrides.get(&kind).copied().filter(|s| *s > 0) {
        return Duration::from_secs(seconds);
    }

    let seconds = rmf.requeue_on_success_seconds();
    if seconds > 0 {
        return Duration::from_secs(seconds);
    }

    if config.reconcile_default_resync_seconds > 0 {
        return Duration::from_secs(config.reconcile_default_resync_seconds);
    }

    DEFAULT_RESYNC_PERIOD
}
