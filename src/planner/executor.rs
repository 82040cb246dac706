//! Sequential plan execution with per-step snapshot commits.
//!
//! The executor owns the retry policy: provider calls are retried with
//! exponential backoff while the error is transient, up to a bounded
//! attempt count. Every successful step is committed to the snapshot store
//! before the next step starts, so a failed apply leaves a snapshot that
//! exactly matches the resources that exist.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ProjectConfig;
use crate::error::{PlanError, Result, StratoError};
use crate::provider::{CloudProvider, CreatedResource, ResourceStatus};
use crate::state::{
    generate_holder_id, AppliedSnapshot, ApplyHistoryEntry, ApplyOperation, NodeRecord,
    SnapshotStore,
};

use super::binder::OutputBinder;
use super::plan::{ExecutionPlan, PlanStep, StepAction};

/// Default cap on provider call attempts per step.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default backoff base, doubled per attempt.
pub const DEFAULT_BASE_DELAY_SECS: u64 = 2;
/// Default ceiling on waiting for a resource to settle.
pub const DEFAULT_SETTLE_TIMEOUT_SECS: u64 = 300;
/// Default interval between settle polls.
pub const DEFAULT_SETTLE_POLL_SECS: u64 = 5;

/// Executor for assembled plans.
pub struct PlanExecutor<'a> {
    provider: &'a dyn CloudProvider,
    store: &'a dyn SnapshotStore,
    project: &'a ProjectConfig,
    max_retries: u32,
    base_delay_secs: u64,
    settle_timeout_secs: u64,
    settle_poll_secs: u64,
}

/// Outcome of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step completed and its snapshot change was committed.
    Done,
    /// The step failed after exhausting its retries.
    Failed(String),
    /// The step was not attempted because an earlier step failed.
    Skipped,
}

/// Report line for one step.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Resource name.
    pub name: String,
    /// Human-readable action label.
    pub action: String,
    /// What happened.
    pub outcome: StepOutcome,
}

/// Result of executing an entire plan.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Per-step reports in execution order.
    pub steps: Vec<StepReport>,
    /// Steps that completed.
    pub done: usize,
    /// Steps that failed.
    pub failed: usize,
    /// Steps skipped after the failure.
    pub skipped: usize,
}

impl ApplyReport {
    /// Returns true if every attempted step completed.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    fn push(&mut self, step: &PlanStep, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Done => self.done += 1,
            StepOutcome::Failed(_) => self.failed += 1,
            StepOutcome::Skipped => self.skipped += 1,
        }
        self.steps.push(StepReport {
            name: step.name.clone(),
            action: step.action.to_string(),
            outcome,
        });
    }

    /// The partial-failure error corresponding to this report, if any step
    /// failed.
    #[must_use]
    pub fn as_error(&self) -> Option<StratoError> {
        if self.success() {
            None
        } else {
            Some(StratoError::Plan(PlanError::PartialFailure {
                done: self.done,
                failed: self.failed,
                skipped: self.skipped,
            }))
        }
    }
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} done, {} failed, {} skipped",
            self.done, self.failed, self.skipped
        )
    }
}

impl<'a> PlanExecutor<'a> {
    /// Creates an executor with default retry and settle tuning.
    #[must_use]
    pub const fn new(
        provider: &'a dyn CloudProvider,
        store: &'a dyn SnapshotStore,
        project: &'a ProjectConfig,
    ) -> Self {
        Self {
            provider,
            store,
            project,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_secs: DEFAULT_BASE_DELAY_SECS,
            settle_timeout_secs: DEFAULT_SETTLE_TIMEOUT_SECS,
            settle_poll_secs: DEFAULT_SETTLE_POLL_SECS,
        }
    }

    /// Overrides the per-step attempt cap.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Overrides the backoff base delay.
    #[must_use]
    pub const fn with_base_delay_secs(mut self, secs: u64) -> Self {
        self.base_delay_secs = secs;
        self
    }

    /// Overrides the settle timeout and poll interval.
    #[must_use]
    pub const fn with_settle_tuning(mut self, timeout_secs: u64, poll_secs: u64) -> Self {
        self.settle_timeout_secs = timeout_secs;
        self.settle_poll_secs = poll_secs;
        self
    }

    /// Executes an apply plan under the state lock.
    ///
    /// `baseline` is the `last_updated` stamp of the snapshot the plan was
    /// computed against, or `None` when it was computed against an empty
    /// store. The snapshot is reloaded once the lock is held and the apply
    /// aborts if the stamp moved, since the plan would then be stale.
    ///
    /// Stops at the first step that fails after retries; later actionable
    /// steps are reported as skipped. The topology hash is stamped into the
    /// snapshot only when every step completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired, the snapshot cannot
    /// be read, or the snapshot changed since planning. Step failures are
    /// reported, not returned.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        topology_hash: &str,
        baseline: Option<DateTime<Utc>>,
    ) -> Result<ApplyReport> {
        let lock = self.store.acquire_lock(&generate_holder_id()).await?;
        let result = self.execute_locked(plan, topology_hash, baseline).await;
        self.store.release_lock(&lock.lock_id).await?;
        result
    }

    async fn execute_locked(
        &self,
        plan: &ExecutionPlan,
        topology_hash: &str,
        baseline: Option<DateTime<Utc>>,
    ) -> Result<ApplyReport> {
        let mut snapshot = self.load_verified(baseline).await?;
        let mut binder = OutputBinder::seeded_from(&snapshot);

        info!(
            "Executing plan: {} step(s), {} actionable",
            plan.steps.len(),
            plan.actionable_steps().len()
        );

        let mut report = ApplyReport::default();
        let mut halted = false;

        for step in &plan.steps {
            if step.action == StepAction::NoOp {
                report.push(step, StepOutcome::Done);
                continue;
            }
            if halted {
                warn!("Skipping {} {}: earlier step failed", step.action, step.name);
                report.push(step, StepOutcome::Skipped);
                continue;
            }

            match self.execute_step(step, &mut snapshot, &mut binder).await {
                Ok(()) => report.push(step, StepOutcome::Done),
                Err(e) => {
                    error!("Step failed: {} {}: {e}", step.action, step.name);
                    report.push(step, StepOutcome::Failed(e.to_string()));
                    halted = true;
                }
            }
        }

        let resources: Vec<String> = plan
            .actionable_steps()
            .iter()
            .map(|s| s.name.clone())
            .collect();

        if report.success() {
            snapshot.topology_hash = topology_hash.to_string();
            snapshot.add_history(ApplyHistoryEntry::new(
                ApplyOperation::Apply,
                topology_hash,
                resources,
            ));
        } else {
            snapshot.add_history(ApplyHistoryEntry::failed(
                ApplyOperation::Apply,
                topology_hash,
                resources,
                &format!("{} step(s) failed", report.failed),
            ));
        }
        self.store.save(&snapshot).await?;

        info!("Apply finished: {report}");
        Ok(report)
    }

    /// Executes a teardown plan under the state lock.
    ///
    /// `baseline` carries the same stale-plan guard as [`Self::execute`].
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be acquired, the snapshot cannot
    /// be read, or the snapshot changed since planning.
    pub async fn execute_destroy(
        &self,
        plan: &ExecutionPlan,
        baseline: Option<DateTime<Utc>>,
    ) -> Result<ApplyReport> {
        let lock = self.store.acquire_lock(&generate_holder_id()).await?;
        let result = self.execute_destroy_locked(plan, baseline).await;
        self.store.release_lock(&lock.lock_id).await?;
        result
    }

    async fn execute_destroy_locked(
        &self,
        plan: &ExecutionPlan,
        baseline: Option<DateTime<Utc>>,
    ) -> Result<ApplyReport> {
        let mut snapshot = self.load_verified(baseline).await?;
        let mut binder = OutputBinder::seeded_from(&snapshot);

        info!("Destroying {} resource(s)", plan.steps.len());

        let mut report = ApplyReport::default();
        let mut halted = false;

        for step in &plan.steps {
            if halted {
                report.push(step, StepOutcome::Skipped);
                continue;
            }
            match self.execute_step(step, &mut snapshot, &mut binder).await {
                Ok(()) => report.push(step, StepOutcome::Done),
                Err(e) => {
                    error!("Delete failed for {}: {e}", step.name);
                    report.push(step, StepOutcome::Failed(e.to_string()));
                    halted = true;
                }
            }
        }

        let resources: Vec<String> = plan.steps.iter().map(|s| s.name.clone()).collect();
        let hash = snapshot.topology_hash.clone();
        if report.success() {
            snapshot.add_history(ApplyHistoryEntry::new(
                ApplyOperation::Destroy,
                &hash,
                resources,
            ));
        } else {
            snapshot.add_history(ApplyHistoryEntry::failed(
                ApplyOperation::Destroy,
                &hash,
                resources,
                &format!("{} step(s) failed", report.failed),
            ));
        }
        self.store.save(&snapshot).await?;

        info!("Destroy finished: {report}");
        Ok(report)
    }

    /// Reloads the snapshot under the lock and checks it has not moved
    /// since the plan's baseline was read.
    async fn load_verified(
        &self,
        baseline: Option<DateTime<Utc>>,
    ) -> Result<AppliedSnapshot> {
        let loaded = self.store.load().await?;
        if loaded.as_ref().map(|s| s.last_updated) != baseline {
            return Err(PlanError::Aborted {
                reason: String::from(
                    "snapshot changed since the plan was computed; run plan again",
                ),
            }
            .into());
        }
        Ok(loaded
            .unwrap_or_else(|| AppliedSnapshot::new(&self.project.name, &self.project.environment)))
    }

    /// Executes one step and commits its snapshot change.
    async fn execute_step(
        &self,
        step: &PlanStep,
        snapshot: &mut AppliedSnapshot,
        binder: &mut OutputBinder,
    ) -> Result<()> {
        debug!("Executing {} for {}", step.action, step.name);

        match &step.action {
            StepAction::Create => {
                let attrs = binder.resolve(&step.name, &step.attributes)?;
                let created = self
                    .with_retries(&step.name, || {
                        self.provider.create(step.kind, &step.name, &attrs)
                    })
                    .await?;
                let settled = self.wait_for_settle(&step.name, created).await?;

                binder.record_settled(&step.name, &settled.outputs);
                let mut record = NodeRecord::new(&step.name, step.kind, &settled.id);
                record.attributes = step.attributes.clone();
                record.outputs = settled.outputs;
                record.depends_on = step.depends_on.clone();
                // A record already present here means this create is the
                // first half of a create-then-delete replacement. The old
                // incarnation stays tracked as deposed until its delete
                // succeeds, otherwise a failed delete would leave it live
                // but forgotten.
                if let Some(prior) = snapshot.node(&step.name) {
                    record.deposed = prior.deposed.clone();
                    if !prior.provider_id.is_empty() && prior.provider_id != settled.id {
                        record.deposed.push(prior.provider_id.clone());
                    }
                }
                self.store.commit_node(&record).await?;
                snapshot.set_node(record);

                info!("Created {} ({})", step.name, settled.id);
            }
            StepAction::Update { resource_id } => {
                let attrs = binder.resolve(&step.name, &step.attributes)?;
                let updated = self
                    .with_retries(&step.name, || self.provider.update(resource_id, &attrs))
                    .await?;
                let settled = self.wait_for_settle(&step.name, updated).await?;

                binder.record_settled(&step.name, &settled.outputs);
                let mut record = snapshot
                    .node(&step.name)
                    .cloned()
                    .unwrap_or_else(|| NodeRecord::new(&step.name, step.kind, &settled.id));
                record.provider_id.clone_from(&settled.id);
                record.attributes = step.attributes.clone();
                record.outputs = settled.outputs;
                record.depends_on = step.depends_on.clone();
                record.updated_at = chrono::Utc::now();
                self.store.commit_node(&record).await?;
                snapshot.set_node(record);

                info!("Updated {} ({})", step.name, settled.id);
            }
            StepAction::Delete { resource_id } => {
                if resource_id.is_empty() {
                    debug!("No provider ID recorded for {}, dropping record", step.name);
                } else {
                    self.with_retries(&step.name, || self.provider.delete(resource_id))
                        .await?;
                }
                self.store.remove_node(&step.name).await?;
                snapshot.remove_node(&step.name);
                binder.forget(&step.name);

                info!("Deleted {}", step.name);
            }
            StepAction::RemoveReplaced { resource_id } => {
                // The record already points at the replacement
                if !resource_id.is_empty() {
                    self.with_retries(&step.name, || self.provider.delete(resource_id))
                        .await?;
                }
                if let Some(mut record) = snapshot.node(&step.name).cloned() {
                    record.deposed.retain(|id| id != resource_id);
                    self.store.commit_node(&record).await?;
                    snapshot.set_node(record);
                }
                info!("Removed replaced resource for {} ({resource_id})", step.name);
            }
            StepAction::NoOp => {}
        }

        Ok(())
    }

    /// Runs a provider call with bounded exponential backoff.
    ///
    /// Transient errors are retried after the error's suggested delay, or
    /// the doubling base delay when it has none. Permanent errors and
    /// exhausted retries fail the step.
    async fn with_retries<T, F, Fut>(&self, node: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempts < self.max_retries => {
                    attempts += 1;
                    let delay = e
                        .retry_delay_secs()
                        .unwrap_or_else(|| self.base_delay_secs << (attempts - 1));
                    warn!(
                        "Transient error on {node} (attempt {attempts}/{}): {e}; retrying in {delay}s",
                        self.max_retries
                    );
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(StratoError::Plan(PlanError::MaxRetriesExceeded {
                        attempts: attempts + 1,
                        node: node.to_string(),
                    }));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Polls the provider until a resource settles.
    async fn wait_for_settle(
        &self,
        name: &str,
        initial: CreatedResource,
    ) -> Result<CreatedResource> {
        use crate::error::ProviderError;

        let mut current = initial;
        let mut waited = 0;
        loop {
            match current.status {
                ResourceStatus::Settled => return Ok(current),
                ResourceStatus::Error => {
                    return Err(StratoError::Provider(ProviderError::ResourceErrored {
                        resource_id: current.id,
                        message: format!("resource for {name} entered error state"),
                    }));
                }
                ResourceStatus::Pending => {
                    if waited >= self.settle_timeout_secs {
                        return Err(StratoError::Provider(ProviderError::SettleTimeout {
                            resource_id: current.id,
                        }));
                    }
                    debug!("Waiting for {name} to settle ({waited}s elapsed)");
                    tokio::time::sleep(Duration::from_secs(self.settle_poll_secs)).await;
                    waited += self.settle_poll_secs;
                    let id = current.id.clone();
                    current = self
                        .with_retries(name, || self.provider.get_status(&id))
                        .await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ResourceKind, TopologyParser};
    use crate::error::ProviderError;
    use crate::graph::GraphBuilder;
    use crate::planner::{DiffEngine, PlanAssembler};
    use crate::state::LocalSnapshotStore;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Provider fake that settles everything immediately and records calls.
    struct FakeProvider {
        counter: AtomicUsize,
        calls: Mutex<Vec<String>>,
        fail_on: Option<String>,
        transient_failures: AtomicUsize,
        fail_deletes: AtomicUsize,
        never_settles: bool,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                counter: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
                fail_on: None,
                transient_failures: AtomicUsize::new(0),
                fail_deletes: AtomicUsize::new(0),
                never_settles: false,
            }
        }

        fn failing_on(name: &str) -> Self {
            Self {
                fail_on: Some(name.to_string()),
                ..Self::new()
            }
        }

        fn with_transient_failures(count: usize) -> Self {
            let p = Self::new();
            p.transient_failures.store(count, Ordering::SeqCst);
            p
        }

        fn failing_deletes(count: usize) -> Self {
            let p = Self::new();
            p.fail_deletes.store(count, Ordering::SeqCst);
            p
        }

        fn never_settling() -> Self {
            Self {
                never_settles: true,
                ..Self::new()
            }
        }

        fn pending(&self, id: &str) -> CreatedResource {
            CreatedResource {
                id: id.to_string(),
                status: ResourceStatus::Pending,
                outputs: BTreeMap::new(),
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn settled(&self, name: &str) -> CreatedResource {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            let mut outputs = BTreeMap::new();
            outputs.insert(String::from("id"), format!("res-{n}"));
            outputs.insert(String::from("endpoint"), format!("{name}.internal:3306"));
            outputs.insert(String::from("cidr"), String::from("10.0.1.0/24"));
            outputs.insert(String::from("private_ip"), String::from("10.0.1.17"));
            outputs.insert(String::from("public_ip"), String::from("198.51.100.9"));
            outputs.insert(String::from("port"), String::from("3306"));
            outputs.insert(String::from("url"), format!("https://{name}.example"));
            CreatedResource {
                id: format!("res-{n}"),
                status: ResourceStatus::Settled,
                outputs,
            }
        }
    }

    #[async_trait]
    impl CloudProvider for FakeProvider {
        async fn create(
            &self,
            _kind: ResourceKind,
            name: &str,
            attributes: &BTreeMap<String, String>,
        ) -> Result<CreatedResource> {
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StratoError::Provider(ProviderError::NetworkError {
                    message: String::from("connection reset"),
                }));
            }
            if self.fail_on.as_deref() == Some(name) {
                return Err(StratoError::Provider(ProviderError::ApiRequestFailed {
                    status: 400,
                    message: String::from("invalid attributes"),
                }));
            }
            for value in attributes.values() {
                assert!(
                    !value.contains("${"),
                    "provider saw unresolved placeholder: {value}"
                );
            }
            self.record(format!("create {name}"));
            if self.never_settles {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                return Ok(self.pending(&format!("res-{n}")));
            }
            Ok(self.settled(name))
        }

        async fn update(
            &self,
            resource_id: &str,
            _attributes: &BTreeMap<String, String>,
        ) -> Result<CreatedResource> {
            self.record(format!("update {resource_id}"));
            Ok(self.settled(resource_id))
        }

        async fn delete(&self, resource_id: &str) -> Result<()> {
            if self.fail_deletes.load(Ordering::SeqCst) > 0 {
                self.fail_deletes.fetch_sub(1, Ordering::SeqCst);
                self.record(format!("delete-failed {resource_id}"));
                return Err(StratoError::Provider(ProviderError::ApiRequestFailed {
                    status: 400,
                    message: String::from("resource is busy"),
                }));
            }
            self.record(format!("delete {resource_id}"));
            Ok(())
        }

        async fn get_status(&self, resource_id: &str) -> Result<CreatedResource> {
            self.record(format!("status {resource_id}"));
            if self.never_settles {
                return Ok(self.pending(resource_id));
            }
            Ok(self.settled(resource_id))
        }
    }

    fn project() -> ProjectConfig {
        ProjectConfig {
            name: String::from("test-stack"),
            environment: String::from("dev"),
            region: None,
        }
    }

    fn stack_yaml() -> &'static str {
        r#"
project:
  name: test-stack
state:
  backend: local
resources:
  - name: core-network
    kind: network
    attributes:
      cidr: 10.0.0.0/16
  - name: isolated-subnet
    kind: subnet
    refs:
      network: core-network
    attributes:
      tier: isolated
  - name: app-db
    kind: database-instance
    refs:
      subnet: isolated-subnet
    attributes:
      engine: mysql
      engine_version: "8.0.34"
      database_name: task_logger
  - name: logger-fn
    kind: function
    refs:
      network: core-network
    attributes:
      runtime: python3.10
      env.DB_HOST: { from: app-db, output: endpoint }
"#
    }

    fn build_plan(yaml: &str) -> (ExecutionPlan, crate::graph::DesiredStateGraph) {
        let config = TopologyParser::new().parse_yaml(yaml, None).expect("parse");
        let graph = GraphBuilder::new().build(&config).expect("graph");
        let diff = DiffEngine::new().compute_diff(&graph, None);
        let plan = PlanAssembler::new()
            .assemble(&graph, &diff, None)
            .expect("plan");
        (plan, graph)
    }

    #[tokio::test]
    async fn test_full_apply_commits_every_node() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalSnapshotStore::with_base_dir(dir.path(), "test-stack", "dev");
        let provider = FakeProvider::new();
        let project = project();
        let executor = PlanExecutor::new(&provider, &store, &project).with_base_delay_secs(0);

        let (plan, _) = build_plan(stack_yaml());
        let report = executor.execute(&plan, "hash-1", None).await.expect("execute");

        assert!(report.success());
        assert_eq!(report.done, 4);

        let snapshot = store.load().await.expect("load").expect("snapshot");
        assert_eq!(snapshot.nodes.len(), 4);
        assert_eq!(snapshot.topology_hash, "hash-1");
        assert!(snapshot.history.last().expect("history").success);

        // The function's env var was resolved from the database's output
        let record = snapshot.node("logger-fn").expect("record");
        assert_eq!(
            record.attributes.get("env.DB_HOST").map(String::as_str),
            Some("${app-db.endpoint}")
        );
    }

    #[tokio::test]
    async fn test_failure_halts_and_preserves_committed_prefix() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalSnapshotStore::with_base_dir(dir.path(), "test-stack", "dev");
        let provider = FakeProvider::failing_on("app-db");
        let project = project();
        let executor = PlanExecutor::new(&provider, &store, &project).with_base_delay_secs(0);

        let (plan, _) = build_plan(stack_yaml());
        let report = executor.execute(&plan, "hash-1", None).await.expect("execute");

        assert!(!report.success());
        assert_eq!(report.done, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert!(matches!(
            report.as_error(),
            Some(StratoError::Plan(PlanError::PartialFailure { .. }))
        ));

        // The two settled resources survive in the snapshot, the hash does not advance
        let snapshot = store.load().await.expect("load").expect("snapshot");
        assert_eq!(snapshot.nodes.len(), 2);
        assert!(snapshot.node("core-network").is_some());
        assert!(snapshot.node("isolated-subnet").is_some());
        assert!(snapshot.topology_hash.is_empty());
        assert!(!snapshot.history.last().expect("history").success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalSnapshotStore::with_base_dir(dir.path(), "test-stack", "dev");
        let provider = FakeProvider::with_transient_failures(2);
        let project = project();
        let executor = PlanExecutor::new(&provider, &store, &project).with_base_delay_secs(0);

        let (plan, _) = build_plan(stack_yaml());
        let report = executor.execute(&plan, "hash-1", None).await.expect("execute");

        assert!(report.success(), "retries should absorb transient errors");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalSnapshotStore::with_base_dir(dir.path(), "test-stack", "dev");
        let provider = FakeProvider::with_transient_failures(100);
        let project = project();
        let executor = PlanExecutor::new(&provider, &store, &project)
            .with_base_delay_secs(0)
            .with_max_retries(2);

        let (plan, _) = build_plan(stack_yaml());
        let report = executor.execute(&plan, "hash-1", None).await.expect("execute");

        assert!(!report.success());
        let failed = report
            .steps
            .iter()
            .find(|s| matches!(s.outcome, StepOutcome::Failed(_)))
            .expect("a failed step");
        match &failed.outcome {
            StepOutcome::Failed(msg) => {
                assert!(msg.contains("Maximum retry attempts (3)"), "got: {msg}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_destroy_removes_all_records() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalSnapshotStore::with_base_dir(dir.path(), "test-stack", "dev");
        let provider = FakeProvider::new();
        let project = project();
        let executor = PlanExecutor::new(&provider, &store, &project).with_base_delay_secs(0);

        let (plan, _) = build_plan(stack_yaml());
        executor.execute(&plan, "hash-1", None).await.expect("apply");

        let snapshot = store.load().await.expect("load").expect("snapshot");
        let destroy_plan = PlanAssembler::new().assemble_destroy(&snapshot);
        let report = executor
            .execute_destroy(&destroy_plan, Some(snapshot.last_updated))
            .await
            .expect("destroy");

        assert!(report.success());
        let after = store.load().await.expect("load").expect("snapshot");
        assert!(after.is_empty());

        // Dependents were deleted before their dependencies
        let calls = provider.calls.lock().unwrap();
        let deletes: Vec<&String> = calls.iter().filter(|c| c.starts_with("delete")).collect();
        assert_eq!(deletes.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_replace_delete_keeps_deposed_id() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalSnapshotStore::with_base_dir(dir.path(), "test-stack", "dev");
        let project = project();

        let provider = FakeProvider::new();
        let executor = PlanExecutor::new(&provider, &store, &project).with_base_delay_secs(0);
        let (plan, graph) = build_plan(stack_yaml());
        executor.execute(&plan, "hash-1", None).await.expect("apply");

        // Retarget the recorded reference so logger-fn classifies as a
        // create-then-delete replacement
        let mut snapshot = store.load().await.expect("load").expect("snapshot");
        if let Some(record) = snapshot.nodes.get_mut("logger-fn") {
            record.depends_on = vec![String::from("app-db")];
        }
        store.save(&snapshot).await.expect("save");
        let old_id = snapshot
            .node("logger-fn")
            .expect("record")
            .provider_id
            .clone();

        let diff = DiffEngine::new().compute_diff(&graph, Some(&snapshot));
        let replace_plan = PlanAssembler::new()
            .assemble(&graph, &diff, Some(&snapshot))
            .expect("plan");

        // The delete of the old incarnation fails after the new one is
        // already committed
        let failing = FakeProvider::failing_deletes(1);
        let executor = PlanExecutor::new(&failing, &store, &project).with_base_delay_secs(0);
        let report = executor
            .execute(&replace_plan, "hash-2", Some(snapshot.last_updated))
            .await
            .expect("execute");
        assert!(!report.success());

        // The superseded resource stays tracked on the record
        let after = store.load().await.expect("load").expect("snapshot");
        let record = after.node("logger-fn").expect("record");
        assert_ne!(record.provider_id, old_id);
        assert_eq!(record.deposed, vec![old_id.clone()]);

        // Re-planning the unchanged topology still schedules the delete
        let diff2 = DiffEngine::new().compute_diff(&graph, Some(&after));
        let retry_plan = PlanAssembler::new()
            .assemble(&graph, &diff2, Some(&after))
            .expect("plan");
        assert!(!retry_plan.is_noop());

        let retry = FakeProvider::new();
        let executor = PlanExecutor::new(&retry, &store, &project).with_base_delay_secs(0);
        let report = executor
            .execute(&retry_plan, "hash-2", Some(after.last_updated))
            .await
            .expect("execute");
        assert!(report.success());

        let settled = store.load().await.expect("load").expect("snapshot");
        assert!(settled.node("logger-fn").expect("record").deposed.is_empty());
        let calls = retry.calls.lock().unwrap();
        assert!(calls.iter().any(|c| *c == format!("delete {old_id}")));
    }

    #[tokio::test]
    async fn test_stale_plan_baseline_aborts() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalSnapshotStore::with_base_dir(dir.path(), "test-stack", "dev");
        let project = project();

        let provider = FakeProvider::new();
        let executor = PlanExecutor::new(&provider, &store, &project).with_base_delay_secs(0);
        let (plan, graph) = build_plan(stack_yaml());
        executor.execute(&plan, "hash-1", None).await.expect("apply");

        let snapshot = store.load().await.expect("load").expect("snapshot");
        let diff = DiffEngine::new().compute_diff(&graph, Some(&snapshot));
        let stale_plan = PlanAssembler::new()
            .assemble(&graph, &diff, Some(&snapshot))
            .expect("plan");

        // Another writer commits between planning and execution
        store
            .commit_node(&NodeRecord::new("intruder", ResourceKind::Network, "net-9"))
            .await
            .expect("commit");

        let bystander = FakeProvider::new();
        let executor = PlanExecutor::new(&bystander, &store, &project).with_base_delay_secs(0);
        let result = executor
            .execute(&stale_plan, "hash-1", Some(snapshot.last_updated))
            .await;

        assert!(matches!(
            result,
            Err(StratoError::Plan(PlanError::Aborted { .. }))
        ));
        assert!(bystander.calls.lock().unwrap().is_empty());
        assert!(!store.is_locked().await.expect("lock check"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_timeout_fails_step_without_recreating() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalSnapshotStore::with_base_dir(dir.path(), "test-stack", "dev");
        let provider = FakeProvider::never_settling();
        let project = project();
        let executor = PlanExecutor::new(&provider, &store, &project)
            .with_base_delay_secs(0)
            .with_settle_tuning(4, 2);

        let (plan, _) = build_plan(stack_yaml());
        let report = executor.execute(&plan, "hash-1", None).await.expect("execute");

        assert!(!report.success());
        assert_eq!(report.done, 0);
        assert_eq!(report.failed, 1);

        let failed = report
            .steps
            .iter()
            .find(|s| matches!(s.outcome, StepOutcome::Failed(_)))
            .expect("a failed step");
        match &failed.outcome {
            StepOutcome::Failed(msg) => assert!(msg.contains("settle"), "got: {msg}"),
            other => panic!("unexpected outcome: {other:?}"),
        }

        // The timeout fails the step; the create is never reissued
        let calls = provider.calls.lock().unwrap();
        let creates = calls.iter().filter(|c| c.starts_with("create")).count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_lock_released_after_apply() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalSnapshotStore::with_base_dir(dir.path(), "test-stack", "dev");
        let provider = FakeProvider::new();
        let project = project();
        let executor = PlanExecutor::new(&provider, &store, &project).with_base_delay_secs(0);

        let (plan, _) = build_plan(stack_yaml());
        executor.execute(&plan, "hash-1", None).await.expect("execute");

        assert!(!store.is_locked().await.expect("lock check"));
    }
}
