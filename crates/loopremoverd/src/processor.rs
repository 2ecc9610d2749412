//! Topology event processing.
//!
//! Link notifications are queued into a single pending-work slot and a single
//! worker task drains it. The worker debounces bursts: the first event starts
//! the refresh delay, and events arriving while the delay runs push it back
//! (up to `max_reschedules` times) instead of starting a second timer. Events
//! that arrive while a refresh is running are kept for exactly one further
//! refresh.
//!
//! ```text
//!   Idle --event--> RefreshScheduled --delay--> Refreshing --ok--> Idle
//!                     ^    |event: push back       |
//!                     |    +-----------------------+ event during refresh
//!                     +---------------------------- or commit failure
//! ```

use crate::config::LoopRemoverConfig;
use crate::error::{LoopRemoverError, Result, StoreError};
use crate::graph::LinkGraph;
use crate::port_status::PortStatusResolver;
use crate::types::{Link, LinkEvent, PortRef};
use crate::writer::PersistentStateWriter;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Processor state as seen from outside the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessorState {
    #[default]
    Idle,
    RefreshScheduled,
    Refreshing,
}

/// Processor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Events accepted into the pending slot.
    pub events_received: u64,
    /// Events dropped because they carried no inter-switch link.
    pub events_ignored: u64,
    /// Refreshes whose commit succeeded.
    pub refreshes: u64,
    /// Refreshes whose commit failed.
    pub failed_refreshes: u64,
    /// Times a pending refresh was pushed back by a new event.
    pub reschedules: u64,
    /// Port records written across all refreshes.
    pub ports_written: u64,
}

/// Processor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub refresh_delay: Duration,
    pub max_reschedules: u32,
    pub host_link_marker: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from(&LoopRemoverConfig::default())
    }
}

impl From<&LoopRemoverConfig> for ProcessorConfig {
    fn from(config: &LoopRemoverConfig) -> Self {
        Self {
            refresh_delay: config.graph_refresh_delay(),
            max_reschedules: config.topology.max_reschedules,
            host_link_marker: config.topology.host_link_marker.clone(),
        }
    }
}

#[derive(Debug)]
enum LinkOp {
    Add(Vec<Link>),
    Remove(Vec<Link>),
}

#[derive(Debug, Default)]
struct PendingWork {
    /// Graph changes in arrival order.
    ops: Vec<LinkOp>,
    /// An event arrived since the worker last took the slot.
    queued: bool,
    reschedule_requested: bool,
    state: ProcessorState,
}

impl PendingWork {
    fn mark_queued(&mut self) {
        if self.state == ProcessorState::RefreshScheduled {
            self.reschedule_requested = true;
        }
        self.queued = true;
    }
}

struct Shared {
    config: ProcessorConfig,
    pending: Mutex<PendingWork>,
    wake: Notify,
    stats: Mutex<ProcessorStats>,
    state_tx: watch::Sender<ProcessorState>,
}

impl Shared {
    fn set_state(&self, pending: &mut PendingWork, state: ProcessorState) {
        pending.state = state;
        self.state_tx.send_replace(state);
    }
}

/// Handle to the background refresh worker.
pub struct TopologyEventProcessor {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TopologyEventProcessor {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(
        config: ProcessorConfig,
        graph: Arc<LinkGraph>,
        writer: PersistentStateWriter,
    ) -> Self {
        let (state_tx, _) = watch::channel(ProcessorState::Idle);
        let shared = Arc::new(Shared {
            config,
            pending: Mutex::new(PendingWork::default()),
            wake: Notify::new(),
            stats: Mutex::new(ProcessorStats::default()),
            state_tx,
        });
        let cancel = CancellationToken::new();

        let worker = Worker {
            shared: Arc::clone(&shared),
            graph,
            writer,
            resolver: PortStatusResolver::new(),
            forced_discards: BTreeSet::new(),
            reconciled: false,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Self {
            shared,
            cancel,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queues a link event. Never blocks on the graph or the store.
    ///
    /// Host links are dropped first; an event left empty is counted as
    /// ignored and changes nothing.
    pub fn submit(&self, event: LinkEvent) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LoopRemoverError::Shutdown);
        }

        let event = event.without_host_links(&self.shared.config.host_link_marker);
        if event.is_empty() {
            debug!("Ignoring link event without inter-switch links");
            self.shared.stats.lock().events_ignored += 1;
            return Ok(());
        }

        debug!(
            created = event.created.len(),
            removed = event.removed.len(),
            "Queued link event"
        );
        {
            let mut pending = self.shared.pending.lock();
            // Removals first so a link id reported with new endpoints in
            // the same event ends up with the new ones.
            if !event.removed.is_empty() {
                pending.ops.push(LinkOp::Remove(event.removed));
            }
            if !event.created.is_empty() {
                pending.ops.push(LinkOp::Add(event.created));
            }
            pending.mark_queued();
        }
        self.shared.stats.lock().events_received += 1;
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Schedules a refresh without a topology change, as if an empty event
    /// had arrived. The first refresh also reconciles records left by a
    /// previous run, so the daemon requests one at startup.
    pub fn request_refresh(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(LoopRemoverError::Shutdown);
        }
        self.shared.pending.lock().mark_queued();
        self.shared.wake.notify_one();
        Ok(())
    }

    pub fn state(&self) -> ProcessorState {
        *self.shared.state_tx.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ProcessorState> {
        self.shared.state_tx.subscribe()
    }

    pub fn stats(&self) -> ProcessorStats {
        *self.shared.stats.lock()
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// A commit already in flight completes first. Queued events that were
    /// not yet refreshed are dropped.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Topology worker terminated abnormally");
            }
        }
    }
}

impl Drop for TopologyEventProcessor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    shared: Arc<Shared>,
    graph: Arc<LinkGraph>,
    writer: PersistentStateWriter,
    resolver: PortStatusResolver,
    /// Endpoints of removed links not yet committed as Discarding.
    forced_discards: BTreeSet<PortRef>,
    /// Records left by a previous run have been folded into
    /// `forced_discards`.
    reconciled: bool,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        info!(
            delay_ms = self.shared.config.refresh_delay.as_millis() as u64,
            "Topology worker started"
        );

        let mut scheduled = false;
        loop {
            if !scheduled && !self.wait_for_work().await {
                break;
            }
            if !self.debounce().await {
                break;
            }
            let ops = self.take_work();
            let committed = self.refresh(ops).await;
            scheduled = self.finish_refresh(committed);
        }

        let dropped = self.shared.pending.lock().ops.len();
        info!(dropped, "Topology worker stopped");
    }

    /// Waits in Idle until an event is queued. Returns false on shutdown.
    async fn wait_for_work(&self) -> bool {
        loop {
            {
                let mut pending = self.shared.pending.lock();
                if pending.queued {
                    self.shared
                        .set_state(&mut pending, ProcessorState::RefreshScheduled);
                    return true;
                }
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = self.shared.wake.notified() => {}
            }
        }
    }

    /// Sleeps out the refresh delay, extending it while new events keep
    /// arriving. Returns false on shutdown.
    async fn debounce(&self) -> bool {
        let mut reschedules = 0;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.shared.config.refresh_delay) => {}
            }

            let mut pending = self.shared.pending.lock();
            if pending.reschedule_requested && reschedules < self.shared.config.max_reschedules {
                pending.reschedule_requested = false;
                reschedules += 1;
                self.shared.stats.lock().reschedules += 1;
                debug!(reschedules, "Topology changed again, pushing refresh back");
                continue;
            }
            return true;
        }
    }

    fn take_work(&self) -> Vec<LinkOp> {
        let mut pending = self.shared.pending.lock();
        pending.queued = false;
        pending.reschedule_requested = false;
        self.shared.set_state(&mut pending, ProcessorState::Refreshing);
        std::mem::take(&mut pending.ops)
    }

    /// Applies queued changes, recomputes and commits. Returns true if the
    /// commit succeeded.
    #[instrument(skip_all, fields(ops = ops.len()))]
    async fn refresh(&mut self, ops: Vec<LinkOp>) -> bool {
        for op in ops {
            match op {
                LinkOp::Add(links) => {
                    let added = self.graph.add_links(&links);
                    debug!(requested = links.len(), added, "Added links");
                }
                LinkOp::Remove(links) => {
                    for link in &links {
                        self.forced_discards.extend(link.endpoints());
                    }
                    let removed = self.graph.remove_links(&links);
                    debug!(requested = links.len(), removed, "Removed links");
                }
            }
        }

        let snapshot = self.graph.snapshot();
        debug_assert!(
            snapshot.forest.verify().is_ok(),
            "spanning forest invariant broken"
        );
        if !self.reconciled {
            if let Err(e) = self.reconcile(&snapshot.links).await {
                self.shared.stats.lock().failed_refreshes += 1;
                warn!(error = %e, "Failed to read recorded port statuses, rescheduling");
                return false;
            }
        }

        let statuses = self.resolver.resolve(&snapshot.links, &snapshot.forest);
        let statuses = self
            .resolver
            .with_forced_discards(statuses, &self.forced_discards);

        match self.writer.write(&statuses).await {
            Ok(report) => {
                self.forced_discards.clear();
                let mut stats = self.shared.stats.lock();
                stats.refreshes += 1;
                stats.ports_written += report.written as u64;
                info!(
                    links = snapshot.links.len(),
                    tree_links = snapshot.forest.link_count(),
                    written = report.written,
                    "Topology refreshed"
                );
                true
            }
            Err(e) => {
                self.shared.stats.lock().failed_refreshes += 1;
                warn!(
                    error = %e,
                    forced_discards = self.forced_discards.len(),
                    "Topology refresh failed, rescheduling"
                );
                false
            }
        }
    }

    /// Forces Discarding on every recorded Forwarding port that no current
    /// link terminates. Such records outlive removals that were never
    /// refreshed, e.g. across a restart.
    async fn reconcile(&mut self, links: &[Link]) -> std::result::Result<(), StoreError> {
        let recorded = self.writer.recorded_statuses().await?;
        let terminated: BTreeSet<PortRef> = links.iter().flat_map(Link::endpoints).collect();

        let before = self.forced_discards.len();
        self.forced_discards.extend(
            recorded
                .into_iter()
                .filter(|(port, status)| status.is_forwarding() && !terminated.contains(port))
                .map(|(port, _)| port),
        );
        let stale = self.forced_discards.len() - before;
        if stale > 0 {
            info!(stale, "Discarding ports recorded by a previous run");
        }
        self.reconciled = true;
        Ok(())
    }

    /// Leaves Refreshing. Returns true if another refresh is due.
    fn finish_refresh(&self, committed: bool) -> bool {
        let mut pending = self.shared.pending.lock();
        let again = pending.queued || !committed;
        let next = if again {
            ProcessorState::RefreshScheduled
        } else {
            ProcessorState::Idle
        };
        self.shared.set_state(&mut pending, next);
        again
    }
}
