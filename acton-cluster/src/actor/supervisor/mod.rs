/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Cluster-aware supervisor of business objects.
//!
//! One supervisor runs per node for a role. Together they keep at most one
//! live object per identity across the cluster:
//!
//! * the role leader owns the identity-to-location registry and is the only
//!   supervisor that starts creations, guarded by a creation lock in the
//!   shared store;
//! * every other supervisor delivers to objects it hosts and forwards the
//!   rest to the leader;
//! * forwards travel through a pool of delivery workers and are retried
//!   until acknowledged or out of attempts.
//!
//! The supervisor handles one message at a time. Everything that waits on
//! the store or a timer runs as a spawned task whose result comes back
//! through the inbox as a continuation, so its state is only ever touched
//! from the message loop.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, trace, warn};

pub use config::SupervisorConfig;
pub use handle::SupervisorHandle;

use crate::actor::placement::LocalPlacement;
use crate::actor::{DeliveryPool, ObjectHandle, RestartLimiter, TerminationReason};
use crate::cluster::{ClusterStateTracker, NodeAddress, UniqueAddress};
use crate::common::{DeliveryFailure, SupervisorInbox};
use crate::message::{Continuation, RoutingEnvelope, Step, SupervisorMessage, SupervisorStatus};
use crate::store::{ChildLocation, CreationLock, DirectoryWriter, KeySpace, ObjectDirectory};
use crate::traits::{
    BusinessObject, ClusterService, KeyValueStore, ObjectFactory, ObjectMessage, PlacementStrategy,
};

mod children;
mod config;
mod creation;
mod handle;
mod membership;
mod routing;

/// An object actor hosted on this node.
#[derive(Debug)]
struct LocalChild<M: ObjectMessage> {
    handle: ObjectHandle<M>,
    generation: u64,
    assigned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CreationPhase {
    AcquiringLock,
    WaitingForLock,
    AwaitingChild { target: UniqueAddress, attempt: u32 },
    BackingOff,
}

/// A creation in flight and the messages waiting for it.
#[derive(Debug)]
struct PendingCreation<M: ObjectMessage> {
    queue: VecDeque<RoutingEnvelope<M>>,
    phase: CreationPhase,
    lock_held: bool,
    lock_waits: u32,
    attempts: u32,
}

impl<M: ObjectMessage> PendingCreation<M> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            phase: CreationPhase::AcquiringLock,
            lock_held: false,
            lock_waits: 0,
            attempts: 0,
        }
    }
}

/// Configures and starts a supervisor.
///
/// ```rust,ignore
/// let handle = SupervisorBuilder::new(config, cluster, store, |id: &str| Account::new(id))
///     .with_placement(RoundRobinPlacement::default())
///     .start();
/// ```
pub struct SupervisorBuilder<B: BusinessObject> {
    config: SupervisorConfig,
    cluster: Arc<dyn ClusterService<B::Message>>,
    store: Arc<dyn KeyValueStore>,
    factory: Arc<dyn ObjectFactory<B>>,
    placement: Arc<dyn PlacementStrategy>,
}

impl<B: BusinessObject> std::fmt::Debug for SupervisorBuilder<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorBuilder")
            .field("config", &self.config)
            .field("cluster", &self.cluster)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl<B: BusinessObject> SupervisorBuilder<B> {
    /// A supervisor with local placement.
    pub fn new(
        config: SupervisorConfig,
        cluster: Arc<dyn ClusterService<B::Message>>,
        store: Arc<dyn KeyValueStore>,
        factory: impl ObjectFactory<B>,
    ) -> Self {
        Self {
            config,
            cluster,
            store,
            factory: Arc::new(factory),
            placement: Arc::new(LocalPlacement),
        }
    }

    /// Chooses where the leader creates new objects.
    #[must_use]
    pub fn with_placement(mut self, placement: impl PlacementStrategy) -> Self {
        self.placement = Arc::new(placement);
        self
    }

    /// Spawns the supervisor, registers it with the cluster service and
    /// returns its handle. Must be called inside a Tokio runtime.
    pub fn start(self) -> SupervisorHandle<B::Message> {
        let Self {
            config,
            cluster,
            store,
            factory,
            placement,
        } = self;
        let node = cluster.self_address();
        let lifecycle = TaskTracker::new();
        let (handle, inbox) = SupervisorHandle::with_lifecycle(node.clone(), lifecycle.clone());

        let keys = KeySpace::new(&config.key_prefix, &config.name);
        let lock = CreationLock::new(store.clone(), keys.clone(), Some(config.create_child_timeout));
        let directory = ObjectDirectory::new(store, keys, config.role.clone());

        let tasks = TaskTracker::new();
        let cancellation_token = CancellationToken::new();
        let writer = DirectoryWriter::spawn(directory.clone(), lock.clone(), &tasks, cancellation_token.clone());
        let delivery = DeliveryPool::spawn(
            config.senders_count,
            handle.clone(),
            config.send_timeout,
            config.next_attempt_pause,
            &tasks,
            cancellation_token.clone(),
        );

        cluster.register(handle.clone());
        let supervisor = Supervisor {
            tracker: ClusterStateTracker::new(config.role.clone(), node.clone()),
            restart_limiter: RestartLimiter::new(config.restart_limiter.clone()),
            session: cancellation_token.child_token(),
            config,
            node,
            handle: handle.clone(),
            inbox,
            cluster,
            factory,
            placement,
            lock,
            directory,
            writer,
            delivery,
            registry: HashMap::new(),
            local_children: HashMap::new(),
            pending: HashMap::new(),
            stash: VecDeque::new(),
            registry_loaded: false,
            next_generation: 0,
            tasks,
            cancellation_token,
        };
        info!("starting supervisor {} on {}", supervisor.config.name, supervisor.node);
        lifecycle.spawn(supervisor.run());
        lifecycle.close();
        handle
    }
}

/// State of a running supervisor. Only reachable through its
/// [`SupervisorHandle`].
struct Supervisor<B: BusinessObject> {
    config: SupervisorConfig,
    node: UniqueAddress,
    handle: SupervisorHandle<B::Message>,
    inbox: SupervisorInbox<B::Message>,
    cluster: Arc<dyn ClusterService<B::Message>>,
    factory: Arc<dyn ObjectFactory<B>>,
    placement: Arc<dyn PlacementStrategy>,
    lock: CreationLock,
    directory: ObjectDirectory,
    writer: DirectoryWriter,
    delivery: DeliveryPool<B::Message>,
    tracker: ClusterStateTracker,
    /// Last known location of every object, leader's view authoritative.
    registry: HashMap<String, ChildLocation>,
    local_children: HashMap<String, LocalChild<B::Message>>,
    pending: HashMap<String, PendingCreation<B::Message>>,
    /// Messages held back until the supervisor is ready.
    stash: VecDeque<SupervisorMessage<B::Message>>,
    registry_loaded: bool,
    next_generation: u64,
    restart_limiter: RestartLimiter,
    tasks: TaskTracker,
    /// Whole lifetime; children hang off it.
    cancellation_token: CancellationToken,
    /// One incarnation; replaced on restart.
    session: CancellationToken,
}

impl<B: BusinessObject> Supervisor<B> {
    #[instrument(skip(self), fields(supervisor = %self.config.name, node = %self.node))]
    async fn run(mut self) {
        self.pre_start();
        let cancel_token = self.cancellation_token.clone();
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    trace!("cancellation token triggered");
                    break;
                }
                incoming = self.inbox.recv() => {
                    let Some(message) = incoming else {
                        trace!("inbox closed");
                        break;
                    };
                    if matches!(message, SupervisorMessage::Stop) {
                        trace!("stop requested");
                        break;
                    }
                    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(message)));
                    if let Err(payload) = outcome {
                        let reason = TerminationReason::from_panic(payload.as_ref());
                        if !self.restart(reason).await {
                            break;
                        }
                    }
                }
            }
        }
        self.shutdown().await;
    }

    /// Subscribes to the cluster and loads the registry. Runs on start and
    /// after every restart.
    fn pre_start(&mut self) {
        self.cluster.register(self.handle.clone());

        let mut events = self.cluster.subscribe();
        let owner = self.handle.clone();
        let token = self.session.clone();
        self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        if owner.send(SupervisorMessage::Cluster(event)).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        self.load_registry(false);
    }

    fn load_registry(&self, merge: bool) {
        let directory = self.directory.clone();
        self.spawn_continuation(async move {
            let outcome = directory.get_all_children().await;
            Step::RegistryLoaded { outcome, merge }
        });
    }

    /// Handles one message. Panics escaping from here restart the supervisor.
    fn dispatch(&mut self, message: SupervisorMessage<B::Message>) {
        match message {
            SupervisorMessage::Deliver(envelope) => self.on_deliver(envelope),
            SupervisorMessage::Routed { envelope, ack } => {
                ack.ack();
                self.on_deliver(envelope);
            }
            SupervisorMessage::Status(reply) => {
                if reply.send(self.status()).is_err() {
                    trace!("status requester went away");
                }
            }
            SupervisorMessage::Cluster(event) => self.on_cluster_event(&event),
            SupervisorMessage::StopChild(stop) => self.on_stop_child(&stop),
            SupervisorMessage::ResetChildren => self.reset_children(),
            SupervisorMessage::Stop => {}
            SupervisorMessage::Internal(Continuation(step)) => self.on_step(step),
            message if !self.is_ready() => {
                trace!("not ready, stashing {:?}", message);
                self.stash.push_back(message);
            }
            SupervisorMessage::CreateChild(command) => self.on_create_child(command),
            SupervisorMessage::ChildCreated(created) => self.on_child_created(created),
            SupervisorMessage::ChildRemoved(removed) => self.on_child_removed(&removed),
        }
    }

    fn on_step(&mut self, step: Step<B::Message>) {
        match step {
            Step::RegistryLoaded { outcome, merge } => self.on_registry_loaded(outcome, merge),
            Step::LockResult { id, outcome } => self.on_lock_result(id, outcome),
            Step::RetryLock { id } => self.on_retry_lock(&id),
            Step::RetryCreation { id } => self.on_retry_creation(&id),
            Step::CreationTimedOut { id, attempt } => {
                self.creation_failed(&id, attempt, "no ChildCreated within the creation timeout");
            }
            Step::ChildAssigned {
                id,
                generation,
                assigned,
            } => self.on_child_assigned(&id, generation, assigned),
            Step::ChildTerminated { id, generation, reason } => self.on_child_terminated(&id, generation, &reason),
            Step::Redeliver(envelope) => self.on_redeliver(envelope),
        }
    }

    /// Ready once the cluster view has a leader and the registry is loaded.
    fn is_ready(&self) -> bool {
        self.registry_loaded && self.tracker.is_operational()
    }

    /// Replays stashed messages in arrival order once ready.
    fn unstash(&mut self) {
        if !self.is_ready() || self.stash.is_empty() {
            return;
        }
        let stashed = std::mem::take(&mut self.stash);
        debug!("ready, replaying {} stashed messages", stashed.len());
        for message in stashed {
            self.dispatch(message);
        }
    }

    /// Runs `work` in the background and feeds its result back into the inbox.
    /// Dropped if the supervisor restarts first.
    fn spawn_continuation<F>(&self, work: F)
    where
        F: Future<Output = Step<B::Message>> + Send + 'static,
    {
        let owner = self.handle.clone();
        let token = self.session.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                step = work => {
                    if owner.send(step.into_message()).is_err() {
                        trace!("supervisor gone before continuation completed");
                    }
                }
            }
        });
    }

    fn schedule(&self, delay: Duration, step: Step<B::Message>) {
        self.spawn_continuation(async move {
            tokio::time::sleep(delay).await;
            step
        });
    }

    fn supervisor_at(&self, address: &NodeAddress) -> Option<SupervisorHandle<B::Message>> {
        self.cluster.supervisor_at(address)
    }

    /// Sends a message to every member's supervisor, handling our own copy inline.
    fn broadcast(&mut self, message: impl Fn() -> SupervisorMessage<B::Message>) {
        for member in self.tracker.members() {
            if member == self.node {
                continue;
            }
            match self.supervisor_at(&member.address) {
                Some(peer) => {
                    if peer.send(message()).is_err() {
                        debug!("supervisor on {} is gone", member);
                    }
                }
                None => debug!("no supervisor registered on {}", member),
            }
        }
        self.dispatch(message());
    }

    fn status(&self) -> SupervisorStatus {
        let mut local_children: Vec<String> = self.local_children.keys().cloned().collect();
        local_children.sort();
        let mut pending_creations: Vec<String> = self.pending.keys().cloned().collect();
        pending_creations.sort();
        SupervisorStatus {
            node: self.node.clone(),
            role: self.config.role.clone(),
            leader: self.tracker.leader().cloned(),
            is_leader: self.tracker.is_leader(),
            is_ready: self.is_ready(),
            members: self.tracker.members(),
            children: self.registry.clone(),
            local_children,
            pending_creations,
            stashed: self.stash.len(),
        }
    }

    /// Fails every pending creation's messages and releases the locks it held.
    fn fail_pending(&mut self, failure: impl Fn(&str) -> DeliveryFailure) {
        for (id, pending) in std::mem::take(&mut self.pending) {
            if pending.lock_held {
                self.writer.release_lock(&id);
            }
            for envelope in pending.queue {
                envelope.fail(failure(&id));
            }
        }
    }

    /// Recovers from a panic in a handler. Hosted objects and the registry
    /// survive; in-flight creations are failed and the cluster view is rebuilt.
    async fn restart(&mut self, reason: TerminationReason) -> bool {
        if let Err(exceeded) = self.restart_limiter.can_restart() {
            error!("supervisor {} will not restart after {}: {}", self.config.name, reason, exceeded);
            return false;
        }
        let backoff = self.restart_limiter.record_restart();
        error!("supervisor {} crashed ({}), restarting in {:?}", self.config.name, reason, backoff);

        self.fail_pending(|id| DeliveryFailure::SupervisorRestarted { id: id.to_string() });
        self.session.cancel();
        if !backoff.is_zero() {
            tokio::select! {
                () = self.cancellation_token.cancelled() => return false,
                () = tokio::time::sleep(backoff) => {}
            }
        }

        self.session = self.cancellation_token.child_token();
        self.tracker.reset();
        self.registry_loaded = false;
        self.pre_start();
        true
    }

    async fn shutdown(&mut self) {
        info!("stopping supervisor {} on {}", self.config.name, self.node);
        for child in self.local_children.values() {
            child.handle.stop();
        }
        self.fail_pending(|id| DeliveryFailure::SupervisorStopped { id: id.to_string() });
        self.inbox.close();
        let mut unhandled: Vec<_> = std::mem::take(&mut self.stash).into_iter().collect();
        while let Ok(message) = self.inbox.try_recv() {
            unhandled.push(message);
        }
        for envelope in unhandled.into_iter().filter_map(SupervisorMessage::into_envelope) {
            let failure = DeliveryFailure::SupervisorStopped {
                id: envelope.object_id().to_string(),
            };
            envelope.fail(failure);
        }
        self.cancellation_token.cancel();
        self.tasks.close();
        if tokio::time::timeout(self.config.shutdown_timeout, self.tasks.wait())
            .await
            .is_err()
        {
            warn!("supervisor {} tasks did not finish within {:?}", self.config.name, self.config.shutdown_timeout);
        }
    }
}
