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

//! Leader-side creation protocol.
//!
//! A creation takes the identity's creation lock, asks the chosen node to
//! create the object, and waits for that node's `ChildCreated`. Messages
//! for the identity queue up meanwhile and are routed in order once the
//! object is known. A held lock is re-tried after a pause; a creation that
//! times out is re-tried with growing pauses. Both give up after their
//! configured limits and fail the queued messages.

use tracing::{debug, error, info, warn};

use super::{CreationPhase, PendingCreation, Supervisor};
use crate::common::{DeliveryFailure, StoreError};
use crate::message::{CreateChildCommand, RoutingEnvelope, Step, SupervisorMessage};
use crate::traits::BusinessObject;

impl<B: BusinessObject> Supervisor<B> {
    pub(super) fn begin_creation(&mut self, id: String, first: Option<RoutingEnvelope<B::Message>>) {
        info!("creating object {}", id);
        let mut pending = PendingCreation::new();
        pending.queue.extend(first);
        self.pending.insert(id.clone(), pending);
        self.acquire_lock(&id);
    }

    fn acquire_lock(&mut self, id: &str) {
        let Some(pending) = self.pending.get_mut(id) else {
            return;
        };
        pending.phase = CreationPhase::AcquiringLock;
        let lock = self.lock.clone();
        let holder = self.node.to_string();
        let id = id.to_string();
        self.spawn_continuation(async move {
            let outcome = lock.try_acquire(&id, &holder).await;
            Step::LockResult { id, outcome }
        });
    }

    pub(super) fn on_lock_result(&mut self, id: String, outcome: Result<bool, StoreError>) {
        let acquiring = self
            .pending
            .get(&id)
            .is_some_and(|pending| pending.phase == CreationPhase::AcquiringLock);
        if !acquiring {
            if matches!(outcome, Ok(true)) {
                debug!("creation of {} settled while locking, releasing", id);
                self.writer.release_lock(&id);
            }
            return;
        }
        match outcome {
            Ok(true) => {
                if let Some(pending) = self.pending.get_mut(&id) {
                    pending.lock_held = true;
                }
                self.request_child(&id);
            }
            Ok(false) => self.wait_for_lock(&id, "held by another creation"),
            Err(e) => self.wait_for_lock(&id, &e.to_string()),
        }
    }

    fn wait_for_lock(&mut self, id: &str, why: &str) {
        let Some(pending) = self.pending.get_mut(id) else {
            return;
        };
        pending.lock_waits += 1;
        let waits = pending.lock_waits;
        if waits >= self.config.max_lock_waits {
            warn!("giving up on creation lock for {} after {} waits ({})", id, waits, why);
            self.abandon(
                id,
                &DeliveryFailure::CreationLockBlocked {
                    id: id.to_string(),
                    waits,
                },
            );
            return;
        }
        pending.phase = CreationPhase::WaitingForLock;
        debug!("creation lock for {} unavailable ({}), waiting", id, why);
        self.schedule(
            self.config.next_attempt_pause,
            Step::RetryLock { id: id.to_string() },
        );
    }

    pub(super) fn on_retry_lock(&mut self, id: &str) {
        if self
            .pending
            .get(id)
            .is_some_and(|pending| pending.phase == CreationPhase::WaitingForLock)
        {
            self.acquire_lock(id);
        }
    }

    pub(super) fn on_retry_creation(&mut self, id: &str) {
        if self
            .pending
            .get(id)
            .is_some_and(|pending| pending.phase == CreationPhase::BackingOff)
        {
            self.acquire_lock(id);
        }
    }

    /// Picks a node and orders the creation there.
    fn request_child(&mut self, id: &str) {
        let members = self.tracker.members();
        let mut target = self.placement.select_node(id, &members, &self.node);
        if target != self.node && !self.tracker.is_member(&target) {
            warn!("placement chose {} which is not a member, creating {} here", target, id);
            target = self.node.clone();
        }

        let Some(pending) = self.pending.get_mut(id) else {
            return;
        };
        pending.attempts += 1;
        let attempt = pending.attempts;
        pending.phase = CreationPhase::AwaitingChild {
            target: target.clone(),
            attempt,
        };
        info!("ordering creation of {} on {} (attempt {})", id, target, attempt);
        self.schedule(
            self.config.create_child_timeout,
            Step::CreationTimedOut {
                id: id.to_string(),
                attempt,
            },
        );

        let command = CreateChildCommand::new(id.to_string(), self.node.clone());
        if target == self.node {
            self.on_create_child(command);
            return;
        }
        match self.supervisor_at(&target.address) {
            Some(peer) if peer.node() == &target => {
                if peer.send(SupervisorMessage::CreateChild(command)).is_err() {
                    self.creation_failed(id, attempt, "target supervisor stopped");
                }
            }
            _ => self.creation_failed(id, attempt, "target supervisor unreachable"),
        }
    }

    /// Releases the lock and schedules another attempt, or gives up.
    /// Ignored unless `attempt` is the attempt currently awaited.
    pub(super) fn creation_failed(&mut self, id: &str, attempt: u32, why: &str) {
        let Some(pending) = self.pending.get_mut(id) else {
            return;
        };
        match &pending.phase {
            CreationPhase::AwaitingChild { attempt: current, .. } if *current == attempt => {}
            _ => return,
        }
        if pending.lock_held {
            pending.lock_held = false;
            self.writer.release_lock(id);
        }
        let attempts = pending.attempts;
        if attempts >= self.config.max_creation_attempts {
            error!("creation of {} failed {} times, last: {}", id, attempts, why);
            self.abandon(
                id,
                &DeliveryFailure::CreationExhausted {
                    id: id.to_string(),
                    attempts,
                },
            );
            return;
        }
        pending.phase = CreationPhase::BackingOff;
        let pause = self.config.creation_backoff(attempts - 1);
        warn!("creation of {} failed ({}), retrying in {:?}", id, why, pause);
        self.schedule(pause, Step::RetryCreation { id: id.to_string() });
    }

    /// Drops the creation and fails every queued message with `failure`.
    fn abandon(&mut self, id: &str, failure: &DeliveryFailure) {
        let Some(pending) = self.pending.remove(id) else {
            return;
        };
        if pending.lock_held {
            self.writer.release_lock(id);
        }
        for envelope in pending.queue {
            envelope.fail(failure.clone());
        }
    }

    /// The object for `id` exists: release the lock and route what queued up.
    pub(super) fn complete_creation(&mut self, id: &str) {
        let Some(pending) = self.pending.remove(id) else {
            return;
        };
        if pending.lock_held {
            self.writer.release_lock(id);
        }
        info!("object {} is up, routing {} queued messages", id, pending.queue.len());
        for envelope in pending.queue {
            self.route(envelope);
        }
    }
}
