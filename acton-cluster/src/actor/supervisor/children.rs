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

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, info, trace, warn};

use super::{LocalChild, Supervisor};
use crate::actor::{ObjectActor, TerminationReason};
use crate::message::{
    ChildCreated, ChildRemoved, CreateChildCommand, SetObjectId, Step, StopChild, SupervisorMessage,
};
use crate::cluster::UniqueAddress;
use crate::store::{ChildLocation, KeySpace};
use crate::traits::BusinessObject;

impl<B: BusinessObject> Supervisor<B> {
    /// Starts an object actor for the commanded identity, unless one runs here already.
    pub(super) fn on_create_child(&mut self, command: CreateChildCommand) {
        let CreateChildCommand { id, requested_by } = command;
        if let Some(child) = self.local_children.get(&id) {
            if child.assigned {
                debug!("{} already runs here, announcing it again", id);
                self.announce(&id);
            }
            return;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        let path = format!("{}/{}", self.config.name, KeySpace::safe_id(&id));
        info!("creating object actor {} for {} as asked by {}", path, id, requested_by);

        let (handle, actor) = ObjectActor::new(
            path,
            self.factory.clone(),
            self.config.object_restart_policy,
            self.cancellation_token.child_token(),
        );
        let (assignment, assigned) = SetObjectId::new(id.clone());
        if !handle.assign(assignment) {
            warn!("object actor for {} closed before assignment", id);
        }

        let owner = self.handle.clone();
        let watched = id.clone();
        self.tasks.spawn(async move {
            let reason = match AssertUnwindSafe(actor.run()).catch_unwind().await {
                Ok(reason) => reason,
                Err(payload) => TerminationReason::from_panic(payload.as_ref()),
            };
            let step = Step::ChildTerminated {
                id: watched,
                generation,
                reason,
            };
            if owner.send(step.into_message()).is_err() {
                trace!("supervisor gone before object actor stopped");
            }
        });

        let timeout = self.config.create_child_timeout;
        let assigning = id.clone();
        self.spawn_continuation(async move {
            let assigned = matches!(tokio::time::timeout(timeout, assigned).await, Ok(Ok(_)));
            Step::ChildAssigned {
                id: assigning,
                generation,
                assigned,
            }
        });

        self.local_children.insert(
            id,
            LocalChild {
                handle,
                generation,
                assigned: false,
            },
        );
    }

    pub(super) fn on_child_assigned(&mut self, id: &str, generation: u64, assigned: bool) {
        let Some(child) = self.local_children.get_mut(id) else {
            return;
        };
        if child.generation != generation {
            return;
        }
        if !assigned {
            warn!("object actor for {} did not take its identity in time, stopping it", id);
            child.handle.stop();
            return;
        }
        child.assigned = true;
        self.announce(id);
    }

    /// Tells every member where the hosted object for `id` runs.
    fn announce(&mut self, id: &str) {
        let Some(child) = self.local_children.get(id) else {
            return;
        };
        let created = ChildCreated::new(
            id.to_string(),
            ChildLocation::new(self.node.clone(), child.handle.path()),
        );
        self.broadcast(|| SupervisorMessage::ChildCreated(created.clone()));
    }

    pub(super) fn on_child_terminated(&mut self, id: &str, generation: u64, reason: &TerminationReason) {
        if !self
            .local_children
            .get(id)
            .is_some_and(|child| child.generation == generation)
        {
            trace!("ignoring stop of an earlier object actor for {}", id);
            return;
        }
        info!("object actor for {} stopped: {}", id, reason);
        self.forget_local_child(id);
    }

    /// Records a location announced by the hosting node.
    ///
    /// The leader keeps the first live location it learns of. A later
    /// announcement from another node is a duplicate left behind by a
    /// creation attempt that timed out, and that node is told to stop it.
    pub(super) fn on_child_created(&mut self, created: ChildCreated) {
        let ChildCreated { id, location } = created;
        if location.node == self.node {
            if !self.local_children.contains_key(&id) {
                debug!("ignoring announcement for {}, which no longer runs here", id);
                return;
            }
        } else if !self.tracker.is_member(&location.node) {
            debug!("ignoring announcement for {} from non-member {}", id, location.node);
            return;
        }

        if self.tracker.is_leader() {
            if let Some(current) = self.registry.get(&id) {
                if current.node != location.node && self.is_hosted_at(&id, &current.node) {
                    warn!("{} already runs at {}, stopping the copy at {}", id, current, location.node);
                    self.retire_duplicate(&id, location.node);
                    return;
                }
            }
        }

        debug!("{} runs at {}", id, location);
        let previous = self.registry.insert(id.clone(), location.clone());
        if self.tracker.is_leader() {
            if previous.as_ref() != Some(&location) {
                self.writer.record(&id, location);
                self.writer.snapshot(self.registry.clone());
            }
            self.complete_creation(&id);
        }
    }

    /// Whether `node` is still in a position to host `id`.
    fn is_hosted_at(&self, id: &str, node: &UniqueAddress) -> bool {
        if node == &self.node {
            self.local_children.contains_key(id)
        } else {
            self.tracker.is_member(node)
        }
    }

    fn retire_duplicate(&mut self, id: &str, node: UniqueAddress) {
        let stop = StopChild::new(id.to_string(), node);
        if stop.node == self.node {
            self.on_stop_child(&stop);
            return;
        }
        match self.supervisor_at(&stop.node.address) {
            Some(peer) if peer.node() == &stop.node => {
                if peer.send(SupervisorMessage::StopChild(stop)).is_err() {
                    debug!("supervisor hosting the duplicate of {} is gone", id);
                }
            }
            _ => debug!("no supervisor on {} to stop the duplicate of {}", stop.node, id),
        }
    }

    pub(super) fn on_stop_child(&mut self, stop: &StopChild) {
        if stop.node != self.node || !self.local_children.contains_key(&stop.id) {
            trace!("nothing to stop for {}", stop.id);
            return;
        }
        info!("stopping {}, which the leader found running elsewhere", stop.id);
        self.forget_local_child(&stop.id);
    }

    pub(super) fn on_child_removed(&mut self, removed: &ChildRemoved) {
        let Some(location) = self.registry.get(&removed.id).cloned() else {
            return;
        };
        if location.node == removed.node {
            debug!("{} no longer runs at {}", removed.id, location);
            self.drop_location(&removed.id, &location);
        }
    }

    /// Stops every hosted object; sent by the leader when this node (re)joins.
    pub(super) fn reset_children(&mut self) {
        if self.local_children.is_empty() {
            return;
        }
        info!("resetting {} hosted objects", self.local_children.len());
        let ids: Vec<String> = self.local_children.keys().cloned().collect();
        for id in ids {
            self.forget_local_child(&id);
        }
    }
}
