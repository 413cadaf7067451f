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

use tracing::{debug, trace, warn};

use super::Supervisor;
use crate::cluster::NodeAddress;
use crate::common::DeliveryFailure;
use crate::message::{ChildRemoved, RoutingEnvelope, Step, SupervisorMessage};
use crate::store::ChildLocation;
use crate::traits::BusinessObject;

impl<B: BusinessObject> Supervisor<B> {
    pub(super) fn on_deliver(&mut self, envelope: RoutingEnvelope<B::Message>) {
        if self.is_ready() {
            self.route(envelope);
        } else {
            trace!("not ready, stashing message for {}", envelope.object_id());
            self.stash.push_back(SupervisorMessage::Deliver(envelope));
        }
    }

    pub(super) fn on_redeliver(&mut self, envelope: RoutingEnvelope<B::Message>) {
        if envelope.attempt() >= self.config.max_delivery_attempts {
            let failure = DeliveryFailure::Unreachable {
                id: envelope.object_id().to_string(),
                attempts: envelope.attempt(),
            };
            warn!("{}", failure);
            envelope.fail(failure);
            return;
        }
        debug!(
            "re-routing message for {} (attempt {})",
            envelope.object_id(),
            envelope.attempt() + 1
        );
        self.on_deliver(envelope);
    }

    /// Sends a business message on its way: to a creation queue, a hosted
    /// object, the owning node or the leader.
    pub(super) fn route(&mut self, envelope: RoutingEnvelope<B::Message>) {
        let id = envelope.object_id().to_string();
        if id.trim().is_empty() {
            warn!("dropping message with an empty object identity");
            envelope.fail(DeliveryFailure::InvalidIdentity);
            return;
        }
        if envelope.hops() >= self.config.max_forward_hops {
            let failure = DeliveryFailure::TooManyHops {
                id,
                hops: envelope.hops(),
            };
            warn!("{}", failure);
            envelope.fail(failure);
            return;
        }

        if let Some(pending) = self.pending.get_mut(&id) {
            trace!("creation of {} in flight, queueing", id);
            pending.queue.push_back(envelope);
            return;
        }

        let Some(envelope) = self.deliver_locally(&id, envelope) else {
            return;
        };

        if self.tracker.is_leader() {
            match self.live_location(&id) {
                Some(location) => self.forward(&location.node.address, envelope),
                None => self.begin_creation(id, Some(envelope)),
            }
        } else {
            match self.tracker.leader().cloned() {
                Some(leader) => self.forward(&leader, envelope),
                None => {
                    trace!("no leader, stashing message for {}", id);
                    self.stash.push_back(SupervisorMessage::Deliver(envelope));
                }
            }
        }
    }

    /// Hands the envelope to a hosted object. Gives it back when there is none.
    fn deliver_locally(
        &mut self,
        id: &str,
        envelope: RoutingEnvelope<B::Message>,
    ) -> Option<RoutingEnvelope<B::Message>> {
        let Some(child) = self.local_children.get(id) else {
            return Some(envelope);
        };
        match child.handle.deliver(envelope) {
            Ok(()) => {
                trace!("delivered {} to {}", id, child.handle.path());
                None
            }
            Err(returned) => {
                warn!("object actor for {} is gone", id);
                self.forget_local_child(id);
                returned
            }
        }
    }

    /// Location of `id` if it points at a live member. Stale entries are
    /// dropped on the way.
    fn live_location(&mut self, id: &str) -> Option<ChildLocation> {
        let location = self.registry.get(id)?.clone();
        if location.node == self.node {
            warn!("registry places {} here but no object runs on this node", id);
        } else if !self.tracker.is_member(&location.node) {
            warn!("registry places {} on {}, which is no longer a member", id, location.node);
        } else {
            return Some(location);
        }
        self.drop_location(id, &location);
        None
    }

    /// Removes `id` from the registry if it still points at `location`.
    pub(super) fn drop_location(&mut self, id: &str, location: &ChildLocation) {
        if self.registry.get(id).is_some_and(|current| current.node == location.node) {
            self.registry.remove(id);
            if self.tracker.is_leader() {
                self.writer.forget(id);
                self.writer.snapshot(self.registry.clone());
            }
        }
    }

    /// Stops tracking a hosted object and tells the cluster it is gone.
    pub(super) fn forget_local_child(&mut self, id: &str) {
        if let Some(child) = self.local_children.remove(id) {
            child.handle.stop();
        }
        let id = id.to_string();
        let node = self.node.clone();
        self.broadcast(|| SupervisorMessage::ChildRemoved(ChildRemoved::new(id.clone(), node.clone())));
    }

    /// Forwards through the delivery pool, or re-tries later when nobody
    /// answers at `address`.
    pub(super) fn forward(&mut self, address: &NodeAddress, envelope: RoutingEnvelope<B::Message>) {
        match self.supervisor_at(address) {
            Some(target) => {
                trace!("forwarding message for {} to {}", envelope.object_id(), address);
                self.delivery.dispatch(target, envelope.forwarded());
            }
            None => {
                warn!("no supervisor reachable at {}", address);
                self.schedule(self.config.next_attempt_pause, Step::Redeliver(envelope.retried()));
            }
        }
    }
}
