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

//! Reactions to membership and leadership changes.

use std::collections::HashMap;

use tracing::{debug, info, trace, warn};

use super::{CreationPhase, Supervisor};
use crate::cluster::{ClusterEvent, MembershipChange, NodeAddress, UniqueAddress};
use crate::common::{DeliveryFailure, MigrationPolicy, StoreError};
use crate::message::{ChildCreated, SupervisorMessage};
use crate::store::ChildLocation;
use crate::traits::BusinessObject;

impl<B: BusinessObject> Supervisor<B> {
    pub(super) fn on_cluster_event(&mut self, event: &ClusterEvent) {
        trace!("cluster event {:?}", event);
        for change in self.tracker.apply(event) {
            match change {
                MembershipChange::Joined { node, initial } => self.on_member_joined(&node, initial),
                MembershipChange::Left(node) => self.on_member_left(&node),
                MembershipChange::LeaderChanged { previous, current } => {
                    self.on_leader_changed(previous.as_ref(), current.as_ref());
                }
            }
        }
        self.unstash();
    }

    /// Brings a live joiner up to date: the leader resets it, and everyone
    /// tells it which objects they host.
    fn on_member_joined(&mut self, node: &UniqueAddress, initial: bool) {
        debug!("{} joined", node);
        if initial || *node == self.node || !self.is_ready() {
            return;
        }
        let Some(peer) = self.supervisor_at(&node.address) else {
            debug!("no supervisor registered on {} yet", node);
            return;
        };
        if self.tracker.is_leader() && peer.send(SupervisorMessage::ResetChildren).is_err() {
            debug!("supervisor on {} is gone", node);
            return;
        }
        for (id, child) in &self.local_children {
            if !child.assigned {
                continue;
            }
            let created = ChildCreated::new(id.clone(), ChildLocation::new(self.node.clone(), child.handle.path()));
            if peer.send(SupervisorMessage::ChildCreated(created)).is_err() {
                break;
            }
        }
    }

    fn on_member_left(&mut self, node: &UniqueAddress) {
        if *node == self.node {
            self.cluster_lost();
            return;
        }
        info!("{} left", node);

        let orphaned: Vec<String> = self
            .registry
            .iter()
            .filter(|(_, location)| location.node == *node)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &orphaned {
            self.registry.remove(id);
        }
        let leader = self.tracker.is_leader();
        if leader && !orphaned.is_empty() {
            warn!("{} objects lost with {}", orphaned.len(), node);
            for id in &orphaned {
                self.writer.forget(id);
            }
            self.writer.snapshot(self.registry.clone());
        }

        let stalled: Vec<(String, u32)> = self
            .pending
            .iter()
            .filter_map(|(id, pending)| match &pending.phase {
                CreationPhase::AwaitingChild { target, attempt } if target == node => Some((id.clone(), *attempt)),
                _ => None,
            })
            .collect();
        for (id, attempt) in stalled {
            self.creation_failed(&id, attempt, "target node left the cluster");
        }

        if leader {
            self.migrate(orphaned);
        }
    }

    /// Recreates orphaned objects right away when migration is eager.
    fn migrate(&mut self, orphaned: Vec<String>) {
        if self.config.migration != MigrationPolicy::Eager {
            return;
        }
        for id in orphaned {
            if self.pending.contains_key(&id) || self.local_children.contains_key(&id) {
                continue;
            }
            info!("migrating {}", id);
            self.begin_creation(id, None);
        }
    }

    fn on_leader_changed(&mut self, previous: Option<&NodeAddress>, current: Option<&NodeAddress>) {
        let here = &self.node.address;
        let was_leader = previous == Some(here);
        let is_leader = current == Some(here);
        match current {
            Some(leader) => info!("role leader is now {}", leader),
            None => warn!("role has no leader, holding messages until one is elected"),
        }
        if was_leader && !is_leader {
            self.leadership_lost(current.cloned());
        }
        if is_leader && !was_leader {
            info!("this node is the role leader");
            self.load_registry(true);
        }
    }

    /// Hands queued messages to the new leader and drops our locks.
    fn leadership_lost(&mut self, leader: Option<NodeAddress>) {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            info!("handing {} pending creations to the new leader", pending.len());
        }
        for (id, creation) in pending {
            if creation.lock_held {
                self.writer.release_lock(&id);
            }
            for envelope in creation.queue {
                match &leader {
                    Some(leader) => self.forward(leader, envelope),
                    None => self.stash.push_back(SupervisorMessage::Deliver(envelope)),
                }
            }
        }
    }

    /// This node was removed: drop hosted objects and everything in flight.
    fn cluster_lost(&mut self) {
        warn!("this node is no longer a cluster member");
        self.reset_children();
        self.fail_pending(|id| DeliveryFailure::ClusterUnavailable { id: id.to_string() });
        self.registry.clear();
        self.tracker.reset();
    }

    pub(super) fn on_registry_loaded(
        &mut self,
        outcome: Result<HashMap<String, ChildLocation>, StoreError>,
        merge: bool,
    ) {
        match outcome {
            Ok(children) if merge => self.merge_registry(children),
            Ok(children) => {
                debug!("loaded {} object locations", children.len());
                for (id, location) in children {
                    self.registry.entry(id).or_insert(location);
                }
            }
            Err(e) => warn!("could not load object locations, starting without them: {}", e),
        }
        if !merge {
            self.registry_loaded = true;
            self.unstash();
        }
    }

    /// Adopts the stored registry after becoming leader. Entries on departed
    /// nodes are dropped and, with eager migration, recreated.
    fn merge_registry(&mut self, children: HashMap<String, ChildLocation>) {
        if !self.tracker.is_leader() {
            return;
        }
        let mut orphaned = Vec::new();
        for (id, location) in children {
            if self.registry.contains_key(&id) {
                continue;
            }
            let alive = if location.node == self.node {
                self.local_children.contains_key(&id)
            } else {
                self.tracker.is_member(&location.node)
            };
            if alive {
                self.registry.insert(id, location);
            } else {
                orphaned.push(id);
            }
        }
        debug!("registry merged, {} known objects, {} orphaned", self.registry.len(), orphaned.len());
        for id in &orphaned {
            self.writer.forget(id);
        }
        self.writer.snapshot(self.registry.clone());
        self.migrate(orphaned);
    }
}
