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

//! In-process membership service.
//!
//! [`LocalCluster`] plays the role of the cluster membership and leader
//! election service for nodes living in one process: tests, demos and
//! single-host deployments. Leadership is never computed here; callers
//! announce it with [`LocalCluster::elect`], the way an external election
//! service would.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument};

use crate::actor::SupervisorHandle;
use crate::cluster::{ClusterEvent, CurrentClusterState, Member, MemberStatus, NodeAddress, UniqueAddress};
use crate::traits::{ClusterService, ObjectMessage};

#[derive(Default)]
struct HubState {
    members: Vec<Member>,
    role_leaders: HashMap<String, NodeAddress>,
    next_up_number: u64,
    subscribers: Vec<UnboundedSender<ClusterEvent>>,
}

impl HubState {
    fn snapshot(&self) -> CurrentClusterState {
        CurrentClusterState {
            members: self.members.clone(),
            role_leaders: self.role_leaders.clone(),
        }
    }

    fn publish(&mut self, event: &ClusterEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

struct Hub<M: ObjectMessage> {
    state: Mutex<HubState>,
    supervisors: DashMap<NodeAddress, SupervisorHandle<M>>,
}

/// An in-process cluster shared by every node that holds a clone.
pub struct LocalCluster<M: ObjectMessage> {
    hub: Arc<Hub<M>>,
}

impl<M: ObjectMessage> Clone for LocalCluster<M> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
        }
    }
}

impl<M: ObjectMessage> Default for LocalCluster<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ObjectMessage> fmt::Debug for LocalCluster<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("LocalCluster")
            .field("members", &state.members.len())
            .field("role_leaders", &state.role_leaders)
            .field("supervisors", &self.hub.supervisors.len())
            .finish()
    }
}

impl<M: ObjectMessage> LocalCluster<M> {
    /// Creates an empty cluster.
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Hub {
                state: Mutex::new(HubState::default()),
                supervisors: DashMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.hub.state.lock()
    }

    /// View of the cluster from `node`, usable as that node's [`ClusterService`].
    pub fn node(&self, node: UniqueAddress) -> LocalNode<M> {
        LocalNode {
            cluster: self.clone(),
            node,
        }
    }

    /// Brings `node` up with `roles` and publishes `MemberUp`.
    #[instrument(skip(self, roles))]
    pub fn join<I, S>(&self, node: UniqueAddress, roles: I) -> Member
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state();
        state.next_up_number += 1;
        let member = Member::up(node, roles, state.next_up_number);
        state
            .members
            .retain(|m| m.unique_address != member.unique_address);
        state.members.push(member.clone());
        info!("member up {}", member.unique_address);
        state.publish(&ClusterEvent::MemberUp(member.clone()));
        member
    }

    /// Removes `node` and publishes `MemberRemoved`.
    ///
    /// The node's supervisor stops being addressable. Leadership is left
    /// untouched; announce a new leader with [`elect`](Self::elect).
    #[instrument(skip(self))]
    pub fn remove(&self, node: &UniqueAddress) -> Option<Member> {
        self.depart(node, MemberStatus::Removed)
    }

    /// Marks `node` down and publishes `MemberDowned`.
    #[instrument(skip(self))]
    pub fn down(&self, node: &UniqueAddress) -> Option<Member> {
        self.depart(node, MemberStatus::Down)
    }

    fn depart(&self, node: &UniqueAddress, status: MemberStatus) -> Option<Member> {
        let mut state = self.state();
        let position = state
            .members
            .iter()
            .position(|m| &m.unique_address == node)?;
        let member = state.members.remove(position).with_status(status);
        self.hub
            .supervisors
            .remove_if(&node.address, |_, handle| handle.node() == node);
        info!("member {} is {:?}", node, status);
        let event = if status == MemberStatus::Down {
            ClusterEvent::MemberDowned(member.clone())
        } else {
            ClusterEvent::MemberRemoved(member.clone())
        };
        state.publish(&event);
        Some(member)
    }

    /// Announces `leader` as leader of `role`; `None` means the role has no leader.
    #[instrument(skip(self))]
    pub fn elect(&self, role: &str, leader: Option<NodeAddress>) {
        let mut state = self.state();
        match &leader {
            Some(address) => {
                state.role_leaders.insert(role.to_string(), address.clone());
            }
            None => {
                state.role_leaders.remove(role);
            }
        }
        info!("role {} leader is now {:?}", role, leader);
        state.publish(&ClusterEvent::RoleLeaderChanged {
            role: role.to_string(),
            leader,
        });
    }

    /// Makes `handle` addressable at its node's address.
    ///
    /// Supervisors register themselves on start; tests register stand-ins here.
    pub fn register(&self, handle: SupervisorHandle<M>) {
        debug!("registering supervisor at {}", handle.node());
        self.hub
            .supervisors
            .insert(handle.node().address.clone(), handle);
    }

    /// Supervisor addressable at `address`, if any.
    pub fn supervisor_at(&self, address: &NodeAddress) -> Option<SupervisorHandle<M>> {
        self.hub
            .supervisors
            .get(address)
            .map(|entry| entry.value().clone())
    }

    /// Subscribes to events. The first event is always a snapshot.
    pub fn subscribe(&self) -> UnboundedReceiver<ClusterEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state();
        let snapshot = ClusterEvent::CurrentClusterState(state.snapshot());
        if sender.send(snapshot).is_ok() {
            state.subscribers.push(sender);
        }
        receiver
    }

    /// Current membership snapshot.
    pub fn current_state(&self) -> CurrentClusterState {
        self.state().snapshot()
    }
}

/// One node's view of a [`LocalCluster`].
pub struct LocalNode<M: ObjectMessage> {
    cluster: LocalCluster<M>,
    node: UniqueAddress,
}

impl<M: ObjectMessage> fmt::Debug for LocalNode<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNode").field("node", &self.node).finish()
    }
}

impl<M: ObjectMessage> ClusterService<M> for LocalNode<M> {
    fn self_address(&self) -> UniqueAddress {
        self.node.clone()
    }

    fn subscribe(&self) -> UnboundedReceiver<ClusterEvent> {
        self.cluster.subscribe()
    }

    fn supervisor_at(&self, address: &NodeAddress) -> Option<SupervisorHandle<M>> {
        self.cluster.supervisor_at(address)
    }

    fn register(&self, handle: SupervisorHandle<M>) {
        self.cluster.register(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[object_message]
    struct Ping {
        id: String,
    }

    fn node(port: u16) -> UniqueAddress {
        UniqueAddress::new(NodeAddress::new("127.0.0.1", port), 1)
    }

    #[tokio::test]
    async fn subscription_starts_with_snapshot() {
        let cluster = LocalCluster::<Ping>::new();
        cluster.join(node(1), ["orders"]);
        cluster.elect("orders", Some(node(1).address));

        let mut events = cluster.subscribe();
        let Some(ClusterEvent::CurrentClusterState(state)) = events.recv().await else {
            panic!("expected a snapshot first");
        };
        assert_eq!(state.members.len(), 1);
        assert_eq!(state.role_leader("orders"), Some(&node(1).address));

        cluster.join(node(2), ["orders"]);
        assert!(matches!(events.recv().await, Some(ClusterEvent::MemberUp(m)) if m.unique_address == node(2)));
    }

    #[tokio::test]
    async fn removed_node_is_no_longer_addressable() {
        let cluster = LocalCluster::<Ping>::new();
        cluster.join(node(1), ["orders"]);
        let (handle, _inbox) = SupervisorHandle::channel(node(1));
        cluster.register(handle);
        assert!(cluster.supervisor_at(&node(1).address).is_some());

        let removed = cluster.remove(&node(1)).expect("member existed");
        assert_eq!(removed.status, MemberStatus::Removed);
        assert!(cluster.supervisor_at(&node(1).address).is_none());
        assert!(cluster.remove(&node(1)).is_none());
    }
}
