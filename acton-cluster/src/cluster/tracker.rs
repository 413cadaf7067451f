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

//! Per-role view of cluster membership.
//!
//! The tracker is plain state: the supervisor feeds it every [`ClusterEvent`]
//! and reacts to the [`MembershipChange`]s it reports.

use std::collections::BTreeSet;

use tracing::trace;

use crate::cluster::{ClusterEvent, Member, MemberStatus, NodeAddress, UniqueAddress};

/// Effect of a cluster event on the tracked role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    /// A node with the role became a member. `initial` is set for members
    /// learned from a snapshot rather than from a live join.
    Joined {
        /// The node.
        node: UniqueAddress,
        /// Learned from a snapshot.
        initial: bool,
    },
    /// A node with the role left.
    Left(UniqueAddress),
    /// The role leader changed.
    LeaderChanged {
        /// Leader before the event.
        previous: Option<NodeAddress>,
        /// Leader after the event.
        current: Option<NodeAddress>,
    },
}

/// Ordered set of live members carrying one role, plus that role's leader.
#[derive(Debug, Clone)]
pub struct ClusterStateTracker {
    role: String,
    self_node: UniqueAddress,
    /// (join order, node)
    members: BTreeSet<(u64, UniqueAddress)>,
    leader: Option<NodeAddress>,
    snapshot_seen: bool,
    leader_seen: bool,
}

impl ClusterStateTracker {
    /// Creates an empty tracker for `role` as seen from `self_node`.
    pub fn new(role: impl Into<String>, self_node: UniqueAddress) -> Self {
        Self {
            role: role.into(),
            self_node,
            members: BTreeSet::new(),
            leader: None,
            snapshot_seen: false,
            leader_seen: false,
        }
    }

    /// Applies an event and reports what changed for this role.
    pub fn apply(&mut self, event: &ClusterEvent) -> Vec<MembershipChange> {
        let mut changes = Vec::new();
        match event {
            ClusterEvent::CurrentClusterState(state) => {
                self.snapshot_seen = true;
                let live: Vec<&Member> = state
                    .members
                    .iter()
                    .filter(|m| m.status == MemberStatus::Up && m.has_role(&self.role))
                    .collect();

                let gone: Vec<UniqueAddress> = self
                    .members
                    .iter()
                    .filter(|(_, node)| !live.iter().any(|m| &m.unique_address == node))
                    .map(|(_, node)| node.clone())
                    .collect();
                for node in gone {
                    self.remove(&node);
                    changes.push(MembershipChange::Left(node));
                }
                for member in live {
                    if self.insert(member) {
                        changes.push(MembershipChange::Joined {
                            node: member.unique_address.clone(),
                            initial: true,
                        });
                    }
                }
                if let Some(leader) = state.role_leader(&self.role) {
                    changes.extend(self.set_leader(Some(leader.clone())));
                }
            }
            ClusterEvent::MemberUp(member) if member.has_role(&self.role) => {
                if self.insert(member) {
                    changes.push(MembershipChange::Joined {
                        node: member.unique_address.clone(),
                        initial: !self.snapshot_seen,
                    });
                }
            }
            ClusterEvent::MemberRemoved(member) | ClusterEvent::MemberDowned(member)
                if member.has_role(&self.role) =>
            {
                if self.remove(&member.unique_address) {
                    changes.push(MembershipChange::Left(member.unique_address.clone()));
                }
            }
            ClusterEvent::RoleLeaderChanged { role, leader } if role == &self.role => {
                changes.extend(self.set_leader(leader.clone()));
            }
            other => trace!(role = %self.role, "ignoring cluster event {:?}", other),
        }
        changes
    }

    fn insert(&mut self, member: &Member) -> bool {
        if self.is_member(&member.unique_address) {
            return false;
        }
        self.members
            .insert((member.up_number, member.unique_address.clone()))
    }

    fn remove(&mut self, node: &UniqueAddress) -> bool {
        let before = self.members.len();
        self.members.retain(|(_, member)| member != node);
        self.members.len() != before
    }

    fn set_leader(&mut self, leader: Option<NodeAddress>) -> Option<MembershipChange> {
        self.leader_seen = true;
        if self.leader == leader {
            return None;
        }
        let previous = std::mem::replace(&mut self.leader, leader.clone());
        Some(MembershipChange::LeaderChanged {
            previous,
            current: leader,
        })
    }

    /// Forgets everything; the tracker is uninitialized again.
    pub fn reset(&mut self) {
        self.members.clear();
        self.leader = None;
        self.snapshot_seen = false;
        self.leader_seen = false;
    }

    /// Both a snapshot and a leader announcement have been seen.
    pub const fn is_initialized(&self) -> bool {
        self.snapshot_seen && self.leader_seen
    }

    /// Initialized and the role currently has a leader.
    pub const fn is_operational(&self) -> bool {
        self.is_initialized() && self.leader.is_some()
    }

    /// Whether this node leads the role.
    pub fn is_leader(&self) -> bool {
        self.leader.as_ref() == Some(&self.self_node.address)
    }

    /// Current role leader.
    pub const fn leader(&self) -> Option<&NodeAddress> {
        self.leader.as_ref()
    }

    /// Whether `node` is a live member with the role.
    pub fn is_member(&self, node: &UniqueAddress) -> bool {
        self.members.iter().any(|(_, member)| member == node)
    }

    /// Live members in join order.
    pub fn members(&self) -> Vec<UniqueAddress> {
        self.members.iter().map(|(_, node)| node.clone()).collect()
    }

    /// The node this tracker runs on.
    pub const fn self_node(&self) -> &UniqueAddress {
        &self.self_node
    }

    /// Tracked role.
    pub fn role(&self) -> &str {
        &self.role
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::cluster::CurrentClusterState;

    fn node(port: u16, uid: u64) -> UniqueAddress {
        UniqueAddress::new(NodeAddress::new("127.0.0.1", port), uid)
    }

    fn snapshot(members: Vec<Member>, leader: Option<NodeAddress>) -> ClusterEvent {
        let mut role_leaders = HashMap::new();
        if let Some(leader) = leader {
            role_leaders.insert("orders".to_string(), leader);
        }
        ClusterEvent::CurrentClusterState(CurrentClusterState {
            members,
            role_leaders,
        })
    }

    #[test]
    fn needs_snapshot_and_leader_before_initialized() {
        let me = node(1, 1);
        let mut tracker = ClusterStateTracker::new("orders", me.clone());
        tracker.apply(&snapshot(vec![Member::up(me.clone(), ["orders"], 1)], None));
        assert!(!tracker.is_initialized());

        let changes = tracker.apply(&ClusterEvent::RoleLeaderChanged {
            role: "orders".into(),
            leader: Some(me.address.clone()),
        });
        assert!(tracker.is_initialized());
        assert!(tracker.is_leader());
        assert_eq!(
            changes,
            vec![MembershipChange::LeaderChanged {
                previous: None,
                current: Some(me.address.clone())
            }]
        );
    }

    #[test]
    fn snapshot_keeps_only_up_members_with_role() {
        let me = node(1, 1);
        let other_role = node(2, 1);
        let joining = node(3, 1);
        let peer = node(4, 1);
        let mut tracker = ClusterStateTracker::new("orders", me.clone());

        let mut joining_member = Member::up(joining, ["orders"], 3);
        joining_member.status = MemberStatus::Joining;
        tracker.apply(&snapshot(
            vec![
                Member::up(peer.clone(), ["orders"], 4),
                Member::up(me.clone(), ["orders"], 1),
                Member::up(other_role, ["billing"], 2),
                joining_member,
            ],
            Some(me.address.clone()),
        ));

        assert_eq!(tracker.members(), vec![me, peer]);
        assert!(tracker.is_operational());
    }

    #[test]
    fn removal_matches_incarnation() {
        let me = node(1, 1);
        let old = node(2, 1);
        let rejoined = node(2, 2);
        let mut tracker = ClusterStateTracker::new("orders", me.clone());
        tracker.apply(&snapshot(
            vec![Member::up(me, ["orders"], 1), Member::up(old.clone(), ["orders"], 2)],
            None,
        ));
        let joined = tracker.apply(&ClusterEvent::MemberUp(Member::up(
            rejoined.clone(),
            ["orders"],
            3,
        )));
        assert_eq!(
            joined,
            vec![MembershipChange::Joined {
                node: rejoined.clone(),
                initial: false
            }]
        );

        let left = tracker.apply(&ClusterEvent::MemberRemoved(
            Member::up(old.clone(), ["orders"], 2).with_status(MemberStatus::Removed),
        ));
        assert_eq!(left, vec![MembershipChange::Left(old.clone())]);
        assert!(!tracker.is_member(&old));
        assert!(tracker.is_member(&rejoined));
    }

    #[test]
    fn null_leader_is_not_operational() {
        let me = node(1, 1);
        let mut tracker = ClusterStateTracker::new("orders", me.clone());
        tracker.apply(&snapshot(
            vec![Member::up(me.clone(), ["orders"], 1)],
            Some(me.address.clone()),
        ));
        assert!(tracker.is_operational());

        tracker.apply(&ClusterEvent::RoleLeaderChanged {
            role: "orders".into(),
            leader: None,
        });
        assert!(tracker.is_initialized());
        assert!(!tracker.is_operational());
        assert!(!tracker.is_leader());
    }

    #[test]
    fn other_roles_are_ignored() {
        let me = node(1, 1);
        let mut tracker = ClusterStateTracker::new("orders", me);
        let changes = tracker.apply(&ClusterEvent::RoleLeaderChanged {
            role: "billing".into(),
            leader: Some(NodeAddress::new("127.0.0.1", 9)),
        });
        assert!(changes.is_empty());
        assert!(tracker.leader().is_none());
    }
}
