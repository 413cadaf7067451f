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

use std::collections::HashMap;

use crate::cluster::{Member, NodeAddress};

/// Snapshot of the cluster handed to every new subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentClusterState {
    /// All known members, in any status.
    pub members: Vec<Member>,
    /// Leader per role, for roles that currently have one.
    pub role_leaders: HashMap<String, NodeAddress>,
}

impl CurrentClusterState {
    /// Leader of `role`, if any.
    pub fn role_leader(&self, role: &str) -> Option<&NodeAddress> {
        self.role_leaders.get(role)
    }
}

/// Membership and leadership events published by a
/// [`ClusterService`](crate::prelude::ClusterService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    /// Full snapshot; always the first event of a subscription.
    CurrentClusterState(CurrentClusterState),
    /// A member reached `Up`.
    MemberUp(Member),
    /// A member was removed.
    MemberRemoved(Member),
    /// A member was marked down.
    MemberDowned(Member),
    /// The leader of a role changed; `None` means the role has no eligible member.
    RoleLeaderChanged {
        /// Role whose leader changed.
        role: String,
        /// New leader.
        leader: Option<NodeAddress>,
    },
}
