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

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cluster::UniqueAddress;

/// Lifecycle status of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Joining, not yet routable.
    Joining,
    /// Fully up.
    Up,
    /// Leaving gracefully.
    Leaving,
    /// Marked down by the failure detector or an operator.
    Down,
    /// Gone from the cluster.
    Removed,
}

/// A node as seen by the membership service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Node identity.
    pub unique_address: UniqueAddress,
    /// Current status.
    pub status: MemberStatus,
    /// Roles the node carries.
    pub roles: BTreeSet<String>,
    /// Join order; lower numbers joined earlier.
    pub up_number: u64,
}

impl Member {
    /// Creates an `Up` member carrying `roles`.
    pub fn up<I, S>(unique_address: UniqueAddress, roles: I, up_number: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            unique_address,
            status: MemberStatus::Up,
            roles: roles.into_iter().map(Into::into).collect(),
            up_number,
        }
    }

    /// Whether the member carries `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Copy of this member with a different status.
    #[must_use]
    pub fn with_status(&self, status: MemberStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}
