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

//! Cluster membership: node addresses, membership events, the per-role state
//! tracker, and an in-process membership service.

pub use address::{NodeAddress, UniqueAddress};
pub use event::{ClusterEvent, CurrentClusterState};
pub use local::{LocalCluster, LocalNode};
pub use member::{Member, MemberStatus};
pub use tracker::{ClusterStateTracker, MembershipChange};

/// Defines node addresses.
mod address;
/// Defines membership events.
mod event;
/// Defines the in-process membership service.
mod local;
/// Defines cluster members.
mod member;
/// Defines the role membership tracker.
mod tracker;
