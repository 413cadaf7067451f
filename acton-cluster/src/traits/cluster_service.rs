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

use std::fmt::Debug;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::actor::SupervisorHandle;
use crate::cluster::{ClusterEvent, NodeAddress, UniqueAddress};
use crate::traits::ObjectMessage;

/// Cluster membership, leader election and node addressing, as consumed by a
/// supervisor.
pub trait ClusterService<M: ObjectMessage>: Debug + Send + Sync + 'static {
    /// The node this service runs on.
    fn self_address(&self) -> UniqueAddress;

    /// Subscribes to membership and leader events.
    ///
    /// The first event delivered must be a
    /// [`ClusterEvent::CurrentClusterState`] snapshot.
    fn subscribe(&self) -> UnboundedReceiver<ClusterEvent>;

    /// The supervisor running at `address`, if it is reachable.
    fn supervisor_at(&self, address: &NodeAddress) -> Option<SupervisorHandle<M>>;

    /// Makes the local supervisor reachable by other nodes.
    fn register(&self, handle: SupervisorHandle<M>);
}
