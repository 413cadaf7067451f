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

use tokio::sync::oneshot;

use crate::actor::TerminationReason;
use crate::cluster::{ClusterEvent, NodeAddress, UniqueAddress};
use crate::common::StoreError;
use crate::message::{
    Acknowledge, ChildCreated, ChildRemoved, CreateChildCommand, RoutingEnvelope, StopChild,
};
use crate::store::ChildLocation;
use crate::traits::ObjectMessage;

/// Everything a supervisor's inbox accepts.
#[derive(Debug)]
pub enum SupervisorMessage<M: ObjectMessage> {
    /// A business message from a local caller.
    Deliver(RoutingEnvelope<M>),
    /// A business message forwarded by another supervisor. Must be acknowledged.
    Routed {
        /// The forwarded message.
        envelope: RoutingEnvelope<M>,
        /// Receipt for the forwarding supervisor.
        ack: Acknowledge,
    },
    /// Create the object for an identity on this node.
    CreateChild(CreateChildCommand),
    /// An object now runs at the given location.
    ChildCreated(ChildCreated),
    /// An object stopped.
    ChildRemoved(ChildRemoved),
    /// Stop a hosted object that duplicates one running elsewhere.
    StopChild(StopChild),
    /// Stop every object hosted on this node.
    ResetChildren,
    /// Membership or leadership changed.
    Cluster(ClusterEvent),
    /// Report the supervisor's current state.
    Status(oneshot::Sender<SupervisorStatus>),
    /// Stop the supervisor.
    Stop,
    /// Continuation of work the supervisor started itself.
    Internal(Continuation<M>),
}

impl<M: ObjectMessage> SupervisorMessage<M> {
    /// The business message carried, if any. Acknowledges forwarded ones.
    pub(crate) fn into_envelope(self) -> Option<RoutingEnvelope<M>> {
        match self {
            Self::Deliver(envelope) | Self::Internal(Continuation(Step::Redeliver(envelope))) => Some(envelope),
            Self::Routed { envelope, ack } => {
                ack.ack();
                Some(envelope)
            }
            _ => None,
        }
    }
}

/// Completion of asynchronous work, posted back into the supervisor's inbox.
#[derive(Debug)]
pub struct Continuation<M: ObjectMessage>(pub(crate) Step<M>);

#[derive(Debug)]
pub(crate) enum Step<M: ObjectMessage> {
    RegistryLoaded {
        outcome: Result<HashMap<String, ChildLocation>, StoreError>,
        merge: bool,
    },
    LockResult {
        id: String,
        outcome: Result<bool, StoreError>,
    },
    RetryLock {
        id: String,
    },
    RetryCreation {
        id: String,
    },
    CreationTimedOut {
        id: String,
        attempt: u32,
    },
    ChildAssigned {
        id: String,
        generation: u64,
        assigned: bool,
    },
    ChildTerminated {
        id: String,
        generation: u64,
        reason: TerminationReason,
    },
    Redeliver(RoutingEnvelope<M>),
}

impl<M: ObjectMessage> Step<M> {
    pub(crate) fn into_message(self) -> SupervisorMessage<M> {
        SupervisorMessage::Internal(Continuation(self))
    }
}

/// Point-in-time view of a supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
    /// Node the supervisor runs on.
    pub node: UniqueAddress,
    /// Cluster role it serves.
    pub role: String,
    /// Current role leader.
    pub leader: Option<NodeAddress>,
    /// Whether this node is the leader.
    pub is_leader: bool,
    /// Whether business messages are being processed rather than stashed.
    pub is_ready: bool,
    /// Live members with the role, in join order.
    pub members: Vec<UniqueAddress>,
    /// Known object locations.
    pub children: HashMap<String, ChildLocation>,
    /// Identities hosted on this node.
    pub local_children: Vec<String>,
    /// Identities with a creation in flight.
    pub pending_creations: Vec<String>,
    /// Messages waiting for readiness.
    pub stashed: usize,
}
