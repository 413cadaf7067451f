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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Acton Cluster
//!
//! Supervision of business objects across a cluster. Every business object
//! has a string identity, and at most one live object exists per identity
//! at any time. Callers send messages to their local supervisor; the
//! supervisors route each message to the object, creating it on demand.
//!
//! ## Key Concepts
//!
//! - **Supervisor (`SupervisorHandle`)**: one per node and role. The role
//!   leader owns the identity-to-location registry and coordinates creation
//!   through a lock in a shared key-value store.
//! - **Objects (`BusinessObject`)**: user types handling one message at a
//!   time, hosted by an `ObjectActor` that knows its identity.
//! - **Messages (`ObjectMessage`)**: anything carrying an object identity;
//!   derive it with `#[object_message]`.
//! - **Cluster (`ClusterService`)**: membership, leader election and node
//!   addressing. `LocalCluster` provides an in-process implementation.
//! - **Store (`KeyValueStore`)**: shared key-value storage for creation
//!   locks and the location directory. `MemoryStore` keeps it in memory.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use acton_cluster::prelude::*;
//!
//! #[object_message(id = "account", reply = u64)]
//! struct Deposit {
//!     account: String,
//!     amount: u64,
//! }
//! ```

extern crate self as acton_cluster;

/// Configuration, errors and shared aliases.
pub(crate) mod common;

/// Cluster membership types and the in-process membership service.
pub(crate) mod cluster;

/// Key-value store layout, creation lock and location directory.
pub(crate) mod store;

/// Message types and envelopes.
pub(crate) mod message;

/// Supervisor, object actor and placement.
pub(crate) mod actor;

/// Contracts at the engine's seams.
pub(crate) mod traits;

/// Convenient imports for users of the crate.
///
/// # Re-exports
///
/// ## Macros (from `acton-cluster-macro`)
/// *   [`acton_cluster_macro::object_message`]: derives [`ObjectMessage`](crate::traits::ObjectMessage).
///
/// ## External Crates
/// *   [`async_trait::async_trait`]: needed to implement [`BusinessObject`](crate::traits::BusinessObject).
pub mod prelude {
    pub use acton_cluster_macro::object_message;
    pub use async_trait::async_trait;

    pub use crate::actor::{
        HashPlacement, LocalPlacement, ObjectActor, ObjectHandle, RandomPlacement, RestartLimitExceeded,
        RestartLimiter, RestartLimiterConfig, RestartPolicy, RoundRobinPlacement, SupervisorBuilder,
        SupervisorConfig, SupervisorHandle, TerminationReason,
    };
    pub use crate::cluster::{
        ClusterEvent, ClusterStateTracker, CurrentClusterState, LocalCluster, LocalNode, Member,
        MemberStatus, MembershipChange, NodeAddress, UniqueAddress,
    };
    pub use crate::common::{
        BackoffConfig, BehaviorConfig, ClusterConfig, DeliveryFailure, LimitsConfig, MigrationPolicy,
        StoreConfig, StoreError, SupervisorError, SupervisorInbox, TimeoutConfig, CONFIG,
    };
    pub use crate::message::{
        Acknowledge, ChildCreated, ChildRemoved, Continuation, CreateChildCommand, MessageContext,
        MessageError, ObjectResponse, ReplyAddress, RoutingEnvelope, SetObjectId, StopChild,
        SupervisorMessage, SupervisorStatus,
    };
    pub use crate::store::{ChildLocation, CreationLock, KeySpace, MemoryStore, ObjectDirectory};
    pub use crate::traits::{
        BusinessObject, ClusterService, KeyValueStore, ObjectFactory, ObjectMessage, PlacementStrategy,
    };
}
