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

//! Actors of the supervision engine.
//!
//! *   [`SupervisorBuilder`] starts one cluster-aware supervisor per node and
//!     role; [`SupervisorHandle`] is how everything else talks to it.
//! *   [`ObjectActor`] hosts a single business object, stashing messages
//!     until it is told which identity it serves.
//! *   Placement strategies decide where the leader creates new objects.

pub use object_actor::{ObjectActor, ObjectHandle};
pub use placement::{HashPlacement, LocalPlacement, RandomPlacement, RoundRobinPlacement};
pub use restart_limiter::{RestartLimitExceeded, RestartLimiter, RestartLimiterConfig};
pub use restart_policy::{RestartPolicy, TerminationReason};
pub use supervisor::{SupervisorBuilder, SupervisorConfig, SupervisorHandle};

pub(crate) use delivery_pool::DeliveryPool;
pub(crate) use object_actor::ObjectEnvelope;

/// Contains the pool of forwarding workers.
mod delivery_pool;

/// Contains the single-object actor.
mod object_actor;

/// Contains the built-in placement strategies.
pub(crate) mod placement;

/// Contains restart limiters with exponential backoff.
pub(crate) mod restart_limiter;

/// Contains restart policies for object actors.
mod restart_policy;

/// Contains the cluster-aware supervisor.
mod supervisor;
