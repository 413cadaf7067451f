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

//! Contracts at the seams of the supervision engine: what a routable message
//! is, what a business object is, and what the engine needs from the cluster
//! service and the key-value store.

pub use business_object::{BusinessObject, ObjectFactory};
pub use cluster_service::ClusterService;
pub use key_value_store::KeyValueStore;
pub use object_message::ObjectMessage;
pub use placement_strategy::PlacementStrategy;

/// Defines the business object contract.
mod business_object;
/// Defines the membership service contract.
mod cluster_service;
/// Defines the key-value store contract.
mod key_value_store;
/// Defines routable messages.
mod object_message;
/// Defines the node-selection policy.
mod placement_strategy;
