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

use crate::cluster::UniqueAddress;

/// Chooses the node that will host a new object.
pub trait PlacementStrategy: Debug + Send + Sync + 'static {
    /// Picks a node for `id` among the live `members`.
    ///
    /// `members` is never empty while the supervisor is leader; `local` is
    /// the leader itself.
    fn select_node(&self, id: &str, members: &[UniqueAddress], local: &UniqueAddress) -> UniqueAddress;
}
