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

//! Node-selection policies for new objects.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use crate::cluster::UniqueAddress;
use crate::traits::PlacementStrategy;

/// Creates every object on the leader itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPlacement;

impl PlacementStrategy for LocalPlacement {
    fn select_node(&self, _id: &str, _members: &[UniqueAddress], local: &UniqueAddress) -> UniqueAddress {
        local.clone()
    }
}

/// Picks a random live member.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPlacement;

impl PlacementStrategy for RandomPlacement {
    fn select_node(&self, _id: &str, members: &[UniqueAddress], local: &UniqueAddress) -> UniqueAddress {
        if members.is_empty() {
            return local.clone();
        }
        let index = rand::rng().random_range(0..members.len());
        members[index].clone()
    }
}

/// Cycles through live members.
#[derive(Debug, Default)]
pub struct RoundRobinPlacement {
    next: AtomicUsize,
}

impl PlacementStrategy for RoundRobinPlacement {
    fn select_node(&self, _id: &str, members: &[UniqueAddress], local: &UniqueAddress) -> UniqueAddress {
        if members.is_empty() {
            return local.clone();
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % members.len();
        members[index].clone()
    }
}

/// Picks a member from a hash of the identity; stable while membership is.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPlacement;

impl PlacementStrategy for HashPlacement {
    fn select_node(&self, id: &str, members: &[UniqueAddress], local: &UniqueAddress) -> UniqueAddress {
        if members.is_empty() {
            return local.clone();
        }
        members[bucket(id, members.len())].clone()
    }
}

/// Stable bucket in `0..buckets` for `id`.
pub(crate) fn bucket(id: &str, buckets: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    #[allow(clippy::cast_possible_truncation)]
    let index = (hasher.finish() % buckets.max(1) as u64) as usize;
    index
}
