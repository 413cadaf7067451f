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

//! Everything the supervision engine keeps in the shared key-value store:
//! the store contract's in-memory implementation, key layout, the creation
//! lock and the object location directory.

pub use directory::{ChildLocation, ObjectDirectory};
pub(crate) use directory::DirectoryWriter;
pub use keys::KeySpace;
pub use lock::CreationLock;
pub use memory::MemoryStore;

/// Defines the location directory.
mod directory;
/// Defines key naming.
mod keys;
/// Defines the creation lock client.
mod lock;
/// Defines the in-memory store.
mod memory;
