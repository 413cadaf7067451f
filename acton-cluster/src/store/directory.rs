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

//! Object location directory.
//!
//! Two kinds of records live in the store: one per identity holding where
//! its object runs, and one per supervisor holding the whole child registry
//! so a restarted supervisor can rebuild its view. Values are JSON; a record
//! that does not decode is treated as absent.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, instrument, warn};

use crate::cluster::UniqueAddress;
use crate::common::StoreError;
use crate::store::{CreationLock, KeySpace};
use crate::traits::KeyValueStore;

/// Where an object actor runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildLocation {
    /// Owning node, including its incarnation.
    pub node: UniqueAddress,
    /// Path of the object actor on that node.
    pub path: String,
}

impl ChildLocation {
    /// Location of `path` on `node`.
    pub fn new(node: UniqueAddress, path: impl Into<String>) -> Self {
        Self {
            node,
            path: path.into(),
        }
    }
}

impl fmt::Display for ChildLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.node)
    }
}

/// Reads and writes location records for one supervisor.
#[derive(Clone)]
pub struct ObjectDirectory {
    store: Arc<dyn KeyValueStore>,
    keys: KeySpace,
    role: String,
}

impl fmt::Debug for ObjectDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDirectory")
            .field("keys", &self.keys)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Encoding {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl ObjectDirectory {
    /// Directory for the supervisor of `role` over `store`.
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeySpace, role: impl Into<String>) -> Self {
        Self {
            store,
            keys,
            role: role.into(),
        }
    }

    /// Location recorded for `id`.
    ///
    /// # Errors
    ///
    /// Propagates store failures. Undecodable records are `Ok(None)`.
    pub async fn get_child_address(&self, id: &str) -> Result<Option<ChildLocation>, StoreError> {
        let key = self.keys.child_address(id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(location) => Ok(Some(location)),
            Err(e) => {
                warn!("ignoring undecodable location under {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Overwrites the location of `id`.
    ///
    /// # Errors
    ///
    /// Propagates store and encoding failures.
    pub async fn set_child_address(&self, id: &str, location: &ChildLocation) -> Result<(), StoreError> {
        let key = self.keys.child_address(id);
        let raw = encode(&key, location)?;
        self.store.set(&key, raw, None).await
    }

    /// Deletes the location of `id`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn remove_child_address(&self, id: &str) -> Result<(), StoreError> {
        self.store
            .delete(&self.keys.child_address(id))
            .await
            .map(|_| ())
    }

    /// The whole child registry.
    ///
    /// # Errors
    ///
    /// Propagates store failures. An undecodable registry reads as empty.
    #[instrument(skip(self), fields(role = %self.role))]
    pub async fn get_all_children(&self) -> Result<HashMap<String, ChildLocation>, StoreError> {
        let key = self.keys.children(&self.role);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(HashMap::new());
        };
        match serde_json::from_str(&raw) {
            Ok(children) => Ok(children),
            Err(e) => {
                warn!("ignoring undecodable child registry under {}: {}", key, e);
                Ok(HashMap::new())
            }
        }
    }

    /// Overwrites the whole child registry.
    ///
    /// # Errors
    ///
    /// Propagates store and encoding failures.
    pub async fn set_all_children(&self, children: &HashMap<String, ChildLocation>) -> Result<(), StoreError> {
        let key = self.keys.children(&self.role);
        let raw = encode(&key, children)?;
        self.store.set(&key, raw, None).await
    }
}

#[derive(Debug)]
enum DirectoryCommand {
    Record { id: String, location: ChildLocation },
    Forget { id: String },
    Snapshot(HashMap<String, ChildLocation>),
    ReleaseLock { id: String },
}

/// Applies a supervisor's directory writes and lock releases one at a time,
/// in the order they were issued, off the supervisor's mailbox.
#[derive(Debug, Clone)]
pub(crate) struct DirectoryWriter {
    commands: UnboundedSender<DirectoryCommand>,
}

impl DirectoryWriter {
    pub(crate) fn spawn(
        directory: ObjectDirectory,
        lock: CreationLock,
        tasks: &TaskTracker,
        cancellation_token: CancellationToken,
    ) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        tasks.spawn(write_loop(directory, lock, inbox, cancellation_token));
        Self { commands }
    }

    pub(crate) fn record(&self, id: &str, location: ChildLocation) {
        self.submit(DirectoryCommand::Record {
            id: id.to_string(),
            location,
        });
    }

    pub(crate) fn forget(&self, id: &str) {
        self.submit(DirectoryCommand::Forget { id: id.to_string() });
    }

    pub(crate) fn snapshot(&self, children: HashMap<String, ChildLocation>) {
        self.submit(DirectoryCommand::Snapshot(children));
    }

    pub(crate) fn release_lock(&self, id: &str) {
        self.submit(DirectoryCommand::ReleaseLock { id: id.to_string() });
    }

    fn submit(&self, command: DirectoryCommand) {
        if let Err(e) = self.commands.send(command) {
            warn!("directory writer has stopped, dropping {:?}", e.0);
        }
    }
}

async fn write_loop(
    directory: ObjectDirectory,
    lock: CreationLock,
    mut inbox: UnboundedReceiver<DirectoryCommand>,
    cancellation_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancellation_token.cancelled() => {
                // flush what was already issued, locks included
                while let Ok(command) = inbox.try_recv() {
                    apply(&directory, &lock, command).await;
                }
                break;
            }
            next = inbox.recv() => {
                let Some(command) = next else { break };
                apply(&directory, &lock, command).await;
            }
        }
    }
    debug!("directory writer stopped");
}

async fn apply(directory: &ObjectDirectory, lock: &CreationLock, command: DirectoryCommand) {
    let outcome = match &command {
        DirectoryCommand::Record { id, location } => directory.set_child_address(id, location).await,
        DirectoryCommand::Forget { id } => directory.remove_child_address(id).await,
        DirectoryCommand::Snapshot(children) => directory.set_all_children(children).await,
        DirectoryCommand::ReleaseLock { id } => lock.release(id).await,
    };
    if let Err(e) = outcome {
        warn!("directory write {:?} failed: {}", command, e);
    }
}
