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

use derive_new::new;
use tokio::sync::oneshot;

use crate::cluster::UniqueAddress;
use crate::store::ChildLocation;

/// Leader to target node: create the object for `id`.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct CreateChildCommand {
    /// Object identity.
    pub id: String,
    /// Leader that asked.
    pub requested_by: UniqueAddress,
}

/// Broadcast by the hosting node once an object has its identity.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ChildCreated {
    /// Object identity.
    pub id: String,
    /// Where it runs.
    pub location: ChildLocation,
}

/// Broadcast by the hosting node when an object stopped.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ChildRemoved {
    /// Object identity.
    pub id: String,
    /// Node that hosted it.
    pub node: UniqueAddress,
}

/// Leader to hosting node: stop the object for `id`, which already runs elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct StopChild {
    /// Object identity.
    pub id: String,
    /// Node hosting the object to stop. Other incarnations ignore the order.
    pub node: UniqueAddress,
}

/// One-time identity assignment sent to a freshly created object actor.
#[derive(Debug)]
pub struct SetObjectId {
    pub(crate) id: String,
    pub(crate) assigned: oneshot::Sender<String>,
}

impl SetObjectId {
    /// Assignment of `id`; the actor answers on the returned receiver once assigned.
    pub fn new(id: impl Into<String>) -> (Self, oneshot::Receiver<String>) {
        let (assigned, receiver) = oneshot::channel();
        (
            Self {
                id: id.into(),
                assigned,
            },
            receiver,
        )
    }

    /// The identity being assigned.
    pub fn id(&self) -> &str {
        &self.id
    }
}
