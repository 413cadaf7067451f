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

use std::time::Duration;

use thiserror::Error;

/// Failure reported to the original sender of a business message.
///
/// Every business message ends with either a reply from its object or one of
/// these. None of them are fatal to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    /// The creation lock for the object stayed held by another attempt.
    #[error("creation of object `{id}` stayed blocked by a concurrent creation lock after {waits} waits")]
    CreationLockBlocked {
        /// Object identity.
        id: String,
        /// How many times the lock was found held.
        waits: u32,
    },
    /// Creation was attempted the maximum number of times without a `ChildCreated`.
    #[error("creation of object `{id}` failed after {attempts} attempts")]
    CreationExhausted {
        /// Object identity.
        id: String,
        /// Attempts made.
        attempts: u32,
    },
    /// The node holding the object (or the leader) never acknowledged the forward.
    #[error("object `{id}` could not be reached after {attempts} delivery attempts")]
    Unreachable {
        /// Object identity.
        id: String,
        /// Delivery attempts made.
        attempts: u32,
    },
    /// The message bounced between supervisors without finding its owner.
    #[error("message for object `{id}` was forwarded {hops} times without reaching its owner")]
    TooManyHops {
        /// Object identity.
        id: String,
        /// Forwarding hops taken.
        hops: u32,
    },
    /// The business handler returned an error.
    #[error("object `{id}` rejected the message: {reason}")]
    Rejected {
        /// Object identity.
        id: String,
        /// Rendered handler error.
        reason: String,
    },
    /// The business handler panicked.
    #[error("object `{id}` panicked while handling the message: {reason}")]
    HandlerPanicked {
        /// Object identity.
        id: String,
        /// Panic payload, if it was a string.
        reason: String,
    },
    /// The object actor stopped before it handled the message.
    #[error("object `{id}` stopped before handling the message")]
    ObjectStopped {
        /// Object identity.
        id: String,
    },
    /// The supervisor restarted while the message sat in a pending queue.
    #[error("supervisor restarted before the message for object `{id}` was delivered")]
    SupervisorRestarted {
        /// Object identity.
        id: String,
    },
    /// The supervisor was stopped while the message was pending.
    #[error("supervisor stopped before the message for object `{id}` was delivered")]
    SupervisorStopped {
        /// Object identity.
        id: String,
    },
    /// This node was removed from the cluster while the message was pending.
    #[error("this node left the cluster before the message for object `{id}` was delivered")]
    ClusterUnavailable {
        /// Object identity.
        id: String,
    },
    /// The message carried an empty identity.
    #[error("message carries an empty object identity")]
    InvalidIdentity,
}

/// Errors raised by a [`KeyValueStore`](crate::prelude::KeyValueStore).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the operation.
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
    /// A value could not be encoded for storage.
    #[error("could not encode value for key `{key}`: {reason}")]
    Encoding {
        /// Key being written.
        key: String,
        /// Encoder error.
        reason: String,
    },
}

/// Errors returned by [`SupervisorHandle`](crate::prelude::SupervisorHandle) operations.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The message was not delivered; see [`DeliveryFailure`].
    #[error(transparent)]
    Delivery(#[from] DeliveryFailure),
    /// No reply arrived in time.
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    /// The supervisor's inbox is closed.
    #[error("supervisor on {0} is no longer running")]
    Closed(String),
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
