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

use tokio::sync::{mpsc, oneshot};
use tokio_util::task::TaskTracker;
use tracing::{instrument, trace};

use crate::cluster::UniqueAddress;
use crate::common::{SupervisorError, SupervisorInbox, SupervisorOutbox};
use crate::message::{
    MessageError, ObjectResponse, ReplyAddress, RoutingEnvelope, SupervisorMessage, SupervisorStatus,
};
use crate::traits::ObjectMessage;

/// Address of a supervisor.
///
/// Cloneable and cheap; every node's supervisor is reachable through one
/// of these, whether it runs in this process or is a stand-in in tests.
#[derive(Debug)]
pub struct SupervisorHandle<M: ObjectMessage> {
    node: UniqueAddress,
    outbox: SupervisorOutbox<M>,
    lifecycle: TaskTracker,
}

impl<M: ObjectMessage> Clone for SupervisorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            outbox: self.outbox.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<M: ObjectMessage> SupervisorHandle<M> {
    /// A handle for `node` and the inbox its messages arrive on.
    ///
    /// Use it to stand in for a remote supervisor in tests.
    pub fn channel(node: UniqueAddress) -> (Self, SupervisorInbox<M>) {
        let lifecycle = TaskTracker::new();
        lifecycle.close();
        Self::with_lifecycle(node, lifecycle)
    }

    pub(crate) fn with_lifecycle(node: UniqueAddress, lifecycle: TaskTracker) -> (Self, SupervisorInbox<M>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        (
            Self {
                node,
                outbox,
                lifecycle,
            },
            inbox,
        )
    }

    /// Node the supervisor runs on.
    pub const fn node(&self) -> &UniqueAddress {
        &self.node
    }

    /// Whether the supervisor stopped.
    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    /// Posts a raw message.
    ///
    /// # Errors
    ///
    /// Fails when the supervisor stopped.
    pub fn send(&self, message: SupervisorMessage<M>) -> Result<(), MessageError> {
        Ok(self.outbox.send(message)?)
    }

    /// Posts a message, giving it back when the supervisor stopped.
    pub(crate) fn post(&self, message: SupervisorMessage<M>) -> Result<(), SupervisorMessage<M>> {
        self.outbox.send(message).map_err(|e| e.0)
    }

    /// Sends a business message; the answer goes to `reply_to`.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Closed`] when the supervisor stopped.
    pub fn tell(&self, message: M, reply_to: ReplyAddress<M::Reply>) -> Result<(), SupervisorError> {
        self.send(SupervisorMessage::Deliver(RoutingEnvelope::new(message, reply_to)))
            .map_err(|_| SupervisorError::Closed(self.node.to_string()))
    }

    /// Sends a business message and waits for the first answer.
    ///
    /// # Errors
    ///
    /// The delivery failure reported by the cluster, a timeout, or
    /// [`SupervisorError::Closed`].
    #[instrument(skip(self), fields(node = %self.node))]
    pub async fn ask(&self, message: M, timeout: Duration) -> Result<M::Reply, SupervisorError> {
        let (reply_to, mut replies) = ReplyAddress::channel();
        self.tell(message, reply_to)?;
        match tokio::time::timeout(timeout, replies.recv()).await {
            Ok(Some(ObjectResponse::Reply(reply))) => Ok(reply),
            Ok(Some(ObjectResponse::Failed(failure))) => Err(failure.into()),
            Ok(None) => Err(SupervisorError::Closed(self.node.to_string())),
            Err(_) => Err(SupervisorError::Timeout(timeout)),
        }
    }

    /// Current state of the supervisor.
    ///
    /// # Errors
    ///
    /// [`SupervisorError::Closed`] when the supervisor stopped.
    pub async fn status(&self) -> Result<SupervisorStatus, SupervisorError> {
        let (sender, receiver) = oneshot::channel();
        self.send(SupervisorMessage::Status(sender))
            .map_err(|_| SupervisorError::Closed(self.node.to_string()))?;
        receiver
            .await
            .map_err(|_| SupervisorError::Closed(self.node.to_string()))
    }

    /// Stops the supervisor and waits until it has shut down.
    pub async fn stop(&self) {
        if self.send(SupervisorMessage::Stop).is_err() {
            trace!("supervisor on {} already stopped", self.node);
        }
        self.lifecycle.wait().await;
    }
}
