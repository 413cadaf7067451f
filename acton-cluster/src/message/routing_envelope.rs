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

use tokio::sync::oneshot;
use tracing::trace;

use crate::common::DeliveryFailure;
use crate::message::ReplyAddress;
use crate::traits::ObjectMessage;

/// A business message in transit, together with where its answer goes.
///
/// `attempt` counts failed deliveries, `hops` counts supervisor-to-supervisor
/// forwards; both are bounded by the supervisor configuration.
#[derive(Debug)]
pub struct RoutingEnvelope<M: ObjectMessage> {
    message: M,
    reply_to: ReplyAddress<M::Reply>,
    attempt: u32,
    hops: u32,
}

impl<M: ObjectMessage> Clone for RoutingEnvelope<M> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            reply_to: self.reply_to.clone(),
            attempt: self.attempt,
            hops: self.hops,
        }
    }
}

impl<M: ObjectMessage> RoutingEnvelope<M> {
    /// Wraps `message`; answers go to `reply_to`.
    pub fn new(message: M, reply_to: ReplyAddress<M::Reply>) -> Self {
        Self {
            message,
            reply_to,
            attempt: 0,
            hops: 0,
        }
    }

    /// Identity of the target object.
    pub fn object_id(&self) -> &str {
        self.message.object_id()
    }

    /// The wrapped message.
    pub const fn message(&self) -> &M {
        &self.message
    }

    /// Where answers go.
    pub const fn reply_to(&self) -> &ReplyAddress<M::Reply> {
        &self.reply_to
    }

    /// Failed deliveries so far.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Forwards so far.
    pub const fn hops(&self) -> u32 {
        self.hops
    }

    /// Splits into message and reply address.
    pub fn into_parts(self) -> (M, ReplyAddress<M::Reply>) {
        (self.message, self.reply_to)
    }

    #[must_use]
    pub(crate) fn retried(mut self) -> Self {
        self.attempt += 1;
        self
    }

    #[must_use]
    pub(crate) fn forwarded(mut self) -> Self {
        self.hops += 1;
        self
    }

    /// Answers the sender with `failure` and drops the message.
    pub fn fail(self, failure: DeliveryFailure) {
        if self.reply_to.fail(failure).is_err() {
            trace!("sender of {:?} stopped listening", self.message);
        }
    }
}

/// Acknowledges receipt of a forwarded envelope.
#[derive(Debug)]
pub struct Acknowledge(oneshot::Sender<bool>);

impl Acknowledge {
    pub(crate) fn pair() -> (Self, oneshot::Receiver<bool>) {
        let (sender, receiver) = oneshot::channel();
        (Self(sender), receiver)
    }

    /// Confirms the envelope was taken over.
    pub fn ack(self) {
        if self.0.send(true).is_err() {
            trace!("forwarding supervisor stopped waiting for the acknowledgment");
        }
    }
}
