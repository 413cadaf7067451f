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

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::common::DeliveryFailure;
use crate::message::MessageError;

/// What a business sender eventually receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectResponse<R> {
    /// The object answered.
    Reply(R),
    /// The message could not be delivered or processed.
    Failed(DeliveryFailure),
}

/// Where an object sends its answers. Travels with the message across nodes.
#[derive(Debug)]
pub struct ReplyAddress<R> {
    outbox: UnboundedSender<ObjectResponse<R>>,
}

impl<R> Clone for ReplyAddress<R> {
    fn clone(&self) -> Self {
        Self {
            outbox: self.outbox.clone(),
        }
    }
}

impl<R: Debug + Send + 'static> ReplyAddress<R> {
    /// A reply address and the receiver its answers arrive on.
    pub fn channel() -> (Self, UnboundedReceiver<ObjectResponse<R>>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        (Self { outbox }, inbox)
    }

    /// Sends a reply.
    ///
    /// # Errors
    ///
    /// Fails when the sender stopped listening.
    pub fn reply(&self, reply: R) -> Result<(), MessageError> {
        Ok(self.outbox.send(ObjectResponse::Reply(reply))?)
    }

    /// Reports a failure instead of a reply.
    ///
    /// # Errors
    ///
    /// Fails when the sender stopped listening.
    pub fn fail(&self, failure: DeliveryFailure) -> Result<(), MessageError> {
        Ok(self.outbox.send(ObjectResponse::Failed(failure))?)
    }

    /// Whether the sender stopped listening.
    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}
