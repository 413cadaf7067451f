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

use static_assertions::assert_impl_all;

use crate::common::DeliveryFailure;
use crate::message::{MessageError, ReplyAddress};
use crate::traits::ObjectMessage;

/// A message delivered to a business object, with its identity and the
/// sender's reply address.
#[derive(Debug)]
pub struct MessageContext<M: ObjectMessage> {
    pub(crate) object_id: String,
    pub(crate) message: M,
    pub(crate) reply_to: ReplyAddress<M::Reply>,
}

impl<M: ObjectMessage> Clone for MessageContext<M> {
    fn clone(&self) -> Self {
        Self {
            object_id: self.object_id.clone(),
            message: self.message.clone(),
            reply_to: self.reply_to.clone(),
        }
    }
}

impl<M: ObjectMessage> MessageContext<M> {
    /// Identity of the object handling the message.
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    /// Returns a reference to the message payload
    pub const fn message(&self) -> &M {
        &self.message
    }

    /// Takes the payload out of the context.
    pub fn into_message(self) -> M {
        self.message
    }

    /// Reply address of the original sender.
    pub fn reply_address(&self) -> ReplyAddress<M::Reply> {
        self.reply_to.clone()
    }

    /// Answers the original sender.
    ///
    /// # Errors
    ///
    /// Fails when the sender stopped listening.
    pub fn reply(&self, reply: M::Reply) -> Result<(), MessageError> {
        self.reply_to.reply(reply)
    }

    /// Answers the original sender with a failure.
    ///
    /// # Errors
    ///
    /// Fails when the sender stopped listening.
    pub fn fail(&self, failure: DeliveryFailure) -> Result<(), MessageError> {
        self.reply_to.fail(failure)
    }
}

assert_impl_all!(ReplyAddress<u32>: Send, Sync, Clone);
