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

use async_trait::async_trait;

use crate::message::MessageContext;
use crate::traits::ObjectMessage;

/// Business logic hosted by an object actor.
///
/// The actor wrapper handles identity assignment, buffering and panics; an
/// implementation only reacts to messages once its identity is known.
#[async_trait]
pub trait BusinessObject: Send + 'static {
    /// Messages this object understands.
    type Message: ObjectMessage;

    /// Handles one message. Returning an error answers the sender with
    /// [`DeliveryFailure::Rejected`](crate::prelude::DeliveryFailure::Rejected).
    async fn handle(&mut self, context: MessageContext<Self::Message>) -> anyhow::Result<()>;
}

/// Builds a business object for an identity.
pub trait ObjectFactory<B: BusinessObject>: Send + Sync + 'static {
    /// Creates the object for `id`.
    fn create(&self, id: &str) -> B;
}

impl<B, F> ObjectFactory<B> for F
where
    B: BusinessObject,
    F: Fn(&str) -> B + Send + Sync + 'static,
{
    fn create(&self, id: &str) -> B {
        self(id)
    }
}
