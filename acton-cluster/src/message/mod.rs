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

//! Messages exchanged between callers, supervisors and object actors.

pub use management::{ChildCreated, ChildRemoved, CreateChildCommand, SetObjectId, StopChild};
pub use message_context::MessageContext;
pub use message_error::MessageError;
pub use reply_address::{ObjectResponse, ReplyAddress};
pub use routing_envelope::{Acknowledge, RoutingEnvelope};
pub use supervisor_message::{Continuation, SupervisorMessage, SupervisorStatus};
pub(crate) use supervisor_message::Step;

/// Defines the management message taxonomy.
mod management;
/// Defines the context handed to business handlers.
mod message_context;
/// Defines channel errors.
mod message_error;
/// Defines reply channels.
mod reply_address;
/// Defines the cross-node routing envelope.
mod routing_envelope;
/// Defines the supervisor inbox protocol.
mod supervisor_message;
