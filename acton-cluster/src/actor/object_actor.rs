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

//! The per-identity child actor.
//!
//! An object actor starts *unassigned*: it knows nothing about which
//! business object it hosts and stashes every message it receives. The
//! supervisor sends exactly one [`SetObjectId`]; the actor then builds its
//! business object through the factory, tells the supervisor it is ready,
//! and replays the stash in arrival order.
//!
//! Handler panics are caught. The sender is answered with
//! [`DeliveryFailure::HandlerPanicked`] and the restart policy decides
//! whether the object is rebuilt under the same identity or the actor stops.

use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::actor::{RestartPolicy, TerminationReason};
use crate::common::{DeliveryFailure, ObjectInbox, ObjectOutbox};
use crate::message::{MessageContext, RoutingEnvelope, SetObjectId};
use crate::traits::{BusinessObject, ObjectFactory, ObjectMessage};

/// Inbox protocol of an object actor.
#[derive(Debug)]
pub(crate) enum ObjectEnvelope<M: ObjectMessage> {
    Assign(SetObjectId),
    Deliver(RoutingEnvelope<M>),
    Stop,
}

impl<M: ObjectMessage> ObjectEnvelope<M> {
    fn into_delivery(self) -> Option<RoutingEnvelope<M>> {
        match self {
            Self::Deliver(envelope) => Some(envelope),
            Self::Assign(_) | Self::Stop => None,
        }
    }
}

/// Sending side of an object actor.
#[derive(Debug)]
pub struct ObjectHandle<M: ObjectMessage> {
    path: String,
    outbox: ObjectOutbox<M>,
}

impl<M: ObjectMessage> Clone for ObjectHandle<M> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            outbox: self.outbox.clone(),
        }
    }
}

impl<M: ObjectMessage> ObjectHandle<M> {
    /// Path of the actor on its node.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the actor is gone.
    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }

    /// Sends the one-time identity assignment.
    pub fn assign(&self, assignment: SetObjectId) -> bool {
        self.outbox.send(ObjectEnvelope::Assign(assignment)).is_ok()
    }

    /// Hands over a business message, or gives it back if the actor is gone.
    pub(crate) fn deliver(&self, envelope: RoutingEnvelope<M>) -> Result<(), Option<RoutingEnvelope<M>>> {
        self.outbox
            .send(ObjectEnvelope::Deliver(envelope))
            .map_err(|e| e.0.into_delivery())
    }

    /// Asks the actor to finish.
    pub fn stop(&self) {
        if self.outbox.send(ObjectEnvelope::Stop).is_err() {
            trace!("{} already stopped", self.path);
        }
    }
}

enum Phase<B: BusinessObject> {
    Unassigned {
        stash: VecDeque<RoutingEnvelope<B::Message>>,
    },
    Assigned {
        id: String,
        object: B,
    },
}

/// Runs one business object.
pub struct ObjectActor<B: BusinessObject> {
    path: String,
    factory: Arc<dyn ObjectFactory<B>>,
    restart_policy: RestartPolicy,
    phase: Phase<B>,
    inbox: ObjectInbox<B::Message>,
    cancellation_token: CancellationToken,
}

impl<B: BusinessObject> fmt::Debug for ObjectActor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match &self.phase {
            Phase::Unassigned { stash } => format!("unassigned ({} stashed)", stash.len()),
            Phase::Assigned { id, .. } => format!("assigned to {id}"),
        };
        f.debug_struct("ObjectActor")
            .field("path", &self.path)
            .field("restart_policy", &self.restart_policy)
            .field("phase", &phase)
            .finish_non_exhaustive()
    }
}

impl<B: BusinessObject> ObjectActor<B> {
    /// An unassigned actor and its handle. Nothing runs until [`run`](Self::run) is awaited.
    pub fn new(
        path: impl Into<String>,
        factory: Arc<dyn ObjectFactory<B>>,
        restart_policy: RestartPolicy,
        cancellation_token: CancellationToken,
    ) -> (ObjectHandle<B::Message>, Self) {
        let path = path.into();
        let (outbox, inbox) = mpsc::unbounded_channel();
        let handle = ObjectHandle {
            path: path.clone(),
            outbox,
        };
        let actor = Self {
            path,
            factory,
            restart_policy,
            phase: Phase::Unassigned {
                stash: VecDeque::new(),
            },
            inbox,
            cancellation_token,
        };
        (handle, actor)
    }

    /// Processes messages until stopped and reports why it stopped.
    ///
    /// Messages still stashed or queued when the actor stops are answered
    /// with [`DeliveryFailure::ObjectStopped`].
    #[instrument(skip(self), fields(path = %self.path))]
    pub async fn run(mut self) -> TerminationReason {
        let reason = self.process().await;
        debug!("object actor stopping: {}", reason);
        self.fail_remaining();
        reason
    }

    async fn process(&mut self) -> TerminationReason {
        let cancel_token = self.cancellation_token.clone();
        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    trace!("cancelled by parent");
                    return TerminationReason::ParentShutdown;
                }
                incoming = self.inbox.recv() => {
                    let outcome = match incoming {
                        None => Err(TerminationReason::InboxClosed),
                        Some(ObjectEnvelope::Stop) => Err(TerminationReason::Normal),
                        Some(ObjectEnvelope::Assign(assignment)) => self.assign(assignment).await,
                        Some(ObjectEnvelope::Deliver(envelope)) => self.receive(envelope).await,
                    };
                    if let Err(reason) = outcome {
                        return reason;
                    }
                }
            }
        }
    }

    fn fail_remaining(&mut self) {
        self.inbox.close();
        if let Phase::Unassigned { stash } = &mut self.phase {
            fail_undelivered(std::mem::take(stash));
        }
        let mut queued = VecDeque::new();
        while let Ok(envelope) = self.inbox.try_recv() {
            queued.extend(envelope.into_delivery());
        }
        fail_undelivered(queued);
    }

    async fn assign(&mut self, assignment: SetObjectId) -> Result<(), TerminationReason> {
        let SetObjectId { id, assigned } = assignment;
        let mut stash = match &mut self.phase {
            Phase::Assigned { id: current, .. } => {
                warn!("already assigned to {}, ignoring assignment to {}", current, id);
                return Ok(());
            }
            Phase::Unassigned { stash } => std::mem::take(stash),
        };

        let object = match self.build(&id) {
            Ok(object) => object,
            Err(reason) => {
                fail_undelivered(stash);
                return Err(reason);
            }
        };
        self.phase = Phase::Assigned {
            id: id.clone(),
            object,
        };
        debug!("assigned to {}, replaying {} stashed messages", id, stash.len());
        if assigned.send(id).is_err() {
            trace!("creator stopped waiting for the assignment");
        }

        while let Some(envelope) = stash.pop_front() {
            if let Err(reason) = self.receive(envelope).await {
                fail_undelivered(stash);
                return Err(reason);
            }
        }
        Ok(())
    }

    fn build(&self, id: &str) -> Result<B, TerminationReason> {
        std::panic::catch_unwind(AssertUnwindSafe(|| self.factory.create(id))).map_err(|payload| {
            let reason = TerminationReason::from_panic(payload.as_ref());
            error!("factory panicked building {}: {}", id, reason);
            reason
        })
    }

    async fn receive(&mut self, envelope: RoutingEnvelope<B::Message>) -> Result<(), TerminationReason> {
        if let Phase::Unassigned { stash } = &mut self.phase {
            stash.push_back(envelope);
            return Ok(());
        }
        let Phase::Assigned { id, object } = &mut self.phase else {
            return Ok(());
        };

        let (message, reply_to) = envelope.into_parts();
        let context = MessageContext {
            object_id: id.clone(),
            message,
            reply_to: reply_to.clone(),
        };

        let outcome = AssertUnwindSafe(object.handle(context)).catch_unwind().await;
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!("object {} rejected a message: {:?}", id, e);
                let failure = DeliveryFailure::Rejected {
                    id: id.clone(),
                    reason: e.to_string(),
                };
                if reply_to.fail(failure).is_err() {
                    trace!("sender of a rejected message stopped listening");
                }
                Ok(())
            }
            Err(payload) => {
                let reason = TerminationReason::from_panic(payload.as_ref());
                error!("object {} panicked: {}", id, reason);
                let failure = DeliveryFailure::HandlerPanicked {
                    id: id.clone(),
                    reason: reason.to_string(),
                };
                if reply_to.fail(failure).is_err() {
                    trace!("sender of a failed message stopped listening");
                }
                if !self.restart_policy.should_restart(&reason) {
                    return Err(reason);
                }
                let id = id.clone();
                let rebuilt = self.build(&id)?;
                self.phase = Phase::Assigned { id, object: rebuilt };
                Ok(())
            }
        }
    }
}

fn fail_undelivered<M: ObjectMessage>(envelopes: VecDeque<RoutingEnvelope<M>>) {
    if !envelopes.is_empty() {
        debug!("failing {} undelivered messages", envelopes.len());
    }
    for envelope in envelopes {
        let failure = DeliveryFailure::ObjectStopped {
            id: envelope.object_id().to_string(),
        };
        envelope.fail(failure);
    }
}
