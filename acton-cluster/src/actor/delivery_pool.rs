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

//! Parallel senders for cross-node forwards.
//!
//! A supervisor forwards business messages to other supervisors through a
//! fixed pool of workers. The worker is chosen from the object identity, so
//! messages for one identity leave in the order they were dispatched while
//! different identities proceed in parallel. Each forward waits for the
//! receiving supervisor's acknowledgment; a missing or negative one sends the
//! envelope back to the owning supervisor after a pause, to be routed again.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{trace, warn};

use crate::actor::placement::bucket;
use crate::actor::SupervisorHandle;
use crate::common::DeliveryFailure;
use crate::message::{Acknowledge, RoutingEnvelope, Step, SupervisorMessage};
use crate::traits::ObjectMessage;

#[derive(Debug)]
struct Outbound<M: ObjectMessage> {
    target: SupervisorHandle<M>,
    envelope: RoutingEnvelope<M>,
}

#[derive(Debug, Clone)]
struct WorkerSettings<M: ObjectMessage> {
    owner: SupervisorHandle<M>,
    send_timeout: Duration,
    next_attempt_pause: Duration,
    tasks: TaskTracker,
    cancellation_token: CancellationToken,
}

/// Fixed pool of delivery workers owned by one supervisor.
#[derive(Debug)]
pub(crate) struct DeliveryPool<M: ObjectMessage> {
    workers: Vec<UnboundedSender<Outbound<M>>>,
}

impl<M: ObjectMessage> DeliveryPool<M> {
    /// Starts `senders_count` workers (at least one). Failed envelopes go back to `owner`.
    pub(crate) fn spawn(
        senders_count: usize,
        owner: SupervisorHandle<M>,
        send_timeout: Duration,
        next_attempt_pause: Duration,
        tasks: &TaskTracker,
        cancellation_token: CancellationToken,
    ) -> Self {
        let settings = WorkerSettings {
            owner,
            send_timeout,
            next_attempt_pause,
            tasks: tasks.clone(),
            cancellation_token,
        };
        let workers = (0..senders_count.max(1))
            .map(|_| {
                let (sender, inbox) = mpsc::unbounded_channel();
                tasks.spawn(work(inbox, settings.clone()));
                sender
            })
            .collect();
        Self { workers }
    }

    /// Queues `envelope` for delivery to `target`.
    pub(crate) fn dispatch(&self, target: SupervisorHandle<M>, envelope: RoutingEnvelope<M>) {
        let index = bucket(envelope.object_id(), self.workers.len());
        if let Err(e) = self.workers[index].send(Outbound { target, envelope }) {
            warn!("delivery worker {} has stopped", index);
            give_up(e.0.envelope);
        }
    }
}

async fn work<M: ObjectMessage>(mut inbox: UnboundedReceiver<Outbound<M>>, settings: WorkerSettings<M>) {
    loop {
        tokio::select! {
            () = settings.cancellation_token.cancelled() => break,
            next = inbox.recv() => {
                let Some(outbound) = next else { break };
                deliver(outbound, &settings).await;
            }
        }
    }
}

async fn deliver<M: ObjectMessage>(outbound: Outbound<M>, settings: &WorkerSettings<M>) {
    let Outbound { target, envelope } = outbound;
    let (ack, acked) = Acknowledge::pair();
    let routed = SupervisorMessage::Routed {
        envelope: envelope.clone(),
        ack,
    };

    let delivered = target.send(routed).is_ok()
        && matches!(
            tokio::time::timeout(settings.send_timeout, acked).await,
            Ok(Ok(true))
        );
    if delivered {
        trace!("forwarded {} to {}", envelope.object_id(), target.node());
        return;
    }

    warn!(
        "forward of {} to {} was not acknowledged (attempt {})",
        envelope.object_id(),
        target.node(),
        envelope.attempt() + 1
    );
    let owner = settings.owner.clone();
    let pause = settings.next_attempt_pause;
    let token = settings.cancellation_token.clone();
    let retry = envelope.retried();
    settings.tasks.spawn(async move {
        tokio::select! {
            () = token.cancelled() => give_up(retry),
            () = tokio::time::sleep(pause) => {
                if let Err(returned) = owner.post(Step::Redeliver(retry).into_message()) {
                    trace!("owning supervisor is gone, failing the retry");
                    if let Some(retry) = returned.into_envelope() {
                        give_up(retry);
                    }
                }
            }
        }
    });
}

fn give_up<M: ObjectMessage>(envelope: RoutingEnvelope<M>) {
    let failure = DeliveryFailure::Unreachable {
        id: envelope.object_id().to_string(),
        attempts: envelope.attempt(),
    };
    envelope.fail(failure);
}
