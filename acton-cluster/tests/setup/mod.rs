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
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use acton_cluster::prelude::*;
use anyhow::anyhow;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub const ROLE: &str = "echo";

/// How long tests wait for anything to happen.
pub const PATIENCE: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Sends every test's trace output to `logs/cluster_tests.txt`, once per test binary.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "cluster_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("info")
            .add_directive("acton_cluster=trace".parse().unwrap())
            .add_directive("supervisor_tests=trace".parse().unwrap())
            .add_directive("multi_node_tests=trace".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
    });
}

#[object_message]
pub struct Echo {
    pub id: String,
    pub text: String,
    pub from_object_actor: bool,
    pub handled_by: String,
}

impl Echo {
    pub fn new(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            from_object_actor: false,
            handled_by: String::new(),
        }
    }
}

/// Replies with the text it got, marked with the node hosting it.
#[derive(Debug)]
pub struct EchoObject {
    id: String,
    node: String,
}

#[async_trait]
impl BusinessObject for EchoObject {
    type Message = Echo;

    async fn handle(&mut self, context: MessageContext<Echo>) -> anyhow::Result<()> {
        let text = context.message().text.clone();
        if text == "reject" {
            anyhow::bail!("echo {} refuses", self.id);
        }
        context.reply(Echo {
            id: self.id.clone(),
            text,
            from_object_actor: true,
            handled_by: self.node.clone(),
        })?;
        Ok(())
    }
}

/// Counts objects built by the factories sharing it.
#[derive(Debug, Clone, Default)]
pub struct Creations(Arc<AtomicUsize>);

impl Creations {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn echo_factory(node: &UniqueAddress, creations: &Creations) -> impl ObjectFactory<EchoObject> {
    let node = node.to_string();
    let creations = creations.clone();
    move |id: &str| {
        creations.0.fetch_add(1, Ordering::SeqCst);
        EchoObject {
            id: id.to_string(),
            node: node.clone(),
        }
    }
}

pub fn node(port: u16) -> UniqueAddress {
    UniqueAddress::new(NodeAddress::new("127.0.0.1", port), u64::from(port))
}

/// Short timeouts so failure paths finish quickly.
pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig::from_cluster_config(ROLE, &ClusterConfig::default())
        .with_create_child_timeout(Duration::from_millis(500))
        .with_send_timeout(Duration::from_millis(200))
        .with_next_attempt_pause(Duration::from_millis(50))
        .with_senders_count(4)
        .with_restart_limiter(RestartLimiterConfig::disabled())
}

pub fn keys() -> KeySpace {
    KeySpace::new("acton", ROLE)
}

pub fn directory(store: &MemoryStore) -> ObjectDirectory {
    ObjectDirectory::new(Arc::new(store.clone()), keys(), ROLE)
}

pub fn builder(
    cluster: &LocalCluster<Echo>,
    store: &MemoryStore,
    address: &UniqueAddress,
    config: SupervisorConfig,
    creations: &Creations,
) -> SupervisorBuilder<EchoObject> {
    SupervisorBuilder::new(
        config,
        Arc::new(cluster.node(address.clone())),
        Arc::new(store.clone()),
        echo_factory(address, creations),
    )
}

/// Polls the supervisor until its status satisfies `check`.
pub async fn wait_status(
    handle: &SupervisorHandle<Echo>,
    check: impl Fn(&SupervisorStatus) -> bool,
) -> anyhow::Result<SupervisorStatus> {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    loop {
        let status = handle.status().await?;
        if check(&status) {
            return Ok(status);
        }
        if tokio::time::Instant::now() > deadline {
            return Err(anyhow!("status never matched, last was {status:?}"));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Polls the store until `key` is present (or absent).
pub async fn wait_key(store: &MemoryStore, key: &str, present: bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + PATIENCE;
    while store.exists(key).await? != present {
        if tokio::time::Instant::now() > deadline {
            return Err(anyhow!("key {key} never became present={present}"));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

/// Creates on the first listed node that is a member.
#[derive(Debug)]
pub struct PreferNodes(pub Vec<UniqueAddress>);

impl PlacementStrategy for PreferNodes {
    fn select_node(&self, _id: &str, members: &[UniqueAddress], local: &UniqueAddress) -> UniqueAddress {
        self.0
            .iter()
            .find(|node| members.contains(node))
            .cloned()
            .unwrap_or_else(|| local.clone())
    }
}

/// Stands in for another node's supervisor and records what it is sent.
pub struct StandIn {
    pub handle: SupervisorHandle<Echo>,
    inbox: SupervisorInbox<Echo>,
}

impl StandIn {
    pub fn register(cluster: &LocalCluster<Echo>, node: UniqueAddress) -> Self {
        let (handle, inbox) = SupervisorHandle::channel(node);
        cluster.register(handle.clone());
        Self { handle, inbox }
    }

    pub fn node(&self) -> &UniqueAddress {
        self.handle.node()
    }

    /// Next message `select` accepts; everything before it is skipped.
    pub async fn expect<T>(
        &mut self,
        mut select: impl FnMut(SupervisorMessage<Echo>) -> Option<T>,
    ) -> anyhow::Result<T> {
        let deadline = tokio::time::Instant::now() + PATIENCE;
        loop {
            let message = tokio::time::timeout_at(deadline, self.inbox.recv())
                .await
                .map_err(|_| anyhow!("stand-in {} waited in vain", self.node()))?
                .ok_or_else(|| anyhow!("stand-in inbox closed"))?;
            if let Some(found) = select(message) {
                return Ok(found);
            }
        }
    }

    pub async fn expect_create_child(&mut self) -> anyhow::Result<CreateChildCommand> {
        self.expect(|message| match message {
            SupervisorMessage::CreateChild(command) => Some(command),
            _ => None,
        })
        .await
    }

    /// Acknowledges the next forwarded message and answers it as the object would.
    pub async fn answer_routed(&mut self) -> anyhow::Result<RoutingEnvelope<Echo>> {
        let (envelope, ack) = self
            .expect(|message| match message {
                SupervisorMessage::Routed { envelope, ack } => Some((envelope, ack)),
                _ => None,
            })
            .await?;
        ack.ack();
        envelope.reply_to().reply(Echo {
            from_object_actor: true,
            handled_by: self.node().to_string(),
            ..envelope.message().clone()
        })?;
        Ok(envelope)
    }

    /// Collects whatever arrives within `wait`.
    pub async fn drain(&mut self, wait: Duration) -> Vec<SupervisorMessage<Echo>> {
        tokio::time::sleep(wait).await;
        let mut received = Vec::new();
        while let Ok(message) = self.inbox.try_recv() {
            received.push(message);
        }
        received
    }
}
