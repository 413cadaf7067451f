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

//! One real supervisor per test; the other nodes are stand-ins that record
//! what the supervisor sends them and answer by hand.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use acton_cluster::prelude::*;

use crate::setup::*;

mod setup;

fn started_cluster(nodes: &[&UniqueAddress], leader: &UniqueAddress) -> LocalCluster<Echo> {
    let cluster = LocalCluster::new();
    for node in nodes {
        cluster.join((*node).clone(), [ROLE]);
    }
    cluster.elect(ROLE, Some(leader.address.clone()));
    cluster
}

fn ask_later(
    supervisor: &SupervisorHandle<Echo>,
    id: &str,
    text: &str,
) -> tokio::task::JoinHandle<Result<Echo, SupervisorError>> {
    let supervisor = supervisor.clone();
    let message = Echo::new(id, text);
    tokio::spawn(async move { supervisor.ask(message, PATIENCE).await })
}

#[tokio::test]
async fn leader_creates_object_on_chosen_node_and_forwards() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let peer = node(2);
    let cluster = started_cluster(&[&leader, &peer], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let mut stand_in = StandIn::register(&cluster, peer.clone());
    let supervisor = builder(&cluster, &store, &leader, fast_config(), &creations)
        .with_placement(PreferNodes(vec![peer.clone()]))
        .start();
    wait_status(&supervisor, |status| status.is_ready && status.is_leader).await?;

    let reply = ask_later(&supervisor, "1", "hello");

    let command = stand_in.expect_create_child().await?;
    assert_eq!(command.id, "1");
    assert_eq!(command.requested_by, leader);
    supervisor.send(SupervisorMessage::ChildCreated(ChildCreated::new(
        "1".to_string(),
        ChildLocation::new(peer.clone(), "echo/1"),
    )))?;

    let envelope = stand_in.answer_routed().await?;
    assert_eq!(envelope.object_id(), "1");
    assert_eq!(envelope.message().text, "hello");

    let reply = reply.await??;
    assert!(reply.from_object_actor);
    assert_eq!(reply.handled_by, peer.to_string());
    assert_eq!(creations.count(), 0, "nothing may be created on the leader");

    wait_key(&store, &keys().child_address("1"), true).await?;
    let location = directory(&store).get_child_address("1").await?;
    assert_eq!(location.map(|location| location.node), Some(peer));
    wait_key(&store, &keys().creation_lock("1"), false).await?;

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn held_creation_lock_defers_creation_until_released() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let cluster = started_cluster(&[&leader], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let lock_key = keys().creation_lock("1");
    store.set(&lock_key, "elsewhere".to_string(), None).await?;

    let config = fast_config().with_max_lock_waits(200);
    let supervisor = builder(&cluster, &store, &leader, config, &creations).start();
    wait_status(&supervisor, |status| status.is_ready).await?;

    let reply = ask_later(&supervisor, "1", "patience");
    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = supervisor.status().await?;
    assert_eq!(status.pending_creations, vec!["1".to_string()]);
    assert!(status.local_children.is_empty());
    assert_eq!(creations.count(), 0);
    assert!(!reply.is_finished());

    store.delete(&lock_key).await?;

    let reply = reply.await??;
    assert!(reply.from_object_actor);
    assert_eq!(creations.count(), 1);
    wait_key(&store, &lock_key, false).await?;

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn lazy_migration_recreates_on_next_message() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let first = node(2);
    let second = node(3);
    let cluster = started_cluster(&[&leader, &first, &second], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let mut first_stand_in = StandIn::register(&cluster, first.clone());
    let mut second_stand_in = StandIn::register(&cluster, second.clone());
    let config = fast_config().with_migration(MigrationPolicy::Lazy);
    let supervisor = builder(&cluster, &store, &leader, config, &creations)
        .with_placement(PreferNodes(vec![first.clone(), second.clone()]))
        .start();
    wait_status(&supervisor, |status| status.is_ready).await?;

    let reply = ask_later(&supervisor, "1", "before");
    first_stand_in.expect_create_child().await?;
    supervisor.send(SupervisorMessage::ChildCreated(ChildCreated::new(
        "1".to_string(),
        ChildLocation::new(first.clone(), "echo/1"),
    )))?;
    first_stand_in.answer_routed().await?;
    assert_eq!(reply.await??.handled_by, first.to_string());

    cluster.remove(&first);
    wait_status(&supervisor, |status| !status.children.contains_key("1")).await?;
    let early = second_stand_in.drain(Duration::from_millis(200)).await;
    assert!(
        !early.iter().any(|message| matches!(message, SupervisorMessage::CreateChild(_))),
        "lazy migration must wait for a message"
    );

    let reply = ask_later(&supervisor, "1", "after");
    let command = second_stand_in.expect_create_child().await?;
    assert_eq!(command.id, "1");
    supervisor.send(SupervisorMessage::ChildCreated(ChildCreated::new(
        "1".to_string(),
        ChildLocation::new(second.clone(), "echo/1"),
    )))?;
    let envelope = second_stand_in.answer_routed().await?;
    assert_eq!(envelope.message().text, "after");
    assert_eq!(reply.await??.handled_by, second.to_string());

    wait_status(&supervisor, |status| {
        status.children.get("1").map(|location| &location.node) == Some(&second)
    })
    .await?;
    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn eager_migration_recreates_when_owner_leaves() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let first = node(2);
    let second = node(3);
    let cluster = started_cluster(&[&leader, &first, &second], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let mut first_stand_in = StandIn::register(&cluster, first.clone());
    let mut second_stand_in = StandIn::register(&cluster, second.clone());
    let supervisor = builder(&cluster, &store, &leader, fast_config(), &creations)
        .with_placement(PreferNodes(vec![first.clone(), second.clone()]))
        .start();
    wait_status(&supervisor, |status| status.is_ready).await?;

    let reply = ask_later(&supervisor, "1", "before");
    first_stand_in.expect_create_child().await?;
    supervisor.send(SupervisorMessage::ChildCreated(ChildCreated::new(
        "1".to_string(),
        ChildLocation::new(first.clone(), "echo/1"),
    )))?;
    first_stand_in.answer_routed().await?;
    reply.await??;

    cluster.remove(&first);
    let command = second_stand_in.expect_create_child().await?;
    assert_eq!(command.id, "1");

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn non_leader_forwards_to_leader_without_creating() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let follower = node(2);
    let cluster = started_cluster(&[&leader, &follower], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let mut leader_stand_in = StandIn::register(&cluster, leader.clone());
    let supervisor = builder(&cluster, &store, &follower, fast_config(), &creations).start();
    wait_status(&supervisor, |status| status.is_ready && !status.is_leader).await?;

    let reply = ask_later(&supervisor, "1", "relay");
    let envelope = leader_stand_in.answer_routed().await?;
    assert_eq!(envelope.hops(), 1);
    assert_eq!(reply.await??.handled_by, leader.to_string());

    let status = supervisor.status().await?;
    assert!(status.pending_creations.is_empty());
    assert!(status.local_children.is_empty());
    assert_eq!(creations.count(), 0);
    assert!(!store.exists(&keys().creation_lock("1")).await?);

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn leader_hosts_locally_and_reuses_the_object() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let cluster = started_cluster(&[&leader], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let supervisor = builder(&cluster, &store, &leader, fast_config(), &creations).start();

    let first = supervisor.ask(Echo::new("1", "one"), PATIENCE).await?;
    let second = supervisor.ask(Echo::new("1", "two"), PATIENCE).await?;
    assert_eq!(first.handled_by, leader.to_string());
    assert_eq!(second.text, "two");
    assert_eq!(creations.count(), 1);

    let status = supervisor.status().await?;
    assert_eq!(status.local_children, vec!["1".to_string()]);
    assert_eq!(status.children.get("1").map(|location| location.path.as_str()), Some("echo/1"));

    let rejected = supervisor.ask(Echo::new("1", "reject"), PATIENCE).await;
    assert!(matches!(
        rejected,
        Err(SupervisorError::Delivery(DeliveryFailure::Rejected { ref id, .. })) if id == "1"
    ));

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn late_joiner_is_reset_and_told_about_hosted_objects() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let joiner = node(2);
    let cluster = started_cluster(&[&leader], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let supervisor = builder(&cluster, &store, &leader, fast_config(), &creations).start();
    supervisor.ask(Echo::new("1", "hosted"), PATIENCE).await?;

    let mut stand_in = StandIn::register(&cluster, joiner.clone());
    cluster.join(joiner.clone(), [ROLE]);

    let first = stand_in
        .expect(|message| match message {
            SupervisorMessage::ResetChildren => Some("reset"),
            SupervisorMessage::ChildCreated(_) => Some("created"),
            _ => None,
        })
        .await?;
    assert_eq!(first, "reset");
    let created = stand_in
        .expect(|message| match message {
            SupervisorMessage::ChildCreated(created) => Some(created),
            _ => None,
        })
        .await?;
    assert_eq!(created.id, "1");
    assert_eq!(created.location.node, leader);

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn messages_wait_for_a_leader() -> anyhow::Result<()> {
    initialize_tracing();
    let only = node(1);
    let cluster = LocalCluster::new();
    cluster.join(only.clone(), [ROLE]);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let supervisor = builder(&cluster, &store, &only, fast_config(), &creations).start();

    let reply = ask_later(&supervisor, "1", "early");
    wait_status(&supervisor, |status| status.stashed == 1 && !status.is_ready).await?;
    assert_eq!(creations.count(), 0);

    cluster.elect(ROLE, Some(only.address.clone()));
    assert_eq!(reply.await??.text, "early");

    cluster.elect(ROLE, None);
    let reply = ask_later(&supervisor, "2", "leaderless");
    wait_status(&supervisor, |status| status.stashed == 1).await?;
    assert_eq!(creations.count(), 1);

    cluster.elect(ROLE, Some(only.address.clone()));
    assert_eq!(reply.await??.text, "leaderless");
    assert_eq!(creations.count(), 2);

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn unacknowledged_forwards_fail_as_unreachable() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let follower = node(2);
    let cluster = started_cluster(&[&leader, &follower], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let _silent_leader = StandIn::register(&cluster, leader.clone());
    let config = fast_config().with_max_delivery_attempts(3);
    let supervisor = builder(&cluster, &store, &follower, config, &creations).start();
    wait_status(&supervisor, |status| status.is_ready).await?;

    let outcome = supervisor.ask(Echo::new("1", "anyone?"), PATIENCE).await;
    assert!(matches!(
        outcome,
        Err(SupervisorError::Delivery(DeliveryFailure::Unreachable { ref id, attempts: 3 })) if id == "1"
    ));

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn creation_gives_up_after_max_attempts_and_releases_lock() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let peer = node(2);
    let cluster = started_cluster(&[&leader, &peer], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let mut unresponsive = StandIn::register(&cluster, peer.clone());
    let config = fast_config()
        .with_create_child_timeout(Duration::from_millis(100))
        .with_next_attempt_pause(Duration::from_millis(20))
        .with_max_creation_attempts(3);
    let supervisor = builder(&cluster, &store, &leader, config, &creations)
        .with_placement(PreferNodes(vec![peer.clone()]))
        .start();
    wait_status(&supervisor, |status| status.is_ready).await?;

    let outcome = supervisor.ask(Echo::new("1", "hello?"), PATIENCE).await;
    assert!(matches!(
        outcome,
        Err(SupervisorError::Delivery(DeliveryFailure::CreationExhausted { ref id, attempts: 3 })) if id == "1"
    ));

    let commands = unresponsive
        .drain(Duration::from_millis(50))
        .await
        .into_iter()
        .filter(|message| matches!(message, SupervisorMessage::CreateChild(_)))
        .count();
    assert_eq!(commands, 3);
    wait_key(&store, &keys().creation_lock("1"), false).await?;
    assert!(supervisor.status().await?.pending_creations.is_empty());

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn empty_identity_is_rejected() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let cluster = started_cluster(&[&leader], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let supervisor = builder(&cluster, &store, &leader, fast_config(), &creations).start();

    let outcome = supervisor.ask(Echo::new("", "nobody"), PATIENCE).await;
    assert!(matches!(
        outcome,
        Err(SupervisorError::Delivery(DeliveryFailure::InvalidIdentity))
    ));
    assert_eq!(creations.count(), 0);

    supervisor.stop().await;
    Ok(())
}

/// Panics the first time it is asked.
#[derive(Debug, Default)]
struct FaultyPlacement {
    tripped: AtomicBool,
}

impl PlacementStrategy for FaultyPlacement {
    fn select_node(&self, _id: &str, _members: &[UniqueAddress], local: &UniqueAddress) -> UniqueAddress {
        assert!(self.tripped.swap(true, Ordering::SeqCst), "placement blew up");
        local.clone()
    }
}

#[tokio::test]
async fn supervisor_restarts_after_a_panic_and_keeps_serving() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let cluster = started_cluster(&[&leader], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let supervisor = builder(&cluster, &store, &leader, fast_config(), &creations)
        .with_placement(FaultyPlacement::default())
        .start();

    let outcome = supervisor.ask(Echo::new("1", "boom"), PATIENCE).await;
    assert!(matches!(
        outcome,
        Err(SupervisorError::Delivery(DeliveryFailure::SupervisorRestarted { ref id })) if id == "1"
    ));

    let reply = supervisor.ask(Echo::new("1", "again"), PATIENCE).await?;
    assert_eq!(reply.text, "again");
    assert_eq!(creations.count(), 1);

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_fails_messages_waiting_for_readiness() -> anyhow::Result<()> {
    initialize_tracing();
    let only = node(1);
    let cluster = LocalCluster::new();
    cluster.join(only.clone(), [ROLE]);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let supervisor = builder(&cluster, &store, &only, fast_config(), &creations).start();

    let reply = ask_later(&supervisor, "1", "never");
    wait_status(&supervisor, |status| status.stashed == 1).await?;
    supervisor.stop().await;

    assert!(matches!(
        reply.await?,
        Err(SupervisorError::Delivery(DeliveryFailure::SupervisorStopped { .. }))
    ));
    assert!(supervisor.is_closed());
    Ok(())
}

#[tokio::test]
async fn messages_queued_behind_stop_are_failed() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let cluster = started_cluster(&[&leader], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let supervisor = builder(&cluster, &store, &leader, fast_config(), &creations).start();
    wait_status(&supervisor, |status| status.is_ready).await?;

    let (reply_to, mut replies) = ReplyAddress::channel();
    supervisor.send(SupervisorMessage::Stop)?;
    supervisor.tell(Echo::new("1", "too late"), reply_to)?;
    supervisor.stop().await;

    let response = tokio::time::timeout(PATIENCE, replies.recv()).await?;
    assert!(matches!(
        response,
        Some(ObjectResponse::Failed(DeliveryFailure::SupervisorStopped { ref id })) if id == "1"
    ));
    assert_eq!(creations.count(), 0);
    Ok(())
}

/// Places on the listed nodes in turn, staying on the last one.
#[derive(Debug)]
struct InTurn {
    nodes: Vec<UniqueAddress>,
    next: AtomicUsize,
}

impl InTurn {
    fn new(nodes: Vec<UniqueAddress>) -> Self {
        Self {
            nodes,
            next: AtomicUsize::new(0),
        }
    }
}

impl PlacementStrategy for InTurn {
    fn select_node(&self, _id: &str, _members: &[UniqueAddress], local: &UniqueAddress) -> UniqueAddress {
        let turn = self.next.fetch_add(1, Ordering::SeqCst);
        self.nodes
            .get(turn.min(self.nodes.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_else(|| local.clone())
    }
}

#[tokio::test]
async fn late_announcement_after_retry_stops_the_duplicate() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let slow = node(2);
    let owner = node(3);
    let cluster = started_cluster(&[&leader, &slow, &owner], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let mut slow_stand_in = StandIn::register(&cluster, slow.clone());
    let mut owner_stand_in = StandIn::register(&cluster, owner.clone());
    let config = fast_config()
        .with_create_child_timeout(Duration::from_millis(100))
        .with_next_attempt_pause(Duration::from_millis(20));
    let supervisor = builder(&cluster, &store, &leader, config, &creations)
        .with_placement(InTurn::new(vec![slow.clone(), owner.clone()]))
        .start();
    wait_status(&supervisor, |status| status.is_ready).await?;

    let reply = ask_later(&supervisor, "1", "hello");
    slow_stand_in.expect_create_child().await?;
    owner_stand_in.expect_create_child().await?;
    supervisor.send(SupervisorMessage::ChildCreated(ChildCreated::new(
        "1".to_string(),
        ChildLocation::new(owner.clone(), "echo/1"),
    )))?;
    owner_stand_in.answer_routed().await?;
    assert_eq!(reply.await??.handled_by, owner.to_string());

    // the first attempt finally completes on the slow node
    supervisor.send(SupervisorMessage::ChildCreated(ChildCreated::new(
        "1".to_string(),
        ChildLocation::new(slow.clone(), "echo/1"),
    )))?;
    let stop = slow_stand_in
        .expect(|message| match message {
            SupervisorMessage::StopChild(stop) => Some(stop),
            _ => None,
        })
        .await?;
    assert_eq!(stop, StopChild::new("1".to_string(), slow.clone()));

    let status = supervisor.status().await?;
    assert_eq!(status.children.get("1").map(|location| &location.node), Some(&owner));
    wait_key(&store, &keys().child_address("1"), true).await?;
    let stored = directory(&store).get_child_address("1").await?;
    assert_eq!(stored.map(|location| location.node), Some(owner.clone()));
    assert!(
        !owner_stand_in
            .drain(Duration::from_millis(50))
            .await
            .iter()
            .any(|message| matches!(message, SupervisorMessage::StopChild(_))),
        "the registered owner keeps its object"
    );

    supervisor.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_child_retires_only_this_incarnation() -> anyhow::Result<()> {
    initialize_tracing();
    let leader = node(1);
    let cluster = started_cluster(&[&leader], &leader);
    let store = MemoryStore::new();
    let creations = Creations::default();
    let supervisor = builder(&cluster, &store, &leader, fast_config(), &creations).start();
    supervisor.ask(Echo::new("1", "hosted"), PATIENCE).await?;

    let earlier = UniqueAddress::new(leader.address.clone(), 0);
    supervisor.send(SupervisorMessage::StopChild(StopChild::new("1".to_string(), earlier)))?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(supervisor.status().await?.local_children, vec!["1".to_string()]);

    supervisor.send(SupervisorMessage::StopChild(StopChild::new("1".to_string(), leader.clone())))?;
    wait_status(&supervisor, |status| {
        status.local_children.is_empty() && !status.children.contains_key("1")
    })
    .await?;

    supervisor.stop().await;
    Ok(())
}
