//! Integration tests for the agent facade against the loopback environment.
//!
//! All tests run on a paused tokio clock so reconnect waits, goal retries
//! and meals complete instantly.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use vibe_core::agent::{Agent, ShutdownReason};
use vibe_core::config::BotConfig;
use vibe_core::dispatcher::{EventHandler, HandlerResult, Outcome};
use vibe_core::loopback::{Command, LoopbackConnector, LoopbackWorld};
use vibe_types::{Coordinate, EntityId, EntityKind, Event, EventKind, Hand};

// =============================================================================
// Helpers
// =============================================================================

fn agent_for(world: &Arc<LoopbackWorld>, config: &BotConfig) -> Arc<Agent> {
    Agent::new(
        config,
        Arc::new(LoopbackConnector::new(Arc::clone(world))),
        Arc::new(world.game_data().clone()),
    )
}

/// Let the event pump drain the channel.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

struct TickCounter(AtomicU32);

impl EventHandler for TickCounter {
    fn name(&self) -> &str {
        "Tick Counter"
    }

    fn handle(&self, _event: &Event) -> HandlerResult {
        self.0.fetch_add(1, Ordering::Relaxed);
        Ok(Outcome::Acted)
    }
}

// =============================================================================
// Activation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn ticks_activate_after_single_spawn() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();
    settle().await;

    assert_eq!(agent.spawn_count(), 1);
    assert!(agent.dispatcher().ticks_active());
    assert!(agent.dispatcher().handlers_enabled());
}

#[tokio::test(start_paused = true)]
async fn double_spawn_host_waits_for_second_spawn() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    let mut config = BotConfig::default();
    config.connection.host = "connect.2b2t.org".to_owned();
    let agent = agent_for(&world, &config);
    agent.connect().await.unwrap();
    settle().await;
    assert!(!agent.dispatcher().ticks_active());

    world.emit(vibe_types::EnvironmentEvent::Spawn);
    settle().await;
    assert_eq!(agent.spawn_count(), 2);
    assert!(agent.dispatcher().ticks_active());
}

#[tokio::test(start_paused = true)]
async fn ticks_before_activation_still_advance_the_counter() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.set_spawns_on_join(0);
    let agent = agent_for(&world, &BotConfig::default());
    let counter = Arc::new(TickCounter(AtomicU32::new(0)));
    agent.dispatcher().register(EventKind::Tick, counter.clone());
    agent.connect().await.unwrap();

    world.run_ticks(5);
    settle().await;
    assert_eq!(counter.0.load(Ordering::Relaxed), 0);
    assert_eq!(agent.dispatcher().current_slot().value(), 5);
}

#[tokio::test(start_paused = true)]
async fn activation_timeout_shuts_the_agent_down() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.set_spawns_on_join(0);
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    assert!(!agent.wait_for_active_ticks(Duration::from_secs(3)).await);
    assert_eq!(agent.shutdown_reason(), Some(ShutdownReason::ActivationTimeout));
    assert!(!agent.is_connected());
}

// =============================================================================
// Disconnect and reconnect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn disconnect_stops_all_delivery() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    let agent = agent_for(&world, &BotConfig::default());
    let counter = Arc::new(TickCounter(AtomicU32::new(0)));
    agent.dispatcher().register(EventKind::Tick, counter.clone());
    agent.connect().await.unwrap();
    settle().await;

    world.run_ticks(3);
    settle().await;
    assert_eq!(counter.0.load(Ordering::Relaxed), 3);

    agent.disconnect();
    assert!(!world.is_open());
    assert!(!world.tick());
    settle().await;
    assert_eq!(counter.0.load(Ordering::Relaxed), 3);
    assert!(!agent.dispatcher().handlers_enabled());
    assert!(world.commands().contains(&Command::End));
}

#[tokio::test(start_paused = true)]
async fn scheduled_reconnect_resumes_the_goal() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();
    settle().await;

    let target = Coordinate::new(100.0, 0.0, 0.0);
    assert!(agent.goto(target).unwrap());
    assert!(agent.schedule_reconnect(Duration::from_secs(10), true));
    assert!(!agent.is_connected());
    assert!(world.current_goal().is_none());

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(world.connect_count(), 2);
    assert!(agent.is_connected());
    assert_eq!(world.current_goal(), Some(target));
    assert_eq!(agent.reconnect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_budget_exhaustion_shuts_down() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    let mut config = BotConfig::default();
    config.safety.max_consecutive_reconnects = 2;
    let agent = agent_for(&world, &config);
    agent.connect().await.unwrap();

    assert!(agent.schedule_reconnect(Duration::from_secs(1), false));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(agent.schedule_reconnect(Duration::from_secs(1), false));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!agent.schedule_reconnect(Duration::from_secs(1), false));

    assert_eq!(
        agent.shutdown_reason(),
        Some(ShutdownReason::ReconnectBudgetExhausted)
    );
    assert_eq!(agent.reconnect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_wakes_waiters_with_first_reason() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    let waiter = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.wait_for_shutdown().await })
    };
    settle().await;
    agent.shutdown(ShutdownReason::Arrived);
    agent.shutdown(ShutdownReason::Requested);

    assert_eq!(waiter.await.unwrap(), ShutdownReason::Arrived);
}

// =============================================================================
// Movement
// =============================================================================

#[tokio::test(start_paused = true)]
async fn goal_set_is_retried_until_accepted() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.fail_goal_sets(2);
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    let target = Coordinate::new(5.0, 0.0, 5.0);
    assert!(!agent.goto(target).unwrap());
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(world.current_goal(), Some(target));
    assert!(!agent.is_shutdown_requested());
}

#[tokio::test(start_paused = true)]
async fn exhausted_goal_retries_reconnect_and_resume_the_goal() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.fail_goal_sets(5);
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    let target = Coordinate::new(5.0, 0.0, 5.0);
    assert!(!agent.goto(target).unwrap());
    tokio::time::sleep(Duration::from_secs(20)).await;

    let attempts = world
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::SetGoal { .. }))
        .count();
    assert_eq!(attempts, 6);
    assert_eq!(agent.reconnect_count(), 1);
    assert_eq!(world.connect_count(), 2);
    assert!(agent.is_connected());
    assert!(agent.shutdown_reason().is_none());
    assert_eq!(world.current_goal(), Some(target));
}

#[tokio::test(start_paused = true)]
async fn goal_that_never_sets_spends_the_reconnect_budget() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.fail_goal_sets(1_000);
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    agent.goto(Coordinate::new(5.0, 0.0, 5.0)).unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(agent.reconnect_count(), 3);
    assert_eq!(
        agent.shutdown_reason(),
        Some(ShutdownReason::ReconnectBudgetExhausted)
    );
}

#[tokio::test]
async fn goto_without_session_is_an_error() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    let agent = agent_for(&world, &BotConfig::default());
    assert!(agent.goto(Coordinate::ORIGIN).is_err());
}

// =============================================================================
// Eating
// =============================================================================

#[tokio::test(start_paused = true)]
async fn eat_raises_food_level() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.set_food(Some(10));
    world.hold(Hand::Main, "cooked_beef", 4);
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    assert!(agent.eat(Duration::from_secs(5)).await.unwrap());
    assert_eq!(agent.food(), Some(18));
    assert!(!agent.is_eating());
}

#[tokio::test(start_paused = true)]
async fn second_meal_is_declined_while_the_first_holds_the_lock() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.set_food(Some(10));
    world.hold(Hand::Main, "cooked_beef", 4);
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    let first = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move { agent.eat(Duration::from_secs(5)).await })
    };
    tokio::task::yield_now().await;
    assert!(agent.is_eating());

    assert!(!agent.eat(Duration::from_secs(5)).await.unwrap());
    assert!(first.await.unwrap().unwrap());
    assert!(!agent.is_eating());
    assert_eq!(agent.food(), Some(18));
}

#[tokio::test(start_paused = true)]
async fn eat_times_out_without_food_in_hand() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.set_food(Some(10));
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    assert!(!agent.eat(Duration::from_secs(2)).await.unwrap());
    assert_eq!(agent.food(), Some(10));
}

#[tokio::test(start_paused = true)]
async fn eating_pauses_and_resumes_the_goal() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.set_food(Some(10));
    world.hold(Hand::Main, "bread", 4);
    let mut config = BotConfig::default();
    config.connection.pause_pathing_to_eat = Some(true);
    let agent = agent_for(&world, &config);
    agent.connect().await.unwrap();

    let target = Coordinate::new(50.0, 0.0, 0.0);
    agent.goto(target).unwrap();
    world.clear_commands();
    assert!(agent.eat(Duration::from_secs(5)).await.unwrap());

    let commands = world.commands();
    assert_eq!(commands.first(), Some(&Command::StopPathing));
    assert_eq!(
        commands.last(),
        Some(&Command::SetGoal {
            target,
            range: vibe_core::agent::GOAL_RANGE
        })
    );
    assert_eq!(world.current_goal(), Some(target));
}

// =============================================================================
// State queries
// =============================================================================

#[tokio::test]
async fn entities_exclude_self_and_resolve_names() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.add_player(EntityId(2), "stranger", Coordinate::new(3.0, 0.0, 0.0));
    world.drop_item(EntityId(3), "elytra", Coordinate::new(1.0, 0.0, 1.0));
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    let entities = agent.entities();
    assert_eq!(entities.len(), 2);
    assert!(entities.iter().any(|e| e.kind == EntityKind::Player
        && e.display_name.as_deref() == Some("stranger")));
    assert!(entities.iter().any(|e| e.kind == EntityKind::Item
        && e.display_name.as_deref() == Some("elytra")));
    assert_eq!(agent.raw_entities().len(), 3);
}

#[tokio::test]
async fn entity_near_picks_the_closest_match() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.add_player(EntityId(2), "a", Coordinate::new(10.0, 0.0, 0.0));
    world.add_player(EntityId(3), "b", Coordinate::new(10.5, 0.0, 0.0));
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    let near = Coordinate::new(10.1, 0.0, 0.0);
    assert_eq!(agent.entity_near(&near, 1.0).unwrap().id, EntityId(2));
    assert!(agent.entity_near(&Coordinate::new(50.0, 0.0, 0.0), 1.0).is_none());
}

#[tokio::test]
async fn status_serializes_current_state() {
    let world = LoopbackWorld::new(Coordinate::new(1.0, 64.0, 2.0));
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    let status = agent.status();
    assert!(status.connected);
    assert_eq!(status.position, Some(Coordinate::new(1.0, 64.0, 2.0)));
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["username"], "vibe_bot");
}

#[tokio::test]
async fn shield_is_equipped_to_the_off_hand() {
    let world = LoopbackWorld::new(Coordinate::ORIGIN);
    world.give("shield", 1);
    let agent = agent_for(&world, &BotConfig::default());
    agent.connect().await.unwrap();

    assert!(agent.equip_shield().unwrap());
    assert_eq!(agent.item_in_hand(Hand::Off).unwrap().name, "shield");
    world.clear_commands();
    assert!(agent.equip_shield().unwrap());
    assert!(world.commands().is_empty());
}
