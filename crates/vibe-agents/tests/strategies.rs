//! End-to-end strategy tests against the loopback environment.
//!
//! Every test runs on a paused tokio clock: cycle sleeps, pathfinding
//! timeouts and reconnect waits elapse instantly once the runtime is idle.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use std::sync::Arc;
use std::time::Duration;

use vibe_agents::{HighwayStrategy, VillagerTradeStrategy, build_strategy};
use vibe_core::agent::{Agent, ShutdownReason};
use vibe_core::config::{BotConfig, StrategyKind};
use vibe_core::loopback::{Command, LoopbackConnector, LoopbackWorld};
use vibe_core::strategy::{Strategy, StrategyError};
use vibe_types::{
    Coordinate, EntityId, EventKind, OfferItem, TICKS_PER_WINDOW, TickSlot, TradeOffer,
};

// =============================================================================
// Helpers
// =============================================================================

const HOME: Coordinate = Coordinate::new(0.0, 64.0, 0.0);

async fn connected(world: &Arc<LoopbackWorld>, config: &BotConfig) -> Arc<Agent> {
    let agent = Agent::new(
        config,
        Arc::new(LoopbackConnector::new(Arc::clone(world))),
        Arc::new(world.game_data().clone()),
    );
    agent.connect().await.unwrap();
    assert!(agent.wait_for_active_ticks(Duration::from_secs(5)).await);
    agent
}

fn bottle_offer(max_uses: u32) -> TradeOffer {
    TradeOffer {
        input: OfferItem::new("emerald", 1),
        secondary_input: None,
        output: OfferItem::new("experience_bottle", 1),
        uses: 0,
        max_uses,
        disabled: false,
    }
}

fn count(world: &LoopbackWorld, matches: impl Fn(&Command) -> bool) -> usize {
    world.commands().iter().filter(|c| matches(c)).count()
}

fn is_trade(command: &Command) -> bool {
    matches!(command, Command::Trade { .. })
}

// =============================================================================
// Villager trade cycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn no_villagers_ends_the_loop_without_trading_or_sleeping() {
    let world = LoopbackWorld::new(HOME);
    world.give("emerald", 32);
    let agent = connected(&world, &BotConfig::default()).await;
    let strategy = Arc::new(VillagerTradeStrategy::new(agent, &BotConfig::default().trade));

    let started = tokio::time::Instant::now();
    Arc::clone(&strategy).start().unwrap();
    tokio::time::timeout(Duration::from_secs(1), strategy.finished())
        .await
        .expect("loop should end at once");

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!strategy.is_running());
    assert_eq!(count(&world, is_trade), 0);
    assert_eq!(count(&world, |c| matches!(c, Command::OpenVillager(_))), 0);
    assert_eq!(strategy.summary().cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn no_currency_ends_the_loop() {
    let world = LoopbackWorld::new(HOME);
    world.add_villager(EntityId(7), Coordinate::new(1.0, 64.0, 1.0), "cleric", vec![bottle_offer(12)]);
    let agent = connected(&world, &BotConfig::default()).await;
    let strategy = Arc::new(VillagerTradeStrategy::new(agent, &BotConfig::default().trade));

    Arc::clone(&strategy).start().unwrap();
    tokio::time::timeout(Duration::from_secs(1), strategy.finished())
        .await
        .unwrap();
    assert_eq!(count(&world, |c| matches!(c, Command::OpenVillager(_))), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausting_currency_ends_the_loop_without_the_long_sleep() {
    let world = LoopbackWorld::new(HOME);
    world.give("emerald", 2);
    world.add_villager(EntityId(7), Coordinate::new(1.0, 64.0, 1.0), "cleric", vec![bottle_offer(12)]);
    world.add_villager(EntityId(8), Coordinate::new(2.0, 64.0, -1.0), "cleric", vec![bottle_offer(12)]);
    let agent = connected(&world, &BotConfig::default()).await;
    let strategy = Arc::new(VillagerTradeStrategy::new(agent, &BotConfig::default().trade));

    let started = tokio::time::Instant::now();
    Arc::clone(&strategy).start().unwrap();
    tokio::time::timeout(Duration::from_secs(60), strategy.finished())
        .await
        .expect("loop should end once emeralds run out");

    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(count(&world, is_trade), 2);
    assert_eq!(world.count_of("emerald"), 0);
    assert_eq!(world.count_of("experience_bottle"), 2);
    // The second villager is never visited.
    assert_eq!(
        world.commands().iter().filter(|c| **c == Command::OpenVillager(EntityId(8))).count(),
        0
    );
    let summary = strategy.summary();
    assert_eq!(summary.trades, 2);
    assert_eq!(summary.villagers_traded, 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_offer_moves_on_and_the_cycle_sleeps() {
    let world = LoopbackWorld::new(HOME);
    world.give("emerald", 64);
    world.add_villager(EntityId(7), Coordinate::new(1.0, 64.0, 1.0), "cleric", vec![bottle_offer(3)]);
    let agent = connected(&world, &BotConfig::default()).await;
    let strategy = Arc::new(VillagerTradeStrategy::new(agent, &BotConfig::default().trade));

    Arc::clone(&strategy).start().unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(strategy.is_running());
    assert_eq!(count(&world, is_trade), 3);
    assert_eq!(count(&world, |c| *c == Command::CloseWindow), 1);
    assert_eq!(strategy.summary().cycles, 1);

    strategy.stop();
    tokio::time::timeout(Duration::from_secs(1), strategy.finished())
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_trade_abandons_the_villager_for_this_cycle() {
    let world = LoopbackWorld::new(HOME);
    world.give("emerald", 64);
    world.fail_trades(true);
    world.add_villager(EntityId(7), Coordinate::new(1.0, 64.0, 1.0), "cleric", vec![bottle_offer(12)]);
    let agent = connected(&world, &BotConfig::default()).await;
    let strategy = Arc::new(VillagerTradeStrategy::new(agent, &BotConfig::default().trade));

    Arc::clone(&strategy).start().unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(count(&world, is_trade), 1);
    assert!(strategy.is_running());
    strategy.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_mid_trade_closes_the_window_and_halts() {
    let world = LoopbackWorld::new(HOME);
    world.give("emerald", 64);
    world.add_villager(EntityId(7), Coordinate::new(1.0, 64.0, 1.0), "cleric", vec![bottle_offer(0)]);
    let agent = connected(&world, &BotConfig::default()).await;
    let strategy = Arc::new(VillagerTradeStrategy::new(agent, &BotConfig::default().trade));

    Arc::clone(&strategy).start().unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let trades_before_stop = count(&world, is_trade);
    assert!(trades_before_stop >= 1);

    strategy.stop();
    assert_eq!(count(&world, |c| *c == Command::CloseWindow), 1);
    tokio::time::timeout(Duration::from_secs(2), strategy.finished())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(count(&world, is_trade), trades_before_stop);
    assert_eq!(count(&world, |c| *c == Command::CloseWindow), 1);
    strategy.stop();
}

#[tokio::test(start_paused = true)]
async fn walks_to_a_distant_villager_before_trading() {
    let world = LoopbackWorld::new(HOME);
    world.give("emerald", 3);
    let villager = Coordinate::new(20.0, 64.0, 0.0);
    world.add_villager(EntityId(7), villager, "cleric", vec![bottle_offer(12)]);
    let ticker = world.spawn_ticker(Duration::from_millis(50));
    let agent = connected(&world, &BotConfig::default()).await;
    let strategy = Arc::new(VillagerTradeStrategy::new(Arc::clone(&agent), &BotConfig::default().trade));

    Arc::clone(&strategy).start().unwrap();
    tokio::time::timeout(Duration::from_secs(60), strategy.finished())
        .await
        .unwrap();
    ticker.abort();

    assert_eq!(strategy.summary().trades, 3);
    assert!(agent.position().unwrap().distance(&villager) <= 3.0);
    assert!(world.commands().contains(&Command::StopPathing));
}

#[tokio::test(start_paused = true)]
async fn unreachable_villager_counts_as_a_failed_visit() {
    let world = LoopbackWorld::new(HOME);
    world.give("emerald", 8);
    world.set_stuck(true);
    world.add_villager(EntityId(7), Coordinate::new(40.0, 64.0, 0.0), "cleric", vec![bottle_offer(12)]);
    let agent = connected(&world, &BotConfig::default()).await;
    let strategy = Arc::new(VillagerTradeStrategy::new(agent, &BotConfig::default().trade));

    Arc::clone(&strategy).start().unwrap();
    tokio::time::sleep(Duration::from_secs(35)).await;

    let summary = strategy.summary();
    assert_eq!(summary.failed_visits, 1);
    assert_eq!(summary.trades, 0);
    assert!(strategy.is_running());
    strategy.stop();
}

#[tokio::test(start_paused = true)]
async fn rejected_goal_reconnects_instead_of_stopping_the_agent() {
    let world = LoopbackWorld::new(HOME);
    world.give("emerald", 8);
    world.set_stuck(true);
    world.fail_goal_sets(5);
    world.add_villager(EntityId(7), Coordinate::new(40.0, 64.0, 0.0), "cleric", vec![bottle_offer(12)]);
    let agent = connected(&world, &BotConfig::default()).await;
    let strategy = Arc::new(VillagerTradeStrategy::new(Arc::clone(&agent), &BotConfig::default().trade));

    Arc::clone(&strategy).start().unwrap();
    tokio::time::sleep(Duration::from_secs(40)).await;

    assert!(agent.shutdown_reason().is_none());
    assert_eq!(agent.reconnect_count(), 1);
    assert!(agent.is_connected());
    let summary = strategy.summary();
    assert_eq!(summary.failed_visits, 1);
    assert_eq!(summary.trades, 0);
    assert!(strategy.is_running());
    strategy.stop();
}

// =============================================================================
// Highway
// =============================================================================

fn highway_config(target: Coordinate) -> BotConfig {
    let mut config = BotConfig::default();
    config.strategy.target = target;
    config.strategy.required_y = target.y;
    config.strategy.debug = true;
    config
}

#[tokio::test(start_paused = true)]
async fn highway_rejects_a_target_off_the_highway() {
    let world = LoopbackWorld::new(Coordinate::new(0.0, 120.0, 0.0));
    let mut config = BotConfig::default();
    config.strategy.target = Coordinate::new(500.0, 119.0, 0.0);
    let agent = connected(&world, &config).await;

    let err = build_strategy(StrategyKind::Highway, &agent, &config).unwrap_err();
    assert!(matches!(err, StrategyError::InvalidParameters { .. }));
    assert_eq!(agent.dispatcher().handler_count(EventKind::Tick), 0);
}

#[tokio::test(start_paused = true)]
async fn highway_trip_arrives_and_shuts_down() {
    let world = LoopbackWorld::new(Coordinate::new(0.0, 120.0, 0.0));
    let target = Coordinate::new(30.0, 120.0, 0.0);
    let config = highway_config(target);
    let ticker = world.spawn_ticker(Duration::from_millis(50));
    let agent = connected(&world, &config).await;

    let strategy = build_strategy(StrategyKind::Highway, &agent, &config).unwrap();
    Arc::clone(&strategy).start().unwrap();
    let reason = tokio::time::timeout(Duration::from_secs(120), agent.wait_for_shutdown())
        .await
        .expect("should arrive");
    ticker.abort();

    assert_eq!(reason, ShutdownReason::Arrived);
    assert!(agent.position().unwrap().within(&target, 1.0));
    strategy.stop();
    assert_eq!(agent.dispatcher().handler_count(EventKind::Tick), 0);
    assert!((0..TICKS_PER_WINDOW).all(|slot| {
        agent
            .dispatcher()
            .offset_owners(TickSlot::new(slot).unwrap())
            .is_empty()
    }));
}

#[tokio::test(start_paused = true)]
async fn highway_reconnects_when_a_player_appears_and_resumes() {
    let world = LoopbackWorld::new(Coordinate::new(0.0, 120.0, 0.0));
    let target = Coordinate::new(5000.0, 120.0, 0.0);
    let config = highway_config(target);
    let ticker = world.spawn_ticker(Duration::from_millis(50));
    let agent = connected(&world, &config).await;
    let strategy = Arc::new(HighwayStrategy::new(&agent, &config).unwrap());
    Arc::clone(&strategy).start().unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(world.current_goal(), Some(target));

    world.add_player(EntityId(99), "stranger", Coordinate::new(10.0, 120.0, 5.0));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(agent.reconnect_count(), 1);
    assert!(!agent.is_connected());

    world.remove_entity(EntityId(99));
    tokio::time::sleep(Duration::from_secs(8)).await;
    ticker.abort();

    assert!(agent.is_connected());
    assert_eq!(world.connect_count(), 2);
    assert_eq!(agent.goal(), Some(target));
    assert_eq!(world.current_goal(), Some(target));
    assert!(agent.shutdown_reason().is_none());
    assert!(strategy.all_attached());
    strategy.stop();
}

#[tokio::test(start_paused = true)]
async fn highway_stopped_during_reconnect_is_not_resumed() {
    let world = LoopbackWorld::new(Coordinate::new(0.0, 120.0, 0.0));
    let target = Coordinate::new(5000.0, 120.0, 0.0);
    let config = highway_config(target);
    let ticker = world.spawn_ticker(Duration::from_millis(50));
    let agent = connected(&world, &config).await;
    let strategy = Arc::new(HighwayStrategy::new(&agent, &config).unwrap());
    Arc::clone(&strategy).start().unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    world.add_player(EntityId(99), "stranger", Coordinate::new(10.0, 120.0, 5.0));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!agent.is_connected());
    strategy.stop();

    world.remove_entity(EntityId(99));
    tokio::time::sleep(Duration::from_secs(8)).await;
    ticker.abort();

    assert!(agent.is_connected());
    assert_eq!(world.connect_count(), 2);
    assert!(agent.goal().is_none());
    assert!(world.current_goal().is_none());
}

#[tokio::test(start_paused = true)]
async fn trade_strategy_builds_by_kind() {
    let world = LoopbackWorld::new(HOME);
    let config = BotConfig::default();
    let agent = connected(&world, &config).await;
    let strategy = build_strategy(StrategyKind::VillagerTrade, &agent, &config).unwrap();
    assert_eq!(strategy.name(), "Villager Trade");
    assert!(!strategy.is_running());
}
