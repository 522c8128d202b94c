//! Search, trade, sleep: a procedural strategy that buys from nearby
//! villagers.
//!
//! Runs in its own task rather than on the dispatcher. Each cycle finds
//! villagers of the configured profession near the start position, walks to
//! each one, buys the configured output item until the offer is exhausted,
//! the attempt budget is spent or the currency runs out, then sleeps. The
//! loop ends for good when no villager matches or the currency is gone.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vibe_core::agent::Agent;
use vibe_core::config::TradeConfig;
use vibe_core::strategy::{RunState, Strategy, StrategyError};
use vibe_types::{Coordinate, EntityId, EntityKind, TradeOffer, VillagerInfo};

use crate::error::TradeError;

/// Summary and raw entity closer than this are the same entity.
const SAME_ENTITY_DISTANCE: f64 = 1.0;

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    /// Sleep, then search again.
    Continue,
    /// Stop the loop for good.
    Done(&'static str),
}

/// Counters over the strategy's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeSummary {
    /// Cycles started.
    pub cycles: u32,
    /// Villagers whose trade window was opened.
    pub villagers_traded: u32,
    /// Successful trades.
    pub trades: u32,
    /// Villagers given up on (unreachable, gone, or without the offer).
    pub failed_visits: u32,
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU32,
    villagers_traded: AtomicU32,
    trades: AtomicU32,
    failed_visits: AtomicU32,
}

impl Counters {
    fn bump(counter: &AtomicU32, by: u32) {
        // Relaxed: counters are reporting only.
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
            Some(n.saturating_add(by))
        });
    }

    fn snapshot(&self) -> TradeSummary {
        TradeSummary {
            cycles: self.cycles.load(Ordering::Relaxed),
            villagers_traded: self.villagers_traded.load(Ordering::Relaxed),
            trades: self.trades.load(Ordering::Relaxed),
            failed_visits: self.failed_visits.load(Ordering::Relaxed),
        }
    }
}

/// Buys `output_item` from nearby villagers until they or the currency run
/// out.
#[derive(Debug)]
pub struct VillagerTradeStrategy {
    agent: Arc<Agent>,
    config: TradeConfig,
    start_position: Coordinate,
    run: RunState,
    trading: AtomicBool,
    counters: Counters,
}

impl VillagerTradeStrategy {
    /// Build the strategy, anchoring the search area at the agent's current
    /// position (the origin if it is unknown).
    pub fn new(agent: Arc<Agent>, config: &TradeConfig) -> Self {
        let start_position = agent.position().unwrap_or(Coordinate::ORIGIN);
        Self {
            agent,
            config: config.clone(),
            start_position,
            run: RunState::new(),
            trading: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Centre of the search area.
    pub const fn start_position(&self) -> Coordinate {
        self.start_position
    }

    /// Counters so far.
    pub fn summary(&self) -> TradeSummary {
        self.counters.snapshot()
    }

    async fn run_loop(self: Arc<Self>) {
        while self.run.is_running() {
            match self.cycle().await {
                Ok(CycleOutcome::Continue) => {
                    info!(
                        sleep_secs = self.config.cycle_sleep_secs,
                        "Trade cycle complete, sleeping"
                    );
                    if !self.run.sleep(self.config.cycle_sleep()).await {
                        break;
                    }
                }
                Ok(CycleOutcome::Done(reason)) => {
                    info!(reason, "Trade loop finished");
                    break;
                }
                Err(TradeError::Stopped) => break,
                Err(err) => {
                    warn!(
                        error = %err,
                        backoff_secs = self.config.error_backoff_secs,
                        "Trade cycle failed, backing off"
                    );
                    if !self.run.sleep(self.config.error_backoff()).await {
                        break;
                    }
                }
            }
        }
        self.run.finish();
        let summary = self.summary();
        info!(
            cycles = summary.cycles,
            trades = summary.trades,
            villagers = summary.villagers_traded,
            failed_visits = summary.failed_visits,
            "Villager trade strategy stopped"
        );
    }

    async fn cycle(&self) -> Result<CycleOutcome, TradeError> {
        Counters::bump(&self.counters.cycles, 1);
        let villagers = self.find_villagers();
        if villagers.is_empty() {
            return Ok(CycleOutcome::Done("no villagers nearby"));
        }
        if self.currency_count()? == 0 {
            return Ok(CycleOutcome::Done("out of currency"));
        }
        info!(count = villagers.len(), profession = %self.config.profession, "Found villagers");

        for villager in &villagers {
            if !self.run.is_running() {
                return Err(TradeError::Stopped);
            }
            match self.trade_with(villager).await {
                Ok(trades) => debug!(villager = %villager.id, trades, "Visit done"),
                Err(TradeError::Stopped) => return Err(TradeError::Stopped),
                Err(err) => {
                    Counters::bump(&self.counters.failed_visits, 1);
                    warn!(villager = %villager.id, error = %err, "Trade attempt failed");
                }
            }
            if matches!(self.currency_count(), Ok(0)) {
                return Ok(CycleOutcome::Done("out of currency"));
            }
        }
        Ok(CycleOutcome::Continue)
    }

    /// Villagers of the configured profession within the search radius, in
    /// discovery order.
    fn find_villagers(&self) -> Vec<VillagerInfo> {
        self.agent
            .entities()
            .into_iter()
            .filter(|e| {
                e.kind == EntityKind::Villager
                    && e.position.distance(&self.start_position) <= self.config.search_radius
            })
            .filter_map(|e| {
                let raw = self.agent.entity_near(&e.position, SAME_ENTITY_DISTANCE)?;
                raw.has_profession(&self.config.profession)
                    .then(|| VillagerInfo {
                        id: raw.id,
                        position: raw.position,
                        profession: raw.profession,
                    })
            })
            .collect()
    }

    fn currency_count(&self) -> Result<u32, TradeError> {
        self.agent
            .inventory()
            .map(|inv| inv.count_of(&self.config.currency))
            .ok_or(TradeError::InventoryUnavailable)
    }

    async fn trade_with(&self, villager: &VillagerInfo) -> Result<u32, TradeError> {
        self.pathfind(villager.position).await?;
        self.attempt_trade(villager).await
    }

    async fn pathfind(&self, target: Coordinate) -> Result<(), TradeError> {
        self.agent.goto(target)?;
        let timeout = self.config.pathfind_timeout();
        let started = Instant::now();
        let result = loop {
            if !self.run.is_running() {
                break Err(TradeError::Stopped);
            }
            if let Some(position) = self.agent.position()
                && position.distance(&target) <= self.config.arrival_distance
            {
                break Ok(());
            }
            if started.elapsed() >= timeout {
                break Err(TradeError::PathfindTimeout {
                    target,
                    timeout_secs: self.config.pathfind_timeout_secs,
                });
            }
            tokio::time::sleep(self.config.arrival_poll()).await;
        };
        self.agent.stop_pathing();
        self.agent.clear_goal();
        result
    }

    async fn attempt_trade(&self, villager: &VillagerInfo) -> Result<u32, TradeError> {
        let Some(entity) = self
            .agent
            .raw_entities()
            .into_iter()
            .find(|e| e.id == villager.id)
        else {
            return Err(TradeError::VillagerLost { id: villager.id });
        };
        let initial = self.currency_count()?;

        let offers = self.agent.open_villager(entity.id).await?;
        self.trading.store(true, Ordering::SeqCst);
        Counters::bump(&self.counters.villagers_traded, 1);
        let result = self.trade_offer(entity.id, &offers).await;
        if self.trading.swap(false, Ordering::SeqCst)
            && let Err(err) = self.agent.close_window()
        {
            debug!(error = %err, "Closing trade window failed");
        }

        let trades = result?;
        let remaining = self.currency_count().unwrap_or(0);
        info!(
            villager = %entity.id,
            trades,
            spent = initial.saturating_sub(remaining),
            remaining,
            "Finished trading with villager"
        );
        Ok(trades)
    }

    async fn trade_offer(&self, id: EntityId, offers: &[TradeOffer]) -> Result<u32, TradeError> {
        let Some(index) = offers
            .iter()
            .position(|o| o.output.name == self.config.output_item)
        else {
            return Err(TradeError::NoOffer {
                id,
                item: self.config.output_item.clone(),
            });
        };

        let mut trades = 0_u32;
        let mut attempts = 0_u32;
        while attempts < self.config.max_trade_attempts && self.run.is_running() {
            if !matches!(self.currency_count(), Ok(n) if n > 0) {
                break;
            }
            attempts = attempts.saturating_add(1);

            let current = self
                .agent
                .trade_offers()
                .and_then(|o| o.get(index).cloned());
            if current.is_some_and(|o| o.is_exhausted()) {
                info!(villager = %id, "Offer exhausted");
                break;
            }
            if let Err(err) = self.agent.trade(index, 1).await {
                warn!(villager = %id, attempt = attempts, error = %err, "Trade failed");
                break;
            }
            trades = trades.saturating_add(1);
            Counters::bump(&self.counters.trades, 1);

            if matches!(self.currency_count(), Ok(0)) {
                break;
            }
            if !self.run.sleep(self.config.trade_delay()).await {
                break;
            }
        }
        Ok(trades)
    }
}

#[async_trait]
impl Strategy for VillagerTradeStrategy {
    fn name(&self) -> &'static str {
        "Villager Trade"
    }

    fn start(self: Arc<Self>) -> Result<(), StrategyError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_err| StrategyError::NoRuntime)?;
        self.run.begin(self.name())?;
        info!(
            run = %self.run.id(),
            start = %self.start_position,
            radius = self.config.search_radius,
            profession = %self.config.profession,
            "Villager trade strategy started"
        );
        runtime.spawn(self.run_loop());
        Ok(())
    }

    fn stop(&self) {
        if !self.run.finish() {
            return;
        }
        self.agent.stop_pathing();
        self.agent.clear_goal();
        if self.trading.swap(false, Ordering::SeqCst)
            && let Err(err) = self.agent.close_window()
        {
            debug!(error = %err, "Closing trade window on stop failed");
        }
        info!("Stopping villager trade strategy");
    }

    fn is_running(&self) -> bool {
        self.run.is_running()
    }

    async fn finished(&self) {
        self.run.finished().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vibe_core::config::BotConfig;
    use vibe_core::loopback::{LoopbackConnector, LoopbackWorld};
    use vibe_types::{OfferItem, RawEntity};

    use super::*;

    fn offer(output: &str) -> TradeOffer {
        TradeOffer {
            input: OfferItem::new("emerald", 1),
            secondary_input: None,
            output: OfferItem::new(output, 1),
            uses: 0,
            max_uses: 12,
            disabled: false,
        }
    }

    async fn connected() -> (Arc<LoopbackWorld>, Arc<Agent>) {
        let world = LoopbackWorld::new(Coordinate::new(0.0, 64.0, 0.0));
        let agent = Agent::new(
            &BotConfig::default(),
            Arc::new(LoopbackConnector::new(Arc::clone(&world))),
            Arc::new(world.game_data().clone()),
        );
        agent.connect().await.unwrap();
        (world, agent)
    }

    #[tokio::test]
    async fn search_matches_profession_and_radius() {
        let (world, agent) = connected().await;
        let near = Coordinate::new(5.0, 64.0, 5.0);
        world.add_villager(EntityId(10), near, "minecraft:cleric", vec![offer("experience_bottle")]);
        world.add_villager(EntityId(11), Coordinate::new(8.0, 64.0, 0.0), "farmer", vec![]);
        world.add_villager(EntityId(12), Coordinate::new(500.0, 64.0, 0.0), "cleric", vec![]);
        world.add_entity(RawEntity {
            id: EntityId(13),
            kind: EntityKind::Villager,
            position: Coordinate::new(-4.0, 64.0, 0.0),
            username: None,
            item_id: None,
            profession: None,
        });

        let strategy = VillagerTradeStrategy::new(agent, &TradeConfig::default());
        let found = strategy.find_villagers();
        assert_eq!(found.len(), 1);
        assert_eq!(found.first().unwrap().id, EntityId(10));
        assert_eq!(found.first().unwrap().position, near);
    }

    #[tokio::test]
    async fn start_position_is_captured_at_construction() {
        let (world, agent) = connected().await;
        let strategy = VillagerTradeStrategy::new(Arc::clone(&agent), &TradeConfig::default());
        world.set_position(Some(Coordinate::new(100.0, 64.0, 100.0)));
        assert_eq!(strategy.start_position(), Coordinate::new(0.0, 64.0, 0.0));

        world.set_position(None);
        let unknown = VillagerTradeStrategy::new(agent, &TradeConfig::default());
        assert_eq!(unknown.start_position(), Coordinate::ORIGIN);
    }

    #[tokio::test]
    async fn missing_offer_is_reported() {
        let (world, agent) = connected().await;
        world.give("emerald", 5);
        world.add_villager(
            EntityId(10),
            Coordinate::new(1.0, 64.0, 0.0),
            "cleric",
            vec![offer("redstone")],
        );
        let strategy = VillagerTradeStrategy::new(agent, &TradeConfig::default());
        strategy.run.begin("test").unwrap();

        let villager = strategy.find_villagers().pop().unwrap();
        assert!(matches!(
            strategy.attempt_trade(&villager).await,
            Err(TradeError::NoOffer { .. })
        ));
        assert!(!strategy.trading.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn vanished_villager_is_lost() {
        let (world, agent) = connected().await;
        world.add_villager(EntityId(10), Coordinate::new(1.0, 64.0, 0.0), "cleric", vec![]);
        let strategy = VillagerTradeStrategy::new(agent, &TradeConfig::default());
        let villager = strategy.find_villagers().pop().unwrap();
        world.remove_entity(EntityId(10));

        assert!(matches!(
            strategy.attempt_trade(&villager).await,
            Err(TradeError::VillagerLost { id: EntityId(10) })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_villager_times_out() {
        let (world, agent) = connected().await;
        world.set_stuck(true);
        let strategy = VillagerTradeStrategy::new(agent, &TradeConfig::default());
        strategy.run.begin("test").unwrap();

        let started = Instant::now();
        let result = strategy.pathfind(Coordinate::new(40.0, 64.0, 0.0)).await;
        assert!(matches!(result, Err(TradeError::PathfindTimeout { timeout_secs: 30, .. })));
        assert!(started.elapsed() >= std::time::Duration::from_secs(30));
        assert!(world.current_goal().is_none());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let (_world, agent) = connected().await;
        let strategy = Arc::new(VillagerTradeStrategy::new(agent, &TradeConfig::default()));
        Arc::clone(&strategy).start().unwrap();
        assert!(matches!(
            Arc::clone(&strategy).start(),
            Err(StrategyError::AlreadyStarted { .. })
        ));
        strategy.stop();
        strategy.finished().await;
    }
}
