//! Reports valuable dropped items near the agent.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;
use vibe_core::action::Behavior;
use vibe_core::agent::Agent;
use vibe_core::config::LootConfig;
use vibe_core::dispatcher::{HandlerResult, Outcome};
use vibe_types::{EntityKind, Event};

/// Logs each distinct valuable item entity once, keyed by block position
/// and item name.
#[derive(Debug)]
pub struct LootFinder {
    agent: Arc<Agent>,
    keywords: Vec<String>,
    seen: BTreeSet<([i64; 3], String)>,
}

impl LootFinder {
    /// A finder matching item names against `config`'s keywords.
    pub fn new(agent: Arc<Agent>, config: &LootConfig) -> Self {
        Self {
            agent,
            keywords: config.valuable_keywords.clone(),
            seen: BTreeSet::new(),
        }
    }

    /// Distinct finds so far.
    pub fn found(&self) -> usize {
        self.seen.len()
    }

    fn is_valuable(&self, name: &str) -> bool {
        self.keywords.iter().any(|k| name.contains(k.as_str()))
    }
}

impl Behavior for LootFinder {
    fn name(&self) -> &'static str {
        "Loot Finder"
    }

    fn description(&self) -> &'static str {
        "Logs valuable dropped items nearby."
    }

    fn run_once(&mut self, _event: &Event) -> HandlerResult {
        let mut outcome = Outcome::Idle;
        for entity in self.agent.entities() {
            if entity.kind != EntityKind::Item {
                continue;
            }
            let Some(name) = entity.display_name else {
                continue;
            };
            if !self.is_valuable(&name) {
                continue;
            }
            if self.seen.insert((entity.position.block(), name.clone())) {
                info!(item = %name, position = %entity.position, "Found valuable item");
                outcome = Outcome::Acted;
            }
        }
        Ok(outcome)
    }
}
