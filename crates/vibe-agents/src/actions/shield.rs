//! Keeps a shield in the off hand and raised.

use std::sync::Arc;

use tracing::debug;
use vibe_core::action::Behavior;
use vibe_core::agent::Agent;
use vibe_core::config::ShieldConfig;
use vibe_core::dispatcher::{HandlerResult, Outcome};
use vibe_types::{Event, Hand, TickSlot};

/// Equips a shield to the off hand and keeps it raised. Backs off while a
/// meal holds the activation lock.
#[derive(Debug)]
pub struct AlwaysShield {
    agent: Arc<Agent>,
    offset: TickSlot,
}

impl AlwaysShield {
    /// A shield keeper on `config`'s tick offset.
    pub const fn new(agent: Arc<Agent>, config: &ShieldConfig) -> Self {
        Self {
            agent,
            offset: config.tick_offset,
        }
    }
}

impl Behavior for AlwaysShield {
    fn name(&self) -> &'static str {
        "Always Shield"
    }

    fn description(&self) -> &'static str {
        "Keeps a shield raised in the off hand."
    }

    fn tick_offset(&self) -> Option<TickSlot> {
        Some(self.offset)
    }

    fn run_once(&mut self, _event: &Event) -> HandlerResult {
        if self.agent.is_eating() {
            return Ok(Outcome::Idle);
        }
        if !self.agent.equip_shield()? {
            debug!("No shield in inventory");
            return Ok(Outcome::Idle);
        }
        if self.agent.is_using_held_item() {
            return Ok(Outcome::Idle);
        }
        self.agent.activate_item(Hand::Off)?;
        Ok(Outcome::Acted)
    }
}
