//! Hunger management: eat the best food when its value fits the deficit.
//!
//! On its gated tick the behavior reads the food level and inventory and,
//! when a meal is warranted, hands the meal to a background task so tick
//! delivery is never held up by the eating wait. In panic mode (food at or
//! below the panic threshold) the task keeps eating until full or out of
//! attempts; otherwise it eats once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};
use vibe_core::action::Behavior;
use vibe_core::agent::{Agent, MAX_HUNGER};
use vibe_core::config::EatingConfig;
use vibe_core::dispatcher::{HandlerError, HandlerResult, Outcome};
use vibe_core::registry::FoodInfo;
use vibe_types::{Event, Hand, ItemStack, TickSlot};

/// The edible, non-denylisted stack restoring the most hunger.
pub fn best_food(agent: &Agent, denylist: &[String]) -> Option<(ItemStack, FoodInfo)> {
    let inventory = agent.inventory()?;
    inventory
        .stacks()
        .filter(|stack| !denylist.contains(&stack.name))
        .filter_map(|stack| agent.food_info(stack).map(|food| (stack.clone(), food)))
        .max_by_key(|(_, food)| food.food_points)
}

#[derive(Debug, Clone)]
struct MealPlan {
    panic: bool,
    max_attempts: u32,
    max_wait: Duration,
    denylist: Vec<String>,
}

/// Eats when hungry, choosing the most restorative food.
#[derive(Debug)]
pub struct EfficientEat {
    agent: Arc<Agent>,
    offset: TickSlot,
    panic_threshold: u32,
    max_attempts: u32,
    max_wait: Duration,
    denylist: Vec<String>,
    in_flight: Arc<AtomicBool>,
}

impl EfficientEat {
    /// An eater using `config`.
    pub fn new(agent: Arc<Agent>, config: &EatingConfig) -> Self {
        Self {
            agent,
            offset: config.tick_offset,
            panic_threshold: config.panic_threshold,
            max_attempts: config.max_attempts,
            max_wait: config.max_wait(),
            denylist: config.food_denylist.clone(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a meal task is running.
    pub fn is_eating(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn plan(&self) -> Result<Option<MealPlan>, HandlerError> {
        let food = self
            .agent
            .food()
            .ok_or(HandlerError::Unavailable { what: "food level" })?;
        if food >= MAX_HUNGER {
            return Ok(None);
        }
        let Some((stack, info)) = best_food(&self.agent, &self.denylist) else {
            debug!(food, "Hungry but no food available");
            return Ok(None);
        };

        let deficit = MAX_HUNGER.saturating_sub(food);
        let panic = food <= self.panic_threshold;
        if !panic && info.food_points > deficit {
            debug!(
                food,
                item = %stack.name,
                points = info.food_points,
                "Not enough hunger to eat best food"
            );
            return Ok(None);
        }

        Ok(Some(MealPlan {
            panic,
            max_attempts: if panic { self.max_attempts.max(1) } else { 1 },
            max_wait: self.max_wait,
            denylist: self.denylist.clone(),
        }))
    }
}

/// Equip-and-eat until the plan's attempts run out, the agent is full, or
/// there is nothing left to eat. Returns the number of successful meals.
async fn eat_meals(agent: &Agent, plan: &MealPlan) -> u32 {
    let mut meals = 0_u32;
    for attempt in 1..=plan.max_attempts {
        let Some(food) = agent.food() else {
            break;
        };
        if food >= MAX_HUNGER {
            break;
        }
        let Some((stack, info)) = best_food(agent, &plan.denylist) else {
            warn!(food, "Ran out of food while eating");
            break;
        };

        if let Err(err) = agent.equip_inventory_item(stack.slot, Hand::Main) {
            warn!(item = %stack.name, %err, "Could not equip food");
            break;
        }
        match agent.eat(plan.max_wait).await {
            Ok(true) => {
                meals = meals.saturating_add(1);
                info!(
                    item = %stack.name,
                    points = info.food_points,
                    food = agent.food().unwrap_or(food),
                    attempt,
                    panic = plan.panic,
                    "Ate food"
                );
            }
            Ok(false) => info!(item = %stack.name, attempt, "Eating attempt did not finish"),
            Err(err) => {
                warn!(item = %stack.name, %err, "Eating failed");
                break;
            }
        }
    }
    meals
}

/// Clears the in-flight flag when the meal task ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Behavior for EfficientEat {
    fn name(&self) -> &'static str {
        "Efficient Eat"
    }

    fn description(&self) -> &'static str {
        "Eats the most restorative food once hunger leaves room for it."
    }

    fn tick_offset(&self) -> Option<TickSlot> {
        Some(self.offset)
    }

    fn run_once(&mut self, _event: &Event) -> HandlerResult {
        if self.is_eating() || self.agent.is_eating() {
            return Ok(Outcome::Idle);
        }
        let Some(plan) = self.plan()? else {
            return Ok(Outcome::Idle);
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available to eat on");
            return Ok(Outcome::Idle);
        };

        self.in_flight.store(true, Ordering::Release);
        let guard = InFlight(Arc::clone(&self.in_flight));
        let agent = Arc::clone(&self.agent);
        runtime.spawn(async move {
            let _guard = guard;
            if plan.panic {
                warn!("Food critically low, eating until full");
            }
            let meals = eat_meals(&agent, &plan).await;
            debug!(meals, "Meal finished");
        });
        Ok(Outcome::Acted)
    }
}
