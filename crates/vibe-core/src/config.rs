//! Configuration loading and typed config structures for the Vibe bot.
//!
//! The canonical configuration lives in `vibe-config.yaml` at the project
//! root. Every field has a default, so an empty file (or no file at all) is a
//! valid configuration that connects to `localhost:25565` and runs the
//! highway strategy toward `[1000, 120, 1000]`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use vibe_types::{Coordinate, TickSlot};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level bot configuration, mirroring `vibe-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BotConfig {
    /// Server connection and spawn activation.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Safety monitor thresholds and switches.
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Goal-seeking navigation.
    #[serde(default)]
    pub navigation: NavigationConfig,

    /// Efficient eating.
    #[serde(default)]
    pub eating: EatingConfig,

    /// Always-shield behavior.
    #[serde(default)]
    pub shield: ShieldConfig,

    /// Loot finder behavior.
    #[serde(default)]
    pub loot: LootConfig,

    /// Villager trade cycle.
    #[serde(default)]
    pub trade: TradeConfig,

    /// Which strategy to run and where.
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BotConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for the connection:
    /// - `VIBE_HOST` overrides `connection.host`
    /// - `VIBE_PORT` overrides `connection.port`
    /// - `VIBE_USERNAME` overrides `connection.username`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.connection.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field ranges serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.required_spawns() == 0 {
            return Err(ConfigError::Invalid {
                field: "connection.spawn_activation_count",
                reason: "must be at least 1".to_owned(),
            });
        }
        if !(0.0..=20.0).contains(&self.safety.health_threshold) {
            return Err(ConfigError::Invalid {
                field: "safety.health_threshold",
                reason: format!("{} is outside 0-20", self.safety.health_threshold),
            });
        }
        if self.navigation.arrival_tolerance <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "navigation.arrival_tolerance",
                reason: "must be positive".to_owned(),
            });
        }
        if self.eating.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "eating.max_attempts",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Server connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    /// Server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Account name.
    #[serde(default = "default_username")]
    pub username: String,

    /// Protocol version to pin, when set.
    #[serde(default)]
    pub mc_version: Option<String>,

    /// Skip online authentication.
    #[serde(default)]
    pub no_auth: bool,

    /// Spawn events required before tick delivery starts. Defaults to 2 on
    /// hosts known to double-spawn on join, else 1.
    #[serde(default)]
    pub spawn_activation_count: Option<u32>,

    /// Halt movement while eating and resume afterwards. Defaults to the
    /// same host rule as `spawn_activation_count`.
    #[serde(default)]
    pub pause_pathing_to_eat: Option<bool>,

    /// Seconds to wait for spawn activation before giving up.
    #[serde(default = "default_active_wait_secs")]
    pub active_wait_secs: u64,

    /// Attempts at setting a movement goal before treating the target as
    /// unreachable.
    #[serde(default = "default_goal_set_attempts")]
    pub goal_set_attempts: u32,

    /// Milliseconds between movement goal attempts.
    #[serde(default = "default_goal_retry_interval_ms")]
    pub goal_retry_interval_ms: u64,
}

impl ConnectionConfig {
    /// Whether the host is one that double-spawns on join.
    pub fn is_double_spawn_host(&self) -> bool {
        self.host.contains("2b2t")
    }

    /// Spawn events required before ticks are delivered.
    pub fn required_spawns(&self) -> u32 {
        self.spawn_activation_count
            .unwrap_or_else(|| if self.is_double_spawn_host() { 2 } else { 1 })
    }

    /// Whether eating pauses movement.
    pub fn pauses_pathing_to_eat(&self) -> bool {
        self.pause_pathing_to_eat
            .unwrap_or_else(|| self.is_double_spawn_host())
    }

    /// Spawn activation timeout.
    pub const fn active_wait(&self) -> Duration {
        Duration::from_secs(self.active_wait_secs)
    }

    /// Delay between movement goal attempts.
    pub const fn goal_retry_interval(&self) -> Duration {
        Duration::from_millis(self.goal_retry_interval_ms)
    }

    /// Override connection values with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable ports are
    /// ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("VIBE_HOST") {
            self.host = val;
        }
        if let Some(port) = lookup("VIBE_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(val) = lookup("VIBE_USERNAME") {
            self.username = val;
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            mc_version: None,
            no_auth: false,
            spawn_activation_count: None,
            pause_pathing_to_eat: None,
            active_wait_secs: default_active_wait_secs(),
            goal_set_attempts: default_goal_set_attempts(),
            goal_retry_interval_ms: default_goal_retry_interval_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Safety
// ---------------------------------------------------------------------------

/// Safety monitor configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SafetyConfig {
    /// Force-disconnect at or below this health.
    #[serde(default = "default_health_threshold")]
    pub health_threshold: f32,

    /// Check for players not on the whitelist.
    #[serde(default = "default_true")]
    pub check_players: bool,

    /// Check that the inventory holds usable food.
    #[serde(default = "default_true")]
    pub check_food: bool,

    /// Check for a stalled position.
    #[serde(default = "default_true")]
    pub check_stuck: bool,

    /// Seconds to wait before reconnecting after an unknown player is seen.
    /// Absent means force-disconnect instead.
    #[serde(default)]
    pub reconnect_wait_secs: Option<u64>,

    /// Seconds without horizontal movement before the agent counts as stuck.
    #[serde(default = "default_stuck_threshold_secs")]
    pub stuck_threshold_secs: u64,

    /// Seconds to wait before reconnecting when stuck.
    #[serde(default = "default_stuck_reconnect_wait_secs")]
    pub stuck_reconnect_wait_secs: u64,

    /// Player names that never trigger the presence check.
    #[serde(default)]
    pub player_whitelist: Vec<String>,

    /// Reconnects allowed inside `reconnect_window_secs` before a further
    /// reconnect becomes a shutdown.
    #[serde(default = "default_max_consecutive_reconnects")]
    pub max_consecutive_reconnects: u32,

    /// Sliding window for the reconnect budget, in seconds.
    #[serde(default = "default_reconnect_window_secs")]
    pub reconnect_window_secs: u64,
}

impl SafetyConfig {
    /// Stuck threshold as a duration.
    pub const fn stuck_threshold(&self) -> Duration {
        Duration::from_secs(self.stuck_threshold_secs)
    }

    /// Reconnect wait after a stuck detection.
    pub const fn stuck_reconnect_wait(&self) -> Duration {
        Duration::from_secs(self.stuck_reconnect_wait_secs)
    }

    /// Reconnect budget window.
    pub const fn reconnect_window(&self) -> Duration {
        Duration::from_secs(self.reconnect_window_secs)
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            health_threshold: default_health_threshold(),
            check_players: true,
            check_food: true,
            check_stuck: true,
            reconnect_wait_secs: None,
            stuck_threshold_secs: default_stuck_threshold_secs(),
            stuck_reconnect_wait_secs: default_stuck_reconnect_wait_secs(),
            player_whitelist: Vec::new(),
            max_consecutive_reconnects: default_max_consecutive_reconnects(),
            reconnect_window_secs: default_reconnect_window_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

/// Navigation configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NavigationConfig {
    /// Tick slot navigation runs on.
    #[serde(default = "default_navigation_offset")]
    pub tick_offset: TickSlot,

    /// Blocks travelled between progress log lines.
    #[serde(default = "default_log_interval_blocks")]
    pub log_interval_blocks: f64,

    /// Shut the agent down once the target is reached.
    #[serde(default = "default_true")]
    pub exit_on_arrival: bool,

    /// Per-axis distance that counts as arrived.
    #[serde(default = "default_arrival_tolerance")]
    pub arrival_tolerance: f64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            tick_offset: default_navigation_offset(),
            log_interval_blocks: default_log_interval_blocks(),
            exit_on_arrival: true,
            arrival_tolerance: default_arrival_tolerance(),
        }
    }
}

/// Efficient eating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EatingConfig {
    /// Tick slot the eating check runs on.
    #[serde(default = "default_eating_offset")]
    pub tick_offset: TickSlot,

    /// Hunger at or below which the agent eats regardless of waste.
    #[serde(default = "default_panic_threshold")]
    pub panic_threshold: u32,

    /// Eat attempts per panic episode.
    #[serde(default = "default_max_eat_attempts")]
    pub max_attempts: u32,

    /// Milliseconds to wait for hunger to rise after starting to eat.
    #[serde(default = "default_max_eat_wait_ms")]
    pub max_wait_ms: u64,

    /// Edible items never eaten (and never counted as usable food).
    #[serde(default = "default_food_denylist")]
    pub food_denylist: Vec<String>,
}

impl EatingConfig {
    /// Maximum wait for a single meal.
    pub const fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Whether `name` is on the denylist.
    pub fn is_denied(&self, name: &str) -> bool {
        self.food_denylist.iter().any(|d| d == name)
    }
}

impl Default for EatingConfig {
    fn default() -> Self {
        Self {
            tick_offset: default_eating_offset(),
            panic_threshold: default_panic_threshold(),
            max_attempts: default_max_eat_attempts(),
            max_wait_ms: default_max_eat_wait_ms(),
            food_denylist: default_food_denylist(),
        }
    }
}

/// Always-shield configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShieldConfig {
    /// Whether strategies attach the shield behavior.
    #[serde(default)]
    pub enabled: bool,

    /// Tick slot the shield check runs on.
    #[serde(default = "default_shield_offset")]
    pub tick_offset: TickSlot,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tick_offset: default_shield_offset(),
        }
    }
}

/// Loot finder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LootConfig {
    /// Whether strategies attach the loot finder.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Substrings that mark a dropped item as valuable.
    #[serde(default = "default_valuable_keywords")]
    pub valuable_keywords: Vec<String>,
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            valuable_keywords: default_valuable_keywords(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade cycle
// ---------------------------------------------------------------------------

/// Villager trade cycle configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeConfig {
    /// Search radius around the strategy's start position.
    #[serde(default = "default_search_radius")]
    pub search_radius: f64,

    /// Villager profession to trade with.
    #[serde(default = "default_profession")]
    pub profession: String,

    /// Item paid for each trade.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Item bought.
    #[serde(default = "default_output_item")]
    pub output_item: String,

    /// Trades per villager per cycle.
    #[serde(default = "default_max_trade_attempts")]
    pub max_trade_attempts: u32,

    /// Seconds allowed to reach a villager.
    #[serde(default = "default_pathfind_timeout_secs")]
    pub pathfind_timeout_secs: u64,

    /// Milliseconds between arrival checks.
    #[serde(default = "default_arrival_poll_ms")]
    pub arrival_poll_ms: u64,

    /// Distance that counts as arrived at a villager.
    #[serde(default = "default_arrival_distance")]
    pub arrival_distance: f64,

    /// Seconds to sleep between cycles.
    #[serde(default = "default_cycle_sleep_secs")]
    pub cycle_sleep_secs: u64,

    /// Milliseconds between consecutive trades.
    #[serde(default = "default_trade_delay_ms")]
    pub trade_delay_ms: u64,

    /// Seconds to back off after an unexpected cycle error.
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
}

impl TradeConfig {
    /// Pathfinding timeout.
    pub const fn pathfind_timeout(&self) -> Duration {
        Duration::from_secs(self.pathfind_timeout_secs)
    }

    /// Arrival poll interval.
    pub const fn arrival_poll(&self) -> Duration {
        Duration::from_millis(self.arrival_poll_ms)
    }

    /// Sleep between cycles.
    pub const fn cycle_sleep(&self) -> Duration {
        Duration::from_secs(self.cycle_sleep_secs)
    }

    /// Delay between trades.
    pub const fn trade_delay(&self) -> Duration {
        Duration::from_millis(self.trade_delay_ms)
    }

    /// Backoff after a cycle error.
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            search_radius: default_search_radius(),
            profession: default_profession(),
            currency: default_currency(),
            output_item: default_output_item(),
            max_trade_attempts: default_max_trade_attempts(),
            pathfind_timeout_secs: default_pathfind_timeout_secs(),
            arrival_poll_ms: default_arrival_poll_ms(),
            arrival_distance: default_arrival_distance(),
            cycle_sleep_secs: default_cycle_sleep_secs(),
            trade_delay_ms: default_trade_delay_ms(),
            error_backoff_secs: default_error_backoff_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Strategies that can be started by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Travel a nether highway to a target, with safety, eating and loot
    /// behaviors attached.
    #[default]
    Highway,
    /// Repeatedly buy from nearby villagers.
    VillagerTrade,
}

impl core::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Highway => "highway",
            Self::VillagerTrade => "villager_trade",
        })
    }
}

/// Strategy selection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrategyConfig {
    /// Which strategy to start.
    #[serde(default)]
    pub kind: StrategyKind,

    /// Target coordinate for travelling strategies.
    #[serde(default = "default_target")]
    pub target: Coordinate,

    /// Height the highway strategy requires its target to be at.
    #[serde(default = "default_required_y")]
    pub required_y: f64,

    /// Debug mode: short reconnect waits.
    #[serde(default)]
    pub debug: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::default(),
            target: default_target(),
            required_y: default_required_y(),
            debug: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when `RUST_LOG` is
    /// unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde)
// ---------------------------------------------------------------------------

const fn slot(value: u8) -> TickSlot {
    match TickSlot::new(value) {
        Ok(slot) => slot,
        Err(_) => TickSlot::ZERO,
    }
}

fn default_host() -> String {
    "localhost".to_owned()
}

const fn default_port() -> u16 {
    25565
}

fn default_username() -> String {
    "vibe_bot".to_owned()
}

const fn default_active_wait_secs() -> u64 {
    60
}

const fn default_goal_set_attempts() -> u32 {
    5
}

const fn default_goal_retry_interval_ms() -> u64 {
    1000
}

const fn default_health_threshold() -> f32 {
    10.0
}

const fn default_stuck_threshold_secs() -> u64 {
    60
}

const fn default_stuck_reconnect_wait_secs() -> u64 {
    10
}

const fn default_max_consecutive_reconnects() -> u32 {
    3
}

const fn default_reconnect_window_secs() -> u64 {
    300
}

const fn default_navigation_offset() -> TickSlot {
    slot(19)
}

const fn default_log_interval_blocks() -> f64 {
    1000.0
}

const fn default_arrival_tolerance() -> f64 {
    1.0
}

const fn default_eating_offset() -> TickSlot {
    slot(18)
}

const fn default_panic_threshold() -> u32 {
    6
}

const fn default_max_eat_attempts() -> u32 {
    5
}

const fn default_max_eat_wait_ms() -> u64 {
    5000
}

fn default_food_denylist() -> Vec<String> {
    [
        "enchanted_golden_apple",
        "rotten_flesh",
        "pufferfish",
        "poisonous_potato",
        "spider_eye",
        "suspicious_stew",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

const fn default_shield_offset() -> TickSlot {
    slot(17)
}

fn default_valuable_keywords() -> Vec<String> {
    ["netherite", "shulker", "elytra"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

const fn default_search_radius() -> f64 {
    64.0
}

fn default_profession() -> String {
    "cleric".to_owned()
}

fn default_currency() -> String {
    "emerald".to_owned()
}

fn default_output_item() -> String {
    "experience_bottle".to_owned()
}

const fn default_max_trade_attempts() -> u32 {
    10
}

const fn default_pathfind_timeout_secs() -> u64 {
    30
}

const fn default_arrival_poll_ms() -> u64 {
    1000
}

const fn default_arrival_distance() -> f64 {
    3.0
}

const fn default_cycle_sleep_secs() -> u64 {
    600
}

const fn default_trade_delay_ms() -> u64 {
    1000
}

const fn default_error_backoff_secs() -> u64 {
    5
}

const fn default_target() -> Coordinate {
    Coordinate::new(1000.0, 120.0, 1000.0)
}

const fn default_required_y() -> f64 {
    120.0
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}
