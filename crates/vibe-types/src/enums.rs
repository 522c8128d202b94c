//! Enumeration types shared across the workspace.

use serde::{Deserialize, Serialize};

/// Name of an event stream in the dispatcher's handler table.
///
/// Each variant corresponds to one environment notification. Handlers are
/// registered per kind and only ever see events of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The connection completed login.
    Login,
    /// The agent (re)spawned in the world.
    Spawn,
    /// The server kicked the agent.
    Kicked,
    /// The agent died.
    Death,
    /// A chat or system message arrived.
    Chat,
    /// Health or food changed (damage, regeneration, eating).
    Health,
    /// One physics tick elapsed.
    Tick,
    /// The connection ended.
    End,
}

impl EventKind {
    /// Stable lowercase name used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Spawn => "spawn",
            Self::Kicked => "kicked",
            Self::Death => "death",
            Self::Chat => "chat",
            Self::Health => "health",
            Self::Tick => "tick",
            Self::End => "end",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a nearby environment entity, derived from its registry name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// Another connected player.
    Player,
    /// A villager (tradeable NPC).
    Villager,
    /// A dropped item lying on the ground.
    Item,
    /// Any other entity, keyed by its registry name.
    Other(String),
}

impl EntityKind {
    /// Map an environment registry name to a kind.
    pub fn from_name(name: &str) -> Self {
        match name {
            "player" => Self::Player,
            "villager" => Self::Villager,
            "item" => Self::Item,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The registry name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Player => "player",
            Self::Villager => "villager",
            Self::Item => "item",
            Self::Other(name) => name,
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which hand an item is equipped to or activated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Hand {
    /// The main (right) hand.
    Main,
    /// The off (left) hand, used for shields.
    Off,
}

/// Dimension the agent is currently in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Dimension {
    /// `minecraft:overworld`.
    Overworld,
    /// `minecraft:the_nether`.
    Nether,
    /// `minecraft:the_end`.
    End,
    /// Any other (modded or unknown) dimension identifier.
    Other(String),
}

impl Dimension {
    /// Parse a namespaced dimension identifier.
    pub fn from_id(id: &str) -> Self {
        match id {
            "minecraft:overworld" | "overworld" => Self::Overworld,
            "minecraft:the_nether" | "the_nether" => Self::Nether,
            "minecraft:the_end" | "the_end" => Self::End,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The namespaced identifier for this dimension.
    pub fn id(&self) -> &str {
        match self {
            Self::Overworld => "minecraft:overworld",
            Self::Nether => "minecraft:the_nether",
            Self::End => "minecraft:the_end",
            Self::Other(id) => id,
        }
    }
}

impl From<String> for Dimension {
    fn from(id: String) -> Self {
        Self::from_id(&id)
    }
}

impl From<Dimension> for String {
    fn from(dimension: Dimension) -> Self {
        dimension.id().to_owned()
    }
}

impl core::fmt::Display for Dimension {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.id())
    }
}
