//! Core value structs: positions, inventory, entities, and trade offers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::EntityKind;
use crate::ids::EntityId;

// ---------------------------------------------------------------------------
// Coordinate
// ---------------------------------------------------------------------------

/// A point in the world.
///
/// Environment positions drift continuously (sub-block physics, knockback),
/// so coordinates are only ever compared with a tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Coordinate {
    /// East-west axis.
    pub x: f64,
    /// Vertical axis.
    pub y: f64,
    /// North-south axis.
    pub z: f64,
}

impl Coordinate {
    /// The world origin.
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    /// Create a coordinate.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dz.mul_add(dz, dx.mul_add(dx, dy * dy)).sqrt()
    }

    /// Whether `other` is within `tolerance` of this point on every axis.
    pub fn within(&self, other: &Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }

    /// Whether the horizontal (x/z) displacement to `other` reaches
    /// `threshold` on either axis. The vertical axis is ignored.
    pub fn moved_horizontally(&self, other: &Self, threshold: f64) -> bool {
        (self.x - other.x).abs() >= threshold || (self.z - other.z).abs() >= threshold
    }

    /// Block coordinates containing this point.
    #[allow(clippy::cast_possible_truncation)]
    pub fn block(&self) -> [i64; 3] {
        // World coordinates stay far inside i64 range.
        [
            self.x.floor() as i64,
            self.y.floor() as i64,
            self.z.floor() as i64,
        ]
    }
}

impl From<[f64; 3]> for Coordinate {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<Coordinate> for [f64; 3] {
    fn from(c: Coordinate) -> Self {
        [c.x, c.y, c.z]
    }
}

impl core::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{:.1}, {:.1}, {:.1}]", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// One occupied inventory slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Window slot index holding the stack.
    pub slot: u16,
    /// Numeric item type id (static-data registry key).
    pub type_id: u32,
    /// Registry name, e.g. `cooked_beef`.
    pub name: String,
    /// Stack size.
    pub count: u32,
}

/// Snapshot of the occupied inventory slots, keyed by slot index.
///
/// Read fresh from the agent on every use; never cached across suspensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    slots: BTreeMap<u16, ItemStack>,
}

impl Inventory {
    /// Build an inventory from stacks. Later stacks replace earlier ones in
    /// the same slot.
    pub fn from_stacks(stacks: impl IntoIterator<Item = ItemStack>) -> Self {
        Self {
            slots: stacks.into_iter().map(|s| (s.slot, s)).collect(),
        }
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// The stack in `slot`, if any.
    pub fn get(&self, slot: u16) -> Option<&ItemStack> {
        self.slots.get(&slot)
    }

    /// All stacks in slot order.
    pub fn stacks(&self) -> impl Iterator<Item = &ItemStack> {
        self.slots.values()
    }

    /// First stack (lowest slot) with the given registry name.
    pub fn find(&self, name: &str) -> Option<&ItemStack> {
        self.slots.values().find(|s| s.name == name)
    }

    /// Total count of `name` across all stacks.
    pub fn count_of(&self, name: &str) -> u32 {
        self.slots
            .values()
            .filter(|s| s.name == name)
            .fold(0_u32, |acc, s| acc.saturating_add(s.count))
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Full environment-side view of a loaded entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntity {
    /// Environment entity id.
    pub id: EntityId,
    /// Entity kind from the registry name.
    pub kind: EntityKind,
    /// Current position.
    pub position: Coordinate,
    /// Account name, for players.
    pub username: Option<String>,
    /// Item type id carried in metadata, for dropped items.
    pub item_id: Option<u32>,
    /// Profession from villager metadata (e.g. `cleric` or
    /// `minecraft:cleric`), when the environment has sent it.
    pub profession: Option<String>,
}

impl RawEntity {
    /// Whether this entity's profession metadata names `profession`,
    /// with or without the `minecraft:` namespace.
    pub fn has_profession(&self, profession: &str) -> bool {
        self.profession.as_deref().is_some_and(|p| {
            p == profession || p.strip_prefix("minecraft:") == Some(profession)
        })
    }
}

/// Lightweight summary of a nearby entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySummary {
    /// Current position.
    pub position: Coordinate,
    /// Entity kind.
    pub kind: EntityKind,
    /// Resolved display name: the username for players, the item name for
    /// dropped items, otherwise `None`.
    pub display_name: Option<String>,
}

/// A villager found by the trade cycle's search.
#[derive(Debug, Clone, PartialEq)]
pub struct VillagerInfo {
    /// Entity id at discovery time (weak key, may go stale).
    pub id: EntityId,
    /// Last known position.
    pub position: Coordinate,
    /// Profession tag, when known.
    pub profession: Option<String>,
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

/// One side of a trade offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferItem {
    /// Registry name.
    pub name: String,
    /// Quantity.
    pub count: u32,
}

impl OfferItem {
    /// Create an offer item.
    pub fn new(name: &str, count: u32) -> Self {
        Self {
            name: name.to_owned(),
            count,
        }
    }
}

/// A trade offer listed in an open villager window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    /// Primary input (the currency side).
    pub input: OfferItem,
    /// Optional second input.
    pub secondary_input: Option<OfferItem>,
    /// What the trade produces.
    pub output: OfferItem,
    /// Times this offer has been used since the last restock.
    pub uses: u32,
    /// Uses allowed before restock; 0 means unlimited.
    pub max_uses: u32,
    /// Whether the environment reports the offer disabled.
    pub disabled: bool,
}

impl TradeOffer {
    /// Whether the offer can no longer be executed until restock.
    pub const fn is_exhausted(&self) -> bool {
        self.disabled || (self.max_uses > 0 && self.uses >= self.max_uses)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stack(slot: u16, name: &str, count: u32) -> ItemStack {
        ItemStack {
            slot,
            type_id: 0,
            name: name.to_owned(),
            count,
        }
    }

    #[test]
    fn within_checks_every_axis() {
        let target = Coordinate::new(1000.0, 120.0, 1000.0);
        assert!(Coordinate::new(999.2, 120.9, 1000.5).within(&target, 1.0));
        assert!(!Coordinate::new(998.9, 120.0, 1000.0).within(&target, 1.0));
        assert!(!Coordinate::new(1000.0, 121.5, 1000.0).within(&target, 1.0));
    }

    #[test]
    fn horizontal_movement_ignores_height() {
        let a = Coordinate::new(0.0, 64.0, 0.0);
        assert!(!a.moved_horizontally(&Coordinate::new(0.5, 10.0, 0.5), 1.0));
        assert!(a.moved_horizontally(&Coordinate::new(0.0, 64.0, 1.0), 1.0));
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Coordinate::new(0.0, 0.0, 0.0);
        let b = Coordinate::new(3.0, 4.0, 12.0);
        assert!((a.distance(&b) - 13.0).abs() < 1e-9);
    }

    #[test]
    fn coordinate_deserializes_from_array() {
        let c: Coordinate = serde_json::from_str("[1000, 120, -5.5]").unwrap();
        assert_eq!(c, Coordinate::new(1000.0, 120.0, -5.5));
    }

    #[test]
    fn block_floors_negative_coordinates() {
        assert_eq!(Coordinate::new(-0.5, 64.9, 3.0).block(), [-1, 64, 3]);
    }

    #[test]
    fn inventory_counts_across_stacks() {
        let inv = Inventory::from_stacks([
            stack(36, "emerald", 64),
            stack(37, "bread", 3),
            stack(40, "emerald", 10),
        ]);
        assert_eq!(inv.count_of("emerald"), 74);
        assert_eq!(inv.count_of("diamond"), 0);
        assert_eq!(inv.find("emerald").map(|s| s.slot), Some(36));
        assert_eq!(inv.len(), 3);
    }

    #[test]
    fn profession_matches_with_and_without_namespace() {
        let mut villager = RawEntity {
            id: EntityId(1),
            kind: EntityKind::Villager,
            position: Coordinate::ORIGIN,
            username: None,
            item_id: None,
            profession: Some("minecraft:cleric".to_owned()),
        };
        assert!(villager.has_profession("cleric"));
        villager.profession = Some("cleric".to_owned());
        assert!(villager.has_profession("cleric"));
        villager.profession = None;
        assert!(!villager.has_profession("cleric"));
    }

    #[test]
    fn offer_exhaustion() {
        let mut offer = TradeOffer {
            input: OfferItem::new("emerald", 3),
            secondary_input: None,
            output: OfferItem::new("experience_bottle", 1),
            uses: 0,
            max_uses: 12,
            disabled: false,
        };
        assert!(!offer.is_exhausted());
        offer.uses = 12;
        assert!(offer.is_exhausted());
        offer.uses = 0;
        offer.disabled = true;
        assert!(offer.is_exhausted());
    }
}
