//! Static game data collaborator: item names and food values.

use std::collections::BTreeMap;

/// Food properties of an edible item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoodInfo {
    /// Registry name.
    pub name: String,
    /// Hunger points restored when eaten.
    pub food_points: u32,
}

/// Lookup of static item data by numeric id.
pub trait GameData: Send + Sync {
    /// Food properties of item `type_id`, or `None` if it is not edible.
    fn food(&self, type_id: u32) -> Option<FoodInfo>;

    /// Registry name of item `type_id`.
    fn item_name(&self, type_id: u32) -> Option<String>;
}

#[derive(Debug, Clone)]
struct ItemEntry {
    name: &'static str,
    food_points: Option<u32>,
}

/// In-memory item table.
#[derive(Debug, Clone, Default)]
pub struct StaticGameData {
    by_id: BTreeMap<u32, ItemEntry>,
    by_name: BTreeMap<&'static str, u32>,
}

/// `(name, food points)` for every item in the built-in table, in id order.
const VANILLA_ITEMS: &[(&str, Option<u32>)] = &[
    ("air", None),
    ("stone", None),
    ("netherrack", None),
    ("obsidian", None),
    ("emerald", None),
    ("experience_bottle", None),
    ("shield", None),
    ("diamond_pickaxe", None),
    ("netherite_ingot", None),
    ("netherite_scrap", None),
    ("netherite_sword", None),
    ("netherite_chestplate", None),
    ("shulker_box", None),
    ("shulker_shell", None),
    ("elytra", None),
    ("totem_of_undying", None),
    ("apple", Some(4)),
    ("baked_potato", Some(5)),
    ("beetroot", Some(1)),
    ("bread", Some(5)),
    ("carrot", Some(3)),
    ("cooked_beef", Some(8)),
    ("cooked_chicken", Some(6)),
    ("cooked_cod", Some(5)),
    ("cooked_mutton", Some(6)),
    ("cooked_porkchop", Some(8)),
    ("cooked_rabbit", Some(5)),
    ("cooked_salmon", Some(6)),
    ("cookie", Some(2)),
    ("dried_kelp", Some(1)),
    ("enchanted_golden_apple", Some(4)),
    ("golden_apple", Some(4)),
    ("golden_carrot", Some(6)),
    ("melon_slice", Some(2)),
    ("mushroom_stew", Some(6)),
    ("poisonous_potato", Some(2)),
    ("potato", Some(1)),
    ("pufferfish", Some(1)),
    ("pumpkin_pie", Some(8)),
    ("rabbit_stew", Some(10)),
    ("rotten_flesh", Some(4)),
    ("spider_eye", Some(2)),
    ("suspicious_stew", Some(6)),
    ("sweet_berries", Some(2)),
];

impl StaticGameData {
    /// The built-in vanilla subset: common foods plus the items the
    /// behaviors look for by name.
    pub fn vanilla() -> Self {
        let mut data = Self::default();
        for (id, (name, food_points)) in (0_u32..).zip(VANILLA_ITEMS.iter()) {
            data.insert(id, name, *food_points);
        }
        data
    }

    fn insert(&mut self, id: u32, name: &'static str, food_points: Option<u32>) {
        self.by_id.insert(id, ItemEntry { name, food_points });
        self.by_name.insert(name, id);
    }

    /// Numeric id of the item called `name`.
    pub fn item_id(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }
}

impl GameData for StaticGameData {
    fn food(&self, type_id: u32) -> Option<FoodInfo> {
        let entry = self.by_id.get(&type_id)?;
        entry.food_points.map(|food_points| FoodInfo {
            name: entry.name.to_owned(),
            food_points,
        })
    }

    fn item_name(&self, type_id: u32) -> Option<String> {
        self.by_id.get(&type_id).map(|e| e.name.to_owned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn food_lookup_round_trips_through_ids() {
        let data = StaticGameData::vanilla();
        let beef = data.item_id("cooked_beef").unwrap();
        assert_eq!(
            data.food(beef),
            Some(FoodInfo {
                name: "cooked_beef".to_owned(),
                food_points: 8
            })
        );
        assert_eq!(data.item_name(beef).as_deref(), Some("cooked_beef"));
    }

    #[test]
    fn non_food_items_have_no_food_info() {
        let data = StaticGameData::vanilla();
        let emerald = data.item_id("emerald").unwrap();
        assert!(data.food(emerald).is_none());
        assert!(data.item_id("not_an_item").is_none());
    }
}
