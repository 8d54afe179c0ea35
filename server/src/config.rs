//! Server settings and the game configuration loaded at startup
//!
//! [`ServerSettings`] carries process knobs parsed from the command line.
//! [`GameConfig`] carries the game data (maps, condition and badge rules,
//! asset whitelists, locations) and is read once from JSON; nothing in it
//! changes while the server runs.

use serde::Deserialize;
use shared::badge::Badge;
use shared::condition::Condition;
use shared::minigame::Minigame;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse game config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("game config lists no maps")]
    NoMaps,
    #[error("map {0} is listed twice")]
    DuplicateMap(u32),
}

/// Runtime knobs for the gateway and actors
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Shared secret mixed into every frame signature
    pub signing_key: Vec<u8>,
    pub room_capacity: usize,
    /// Bound of every actor mailbox
    pub mailbox_capacity: usize,
    /// Bound of every connection's outbound queue
    pub outbox_capacity: usize,
    pub keepalive: Duration,
    pub max_connections_per_ip: usize,
    pub chat_history_limit: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            signing_key: b"overlay-dev-key".to_vec(),
            room_capacity: shared::ROOM_CAPACITY,
            mailbox_capacity: 1024,
            outbox_capacity: 256,
            keepalive: Duration::from_secs(30),
            max_connections_per_ip: 16,
            chat_history_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    /// Occupants never see each other here
    #[serde(default)]
    pub singleplayer: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub name: String,
    pub map_ids: Vec<u32>,
}

/// A claimable event, open between two unix timestamps
#[derive(Debug, Clone, Deserialize)]
pub struct TimedEvent {
    pub id: String,
    pub map_ids: Vec<u32>,
    pub exp: u32,
    pub start_unix: u64,
    pub end_unix: u64,
}

impl TimedEvent {
    pub fn is_open(&self, now_unix: u64) -> bool {
        (self.start_unix..self.end_unix).contains(&now_unix)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetLists {
    #[serde(default)]
    pub sprites: Vec<String>,
    #[serde(default)]
    pub systems: Vec<String>,
    #[serde(default)]
    pub sounds: Vec<String>,
    #[serde(default)]
    pub pictures: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    pub maps: Vec<MapConfig>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub minigames: Vec<Minigame>,
    #[serde(default)]
    pub events: Vec<TimedEvent>,
    #[serde(default)]
    pub locations: Vec<Location>,
    /// Undirected map adjacency used for next-hop routing
    #[serde(default)]
    pub connections: Vec<(u32, u32)>,
    #[serde(default)]
    pub assets: AssetLists,
    #[serde(default)]
    pub profanity: Vec<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            maps: (1..=20)
                .map(|id| MapConfig {
                    id,
                    name: String::new(),
                    singleplayer: false,
                })
                .collect(),
            conditions: Vec::new(),
            badges: Vec::new(),
            minigames: Vec::new(),
            events: Vec::new(),
            locations: Vec::new(),
            connections: Vec::new(),
            assets: AssetLists::default(),
            profanity: Vec::new(),
        }
    }
}

impl GameConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.maps.is_empty() {
            return Err(ConfigError::NoMaps);
        }
        let mut seen = HashSet::new();
        for map in &self.maps {
            if !seen.insert(map.id) {
                return Err(ConfigError::DuplicateMap(map.id));
            }
        }
        Ok(())
    }

    pub fn map(&self, map_id: u32) -> Option<&MapConfig> {
        self.maps.iter().find(|m| m.id == map_id)
    }

    /// Room-scoped plus global conditions for one map
    pub fn conditions_for(&self, map_id: u32) -> Vec<Condition> {
        self.conditions
            .iter()
            .filter(|c| c.applies_to(map_id))
            .cloned()
            .collect()
    }

    pub fn minigames_for(&self, map_id: u32) -> Vec<Minigame> {
        self.minigames
            .iter()
            .filter(|m| m.map_id == map_id)
            .cloned()
            .collect()
    }

    pub fn locations_for(&self, map_id: u32) -> Vec<&Location> {
        self.locations
            .iter()
            .filter(|l| l.map_ids.contains(&map_id))
            .collect()
    }

    pub fn event(&self, event_id: &str) -> Option<&TimedEvent> {
        self.events.iter().find(|e| e.id == event_id)
    }

    /// First map to walk to on a shortest path from `from` to `to`
    pub fn next_hop(&self, from: u32, to: u32) -> Option<u32> {
        if from == to {
            return None;
        }

        let mut adjacency: HashMap<u32, Vec<u32>> = HashMap::new();
        for &(a, b) in &self.connections {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }

        // Breadth-first search remembering the first hop of each path
        let mut first_hop: HashMap<u32, u32> = HashMap::new();
        let mut queue = VecDeque::new();
        for &next in adjacency.get(&from).into_iter().flatten() {
            if first_hop.insert(next, next).is_none() {
                queue.push_back(next);
            }
        }
        while let Some(map) = queue.pop_front() {
            let hop = first_hop[&map];
            if map == to {
                return Some(hop);
            }
            for &next in adjacency.get(&map).into_iter().flatten() {
                if next != from && !first_hop.contains_key(&next) {
                    first_hop.insert(next, hop);
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

/// Asset whitelist collaborator
pub trait AssetCatalog: Send + Sync {
    fn sprite_allowed(&self, name: &str) -> bool;
    fn system_allowed(&self, name: &str) -> bool;
    fn sound_allowed(&self, name: &str) -> bool;
    fn picture_allowed(&self, name: &str) -> bool;
}

/// Whitelists from the game config; an empty list accepts any name
pub struct ConfigAssets {
    sprites: HashSet<String>,
    systems: HashSet<String>,
    sounds: HashSet<String>,
    pictures: HashSet<String>,
}

impl ConfigAssets {
    pub fn new(lists: &AssetLists) -> Self {
        let set = |names: &[String]| names.iter().cloned().collect::<HashSet<_>>();
        Self {
            sprites: set(&lists.sprites),
            systems: set(&lists.systems),
            sounds: set(&lists.sounds),
            pictures: set(&lists.pictures),
        }
    }

    fn allowed(list: &HashSet<String>, name: &str) -> bool {
        !name.is_empty() && (list.is_empty() || list.contains(name))
    }
}

impl AssetCatalog for ConfigAssets {
    fn sprite_allowed(&self, name: &str) -> bool {
        Self::allowed(&self.sprites, name)
    }

    fn system_allowed(&self, name: &str) -> bool {
        Self::allowed(&self.systems, name)
    }

    fn sound_allowed(&self, name: &str) -> bool {
        Self::allowed(&self.sounds, name)
    }

    fn picture_allowed(&self, name: &str) -> bool {
        Self::allowed(&self.pictures, name)
    }
}
