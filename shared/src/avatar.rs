//! Per-visit avatar state
//!
//! An [`AvatarState`] lives exactly as long as one room visit. Switching rooms
//! builds a fresh one, so position, pictures and the switch/variable caches
//! never carry over.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::MAX_PICTURES;

/// Direction an avatar faces, in the game's numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facing {
    Up = 0,
    Right = 1,
    Down = 2,
    Left = 3,
}

impl Facing {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Facing::Up),
            1 => Some(Facing::Right),
            2 => Some(Facing::Down),
            3 => Some(Facing::Left),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Facing implied by a step from one tile to another
    ///
    /// Horizontal movement wins over vertical; no movement yields `None`.
    pub fn from_step(from: (u16, u16), to: (u16, u16)) -> Option<Self> {
        let dx = to.0 as i32 - from.0 as i32;
        let dy = to.1 as i32 - from.1 as i32;
        if dx > 0 {
            Some(Facing::Right)
        } else if dx < 0 {
            Some(Facing::Left)
        } else if dy > 0 {
            Some(Facing::Down)
        } else if dy < 0 {
            Some(Facing::Up)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprite {
    pub name: String,
    pub index: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub power: u8,
    pub frames: u16,
}

impl Flash {
    pub fn fields(&self) -> Vec<String> {
        vec![
            self.red.to_string(),
            self.green.to_string(),
            self.blue.to_string(),
            self.power.to_string(),
            self.frames.to_string(),
        ]
    }
}

/// Placement and tint shared by show-picture and move-picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PictureParams {
    pub position: (i32, i32),
    pub map: (i32, i32),
    pub pan: (i32, i32),
    pub magnify: u16,
    pub top_transparency: u8,
    pub bottom_transparency: u8,
    pub color: (u8, u8, u8),
    pub saturation: u8,
    pub effect_mode: u8,
    pub effect_power: i32,
}

impl PictureParams {
    /// Number of wire fields this struct occupies
    pub const FIELD_COUNT: usize = 15;

    pub fn fields(&self) -> Vec<String> {
        vec![
            self.position.0.to_string(),
            self.position.1.to_string(),
            self.map.0.to_string(),
            self.map.1.to_string(),
            self.pan.0.to_string(),
            self.pan.1.to_string(),
            self.magnify.to_string(),
            self.top_transparency.to_string(),
            self.bottom_transparency.to_string(),
            self.color.0.to_string(),
            self.color.1.to_string(),
            self.color.2.to_string(),
            self.saturation.to_string(),
            self.effect_mode.to_string(),
            self.effect_power.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Picture {
    pub id: u16,
    pub params: PictureParams,
    pub name: String,
    pub use_transparent_color: bool,
    pub fixed_to_map: bool,
}

impl Picture {
    /// Fields of a show-picture message, picture id first
    pub fn fields(&self) -> Vec<String> {
        let mut fields = vec![self.id.to_string()];
        fields.extend(self.params.fields());
        fields.push(self.name.clone());
        fields.push(bool_field(self.use_transparent_color));
        fields.push(bool_field(self.fixed_to_map));
        fields
    }
}

/// The two most recent maps a player came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumbs {
    pub previous: Option<u32>,
    pub before_previous: Option<u32>,
}

impl Breadcrumbs {
    pub fn push(&mut self, map_id: u32) {
        self.before_previous = self.previous;
        self.previous = Some(map_id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarState {
    pub x: u16,
    pub y: u16,
    pub facing: Facing,
    pub speed: u8,
    pub sprite: Option<Sprite>,
    pub repeating_flash: Option<Flash>,
    pub hidden: bool,
    pub transparency: u8,
    pub system: Option<String>,
    pub pictures: BTreeMap<u16, Picture>,
    pub switches: HashMap<u32, bool>,
    pub vars: HashMap<u32, i32>,
    pub breadcrumbs: Breadcrumbs,
}

impl Default for AvatarState {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            facing: Facing::Down,
            speed: 4,
            sprite: None,
            repeating_flash: None,
            hidden: false,
            transparency: 0,
            system: None,
            pictures: BTreeMap::new(),
            switches: HashMap::new(),
            vars: HashMap::new(),
            breadcrumbs: Breadcrumbs::default(),
        }
    }
}

impl AvatarState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks to a tile, turning towards it; returns the new facing
    pub fn step_to(&mut self, x: u16, y: u16) -> Facing {
        if let Some(facing) = Facing::from_step((self.x, self.y), (x, y)) {
            self.facing = facing;
        }
        self.x = x;
        self.y = y;
        self.facing
    }

    /// Moves without turning (teleports and jumps)
    pub fn place_at(&mut self, x: u16, y: u16) {
        self.x = x;
        self.y = y;
    }

    /// Shows or replaces a picture; ids outside `1..=MAX_PICTURES` are refused
    pub fn show_picture(&mut self, picture: Picture) -> bool {
        if picture.id == 0 || picture.id > MAX_PICTURES {
            return false;
        }
        self.pictures.insert(picture.id, picture);
        true
    }

    /// Updates a shown picture in place; `false` when the slot is empty
    pub fn move_picture(&mut self, id: u16, params: PictureParams) -> bool {
        match self.pictures.get_mut(&id) {
            Some(picture) => {
                picture.params = params;
                true
            }
            None => false,
        }
    }

    pub fn erase_picture(&mut self, id: u16) -> bool {
        self.pictures.remove(&id).is_some()
    }

    /// Caches a switch value; returns the previous value if it was known
    pub fn cache_switch(&mut self, id: u32, value: bool) -> Option<bool> {
        self.switches.insert(id, value)
    }

    pub fn cache_var(&mut self, id: u32, value: i32) -> Option<i32> {
        self.vars.insert(id, value)
    }
}

pub fn bool_field(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> PictureParams {
        PictureParams {
            position: (160, 120),
            map: (0, 0),
            pan: (0, 0),
            magnify: 100,
            top_transparency: 0,
            bottom_transparency: 0,
            color: (100, 100, 100),
            saturation: 100,
            effect_mode: 0,
            effect_power: 0,
        }
    }

    fn picture(id: u16) -> Picture {
        Picture {
            id,
            params: params(),
            name: "sun".to_string(),
            use_transparent_color: true,
            fixed_to_map: false,
        }
    }

    #[test]
    fn test_default_avatar() {
        let avatar = AvatarState::new();
        assert_eq!((avatar.x, avatar.y), (0, 0));
        assert_eq!(avatar.facing, Facing::Down);
        assert_eq!(avatar.speed, 4);
        assert!(avatar.pictures.is_empty());
        assert!(avatar.switches.is_empty());
        assert!(avatar.vars.is_empty());
        assert_eq!(avatar.breadcrumbs, Breadcrumbs::default());
    }

    #[test]
    fn test_step_derives_facing() {
        let mut avatar = AvatarState::new();
        avatar.place_at(5, 5);

        assert_eq!(avatar.step_to(6, 5), Facing::Right);
        assert_eq!(avatar.step_to(6, 4), Facing::Up);
        assert_eq!(avatar.step_to(5, 4), Facing::Left);
        assert_eq!(avatar.step_to(5, 5), Facing::Down);
        // Standing still keeps the last facing
        assert_eq!(avatar.step_to(5, 5), Facing::Down);
    }

    #[test]
    fn test_place_keeps_facing() {
        let mut avatar = AvatarState::new();
        avatar.step_to(0, 0);
        avatar.facing = Facing::Left;
        avatar.place_at(40, 2);
        assert_eq!(avatar.facing, Facing::Left);
        assert_eq!((avatar.x, avatar.y), (40, 2));
    }

    #[test]
    fn test_picture_slots() {
        let mut avatar = AvatarState::new();
        assert!(!avatar.show_picture(picture(0)));
        assert!(!avatar.show_picture(picture(MAX_PICTURES + 1)));
        assert!(avatar.show_picture(picture(1)));
        assert!(avatar.show_picture(picture(MAX_PICTURES)));
        assert_eq!(avatar.pictures.len(), 2);

        let mut moved = params();
        moved.position = (0, 0);
        assert!(avatar.move_picture(1, moved));
        assert!(!avatar.move_picture(2, moved));
        assert_eq!(avatar.pictures[&1].params.position, (0, 0));

        assert!(avatar.erase_picture(1));
        assert!(!avatar.erase_picture(1));
        // Erased ids can be reused
        assert!(avatar.show_picture(picture(1)));
    }

    #[test]
    fn test_picture_fields_layout() {
        let fields = picture(3).fields();
        assert_eq!(fields.len(), 1 + PictureParams::FIELD_COUNT + 3);
        assert_eq!(fields[0], "3");
        assert_eq!(fields[16], "sun");
        assert_eq!(fields[17], "1");
        assert_eq!(fields[18], "0");
    }

    #[test]
    fn test_breadcrumbs_shift() {
        let mut crumbs = Breadcrumbs::default();
        crumbs.push(10);
        crumbs.push(11);
        assert_eq!(crumbs.previous, Some(11));
        assert_eq!(crumbs.before_previous, Some(10));
    }

    #[test]
    fn test_cache_returns_previous_value() {
        let mut avatar = AvatarState::new();
        assert_eq!(avatar.cache_switch(4, true), None);
        assert_eq!(avatar.cache_switch(4, false), Some(true));
        assert_eq!(avatar.cache_var(9, 12), None);
        assert_eq!(avatar.cache_var(9, 13), Some(12));
    }
}
