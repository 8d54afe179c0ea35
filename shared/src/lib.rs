//! Protocol and rule types shared by the overlay server and its clients
//!
//! Everything in this crate is pure: frame authentication and command
//! splitting, the per-visit avatar model, the condition engine that maps
//! switch/variable/coordinate events to unlocks, minigame scoring and the
//! badge projection. The server crate owns all I/O and actor plumbing.

pub mod avatar;
pub mod badge;
pub mod codec;
pub mod condition;
pub mod minigame;

pub use avatar::{AvatarState, Breadcrumbs, Facing, Flash, Picture, PictureParams, Sprite};
pub use codec::{Command, FrameError};

/// Separates fields inside one command
pub const FIELD_DELIMITER: char = '\u{FFFF}';
/// Separates commands inside one frame
pub const MESSAGE_DELIMITER: char = '\u{FFFE}';

/// Largest accepted client frame, header included
pub const MAX_FRAME_SIZE: usize = 4096;
/// Default number of occupants a room accepts
pub const ROOM_CAPACITY: usize = 512;

pub const MAX_SPEED: u8 = 10;
pub const MAX_TRANSPARENCY: u8 = 7;
pub const MAX_SPRITE_INDEX: u8 = 7;
/// Picture ids run from 1 to this value; an erased id may be shown again
pub const MAX_PICTURES: u16 = 50;
pub const MAX_CHAT_LENGTH: usize = 150;
pub const MAX_NAME_LENGTH: usize = 12;
