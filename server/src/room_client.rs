//! One player's presence in one room

use shared::avatar::{bool_field, AvatarState};
use shared::codec::encode_message;
use shared::condition::ChainCursors;
use std::collections::HashSet;
use uuid::Uuid;

use crate::connection::{ConnId, Outbox};
use crate::store::PlayerIdentity;

/// Ephemeral per-visit state, owned by exactly one room actor
///
/// Built fresh for every join; nothing here survives a room switch except
/// the identity snapshot it was created from.
#[derive(Debug)]
pub struct RoomClient {
    pub identity: PlayerIdentity,
    /// Assigned by the room on join
    pub avatar_id: u16,
    pub outbox: Outbox,
    pub avatar: AvatarState,
    pub cursors: ChainCursors,
    /// Co-occupants whose avatar this client has been told about
    pub known: HashSet<Uuid>,
}

impl RoomClient {
    pub fn new(identity: PlayerIdentity, outbox: Outbox) -> Self {
        Self {
            identity,
            avatar_id: 0,
            outbox,
            avatar: AvatarState::new(),
            cursors: ChainCursors::new(),
            known: HashSet::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.identity.uuid
    }

    pub fn conn_id(&self) -> ConnId {
        self.outbox.conn_id()
    }

    pub fn send<S: AsRef<str>>(&self, name: &str, fields: &[S]) -> bool {
        self.outbox.send(name, fields)
    }

    /// Encodes an event about this avatar: command name, avatar id, fields
    pub fn event<S: AsRef<str>>(&self, name: &str, fields: &[S]) -> String {
        let mut all = Vec::with_capacity(fields.len() + 1);
        all.push(self.avatar_id.to_string());
        all.extend(fields.iter().map(|f| f.as_ref().to_string()));
        encode_message(name, &all)
    }

    /// The connect event announcing this avatar
    pub fn connect_event(&self) -> String {
        self.event(
            "c",
            &[
                self.uuid().to_string(),
                self.identity.rank.as_u8().to_string(),
                bool_field(self.identity.account.is_some()),
                self.identity.badge.clone().unwrap_or_default(),
            ],
        )
    }

    /// Everything a newcomer needs to render this avatar, connect event first
    pub fn snapshot(&self) -> Vec<String> {
        let avatar = &self.avatar;
        let mut messages = vec![self.connect_event()];

        if let Some(name) = &self.identity.name {
            messages.push(self.event("name", &[name]));
        }
        messages.push(self.event("m", &[avatar.x.to_string(), avatar.y.to_string()]));
        messages.push(self.event("f", &[avatar.facing.index().to_string()]));
        messages.push(self.event("spd", &[avatar.speed.to_string()]));
        if let Some(sprite) = &avatar.sprite {
            messages.push(self.event("spr", &[sprite.name.clone(), sprite.index.to_string()]));
        }
        if let Some(flash) = &avatar.repeating_flash {
            messages.push(self.event("rfl", &flash.fields()));
        }
        if avatar.hidden {
            messages.push(self.event("h", &["1"]));
        }
        if avatar.transparency > 0 {
            messages.push(self.event("tr", &[avatar.transparency.to_string()]));
        }
        if let Some(system) = &avatar.system {
            messages.push(self.event("sys", &[system]));
        }
        for picture in avatar.pictures.values() {
            messages.push(self.event("ap", &picture.fields()));
        }

        messages
    }
}
