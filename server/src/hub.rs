//! Process-scoped registries shared by every actor
//!
//! The [`Hub`] is created once at startup and handed to every actor and
//! connection as an `Arc`. It owns:
//! - the fixed room table, one [`RoomHandle`] per configured map
//! - the session registry (identity → live session connection)
//! - the room presence registry (identity → live room connection)
//! - the party cache and the privacy set used by the visibility rule
//! - the per-address connection counter
//!
//! # Lock discipline
//!
//! Each structure has its own reader/writer lock. The two registries use
//! async locks and are always taken in the order *sessions, then presence*.
//! The party cache, privacy set and connection counter use `std` locks that
//! are never held across an await, which lets the room actors evaluate
//! visibility synchronously.

use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::chat::{ChatRelay, LogRelay, ProfanityFilter};
use crate::config::{AssetCatalog, ConfigAssets, GameConfig, ServerSettings};
use crate::connection::{ConnId, Outbox};
use crate::room::{RoomActor, RoomHandle, RoomMsg};
use crate::session::SessionHandle;
use crate::store::{MemoryStore, Party, PlayerIdentity, Store, StoreError};

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Live room connection of one identity
#[derive(Debug, Clone)]
pub struct RoomPresence {
    pub map_id: u32,
    pub outbox: Outbox,
}

/// Party membership index mirrored from the store
#[derive(Debug, Default)]
pub struct PartyCache {
    inner: StdRwLock<PartyIndex>,
}

#[derive(Debug, Default)]
struct PartyIndex {
    member_of: HashMap<Uuid, u32>,
    parties: HashMap<u32, Party>,
}

impl PartyCache {
    pub fn load(parties: Vec<Party>) -> Self {
        let cache = Self::default();
        for party in &parties {
            cache.upsert(party);
        }
        cache
    }

    /// Replaces everything known about `party`
    pub fn upsert(&self, party: &Party) {
        let mut index = self.inner.write().unwrap_or_else(|e| e.into_inner());
        index.member_of.retain(|_, id| *id != party.id);
        for member in &party.members {
            index.member_of.insert(*member, party.id);
        }
        index.parties.insert(party.id, party.clone());
    }

    pub fn disband(&self, party_id: u32) {
        let mut index = self.inner.write().unwrap_or_else(|e| e.into_inner());
        index.member_of.retain(|_, id| *id != party_id);
        index.parties.remove(&party_id);
    }

    /// Drops a member from the index without touching the party record
    pub fn forget_member(&self, uuid: Uuid) {
        let mut index = self.inner.write().unwrap_or_else(|e| e.into_inner());
        index.member_of.remove(&uuid);
    }

    pub fn party_of(&self, uuid: Uuid) -> Option<Party> {
        let index = self.inner.read().unwrap_or_else(|e| e.into_inner());
        index
            .member_of
            .get(&uuid)
            .and_then(|id| index.parties.get(id))
            .cloned()
    }

    pub fn share_party(&self, a: Uuid, b: Uuid) -> bool {
        let index = self.inner.read().unwrap_or_else(|e| e.into_inner());
        match (index.member_of.get(&a), index.member_of.get(&b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn get(&self, party_id: u32) -> Option<Party> {
        let index = self.inner.read().unwrap_or_else(|e| e.into_inner());
        index.parties.get(&party_id).cloned()
    }
}

/// Counts open connections per source address
#[derive(Debug, Default)]
struct ConnectionCounter {
    open: StdRwLock<HashMap<IpAddr, usize>>,
}

/// Slot held by an admitted connection; released on drop
pub struct ConnectionPermit {
    hub: Arc<Hub>,
    addr: IpAddr,
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        let mut open = self
            .hub
            .connections
            .open
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(count) = open.get_mut(&self.addr) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                open.remove(&self.addr);
            }
        }
    }
}

pub struct Hub {
    pub settings: ServerSettings,
    pub game: GameConfig,
    pub store: Arc<dyn Store>,
    pub assets: Arc<dyn AssetCatalog>,
    pub relay: Arc<dyn ChatRelay>,
    pub profanity: ProfanityFilter,
    pub parties: PartyCache,
    rooms: HashMap<u32, RoomHandle>,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
    presence: RwLock<HashMap<Uuid, RoomPresence>>,
    privacy: StdRwLock<HashSet<Uuid>>,
    connections: ConnectionCounter,
}

impl Hub {
    /// Builds the hub and spawns one actor per configured map
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start(
        settings: ServerSettings,
        game: GameConfig,
        store: Arc<dyn Store>,
        assets: Arc<dyn AssetCatalog>,
        relay: Arc<dyn ChatRelay>,
    ) -> Result<Arc<Hub>, StoreError> {
        let parties = PartyCache::load(store.parties()?);
        let profanity = ProfanityFilter::new(&game.profanity);

        let mut rooms = HashMap::new();
        let mut mailboxes = Vec::new();
        for map in &game.maps {
            let (tx, rx) = mpsc::channel::<RoomMsg>(settings.mailbox_capacity);
            rooms.insert(map.id, RoomHandle::new(map.id, tx));
            mailboxes.push((map.clone(), rx));
        }

        let hub = Arc::new(Hub {
            settings,
            game,
            store,
            assets,
            relay,
            profanity,
            parties,
            rooms,
            sessions: RwLock::new(HashMap::new()),
            presence: RwLock::new(HashMap::new()),
            privacy: StdRwLock::new(HashSet::new()),
            connections: ConnectionCounter::default(),
        });

        for (map, rx) in mailboxes {
            let actor = RoomActor::new(&map, Arc::clone(&hub), rx);
            tokio::spawn(actor.run());
        }
        info!("Started {} rooms", hub.rooms.len());

        Ok(hub)
    }

    /// Hub backed by an in-process store and the config whitelists
    pub fn in_memory(settings: ServerSettings, game: GameConfig) -> Result<Arc<Hub>, StoreError> {
        let assets = Arc::new(ConfigAssets::new(&game.assets));
        Self::start(
            settings,
            game,
            Arc::new(MemoryStore::new()),
            assets,
            Arc::new(LogRelay),
        )
    }

    pub fn room(&self, map_id: u32) -> Option<&RoomHandle> {
        self.rooms.get(&map_id)
    }

    // Connection cap

    /// Reserves a connection slot for `addr`, `None` when the cap is reached
    pub fn admit(self: &Arc<Self>, addr: IpAddr) -> Option<ConnectionPermit> {
        let mut open = self
            .connections
            .open
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let count = open.entry(addr).or_insert(0);
        if *count >= self.settings.max_connections_per_ip {
            warn!("Connection cap reached for {}", addr);
            return None;
        }
        *count += 1;
        Some(ConnectionPermit {
            hub: Arc::clone(self),
            addr,
        })
    }

    // Visibility

    pub fn set_private(&self, uuid: Uuid, private: bool) {
        let mut set = self.privacy.write().unwrap_or_else(|e| e.into_inner());
        if private {
            set.insert(uuid);
        } else {
            set.remove(&uuid);
        }
    }

    pub fn is_private(&self, uuid: Uuid) -> bool {
        self.privacy
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&uuid)
    }

    /// Whether two occupants of the same room exchange broadcasts
    ///
    /// Visible unless either side is private and they share no party and
    /// are not friends. Both are online by construction.
    pub fn visible(&self, a: Uuid, b: Uuid) -> bool {
        if a == b || (!self.is_private(a) && !self.is_private(b)) {
            return true;
        }
        if self.parties.share_party(a, b) {
            return true;
        }
        match self.store.are_friends(a, b) {
            Ok(friends) => friends,
            Err(e) => {
                warn!("Friend lookup failed for {} / {}: {}", a, b, e);
                false
            }
        }
    }

    // Session registry

    /// Registers a session connection, superseding any previous one
    ///
    /// A superseded session is cancelled together with the identity's room
    /// connection before the new session becomes visible.
    pub async fn attach_session(&self, uuid: Uuid, handle: SessionHandle) {
        let mut sessions = self.sessions.write().await;
        if let Some(previous) = sessions.insert(uuid, handle) {
            info!("Session of {} superseded", uuid);
            previous.outbox.cancel();
            let presence = self.presence.read().await;
            if let Some(room) = presence.get(&uuid) {
                room.outbox.cancel();
            }
        }
    }

    /// Removes the session if `conn_id` still owns it
    pub async fn detach_session(&self, uuid: Uuid, conn_id: ConnId) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(&uuid) {
            Some(current) if current.outbox.conn_id() == conn_id => {
                sessions.remove(&uuid);
                true
            }
            _ => false,
        }
    }

    pub async fn session(&self, uuid: Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(&uuid).cloned()
    }

    pub async fn is_online(&self, uuid: Uuid) -> bool {
        self.sessions.read().await.contains_key(&uuid)
    }

    /// Queues a message on the identity's session connection, if any
    pub async fn notify<S: AsRef<str>>(&self, uuid: Uuid, name: &str, fields: &[S]) -> bool {
        match self.sessions.read().await.get(&uuid) {
            Some(session) => session.outbox.send(name, fields),
            None => false,
        }
    }

    /// Queues a message on every live session
    pub async fn notify_all<S: AsRef<str>>(&self, name: &str, fields: &[S]) {
        for session in self.sessions.read().await.values() {
            session.outbox.send(name, fields);
        }
    }

    // Room presence registry

    /// Records a room connection, cancelling a previous one for the identity
    pub async fn attach_room(&self, uuid: Uuid, map_id: u32, outbox: Outbox) {
        let mut presence = self.presence.write().await;
        let conn_id = outbox.conn_id();
        if let Some(previous) = presence.insert(uuid, RoomPresence { map_id, outbox }) {
            if previous.outbox.conn_id() != conn_id {
                info!("Room connection of {} superseded", uuid);
                previous.outbox.cancel();
            }
        }
    }

    pub async fn move_presence(&self, uuid: Uuid, conn_id: ConnId, map_id: u32) {
        let mut presence = self.presence.write().await;
        if let Some(current) = presence.get_mut(&uuid) {
            if current.outbox.conn_id() == conn_id {
                current.map_id = map_id;
            }
        }
    }

    pub async fn detach_room(&self, uuid: Uuid, conn_id: ConnId) {
        let mut presence = self.presence.write().await;
        if matches!(presence.get(&uuid), Some(p) if p.outbox.conn_id() == conn_id) {
            presence.remove(&uuid);
        }
    }

    pub async fn current_map(&self, uuid: Uuid) -> Option<u32> {
        self.presence.read().await.get(&uuid).map(|p| p.map_id)
    }

    /// Asks the identity's room to re-evaluate who sees whom
    pub async fn refresh_visibility(&self, uuid: Uuid) {
        if let Some(room) = self.current_map(uuid).await.and_then(|m| self.room(m)) {
            room.try_send(RoomMsg::Refresh { uuid });
        }
    }

    /// Pushes a changed identity into the identity's room
    pub async fn refresh_identity(&self, identity: PlayerIdentity) {
        if let Some(room) = self.current_map(identity.uuid).await.and_then(|m| self.room(m)) {
            room.try_send(RoomMsg::Identity { identity });
        }
    }

    /// Cancels every connection of an identity
    pub async fn disconnect(&self, uuid: Uuid) {
        let sessions = self.sessions.read().await;
        let presence = self.presence.read().await;
        if let Some(session) = sessions.get(&uuid) {
            session.outbox.cancel();
        }
        if let Some(room) = presence.get(&uuid) {
            room.outbox.cancel();
        }
        info!("Disconnected {}", uuid);
    }
}
