//! Persistence collaborator
//!
//! [`Store`] is the atomic key-based store the actors talk to. Every call is
//! synchronous, atomic on its own and expected to return quickly; actors call
//! it inline from their serialized task. [`MemoryStore`] keeps everything in
//! process, one `RwLock` per structure. When a call needs two locks it takes
//! them in declaration order (addresses before identities).

use log::info;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::IpAddr;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use uuid::Uuid;

/// Length of account login tokens
pub const TOKEN_LENGTH: usize = 32;
/// Messages kept per chat channel
const CHAT_RETENTION: usize = 500;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unknown identity {0}")]
    UnknownIdentity(Uuid),
    #[error("no such {0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Rank {
    Player = 0,
    Moderator = 1,
    Admin = 2,
}

impl Rank {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub uuid: Uuid,
    pub account: Option<String>,
    pub name: Option<String>,
    pub rank: Rank,
    pub badge: Option<String>,
    pub banned: bool,
    pub muted: bool,
    /// A moderation notice waits for acknowledgement
    pub notice_pending: bool,
}

impl PlayerIdentity {
    fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            account: None,
            name: None,
            rank: Rank::Player,
            badge: None,
            banned: false,
            muted: false,
            notice_pending: false,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// Friendship as seen from one side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendState {
    Accepted,
    /// We asked, they have not
    Outgoing,
    /// They asked, we have not
    Incoming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Party {
    pub id: u32,
    pub name: String,
    pub owner: Uuid,
    pub members: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatChannel {
    Global,
    Party(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRecord {
    pub channel: ChatChannel,
    pub uuid: Uuid,
    pub name: String,
    pub map_id: Option<u32>,
    pub text: String,
    pub sent_unix: u64,
}

pub trait Store: Send + Sync {
    // Identity
    fn identity_for_address(&self, addr: IpAddr) -> StoreResult<PlayerIdentity>;
    fn identity_for_token(&self, token: &str) -> StoreResult<Option<PlayerIdentity>>;
    fn identity(&self, uuid: Uuid) -> StoreResult<PlayerIdentity>;
    /// Links an account name and returns its login token
    fn link_account(&self, uuid: Uuid, account: &str) -> StoreResult<String>;
    /// `false` when a name is already set or the name is taken
    fn set_display_name(&self, uuid: Uuid, name: &str) -> StoreResult<bool>;
    fn set_rank(&self, uuid: Uuid, rank: Rank) -> StoreResult<()>;
    fn set_badge(&self, uuid: Uuid, badge: Option<&str>) -> StoreResult<()>;

    // Moderation
    fn set_banned(&self, uuid: Uuid, banned: bool) -> StoreResult<()>;
    /// Muting also queues a notice
    fn set_muted(&self, uuid: Uuid, muted: bool) -> StoreResult<()>;
    /// `true` if a pending notice was cleared
    fn ack_notice(&self, uuid: Uuid) -> StoreResult<bool>;

    // Progress
    /// `true` only on the first write of this tag
    fn write_tag(&self, uuid: Uuid, tag: &str) -> StoreResult<bool>;
    fn tags(&self, uuid: Uuid) -> StoreResult<HashSet<String>>;
    /// Stores `seconds` if strictly better (lower) than the best so far
    fn record_time_trial(&self, uuid: Uuid, condition_id: &str, seconds: i32) -> StoreResult<bool>;
    fn time_trials(&self, uuid: Uuid) -> StoreResult<HashMap<String, i32>>;
    /// Stores `score` if strictly higher than the best so far
    fn record_minigame_score(&self, uuid: Uuid, minigame_id: &str, score: i32) -> StoreResult<bool>;
    fn minigame_best(&self, uuid: Uuid, minigame_id: &str) -> StoreResult<Option<i32>>;
    fn badge_unlocks(&self, uuid: Uuid) -> StoreResult<HashSet<String>>;
    fn record_badge_unlock(&self, uuid: Uuid, badge_id: &str) -> StoreResult<bool>;
    fn add_exp(&self, uuid: Uuid, exp: u32) -> StoreResult<u32>;
    fn exp(&self, uuid: Uuid) -> StoreResult<u32>;
    /// `true` on the first claim
    fn claim_event(&self, uuid: Uuid, event_id: &str) -> StoreResult<bool>;
    fn record_visit(&self, uuid: Uuid, map_id: u32) -> StoreResult<bool>;
    fn visited_maps(&self, uuid: Uuid) -> StoreResult<HashSet<u32>>;

    // Friends
    fn add_friend(&self, from: Uuid, to: Uuid) -> StoreResult<FriendState>;
    fn remove_friend(&self, a: Uuid, b: Uuid) -> StoreResult<bool>;
    fn friends(&self, uuid: Uuid) -> StoreResult<Vec<(Uuid, FriendState)>>;
    fn are_friends(&self, a: Uuid, b: Uuid) -> StoreResult<bool>;

    // Parties
    fn create_party(&self, owner: Uuid, name: &str) -> StoreResult<Party>;
    fn join_party(&self, uuid: Uuid, party_id: u32, max_members: usize) -> StoreResult<Party>;
    /// Returns the party as it remains, `None` once disbanded
    fn leave_party(&self, uuid: Uuid) -> StoreResult<Option<Party>>;
    fn parties(&self) -> StoreResult<Vec<Party>>;

    // Chat
    fn append_chat(&self, record: ChatRecord) -> StoreResult<()>;
    fn chat_history(&self, channel: ChatChannel, limit: usize) -> StoreResult<Vec<ChatRecord>>;
}

#[derive(Debug, Default)]
struct Progress {
    tags: HashSet<String>,
    time_trials: HashMap<String, i32>,
    minigames: HashMap<String, i32>,
    badges: HashSet<String>,
    exp: u32,
    claims: HashSet<String>,
    visited: HashSet<u32>,
}

#[derive(Debug, Default)]
struct Parties {
    next_id: u32,
    by_id: HashMap<u32, Party>,
}

impl Parties {
    fn party_of(&self, uuid: Uuid) -> Option<u32> {
        self.by_id
            .values()
            .find(|p| p.members.contains(&uuid))
            .map(|p| p.id)
    }
}

/// In-process [`Store`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    addresses: RwLock<HashMap<IpAddr, Uuid>>,
    identities: RwLock<HashMap<Uuid, PlayerIdentity>>,
    tokens: RwLock<HashMap<String, Uuid>>,
    progress: RwLock<HashMap<Uuid, Progress>>,
    /// Directed friend requests; a pair in both directions is a friendship
    friend_requests: RwLock<HashSet<(Uuid, Uuid)>>,
    parties: RwLock<Parties>,
    chat: RwLock<HashMap<ChatChannel, VecDeque<ChatRecord>>>,
}

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StoreError::Poisoned)
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StoreError::Poisoned)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an identity not bound to any address, e.g. for account seeding
    pub fn create_identity(&self) -> StoreResult<PlayerIdentity> {
        let identity = PlayerIdentity::new(Uuid::new_v4());
        write(&self.identities)?.insert(identity.uuid, identity.clone());
        Ok(identity)
    }

    fn update_identity<R>(
        &self,
        uuid: Uuid,
        f: impl FnOnce(&mut PlayerIdentity) -> R,
    ) -> StoreResult<R> {
        let mut identities = write(&self.identities)?;
        let identity = identities
            .get_mut(&uuid)
            .ok_or(StoreError::UnknownIdentity(uuid))?;
        Ok(f(identity))
    }

    fn with_progress<R>(&self, uuid: Uuid, f: impl FnOnce(&mut Progress) -> R) -> StoreResult<R> {
        let mut progress = write(&self.progress)?;
        Ok(f(progress.entry(uuid).or_default()))
    }

    fn read_progress<R>(&self, uuid: Uuid, f: impl FnOnce(&Progress) -> R) -> StoreResult<R> {
        let progress = read(&self.progress)?;
        match progress.get(&uuid) {
            Some(p) => Ok(f(p)),
            None => Ok(f(&Progress::default())),
        }
    }
}

impl Store for MemoryStore {
    fn identity_for_address(&self, addr: IpAddr) -> StoreResult<PlayerIdentity> {
        let mut addresses = write(&self.addresses)?;
        let mut identities = write(&self.identities)?;

        if let Some(identity) = addresses.get(&addr).and_then(|uuid| identities.get(uuid)) {
            return Ok(identity.clone());
        }

        let identity = PlayerIdentity::new(Uuid::new_v4());
        info!("Created identity {} for {}", identity.uuid, addr);
        addresses.insert(addr, identity.uuid);
        identities.insert(identity.uuid, identity.clone());
        Ok(identity)
    }

    fn identity_for_token(&self, token: &str) -> StoreResult<Option<PlayerIdentity>> {
        let uuid = match read(&self.tokens)?.get(token) {
            Some(uuid) => *uuid,
            None => return Ok(None),
        };
        Ok(read(&self.identities)?.get(&uuid).cloned())
    }

    fn identity(&self, uuid: Uuid) -> StoreResult<PlayerIdentity> {
        read(&self.identities)?
            .get(&uuid)
            .cloned()
            .ok_or(StoreError::UnknownIdentity(uuid))
    }

    fn link_account(&self, uuid: Uuid, account: &str) -> StoreResult<String> {
        self.update_identity(uuid, |identity| {
            identity.account = Some(account.to_string());
        })?;

        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        write(&self.tokens)?.insert(token.clone(), uuid);
        Ok(token)
    }

    fn set_display_name(&self, uuid: Uuid, name: &str) -> StoreResult<bool> {
        let mut identities = write(&self.identities)?;
        let taken = identities.values().any(|other| {
            other.uuid != uuid
                && other
                    .name
                    .as_deref()
                    .map_or(false, |n| n.eq_ignore_ascii_case(name))
        });
        let identity = identities
            .get_mut(&uuid)
            .ok_or(StoreError::UnknownIdentity(uuid))?;
        if taken || identity.name.is_some() {
            return Ok(false);
        }
        identity.name = Some(name.to_string());
        Ok(true)
    }

    fn set_rank(&self, uuid: Uuid, rank: Rank) -> StoreResult<()> {
        self.update_identity(uuid, |identity| identity.rank = rank)
    }

    fn set_badge(&self, uuid: Uuid, badge: Option<&str>) -> StoreResult<()> {
        self.update_identity(uuid, |identity| identity.badge = badge.map(str::to_string))
    }

    fn set_banned(&self, uuid: Uuid, banned: bool) -> StoreResult<()> {
        self.update_identity(uuid, |identity| identity.banned = banned)
    }

    fn set_muted(&self, uuid: Uuid, muted: bool) -> StoreResult<()> {
        self.update_identity(uuid, |identity| {
            identity.muted = muted;
            if muted {
                identity.notice_pending = true;
            }
        })
    }

    fn ack_notice(&self, uuid: Uuid) -> StoreResult<bool> {
        self.update_identity(uuid, |identity| {
            std::mem::replace(&mut identity.notice_pending, false)
        })
    }

    fn write_tag(&self, uuid: Uuid, tag: &str) -> StoreResult<bool> {
        self.with_progress(uuid, |p| p.tags.insert(tag.to_string()))
    }

    fn tags(&self, uuid: Uuid) -> StoreResult<HashSet<String>> {
        self.read_progress(uuid, |p| p.tags.clone())
    }

    fn record_time_trial(&self, uuid: Uuid, condition_id: &str, seconds: i32) -> StoreResult<bool> {
        self.with_progress(uuid, |p| match p.time_trials.get(condition_id) {
            Some(best) if *best <= seconds => false,
            _ => {
                p.time_trials.insert(condition_id.to_string(), seconds);
                true
            }
        })
    }

    fn time_trials(&self, uuid: Uuid) -> StoreResult<HashMap<String, i32>> {
        self.read_progress(uuid, |p| p.time_trials.clone())
    }

    fn record_minigame_score(&self, uuid: Uuid, minigame_id: &str, score: i32) -> StoreResult<bool> {
        self.with_progress(uuid, |p| {
            let best = p.minigames.get(minigame_id).copied();
            if shared::minigame::improves(score, best) {
                p.minigames.insert(minigame_id.to_string(), score);
                true
            } else {
                false
            }
        })
    }

    fn minigame_best(&self, uuid: Uuid, minigame_id: &str) -> StoreResult<Option<i32>> {
        self.read_progress(uuid, |p| p.minigames.get(minigame_id).copied())
    }

    fn badge_unlocks(&self, uuid: Uuid) -> StoreResult<HashSet<String>> {
        self.read_progress(uuid, |p| p.badges.clone())
    }

    fn record_badge_unlock(&self, uuid: Uuid, badge_id: &str) -> StoreResult<bool> {
        self.with_progress(uuid, |p| p.badges.insert(badge_id.to_string()))
    }

    fn add_exp(&self, uuid: Uuid, exp: u32) -> StoreResult<u32> {
        self.with_progress(uuid, |p| {
            p.exp = p.exp.saturating_add(exp);
            p.exp
        })
    }

    fn exp(&self, uuid: Uuid) -> StoreResult<u32> {
        self.read_progress(uuid, |p| p.exp)
    }

    fn claim_event(&self, uuid: Uuid, event_id: &str) -> StoreResult<bool> {
        self.with_progress(uuid, |p| p.claims.insert(event_id.to_string()))
    }

    fn record_visit(&self, uuid: Uuid, map_id: u32) -> StoreResult<bool> {
        self.with_progress(uuid, |p| p.visited.insert(map_id))
    }

    fn visited_maps(&self, uuid: Uuid) -> StoreResult<HashSet<u32>> {
        self.read_progress(uuid, |p| p.visited.clone())
    }

    fn add_friend(&self, from: Uuid, to: Uuid) -> StoreResult<FriendState> {
        if from == to {
            return Err(StoreError::Conflict("cannot befriend yourself"));
        }
        if !read(&self.identities)?.contains_key(&to) {
            return Err(StoreError::UnknownIdentity(to));
        }
        let mut requests = write(&self.friend_requests)?;
        requests.insert((from, to));
        if requests.contains(&(to, from)) {
            Ok(FriendState::Accepted)
        } else {
            Ok(FriendState::Outgoing)
        }
    }

    fn remove_friend(&self, a: Uuid, b: Uuid) -> StoreResult<bool> {
        let mut requests = write(&self.friend_requests)?;
        let removed_ab = requests.remove(&(a, b));
        let removed_ba = requests.remove(&(b, a));
        Ok(removed_ab || removed_ba)
    }

    fn friends(&self, uuid: Uuid) -> StoreResult<Vec<(Uuid, FriendState)>> {
        let requests = read(&self.friend_requests)?;
        let mut states: HashMap<Uuid, FriendState> = HashMap::new();
        for &(from, to) in requests.iter() {
            if from == uuid {
                let state = if requests.contains(&(to, from)) {
                    FriendState::Accepted
                } else {
                    FriendState::Outgoing
                };
                states.insert(to, state);
            } else if to == uuid && !requests.contains(&(to, from)) {
                states.insert(from, FriendState::Incoming);
            }
        }
        let mut friends: Vec<(Uuid, FriendState)> = states.into_iter().collect();
        friends.sort_by_key(|(uuid, _)| *uuid);
        Ok(friends)
    }

    fn are_friends(&self, a: Uuid, b: Uuid) -> StoreResult<bool> {
        let requests = read(&self.friend_requests)?;
        Ok(requests.contains(&(a, b)) && requests.contains(&(b, a)))
    }

    fn create_party(&self, owner: Uuid, name: &str) -> StoreResult<Party> {
        let mut parties = write(&self.parties)?;
        if parties.party_of(owner).is_some() {
            return Err(StoreError::Conflict("already in a party"));
        }
        parties.next_id += 1;
        let party = Party {
            id: parties.next_id,
            name: name.to_string(),
            owner,
            members: vec![owner],
        };
        parties.by_id.insert(party.id, party.clone());
        Ok(party)
    }

    fn join_party(&self, uuid: Uuid, party_id: u32, max_members: usize) -> StoreResult<Party> {
        let mut parties = write(&self.parties)?;
        if parties.party_of(uuid).is_some() {
            return Err(StoreError::Conflict("already in a party"));
        }
        let party = parties
            .by_id
            .get_mut(&party_id)
            .ok_or(StoreError::NotFound("party"))?;
        if party.members.len() >= max_members {
            return Err(StoreError::Conflict("party is full"));
        }
        party.members.push(uuid);
        Ok(party.clone())
    }

    fn leave_party(&self, uuid: Uuid) -> StoreResult<Option<Party>> {
        let mut parties = write(&self.parties)?;
        let party_id = parties.party_of(uuid).ok_or(StoreError::NotFound("party"))?;

        let disband = match parties.by_id.get_mut(&party_id) {
            Some(party) => {
                party.members.retain(|m| *m != uuid);
                if party.owner == uuid {
                    if let Some(next) = party.members.first() {
                        party.owner = *next;
                    }
                }
                party.members.is_empty()
            }
            None => return Err(StoreError::NotFound("party")),
        };

        if disband {
            parties.by_id.remove(&party_id);
            return Ok(None);
        }
        Ok(parties.by_id.get(&party_id).cloned())
    }

    fn parties(&self) -> StoreResult<Vec<Party>> {
        Ok(read(&self.parties)?.by_id.values().cloned().collect())
    }

    fn append_chat(&self, record: ChatRecord) -> StoreResult<()> {
        let mut chat = write(&self.chat)?;
        let log = chat.entry(record.channel).or_default();
        log.push_back(record);
        while log.len() > CHAT_RETENTION {
            log.pop_front();
        }
        Ok(())
    }

    fn chat_history(&self, channel: ChatChannel, limit: usize) -> StoreResult<Vec<ChatRecord>> {
        let chat = read(&self.chat)?;
        Ok(chat
            .get(&channel)
            .map(|log| {
                let skip = log.len().saturating_sub(limit);
                log.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }
}
