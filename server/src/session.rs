//! Session actor: identity-scoped commands
//!
//! One session runs per identity, independent of which room (if any) the
//! identity is in. It handles the profile, global and party chat, friends,
//! parties, locations, timed events, badges and moderation. Room-dependent
//! commands look up the identity's current room through the hub and fail
//! with [`CommandError::NoRoom`] when there is none.

use log::{debug, info, warn};
use shared::avatar::bool_field;
use shared::badge::{completion_percent, project, PlayerProgress};
use shared::codec::is_terminal;
use shared::{Command, MAX_CHAT_LENGTH, MAX_NAME_LENGTH};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::connection::Outbox;
use crate::error::{Args, CommandError, CommandResult};
use crate::hub::{now_unix, Hub};
use crate::store::{ChatChannel, ChatRecord, FriendState, Party, PlayerIdentity, Rank};

pub const MAX_PARTY_SIZE: usize = 8;
pub const MAX_PARTY_NAME_LENGTH: usize = 24;

#[derive(Debug)]
pub enum SessionMsg {
    Commands(Vec<Command>),
}

/// Registry entry for a live session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub outbox: Outbox,
    tx: mpsc::Sender<SessionMsg>,
}

impl SessionHandle {
    pub fn new(outbox: Outbox, tx: mpsc::Sender<SessionMsg>) -> Self {
        Self { outbox, tx }
    }

    /// Non-blocking send; `false` when the mailbox is full or closed
    pub fn try_send(&self, msg: SessionMsg) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Session mailbox of connection {} is full", self.outbox.conn_id());
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Pushes `fp uuid 0|1` to every online friend of `uuid`
pub async fn announce_presence(hub: &Hub, uuid: Uuid, online: bool) {
    let friends = match hub.store.friends(uuid) {
        Ok(friends) => friends,
        Err(e) => {
            warn!("Failed to load friends of {}: {}", uuid, e);
            return;
        }
    };
    let status = bool_field(online);
    for (friend, state) in friends {
        if state == FriendState::Accepted {
            hub.notify(friend, "fp", &[uuid.to_string(), status.clone()]).await;
        }
    }
}

fn parse_uuid(args: &Args, index: usize) -> Result<Uuid, CommandError> {
    Uuid::parse_str(args.str(index)).map_err(|_| CommandError::BadArg {
        index,
        value: args.str(index).to_string(),
    })
}

fn friend_state_field(state: FriendState) -> &'static str {
    match state {
        FriendState::Accepted => "0",
        FriendState::Outgoing => "1",
        FriendState::Incoming => "2",
    }
}

fn party_fields(party: &Party) -> Vec<String> {
    let mut fields = vec![
        party.id.to_string(),
        party.name.clone(),
        party.owner.to_string(),
    ];
    fields.extend(party.members.iter().map(Uuid::to_string));
    fields
}

pub struct SessionActor {
    hub: Arc<Hub>,
    uuid: Uuid,
    outbox: Outbox,
    rx: mpsc::Receiver<SessionMsg>,
}

impl SessionActor {
    pub fn new(hub: Arc<Hub>, uuid: Uuid, outbox: Outbox, rx: mpsc::Receiver<SessionMsg>) -> Self {
        Self {
            hub,
            uuid,
            outbox,
            rx,
        }
    }

    pub async fn run(mut self) {
        self.greet().await;

        let cancelled = self.outbox.token();
        loop {
            let msg = tokio::select! {
                biased;
                _ = cancelled.cancelled() => break,
                msg = self.rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            match msg {
                SessionMsg::Commands(commands) => {
                    for command in &commands {
                        if self.outbox.is_cancelled() {
                            break;
                        }
                        match self.dispatch(command).await {
                            Ok(()) => debug!("{} session: {}", self.uuid, command.raw()),
                            Err(e) => warn!(
                                "Dropped session command from {}: {} ({})",
                                self.uuid,
                                command.raw(),
                                e
                            ),
                        }
                        if is_terminal(&command.name) {
                            break;
                        }
                    }
                }
            }
        }
        debug!("Session actor of {} stopped", self.uuid);
    }

    async fn greet(&self) {
        if let Err(e) = self.handle_profile(&[]) {
            warn!("Failed to send profile to {}: {}", self.uuid, e);
        }
        match self.hub.store.identity(self.uuid) {
            Ok(identity) if identity.notice_pending => {
                self.outbox.send("ntc", &["mute"]);
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to load identity {}: {}", self.uuid, e),
        }
        announce_presence(&self.hub, self.uuid, true).await;
    }

    fn identity(&self) -> Result<PlayerIdentity, CommandError> {
        Ok(self.hub.store.identity(self.uuid)?)
    }

    async fn current_map(&self) -> Result<u32, CommandError> {
        self.hub
            .current_map(self.uuid)
            .await
            .ok_or(CommandError::NoRoom)
    }

    async fn dispatch(&mut self, command: &Command) -> CommandResult {
        let args = &command.args;
        match command.name.as_str() {
            "i" => self.handle_profile(args),
            "nm" => self.handle_name(args).await,
            "bc" => self.handle_breadcrumb(args),
            "gsay" => self.handle_global_say(args).await,
            "psay" => self.handle_party_say(args).await,
            "gch" => self.handle_history(args, false),
            "pch" => self.handle_history(args, true),
            "pr" => self.handle_private(args).await,
            "fl" => self.handle_friend_list(args).await,
            "fa" => self.handle_friend_add(args).await,
            "fr" => self.handle_friend_remove(args).await,
            "pt" => self.handle_party_info(args),
            "pc" => self.handle_party_create(args),
            "pj" => self.handle_party_join(args).await,
            "plv" => self.handle_party_leave(args).await,
            "loc" => self.handle_locations(args).await,
            "nh" => self.handle_next_hop(args).await,
            "evl" => self.handle_event_list(args),
            "ev" => self.handle_event_claim(args).await,
            "pb" => self.handle_badges(args),
            "sb" => self.handle_select_badge(args).await,
            "who" => self.handle_who(args).await,
            "mack" => self.handle_ack(args),
            "ban" | "unban" | "mute" | "unmute" => {
                self.handle_moderation(&command.name, args).await
            }
            _ => Err(CommandError::Unknown),
        }
    }

    // Profile

    fn handle_profile(&self, args: &[String]) -> CommandResult {
        Args::exact(args, 0)?;
        let identity = self.identity()?;
        let exp = self.hub.store.exp(self.uuid)?;
        self.outbox.send(
            "i",
            &[
                identity.uuid.to_string(),
                identity.display_name().to_string(),
                identity.rank.as_u8().to_string(),
                bool_field(identity.account.is_some()),
                identity.badge.clone().unwrap_or_default(),
                exp.to_string(),
            ],
        );
        Ok(())
    }

    async fn handle_name(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let name = args.text(0, MAX_NAME_LENGTH)?;
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CommandError::BadArg {
                index: 0,
                value: name.to_string(),
            });
        }
        if !self.hub.store.set_display_name(self.uuid, name)? {
            return Err(CommandError::Already("named or taken"));
        }

        info!("{} is now known as {}", self.uuid, name);
        self.outbox.send("nm", &[name]);
        self.hub.refresh_identity(self.identity()?).await;
        Ok(())
    }

    fn handle_breadcrumb(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let map_id = args.int::<u32>(0, 0, u32::MAX)?;
        if self.hub.game.map(map_id).is_none() {
            return Err(CommandError::Dangling("map"));
        }
        self.hub.store.record_visit(self.uuid, map_id)?;
        Ok(())
    }

    // Chat

    /// Validates chat text for a named, unmuted sender and masks it
    fn chat_text(&self, args: &Args) -> Result<(PlayerIdentity, String), CommandError> {
        let text = args.text(0, MAX_CHAT_LENGTH)?;
        let identity = self.identity()?;
        if identity.muted {
            return Err(CommandError::Muted);
        }
        if identity.name.is_none() {
            return Err(CommandError::Forbidden);
        }
        Ok((identity, self.hub.profanity.mask(text)))
    }

    async fn handle_global_say(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let (identity, text) = self.chat_text(&args)?;
        let map_id = self.hub.current_map(self.uuid).await;

        let record = ChatRecord {
            channel: ChatChannel::Global,
            uuid: self.uuid,
            name: identity.display_name().to_string(),
            map_id,
            text,
            sent_unix: now_unix(),
        };
        self.hub.store.append_chat(record.clone())?;
        self.hub.relay.relay(&record);

        self.hub
            .notify_all(
                "gsay",
                &[
                    record.uuid.to_string(),
                    record.name,
                    map_id.map(|m| m.to_string()).unwrap_or_default(),
                    record.text,
                ],
            )
            .await;
        Ok(())
    }

    async fn handle_party_say(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let party = self
            .hub
            .parties
            .party_of(self.uuid)
            .ok_or(CommandError::Dangling("party"))?;
        let (identity, text) = self.chat_text(&args)?;

        let record = ChatRecord {
            channel: ChatChannel::Party(party.id),
            uuid: self.uuid,
            name: identity.display_name().to_string(),
            map_id: self.hub.current_map(self.uuid).await,
            text,
            sent_unix: now_unix(),
        };
        self.hub.store.append_chat(record.clone())?;

        let fields = [record.uuid.to_string(), record.name, record.text];
        for member in &party.members {
            self.hub.notify(*member, "psay", &fields).await;
        }
        Ok(())
    }

    fn handle_history(&self, args: &[String], party: bool) -> CommandResult {
        Args::exact(args, 0)?;
        let (channel, name) = if party {
            let party = self
                .hub
                .parties
                .party_of(self.uuid)
                .ok_or(CommandError::Dangling("party"))?;
            (ChatChannel::Party(party.id), "pch")
        } else {
            (ChatChannel::Global, "gch")
        };

        let history = self
            .hub
            .store
            .chat_history(channel, self.hub.settings.chat_history_limit)?;
        for record in history {
            self.outbox.send(
                name,
                &[
                    record.uuid.to_string(),
                    record.name,
                    record.map_id.map(|m| m.to_string()).unwrap_or_default(),
                    record.text,
                ],
            );
        }
        Ok(())
    }

    async fn handle_private(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let private = args.flag(0)?;
        self.hub.set_private(self.uuid, private);
        self.hub.refresh_visibility(self.uuid).await;
        self.outbox.send("pr", &[bool_field(private)]);
        Ok(())
    }

    // Friends

    async fn handle_friend_list(&self, args: &[String]) -> CommandResult {
        Args::exact(args, 0)?;
        for (friend, state) in self.hub.store.friends(self.uuid)? {
            let name = self
                .hub
                .store
                .identity(friend)
                .map(|i| i.display_name().to_string())
                .unwrap_or_default();
            let online = state == FriendState::Accepted && self.hub.is_online(friend).await;
            self.outbox.send(
                "fl",
                &[
                    friend.to_string(),
                    name,
                    friend_state_field(state).to_string(),
                    bool_field(online),
                ],
            );
        }
        Ok(())
    }

    async fn handle_friend_add(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let target = parse_uuid(&args, 0)?;
        let state = self.hub.store.add_friend(self.uuid, target)?;

        match state {
            FriendState::Accepted => {
                if self.hub.is_online(target).await {
                    self.outbox.send("fp", &[target.to_string(), bool_field(true)]);
                }
                self.hub
                    .notify(target, "fp", &[self.uuid.to_string(), bool_field(true)])
                    .await;
                self.hub.refresh_visibility(self.uuid).await;
                self.hub.refresh_visibility(target).await;
            }
            _ => {
                let name = self.identity()?.display_name().to_string();
                self.hub
                    .notify(target, "fq", &[self.uuid.to_string(), name])
                    .await;
            }
        }

        self.outbox
            .send("fa", &[target.to_string(), friend_state_field(state).to_string()]);
        Ok(())
    }

    async fn handle_friend_remove(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let target = parse_uuid(&args, 0)?;
        if !self.hub.store.remove_friend(self.uuid, target)? {
            return Err(CommandError::Dangling("friend"));
        }

        self.hub.notify(target, "fr", &[self.uuid.to_string()]).await;
        self.hub.refresh_visibility(self.uuid).await;
        self.hub.refresh_visibility(target).await;
        self.outbox.send("fr", &[target.to_string()]);
        Ok(())
    }

    // Parties

    fn handle_party_info(&self, args: &[String]) -> CommandResult {
        Args::exact(args, 0)?;
        let party = self
            .hub
            .parties
            .party_of(self.uuid)
            .ok_or(CommandError::Dangling("party"))?;
        self.outbox.send("pt", &party_fields(&party));
        Ok(())
    }

    fn handle_party_create(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let name = args.text(0, MAX_PARTY_NAME_LENGTH)?;
        let party = self.hub.store.create_party(self.uuid, name)?;
        self.hub.parties.upsert(&party);

        info!("{} created party {} ({})", self.uuid, party.id, party.name);
        self.outbox.send("pt", &party_fields(&party));
        Ok(())
    }

    async fn handle_party_join(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let party_id = args.int::<u32>(0, 1, u32::MAX)?;
        let party = self
            .hub
            .store
            .join_party(self.uuid, party_id, MAX_PARTY_SIZE)?;
        self.hub.parties.upsert(&party);

        let name = self.identity()?.display_name().to_string();
        for member in party.members.iter().filter(|m| **m != self.uuid) {
            self.hub
                .notify(*member, "pj", &[self.uuid.to_string(), name.clone()])
                .await;
        }
        self.hub.refresh_visibility(self.uuid).await;
        self.outbox.send("pt", &party_fields(&party));
        Ok(())
    }

    async fn handle_party_leave(&self, args: &[String]) -> CommandResult {
        Args::exact(args, 0)?;
        let party_id = self
            .hub
            .parties
            .party_of(self.uuid)
            .map(|p| p.id)
            .ok_or(CommandError::Dangling("party"))?;

        match self.hub.store.leave_party(self.uuid)? {
            Some(remaining) => {
                self.hub.parties.upsert(&remaining);
                for member in &remaining.members {
                    self.hub
                        .notify(*member, "plv", &[self.uuid.to_string()])
                        .await;
                }
            }
            None => self.hub.parties.disband(party_id),
        }
        self.hub.parties.forget_member(self.uuid);

        self.hub.refresh_visibility(self.uuid).await;
        self.outbox.send("plv", &[party_id.to_string()]);
        Ok(())
    }

    // World

    async fn handle_locations(&self, args: &[String]) -> CommandResult {
        Args::exact(args, 0)?;
        let map_id = self.current_map().await?;
        let names: Vec<&str> = self
            .hub
            .game
            .locations_for(map_id)
            .into_iter()
            .map(|l| l.name.as_str())
            .collect();
        self.outbox.send("loc", &names);
        Ok(())
    }

    async fn handle_next_hop(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let target = args.int::<u32>(0, 0, u32::MAX)?;
        let map_id = self.current_map().await?;
        let hop = self
            .hub
            .game
            .next_hop(map_id, target)
            .ok_or(CommandError::Dangling("route"))?;
        self.outbox.send("nh", &[target.to_string(), hop.to_string()]);
        Ok(())
    }

    fn handle_event_list(&self, args: &[String]) -> CommandResult {
        Args::exact(args, 0)?;
        let now = now_unix();
        for event in self.hub.game.events.iter().filter(|e| e.is_open(now)) {
            self.outbox.send(
                "evl",
                &[
                    event.id.clone(),
                    event.exp.to_string(),
                    event.end_unix.to_string(),
                ],
            );
        }
        Ok(())
    }

    async fn handle_event_claim(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let event = self
            .hub
            .game
            .event(args.str(0))
            .ok_or(CommandError::Dangling("event"))?;
        if !event.is_open(now_unix()) {
            return Err(CommandError::Dangling("open event"));
        }
        let map_id = self.current_map().await?;
        if !event.map_ids.contains(&map_id) {
            return Err(CommandError::NoRoom);
        }
        if !self.hub.store.claim_event(self.uuid, &event.id)? {
            return Err(CommandError::Already("claimed"));
        }

        let total = self.hub.store.add_exp(self.uuid, event.exp)?;
        info!("{} claimed event {} (+{} exp)", self.uuid, event.id, event.exp);
        self.outbox.send(
            "ev",
            &[event.id.clone(), event.exp.to_string(), total.to_string()],
        );
        Ok(())
    }

    // Badges

    fn handle_badges(&self, args: &[String]) -> CommandResult {
        Args::exact(args, 0)?;
        let store = &self.hub.store;
        let progress = PlayerProgress {
            tags: store.tags(self.uuid)?,
            exp: store.exp(self.uuid)?,
            completion_percent: completion_percent(
                store.visited_maps(self.uuid)?.len(),
                self.hub.game.maps.len(),
            ),
            time_trials: store.time_trials(self.uuid)?,
        };
        let recorded = store.badge_unlocks(self.uuid)?;

        for badge in project(&self.hub.game.badges, &progress, &recorded) {
            if badge.new_unlock {
                store.record_badge_unlock(self.uuid, &badge.id)?;
                info!("{} unlocked badge {}", self.uuid, badge.id);
            }
            self.outbox.send(
                "pb",
                &[
                    badge.id,
                    bool_field(badge.unlocked),
                    bool_field(badge.new_unlock),
                    badge.progress.to_string(),
                    badge.goal.to_string(),
                ],
            );
        }
        Ok(())
    }

    async fn handle_select_badge(&self, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let badge_id = args.str(0);
        let selection = if badge_id == "none" {
            None
        } else {
            if !self.hub.store.badge_unlocks(self.uuid)?.contains(badge_id) {
                return Err(CommandError::Dangling("unlocked badge"));
            }
            Some(badge_id)
        };

        self.hub.store.set_badge(self.uuid, selection)?;
        self.hub.refresh_identity(self.identity()?).await;
        self.outbox.send("sb", &[badge_id]);
        Ok(())
    }

    async fn handle_who(&self, args: &[String]) -> CommandResult {
        Args::exact(args, 0)?;
        let map_id = self.current_map().await?;
        let room = self.hub.room(map_id).ok_or(CommandError::NoRoom)?;
        let occupants = room.occupants().await.ok_or(CommandError::NoRoom)?;

        for occupant in occupants {
            let other = occupant.identity.uuid;
            if other == self.uuid || !self.hub.visible(self.uuid, other) {
                continue;
            }
            self.outbox.send(
                "who",
                &[
                    occupant.avatar_id.to_string(),
                    other.to_string(),
                    occupant.identity.display_name().to_string(),
                ],
            );
        }
        Ok(())
    }

    // Moderation

    fn handle_ack(&self, args: &[String]) -> CommandResult {
        Args::exact(args, 0)?;
        let cleared = self.hub.store.ack_notice(self.uuid)?;
        self.outbox.send("mack", &[bool_field(cleared)]);
        Ok(())
    }

    async fn handle_moderation(&self, action: &str, args: &[String]) -> CommandResult {
        let args = Args::exact(args, 1)?;
        let target = parse_uuid(&args, 0)?;
        let actor = self.identity()?;
        let subject = self.hub.store.identity(target)?;
        if actor.rank < Rank::Moderator || actor.rank <= subject.rank {
            return Err(CommandError::Forbidden);
        }

        match action {
            "ban" => {
                self.hub.store.set_banned(target, true)?;
                self.hub.disconnect(target).await;
            }
            "unban" => self.hub.store.set_banned(target, false)?,
            "mute" => {
                self.hub.store.set_muted(target, true)?;
                self.hub.notify(target, "ntc", &["mute"]).await;
            }
            "unmute" => self.hub.store.set_muted(target, false)?,
            _ => return Err(CommandError::Unknown),
        }

        info!("{} applied {} to {}", self.uuid, action, target);
        self.outbox.send(action, &[target.to_string()]);
        Ok(())
    }
}
