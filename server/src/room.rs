//! Room actor: one serialized task per map
//!
//! A room owns the [`RoomClient`]s of everyone currently on its map. All
//! mutation of those clients and every broadcast about them happens inside
//! [`RoomActor::run`], so observers see events in exactly the order the room
//! processed the commands behind them.
//!
//! Broadcasts honour the visibility rule at send time. Each client tracks
//! which co-occupants it currently knows about; when visibility flips, the
//! room sends the missing snapshot or a disconnect event before anything
//! else about that avatar.

use log::{debug, info, warn};
use shared::avatar::AvatarState;
use shared::codec::is_terminal;
use shared::condition::{initial_probes, Condition, Outcome};
use shared::minigame::Minigame;
use shared::Command;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::MapConfig;
use crate::connection::ConnId;
use crate::hub::Hub;
use crate::room_client::RoomClient;
use crate::store::PlayerIdentity;

#[derive(Debug)]
pub enum RoomMsg {
    Join {
        client: RoomClient,
    },
    Leave {
        uuid: Uuid,
        conn_id: ConnId,
    },
    Commands {
        uuid: Uuid,
        conn_id: ConnId,
        commands: Vec<Command>,
    },
    /// Re-evaluate visibility between one occupant and everyone else
    Refresh {
        uuid: Uuid,
    },
    /// Replace an occupant's identity snapshot
    Identity {
        identity: PlayerIdentity,
    },
    Occupants {
        reply: oneshot::Sender<Vec<OccupantInfo>>,
    },
}

/// Read-only copy of one occupant
#[derive(Debug, Clone)]
pub struct OccupantInfo {
    pub avatar_id: u16,
    pub identity: PlayerIdentity,
    pub avatar: AvatarState,
}

/// Mailbox of a room actor
#[derive(Debug, Clone)]
pub struct RoomHandle {
    map_id: u32,
    tx: mpsc::Sender<RoomMsg>,
}

impl RoomHandle {
    pub fn new(map_id: u32, tx: mpsc::Sender<RoomMsg>) -> Self {
        Self { map_id, tx }
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    /// Non-blocking send; `false` when the mailbox is full or closed
    pub fn try_send(&self, msg: RoomMsg) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Mailbox of room {} is full", self.map_id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Waits for mailbox space; used on the leave path which must not be lost
    pub async fn send(&self, msg: RoomMsg) -> bool {
        self.tx.send(msg).await.is_ok()
    }

    pub async fn occupants(&self) -> Option<Vec<OccupantInfo>> {
        let (reply, rx) = oneshot::channel();
        if !self.send(RoomMsg::Occupants { reply }).await {
            return None;
        }
        rx.await.ok()
    }
}

pub struct RoomActor {
    pub(crate) map_id: u32,
    pub(crate) singleplayer: bool,
    pub(crate) hub: Arc<Hub>,
    pub(crate) conditions: Vec<Condition>,
    pub(crate) minigames: Vec<Minigame>,
    pub(crate) occupants: HashMap<Uuid, RoomClient>,
    avatar_ids: BTreeSet<u16>,
    capacity: usize,
    rx: mpsc::Receiver<RoomMsg>,
}

impl RoomActor {
    pub fn new(map: &MapConfig, hub: Arc<Hub>, rx: mpsc::Receiver<RoomMsg>) -> Self {
        let conditions = hub.game.conditions_for(map.id);
        let minigames = hub.game.minigames_for(map.id);
        let capacity = hub.settings.room_capacity;
        Self {
            map_id: map.id,
            singleplayer: map.singleplayer,
            hub,
            conditions,
            minigames,
            occupants: HashMap::new(),
            avatar_ids: BTreeSet::new(),
            capacity,
            rx,
        }
    }

    pub async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            self.handle(msg);
        }
        debug!("Room {} stopped", self.map_id);
    }

    fn handle(&mut self, msg: RoomMsg) {
        match msg {
            RoomMsg::Join { client } => self.join(client),
            RoomMsg::Leave { uuid, conn_id } => self.leave(uuid, conn_id),
            RoomMsg::Commands {
                uuid,
                conn_id,
                commands,
            } => self.process(uuid, conn_id, commands),
            RoomMsg::Refresh { uuid } => self.refresh(uuid),
            RoomMsg::Identity { identity } => self.update_identity(identity),
            RoomMsg::Occupants { reply } => {
                let _ = reply.send(self.occupant_infos());
            }
        }
    }

    /// Smallest id not currently held
    fn allocate_avatar_id(&mut self) -> Option<u16> {
        let id = (1..=u16::MAX).find(|id| !self.avatar_ids.contains(id))?;
        self.avatar_ids.insert(id);
        Some(id)
    }

    fn join(&mut self, mut client: RoomClient) {
        let uuid = client.uuid();

        // A second connection for the same identity replaces the first
        if let Some(previous) = self.remove_occupant(uuid) {
            info!("Replaced stale occupant {} in room {}", uuid, self.map_id);
            previous.outbox.cancel();
        }

        if self.occupants.len() >= self.capacity {
            warn!("Room {} is full, refusing {}", self.map_id, uuid);
            client.outbox.cancel();
            return;
        }
        let Some(avatar_id) = self.allocate_avatar_id() else {
            client.outbox.cancel();
            return;
        };
        client.avatar_id = avatar_id;

        client.send(
            "s",
            &[
                avatar_id.to_string(),
                uuid.to_string(),
                client.identity.rank.as_u8().to_string(),
            ],
        );

        // Visible co-occupants and the newcomer exchange snapshots
        if !self.singleplayer {
            let hub = &self.hub;
            for other in self.occupants.values_mut() {
                Self::reconcile_pair(hub, &mut client, other);
            }
        }

        for probe in initial_probes(&self.conditions) {
            if let Outcome::Probe { kind, id, priority } = probe {
                client.send(kind.command(), &[id.to_string(), (priority as u8).to_string()]);
            }
        }

        info!(
            "{} joined room {} as avatar {} ({} occupants)",
            uuid,
            self.map_id,
            avatar_id,
            self.occupants.len() + 1
        );
        self.occupants.insert(uuid, client);
    }

    fn leave(&mut self, uuid: Uuid, conn_id: ConnId) {
        match self.occupants.get(&uuid) {
            Some(client) if client.conn_id() == conn_id => {}
            _ => {
                debug!("Ignoring stale leave of {} from room {}", uuid, self.map_id);
                return;
            }
        }
        if self.remove_occupant(uuid).is_some() {
            info!("{} left room {}", uuid, self.map_id);
        }
    }

    /// Removes an occupant, frees its avatar id and tells whoever knew it
    fn remove_occupant(&mut self, uuid: Uuid) -> Option<RoomClient> {
        let client = self.occupants.remove(&uuid)?;
        self.avatar_ids.remove(&client.avatar_id);
        let disconnect = client.event("d", &[] as &[&str]);
        for other in self.occupants.values_mut() {
            if other.known.remove(&uuid) {
                other.outbox.push(disconnect.clone());
            }
        }
        Some(client)
    }

    fn process(&mut self, uuid: Uuid, conn_id: ConnId, commands: Vec<Command>) {
        // Taken out of the map so handlers can broadcast to everyone else
        let mut client = match self.occupants.remove(&uuid) {
            Some(client) if client.conn_id() == conn_id => client,
            Some(client) => {
                self.occupants.insert(uuid, client);
                return;
            }
            None => return,
        };

        for command in &commands {
            match self.dispatch(&mut client, command) {
                Ok(()) => debug!("{} in room {}: {}", uuid, self.map_id, command.raw()),
                Err(e) => warn!(
                    "Dropped command from {} in room {}: {} ({})",
                    uuid,
                    self.map_id,
                    command.raw(),
                    e
                ),
            }
            if is_terminal(&command.name) {
                break;
            }
        }

        self.occupants.insert(uuid, client);
    }

    /// Sends an event about `from` to every co-occupant allowed to see it
    ///
    /// Visibility is decided per recipient at send time; a recipient that
    /// just became able to see `from` gets its snapshot first.
    pub(crate) fn broadcast(&mut self, from: &mut RoomClient, message: String) {
        if self.singleplayer {
            return;
        }
        let hub = &self.hub;
        for other in self.occupants.values_mut() {
            Self::reconcile_pair(hub, from, other);
            if other.known.contains(&from.uuid()) {
                other.outbox.push(message.clone());
            }
        }
    }

    /// Brings what `a` and `b` know about each other in line with visibility
    fn reconcile_pair(hub: &Hub, a: &mut RoomClient, b: &mut RoomClient) {
        let visible = hub.visible(a.uuid(), b.uuid());
        Self::reconcile_view(visible, a, b);
        Self::reconcile_view(visible, b, a);
    }

    fn reconcile_view(visible: bool, viewer: &mut RoomClient, subject: &RoomClient) {
        let known = viewer.known.contains(&subject.uuid());
        if visible && !known {
            for message in subject.snapshot() {
                viewer.outbox.push(message);
            }
            viewer.known.insert(subject.uuid());
        } else if !visible && known {
            viewer.outbox.push(subject.event("d", &[] as &[&str]));
            viewer.known.remove(&subject.uuid());
        }
    }

    fn refresh(&mut self, uuid: Uuid) {
        if self.singleplayer {
            return;
        }
        let Some(mut client) = self.occupants.remove(&uuid) else {
            return;
        };
        let hub = &self.hub;
        for other in self.occupants.values_mut() {
            Self::reconcile_pair(hub, &mut client, other);
        }
        self.occupants.insert(uuid, client);
    }

    fn update_identity(&mut self, identity: PlayerIdentity) {
        let uuid = identity.uuid;
        let Some(mut client) = self.occupants.remove(&uuid) else {
            return;
        };
        let renamed = client.identity.name != identity.name;
        client.identity = identity;
        if renamed {
            if let Some(name) = client.identity.name.clone() {
                let event = client.event("name", &[name]);
                self.broadcast(&mut client, event);
            }
        }
        self.occupants.insert(uuid, client);
    }

    fn occupant_infos(&self) -> Vec<OccupantInfo> {
        let mut infos: Vec<OccupantInfo> = self
            .occupants
            .values()
            .map(|client| OccupantInfo {
                avatar_id: client.avatar_id,
                identity: client.identity.clone(),
                avatar: client.avatar.clone(),
            })
            .collect();
        infos.sort_by_key(|info| info.avatar_id);
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssetLists, GameConfig, ServerSettings};
    use crate::connection::Outbox;
    use crate::store::Party;
    use shared::condition::{Effect, Trigger};
    use std::net::{IpAddr, Ipv4Addr};

    struct Player {
        identity: PlayerIdentity,
        outbox: Outbox,
        rx: mpsc::Receiver<String>,
    }

    impl Player {
        fn uuid(&self) -> Uuid {
            self.identity.uuid
        }

        /// Everything received so far, fields joined by spaces
        fn drain(&mut self) -> Vec<String> {
            let mut messages = Vec::new();
            while let Ok(message) = self.rx.try_recv() {
                messages.push(message.replace('\u{FFFF}', " "));
            }
            messages
        }
    }

    fn hub(settings: ServerSettings, game: GameConfig) -> Arc<Hub> {
        Hub::in_memory(settings, game).unwrap()
    }

    fn player(hub: &Hub, n: u8) -> Player {
        let identity = hub
            .store
            .identity_for_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)))
            .unwrap();
        let (outbox, rx) = Outbox::new(256);
        Player {
            identity,
            outbox,
            rx,
        }
    }

    fn command(name: &str, args: &[&str]) -> Command {
        Command::new(name, args.iter().map(|a| a.to_string()).collect())
    }

    async fn join(room: &RoomHandle, player: &Player) {
        let client = RoomClient::new(player.identity.clone(), player.outbox.clone());
        assert!(room.try_send(RoomMsg::Join { client }));
        settle(room).await;
    }

    async fn send(room: &RoomHandle, player: &Player, commands: Vec<Command>) {
        assert!(room.try_send(RoomMsg::Commands {
            uuid: player.uuid(),
            conn_id: player.outbox.conn_id(),
            commands,
        }));
        settle(room).await;
    }

    /// Round-trips the mailbox so everything queued before has been handled
    async fn settle(room: &RoomHandle) -> Vec<OccupantInfo> {
        room.occupants().await.unwrap()
    }

    fn starts_with(messages: &[String], prefix: &str) -> usize {
        messages.iter().filter(|m| m.starts_with(prefix)).count()
    }

    #[tokio::test]
    async fn test_join_exchanges_snapshots() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let mut a = player(&hub, 1);
        let mut b = player(&hub, 2);

        join(room, &a).await;
        let first = a.drain();
        assert_eq!(first[0], format!("s 1 {} 0", a.uuid()));

        join(room, &b).await;
        let to_b = b.drain();
        assert_eq!(to_b[0], format!("s 2 {} 0", b.uuid()));
        assert_eq!(to_b[1], format!("c 1 {} 0 0 ", a.uuid()));
        assert!(to_b.contains(&"m 1 0 0".to_string()));

        let to_a = a.drain();
        assert_eq!(to_a[0], format!("c 2 {} 0 0 ", b.uuid()));
    }

    #[tokio::test]
    async fn test_moves_reach_others_only() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let mut a = player(&hub, 1);
        let mut b = player(&hub, 2);
        join(room, &a).await;
        join(room, &b).await;
        a.drain();
        b.drain();

        send(room, &a, vec![command("m", &["3", "0"]), command("spd", &["6"])]).await;

        assert!(a.drain().is_empty());
        assert_eq!(b.drain(), vec!["m 1 3 0".to_string(), "spd 1 6".to_string()]);
        let occupants = settle(room).await;
        assert_eq!(occupants[0].avatar.x, 3);
        assert_eq!(occupants[0].avatar.facing.index(), 1);
        assert_eq!(occupants[0].avatar.speed, 6);
    }

    #[tokio::test]
    async fn test_invalid_command_dropped_rest_processed() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let a = player(&hub, 1);
        join(room, &a).await;

        send(
            room,
            &a,
            vec![
                command("spd", &["11"]),
                command("nope", &[]),
                command("tr", &["3"]),
                command("rp", &["4"]),
            ],
        )
        .await;

        let occupants = settle(room).await;
        assert_eq!(occupants[0].avatar.speed, 4);
        assert_eq!(occupants[0].avatar.transparency, 3);
    }

    #[tokio::test]
    async fn test_say_is_terminal() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let a = player(&hub, 1);
        let mut b = player(&hub, 2);
        join(room, &a).await;
        join(room, &b).await;
        b.drain();
        hub.store.set_display_name(a.uuid(), "Alice").unwrap();

        send(
            room,
            &a,
            vec![command("say", &["hello there"]), command("m", &["9", "9"])],
        )
        .await;

        assert_eq!(b.drain(), vec!["say 1 hello there".to_string()]);
        assert_eq!(settle(room).await[0].avatar.x, 0);
    }

    #[tokio::test]
    async fn test_muted_say_dropped() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let a = player(&hub, 1);
        let mut b = player(&hub, 2);
        join(room, &a).await;
        join(room, &b).await;
        b.drain();

        hub.store.set_display_name(a.uuid(), "Alice").unwrap();
        hub.store.set_muted(a.uuid(), true).unwrap();
        send(room, &a, vec![command("say", &["hi"])]).await;
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn test_unnamed_say_dropped() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let a = player(&hub, 1);
        let mut b = player(&hub, 2);
        join(room, &a).await;
        join(room, &b).await;
        b.drain();

        send(room, &a, vec![command("say", &["hi"])]).await;
        assert!(b.drain().is_empty());

        hub.store.set_display_name(a.uuid(), "Alice").unwrap();
        send(room, &a, vec![command("say", &["hi"])]).await;
        assert_eq!(b.drain(), vec!["say 1 hi".to_string()]);
    }

    fn picture_args(id: &str, x: &str, tail: &[&str]) -> Vec<String> {
        let mut args = vec![
            id, x, "120", "0", "0", "0", "0", "100", "0", "0", "100", "100", "100", "100", "0", "0",
        ];
        args.extend_from_slice(tail);
        args.iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn test_pictures_show_move_erase() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let a = player(&hub, 1);
        let mut b = player(&hub, 2);
        join(room, &a).await;
        join(room, &b).await;
        b.drain();

        let show = Command::new("ap", picture_args("3", "160", &["Face", "1", "0"]));
        send(room, &a, vec![show]).await;
        assert_eq!(
            b.drain(),
            vec!["ap 1 3 160 120 0 0 0 0 100 0 0 100 100 100 100 0 0 Face 1 0".to_string()]
        );
        let shown = &settle(room).await[0].avatar.pictures;
        assert_eq!(shown[&3].name, "Face");
        assert!(shown[&3].use_transparent_color);

        let moved = Command::new("mp", picture_args("3", "200", &["30"]));
        let missing = Command::new("mp", picture_args("4", "200", &["30"]));
        send(room, &a, vec![moved, missing]).await;
        assert_eq!(
            b.drain(),
            vec!["mp 1 3 200 120 0 0 0 0 100 0 0 100 100 100 100 0 0 30".to_string()]
        );
        assert_eq!(settle(room).await[0].avatar.pictures[&3].params.position, (200, 120));

        let slot_zero = Command::new("ap", picture_args("0", "160", &["Face", "0", "0"]));
        send(
            room,
            &a,
            vec![slot_zero, command("rp", &["3"]), command("rp", &["3"])],
        )
        .await;
        assert_eq!(b.drain(), vec!["rp 1 3".to_string()]);
        assert!(settle(room).await[0].avatar.pictures.is_empty());
    }

    #[tokio::test]
    async fn test_asset_whitelists_reject_unknown_names() {
        let mut game = GameConfig::default();
        game.assets = AssetLists {
            sprites: vec!["hero".to_string()],
            systems: vec!["blue".to_string()],
            sounds: vec!["bell".to_string()],
            pictures: vec!["Face".to_string()],
        };
        let hub = hub(ServerSettings::default(), game);
        let room = hub.room(1).unwrap();
        let a = player(&hub, 1);
        let mut b = player(&hub, 2);
        join(room, &a).await;
        join(room, &b).await;
        b.drain();

        send(
            room,
            &a,
            vec![
                command("spr", &["villain", "0"]),
                command("sys", &["red"]),
                command("se", &["boom", "100", "100", "50"]),
                Command::new("ap", picture_args("1", "0", &["Ghost", "0", "0"])),
            ],
        )
        .await;
        assert!(b.drain().is_empty());
        let avatar = settle(room).await[0].avatar.clone();
        assert_eq!(avatar.sprite, None);
        assert_eq!(avatar.system, None);
        assert!(avatar.pictures.is_empty());

        send(
            room,
            &a,
            vec![
                command("spr", &["hero", "2"]),
                command("sys", &["blue"]),
                command("se", &["bell", "100", "100", "50"]),
            ],
        )
        .await;
        assert_eq!(
            b.drain(),
            vec![
                "spr 1 hero 2".to_string(),
                "sys 1 blue".to_string(),
                "se 1 bell 100 100 50".to_string(),
            ]
        );
        assert_eq!(settle(room).await[0].avatar.system.as_deref(), Some("blue"));
    }

    #[tokio::test]
    async fn test_avatar_ids_reused_after_leave() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let a = player(&hub, 1);
        let b = player(&hub, 2);
        let c = player(&hub, 3);
        let d = player(&hub, 4);
        join(room, &a).await;
        join(room, &b).await;
        join(room, &c).await;

        room.send(RoomMsg::Leave {
            uuid: b.uuid(),
            conn_id: b.outbox.conn_id(),
        })
        .await;
        join(room, &d).await;

        let ids: Vec<(Uuid, u16)> = settle(room)
            .await
            .iter()
            .map(|o| (o.identity.uuid, o.avatar_id))
            .collect();
        assert_eq!(ids, vec![(a.uuid(), 1), (d.uuid(), 2), (c.uuid(), 3)]);
    }

    #[tokio::test]
    async fn test_capacity_enforced() {
        let settings = ServerSettings {
            room_capacity: 2,
            ..ServerSettings::default()
        };
        let hub = hub(settings, GameConfig::default());
        let room = hub.room(1).unwrap();
        let a = player(&hub, 1);
        let b = player(&hub, 2);
        let c = player(&hub, 3);
        join(room, &a).await;
        join(room, &b).await;
        join(room, &c).await;

        assert_eq!(settle(room).await.len(), 2);
        assert!(c.outbox.is_cancelled());
        assert!(!a.outbox.is_cancelled());
    }

    #[tokio::test]
    async fn test_stale_leave_ignored() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let a = player(&hub, 1);
        join(room, &a).await;

        room.send(RoomMsg::Leave {
            uuid: a.uuid(),
            conn_id: a.outbox.conn_id() + 1000,
        })
        .await;
        assert_eq!(settle(room).await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejoin_disconnects_previous_occupant_first() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let mut observer = player(&hub, 1);
        let first = player(&hub, 2);
        join(room, &observer).await;
        join(room, &first).await;
        observer.drain();

        let (outbox, _rx) = Outbox::new(64);
        let second = Player {
            identity: first.identity.clone(),
            outbox,
            rx: mpsc::channel(1).1,
        };
        join(room, &second).await;

        let seen = observer.drain();
        assert_eq!(seen[0], "d 2");
        assert_eq!(seen[1], format!("c 2 {} 0 0 ", first.uuid()));
        assert!(first.outbox.is_cancelled());
        assert_eq!(settle(room).await.len(), 2);

        // The superseded connection's leave no longer matches
        room.send(RoomMsg::Leave {
            uuid: first.uuid(),
            conn_id: first.outbox.conn_id(),
        })
        .await;
        assert_eq!(settle(room).await.len(), 2);
    }

    #[tokio::test]
    async fn test_private_player_hidden_until_partied() {
        let hub = hub(ServerSettings::default(), GameConfig::default());
        let room = hub.room(1).unwrap();
        let mut a = player(&hub, 1);
        let mut b = player(&hub, 2);
        hub.set_private(a.uuid(), true);
        join(room, &a).await;
        join(room, &b).await;
        a.drain();
        assert_eq!(starts_with(&b.drain(), "c "), 0);

        send(room, &a, vec![command("m", &["1", "1"])]).await;
        send(room, &b, vec![command("m", &["2", "2"])]).await;
        assert!(a.drain().is_empty());
        assert!(b.drain().is_empty());

        hub.parties.upsert(&Party {
            id: 1,
            name: "duo".to_string(),
            owner: a.uuid(),
            members: vec![a.uuid(), b.uuid()],
        });
        room.try_send(RoomMsg::Refresh { uuid: a.uuid() });
        settle(room).await;
        assert_eq!(starts_with(&a.drain(), "c 2"), 1);
        assert_eq!(starts_with(&b.drain(), "c 1"), 1);

        send(room, &a, vec![command("m", &["3", "3"])]).await;
        assert_eq!(b.drain(), vec!["m 1 3 3".to_string()]);

        hub.parties.disband(1);
        send(room, &a, vec![command("m", &["4", "4"])]).await;
        assert_eq!(b.drain(), vec!["d 1".to_string()]);
    }

    #[tokio::test]
    async fn test_singleplayer_room_isolated() {
        let mut game = GameConfig::default();
        game.maps[0].singleplayer = true;
        let hub = hub(ServerSettings::default(), game);
        let room = hub.room(1).unwrap();
        let mut a = player(&hub, 1);
        let mut b = player(&hub, 2);
        join(room, &a).await;
        join(room, &b).await;

        send(room, &a, vec![command("m", &["5", "5"])]).await;
        assert_eq!(a.drain().len(), 1);
        assert_eq!(b.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_switch_chain_unlocks_once() {
        let mut game = GameConfig::default();
        game.conditions = vec![Condition {
            id: "chain".to_string(),
            map_id: Some(1),
            bounds: None,
            trigger: Trigger::Switch {
                ids: vec![10, 11, 12],
                value: true,
            },
            requires: Vec::new(),
            effect: Effect::Tag {
                tag: "X".to_string(),
            },
            time_trial: false,
        }];
        let hub = hub(ServerSettings::default(), game);
        let room = hub.room(1).unwrap();
        let mut a = player(&hub, 1);
        join(room, &a).await;
        let probes = a.drain();
        assert_eq!(probes[1..], ["ss 10 2", "ss 11 2", "ss 12 2"]);

        for id in ["10", "11", "12"] {
            send(room, &a, vec![command("ss", &[id, "0"]), command("ss", &[id, "1"])]).await;
        }
        assert_eq!(a.drain(), vec!["tu X".to_string()]);
        assert!(hub.store.tags(a.uuid()).unwrap().contains("X"));

        // A repeat of the chain writes nothing new
        for id in ["10", "11", "12"] {
            send(room, &a, vec![command("ss", &[id, "1"])]).await;
        }
        assert!(a.drain().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_chain_link_never_fires() {
        let mut game = GameConfig::default();
        game.conditions = vec![Condition {
            id: "chain".to_string(),
            map_id: None,
            bounds: None,
            trigger: Trigger::Switch {
                ids: vec![10, 11, 12],
                value: true,
            },
            requires: Vec::new(),
            effect: Effect::Tag {
                tag: "X".to_string(),
            },
            time_trial: false,
        }];
        let hub = hub(ServerSettings::default(), game);
        let room = hub.room(3).unwrap();
        let mut a = player(&hub, 1);
        join(room, &a).await;
        a.drain();

        send(room, &a, vec![command("ss", &["10", "1"]), command("ss", &["12", "1"])]).await;
        assert!(a.drain().is_empty());
        assert!(hub.store.tags(a.uuid()).unwrap().is_empty());
    }
}
