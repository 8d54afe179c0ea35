//! WebSocket gateway: upgrade, identity resolution and frame pumping
//!
//! Each accepted TCP connection is upgraded on `/room/<mapId>` or
//! `/session`, with an optional `?token=` query. Identity is resolved during
//! the handshake so unknown tokens, banned players and unknown maps are
//! refused before the socket is ever handed to an actor.

use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use shared::codec::is_terminal;
use shared::Command;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::connection::{run_writer, ConnId, FrameReader, Outbox};
use crate::hub::Hub;
use crate::room::{RoomHandle, RoomMsg};
use crate::room_client::RoomClient;
use crate::session::{announce_presence, SessionActor, SessionHandle, SessionMsg};
use crate::store::{PlayerIdentity, StoreError, TOKEN_LENGTH};

type WsReader = SplitStream<WebSocketStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Room(u32),
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub endpoint: Endpoint,
    pub token: Option<String>,
}

/// Why an upgrade was refused
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("no such endpoint")]
    NotFound,
    #[error("unknown map {0}")]
    UnknownMap(u32),
    #[error("malformed token")]
    BadToken,
    #[error("unknown token")]
    UnknownToken,
    #[error("player is banned")]
    Banned,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::NotFound | Rejection::UnknownMap(_) => StatusCode::NOT_FOUND,
            Rejection::BadToken | Rejection::UnknownToken => StatusCode::UNAUTHORIZED,
            Rejection::Banned => StatusCode::FORBIDDEN,
            Rejection::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn response(&self) -> ErrorResponse {
        let mut response = ErrorResponse::new(Some(self.to_string()));
        *response.status_mut() = self.status();
        response
    }
}

/// Parses the request path and query into an endpoint
pub fn parse_route(path: &str, query: Option<&str>) -> Result<Route, Rejection> {
    let endpoint = match path.trim_end_matches('/') {
        "/session" => Endpoint::Session,
        other => {
            let map_id = other
                .strip_prefix("/room/")
                .and_then(|id| id.parse::<u32>().ok())
                .ok_or(Rejection::NotFound)?;
            Endpoint::Room(map_id)
        }
    };

    let token = query.and_then(|query| {
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("token="))
            .map(str::to_string)
    });

    Ok(Route { endpoint, token })
}

/// Resolves the route and identity of an upgrade request
fn resolve(hub: &Hub, request: &Request, addr: IpAddr) -> Result<(Endpoint, PlayerIdentity), Rejection> {
    let route = parse_route(request.uri().path(), request.uri().query())?;
    if let Endpoint::Room(map_id) = route.endpoint {
        if hub.room(map_id).is_none() {
            return Err(Rejection::UnknownMap(map_id));
        }
    }

    let identity = match route.token {
        Some(token) => {
            if token.chars().count() != TOKEN_LENGTH {
                return Err(Rejection::BadToken);
            }
            hub.store
                .identity_for_token(&token)?
                .ok_or(Rejection::UnknownToken)?
        }
        None => hub.store.identity_for_address(addr)?,
    };
    if identity.banned {
        return Err(Rejection::Banned);
    }

    Ok((route.endpoint, identity))
}

pub struct Server {
    listener: TcpListener,
    hub: Arc<Hub>,
}

impl Server {
    pub async fn bind(addr: &str, hub: Arc<Hub>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Gateway listening on {}", listener.local_addr()?);
        Ok(Self { listener, hub })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the listener fails
    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    continue;
                }
            };
            let hub = Arc::clone(&self.hub);
            tokio::spawn(async move {
                handle_connection(hub, stream, peer).await;
            });
        }
    }
}

async fn handle_connection(hub: Arc<Hub>, stream: TcpStream, peer: SocketAddr) {
    let Some(_permit) = hub.admit(peer.ip()) else {
        warn!("Refused {}: too many connections from this address", peer);
        return;
    };

    let mut resolved = None;
    let callback = |request: &Request, response: Response| match resolve(&hub, request, peer.ip()) {
        Ok(route) => {
            resolved = Some(route);
            Ok(response)
        }
        Err(rejection) => {
            info!("Refused upgrade from {} on {}: {}", peer, request.uri(), rejection);
            Err(rejection.response())
        }
    };
    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Handshake with {} failed: {}", peer, e);
            return;
        }
    };
    let Some((endpoint, identity)) = resolved else {
        return;
    };

    let (sink, reader) = ws.split();
    let (outbox, rx) = Outbox::new(hub.settings.outbox_capacity);
    tokio::spawn(run_writer(sink, rx, outbox.token(), hub.settings.keepalive));

    let frames = FrameReader::new(hub.settings.signing_key.clone());
    outbox.send("k", &[frames.client_key()]);

    let uuid = identity.uuid;
    let mut connection = Connection {
        hub: Arc::clone(&hub),
        uuid,
        outbox: outbox.clone(),
        frames,
        reader,
        cancel: outbox.token(),
    };
    info!("{} connected to {:?} from {}", uuid, endpoint, peer);

    match endpoint {
        Endpoint::Room(map_id) => connection.serve_room(identity, map_id).await,
        Endpoint::Session => connection.serve_session().await,
    }

    outbox.cancel();
    info!("{} disconnected from {:?}", uuid, endpoint);
}

/// Reading half of one upgraded connection
struct Connection {
    hub: Arc<Hub>,
    uuid: Uuid,
    outbox: Outbox,
    frames: FrameReader,
    reader: WsReader,
    cancel: CancellationToken,
}

impl Connection {
    fn conn_id(&self) -> ConnId {
        self.outbox.conn_id()
    }

    /// Next batch of authenticated commands; `None` once the connection ends
    async fn next_commands(&mut self) -> Option<Vec<Command>> {
        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                message = self.reader.next() => message,
            };

            let raw = match message {
                Some(Ok(Message::Binary(raw))) => raw,
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!("Read from {} failed: {}", self.uuid, e);
                    return None;
                }
            };

            match self.frames.decode(&raw) {
                Ok(commands) if commands.is_empty() => continue,
                Ok(commands) => return Some(commands),
                Err(e) => warn!("Rejected frame from {}: {}", self.uuid, e),
            }
        }
    }

    // Room endpoint

    async fn serve_room(&mut self, identity: PlayerIdentity, map_id: u32) {
        let Some(mut room) = self.hub.room(map_id).cloned() else {
            return;
        };
        self.hub
            .attach_room(self.uuid, map_id, self.outbox.clone())
            .await;
        self.join(&room, identity).await;

        while let Some(commands) = self.next_commands().await {
            let mut batch = Vec::new();
            for command in commands {
                if command.name == "sr" {
                    self.forward(&room, std::mem::take(&mut batch));
                    match self.switch_target(&command) {
                        Some(target) => {
                            self.switch(&room, &target).await;
                            room = target;
                        }
                        None => warn!("Dropped room switch from {}: {}", self.uuid, command.raw()),
                    }
                    continue;
                }

                let terminal = is_terminal(&command.name);
                batch.push(command);
                if terminal {
                    break;
                }
            }
            self.forward(&room, batch);
        }

        room.send(RoomMsg::Leave {
            uuid: self.uuid,
            conn_id: self.conn_id(),
        })
        .await;
        self.hub.detach_room(self.uuid, self.conn_id()).await;
    }

    async fn join(&self, room: &RoomHandle, identity: PlayerIdentity) {
        let client = RoomClient::new(identity, self.outbox.clone());
        if !room.send(RoomMsg::Join { client }).await {
            warn!("Room {} is gone, dropping {}", room.map_id(), self.uuid);
            self.outbox.cancel();
        }
    }

    fn switch_target(&self, command: &Command) -> Option<RoomHandle> {
        match command.args.as_slice() {
            [map_id] => map_id
                .parse::<u32>()
                .ok()
                .and_then(|id| self.hub.room(id))
                .cloned(),
            _ => None,
        }
    }

    /// Leaves the current room and joins `target` with a fresh client
    async fn switch(&self, from: &RoomHandle, target: &RoomHandle) {
        from.send(RoomMsg::Leave {
            uuid: self.uuid,
            conn_id: self.conn_id(),
        })
        .await;

        let identity = match self.hub.store.identity(self.uuid) {
            Ok(identity) => identity,
            Err(e) => {
                error!("Failed to reload identity {}: {}", self.uuid, e);
                self.outbox.cancel();
                return;
            }
        };
        self.hub
            .move_presence(self.uuid, self.conn_id(), target.map_id())
            .await;
        self.join(target, identity).await;
        debug!(
            "{} switched from room {} to {}",
            self.uuid,
            from.map_id(),
            target.map_id()
        );
    }

    /// Hands a batch to the room without waiting; a full mailbox drops the peer
    fn forward(&self, room: &RoomHandle, commands: Vec<Command>) {
        if commands.is_empty() {
            return;
        }
        let delivered = room.try_send(RoomMsg::Commands {
            uuid: self.uuid,
            conn_id: self.conn_id(),
            commands,
        });
        if !delivered {
            warn!("Room {} cannot keep up with {}", room.map_id(), self.uuid);
            self.outbox.cancel();
        }
    }

    // Session endpoint

    async fn serve_session(&mut self) {
        let (tx, mailbox) = mpsc::channel(self.hub.settings.mailbox_capacity);
        let handle = SessionHandle::new(self.outbox.clone(), tx);
        self.hub.attach_session(self.uuid, handle.clone()).await;
        let actor = SessionActor::new(
            Arc::clone(&self.hub),
            self.uuid,
            self.outbox.clone(),
            mailbox,
        );
        tokio::spawn(actor.run());

        while let Some(commands) = self.next_commands().await {
            if !handle.try_send(SessionMsg::Commands(commands)) {
                self.outbox.cancel();
                break;
            }
        }

        if self.hub.detach_session(self.uuid, self.conn_id()).await {
            announce_presence(&self.hub, self.uuid, false).await;
        }
    }
}
