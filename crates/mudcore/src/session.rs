use std::net::SocketAddr;

use tracing::{debug, info, warn};

use crate::World;
use crate::graph::Coord;
use crate::outbox::{Outbox, OutboxClosed};
use crate::registry::{ClaimError, Phase, SessionId, SessionKey};

pub const BANNER: &str = "Welcome to the MUD!\n\nEnter your name: ";
pub const NAME_TOO_SHORT: &str = "Name must be at least 3 characters.\nEnter your name: ";
pub const NAME_TAKEN: &str = "That name is already taken.\nEnter your name: ";
pub const PASSWORD_PROMPT: &str = "Enter your password: ";
pub const BAD_PASSWORD: &str =
    "Password must be at least 5 characters and contain a number.\nEnter your password: ";

pub const MIN_NAME_CHARS: usize = 3;
pub const MIN_PASSWORD_CHARS: usize = 5;

pub const DEFAULT_HEALTH: i32 = 100;
pub const DEFAULT_MANA: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Player {
    pub health: i32,
    pub mana: i32,
    pub coord: Coord,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            health: DEFAULT_HEALTH,
            mana: DEFAULT_MANA,
            coord: Coord::ORIGIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Login,
    Password { name: String },
    Playing { name: String, player: Player },
    /// Terminal. Registry cleanup has already happened.
    Disconnected,
}

/// Why a session is leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    Quit,
    Lost,
}

/// One connected client, owned by its connection task.
#[derive(Debug)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) peer: SocketAddr,
    pub(crate) state: State,
    pub(crate) outbox: Outbox,
    pub(crate) world: World,
}

impl Session {
    /// Register under the endpoint key and send the banner.
    pub async fn open(world: World, peer: SocketAddr, outbox: Outbox) -> Self {
        let id = world.registry.next_id();
        world
            .registry
            .register(SessionKey::Endpoint(peer), id, outbox.clone())
            .await;
        debug!(session = %id, peer = %peer, "session opened");

        let mut s = Self {
            id,
            peer,
            state: State::Login,
            outbox,
            world,
        };
        if s.outbox.send(BANNER).await.is_err() {
            s.leave(Departure::Lost).await;
        }
        s
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn name(&self) -> Option<&str> {
        match &self.state {
            State::Password { name } | State::Playing { name, .. } => Some(name),
            State::Login | State::Disconnected => None,
        }
    }

    pub fn player(&self) -> Option<&Player> {
        match &self.state {
            State::Playing { player, .. } => Some(player),
            _ => None,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.state == State::Disconnected
    }

    /// Feed one input line through the current state.
    ///
    /// `Err` means the client can no longer be written to; treat it as a
    /// disconnect.
    pub async fn handle_line(&mut self, line: &str) -> Result<(), OutboxClosed> {
        if line.is_empty() {
            return Ok(());
        }
        match self.state {
            State::Login => self.login(line).await,
            State::Password { .. } => self.password(line).await,
            State::Playing { .. } => self.play(line).await,
            State::Disconnected => Ok(()),
        }
    }

    async fn login(&mut self, line: &str) -> Result<(), OutboxClosed> {
        if line.chars().count() < MIN_NAME_CHARS {
            return self.outbox.send(NAME_TOO_SHORT).await;
        }

        let endpoint = SessionKey::Endpoint(self.peer);
        match self.world.registry.claim_name(&endpoint, line, self.id).await {
            Ok(()) => {
                debug!(session = %self.id, name = %line, "name claimed");
                self.state = State::Password {
                    name: line.to_string(),
                };
                self.outbox.send(PASSWORD_PROMPT).await
            }
            Err(ClaimError::NameTaken) => self.outbox.send(NAME_TAKEN).await,
            Err(e @ ClaimError::NotRegistered) => {
                warn!(session = %self.id, err = %e, "login without registry entry");
                self.leave(Departure::Lost).await;
                Ok(())
            }
        }
    }

    async fn password(&mut self, line: &str) -> Result<(), OutboxClosed> {
        if !password_acceptable(line) {
            return self.outbox.send(BAD_PASSWORD).await;
        }
        let State::Password { name } = &self.state else {
            return Ok(());
        };
        let name = name.clone();

        let key = SessionKey::Name(name.clone());
        if !self.world.registry.set_phase(&key, self.id, Phase::Playing).await {
            warn!(session = %self.id, name = %name, "lost registry entry before entering world");
            self.leave(Departure::Lost).await;
            return Ok(());
        }
        let player = Player::default();
        info!(session = %self.id, peer = %self.peer, name = %name, "entered world");

        let text = format!("Welcome, {name}!\n\n{}", status_line(&name, &player));
        self.state = State::Playing { name, player };
        self.outbox.send(text).await
    }

    /// Remove this session from the registry and notify the room.
    ///
    /// Safe to call more than once: only the first call does anything.
    pub async fn leave(&mut self, how: Departure) {
        let held = match std::mem::replace(&mut self.state, State::Disconnected) {
            State::Disconnected => return,
            State::Login => None,
            State::Password { name } => Some((name, false)),
            State::Playing { name, .. } => Some((name, true)),
        };

        let registry = &self.world.registry;
        registry
            .remove(&SessionKey::Endpoint(self.peer), self.id)
            .await;

        let Some((name, playing)) = held else {
            debug!(session = %self.id, peer = %self.peer, "left before choosing a name");
            return;
        };
        registry
            .remove(&SessionKey::Name(name.clone()), self.id)
            .await;

        if playing {
            let notice = match how {
                Departure::Quit => format!("{name} has quit.\n"),
                Departure::Lost => format!("{name} has disconnected.\n"),
            };
            registry.broadcast(notice).await;
        }
        info!(session = %self.id, peer = %self.peer, name = %name, how = ?how, "left world");
    }
}

pub fn password_acceptable(pw: &str) -> bool {
    pw.chars().count() >= MIN_PASSWORD_CHARS && pw.chars().any(|c| c.is_ascii_digit())
}

pub fn status_line(name: &str, p: &Player) -> String {
    format!("{name}: {}/{} > ", p.health, p.mana)
}
