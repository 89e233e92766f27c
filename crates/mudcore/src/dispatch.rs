//! Playing-state commands.

use std::fmt::Write as _;

use tracing::debug;

use crate::graph::{Coord, Direction, RoomGraph};
use crate::outbox::OutboxClosed;
use crate::session::{Departure, Session, State, status_line};

pub const VOID: &str = "You are lost in the void.\n";
pub const BLOCKED: &str = "You can't go that way.\n";
pub const SAY_WHAT: &str = "Say what?\n";
pub const UNKNOWN: &str = "Unknown command.\n";
pub const BYE: &str = "Bye!\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Look,
    Who,
    Say(String),
    Go(Direction),
    Quit,
    Unknown(String),
}

impl Command {
    /// The verb is everything up to the first space, matched exactly.
    pub fn parse(line: &str) -> Self {
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "look" => Command::Look,
            "who" => Command::Who,
            "say" => Command::Say(rest.split_whitespace().collect::<Vec<_>>().join(" ")),
            "quit" => Command::Quit,
            v => match Direction::parse(v) {
                Some(d) => Command::Go(d),
                None => Command::Unknown(v.to_string()),
            },
        }
    }
}

/// `look` output for whatever is at `at`.
pub fn render_room(rooms: &RoomGraph, at: Coord) -> String {
    let Some(room) = rooms.room_at(at) else {
        return VOID.to_string();
    };

    let mut out = format!("{}\n{}\nExits:\n", room.name, room.description);
    for (dir, _) in room.exits() {
        if let Some(to) = rooms.exit_target(room, dir) {
            let _ = writeln!(out, "{dir} - {}", to.name);
        }
    }
    out
}

impl Session {
    pub(crate) async fn play(&mut self, line: &str) -> Result<(), OutboxClosed> {
        self.dispatch(Command::parse(line)).await
    }

    pub(crate) async fn dispatch(&mut self, cmd: Command) -> Result<(), OutboxClosed> {
        let (name, mut player) = match &self.state {
            State::Playing { name, player } => (name.clone(), *player),
            _ => return Ok(()),
        };
        debug!(session = %self.id, cmd = ?cmd, "command");

        let rooms = &self.world.rooms;
        let mut out = match cmd {
            Command::Look => render_room(rooms, player.coord),
            Command::Who => {
                let mut names = self
                    .world
                    .registry
                    .list_playing()
                    .await
                    .into_iter()
                    .filter_map(|p| p.name)
                    .collect::<Vec<_>>();
                names.sort();

                let mut out = String::from("Connected players:\n");
                for n in names {
                    let _ = writeln!(out, "- {n}");
                }
                out
            }
            Command::Say(msg) if msg.is_empty() => SAY_WHAT.to_string(),
            Command::Say(msg) => {
                self.world
                    .registry
                    .broadcast(format!("{name} says: {msg}\n"))
                    .await;
                String::new()
            }
            Command::Go(dir) => match rooms.room_at(player.coord).and_then(|r| r.exit(dir)) {
                Some(to) => {
                    player.coord = to;
                    format!("You move {dir}.\n{}", render_room(rooms, to))
                }
                None => BLOCKED.to_string(),
            },
            Command::Quit => {
                let sent = self.outbox.send(BYE).await;
                self.leave(Departure::Quit).await;
                return sent;
            }
            Command::Unknown(_) => UNKNOWN.to_string(),
        };

        if let State::Playing { player: p, .. } = &mut self.state {
            *p = player;
        }
        out.push_str(&status_line(&name, &player));
        self.outbox.send(out).await
    }
}
