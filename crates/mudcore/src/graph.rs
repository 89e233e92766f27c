use std::collections::HashMap;
use std::fmt;

/// Grid position of a room. Used directly as the map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub const ORIGIN: Coord = Coord { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring coordinate in `dir`, or `None` at the edge of `i32`.
    pub fn step(self, dir: Direction) -> Option<Coord> {
        let (dx, dy) = dir.offset();
        Some(Coord {
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
        })
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Display order for exit listings.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }

    /// Exact, lowercase direction names only. Abbreviations are unknown commands.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "north" => Some(Direction::North),
            "south" => Some(Direction::South),
            "east" => Some(Direction::East),
            "west" => Some(Direction::West),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, 1),
            Direction::South => (0, -1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub name: String,
    pub description: String,
    coord: Coord,
    exits: HashMap<Direction, Coord>,
}

impl Room {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            coord: Coord::ORIGIN,
            exits: HashMap::new(),
        }
    }

    /// Where the room sits; set by `RoomGraphBuilder::add_room`.
    pub fn coord(&self) -> Coord {
        self.coord
    }

    pub fn exit(&self, dir: Direction) -> Option<Coord> {
        self.exits.get(&dir).copied()
    }

    /// Exits in `Direction::ALL` order.
    pub fn exits(&self) -> impl Iterator<Item = (Direction, Coord)> + '_ {
        Direction::ALL
            .into_iter()
            .filter_map(|d| self.exits.get(&d).map(|c| (d, *c)))
    }
}

/// Mutable phase of the room graph. Consumed by `build`.
#[derive(Debug, Default)]
pub struct RoomGraphBuilder {
    rooms: HashMap<Coord, Room>,
}

impl RoomGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the room at `coord`.
    pub fn add_room(&mut self, coord: Coord, mut room: Room) -> &mut Self {
        room.coord = coord;
        self.rooms.insert(coord, room);
        self
    }

    /// Link `from` to its neighbour in `dir`, and the neighbour back.
    ///
    /// Only rooms that exist right now get linked: if either end is missing
    /// this is a no-op, and a room added later is not linked retroactively.
    /// Returns whether an exit was recorded.
    pub fn add_exit(&mut self, from: Coord, dir: Direction) -> bool {
        let Some(to) = from.step(dir) else {
            return false;
        };
        if !self.rooms.contains_key(&from) || !self.rooms.contains_key(&to) {
            return false;
        }

        if let Some(r) = self.rooms.get_mut(&from) {
            r.exits.insert(dir, to);
        }
        if let Some(r) = self.rooms.get_mut(&to) {
            r.exits.insert(dir.opposite(), from);
        }
        true
    }

    pub fn room_at(&self, coord: Coord) -> Option<&Room> {
        self.rooms.get(&coord)
    }

    pub fn build(self) -> RoomGraph {
        RoomGraph { rooms: self.rooms }
    }
}

/// Read-only room graph shared by every session.
#[derive(Debug, Default)]
pub struct RoomGraph {
    rooms: HashMap<Coord, Room>,
}

impl RoomGraph {
    pub fn builder() -> RoomGraphBuilder {
        RoomGraphBuilder::new()
    }

    /// The stock world. Construction order matters: `Start` asks for a
    /// northern exit while (0,2) is empty, so it stays unlinked.
    pub fn starter() -> Self {
        let cavern = Coord::new(0, 0);
        let tunnel = Coord::new(1, 0);
        let start = Coord::new(0, 1);

        let mut b = RoomGraph::builder();
        b.add_room(
            cavern,
            Room::new("Cavern", "A large cavern with a flowing stream."),
        )
        .add_room(
            tunnel,
            Room::new("Tunnel", "A dark tunnel leading to unknown depths."),
        )
        .add_room(
            start,
            Room::new("Start", "You are standing at the start of your adventure."),
        );

        b.add_exit(cavern, Direction::East);
        b.add_exit(tunnel, Direction::West);
        b.add_exit(start, Direction::North);
        b.build()
    }

    pub fn room_at(&self, coord: Coord) -> Option<&Room> {
        self.rooms.get(&coord)
    }

    pub fn exit_target(&self, room: &Room, dir: Direction) -> Option<&Room> {
        room.exit(dir).and_then(|c| self.rooms.get(&c))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_rooms() -> RoomGraphBuilder {
        let mut b = RoomGraph::builder();
        b.add_room(Coord::new(0, 0), Room::new("Start", "The beginning."))
            .add_room(Coord::new(1, 0), Room::new("Cavern", "Dripping water."));
        b
    }

    #[test]
    fn add_room_sets_coord() {
        let b = two_rooms();
        let r = b.room_at(Coord::new(1, 0)).expect("room");
        assert_eq!(r.coord(), Coord::new(1, 0));
        assert_eq!(r.name, "Cavern");
    }

    #[test]
    fn add_exit_links_both_ways() {
        let mut b = two_rooms();
        assert!(b.add_exit(Coord::new(0, 0), Direction::East));
        let g = b.build();

        let start = g.room_at(Coord::new(0, 0)).expect("start");
        let cavern = g.exit_target(start, Direction::East).expect("east");
        assert_eq!(cavern.name, "Cavern");

        let back = g.exit_target(cavern, Direction::West).expect("west");
        assert_eq!(back.coord(), start.coord());
    }

    #[test]
    fn add_exit_to_missing_room_is_noop() {
        let mut b = two_rooms();
        assert!(!b.add_exit(Coord::new(0, 0), Direction::North));
        assert!(!b.add_exit(Coord::new(5, 5), Direction::West));
        let g = b.build();
        let start = g.room_at(Coord::new(0, 0)).expect("start");
        assert_eq!(start.exits().count(), 0);
    }

    #[test]
    fn rooms_added_later_are_not_linked() {
        let mut b = RoomGraph::builder();
        b.add_room(Coord::new(0, 0), Room::new("A", ""));
        b.add_exit(Coord::new(0, 0), Direction::South);
        b.add_room(Coord::new(0, -1), Room::new("B", ""));
        let g = b.build();

        let a = g.room_at(Coord::new(0, 0)).expect("a");
        let below = g.room_at(Coord::new(0, -1)).expect("b");
        assert!(g.exit_target(a, Direction::South).is_none());
        assert!(g.exit_target(below, Direction::North).is_none());
    }

    #[test]
    fn negative_coords_are_distinct_keys() {
        let mut b = RoomGraph::builder();
        b.add_room(Coord::new(-1, 10), Room::new("West", ""))
            .add_room(Coord::new(1, -10), Room::new("East", ""));
        let g = b.build();
        assert_eq!(g.len(), 2);
        assert_eq!(g.room_at(Coord::new(-1, 10)).map(|r| r.name.as_str()), Some("West"));
        assert_eq!(g.room_at(Coord::new(1, -10)).map(|r| r.name.as_str()), Some("East"));
    }

    #[test]
    fn exits_listed_in_fixed_order() {
        let mut b = RoomGraph::builder();
        b.add_room(Coord::new(0, 0), Room::new("Hub", ""))
            .add_room(Coord::new(-1, 0), Room::new("W", ""))
            .add_room(Coord::new(0, 1), Room::new("N", ""))
            .add_room(Coord::new(1, 0), Room::new("E", ""));
        b.add_exit(Coord::new(0, 0), Direction::West);
        b.add_exit(Coord::new(0, 0), Direction::East);
        b.add_exit(Coord::new(0, 0), Direction::North);
        let g = b.build();

        let dirs = g
            .room_at(Coord::new(0, 0))
            .expect("hub")
            .exits()
            .map(|(d, _)| d)
            .collect::<Vec<_>>();
        assert_eq!(dirs, vec![Direction::North, Direction::East, Direction::West]);
    }

    #[test]
    fn starter_world_preserves_construction_order() {
        let g = RoomGraph::starter();
        assert_eq!(g.len(), 3);

        let cavern = g.room_at(Coord::ORIGIN).expect("cavern");
        assert_eq!(cavern.name, "Cavern");
        assert_eq!(
            g.exit_target(cavern, Direction::East).map(|r| r.name.as_str()),
            Some("Tunnel")
        );

        let start = g.room_at(Coord::new(0, 1)).expect("start");
        assert_eq!(start.exits().count(), 0);
        assert!(cavern.exit(Direction::North).is_none());
    }

    #[test]
    fn direction_parse_is_exact() {
        assert_eq!(Direction::parse("east"), Some(Direction::East));
        assert_eq!(Direction::parse("e"), None);
        assert_eq!(Direction::parse("East"), None);
        assert_eq!(Direction::parse("up"), None);
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            assert_eq!(Direction::parse(d.as_str()), Some(d));
        }
    }
}
