/// Simulation clock
pub mod physics {
    /// Room tick rate in Hz
    pub const TICK_RATE: u32 = 20;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / 20.0;
    /// Tick duration in milliseconds
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
}

/// Mass-related constants
pub mod mass {
    /// Mass every body spawns with
    pub const STARTING: f32 = 6.0;
    /// Growth cap; food eaten at the cap is consumed without effect
    pub const MAXIMUM: f32 = 100.0;
    /// Boosting is only allowed at or above this mass, and drains down to it
    pub const MIN_TO_BOOST: f32 = 5.0;
    /// Mass lost per second while boosting
    pub const BOOST_DRAIN_PER_SECOND: f32 = 1.5;
}

/// Trail and segment resampling
pub mod segments {
    /// Mass needed for one visible segment
    pub const MASS_PER_SEGMENT: f32 = 1.0;
    /// Hard cap on visible segments
    pub const MAX_SEGMENTS: usize = 100;
    /// How far the smoothed segment count moves per tick
    pub const GROWTH_STEP: f32 = 0.25;
    /// Arc-length spacing between segments for a tiny body
    pub const BASE_SPACING: f32 = 10.0;
    /// Relative spacing growth per segment (spreads out large bodies)
    pub const SPACING_GROWTH: f32 = 0.002;
    /// Lowest opacity a fading tail segment is drawn with
    pub const MIN_TAIL_OPACITY: f32 = 0.15;
    /// Head must travel this far before a new trail point is recorded
    pub const TRAIL_SAMPLE_DISTANCE: f32 = 4.0;
    /// Trail points retained per unit of segment count
    pub const TRAIL_POINTS_PER_SEGMENT: usize = 4;
    /// Extra trail points retained regardless of mass
    pub const TRAIL_POINT_SLACK: usize = 16;
}

/// Steering and speed
pub mod movement {
    /// Cruise speed in units per second
    pub const BASE_SPEED: f32 = 120.0;
    /// Speed multiplier while boosting
    pub const BOOST_SPEED_MULTIPLIER: f32 = 2.0;
    /// Maximum turn rate in radians per second
    pub const TURN_RATE: f32 = 3.5;
    /// Turn rate multiplier while boosting
    pub const BOOST_TURN_MULTIPLIER: f32 = 2.0;
    /// Collision radius of a starting body
    pub const BASE_RADIUS: f32 = 8.0;
    /// Radius gained per unit of mass
    pub const RADIUS_PER_MASS: f32 = 0.06;
}

/// Spawn protection and placement
pub mod spawn {
    /// Ghost (spawn protection) duration in seconds
    pub const GHOST_DURATION: f32 = 3.0;
    /// Density grid resolution (N x N)
    pub const GRID_SIZE: usize = 8;
    /// Density contributed to each of the 8 neighbouring cells per head
    pub const NEIGHBOR_BLEED: f32 = 0.25;
    /// Random points tried inside each candidate cell
    pub const ATTEMPTS_PER_CELL: u32 = 6;
    /// Minimum distance from any live head for an interior spawn
    pub const MIN_DISTANCE: f32 = 150.0;
    /// Interior spawns keep this far from the arena edge
    pub const EDGE_MARGIN: f32 = 100.0;
    /// Outer-ring spawns sit this far outside the arena edge
    pub const OUTER_RING_MARGIN: f32 = 80.0;
    /// Inward slide speed of outer-ring bodies (units per second)
    pub const OUTER_RING_SLIDE_SPEED: f32 = 90.0;
    /// Seconds before a dead bot is replaced
    pub const BOT_RESPAWN_DELAY: f32 = 3.0;
}

/// Arena sizing policy
pub mod arena {
    /// Arena width/height with a single occupant
    pub const MIN_SIZE: f32 = 3000.0;
    /// Arena width/height at full population
    pub const MAX_SIZE: f32 = 8000.0;
    /// Population (players + bots) at which the arena stops growing
    pub const FULL_POPULATION: usize = 80;
    /// Smallest size change worth broadcasting
    pub const RESIZE_MIN_DELTA: f32 = 150.0;
}

/// Food, remains and money crates
pub mod food {
    /// Mass of a normal pellet
    pub const PELLET_MASS: f32 = 1.0;
    /// Pickup radius added to the eater's radius
    pub const PICKUP_RADIUS: f32 = 5.0;
    /// Lifetime of an uncollected money crate in seconds
    pub const CRATE_LIFETIME: f32 = 30.0;
    /// Lifetime of uneaten remains in seconds
    pub const REMAINS_LIFETIME: f32 = 60.0;
    /// Random scatter applied to remains and crates around their segment
    pub const REMAINS_JITTER: f32 = 6.0;
    /// Default pellet count per room
    pub const PELLETS_PER_ROOM: usize = 300;
}

/// Bot controller
pub mod ai {
    /// Default bots seeded per room
    pub const COUNT: usize = 10;
    /// Another body's segment closer than this triggers avoidance
    pub const AVOID_RADIUS: f32 = 40.0;
    /// Probability per tick of boosting while avoiding
    pub const AVOID_BOOST_CHANCE: f64 = 0.35;
    /// Humans within this range may be hunted
    pub const HUNT_RANGE: f32 = 320.0;
    /// Bot hunts when its mass exceeds this fraction of the target's mass
    pub const AGGRO_MASS_FRACTION: f32 = 0.9;
    /// Boost when the hunted head is closer than this
    pub const AGGRO_BOOST_DISTANCE: f32 = 120.0;
    /// Wander heading re-roll interval bounds (seconds)
    pub const WANDER_MIN_INTERVAL: f32 = 0.8;
    pub const WANDER_MAX_INTERVAL: f32 = 2.0;
    /// Beyond this fraction of the radius, wander headings bias toward the centre
    pub const WANDER_EDGE_FRACTION: f32 = 0.7;
    /// Random spread around the centre direction when biased
    pub const WANDER_CENTER_SPREAD: f32 = 0.6;
    /// Display names handed out to bots
    pub const NAMES: [&str; 12] = [
        "Viper", "Cobra", "Mamba", "Python", "Adder", "Krait", "Boa", "Taipan", "Asp", "Racer",
        "Sidewinder", "Copperhead",
    ];
}

/// Room lifecycle
pub mod room {
    /// Default human capacity per room
    pub const MAX_PLAYERS: usize = 50;
    /// Seconds a room may sit without players before it is destroyed
    pub const IDLE_TIMEOUT_SECS: u64 = 60;
    /// Number of body colours clients know about
    pub const COLOR_COUNT: u8 = 12;
    /// Longest display name kept after sanitizing
    pub const MAX_NAME_LENGTH: usize = 16;
}

/// Network limits
pub mod net {
    /// Maximum reliable server message size
    pub const MAX_MESSAGE_SIZE: usize = 262_144;
    /// Maximum reliable client message size
    pub const MAX_CLIENT_MESSAGE_SIZE: usize = 4096;
    /// Maximum datagram (unreliable) size
    pub const MAX_DATAGRAM_SIZE: usize = 1200;
    /// Bodies whose head is within this distance of the viewer are sent
    pub const INTEREST_RADIUS: f32 = 1400.0;
    /// Upper bound on bodies per filtered snapshot
    pub const MAX_BODIES_PER_SNAPSHOT: usize = 40;
    /// Time writers get to flush final messages at shutdown
    pub const SHUTDOWN_DRAIN_MS: u64 = 500;
}

/// Collision radius for a body of the given mass
#[inline]
pub fn mass_to_radius(mass: f32) -> f32 {
    movement::BASE_RADIUS + mass.max(0.0) * movement::RADIUS_PER_MASS
}
