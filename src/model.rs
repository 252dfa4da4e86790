use rand::Rng;

pub(crate) const WINDOW_W: i32 = 400;
pub(crate) const WINDOW_H: i32 = 800;
pub(crate) const VEHICLE_W: i32 = 100;
pub(crate) const VEHICLE_H: i32 = 200;

pub(crate) const WRAP_JITTER: i32 = 800;
pub(crate) const RELOCATE_OFFSET: i32 = 400;
pub(crate) const LANE_PADDING: i32 = 350;
pub(crate) const HIT_PADDING: i32 = 30;
pub(crate) const PLAYER_BOTTOM_GAP: i32 = 20;
pub(crate) const LANE_EDGE_GAP: i32 = 15;
pub(crate) const CENTER_LANE_NUDGE: i32 = 10;

pub(crate) const INITIAL_LEVEL: i64 = 2;
pub(crate) const END_SCREEN_DELAY_MS: i64 = 2000;

/// Playfield and vehicle dimensions in logical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Geometry {
    pub(crate) window_w: i32,
    pub(crate) window_h: i32,
    pub(crate) vehicle_w: i32,
    pub(crate) vehicle_h: i32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            window_w: WINDOW_W,
            window_h: WINDOW_H,
            vehicle_w: VEHICLE_W,
            vehicle_h: VEHICLE_H,
        }
    }
}

impl Geometry {
    pub(crate) fn move_step(&self) -> i32 {
        self.window_w / 3
    }

    /// Minimum vertical distance between any two obstacles.
    pub(crate) fn lane_spacing(&self) -> i32 {
        2 * self.vehicle_h + LANE_PADDING
    }

    pub(crate) fn player_start(&self) -> (i32, i32) {
        (
            (self.window_w - self.vehicle_w) / 2,
            self.window_h - self.vehicle_h - PLAYER_BOTTOM_GAP,
        )
    }

    /// Fixed x for each obstacle lane: right, left, centre.
    pub(crate) fn lane_xs(&self) -> [i32; 3] {
        [
            self.window_w - self.vehicle_w - LANE_EDGE_GAP,
            LANE_EDGE_GAP,
            (self.window_w - self.vehicle_w) / 2 - CENTER_LANE_NUDGE,
        ]
    }

    pub(crate) fn x_in_range(&self, x: i32) -> bool {
        x >= 0 && x + self.vehicle_w <= self.window_w
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Rect {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) w: i32,
    pub(crate) h: i32,
}

impl Rect {
    pub(crate) fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Strict overlap: rectangles that only share an edge do not intersect.
    pub(crate) fn intersects(&self, o: &Rect) -> bool {
        if self.w <= 0 || self.h <= 0 || o.w <= 0 || o.h <= 0 {
            return false;
        }
        self.x < o.x + o.w && o.x < self.x + self.w && self.y < o.y + o.h && o.y < self.y + self.h
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum SpriteId {
    Player,
    Crashed,
    Obstacle,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Vehicle {
    x: i32,
    y: i32,
    sprite: SpriteId,
}

impl Vehicle {
    pub(crate) fn new(x: i32, y: i32, sprite: SpriteId) -> Self {
        Self { x, y, sprite }
    }

    pub(crate) fn x(&self) -> i32 {
        self.x
    }

    pub(crate) fn y(&self) -> i32 {
        self.y
    }

    pub(crate) fn sprite(&self) -> SpriteId {
        self.sprite
    }

    pub(crate) fn set_sprite(&mut self, sprite: SpriteId) {
        self.sprite = sprite;
    }

    pub(crate) fn set_position(&mut self, x: i32, y: i32) {
        self.x = x;
        self.y = y;
    }

    pub(crate) fn set_x(&mut self, x: i32) {
        self.x = x;
    }

    pub(crate) fn set_y(&mut self, y: i32) {
        self.y = y;
    }

    pub(crate) fn move_by(&mut self, dx: i32, dy: i32) {
        self.x += dx;
        self.y += dy;
    }

    /// Moves down by `speed`; once past the bottom edge it re-enters from above
    /// at a random height strictly above `-vehicle_h`.
    pub(crate) fn advance<R: Rng>(&mut self, speed: i64, geo: &Geometry, rng: &mut R) {
        self.y = (self.y as i64 + speed).clamp(i32::MIN as i64, i32::MAX as i64) as i32;
        if self.y > geo.window_h {
            let from = self.y;
            self.y = wrap_y(geo, rng);
            log::trace!("vehicle left the road at y={from}, re-entering at y={}", self.y);
        }
    }

    pub(crate) fn bounds(&self, geo: &Geometry) -> Rect {
        Rect::new(self.x, self.y, geo.vehicle_w, geo.vehicle_h)
    }

    /// Sprite bounds shrunk by `padding / 2` on every side.
    pub(crate) fn hit_box(&self, geo: &Geometry, padding: i32) -> Rect {
        let half = padding / 2;
        let b = self.bounds(geo);
        Rect::new(b.x + half, b.y + half, b.w - 2 * half, b.h - 2 * half)
    }
}

pub(crate) fn wrap_y<R: Rng>(geo: &Geometry, rng: &mut R) -> i32 {
    -geo.vehicle_h - rng.gen_range(1..=WRAP_JITTER)
}

pub(crate) fn relocate_y<R: Rng>(geo: &Geometry, rng: &mut R) -> i32 {
    wrap_y(geo, rng) - RELOCATE_OFFSET
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Running,
    /// Waiting for the end screen; holds the milliseconds left on the countdown.
    Crashed { end_screen_in_ms: i64 },
    Ended,
}
