use crate::model::{
    relocate_y, wrap_y, Geometry, Phase, SpriteId, Vehicle, END_SCREEN_DELAY_MS, HIT_PADDING,
    INITIAL_LEVEL, RELOCATE_OFFSET,
};
use crate::storage::{KeyValueStore, RECORD_KEY};
use rand::{rngs::SmallRng, SeedableRng};

/// Speed at zero elapsed time; +2 px per tick every `LEVEL_UP_MS`.
const BASE_LEVEL: i64 = 3;
const LEVEL_UP_MS: i64 = 10_000;

/// Random candidates tried per relocation before falling back to a computed slot.
const RELOCATE_ATTEMPTS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    MoveLeft,
    MoveRight,
    Restart,
    Quit,
}

/// Per-tick state machine: one player car, three obstacle cars, the clock and
/// the best time.
pub(crate) struct GameLoop<S: KeyValueStore> {
    geo: Geometry,
    player: Vehicle,
    obstacles: [Vehicle; 3],
    phase: Phase,
    elapsed_ms: i64,
    level: i64,
    final_seconds: f64,
    record_seconds: f64,
    store: S,
    rng: SmallRng,
}

impl<S: KeyValueStore> GameLoop<S> {
    pub(crate) fn new(geo: Geometry, store: S, seed: u64) -> Self {
        let record_seconds = store.get_f64(RECORD_KEY).unwrap_or(0.0);
        log::info!("loaded record time {record_seconds:.2}s");

        let (px, py) = geo.player_start();
        let obstacles = geo.lane_xs().map(|x| Vehicle::new(x, 0, SpriteId::Obstacle));
        let mut game = Self {
            geo,
            player: Vehicle::new(px, py, SpriteId::Player),
            obstacles,
            phase: Phase::Running,
            elapsed_ms: 0,
            level: INITIAL_LEVEL,
            final_seconds: 0.0,
            record_seconds,
            store,
            rng: SmallRng::seed_from_u64(seed),
        };
        game.place_obstacles();
        game
    }

    pub(crate) fn geometry(&self) -> &Geometry {
        &self.geo
    }

    pub(crate) fn player(&self) -> &Vehicle {
        &self.player
    }

    pub(crate) fn obstacles(&self) -> &[Vehicle; 3] {
        &self.obstacles
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn is_over(&self) -> bool {
        !matches!(self.phase(), Phase::Running)
    }

    pub(crate) fn show_end_text(&self) -> bool {
        matches!(self.phase(), Phase::Ended)
    }

    pub(crate) fn elapsed_ms(&self) -> i64 {
        self.elapsed_ms
    }

    pub(crate) fn elapsed_seconds(&self) -> f64 {
        self.elapsed_ms() as f64 / 1000.0
    }

    pub(crate) fn level(&self) -> i64 {
        self.level
    }

    pub(crate) fn final_seconds(&self) -> f64 {
        self.final_seconds
    }

    pub(crate) fn record_seconds(&self) -> f64 {
        self.record_seconds
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::MoveLeft => self.move_left(),
            Command::MoveRight => self.move_right(),
            Command::Restart => self.restart(),
            Command::Quit => {}
        }
    }

    pub(crate) fn move_left(&mut self) {
        self.shift_player(-self.geo.move_step());
    }

    pub(crate) fn move_right(&mut self) {
        self.shift_player(self.geo.move_step());
    }

    fn shift_player(&mut self, dx: i32) {
        if self.is_over() {
            return;
        }
        let target = self.player.x() + dx;
        if self.geo.x_in_range(target) {
            self.player.move_by(dx, 0);
        } else {
            log::debug!("move to x={target} rejected, out of range");
        }
    }

    /// Advances the game by `delta_ms` of wall time.
    pub(crate) fn tick(&mut self, delta_ms: i64) {
        match self.phase {
            Phase::Running => self.tick_running(delta_ms),
            Phase::Crashed { end_screen_in_ms } => {
                let left = end_screen_in_ms - delta_ms.max(0);
                if left <= 0 {
                    self.phase = Phase::Ended;
                    log::info!("showing end screen");
                } else {
                    self.phase = Phase::Crashed {
                        end_screen_in_ms: left,
                    };
                }
            }
            Phase::Ended => {}
        }
    }

    fn tick_running(&mut self, delta_ms: i64) {
        self.level = BASE_LEVEL + 2 * self.elapsed_ms / LEVEL_UP_MS;

        for car in &mut self.obstacles {
            car.advance(self.level, &self.geo, &mut self.rng);
        }

        self.resolve_lanes();

        if self.check_collision() {
            self.crash();
            return;
        }

        self.elapsed_ms += delta_ms.max(0);
    }

    fn crash(&mut self) {
        self.player.set_sprite(SpriteId::Crashed);
        self.final_seconds = self.elapsed_ms as f64 / 1000.0;
        log::info!(
            "crash at x={} after {:.2}s (level {})",
            self.player.x(),
            self.final_seconds,
            self.level
        );

        if self.final_seconds > self.record_seconds {
            self.record_seconds = self.final_seconds;
            log::info!("new record {:.2}s", self.record_seconds);
            if let Err(e) = self.store.set_f64(RECORD_KEY, self.record_seconds) {
                log::error!("failed to persist record time: {e:#}");
            }
        }

        self.phase = Phase::Crashed {
            end_screen_in_ms: END_SCREEN_DELAY_MS,
        };
    }

    pub(crate) fn check_collision(&self) -> bool {
        let me = self.player.hit_box(&self.geo, HIT_PADDING);
        self.obstacles
            .iter()
            .any(|o| me.intersects(&o.hit_box(&self.geo, HIT_PADDING)))
    }

    /// Full reset back to `Running`. Ignored while a run is in progress.
    pub(crate) fn restart(&mut self) {
        if !self.is_over() {
            return;
        }
        self.phase = Phase::Running;
        self.elapsed_ms = 0;
        self.level = INITIAL_LEVEL;
        self.final_seconds = 0.0;

        let (px, py) = self.geo.player_start();
        self.player.set_position(px, py);
        self.player.set_sprite(SpriteId::Player);
        self.place_obstacles();
        log::info!("restarted");
    }

    /// Resets the stored best time to zero.
    pub(crate) fn reset_record(&mut self) {
        self.record_seconds = 0.0;
        if let Err(e) = self.store.set_f64(RECORD_KEY, 0.0) {
            log::error!("failed to reset record time: {e:#}");
        }
    }

    fn place_obstacles(&mut self) {
        let xs = self.geo.lane_xs();
        for (car, x) in self.obstacles.iter_mut().zip(xs) {
            car.set_x(x);
            car.set_y(wrap_y(&self.geo, &mut self.rng));
        }
        self.resolve_lanes();
    }

    fn conflicts(&self, i: usize, y: i32) -> usize {
        let spacing = self.geo.lane_spacing();
        self.obstacles
            .iter()
            .enumerate()
            .filter(|&(j, o)| j != i && (o.y() - y).abs() < spacing)
            .count()
    }

    /// Index of the obstacle to relocate: the topmost one that takes part in a
    /// spacing violation, lowest index on ties.
    fn relocation_victim(&self) -> Option<usize> {
        (0..self.obstacles.len())
            .filter(|&i| self.conflicts(i, self.obstacles[i].y()) > 0)
            .min_by_key(|&i| (self.obstacles[i].y(), i))
    }

    /// Pushes obstacles apart until every pair is at least `lane_spacing` apart.
    /// Each relocation leaves the moved obstacle conflict-free, so the number of
    /// violating pairs strictly drops and the loop ends.
    pub(crate) fn resolve_lanes(&mut self) {
        while let Some(i) = self.relocation_victim() {
            let y = self.pick_relocation(i);
            log::debug!("obstacle {} relocated from y={} to y={y}", i + 1, self.obstacles[i].y());
            self.obstacles[i].set_y(y);
        }
    }

    fn pick_relocation(&mut self, i: usize) -> i32 {
        for _ in 0..RELOCATE_ATTEMPTS {
            let y = relocate_y(&self.geo, &mut self.rng);
            if self.conflicts(i, y) == 0 {
                return y;
            }
        }
        let highest_other = self
            .obstacles
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, o)| o.y())
            .min()
            .unwrap_or(0);
        (highest_other - self.geo.lane_spacing()).min(-self.geo.vehicle_h - RELOCATE_OFFSET)
    }

    #[cfg(test)]
    pub(crate) fn obstacles_mut(&mut self) -> &mut [Vehicle; 3] {
        &mut self.obstacles
    }

    #[cfg(test)]
    pub(crate) fn player_mut(&mut self) -> &mut Vehicle {
        &mut self.player
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const TICK: i64 = 16;

    /// Store whose writes always fail, e.g. a read-only data dir.
    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get_f64(&self, _key: &str) -> Option<f64> {
            Some(0.05)
        }

        fn set_f64(&mut self, key: &str, _value: f64) -> anyhow::Result<()> {
            anyhow::bail!("{key}: disk is read-only")
        }
    }

    fn game(seed: u64) -> GameLoop<MemoryStore> {
        GameLoop::new(Geometry::default(), MemoryStore::default(), seed)
    }

    fn assert_spaced(g: &GameLoop<MemoryStore>) {
        let spacing = g.geometry().lane_spacing();
        let ys: Vec<i32> = g.obstacles().iter().map(|o| o.y()).collect();
        for a in 0..ys.len() {
            for b in (a + 1)..ys.len() {
                assert!(
                    (ys[a] - ys[b]).abs() >= spacing,
                    "obstacles {a} and {b} too close: {ys:?}"
                );
            }
        }
    }

    /// Parks every obstacle far above the road so nothing can hit the player.
    fn clear_road<S: KeyValueStore>(g: &mut GameLoop<S>) {
        for (k, o) in g.obstacles_mut().iter_mut().enumerate() {
            o.set_y(-100_000 - 1_000 * k as i32);
        }
    }

    fn crash_now<S: KeyValueStore>(g: &mut GameLoop<S>) {
        let (px, py) = (g.player().x(), g.player().y());
        let far = [-50_000, -60_000];
        let obs = g.obstacles_mut();
        obs[0].set_position(px, py - 5);
        obs[1].set_y(far[0]);
        obs[2].set_y(far[1]);
        g.tick(TICK);
        assert!(g.is_over());
    }

    #[test]
    fn starts_running_with_spaced_offscreen_obstacles() {
        for seed in 0..100 {
            let g = game(seed);
            assert_eq!(g.phase(), Phase::Running);
            assert_eq!(g.level(), INITIAL_LEVEL);
            assert_eq!(g.elapsed_ms(), 0);
            assert!(!g.show_end_text());
            assert_spaced(&g);
            for o in g.obstacles() {
                assert!(o.y() < -g.geometry().vehicle_h);
            }
        }
    }

    #[test]
    fn level_follows_elapsed_time() {
        let mut g = game(7);
        for step in 0..2_000 {
            clear_road(&mut g);
            let before = g.elapsed_ms();
            g.tick(TICK);
            assert_eq!(g.level(), 3 + 2 * before / 10_000, "step {step}");
        }
        assert_eq!(g.elapsed_ms(), 2_000 * TICK);
        assert_eq!(g.level(), 9);
    }

    #[test]
    fn obstacles_move_down_by_level() {
        let mut g = game(11);
        let ys: Vec<i32> = g.obstacles().iter().map(|o| o.y()).collect();
        g.tick(TICK);
        for (o, y) in g.obstacles().iter().zip(ys) {
            assert_eq!(o.y(), y + 3);
        }
    }

    #[test]
    fn lanes_stay_spaced_through_long_runs() {
        for seed in 0..20 {
            let mut g = game(seed);
            for _ in 0..3_000 {
                g.tick(TICK);
                assert_spaced(&g);
                if g.is_over() {
                    g.tick(END_SCREEN_DELAY_MS);
                    g.restart();
                }
            }
        }
    }

    #[test]
    fn resolve_relocates_topmost_conflicting_obstacle() {
        let mut g = game(5);
        {
            let obs = g.obstacles_mut();
            obs[0].set_y(-100_000);
            obs[1].set_y(100);
            obs[2].set_y(300);
        }
        g.resolve_lanes();
        assert_eq!(g.obstacles()[0].y(), -100_000);
        assert_eq!(g.obstacles()[2].y(), 300);
        assert!(g.obstacles()[1].y() < -g.geometry().vehicle_h);
        assert_spaced(&g);
    }

    #[test]
    fn resolve_breaks_ties_by_index() {
        let mut g = game(9);
        {
            let obs = g.obstacles_mut();
            obs[0].set_y(200);
            obs[1].set_y(-100_000);
            obs[2].set_y(200);
        }
        g.resolve_lanes();
        assert_eq!(g.obstacles()[2].y(), 200);
        assert_ne!(g.obstacles()[0].y(), 200);
        assert_spaced(&g);
    }

    #[test]
    fn resolve_terminates_when_random_slots_are_all_taken() {
        let mut g = game(13);
        {
            // Others sit inside the whole random relocation band.
            let obs = g.obstacles_mut();
            obs[0].set_y(-1_000);
            obs[1].set_y(-1_000);
            obs[2].set_y(-1_000);
        }
        g.resolve_lanes();
        assert_spaced(&g);
    }

    #[test]
    fn move_left_and_right_by_a_third_of_the_window() {
        let mut g = game(1);
        assert_eq!(g.player().x(), 150);
        g.move_right();
        assert_eq!(g.player().x(), 283);
        g.move_right();
        assert_eq!(g.player().x(), 283);
        g.move_left();
        g.move_left();
        assert_eq!(g.player().x(), 17);
        g.move_left();
        assert_eq!(g.player().x(), 17);
    }

    #[test]
    fn move_right_rejected_when_it_would_leave_the_road() {
        let mut g = game(1);
        g.player_mut().set_x(200);
        g.move_right();
        assert_eq!(g.player().x(), 200);
        g.apply(Command::MoveLeft);
        assert_eq!(g.player().x(), 67);
    }

    #[test]
    fn collision_uses_padded_hit_box() {
        let mut g = game(2);
        let (px, py) = (g.player().x(), g.player().y());
        let vw = g.geometry().vehicle_w;
        let obs = g.obstacles_mut();
        obs[1].set_y(-50_000);
        obs[2].set_y(-60_000);

        // Sprites overlap by 20px sideways, hit boxes do not.
        obs[0].set_position(px + vw - 20, py);
        assert!(!g.check_collision());

        g.obstacles_mut()[0].set_position(px + vw - 40, py);
        assert!(g.check_collision());
    }

    #[test]
    fn crash_freezes_the_road() {
        let mut g = game(3);
        crash_now(&mut g);
        assert_eq!(g.player().sprite(), SpriteId::Crashed);
        assert!(matches!(g.phase(), Phase::Crashed { .. }));

        let ys: Vec<i32> = g.obstacles().iter().map(|o| o.y()).collect();
        let elapsed = g.elapsed_ms();
        for _ in 0..10 {
            g.tick(TICK);
        }
        let after: Vec<i32> = g.obstacles().iter().map(|o| o.y()).collect();
        assert_eq!(ys, after);
        assert_eq!(g.elapsed_ms(), elapsed);

        let x = g.player().x();
        g.move_left();
        assert_eq!(g.player().x(), x);
    }

    #[test]
    fn end_screen_appears_after_delay() {
        let mut g = game(4);
        crash_now(&mut g);
        g.tick(END_SCREEN_DELAY_MS - 1);
        assert!(!g.show_end_text());
        g.tick(1);
        assert!(g.show_end_text());
        assert_eq!(g.phase(), Phase::Ended);
    }

    #[test]
    fn final_time_and_new_record_are_persisted() {
        let mut g = game(6);
        for _ in 0..100 {
            clear_road(&mut g);
            g.tick(TICK);
        }
        crash_now(&mut g);
        assert_eq!(g.final_seconds(), 1.6);
        assert_eq!(g.record_seconds(), 1.6);
        assert_eq!(g.store().get_f64(RECORD_KEY), Some(1.6));
    }

    #[test]
    fn shorter_run_leaves_record_untouched() {
        let mut store = MemoryStore::default();
        store.set_f64(RECORD_KEY, 99.0).unwrap();
        let mut g = GameLoop::new(Geometry::default(), store, 8);
        assert_eq!(g.record_seconds(), 99.0);
        clear_road(&mut g);
        g.tick(TICK);
        crash_now(&mut g);
        assert_eq!(g.final_seconds(), 0.016);
        assert_eq!(g.record_seconds(), 99.0);
        assert_eq!(g.store().get_f64(RECORD_KEY), Some(99.0));
    }

    #[test]
    fn equal_time_is_not_a_new_record() {
        let mut store = MemoryStore::default();
        store.set_f64(RECORD_KEY, 0.0).unwrap();
        let mut g = GameLoop::new(Geometry::default(), store, 8);
        crash_now(&mut g);
        assert_eq!(g.final_seconds(), 0.0);
        assert_eq!(g.store().get_f64(RECORD_KEY), Some(0.0));
    }

    #[test]
    fn restart_resets_everything() {
        let mut g = game(10);
        for _ in 0..50 {
            clear_road(&mut g);
            g.tick(TICK);
        }
        g.move_left();
        crash_now(&mut g);
        g.tick(END_SCREEN_DELAY_MS);
        g.apply(Command::Restart);

        assert_eq!(g.phase(), Phase::Running);
        assert!(!g.is_over());
        assert_eq!(g.elapsed_ms(), 0);
        assert_eq!(g.final_seconds(), 0.0);
        assert_eq!(g.player().x(), 150);
        assert_eq!(g.player().sprite(), SpriteId::Player);
        assert_spaced(&g);
        for o in g.obstacles() {
            assert!(o.y() < -g.geometry().vehicle_h);
        }
        assert_eq!(g.record_seconds(), 0.8);
    }

    #[test]
    fn restart_before_end_screen_drops_the_pending_flip() {
        let mut g = game(12);
        crash_now(&mut g);
        g.tick(500);
        g.restart();
        assert_eq!(g.phase(), Phase::Running);
        for _ in 0..200 {
            clear_road(&mut g);
            g.tick(TICK);
            assert!(!g.show_end_text());
        }
    }

    #[test]
    fn restart_is_ignored_while_running() {
        let mut g = game(14);
        clear_road(&mut g);
        g.tick(TICK);
        g.restart();
        assert_eq!(g.elapsed_ms(), TICK);
    }

    #[test]
    fn reset_record_clears_store() {
        let mut store = MemoryStore::default();
        store.set_f64(RECORD_KEY, 12.0).unwrap();
        let mut g = GameLoop::new(Geometry::default(), store, 1);
        g.reset_record();
        assert_eq!(g.record_seconds(), 0.0);
        assert_eq!(g.store().get_f64(RECORD_KEY), Some(0.0));
    }

    #[test]
    fn failed_record_write_keeps_the_game_going() {
        let mut g = GameLoop::new(Geometry::default(), FailingStore, 21);
        assert_eq!(g.record_seconds(), 0.05);
        for _ in 0..10 {
            clear_road(&mut g);
            g.tick(TICK);
        }
        crash_now(&mut g);

        assert!(matches!(g.phase(), Phase::Crashed { .. }));
        assert_eq!(g.final_seconds(), 0.16);
        assert_eq!(g.record_seconds(), g.final_seconds());

        g.tick(END_SCREEN_DELAY_MS);
        assert!(g.show_end_text());
        g.restart();
        assert_eq!(g.phase(), Phase::Running);
        assert_eq!(g.record_seconds(), 0.16);
    }

    #[test]
    fn failed_record_reset_still_clears_in_memory() {
        let mut g = GameLoop::new(Geometry::default(), FailingStore, 22);
        g.reset_record();
        assert_eq!(g.record_seconds(), 0.0);
        clear_road(&mut g);
        g.tick(TICK);
        assert_eq!(g.phase(), Phase::Running);
    }
}
