use crate::config::{load_settings, save_settings_atomic, Paths, Settings};
use crate::input::{collect_input_nonblocking, map_event_to_command};
use crate::model::Geometry;
use crate::render::{
    draw_end_screen, draw_hud, draw_road, draw_too_small, draw_vehicle, fit_view, Palette,
    Terminal,
};
use crate::sim::{Command, GameLoop};
use crate::sprites::SpriteSheet;
use crate::storage::JsonFileStore;
use crate::Args;
use crossterm::style::Color;
use std::time::{Duration, Instant};

/// Longest frame fed to the fixed-step accumulator; longer stalls are dropped.
const MAX_FRAME: Duration = Duration::from_millis(100);

pub(crate) struct App {
    /// What goes back to disk; CLI overrides only live in `session`.
    settings: Settings,
    session: Settings,
    paths: Paths,
    game: GameLoop<JsonFileStore>,
    sprites: SpriteSheet,
    palette: Palette,
    term: Terminal,
    road_scroll: i64,
    should_quit: bool,
}

impl App {
    fn init(args: &Args, paths: Paths) -> anyhow::Result<Self> {
        let settings = load_settings(&paths.settings_path);

        let mut session = settings.clone();
        if let Some(seed) = args.seed {
            session.seed = seed;
        }
        if let Some(fps) = args.fps {
            session.fps_cap = fps;
        }
        if let Some(dir) = &args.assets {
            session.asset_dir = Some(dir.clone());
        }
        if args.no_color {
            session.enable_color = false;
        }

        let seed = if session.seed == 0 {
            rand::random()
        } else {
            session.seed
        };
        log::info!("starting with seed {seed:#x}");

        let store = JsonFileStore::open(&paths.record_path);
        let mut game = GameLoop::new(Geometry::default(), store, seed);
        if args.reset_record {
            game.reset_record();
        }

        let sprites = SpriteSheet::load(session.asset_dir.as_deref());
        let palette = Palette::new(session.enable_color);
        let term = Terminal::begin()?;

        Ok(Self {
            settings,
            session,
            paths,
            game,
            sprites,
            palette,
            term,
            road_scroll: 0,
            should_quit: false,
        })
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let fps = self.session.fps_cap.clamp(10, 240);
        let frame_dt = Duration::from_secs_f32(1.0 / fps as f32);
        let tick_ms = self.session.tick_ms.max(1);
        let sim_step = Duration::from_millis(tick_ms);

        let mut last_frame = Instant::now();
        let mut sim_accum = Duration::ZERO;

        while !self.should_quit {
            let frame_start = Instant::now();
            self.term.resize_if_needed()?;

            for ev in collect_input_nonblocking(frame_dt)? {
                match map_event_to_command(&ev) {
                    Some(Command::Quit) => {
                        self.should_quit = true;
                        break;
                    }
                    Some(Command::Restart) => self.restart(),
                    Some(cmd) => self.game.apply(cmd),
                    None => {}
                }
            }

            let now = Instant::now();
            let real_dt = now.saturating_duration_since(last_frame).min(MAX_FRAME);
            last_frame = now;
            sim_accum = sim_accum.saturating_add(real_dt);

            while sim_accum >= sim_step {
                self.game.tick(tick_ms as i64);
                if !self.game.is_over() {
                    self.road_scroll += self.game.level();
                }
                sim_accum = sim_accum.saturating_sub(sim_step);
            }

            self.render_frame()?;

            spin_sleep(frame_dt, frame_start);
        }

        Ok(())
    }

    fn restart(&mut self) {
        if !self.game.is_over() {
            return;
        }
        self.game.restart();
        self.sprites.reload_player();
        self.road_scroll = 0;
    }

    fn render_frame(&mut self) -> anyhow::Result<()> {
        let geo = *self.game.geometry();
        let pal = self.palette;
        let buf = &mut self.term.cur;

        match fit_view(self.term.cols, self.term.rows, &geo) {
            None => draw_too_small(buf),
            Some(vp) if self.game.show_end_text() => {
                buf.clear(Color::Black);
                draw_end_screen(
                    buf,
                    &vp,
                    self.game.final_seconds(),
                    self.game.record_seconds(),
                    &pal,
                );
            }
            Some(vp) => {
                draw_road(buf, &vp, &geo, self.road_scroll, &pal);
                for car in self.game.obstacles() {
                    draw_vehicle(buf, &vp, &geo, car, self.sprites.get(car.sprite()), &pal);
                }
                let player = self.game.player();
                draw_vehicle(buf, &vp, &geo, player, self.sprites.get(player.sprite()), &pal);
                draw_hud(
                    buf,
                    &vp,
                    self.game.elapsed_seconds(),
                    self.game.record_seconds(),
                    &pal,
                );
            }
        }

        self.term.present(true)?;
        Ok(())
    }

    fn save_settings(&self) {
        if let Err(e) = save_settings_atomic(&self.paths.settings_path, &self.settings) {
            log::error!("failed to save settings: {e:#}");
        }
    }
}

pub(crate) fn run(args: &Args, paths: Paths) -> anyhow::Result<()> {
    let mut app = App::init(args, paths)?;
    let res = app.run();
    let restored = app.term.end();
    app.save_settings();
    if let Err(e) = &res {
        log::error!("game loop failed: {e:#}");
    }
    res?;
    restored?;
    log::info!("best time {:.2}s", app.game.record_seconds());
    Ok(())
}

/* -----------------------------
   Frame pacing helper
------------------------------ */

fn spin_sleep(target: Duration, start: Instant) {
    let end = start + target;
    loop {
        let t = Instant::now();
        if t >= end {
            break;
        }
        let left = end - t;
        if left > Duration::from_millis(2) {
            std::thread::sleep(Duration::from_millis(1));
        } else {
            std::hint::spin_loop();
        }
    }
}
