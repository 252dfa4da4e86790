use crate::model::{Geometry, Vehicle};
use crate::sprites::Sprite;
use anyhow::Context;
use crossterm::{
    cursor, execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, BeginSynchronizedUpdate, Clear, ClearType, DisableLineWrap, EnableLineWrap,
        EndSynchronizedUpdate, EnterAlternateScreen, LeaveAlternateScreen,
    },
};
use std::io::{self, Write};

const MIN_PX_PER_COL: i32 = 10;
const MIN_PX_PER_ROW: i32 = 20;
const MIN_VEHICLE_CELLS: i32 = 3;

const DASH_PERIOD_PX: i64 = 100;
const DASH_LEN_PX: i64 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) ch: char,
    pub(crate) fg: Color,
    pub(crate) bg: Color,
    pub(crate) bold: bool,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            fg: Color::White,
            bg: Color::Black,
            bold: false,
        }
    }
}

pub(crate) struct CellBuffer {
    pub(crate) w: u16,
    pub(crate) h: u16,
    pub(crate) cells: Vec<Cell>,
}

impl CellBuffer {
    pub(crate) fn new(w: u16, h: u16) -> Self {
        Self {
            w,
            h,
            cells: vec![Cell::default(); (w as usize) * (h as usize)],
        }
    }

    pub(crate) fn idx(&self, x: u16, y: u16) -> usize {
        (y as usize) * (self.w as usize) + (x as usize)
    }

    pub(crate) fn get(&self, x: u16, y: u16) -> Option<Cell> {
        if x < self.w && y < self.h {
            Some(self.cells[self.idx(x, y)])
        } else {
            None
        }
    }

    pub(crate) fn set(&mut self, x: u16, y: u16, c: Cell) {
        if x < self.w && y < self.h {
            let i = self.idx(x, y);
            self.cells[i] = c;
        }
    }

    /// Signed variant of `set` for coordinates that may fall off the buffer.
    pub(crate) fn put(&mut self, x: i32, y: i32, c: Cell) {
        if x >= 0 && y >= 0 && x <= u16::MAX as i32 && y <= u16::MAX as i32 {
            self.set(x as u16, y as u16, c);
        }
    }

    pub(crate) fn clear(&mut self, bg: Color) {
        for c in &mut self.cells {
            c.ch = ' ';
            c.fg = Color::White;
            c.bg = bg;
            c.bold = false;
        }
    }
}

pub(crate) struct Terminal {
    pub(crate) out: io::Stdout,
    pub(crate) cols: u16,
    pub(crate) rows: u16,
    pub(crate) prev: CellBuffer,
    pub(crate) cur: CellBuffer,
}

impl Terminal {
    pub(crate) fn begin() -> anyhow::Result<Self> {
        terminal::enable_raw_mode().context("enabling raw mode")?;
        let mut out = io::stdout();
        let size = enter_screen(&mut out)
            .context("entering alternate screen")
            .and_then(|()| terminal::size().context("reading terminal size"));
        let (cols, rows) = match size {
            Ok(size) => size,
            Err(e) => {
                let _ = leave_screen(&mut out);
                let _ = terminal::disable_raw_mode();
                return Err(e);
            }
        };

        Ok(Self {
            out,
            cols,
            rows,
            prev: CellBuffer::new(cols, rows),
            cur: CellBuffer::new(cols, rows),
        })
    }

    pub(crate) fn end(&mut self) -> anyhow::Result<()> {
        queue!(
            self.out,
            BeginSynchronizedUpdate,
            ResetColor,
            SetAttribute(Attribute::Reset),
            Clear(ClearType::All),
            cursor::Show,
            EnableLineWrap,
            EndSynchronizedUpdate,
            LeaveAlternateScreen
        )?;
        self.out.flush()?;
        terminal::disable_raw_mode()?;
        Ok(())
    }

    pub(crate) fn resize_if_needed(&mut self) -> anyhow::Result<bool> {
        let (c, r) = terminal::size()?;
        if c == self.cols && r == self.rows {
            return Ok(false);
        }
        self.cols = c;
        self.rows = r;
        self.prev = CellBuffer::new(c, r);
        self.cur = CellBuffer::new(c, r);
        // force a full repaint next present
        for cell in &mut self.prev.cells {
            cell.ch = '\0';
        }
        Ok(true)
    }

    pub(crate) fn present(&mut self, diff_only: bool) -> anyhow::Result<()> {
        queue!(self.out, BeginSynchronizedUpdate)?;

        let mut last_fg = None;
        let mut last_bg = None;
        let mut last_bold = None;

        for y in 0..self.rows {
            for x in 0..self.cols {
                let i = self.cur.idx(x, y);
                let c = self.cur.cells[i];
                if diff_only && c == self.prev.cells[i] {
                    continue;
                }

                queue!(self.out, cursor::MoveTo(x, y))?;

                if last_bold != Some(c.bold) {
                    let attr = if c.bold {
                        Attribute::Bold
                    } else {
                        Attribute::NormalIntensity
                    };
                    queue!(self.out, SetAttribute(attr))?;
                    last_bold = Some(c.bold);
                }
                if last_fg != Some(c.fg) {
                    queue!(self.out, SetForegroundColor(c.fg))?;
                    last_fg = Some(c.fg);
                }
                if last_bg != Some(c.bg) {
                    queue!(self.out, SetBackgroundColor(c.bg))?;
                    last_bg = Some(c.bg);
                }

                queue!(self.out, Print(c.ch))?;
            }
        }

        queue!(self.out, ResetColor, EndSynchronizedUpdate)?;
        self.out.flush()?;
        self.prev.cells.copy_from_slice(&self.cur.cells);
        Ok(())
    }
}

pub(crate) fn draw_text(buf: &mut CellBuffer, x: i32, y: i32, s: &str, fg: Color, bg: Color, bold: bool) {
    for (i, ch) in s.chars().enumerate() {
        buf.put(x + i as i32, y, Cell { ch, fg, bg, bold });
    }
}

fn draw_text_centered(buf: &mut CellBuffer, vp: &Viewport, y: i32, s: &str, fg: Color, bg: Color, bold: bool) {
    let len = s.chars().count() as i32;
    let x = vp.x0 + (vp.cols - len) / 2;
    draw_text(buf, x, y, s, fg, bg, bold);
}

/* -----------------------------
   Colours
------------------------------ */

#[derive(Clone, Copy)]
pub(crate) struct Palette {
    pub(crate) color: bool,
    outside_bg: Color,
    road_bg: Color,
    marking: Color,
    hud_fg: Color,
    hud_bg: Color,
    end_bg: Color,
    title_fg: Color,
}

impl Palette {
    pub(crate) fn new(color: bool) -> Self {
        if color {
            Self {
                color,
                outside_bg: Color::Rgb { r: 20, g: 60, b: 24 },
                road_bg: Color::Rgb { r: 48, g: 48, b: 52 },
                marking: Color::Rgb { r: 235, g: 235, b: 220 },
                hud_fg: Color::White,
                hud_bg: Color::Black,
                end_bg: Color::Black,
                title_fg: Color::Red,
            }
        } else {
            Self {
                color,
                outside_bg: Color::Black,
                road_bg: Color::Black,
                marking: Color::White,
                hud_fg: Color::White,
                hud_bg: Color::Black,
                end_bg: Color::Black,
                title_fg: Color::White,
            }
        }
    }
}

/* -----------------------------
   Logical px -> terminal cells
------------------------------ */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Viewport {
    pub(crate) x0: i32,
    pub(crate) y0: i32,
    pub(crate) cols: i32,
    pub(crate) rows: i32,
    pub(crate) px_per_col: i32,
    pub(crate) px_per_row: i32,
}

fn div_ceil(a: i32, b: i32) -> i32 {
    (a + b - 1) / b
}

/// Fits the playfield into the terminal, or `None` if cars would be unreadable.
pub(crate) fn fit_view(term_w: u16, term_h: u16, geo: &Geometry) -> Option<Viewport> {
    if term_w == 0 || term_h == 0 {
        return None;
    }
    let px_per_col = div_ceil(geo.window_w, term_w as i32).max(MIN_PX_PER_COL);
    let px_per_row = div_ceil(geo.window_h, term_h as i32).max(MIN_PX_PER_ROW);
    if geo.vehicle_w / px_per_col < MIN_VEHICLE_CELLS || geo.vehicle_h / px_per_row < MIN_VEHICLE_CELLS {
        return None;
    }
    let cols = div_ceil(geo.window_w, px_per_col);
    let rows = div_ceil(geo.window_h, px_per_row);
    Some(Viewport {
        x0: (term_w as i32 - cols) / 2,
        y0: (term_h as i32 - rows) / 2,
        cols,
        rows,
        px_per_col,
        px_per_row,
    })
}

impl Viewport {
    pub(crate) fn cell_x(&self, px: i32) -> i32 {
        self.x0 + px.div_euclid(self.px_per_col)
    }

    pub(crate) fn cell_y(&self, py: i32) -> i32 {
        self.y0 + py.div_euclid(self.px_per_row)
    }

    fn contains(&self, cx: i32, cy: i32) -> bool {
        cx >= self.x0 && cx < self.x0 + self.cols && cy >= self.y0 && cy < self.y0 + self.rows
    }
}

/* -----------------------------
   Scene
------------------------------ */

/// Road surface with dashed lane markings scrolled by `scroll_px`.
pub(crate) fn draw_road(buf: &mut CellBuffer, vp: &Viewport, geo: &Geometry, scroll_px: i64, pal: &Palette) {
    buf.clear(pal.outside_bg);

    let dividers = [
        vp.cell_x(geo.window_w / 3),
        vp.cell_x(2 * geo.window_w / 3),
    ];
    for ry in 0..vp.rows {
        let py = (ry * vp.px_per_row) as i64;
        let dash = (py - scroll_px).rem_euclid(DASH_PERIOD_PX) < DASH_LEN_PX;
        for rx in 0..vp.cols {
            let cx = vp.x0 + rx;
            let cy = vp.y0 + ry;
            let edge = rx == 0 || rx == vp.cols - 1;
            let ch = if edge {
                '│'
            } else if dash && dividers.contains(&cx) {
                '┆'
            } else {
                ' '
            };
            buf.put(
                cx,
                cy,
                Cell {
                    ch,
                    fg: pal.marking,
                    bg: pal.road_bg,
                    bold: false,
                },
            );
        }
    }
}

pub(crate) fn draw_vehicle(buf: &mut CellBuffer, vp: &Viewport, geo: &Geometry, v: &Vehicle, sprite: &Sprite, pal: &Palette) {
    let w = (geo.vehicle_w / vp.px_per_col).max(1);
    let h = (geo.vehicle_h / vp.px_per_row).max(1);
    let cx0 = vp.cell_x(v.x());
    let cy0 = vp.cell_y(v.y());
    let fg = if pal.color { sprite.color } else { Color::White };

    for dy in 0..h {
        for dx in 0..w {
            let (cx, cy) = (cx0 + dx, cy0 + dy);
            if !vp.contains(cx, cy) {
                continue;
            }
            if let Some(ch) = sprite.sample(dx, dy, w, h) {
                let bg = buf
                    .get(cx as u16, cy as u16)
                    .map(|c| c.bg)
                    .unwrap_or(pal.road_bg);
                buf.put(cx, cy, Cell { ch, fg, bg, bold: true });
            }
        }
    }
}

pub(crate) fn draw_hud(buf: &mut CellBuffer, vp: &Viewport, elapsed_s: f64, record_s: f64, pal: &Palette) {
    let time = format!(" Time: {elapsed_s:.2} ");
    draw_text(buf, vp.x0 + 1, vp.y0, &time, pal.hud_fg, pal.hud_bg, false);

    let best = format!(" Best: {record_s:.2} ");
    let x = vp.x0 + vp.cols - 1 - best.chars().count() as i32;
    if x > vp.x0 + 1 + time.chars().count() as i32 {
        draw_text(buf, x, vp.y0, &best, pal.hud_fg, pal.hud_bg, false);
    }
}

pub(crate) fn draw_end_screen(buf: &mut CellBuffer, vp: &Viewport, final_s: f64, record_s: f64, pal: &Palette) {
    for ry in 0..vp.rows {
        for rx in 0..vp.cols {
            buf.put(
                vp.x0 + rx,
                vp.y0 + ry,
                Cell {
                    bg: pal.end_bg,
                    ..Cell::default()
                },
            );
        }
    }

    let mid = vp.y0 + vp.rows / 2;
    draw_text_centered(buf, vp, mid - 2, "Game Over", pal.title_fg, pal.end_bg, true);
    draw_text_centered(buf, vp, mid, &format!("Time: {final_s:.2} s"), pal.hud_fg, pal.end_bg, false);
    draw_text_centered(buf, vp, mid + 1, &format!("Record: {record_s:.2} s"), pal.hud_fg, pal.end_bg, false);
    draw_text_centered(buf, vp, mid + 3, "R restart | Q quit", pal.hud_fg, pal.end_bg, false);
}

pub(crate) fn draw_too_small(buf: &mut CellBuffer) {
    buf.clear(Color::Black);
    draw_text(buf, 0, 0, "Terminal too small.", Color::White, Color::Black, false);
    draw_text(buf, 0, 1, "Enlarge it or press Q.", Color::White, Color::Black, false);
}

/// Switches to the alternate screen. On a write error the switch is undone
/// before the error is returned.
fn enter_screen<W: Write>(out: &mut W) -> io::Result<()> {
    let entered = execute!(
        out,
        EnterAlternateScreen,
        cursor::Hide,
        DisableLineWrap,
        Clear(ClearType::All)
    );
    if entered.is_err() {
        let _ = leave_screen(out);
    }
    entered
}

fn leave_screen<W: Write>(out: &mut W) -> io::Result<()> {
    execute!(out, cursor::Show, EnableLineWrap, LeaveAlternateScreen)
}
