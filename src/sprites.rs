use crate::model::SpriteId;
use crossterm::style::Color;
use std::{
    fs,
    path::{Path, PathBuf},
};

const PLAYER_ART: &[&str] = &[
    " /##\\ ",
    "|o##o|",
    "| ## |",
    "|####|",
    "|o##o|",
    " \\##/ ",
];

const CRASHED_ART: &[&str] = &[
    " *##* ",
    "|x#*x|",
    "|*##*|",
    "|#**#|",
    "|x##x|",
    " *##* ",
];

const OBSTACLE_ART: &[&str] = &[
    " /==\\ ",
    "|o==o|",
    "|[  ]|",
    "| == |",
    "|o==o|",
    " \\==/ ",
];

/// Text-art bitmap. Spaces are transparent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Sprite {
    rows: Vec<Vec<char>>,
    width: usize,
    pub(crate) color: Color,
}

impl Sprite {
    pub(crate) fn parse(text: &str, color: Color) -> Option<Self> {
        let rows: Vec<Vec<char>> = text
            .lines()
            .map(|l| l.trim_end_matches('\r').chars().collect())
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return None;
        }
        Some(Self { rows, width, color })
    }

    pub(crate) fn width(&self) -> usize {
        self.width
    }

    pub(crate) fn height(&self) -> usize {
        self.rows.len()
    }

    /// Nearest-neighbour sample of the art stretched over a `w`×`h` box.
    pub(crate) fn sample(&self, cx: i32, cy: i32, w: i32, h: i32) -> Option<char> {
        if w <= 0 || h <= 0 || cx < 0 || cy < 0 || cx >= w || cy >= h {
            return None;
        }
        let sx = (cx as usize * self.width) / w as usize;
        let sy = (cy as usize * self.rows.len()) / h as usize;
        match self.rows.get(sy).and_then(|r| r.get(sx)) {
            Some(' ') | None => None,
            Some(&ch) => Some(ch),
        }
    }
}

pub(crate) struct SpriteSheet {
    dir: Option<PathBuf>,
    player: Sprite,
    crashed: Sprite,
    obstacle: Sprite,
}

fn builtin(id: SpriteId) -> Sprite {
    let (art, color) = match id {
        SpriteId::Player => (PLAYER_ART, Color::Rgb { r: 120, g: 200, b: 255 }),
        SpriteId::Crashed => (CRASHED_ART, Color::Rgb { r: 255, g: 120, b: 60 }),
        SpriteId::Obstacle => (OBSTACLE_ART, Color::Rgb { r: 255, g: 220, b: 120 }),
    };
    Sprite::parse(&art.join("\n"), color).unwrap_or(Sprite {
        rows: vec![vec!['#']],
        width: 1,
        color,
    })
}

fn file_name(id: SpriteId) -> &'static str {
    match id {
        SpriteId::Player => "player.txt",
        SpriteId::Crashed => "crashed.txt",
        SpriteId::Obstacle => "obstacle.txt",
    }
}

impl SpriteSheet {
    pub(crate) fn builtin() -> Self {
        Self {
            dir: None,
            player: builtin(SpriteId::Player),
            crashed: builtin(SpriteId::Crashed),
            obstacle: builtin(SpriteId::Obstacle),
        }
    }

    /// Loads art from `dir`, keeping the built-in art for anything that fails.
    pub(crate) fn load(dir: Option<&Path>) -> Self {
        let mut sheet = Self::builtin();
        sheet.dir = dir.map(Path::to_path_buf);
        for id in [SpriteId::Player, SpriteId::Crashed, SpriteId::Obstacle] {
            sheet.reload(id);
        }
        sheet
    }

    /// Re-reads the player art; called on restart.
    pub(crate) fn reload_player(&mut self) {
        self.reload(SpriteId::Player);
    }

    fn reload(&mut self, id: SpriteId) {
        let Some(dir) = &self.dir else {
            return;
        };
        let path = dir.join(file_name(id));
        let color = self.get(id).color;
        let loaded = match fs::read_to_string(&path) {
            Ok(text) => Sprite::parse(&text, color),
            Err(e) => {
                log::warn!("failed to load sprite {}: {e}", path.display());
                return;
            }
        };
        match loaded {
            Some(sprite) => {
                log::debug!(
                    "loaded sprite {} ({}x{})",
                    path.display(),
                    sprite.width(),
                    sprite.height()
                );
                *self.get_mut(id) = sprite;
            }
            None => log::warn!("sprite {} is empty, keeping previous art", path.display()),
        }
    }

    pub(crate) fn get(&self, id: SpriteId) -> &Sprite {
        match id {
            SpriteId::Player => &self.player,
            SpriteId::Crashed => &self.crashed,
            SpriteId::Obstacle => &self.obstacle,
        }
    }

    fn get_mut(&mut self, id: SpriteId) -> &mut Sprite {
        match id {
            SpriteId::Player => &mut self.player,
            SpriteId::Crashed => &mut self.crashed,
            SpriteId::Obstacle => &mut self.obstacle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_empty_art() {
        assert!(Sprite::parse("", Color::White).is_none());
        assert!(Sprite::parse("\n\n", Color::White).is_none());
    }

    #[test]
    fn sample_stretches_and_keeps_transparency() {
        let s = Sprite::parse("ab\nc ", Color::White).unwrap();
        assert_eq!(s.width(), 2);
        assert_eq!(s.height(), 2);
        assert_eq!(s.sample(0, 0, 4, 4), Some('a'));
        assert_eq!(s.sample(3, 1, 4, 4), Some('b'));
        assert_eq!(s.sample(1, 3, 4, 4), Some('c'));
        assert_eq!(s.sample(3, 3, 4, 4), None);
        assert_eq!(s.sample(4, 0, 4, 4), None);
    }

    #[test]
    fn missing_asset_dir_keeps_builtin_art() {
        let dir = std::env::temp_dir().join("roadrush-no-such-assets");
        let sheet = SpriteSheet::load(Some(&dir));
        assert_eq!(sheet.get(SpriteId::Player), &builtin(SpriteId::Player));
        assert_eq!(sheet.get(SpriteId::Obstacle), &builtin(SpriteId::Obstacle));
    }

    #[test]
    fn asset_files_override_builtin_art() {
        let dir = std::env::temp_dir().join(format!("roadrush-assets-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("player.txt"), "AB\nCD\n").unwrap();
        fs::write(dir.join("crashed.txt"), "").unwrap();

        let mut sheet = SpriteSheet::load(Some(&dir));
        assert_eq!(sheet.get(SpriteId::Player).sample(0, 0, 2, 2), Some('A'));
        assert_eq!(sheet.get(SpriteId::Crashed), &builtin(SpriteId::Crashed));

        fs::write(dir.join("player.txt"), "Z").unwrap();
        sheet.reload_player();
        assert_eq!(sheet.get(SpriteId::Player).sample(1, 1, 2, 2), Some('Z'));

        fs::remove_file(dir.join("player.txt")).unwrap();
        sheet.reload_player();
        assert_eq!(sheet.get(SpriteId::Player).sample(0, 0, 2, 2), Some('Z'));

        let _ = fs::remove_dir_all(&dir);
    }
}
