use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{ExecutableCommand, QueueableCommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::{self, Stdout, Write};
use std::thread;
use std::time::{Duration, Instant};
use unicode_width::UnicodeWidthStr;

mod components;
mod game;
mod level;
mod monster;
mod path;
mod place;
mod player;

use components::{Dir, Phase, Pos, Tile};
use game::{Game, Rules, TickInput};
use monster::ALERT_CHASE_MIN;

const DEFAULT_GRID: usize = 21;
const MIN_GRID: usize = 9;
const MAX_GRID: usize = 61;
const CELL_W: usize = 2;
const DEFAULT_TICK_MS: u64 = 50;
const DEFAULT_RENDER_FPS: u64 = 120;
const INPUT_HOLD_MS: u64 = 160;

#[derive(Clone, Copy, PartialEq)]
enum Glyph {
    Player,
    Monster,
    Explosion,
    Rubble,
    BombArmed,
    BombPickup,
    Key,
    PowerUp,
    Exit,
    Wall,
    Floor,
    Trail,
    SafeFresh,
    SafeSpent,
    SpikeLive,
    SpikeDormant,
    Door,
    SwitchReady,
    SwitchSpent,
    Rotor,
}

#[derive(Clone, Copy, PartialEq)]
struct Cell {
    glyph: Glyph,
    color: Color,
}

struct Settings {
    tick_ms: u64,
    render_fps: u64,
    rules: Rules,
    seed: Option<u64>,
}

struct Renderer {
    last: Vec<Cell>,
    last_hud: String,
    last_banner: String,
    needs_full: bool,
    origin_x: u16,
    origin_y: u16,
}

impl Renderer {
    fn new(n: usize) -> Self {
        Self {
            last: vec![
                Cell {
                    glyph: Glyph::Floor,
                    color: Color::Reset,
                };
                n * n
            ],
            last_hud: String::new(),
            last_banner: String::new(),
            needs_full: true,
            origin_x: 0,
            origin_y: 1,
        }
    }
}

fn main() -> io::Result<()> {
    let mut stdout = io::stdout();
    terminal::enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;
    stdout.execute(Hide)?;

    let result = run(&mut stdout);

    stdout.execute(Show)?;
    stdout.execute(LeaveAlternateScreen)?;
    terminal::disable_raw_mode()?;
    result
}

fn run(stdout: &mut Stdout) -> io::Result<()> {
    let settings = read_settings();
    let mut rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut game = Game::new(settings.rules, &mut rng);
    let mut renderer = Renderer::new(settings.rules.size);
    let mut last_tick = Instant::now();
    let mut last_seen: [Option<Instant>; 4] = [None, None, None, None];
    let mut last_pressed: Option<Dir> = None;
    let mut bomb_queued = false;
    let frame_time = Duration::from_micros(1_000_000 / settings.render_fps.max(1));

    loop {
        let frame_start = Instant::now();
        while event::poll(Duration::from_millis(0))? {
            if let Event::Key(key) = event::read()? {
                match key.kind {
                    KeyEventKind::Press | KeyEventKind::Repeat => match key.code {
                        KeyCode::Char('q') => return Ok(()),
                        KeyCode::Char('r') => {
                            game.restart(&mut rng);
                            bomb_queued = false;
                            renderer.needs_full = true;
                        }
                        KeyCode::Up | KeyCode::Char('w') => {
                            last_seen[0] = Some(Instant::now());
                            last_pressed = Some(Dir::Up);
                        }
                        KeyCode::Down | KeyCode::Char('s') => {
                            last_seen[1] = Some(Instant::now());
                            last_pressed = Some(Dir::Down);
                        }
                        KeyCode::Left | KeyCode::Char('a') => {
                            last_seen[2] = Some(Instant::now());
                            last_pressed = Some(Dir::Left);
                        }
                        KeyCode::Right | KeyCode::Char('d') => {
                            last_seen[3] = Some(Instant::now());
                            last_pressed = Some(Dir::Right);
                        }
                        KeyCode::Char('b') | KeyCode::Char(' ') => {
                            // Edge-triggered: held keys must not spam
                            // placements.
                            if key.kind == KeyEventKind::Press {
                                bomb_queued = true;
                            }
                        }
                        _ => {}
                    },
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= Duration::from_millis(settings.tick_ms) {
            last_tick = Instant::now();
            let input = TickInput {
                dir: active_dir_recent(&last_seen, last_pressed),
                place_bomb: std::mem::take(&mut bomb_queued),
            };
            game.tick(&mut rng, input);
        }
        render(stdout, &game, &mut renderer, settings.tick_ms)?;

        let elapsed = frame_start.elapsed();
        if elapsed < frame_time {
            thread::sleep(frame_time - elapsed);
        }
    }
}

fn read_settings() -> Settings {
    let tick_ms = std::env::var("MAZESCAPE_TICK_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_TICK_MS);
    let render_fps = std::env::var("MAZESCAPE_FPS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_RENDER_FPS);
    let size = std::env::var("MAZESCAPE_SIZE")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .map(|v| v.clamp(MIN_GRID, MAX_GRID))
        .map(|v| if v % 2 == 0 { v - 1 } else { v })
        .unwrap_or(DEFAULT_GRID);
    let seed = std::env::var("MAZESCAPE_SEED")
        .ok()
        .and_then(|v| v.parse::<u64>().ok());
    let hardcore = std::env::var("MAZESCAPE_HARDCORE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    Settings {
        tick_ms,
        render_fps,
        rules: Rules { size, hardcore },
        seed,
    }
}

fn render(stdout: &mut Stdout, game: &Game, renderer: &mut Renderer, tick_ms: u64) -> io::Result<()> {
    let n = game.level.n;
    let needed_h = (n + 3) as u16;
    let needed_w = (n * CELL_W) as u16;

    stdout.queue(MoveTo(0, 0))?;

    let (term_w, term_h) = terminal::size()?;
    if term_w < needed_w || term_h < needed_h {
        stdout.queue(Clear(ClearType::All))?;
        let msg = format!(
            "Terminal too small. Need at least {}x{} (cols x rows). Current: {}x{}.",
            needed_w, needed_h, term_w, term_h
        );
        stdout.queue(Print(msg))?;
        stdout.flush()?;
        renderer.needs_full = true;
        return Ok(());
    }

    let origin_x = (term_w - needed_w) / 2;
    let origin_y = (term_h - needed_h) / 2 + 1;
    if origin_x != renderer.origin_x || origin_y != renderer.origin_y {
        renderer.origin_x = origin_x;
        renderer.origin_y = origin_y;
        renderer.needs_full = true;
    }

    let secs = game.ticks * tick_ms / 1000;
    let bomb = if game.player.has_bomb { "  [bomb]" } else { "" };
    let haste = match game.player.power_remaining(game.ticks) {
        Some(left) if left > 0 => format!("  [haste {}s]", (left * tick_ms + 999) / 1000),
        _ => String::new(),
    };
    let dist = match game.monster_distance() {
        Some(d) => d.to_string(),
        None => "-".to_string(),
    };
    let hud = format!(
        "Keys: {}/{}  Deaths: {}  Time: {}s  Alert: {}  Dist: {}  Speed: x{:.1}{}{}  (r restart, q quit)",
        game.player.keys,
        game.keys_required(),
        game.deaths,
        secs,
        game.monster.alert,
        dist,
        game.monster.speed,
        bomb,
        haste,
    );
    if renderer.needs_full || hud != renderer.last_hud {
        stdout.queue(MoveTo(renderer.origin_x, renderer.origin_y - 1))?;
        stdout.queue(SetForegroundColor(Color::White))?;
        stdout.queue(Clear(ClearType::CurrentLine))?;
        stdout.queue(Print(&hud))?;
        stdout.queue(ResetColor)?;
        renderer.last_hud = hud;
    }

    for y in 0..n {
        for x in 0..n {
            let pos = Pos::new(x, y);
            let cell = cell_for(game, pos);
            let idx = y * n + x;
            if renderer.needs_full || cell != renderer.last[idx] {
                renderer.last[idx] = cell;
                draw_cell(stdout, renderer, x, y, cell)?;
            }
        }
    }

    let banner = match game.phase {
        Phase::Playing => String::new(),
        Phase::Won => format!(
            "You escaped in {}s with {} deaths. Press r for a new maze.",
            secs, game.deaths
        ),
        Phase::GameOver => format!("Caught after {}s. Press r to try again.", secs),
    };
    if renderer.needs_full || banner != renderer.last_banner {
        stdout.queue(MoveTo(renderer.origin_x, renderer.origin_y + n as u16))?;
        stdout.queue(Clear(ClearType::CurrentLine))?;
        stdout.queue(SetForegroundColor(Color::Yellow))?;
        stdout.queue(Print(&banner))?;
        stdout.queue(ResetColor)?;
        renderer.last_banner = banner;
    }
    renderer.needs_full = false;

    stdout.flush()?;
    Ok(())
}

fn cell_for(game: &Game, pos: Pos) -> Cell {
    // Mercy frames blink the player at half duty.
    let hidden = game.player.invuln > 0 && game.ticks % 4 >= 2;
    if pos == game.player.pos && !hidden {
        return Cell {
            glyph: Glyph::Player,
            color: Color::Yellow,
        };
    }
    if pos == game.monster.pos {
        let color = if game.monster.alert > ALERT_CHASE_MIN {
            Color::Red
        } else {
            Color::DarkRed
        };
        return Cell {
            glyph: Glyph::Monster,
            color,
        };
    }
    let blasted = game
        .explosions
        .iter()
        .any(|e| e.center.x.abs_diff(pos.x) <= 1 && e.center.y.abs_diff(pos.y) <= 1);
    if blasted {
        return Cell {
            glyph: Glyph::Explosion,
            color: Color::Yellow,
        };
    }
    if game.breaking.iter().any(|b| b.pos == pos) {
        return Cell {
            glyph: Glyph::Rubble,
            color: Color::DarkYellow,
        };
    }
    if let Some(bomb) = &game.bomb {
        if bomb.pos == pos {
            // Flash phase runs from the moment the fuse was lit.
            let color = if (game.ticks - bomb.placed_at) % 4 < 2 {
                Color::Red
            } else {
                Color::Yellow
            };
            return Cell {
                glyph: Glyph::BombArmed,
                color,
            };
        }
    }
    if pos == game.level.exit {
        let color = if game.player.keys >= game.keys_required() {
            Color::Green
        } else {
            Color::Red
        };
        return Cell {
            glyph: Glyph::Exit,
            color,
        };
    }
    if game.level.keys.iter().any(|k| !k.collected && k.pos == pos) {
        return Cell {
            glyph: Glyph::Key,
            color: Color::Yellow,
        };
    }
    if game.level.bombs.contains(&pos) {
        return Cell {
            glyph: Glyph::BombPickup,
            color: Color::Magenta,
        };
    }
    if game.level.powerups.iter().any(|p| p.pos == pos) {
        return Cell {
            glyph: Glyph::PowerUp,
            color: Color::Cyan,
        };
    }
    match game.level.tile(pos) {
        Tile::Wall => Cell {
            glyph: Glyph::Wall,
            color: Color::Blue,
        },
        Tile::Door => Cell {
            glyph: Glyph::Door,
            color: Color::DarkYellow,
        },
        Tile::Safe => {
            if game.level.zone_at(pos).map_or(false, |z| z.used) {
                Cell {
                    glyph: Glyph::SafeSpent,
                    color: Color::DarkGreen,
                }
            } else {
                Cell {
                    glyph: Glyph::SafeFresh,
                    color: Color::Green,
                }
            }
        }
        Tile::Spike => {
            let live = game.spikes_armed
                && game.level.spikes.iter().any(|s| s.pos == pos && s.active);
            if live {
                Cell {
                    glyph: Glyph::SpikeLive,
                    color: Color::Red,
                }
            } else {
                Cell {
                    glyph: Glyph::SpikeDormant,
                    color: Color::DarkGrey,
                }
            }
        }
        Tile::Switch => {
            if game.level.switches.iter().any(|s| s.pos == pos && s.active) {
                Cell {
                    glyph: Glyph::SwitchSpent,
                    color: Color::DarkGrey,
                }
            } else {
                Cell {
                    glyph: Glyph::SwitchReady,
                    color: Color::Cyan,
                }
            }
        }
        Tile::RotorAnchor => Cell {
            glyph: Glyph::Rotor,
            color: Color::Magenta,
        },
        Tile::Floor => {
            if game.player.trail.contains(&pos) {
                Cell {
                    glyph: Glyph::Trail,
                    color: Color::DarkCyan,
                }
            } else {
                Cell {
                    glyph: Glyph::Floor,
                    color: Color::Reset,
                }
            }
        }
    }
}

fn draw_cell(stdout: &mut Stdout, renderer: &Renderer, x: usize, y: usize, cell: Cell) -> io::Result<()> {
    let (text, color) = match cell.glyph {
        Glyph::Player => ("😀", cell.color),
        Glyph::Monster => ("👾", cell.color),
        Glyph::Explosion => ("💥", cell.color),
        Glyph::Rubble => ("🧱", cell.color),
        Glyph::BombArmed => ("💣", cell.color),
        Glyph::BombPickup => ("🧨", cell.color),
        Glyph::Key => ("🔑", cell.color),
        Glyph::PowerUp => ("⚡", cell.color),
        Glyph::Exit => ("🚪", cell.color),
        Glyph::Wall => ("██", cell.color),
        Glyph::Floor => ("  ", cell.color),
        Glyph::Trail => ("· ", cell.color),
        Glyph::SafeFresh => ("▒▒", cell.color),
        Glyph::SafeSpent => ("░░", cell.color),
        Glyph::SpikeLive => ("▲▲", cell.color),
        Glyph::SpikeDormant => ("▲▲", cell.color),
        Glyph::Door => ("▓▓", cell.color),
        Glyph::SwitchReady => ("◉ ", cell.color),
        Glyph::SwitchSpent => ("○ ", cell.color),
        Glyph::Rotor => ("↻ ", cell.color),
    };
    let x_pos = renderer.origin_x + (x * CELL_W) as u16;
    let y_pos = renderer.origin_y + y as u16;
    stdout.queue(MoveTo(x_pos, y_pos))?;
    stdout.queue(SetForegroundColor(color))?;
    stdout.queue(Print(text))?;
    let w = UnicodeWidthStr::width(text);
    if w < CELL_W {
        for _ in 0..(CELL_W - w) {
            stdout.queue(Print(' '))?;
        }
    }
    stdout.queue(ResetColor)?;
    Ok(())
}

fn active_dir_recent(last_seen: &[Option<Instant>; 4], last_pressed: Option<Dir>) -> Option<Dir> {
    let now = Instant::now();
    if let Some(dir) = last_pressed {
        if let Some(t) = last_seen[idx_for_dir(dir)] {
            if now.duration_since(t) <= Duration::from_millis(INPUT_HOLD_MS) {
                return Some(dir);
            }
        }
    }
    let mut best: Option<(Dir, Instant)> = None;
    for (idx, dir) in [Dir::Up, Dir::Down, Dir::Left, Dir::Right].iter().enumerate() {
        if let Some(t) = last_seen[idx] {
            if now.duration_since(t) <= Duration::from_millis(INPUT_HOLD_MS) {
                match best {
                    None => best = Some((*dir, t)),
                    Some((_, bt)) if t > bt => best = Some((*dir, t)),
                    _ => {}
                }
            }
        }
    }
    best.map(|(dir, _)| dir)
}

fn idx_for_dir(dir: Dir) -> usize {
    match dir {
        Dir::Up => 0,
        Dir::Down => 1,
        Dir::Left => 2,
        Dir::Right => 3,
    }
}
