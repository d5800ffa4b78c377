use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use directories::ProjectDirs;
use rand::{rngs::StdRng, Rng, SeedableRng};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame, Terminal,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Card title shown on the letter's border
    pub title: String,
    /// Alignment of the title: "left", "center", "right"
    pub title_alignment: String,

    /// Border style configuration
    pub border: BorderConfig,

    /// Color configuration
    pub colors: ColorConfig,

    /// Keybindings configuration
    pub keys: KeyConfig,

    /// Letter content (photo glyph, title, body, signature)
    pub content: ContentConfig,

    /// Floating particle configuration
    pub particles: ParticleConfig,

    /// Flap animation timing
    pub timing: TimingConfig,

    /// Help text at the bottom
    pub help_text: HelpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderConfig {
    pub enabled: bool,
    pub style: String, // "plain", "rounded", "double", "thick"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub foreground: String,
    pub background: String,
    pub border: String,
    pub envelope: String,
    pub heart: String,
    pub heart_dim: String,
    pub letter_title: String,
    pub help_fg: String,
    pub help_key_fg: String,
    pub help_key_modifier: Vec<String>, // "bold", "italic", "underlined"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub activate: Vec<String>,
    pub close: Vec<String>,
    pub quit: Vec<String>,
}

/// The card's written content. Opaque to the envelope logic: the state
/// machine only toggles whether the letter as a whole is shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub photo: String,
    pub title: String,
    pub body: Vec<String>,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Number of floating hearts generated at startup
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Duration of the flap-open animation in milliseconds
    pub flap_open_ms: u64,
    /// Duration of the flap-close animation in milliseconds
    pub flap_close_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelpConfig {
    pub enabled: bool,
    pub separator: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            title: " with love ".to_string(),
            title_alignment: "center".to_string(),
            border: BorderConfig::default(),
            colors: ColorConfig::default(),
            keys: KeyConfig::default(),
            content: ContentConfig::default(),
            particles: ParticleConfig::default(),
            timing: TimingConfig::default(),
            help_text: HelpConfig::default(),
        }
    }
}

impl Default for BorderConfig {
    fn default() -> Self {
        BorderConfig {
            enabled: true,
            style: "rounded".to_string(),
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        ColorConfig {
            foreground: "white".to_string(),
            background: "black".to_string(),
            border: "magenta".to_string(),
            envelope: "lightyellow".to_string(),
            heart: "lightred".to_string(),
            heart_dim: "darkgray".to_string(),
            letter_title: "lightmagenta".to_string(),
            help_fg: "gray".to_string(),
            help_key_fg: "cyan".to_string(),
            help_key_modifier: vec!["bold".to_string()],
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        KeyConfig {
            activate: vec!["Enter".to_string(), "Space".to_string()],
            close: vec!["Esc".to_string()],
            quit: vec!["q".to_string(), "Ctrl-c".to_string()],
        }
    }
}

impl Default for ContentConfig {
    fn default() -> Self {
        ContentConfig {
            photo: "\u{1F48C}".to_string(),
            title: "Happy Valentine's Day".to_string(),
            body: vec![
                "Every day with you".to_string(),
                "is my favorite day.".to_string(),
            ],
            signature: "~ yours, always".to_string(),
        }
    }
}

impl Default for ParticleConfig {
    fn default() -> Self {
        ParticleConfig { count: 28 }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            flap_open_ms: 600,
            flap_close_ms: 450,
        }
    }
}

impl Default for HelpConfig {
    fn default() -> Self {
        HelpConfig {
            enabled: true,
            separator: " | ".to_string(),
        }
    }
}

// ============================================================================
// COLOR PARSING
// ============================================================================

fn parse_color(color_str: &str) -> Color {
    match color_str.to_lowercase().as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "gray" | "grey" => Color::Gray,
        "darkgray" | "darkgrey" => Color::DarkGray,
        "lightred" => Color::LightRed,
        "lightgreen" => Color::LightGreen,
        "lightyellow" => Color::LightYellow,
        "lightblue" => Color::LightBlue,
        "lightmagenta" => Color::LightMagenta,
        "lightcyan" => Color::LightCyan,
        "white" => Color::White,
        // RGB format: #RRGGBB
        hex if hex.starts_with('#') && hex.len() == 7 => {
            if let (Ok(r), Ok(g), Ok(b)) = (
                u8::from_str_radix(&hex[1..3], 16),
                u8::from_str_radix(&hex[3..5], 16),
                u8::from_str_radix(&hex[5..7], 16),
            ) {
                Color::Rgb(r, g, b)
            } else {
                Color::White
            }
        }
        _ => Color::White,
    }
}

fn parse_modifier(modifiers: &[String]) -> Modifier {
    let mut result = Modifier::empty();
    for modifier in modifiers {
        match modifier.to_lowercase().as_str() {
            "bold" => result |= Modifier::BOLD,
            "italic" => result |= Modifier::ITALIC,
            "underlined" => result |= Modifier::UNDERLINED,
            "dim" => result |= Modifier::DIM,
            "reversed" => result |= Modifier::REVERSED,
            _ => {}
        }
    }
    result
}

// ============================================================================
// CONFIG LOADING
// ============================================================================

fn get_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "cardly").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn load_config() -> Config {
    if let Some(config_path) = get_config_path() {
        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(config) => {
                        return config;
                    }
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config file: {}", e);
                        eprintln!("Using default configuration.");
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config file: {}", e);
                    eprintln!("Using default configuration.");
                }
            }
        }
    }
    Config::default()
}

fn generate_default_config() -> String {
    String::from(
        r##"## cardly configuration file
## Place this file at ~/.config/cardly/config.toml
## All fields are optional - defaults will be used for missing values

## Title shown on the letter's border
title = " with love "
title_alignment = "center"  ## Options: "left", "center", "right"

[border]
enabled = true
style = "rounded"  ## Options: "plain", "rounded", "double", "thick"

[colors]
## Available colors:
## Standard: black, red, green, yellow, blue, magenta, cyan, gray, white
## Light variants: lightred, lightgreen, lightyellow, lightblue, lightmagenta, lightcyan
## Dark variants: darkgray
## Hex: "#RRGGBB" (e.g., "#ff0000" for red)
foreground = "white"
background = "black"
border = "magenta"
envelope = "lightyellow"
heart = "lightred"
heart_dim = "darkgray"
letter_title = "lightmagenta"
help_fg = "gray"
help_key_fg = "cyan"
help_key_modifier = ["bold"]  ## Options: bold, italic, underlined, dim, reversed

[keys]
## Key names: Use crossterm KeyCode names
## Examples: "q", "Esc", "Enter", "Space", "Up", "Down", "Tab", "Backspace"
## Modifiers can be added with format: "Ctrl-q", "Alt-q", "Shift-Up"
activate = ["Enter", "Space"]
close = ["Esc"]
quit = ["q", "Ctrl-c"]

[content]
## The letter itself. These fields are plain text: edit freely.
photo = "\U0001F48C"
title = "Happy Valentine's Day"
body = ["Every day with you", "is my favorite day."]
signature = "~ yours, always"

[particles]
## Number of floating hearts
count = 28

[timing]
## Flap animation durations in milliseconds
flap_open_ms = 600
flap_close_ms = 450

[help_text]
enabled = true
separator = " | "
"##,
    )
}

// ============================================================================
// KEY PARSING
// ============================================================================

#[derive(Debug, Clone)]
struct KeyBinding {
    key: KeyCode,
    ctrl: bool,
    alt: bool,
    shift: bool,
}

fn parse_key(key_str: &str) -> Option<KeyBinding> {
    let parts: Vec<&str> = key_str.split('-').collect();

    let mut ctrl = false;
    let mut alt = false;
    let mut shift = false;
    let mut key_part = key_str;

    if parts.len() > 1 {
        for modifier in &parts[..parts.len() - 1] {
            match modifier.to_lowercase().as_str() {
                "ctrl" | "control" => ctrl = true,
                "alt" => alt = true,
                "shift" => shift = true,
                _ => {}
            }
        }
        key_part = parts.last().unwrap();
    }

    let key = match key_part {
        "Esc" | "esc" | "Escape" => KeyCode::Esc,
        "Enter" | "enter" | "Return" => KeyCode::Enter,
        "Space" | "space" => KeyCode::Char(' '),
        "Tab" => KeyCode::Tab,
        "Backspace" => KeyCode::Backspace,
        "Delete" | "Del" => KeyCode::Delete,
        "Home" => KeyCode::Home,
        "End" => KeyCode::End,
        "Up" => KeyCode::Up,
        "Down" => KeyCode::Down,
        "Left" => KeyCode::Left,
        "Right" => KeyCode::Right,
        c if c.len() == 1 => {
            let ch = c.chars().next().unwrap();
            KeyCode::Char(ch)
        }
        _ => return None,
    };

    Some(KeyBinding {
        key,
        ctrl,
        alt,
        shift,
    })
}

fn matches_key(key: &KeyBinding, event: &crossterm::event::KeyEvent) -> bool {
    if key.key != event.code {
        return false;
    }

    let modifiers = event.modifiers;
    let ctrl = modifiers.contains(crossterm::event::KeyModifiers::CONTROL);
    let alt = modifiers.contains(crossterm::event::KeyModifiers::ALT);
    let shift = modifiers.contains(crossterm::event::KeyModifiers::SHIFT);

    key.ctrl == ctrl && key.alt == alt && key.shift == shift
}

// ============================================================================
// PARTICLE FIELD
// ============================================================================

/// Motion parameters for one floating heart, randomized once at startup and
/// immutable afterwards. Units mirror a stylesheet: percentages of the field
/// and seconds of animation time; the renderer maps them to cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSpec {
    /// Horizontal start position, percent of field width [0, 100]
    pub left: f64,
    /// Visual size [15, 30]; selects the glyph tier
    pub size: f64,
    /// Seconds per loop [12, 24]
    pub duration: f64,
    /// Start delay in seconds [-12, 0]; negative pre-advances the loop
    pub delay: f64,
    /// Horizontal travel over one loop, percent of field width [-40, 40]
    pub travel_x: f64,
    /// Vertical travel over one loop, percent of field height [-150, -110]
    pub travel_y: f64,
    /// Tilt in degrees [-30, 30]
    pub rotation: f64,
    /// Opacity [0.45, 0.90]
    pub opacity: f64,
}

impl ParticleSpec {
    fn generate<R: Rng>(rng: &mut R) -> Self {
        ParticleSpec {
            left: rng.gen_range(0.0..=100.0),
            size: rng.gen_range(15.0..=30.0),
            duration: rng.gen_range(12.0..=24.0),
            delay: rng.gen_range(-12.0..=0.0),
            travel_x: rng.gen_range(-40.0..=40.0),
            travel_y: rng.gen_range(-150.0..=-110.0),
            rotation: rng.gen_range(-30.0..=30.0),
            opacity: rng.gen_range(0.45..=0.90),
        }
    }

    /// Fraction of the current loop completed at `elapsed` seconds since
    /// startup. The negative delay shifts each heart to a different point of
    /// its cycle so the field starts in steady-state motion.
    fn phase(&self, elapsed: f64) -> f64 {
        ((elapsed - self.delay) / self.duration).rem_euclid(1.0)
    }
}

/// The set of floating hearts. Generated once, never touched again; the
/// renderer derives every heart's position from wall time and its spec.
pub struct ParticleField {
    specs: Vec<ParticleSpec>,
}

impl ParticleField {
    pub fn new<R: Rng>(count: usize, rng: &mut R) -> Self {
        let specs = (0..count).map(|_| ParticleSpec::generate(rng)).collect();
        ParticleField { specs }
    }

    pub fn specs(&self) -> &[ParticleSpec] {
        &self.specs
    }
}

// ============================================================================
// ENVELOPE STATE MACHINE
// ============================================================================

/// Grace period after the flap settles open before the pointer surface
/// accepts input again, so the open can't be instantly undone by a double
/// click.
const POINTER_GRACE: Duration = Duration::from_millis(220);

/// Delay between the letter starting to slide away and the flap starting to
/// fold, so the two motions read as one.
const CLOSE_STAGGER: Duration = Duration::from_millis(80);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Named transition animations. Completion events carry the name so the
/// controller only reacts to the animation it is actually waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationName {
    FlapOpen,
    FlapClose,
}

/// Requests the controller makes of the animation substrate, drained by the
/// frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCommand {
    StartAnimation(AnimationName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferredEffect {
    EnablePointer,
    StartCloseFlap,
}

/// A scheduled side effect stamped with the transition generation that
/// created it. If a later transition bumps the generation before the
/// deadline, the entry is stale and must not fire.
#[derive(Debug, Clone, Copy)]
struct Deferred {
    due: Instant,
    generation: u64,
    effect: DeferredEffect,
}

/// Drives the envelope through closed -> opening -> open -> closing ->
/// closed. All input paths funnel into `try_open`/`try_close`, which no-op
/// unless the current state permits the transition; mid-transition input is
/// silently ignored by the same guard.
pub struct EnvelopeController {
    state: EnvelopeState,
    generation: u64,
    pointer_enabled: bool,
    letter_visible: bool,
    flap_raised: bool,
    flap_lowering: bool,
    deferred: Vec<Deferred>,
    commands: Vec<ControllerCommand>,
}

impl EnvelopeController {
    pub fn new() -> Self {
        EnvelopeController {
            state: EnvelopeState::Closed,
            generation: 0,
            pointer_enabled: true,
            letter_visible: false,
            flap_raised: false,
            flap_lowering: false,
            deferred: Vec::new(),
            commands: Vec::new(),
        }
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    pub fn pointer_enabled(&self) -> bool {
        self.pointer_enabled
    }

    pub fn letter_visible(&self) -> bool {
        self.letter_visible
    }

    pub fn flap_raised(&self) -> bool {
        self.flap_raised
    }

    pub fn flap_lowering(&self) -> bool {
        self.flap_lowering
    }

    /// A click on the envelope. Blocked entirely while the pointer surface
    /// is suppressed (mid-transition or during the post-open grace).
    pub fn pointer_activate(&mut self, now: Instant) {
        if !self.pointer_enabled {
            return;
        }
        self.toggle(now);
    }

    /// Enter/Space on the envelope. Key input is not subject to pointer
    /// suppression; the state guard alone decides.
    pub fn key_activate(&mut self, now: Instant) {
        self.toggle(now);
    }

    /// Escape closes the letter, and only the letter.
    pub fn escape(&mut self, now: Instant) {
        self.try_close(now);
    }

    /// A click somewhere on the screen. Clicking outside the card root
    /// closes an open letter; clicks inside the root (on the letter itself,
    /// say) do nothing.
    pub fn outside_click(&mut self, inside_root: bool, now: Instant) {
        if !inside_root {
            self.try_close(now);
        }
    }

    fn toggle(&mut self, now: Instant) {
        match self.state {
            EnvelopeState::Closed => self.try_open(now),
            EnvelopeState::Open => self.try_close(now),
            // mid-transition activation is a deliberate no-op
            EnvelopeState::Opening | EnvelopeState::Closing => {}
        }
    }

    fn try_open(&mut self, _now: Instant) {
        if self.state != EnvelopeState::Closed {
            return;
        }
        self.state = EnvelopeState::Opening;
        self.generation += 1;
        self.flap_lowering = false;
        self.flap_raised = true;
        self.pointer_enabled = false;
        self.commands
            .push(ControllerCommand::StartAnimation(AnimationName::FlapOpen));
    }

    fn try_close(&mut self, now: Instant) {
        if self.state != EnvelopeState::Open {
            return;
        }
        self.state = EnvelopeState::Closing;
        self.generation += 1;
        // The letter withdraws first, hidden from assistive traversal
        // immediately; the flap follows after the stagger.
        self.letter_visible = false;
        self.flap_raised = false;
        self.pointer_enabled = false;
        self.deferred.push(Deferred {
            due: now + CLOSE_STAGGER,
            generation: self.generation,
            effect: DeferredEffect::StartCloseFlap,
        });
    }

    /// Completion signal from the animation substrate. The name must match
    /// the animation this state is waiting for; anything else is ignored.
    pub fn animation_finished(&mut self, name: AnimationName, now: Instant) {
        match name {
            AnimationName::FlapOpen => {
                if self.state != EnvelopeState::Opening {
                    return;
                }
                self.state = EnvelopeState::Open;
                self.generation += 1;
                self.letter_visible = true;
                self.deferred.push(Deferred {
                    due: now + POINTER_GRACE,
                    generation: self.generation,
                    effect: DeferredEffect::EnablePointer,
                });
            }
            AnimationName::FlapClose => {
                if self.state != EnvelopeState::Closing {
                    return;
                }
                self.state = EnvelopeState::Closed;
                self.generation += 1;
                self.flap_lowering = false;
                self.flap_raised = false;
                self.pointer_enabled = true;
            }
        }
    }

    /// Fire any due scheduled effects. Each entry re-validates both its
    /// generation stamp and the current state: a completion signal can land
    /// before a timer fires, and an interrupted transition must not have its
    /// leftover timers corrupt the newer state.
    pub fn poll_deferred(&mut self, now: Instant) {
        let mut i = 0;
        while i < self.deferred.len() {
            if self.deferred[i].due <= now {
                let entry = self.deferred.swap_remove(i);
                self.apply_deferred(entry);
            } else {
                i += 1;
            }
        }
    }

    fn apply_deferred(&mut self, entry: Deferred) {
        if entry.generation != self.generation {
            // stale: a newer transition superseded this timer
            return;
        }
        match entry.effect {
            DeferredEffect::EnablePointer => {
                if self.state == EnvelopeState::Open {
                    self.pointer_enabled = true;
                }
            }
            DeferredEffect::StartCloseFlap => {
                if self.state == EnvelopeState::Closing {
                    self.flap_lowering = true;
                    self.commands
                        .push(ControllerCommand::StartAnimation(AnimationName::FlapClose));
                }
            }
        }
    }

    pub fn take_commands(&mut self) -> Vec<ControllerCommand> {
        std::mem::take(&mut self.commands)
    }
}

// ============================================================================
// APPLICATION STATE
// ============================================================================

/// One in-flight flap animation. The frame loop reads progress for drawing
/// and reports completion back to the controller by name.
struct RunningAnimation {
    name: AnimationName,
    started: Instant,
    duration: Duration,
}

impl RunningAnimation {
    fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (now.duration_since(self.started).as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    fn finished(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.duration
    }
}

struct App {
    config: Config,
    controller: EnvelopeController,
    particles: ParticleField,
    started: Instant,
    animation: Option<RunningAnimation>,
    viewport: Rect,
    should_quit: bool,
}

impl App {
    fn new(config: Config, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let particles = ParticleField::new(config.particles.count, &mut rng);

        Self {
            config,
            controller: EnvelopeController::new(),
            particles,
            started: Instant::now(),
            animation: None,
            viewport: Rect::default(),
            should_quit: false,
        }
    }

    /// Advance timers and animations one step. Completion is delivered to
    /// the controller before new animation requests are picked up, so a
    /// close requested this turn starts from a settled state.
    fn tick(&mut self, now: Instant) {
        self.controller.poll_deferred(now);

        if let Some(animation) = &self.animation {
            if animation.finished(now) {
                let name = animation.name;
                self.animation = None;
                self.controller.animation_finished(name, now);
            }
        }

        for command in self.controller.take_commands() {
            match command {
                ControllerCommand::StartAnimation(name) => {
                    let duration = match name {
                        AnimationName::FlapOpen => {
                            Duration::from_millis(self.config.timing.flap_open_ms)
                        }
                        AnimationName::FlapClose => {
                            Duration::from_millis(self.config.timing.flap_close_ms)
                        }
                    };
                    self.animation = Some(RunningAnimation {
                        name,
                        started: now,
                        duration,
                    });
                }
            }
        }
    }

    /// How far the flap is raised, 0.0 (sealed) to 1.0 (fully open).
    fn flap_progress(&self, now: Instant) -> f64 {
        if let Some(animation) = &self.animation {
            return match animation.name {
                AnimationName::FlapOpen => animation.progress(now),
                AnimationName::FlapClose => 1.0 - animation.progress(now),
            };
        }
        if self.controller.flap_raised() {
            1.0
        } else {
            0.0
        }
    }

    fn check_key(&self, key_str: &str, event: &crossterm::event::KeyEvent) -> bool {
        if let Some(key_binding) = parse_key(key_str) {
            matches_key(&key_binding, event)
        } else {
            false
        }
    }

    fn handle_key(&mut self, key: &crossterm::event::KeyEvent, now: Instant) {
        for key_str in &self.config.keys.quit {
            if self.check_key(key_str, key) {
                self.should_quit = true;
                return;
            }
        }

        for key_str in &self.config.keys.activate {
            if self.check_key(key_str, key) {
                self.controller.key_activate(now);
                return;
            }
        }

        for key_str in &self.config.keys.close {
            if self.check_key(key_str, key) {
                self.controller.escape(now);
                return;
            }
        }
    }

    fn handle_click(&mut self, column: u16, row: u16, now: Instant) {
        let layout = card_layout(self.viewport, &self.config);
        let position = Position::new(column, row);

        if layout.envelope.contains(position) {
            self.controller.pointer_activate(now);
        } else {
            self.controller
                .outside_click(layout.root.contains(position), now);
        }
    }
}

// ============================================================================
// UI RENDERING
// ============================================================================

const ENVELOPE_WIDTH: u16 = 33;
const ENVELOPE_HEIGHT: u16 = 8;

/// Flap art from sealed to fully raised; the frame index follows animation
/// progress. All frames share a line count so the card never shifts.
const FLAP_FRAMES: [[&str; 8]; 3] = [
    [
        " _______________________________ ",
        "|\\                             /|",
        "|  \\                         /  |",
        "|    \\                     /    |",
        "|      \\_________________/      |",
        "|                               |",
        "|                               |",
        "|_______________________________|",
    ],
    [
        "         _______________         ",
        "        /               \\        ",
        " ______/_________________\\______ ",
        "|                               |",
        "|                               |",
        "|                               |",
        "|                               |",
        "|_______________________________|",
    ],
    [
        "              /\\                 ",
        "             /  \\                ",
        "            /    \\               ",
        "           /______\\              ",
        " _______________________________ ",
        "|                               |",
        "|                               |",
        "|_______________________________|",
    ],
];

struct CardLayout {
    /// Envelope plus letter plus a one-cell margin; clicks inside this rect
    /// never count as "outside" clicks.
    root: Rect,
    envelope: Rect,
    letter: Rect,
}

fn letter_size(config: &Config) -> (u16, u16) {
    let content = &config.content;
    let text_width = content
        .body
        .iter()
        .map(|line| line.chars().count())
        .chain([
            content.title.chars().count(),
            content.signature.chars().count(),
        ])
        .max()
        .unwrap_or(0) as u16;
    let width = (text_width + 4).max(config.title.chars().count() as u16 + 4);
    // photo + blank + title + body + blank + signature + borders
    let height = content.body.len() as u16 + 7;
    (width, height)
}

fn card_layout(area: Rect, config: &Config) -> CardLayout {
    let (letter_width, letter_height) = letter_size(config);
    let stack_height = letter_height + 1 + ENVELOPE_HEIGHT;

    let top = area.y + area.height.saturating_sub(stack_height) / 2;
    let letter = Rect {
        x: area.x + area.width.saturating_sub(letter_width) / 2,
        y: top,
        width: letter_width.min(area.width),
        height: letter_height,
    };
    let envelope = Rect {
        x: area.x + area.width.saturating_sub(ENVELOPE_WIDTH) / 2,
        y: top + letter_height + 1,
        width: ENVELOPE_WIDTH.min(area.width),
        height: ENVELOPE_HEIGHT,
    };

    let root_x = envelope.x.min(letter.x).saturating_sub(1);
    let root_right = (envelope.x + envelope.width).max(letter.x + letter.width) + 1;
    let root = Rect {
        x: root_x,
        y: top.saturating_sub(1),
        width: root_right.saturating_sub(root_x),
        height: stack_height + 2,
    }
    .intersection(area);

    CardLayout {
        root,
        envelope,
        letter,
    }
}

fn ui(f: &mut Frame, app: &App) {
    let now = Instant::now();
    let area = f.area();
    let config = &app.config;

    let background = Block::default().style(
        Style::default()
            .fg(parse_color(&config.colors.foreground))
            .bg(parse_color(&config.colors.background)),
    );
    f.render_widget(background, area);

    render_particles(f, app, area, now);

    let layout = card_layout(area, config);
    render_envelope(f, app, layout.envelope, now);

    if app.controller.letter_visible() {
        render_letter(f, app, layout.letter);
    }

    if config.help_text.enabled {
        render_help_text(f, app, area);
    }
}

fn render_particles(f: &mut Frame, app: &App, area: Rect, now: Instant) {
    if area.width == 0 || area.height == 0 {
        return;
    }

    let heart_color = parse_color(&app.config.colors.heart);
    let dim_color = parse_color(&app.config.colors.heart_dim);
    let elapsed = now.duration_since(app.started).as_secs_f64();
    let buf = f.buffer_mut();

    for spec in app.particles.specs() {
        let phase = spec.phase(elapsed);

        // Drift up from below the bottom edge; tilt leans the path sideways.
        let sway = spec.rotation / 15.0 * phase;
        let x_pct = spec.left + spec.travel_x * phase + sway;
        let y_pct = 100.0 + spec.travel_y * phase;
        if !(0.0..100.0).contains(&x_pct) || !(0.0..100.0).contains(&y_pct) {
            continue;
        }

        let x = area.x + (x_pct / 100.0 * f64::from(area.width)) as u16;
        let y = area.y + (y_pct / 100.0 * f64::from(area.height)) as u16;

        let glyph = if spec.size < 20.0 {
            "\u{2661}" // small hollow heart
        } else {
            "\u{2665}"
        };
        let mut style = if spec.opacity < 0.6 {
            Style::default().fg(dim_color)
        } else {
            Style::default().fg(heart_color)
        };
        if spec.opacity < 0.55 {
            style = style.add_modifier(Modifier::DIM);
        } else if spec.size >= 26.0 {
            style = style.add_modifier(Modifier::BOLD);
        }

        if let Some(cell) = buf.cell_mut((x, y)) {
            cell.set_symbol(glyph);
            cell.set_style(style);
        }
    }
}

fn render_envelope(f: &mut Frame, app: &App, area: Rect, now: Instant) {
    let progress = app.flap_progress(now);
    let frame_index = ((progress * (FLAP_FRAMES.len() - 1) as f64).round() as usize)
        .min(FLAP_FRAMES.len() - 1);

    let envelope_color = parse_color(&app.config.colors.envelope);
    let lines: Vec<Line> = FLAP_FRAMES[frame_index]
        .iter()
        .map(|row| Line::from(Span::styled(*row, Style::default().fg(envelope_color))))
        .collect();

    f.render_widget(Paragraph::new(lines), area);
}

fn render_letter(f: &mut Frame, app: &App, area: Rect) {
    let config = &app.config;

    let border_type = match config.border.style.as_str() {
        "rounded" => BorderType::Rounded,
        "double" => BorderType::Double,
        "thick" => BorderType::Thick,
        _ => BorderType::Plain,
    };

    let title_alignment = match config.title_alignment.as_str() {
        "left" => Alignment::Left,
        "right" => Alignment::Right,
        _ => Alignment::Center,
    };

    let title_style = Style::default()
        .fg(parse_color(&config.colors.letter_title))
        .add_modifier(Modifier::BOLD);
    let body_style = Style::default().fg(parse_color(&config.colors.foreground));
    let signature_style = body_style.add_modifier(Modifier::ITALIC);

    let mut lines = vec![
        Line::from(config.content.photo.clone()),
        Line::from(""),
        Line::from(Span::styled(config.content.title.clone(), title_style)),
    ];
    for body_line in &config.content.body {
        lines.push(Line::from(Span::styled(body_line.clone(), body_style)));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        config.content.signature.clone(),
        signature_style,
    )));

    let block = Block::default()
        .borders(if config.border.enabled {
            Borders::ALL
        } else {
            Borders::NONE
        })
        .border_type(border_type)
        .title(config.title.clone())
        .title_alignment(title_alignment)
        .border_style(Style::default().fg(parse_color(&config.colors.border)));

    let letter = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(block)
        .style(Style::default().bg(parse_color(&config.colors.background)));

    f.render_widget(letter, area);
}

fn render_help_text(f: &mut Frame, app: &App, size: Rect) {
    let config = &app.config;

    let help_key_fg = parse_color(&config.colors.help_key_fg);
    let help_fg = parse_color(&config.colors.help_fg);
    let help_key_modifier = parse_modifier(&config.colors.help_key_modifier);

    let activate_keys = config.keys.activate.join("/");
    let close_keys = config.keys.close.join("/");
    let quit_keys = config.keys.quit.join("/");

    let key_style = Style::default()
        .fg(help_key_fg)
        .add_modifier(help_key_modifier);

    let help_spans = vec![
        Span::styled(activate_keys, key_style),
        Span::styled(" Open/Close", Style::default().fg(help_fg)),
        Span::raw(config.help_text.separator.clone()),
        Span::styled(close_keys, key_style),
        Span::styled(" Close", Style::default().fg(help_fg)),
        Span::raw(config.help_text.separator.clone()),
        Span::styled(quit_keys, key_style),
        Span::styled(" Quit", Style::default().fg(help_fg)),
    ];

    let help_area = Rect {
        x: 0,
        y: size.height.saturating_sub(1),
        width: size.width,
        height: 1,
    };

    let help_text = Paragraph::new(Line::from(help_spans))
        .alignment(Alignment::Center)
        .style(Style::default().fg(help_fg));

    f.render_widget(help_text, help_area);
}

// ============================================================================
// MAIN
// ============================================================================

#[derive(Parser)]
#[command(name = "cardly")]
#[command(version = "0.1.0")]
#[command(about = "A cozy TUI greeting card with floating hearts and an animated envelope", long_about = None)]
struct Cli {
    /// Generate default configuration file
    #[arg(short, long)]
    init: bool,

    /// Specify custom config file path
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seed the heart randomizer for a reproducible field
    #[arg(short, long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle --init flag
    if cli.init {
        return generate_config_file();
    }

    // Load configuration
    let config = if let Some(config_path) = cli.config {
        load_config_from_path(&config_path)?
    } else {
        load_config()
    };

    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("Failed to setup terminal")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    // Run the app
    let mut app = App::new(config, cli.seed);
    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("Failed to restore terminal")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    if let Err(err) = res {
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

fn generate_config_file() -> Result<()> {
    let config_path = get_config_path().context("Could not determine config directory")?;

    let config_dir = config_path.parent().context("Invalid config path")?;

    fs::create_dir_all(config_dir).with_context(|| {
        format!(
            "Failed to create config directory: {}",
            config_dir.display()
        )
    })?;

    let default_config = generate_default_config();

    fs::write(&config_path, default_config)
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    println!(
        "Default configuration file created at: {}",
        config_path.display()
    );
    println!("Edit this file to customize the card's looks and message.");

    Ok(())
}

fn load_config_from_path(path: &PathBuf) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| {
            app.viewport = f.area();
            ui(f, app);
        })?;

        if app.should_quit {
            break;
        }

        // Short poll keeps the hearts drifting between input events.
        if event::poll(std::time::Duration::from_millis(33))? {
            let now = Instant::now();
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    app.handle_key(&key, now);
                }
                Event::Mouse(mouse) => {
                    if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
                        app.handle_click(mouse.column, mouse.row, now);
                    }
                }
                _ => {}
            }
        }

        app.tick(Instant::now());
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEvent, KeyModifiers};

    fn seeded_rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    /// Drive a fresh controller to the Open state.
    fn opened_controller(now: Instant) -> EnvelopeController {
        let mut controller = EnvelopeController::new();
        controller.key_activate(now);
        let _ = controller.take_commands();
        controller.animation_finished(AnimationName::FlapOpen, now);
        controller
    }

    // ------------------------------------------------------------------
    // Envelope state machine
    // ------------------------------------------------------------------

    #[test]
    fn starts_closed_with_pointer_enabled() {
        let controller = EnvelopeController::new();
        assert_eq!(controller.state(), EnvelopeState::Closed);
        assert!(controller.pointer_enabled());
        assert!(!controller.letter_visible());
    }

    #[test]
    fn activate_from_closed_starts_opening() {
        let now = Instant::now();
        let mut controller = EnvelopeController::new();

        controller.key_activate(now);

        assert_eq!(controller.state(), EnvelopeState::Opening);
        assert!(!controller.pointer_enabled());
        assert!(controller.flap_raised());
        assert_eq!(
            controller.take_commands(),
            vec![ControllerCommand::StartAnimation(AnimationName::FlapOpen)]
        );
    }

    #[test]
    fn double_activation_is_a_single_transition() {
        let now = Instant::now();
        let mut controller = EnvelopeController::new();

        controller.key_activate(now);
        controller.key_activate(now);
        controller.pointer_activate(now);

        assert_eq!(controller.state(), EnvelopeState::Opening);
        // exactly one flap-open request, not two
        assert_eq!(
            controller.take_commands(),
            vec![ControllerCommand::StartAnimation(AnimationName::FlapOpen)]
        );
    }

    #[test]
    fn activation_is_ignored_mid_transition() {
        let now = Instant::now();
        let mut controller = EnvelopeController::new();
        controller.key_activate(now);
        let _ = controller.take_commands();

        controller.key_activate(now);
        controller.escape(now);
        controller.outside_click(false, now);
        assert_eq!(controller.state(), EnvelopeState::Opening);
        assert!(controller.take_commands().is_empty());

        // same during closing
        controller.animation_finished(AnimationName::FlapOpen, now);
        controller.key_activate(now);
        let _ = controller.take_commands();
        controller.key_activate(now);
        controller.outside_click(false, now);
        assert_eq!(controller.state(), EnvelopeState::Closing);
        assert!(controller.take_commands().is_empty());
    }

    #[test]
    fn flap_open_completion_opens_and_reveals_letter() {
        let now = Instant::now();
        let mut controller = EnvelopeController::new();
        controller.key_activate(now);

        controller.animation_finished(AnimationName::FlapOpen, now);

        assert_eq!(controller.state(), EnvelopeState::Open);
        assert!(controller.letter_visible());
        // pointer stays suppressed until the grace period elapses
        assert!(!controller.pointer_enabled());
    }

    #[test]
    fn pointer_reenabled_after_grace_period() {
        let now = Instant::now();
        let mut controller = opened_controller(now);

        controller.poll_deferred(now + Duration::from_millis(219));
        assert!(!controller.pointer_enabled());

        controller.poll_deferred(now + Duration::from_millis(221));
        assert!(controller.pointer_enabled());
    }

    #[test]
    fn completion_of_the_wrong_animation_is_ignored() {
        let now = Instant::now();
        let mut controller = EnvelopeController::new();
        controller.key_activate(now);

        controller.animation_finished(AnimationName::FlapClose, now);
        assert_eq!(controller.state(), EnvelopeState::Opening);

        // and a flap-open completion arriving while closed does nothing
        let mut closed = EnvelopeController::new();
        closed.animation_finished(AnimationName::FlapOpen, now);
        assert_eq!(closed.state(), EnvelopeState::Closed);
    }

    #[test]
    fn escape_closes_only_when_open() {
        let now = Instant::now();

        let mut controller = EnvelopeController::new();
        controller.escape(now);
        assert_eq!(controller.state(), EnvelopeState::Closed);

        let mut controller = opened_controller(now);
        controller.escape(now);
        assert_eq!(controller.state(), EnvelopeState::Closing);
        // the letter is hidden immediately, before the flap even moves
        assert!(!controller.letter_visible());
        assert!(!controller.flap_lowering());
    }

    #[test]
    fn close_flap_starts_after_the_stagger_delay() {
        let now = Instant::now();
        let mut controller = opened_controller(now);
        controller.escape(now);

        controller.poll_deferred(now + Duration::from_millis(79));
        assert!(!controller.flap_lowering());
        assert!(controller.take_commands().is_empty());

        controller.poll_deferred(now + Duration::from_millis(81));
        assert!(controller.flap_lowering());
        assert_eq!(
            controller.take_commands(),
            vec![ControllerCommand::StartAnimation(AnimationName::FlapClose)]
        );
    }

    #[test]
    fn flap_close_completion_returns_to_closed() {
        let now = Instant::now();
        let mut controller = opened_controller(now);
        controller.escape(now);
        controller.poll_deferred(now + Duration::from_millis(100));
        let _ = controller.take_commands();

        controller.animation_finished(AnimationName::FlapClose, now + Duration::from_millis(550));

        assert_eq!(controller.state(), EnvelopeState::Closed);
        assert!(controller.pointer_enabled());
        assert!(!controller.flap_raised());
        assert!(!controller.flap_lowering());
    }

    #[test]
    fn outside_click_closes_only_when_open() {
        let now = Instant::now();

        let mut controller = EnvelopeController::new();
        controller.outside_click(false, now);
        assert_eq!(controller.state(), EnvelopeState::Closed);

        let mut controller = opened_controller(now);
        // a click inside the card root (on the letter, say) does nothing
        controller.outside_click(true, now);
        assert_eq!(controller.state(), EnvelopeState::Open);

        controller.outside_click(false, now);
        assert_eq!(controller.state(), EnvelopeState::Closing);
    }

    #[test]
    fn pointer_is_suppressed_during_grace_but_keys_are_not() {
        let now = Instant::now();
        let mut controller = opened_controller(now);
        assert!(!controller.pointer_enabled());

        controller.pointer_activate(now + Duration::from_millis(10));
        assert_eq!(controller.state(), EnvelopeState::Open);

        controller.key_activate(now + Duration::from_millis(10));
        assert_eq!(controller.state(), EnvelopeState::Closing);
    }

    #[test]
    fn stale_grace_timer_is_a_noop() {
        let now = Instant::now();
        let mut controller = opened_controller(now);

        // close before the 220ms grace fires; its timer is now stale
        controller.escape(now + Duration::from_millis(50));
        controller.poll_deferred(now + Duration::from_millis(300));

        // the stale enable must not leak through mid-close
        assert_eq!(controller.state(), EnvelopeState::Closing);
        assert!(!controller.pointer_enabled());

        controller.animation_finished(AnimationName::FlapClose, now + Duration::from_millis(600));
        assert!(controller.pointer_enabled());
    }

    #[test]
    fn state_sequence_is_strictly_cyclic() {
        fn legal(from: EnvelopeState, to: EnvelopeState) -> bool {
            use EnvelopeState::*;
            from == to
                || matches!(
                    (from, to),
                    (Closed, Opening) | (Opening, Open) | (Open, Closing) | (Closing, Closed)
                )
        }

        let t0 = Instant::now();
        let mut controller = EnvelopeController::new();
        let mut states = vec![controller.state()];
        let mut ms = 0u64;

        for round in 0..3 {
            for _ in 0..=round {
                controller.key_activate(t0 + Duration::from_millis(ms));
                states.push(controller.state());
                ms += 10;
            }
            controller.animation_finished(AnimationName::FlapOpen, t0 + Duration::from_millis(ms));
            states.push(controller.state());
            controller.escape(t0 + Duration::from_millis(ms));
            states.push(controller.state());
            ms += 100;
            controller.poll_deferred(t0 + Duration::from_millis(ms));
            states.push(controller.state());
            controller
                .animation_finished(AnimationName::FlapClose, t0 + Duration::from_millis(ms));
            states.push(controller.state());
            let _ = controller.take_commands();
        }

        for pair in states.windows(2) {
            assert!(
                legal(pair[0], pair[1]),
                "illegal transition {:?} -> {:?}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(controller.state(), EnvelopeState::Closed);
    }

    // ------------------------------------------------------------------
    // Particle field
    // ------------------------------------------------------------------

    #[test]
    fn particle_field_has_requested_count_and_ranges() {
        let mut rng = seeded_rng();
        let field = ParticleField::new(28, &mut rng);
        assert_eq!(field.specs().len(), 28);

        // sweep a larger sample to exercise the range boundaries
        let specs: Vec<ParticleSpec> =
            (0..500).map(|_| ParticleSpec::generate(&mut rng)).collect();
        for spec in field.specs().iter().chain(specs.iter()) {
            assert!((0.0..=100.0).contains(&spec.left), "left {}", spec.left);
            assert!((15.0..=30.0).contains(&spec.size), "size {}", spec.size);
            assert!(
                (12.0..=24.0).contains(&spec.duration),
                "duration {}",
                spec.duration
            );
            assert!((-12.0..=0.0).contains(&spec.delay), "delay {}", spec.delay);
            assert!(
                (-40.0..=40.0).contains(&spec.travel_x),
                "travel_x {}",
                spec.travel_x
            );
            assert!(
                (-150.0..=-110.0).contains(&spec.travel_y),
                "travel_y {}",
                spec.travel_y
            );
            assert!(
                (-30.0..=30.0).contains(&spec.rotation),
                "rotation {}",
                spec.rotation
            );
            assert!(
                (0.45..=0.90).contains(&spec.opacity),
                "opacity {}",
                spec.opacity
            );
        }
    }

    #[test]
    fn particle_field_is_deterministic_for_a_seed() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(
            ParticleField::new(28, &mut a).specs(),
            ParticleField::new(28, &mut b).specs()
        );
    }

    #[test]
    fn particle_phase_wraps_and_pre_advances() {
        let spec = ParticleSpec {
            left: 50.0,
            size: 20.0,
            duration: 12.0,
            delay: -6.0,
            travel_x: 0.0,
            travel_y: -120.0,
            rotation: 0.0,
            opacity: 0.7,
        };

        // the negative delay means the heart starts mid-cycle
        assert!((spec.phase(0.0) - 0.5).abs() < 1e-9);
        assert!(spec.phase(6.0).abs() < 1e-9);
        assert!(spec.phase(18.0).abs() < 1e-9);
        assert!((spec.phase(21.0) - 0.25).abs() < 1e-9);
    }

    // ------------------------------------------------------------------
    // Frame loop glue
    // ------------------------------------------------------------------

    #[test]
    fn tick_runs_flap_animation_to_completion() {
        let mut app = App::new(Config::default(), Some(1));
        let now = Instant::now();

        app.controller.key_activate(now);
        app.tick(now);
        assert_eq!(app.controller.state(), EnvelopeState::Opening);
        assert!(app.animation.is_some());
        assert!(app.flap_progress(now) < 0.1);

        // default flap_open_ms is 600
        app.tick(now + Duration::from_millis(650));
        assert_eq!(app.controller.state(), EnvelopeState::Open);
        assert!(app.animation.is_none());
        assert!((app.flap_progress(now + Duration::from_millis(650)) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tick_plays_the_staggered_close() {
        let mut app = App::new(Config::default(), Some(1));
        let t0 = Instant::now();

        app.controller.key_activate(t0);
        app.tick(t0);
        app.tick(t0 + Duration::from_millis(650));
        app.controller.escape(t0 + Duration::from_millis(700));

        // before the stagger elapses no close animation exists
        app.tick(t0 + Duration::from_millis(710));
        assert!(app.animation.is_none());

        app.tick(t0 + Duration::from_millis(800));
        assert!(matches!(
            app.animation,
            Some(RunningAnimation {
                name: AnimationName::FlapClose,
                ..
            })
        ));

        app.tick(t0 + Duration::from_millis(1400));
        assert_eq!(app.controller.state(), EnvelopeState::Closed);
    }

    #[test]
    fn click_routing_uses_the_card_layout() {
        let mut app = App::new(Config::default(), Some(1));
        app.viewport = Rect::new(0, 0, 120, 40);
        let t0 = Instant::now();
        let layout = card_layout(app.viewport, &app.config);

        // click on the envelope opens
        app.handle_click(layout.envelope.x + 2, layout.envelope.y + 2, t0);
        assert_eq!(app.controller.state(), EnvelopeState::Opening);
        app.tick(t0);
        app.tick(t0 + Duration::from_millis(650));
        assert_eq!(app.controller.state(), EnvelopeState::Open);
        app.controller.poll_deferred(t0 + Duration::from_millis(900));

        // click on the letter stays open; click in a far corner closes
        let t1 = t0 + Duration::from_millis(1000);
        app.handle_click(layout.letter.x + 1, layout.letter.y + 1, t1);
        assert_eq!(app.controller.state(), EnvelopeState::Open);
        app.handle_click(0, 0, t1);
        assert_eq!(app.controller.state(), EnvelopeState::Closing);
    }

    #[test]
    fn card_layout_stacks_letter_above_envelope() {
        let config = Config::default();
        let area = Rect::new(0, 0, 100, 40);
        let layout = card_layout(area, &config);

        assert!(layout.letter.y + layout.letter.height <= layout.envelope.y);
        assert!(layout
            .root
            .contains(Position::new(layout.envelope.x, layout.envelope.y)));
        assert!(layout
            .root
            .contains(Position::new(layout.letter.x, layout.letter.y)));
    }

    // ------------------------------------------------------------------
    // Config and input parsing
    // ------------------------------------------------------------------

    #[test]
    fn parse_key_handles_names_and_modifiers() {
        let enter = parse_key("Enter").unwrap();
        assert_eq!(enter.key, KeyCode::Enter);
        assert!(!enter.ctrl);

        let space = parse_key("Space").unwrap();
        assert_eq!(space.key, KeyCode::Char(' '));

        let ctrl_c = parse_key("Ctrl-c").unwrap();
        assert_eq!(ctrl_c.key, KeyCode::Char('c'));
        assert!(ctrl_c.ctrl);

        assert!(parse_key("NotAKey").is_none());
    }

    #[test]
    fn matches_key_requires_exact_modifiers() {
        let binding = parse_key("Ctrl-c").unwrap();
        let plain = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE);
        let ctrl = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);

        assert!(!matches_key(&binding, &plain));
        assert!(matches_key(&binding, &ctrl));
    }

    #[test]
    fn parse_color_handles_names_and_hex() {
        assert_eq!(parse_color("lightred"), Color::LightRed);
        assert_eq!(parse_color("#ff00aa"), Color::Rgb(255, 0, 170));
        // malformed hex falls back to white
        assert_eq!(parse_color("#zzzzzz"), Color::White);
        assert_eq!(parse_color("no-such-color"), Color::White);
    }

    #[test]
    fn default_config_file_parses_back_to_defaults() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        let defaults = Config::default();

        assert_eq!(config.title, defaults.title);
        assert_eq!(config.particles.count, 28);
        assert_eq!(config.timing.flap_open_ms, 600);
        assert_eq!(config.timing.flap_close_ms, 450);
        assert_eq!(config.keys.activate, defaults.keys.activate);
        assert_eq!(config.content.title, defaults.content.title);
    }

    #[test]
    fn empty_config_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.particles.count, 28);
        assert_eq!(config.keys.quit, Config::default().keys.quit);
    }
}
