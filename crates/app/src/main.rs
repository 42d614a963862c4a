use std::path::{Path, PathBuf};

use avgplayer_core::{
    DebugFlags, Deck, Event, EventType, Player, PlayerConfig, PlayerError, Presentation,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

fn main() -> avgplayer_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play { scene, duration_ms, player } => run_play(&scene, duration_ms, &player),
        Commands::Smoke { scene, player } => run_smoke(&scene, &player),
        Commands::Lecture {
            scene,
            deck,
            keys,
            key_interval_ms,
            player,
        } => run_lecture(&scene, &deck, &keys, key_interval_ms, &player),
        Commands::Inspect { scene } => run_inspect(&scene),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn build_player(options: &PlayerOptions) -> avgplayer_core::Result<Player> {
    let mut config = match &options.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    if let Some(fps) = options.fps {
        config.frame_rate = fps;
    }
    config.realtime |= options.realtime;
    for name in &options.debug {
        let flag = DebugFlags::from_debug_name(name)
            .ok_or_else(|| PlayerError::msg(format!("unknown debug category {name:?}")))?;
        config.debug.insert(flag);
    }
    tracing::debug!(?config, "player configuration");
    Player::new(config)
}

fn load(player: &mut Player, scene: &Path) -> avgplayer_core::Result<()> {
    if player.load_file(scene) {
        Ok(())
    } else {
        Err(PlayerError::InvalidScene(format!(
            "could not load {}",
            scene.display()
        )))
    }
}

fn run_play(scene: &Path, duration_ms: Option<u64>, options: &PlayerOptions) -> avgplayer_core::Result<()> {
    let mut player = build_player(options)?;
    load(&mut player, scene)?;
    match duration_ms {
        Some(duration_ms) => {
            player.set_timeout(duration_ms, |player| {
                player.stop();
                Ok(())
            });
        }
        None if !player.config().realtime => {
            tracing::warn!("no duration given; playback runs until interrupted");
        }
        None => {}
    }
    tracing::info!(?scene, duration_ms, "starting playback");
    player.play(None)?;
    report(&player);
    Ok(())
}

/// Timer and event-debug exercise: a short-lived interval, a stop at five
/// seconds and two debug-level changes on the way.
fn run_smoke(scene: &Path, options: &PlayerOptions) -> avgplayer_core::Result<()> {
    let mut player = build_player(options)?;
    player.set_event_debug_level(2);
    load(&mut player, scene)?;

    let ticks = std::rc::Rc::new(std::cell::Cell::new(0u32));
    let counter = ticks.clone();
    let interval = player.set_interval(40, move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    });
    player.set_timeout(5000, |player| {
        tracing::info!(time_ms = player.frame_time_ms(), "timeout reached, stopping");
        player.stop();
        Ok(())
    });
    player.set_timeout(500, move |player| {
        player.clear_interval(interval);
        Ok(())
    });
    player.set_timeout(1000, |player| {
        player.set_event_debug_level(1);
        Ok(())
    });
    player.set_timeout(2000, |player| {
        player.set_event_debug_level(0);
        Ok(())
    });

    player.play(None)?;
    tracing::info!(interval_ticks = ticks.get(), "smoke run finished");
    report(&player);
    Ok(())
}

fn run_lecture(
    scene: &Path,
    deck: &Path,
    keys: &[String],
    key_interval_ms: u64,
    options: &PlayerOptions,
) -> avgplayer_core::Result<()> {
    let mut player = build_player(options)?;
    load(&mut player, scene)?;
    let deck = Deck::from_path(deck)?;
    let presentation = Presentation::attach(&mut player, deck)?;

    let mut at = 0;
    for key in keys {
        at += key_interval_ms;
        let key = key.clone();
        player.set_timeout(at, move |player| {
            player.push_event(Event::key(EventType::KeyDown, key.clone(), 0));
            player.push_event(Event::key(EventType::KeyUp, key.clone(), 0));
            Ok(())
        });
    }
    player.set_timeout(at + key_interval_ms, |player| {
        player.stop();
        Ok(())
    });

    player.play(None)?;
    let mut presentation = presentation.borrow_mut();
    presentation.teardown(&mut player);
    println!(
        "slide {} of {} ({})",
        presentation.current_slide().map_or(0, |slide| slide + 1),
        presentation.num_slides(),
        presentation.current_chapter().unwrap_or("-"),
    );
    report(&player);
    Ok(())
}

fn run_inspect(scene: &Path) -> avgplayer_core::Result<()> {
    let mut player = Player::new(PlayerConfig::headless_defaults())?;
    load(&mut player, scene)?;
    let scene = player.scene()?;
    let (width, height) = scene.size();
    println!("scene {width}x{height}, {} nodes", scene.len());
    for (depth, id) in scene.walk() {
        let node = scene.node(id)?;
        let rect = node.rect();
        println!(
            "{:indent$}{} {:?} at ({}, {}) size {}x{} opacity {}",
            "",
            node.kind().name(),
            node.id(),
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            node.opacity(),
            indent = depth * 2,
        );
    }
    Ok(())
}

fn report(player: &Player) {
    let items = player.last_frame().map_or(0, |frame| frame.items.len());
    println!(
        "rendered {} frames up to {:.0} ms, {} draw items in the last frame, {} callback errors",
        player.frames_rendered(),
        player.frame_time_ms(),
        items,
        player.callback_errors(),
    );
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless AVG media player", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct PlayerOptions {
    /// Player configuration file (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Frame rate override.
    #[arg(long)]
    fps: Option<f64>,
    /// Sleep between frames to follow the wall clock.
    #[arg(long)]
    realtime: bool,
    /// Extra debug categories, e.g. `events` or `DEBUG_PROFILE`.
    #[arg(long)]
    debug: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a scene and run the frame loop.
    Play {
        /// Scene description to load.
        scene: PathBuf,
        /// Stop after this much simulated time.
        #[arg(short, long)]
        duration_ms: Option<u64>,
        #[command(flatten)]
        player: PlayerOptions,
    },
    /// Run the timer smoke test against a scene.
    Smoke {
        scene: PathBuf,
        #[command(flatten)]
        player: PlayerOptions,
    },
    /// Drive a slide deck with a scripted sequence of key presses.
    Lecture {
        scene: PathBuf,
        /// Deck description (JSON).
        deck: PathBuf,
        /// Key names to press, e.g. "page down".
        #[arg(short, long)]
        keys: Vec<String>,
        #[arg(long, default_value_t = 1000)]
        key_interval_ms: u64,
        #[command(flatten)]
        player: PlayerOptions,
    },
    /// Print the node tree of a scene.
    Inspect { scene: PathBuf },
}
