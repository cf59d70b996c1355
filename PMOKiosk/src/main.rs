//! PMOKiosk - shell du kiosque.
//!
//! Monte l'économiseur d'écran une seule fois, publie chaque interaction du
//! terminal sur le bus d'entrées et affiche l'overlay de présentation.

mod input;
mod view;

use std::env;
use std::fs::{File, OpenOptions};
use std::io::{self, Stdout, Write};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use pmoconfig::{Config, get_config};
use pmoscreensaver::backends::{HlsHttpEngine, OEmbedProvider, http_client};
use pmoscreensaver::{Backends, InputBus, Screensaver, ScreensaverConfigExt, ScreensaverStatus};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use url::Url;

use view::{KioskView, SharedView, TerminalSurface};

const TICK_RATE: Duration = Duration::from_millis(200);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Install panic handler to restore terminal even on panic
    std::panic::set_hook(Box::new(|panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        eprintln!("\n\n❌ PMOKiosk panicked: {:?}", panic_info);
    }));

    let options = resolve_options()?;
    let config = match &options.config_dir {
        Some(dir) => Arc::new(Config::load_config(dir)?),
        None => get_config(),
    };
    init_tracing(&config);

    let screensaver_config = config
        .screensaver_config()
        .context("Configuration de l'économiseur invalide")?;
    let playlist = config
        .screensaver_playlist()
        .context("Playlist de l'économiseur invalide")?;
    let backends = build_backends(&config)?;

    info!(
        config_dir = config.directory(),
        idle_timeout_ms = screensaver_config.idle_timeout.as_millis() as u64,
        entries = playlist.len(),
        "Démarrage de PMOKiosk"
    );

    let view: SharedView = Arc::new(Mutex::new(KioskView::new(
        screensaver_config.overlay.clone(),
        screensaver_config.idle_timeout,
        playlist.len(),
    )));

    let bus = InputBus::default();
    let handle = Screensaver::mount(
        screensaver_config,
        playlist,
        backends,
        Box::new(TerminalSurface::new(view.clone())),
        &bus,
    )?;

    let stop = Arc::new(AtomicBool::new(false));
    let (quit_tx, quit_rx) = oneshot::channel();
    let ui = {
        let ctx = UiContext {
            view,
            status: handle.status(),
            bus: bus.clone(),
            stop: stop.clone(),
        };
        thread::spawn(move || {
            let result = run_ui(ctx);
            let _ = quit_tx.send(());
            result
        })
    };

    tokio::select! {
        _ = quit_rx => info!("Quit requested from the terminal"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    stop.store(true, Ordering::SeqCst);
    handle.unmount().await?;

    match ui.join() {
        Ok(result) => result?,
        Err(_) => bail!("UI thread panicked"),
    }

    println!("\nAu revoir !");
    Ok(())
}

struct AppOptions {
    config_dir: Option<String>,
}

fn resolve_options() -> Result<AppOptions> {
    let mut args = env::args().skip(1);
    let mut config_dir = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config-dir" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("--config-dir requiert une valeur"))?;
                config_dir = Some(value);
            }
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => bail!("Argument inconnu: {other}. Utilise --help pour l'aide."),
        }
    }
    Ok(AppOptions { config_dir })
}

fn print_usage() {
    println!("Usage: PMOKiosk [--config-dir <dir>]");
    println!("Variables d'environnement:");
    println!("  PMOKIOSK_CONFIG          Répertoire de configuration (par défaut .pmokiosk)");
    println!(
        "  PMOKIOSK_CONFIG__A__B    Surcharge une clé, ex: PMOKIOSK_CONFIG__SCREENSAVER__IDLE_TIMEOUT_MS=5000"
    );
    println!("  RUST_LOG                 Filtrage tracing (ex: pmoscreensaver=debug)");
}

fn build_backends(config: &Config) -> Result<Backends> {
    let client = http_client().context("Impossible de créer le client HTTP")?;
    let audible = config.get_allow_audible_autoplay()?;

    let mut engine = HlsHttpEngine::new(client.clone()).with_audible_autoplay(audible);
    let base_url = config.get_local_base_url()?;
    if !base_url.is_empty() {
        let base = Url::parse(&base_url)
            .with_context(|| format!("backends.local.base_url invalide: {base_url}"))?;
        engine = engine.with_base_url(base);
    }

    let endpoint = config.get_oembed_endpoint()?;
    let endpoint = Url::parse(&endpoint)
        .with_context(|| format!("backends.embedded.oembed_endpoint invalide: {endpoint}"))?;
    let provider = OEmbedProvider::new(client, endpoint)
        .with_clip_duration(Duration::from_secs(config.get_clip_duration_secs()?))
        .with_audible_autoplay(audible);

    Ok(Backends::new(Arc::new(engine), Arc::new(provider)))
}

fn init_tracing(config: &Config) {
    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(log_writer(config))
        .try_init();
}

// Le terminal appartient à l'interface : les logs vont dans un fichier
fn log_writer(config: &Config) -> BoxMakeWriter {
    match config.get_log_file_path() {
        Ok(path) => match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                let shared = SharedLogWriter::new(file);
                return BoxMakeWriter::new(move || shared.clone());
            }
            Err(err) => {
                eprintln!("Impossible d'ouvrir {path} pour les logs tracing: {err}");
            }
        },
        Err(err) => eprintln!("Chemin de log invalide: {err}"),
    }
    BoxMakeWriter::new(io::sink)
}

#[derive(Clone)]
struct SharedLogWriter {
    inner: Arc<Mutex<File>>,
}

impl SharedLogWriter {
    fn new(file: File) -> Self {
        Self {
            inner: Arc::new(Mutex::new(file)),
        }
    }
}

impl Write for SharedLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| io::Error::other(err.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| io::Error::other(err.to_string()))?;
        guard.flush()
    }
}

struct UiContext {
    view: SharedView,
    status: watch::Receiver<ScreensaverStatus>,
    bus: InputBus,
    stop: Arc<AtomicBool>,
}

/// Boucle UI bloquante : dessin au rythme du tick, lecture des événements.
fn run_ui(ctx: UiContext) -> Result<()> {
    let terminal = setup_terminal()?;
    let mut guard = TerminalGuard { terminal };
    let mut last_tick = Instant::now();

    while !ctx.stop.load(Ordering::SeqCst) {
        {
            let view = view::lock(&ctx.view).clone();
            let status = ctx.status.borrow().clone();
            guard
                .terminal
                .draw(|f| view::draw(f, &view, &status))?;
        }

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout)? {
            let event = event::read()?;
            if input::is_quit(&event) {
                break;
            }
            for input in input::map_event(&event) {
                ctx.bus.publish(input);
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            last_tick = Instant::now();
        }
    }

    if let Err(err) = guard.terminal.clear() {
        warn!("Cannot clear terminal: {err}");
    }
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// RAII guard pour garantir la restauration du terminal même en cas d'erreur ou de panic
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen,
            DisableMouseCapture
        );
        let _ = self.terminal.show_cursor();
    }
}
