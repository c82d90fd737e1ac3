use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use mixdeck::audio::{AudioOutput, DeviceManager, PlaybackEngine};
use mixdeck::cli::{Argument, CliApp, Command, StatusDisplay};
use mixdeck::config::{ConfigManager, PlayerConfig};
use mixdeck::controls::{ActionId, ControlContext, ControlDispatcher, Outcome};
use mixdeck::error::{ErrorSeverity, PlayerError};
use mixdeck::logging::{PlaybackEventType, PlayerLogger};
use mixdeck::markers::MarkerList;
use mixdeck::models::{format_seconds, PlayerStatus, TrackSlot};
use mixdeck::session::{SessionState, SessionStore};

const HISTORY_LINES: usize = 20;

/// Main application controller that coordinates all components
pub struct AppController {
    engine: PlaybackEngine,
    devices: DeviceManager,
    output: Option<AudioOutput>,
    config_manager: ConfigManager,
    config: PlayerConfig,
    session: SessionStore,
    markers: MarkerList,
    logger: PlayerLogger,
    dispatcher: ControlDispatcher,
    watching: bool,
}

impl AppController {
    /// Create a new application controller
    pub fn new(cli: &CliApp) -> Result<Self, PlayerError> {
        if let Err(e) = PlayerLogger::init("warn") {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        let config_manager = ConfigManager::new()?;
        let config = config_manager.get_config().clone();
        let session_path = cli.session.clone().unwrap_or_else(|| config.session_file.clone());

        let engine = PlaybackEngine::new(&config);

        info!("Application controller initialized");

        Ok(Self {
            engine,
            devices: DeviceManager::new(),
            output: None,
            config_manager,
            session: SessionStore::new(session_path),
            markers: MarkerList::new(),
            logger: PlayerLogger::new(),
            dispatcher: ControlDispatcher::new(),
            config,
            watching: false,
        })
    }

    /// Open the output device, then bring back the last session or the files named on the command line
    pub fn initialize(&mut self, cli: &CliApp) {
        let device = cli.device.clone().or_else(|| self.config.preferred_device.clone());
        if let Err(e) = self.start_output(device.as_deref()) {
            warn!("Running without audio output: {}", e);
            self.handle_error(&e.into());
        }

        let files_given = cli.file.is_some() || cli.mixer.is_some();
        if self.config.restore_session && !cli.no_restore && !files_given {
            self.restore_session();
        }

        if let Some(path) = &cli.file {
            self.run_command(ActionId::Load, Argument::Path(path.clone()));
        }
        if let Some(path) = &cli.mixer {
            self.run_command(ActionId::LoadMixer, Argument::Path(path.clone()));
        }
        if cli.autoplay {
            self.run_command(ActionId::Play, Argument::None);
        }
    }

    fn start_output(&mut self, device: Option<&str>) -> Result<(), mixdeck::error::AudioError> {
        // The old stream has to be gone before a new one opens the device
        self.output = None;
        self.devices.select_device_with_fallback(device)?;
        let output = AudioOutput::start(&self.devices, &self.engine, self.config.block_size)?;
        self.output = Some(output);
        Ok(())
    }

    fn switch_device(&mut self, name: &str) -> Result<(), PlayerError> {
        let previous = self.output.as_ref().map(|o| o.device_name().to_string());
        self.output = None;

        let started = self
            .devices
            .select_device(Some(name))
            .and_then(|_| AudioOutput::start(&self.devices, &self.engine, self.config.block_size));

        match started {
            Ok(output) => {
                println!("Output: {} ({} Hz)", output.device_name(), output.sample_rate());
                self.logger
                    .log_event(PlaybackEventType::DeviceChanged, output.device_name().to_string());
                self.output = Some(output);
                self.config_manager.set_preferred_device(Some(name.to_string()))?;
                self.config.preferred_device = Some(name.to_string());
                Ok(())
            }
            Err(e) => {
                if let Err(restore_error) = self.start_output(previous.as_deref()) {
                    warn!("Could not reopen the previous output device: {}", restore_error);
                }
                Err(e.into())
            }
        }
    }

    fn restore_session(&mut self) {
        let state = self.session.load();

        // A session whose file has gone away is not restored at all
        let Some(path) = state.restorable_file().map(PathBuf::from) else {
            return;
        };

        match self.engine.load_file(&path) {
            Ok(info) => {
                self.engine.set_position(state.last_position);
                self.engine.set_gain(state.volume);
                self.engine.set_speed(state.speed);
                self.markers = MarkerList::from_markers(state.markers);
                println!("Restored: {} at {}", info.summary(), format_seconds(state.last_position));
                self.logger.log_event(PlaybackEventType::SessionRestored, info.summary());
            }
            Err(e) => warn!("Could not restore {}: {}", path.display(), e),
        }
    }

    fn session_state(&self) -> SessionState {
        SessionState {
            last_file: self.engine.primary_info().map(|info| info.path.clone()),
            last_position: self.engine.get_current_position(),
            volume: self.engine.gain(),
            speed: self.engine.speed(),
            markers: self.markers.to_vec(),
        }
    }

    fn save_session(&self) -> Result<(), PlayerError> {
        self.session.save(&self.session_state())?;
        self.logger.log_event(
            PlaybackEventType::SessionSaved,
            self.session.path().display().to_string(),
        );
        Ok(())
    }

    fn status(&self) -> PlayerStatus {
        let mut status = self.engine.status();
        status.output_device = self.output.as_ref().map(|o| o.device_name().to_string());
        status
    }

    fn run_command(&mut self, action: ActionId, argument: Argument) -> bool {
        self.execute(&Command { action, argument })
    }

    /// Execute one command. Returns false when the user asked to quit.
    fn execute(&mut self, command: &Command) -> bool {
        let mut context = ControlContext {
            engine: &mut self.engine,
            markers: &mut self.markers,
            logger: &self.logger,
            jump_seconds: self.config.jump_seconds,
        };

        let outcome = match self.dispatcher.dispatch(&mut context, command) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.handle_error(&e);
                return true;
            }
        };

        match outcome {
            Outcome::Message(text) => println!("{}", text),
            Outcome::ShowStatus => {
                let waveform = self
                    .engine
                    .thumbnail(TrackSlot::Primary)
                    .columns(StatusDisplay::waveform_width());
                StatusDisplay::display_full_status(&self.status(), &waveform);
            }
            Outcome::Watch => {
                self.watching = true;
                println!("Live view, press Enter to stop");
            }
            Outcome::ShowHistory => {
                StatusDisplay::display_history(&self.logger.get_recent_events(HISTORY_LINES));
            }
            Outcome::ListDevices => match self.devices.describe_devices() {
                Ok(devices) => StatusDisplay::display_devices(&devices),
                Err(e) => self.handle_error(&e.into()),
            },
            Outcome::SelectDevice(name) => {
                if let Err(e) = self.switch_device(&name) {
                    self.handle_error(&e);
                }
            }
            Outcome::SaveSession => match self.save_session() {
                Ok(()) => println!("Session saved to {}", self.session.path().display()),
                Err(e) => self.handle_error(&e),
            },
            Outcome::ShowHelp => CliApp::display_help(),
            Outcome::Quit => return false,
        }
        true
    }

    /// Run interactive mode
    pub async fn run_interactive_mode(&mut self) -> Result<(), PlayerError> {
        println!("mixdeck v{}", env!("CARGO_PKG_VERSION"));
        println!("Type 'help' for available commands, 'quit' to exit.");
        println!();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let shutdown_flag_clone = Arc::clone(&shutdown_flag);
        if let Err(e) = ctrlc::set_handler(move || {
            println!("\nReceived interrupt signal. Shutting down gracefully...");
            shutdown_flag_clone.store(true, Ordering::Relaxed);
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        // Stdin is read on its own thread so the status ticks keep running
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut awaiting_input = false;

        loop {
            if shutdown_flag.load(Ordering::Relaxed) {
                break;
            }

            if !awaiting_input && !self.watching {
                print!("> ");
                let _ = std::io::Write::flush(&mut std::io::stdout());
                awaiting_input = true;
            }

            tokio::select! {
                biased;

                line = rx.recv() => {
                    awaiting_input = false;
                    let Some(line) = line else {
                        println!();
                        break;
                    };

                    if self.watching {
                        self.watching = false;
                        println!();
                        if line.is_empty() {
                            continue;
                        }
                    }
                    if line.is_empty() {
                        continue;
                    }

                    match CliApp::parse_command(&line) {
                        Ok(command) => {
                            if !self.execute(&command) {
                                break;
                            }
                        }
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            println!("Type 'help' for available commands.");
                        }
                    }
                }

                _ = interval.tick() => {
                    if self.watching {
                        StatusDisplay::display_position_update(&self.status());
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Stop playback and persist the session
    pub fn shutdown(&mut self) {
        println!("Shutting down...");

        if let Err(e) = self.save_session() {
            eprintln!("Warning: Error saving session: {}", e);
        }

        self.engine.stop();
        self.output = None;

        println!("Goodbye!");
    }

    fn handle_error(&self, error: &PlayerError) {
        match error.severity() {
            ErrorSeverity::Info => info!("{}", error),
            ErrorSeverity::Warning => warn!("{}", error),
            ErrorSeverity::Error | ErrorSeverity::Critical => error!("{}", error),
        }
        StatusDisplay::display_error(error);
    }
}

#[tokio::main]
async fn main() -> Result<(), PlayerError> {
    let cli = CliApp::parse_args();

    let mut app = match AppController::new(&cli) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize application: {}", e);
            StatusDisplay::display_error(&e);
            std::process::exit(1);
        }
    };

    app.initialize(&cli);

    if let Err(e) = app.run_interactive_mode().await {
        StatusDisplay::display_error(&e);
        std::process::exit(1);
    }

    info!("Application shutdown complete");
    Ok(())
}
