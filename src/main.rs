use clap::{Parser, Subcommand};
use serialdesk::app::{self, AppEvent, Command, Flow};
use serialdesk::config::{Config, ConfigLoader, LogFormat, LoggingConfig};
use serialdesk::port::{list_port_names, SystemPortOpener};
use serialdesk::profile::{ProfileManager, ProfileStore, ProfileWatcher};
use serialdesk::{permission, AppResult};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "serialdesk",
    version,
    about = "Interactive serial terminal with named, shareable port profiles."
)]
struct Args {
    /// Configuration file (defaults to the standard search locations)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory holding the profile file
    #[arg(long, value_name = "DIR")]
    profiles_dir: Option<PathBuf>,

    /// Log level or filter directive; RUST_LOG takes precedence
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// List serial ports and exit
    Ports,
    /// List saved profiles and exit
    Profiles,
    /// Interactive console (default)
    Console,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let loader = match &args.config {
        Some(path) => ConfigLoader::load_from(path),
        None => ConfigLoader::load(),
    };
    let loader = match loader {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("serialdesk: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&loader.config().logging, args.log_level.as_deref());
    if let Some(path) = &loader.config_path {
        info!(path = %path.display(), "configuration loaded");
    }

    let config = loader.into_config();
    let result = match args.command.unwrap_or(Mode::Console) {
        Mode::Ports => {
            print_ports();
            Ok(())
        }
        Mode::Profiles => print_profiles(&config, args.profiles_dir),
        Mode::Console => run_console(&config, args.profiles_dir).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "serialdesk stopped");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(config: &LoggingConfig, level: Option<&str>) {
    let directive = level.unwrap_or(config.level.as_str());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

fn print_ports() {
    let ports = list_port_names();
    if ports.is_empty() {
        println!("No serial ports found.");
    }
    for port in ports {
        println!("{port}");
    }
}

fn print_profiles(config: &Config, profiles_dir: Option<PathBuf>) -> AppResult<()> {
    let store = app::profile_store(&config.profiles, profiles_dir)?;
    let set = store.load();
    println!("{}", store.path().display());
    for (name, profile) in &set.profiles {
        let default_tag = if *name == set.default_profile_name { " (default)" } else { "" };
        println!(
            "  {name}{default_tag}: {} {} {}/{}/{}",
            profile.port_name.as_deref().unwrap_or("-"),
            profile.baud_rate,
            profile.data_bits,
            profile.parity,
            profile.stop_bits
        );
    }
    Ok(())
}

fn warn_if_not_writable(store: &ProfileStore) -> Option<String> {
    if !permission::ensure_directory(store.directory()) {
        return Some(format!(
            "No write permission for {}. Profiles cannot be saved.",
            store.directory().display()
        ));
    }
    if !permission::check_file_permissions(store.path()) {
        return Some(format!(
            "Profile file {} is not writable. Profiles cannot be saved.",
            store.path().display()
        ));
    }
    None
}

async fn run_console(config: &Config, profiles_dir: Option<PathBuf>) -> AppResult<()> {
    let store = app::profile_store(&config.profiles, profiles_dir)?;
    let permission_warning = warn_if_not_writable(&store);
    let profiles = Arc::new(ProfileManager::open(store));

    let (mut controller, mut serial_rx) =
        app::build_controller(config, Arc::new(SystemPortOpener), Arc::clone(&profiles));
    let sink = controller.sink();
    if let Some(message) = permission_warning {
        sink.warn(message);
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();

    let _watcher = if config.profiles.watch {
        let tx = event_tx.clone();
        match ProfileWatcher::start(
            profiles.store().path(),
            config.profiles.watch_debounce(),
            move || {
                let _ = tx.send(AppEvent::ProfilesChanged);
            },
        ) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "profile file will not be watched");
                None
            }
        }
    } else {
        None
    };

    let input_tx = event_tx.clone();
    let input_sink = sink.clone();
    std::thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || app::forward_lines(std::io::stdin().lock(), &input_tx, &input_sink))?;
    drop(event_tx);

    println!(
        "serialdesk: profile '{}', {} mode. Type :help for commands.",
        profiles.selected(),
        controller.messaging().mode()
    );

    loop {
        let event = tokio::select! {
            Some(event) = event_rx.recv() => event,
            Some(serial) = serial_rx.recv() => AppEvent::Serial(serial),
            _ = tokio::signal::ctrl_c() => AppEvent::Command(Command::Quit),
            else => break,
        };

        let flow = controller.handle(event).await;
        let mut stdout = std::io::stdout().lock();
        for line in controller.drain_output() {
            let _ = writeln!(stdout, "{line}");
        }
        let _ = stdout.flush();

        if flow == Flow::Quit {
            break;
        }
    }

    info!("console closed");
    Ok(())
}
