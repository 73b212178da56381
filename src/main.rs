//! relayout - keyboard layout auto-corrector for Linux desktops
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  evdev devices (+ udev hotplug)              │
//! │                    ↓                         │
//! │  EventInterpreter → InputBuffer              │
//! │                    ↓ Convert                 │
//! │  ConversionPolicy: retype | selection        │
//! │        ↓                        ↓            │
//! │  uinput replay        clipboard / primary    │
//! │                    ↓                         │
//! │  LayoutManager (key combo / command)         │
//! └──────────────────────────────────────────────┘
//! ```

mod config;
mod constants;
mod conversion;
mod engine;
mod input;
mod layout;
mod signals;
mod system;
mod worker;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::conversion::dictionary::LearnedDetector;
use crate::conversion::selection::SelectionProtocol;
use crate::conversion::{
    ConversionPolicy, FileDictionary, KeymapConverter, TextConverter, WindowInspector,
};
use crate::engine::{Engine, EngineParts};
use crate::input::{DeviceManager, EvdevBackend, VirtualKeyboard};
use crate::layout::{LayoutManager, LayoutObserver, XkbKeymaps};
use crate::system::clipboard::{ClipboardTool, CommandClipboard, KeyboardSelection, NoClipboard};
use crate::system::layout::{LayoutPoller, SwitchMethod, SystemLayoutAdapter};
use crate::system::window::XdotoolWindow;
use crate::system::DisplayServer;

/// Print help message
fn print_help() {
    println!(
        r#"relayout {} - keyboard layout auto-corrector

USAGE:
    relayout [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    -v, --verbose           Debug logging (RUST_LOG overrides)
    --list-devices          Print monitored input devices and exit
    --init-config           Generate the default config file
    -f, --force             Overwrite an existing config file

USAGE NOTES:
    Type a word in the wrong layout, then tap Shift twice: the word is
    retyped in the other layout and the layout is switched. With text
    selected, the selection is converted instead.

    Reading /dev/input and creating the virtual keyboard needs access to
    the input group and /dev/uinput.

CONFIG FILE:
    ~/.config/relayout/config.toml
"#,
        env!("CARGO_PKG_VERSION")
    );
}

/// Logs layout switches
struct LayoutLogger;

impl LayoutObserver for LayoutLogger {
    fn layout_changed(&self, old: &str, new: &str) -> Result<()> {
        info!("Layout: {} → {}", old, new);
        Ok(())
    }
}

fn open_devices(config: &Config) -> DeviceManager {
    DeviceManager::new(Box::new(EvdevBackend::new()), &config.devices.exclude)
}

fn list_devices(config: &Config) -> Result<()> {
    let devices = open_devices(config);
    if devices.scan() == 0 {
        println!("No eligible input devices (check permissions on /dev/input)");
        return Ok(());
    }
    for record in devices.records() {
        println!(
            "{:>3}  {:<24} {:?}  {}",
            record.id,
            record.path.display(),
            record.capabilities,
            record.name
        );
    }
    devices.close();
    Ok(())
}

fn init_config(force: bool) -> Result<()> {
    match Config::write_default_config(force) {
        Ok(path) => {
            println!("Config file generated: {}", path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to generate config: {:#}", e);
            Err(e)
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // --help
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // --version
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("relayout {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.iter().any(|a| a == "--init-config") {
        let force = args.iter().any(|a| a == "--force" || a == "-f");
        return init_config(force);
    }

    let mut cfg = Config::load();

    if args.iter().any(|a| a == "--list-devices") {
        return list_devices(&cfg);
    }

    info!("relayout starting...");
    signals::setup_signal_handlers();

    // Config file change watcher (Linux only)
    #[cfg(target_os = "linux")]
    let config_watcher = Config::config_path().and_then(|path| {
        config::ConfigWatcher::new(&path)
            .map_err(|e| warn!("Config watcher unavailable: {:#}", e))
            .ok()
    });
    #[cfg(target_os = "linux")]
    if config_watcher.is_some() {
        info!("Config hot-reload enabled");
    }

    // Our own keyboard first, so its node is already excluded when scanning
    let keys = VirtualKeyboard::create(Duration::from_millis(cfg.conversion.replay_key_delay_ms))?
        .shared();

    let devices = Arc::new(open_devices(&cfg));
    if devices.scan() == 0 {
        return Err(anyhow!(
            "No input devices to monitor (is the user in the 'input' group?)"
        ));
    }

    #[cfg(target_os = "linux")]
    let mut hotplug = if cfg.devices.hotplug {
        match input::hotplug::HotplugWatcher::start(
            devices.clone(),
            Duration::from_millis(cfg.devices.settle_delay_ms),
        ) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Hotplug disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    // Layouts
    let method = SwitchMethod::from_config(
        &cfg.layouts.switch_keys,
        cfg.layouts.switch_command.as_deref(),
        keys.clone(),
    )?;
    let layouts = Arc::new(LayoutManager::new(
        Box::new(SystemLayoutAdapter::new(method, cfg.layouts.layouts.clone())),
        cfg.layouts.layouts.clone(),
    ));
    if let Err(e) = layouts.refresh() {
        warn!("Layout list unavailable: {:#}", e);
    }
    layouts.subscribe(Box::new(LayoutLogger));
    info!("Layouts: {:?} (current: {:?})", layouts.available(), layouts.current());
    let mut layout_poller = match cfg.layouts.poll_interval() {
        Some(interval) => match LayoutPoller::start(layouts.clone(), interval) {
            Ok(poller) => Some(poller),
            Err(e) => {
                warn!("Layout poller disabled: {:#}", e);
                None
            }
        },
        None => {
            info!("Layout polling disabled");
            None
        }
    };

    // Desktop adapters
    let display = DisplayServer::detect();
    debug!("Display server: {:?}", display);
    let selection = match ClipboardTool::detect(display) {
        Some(tool) => SelectionProtocol::new(
            Box::new(CommandClipboard::new(tool, keys.clone())),
            cfg.selection.read_timeout(),
        ),
        None => {
            warn!("No clipboard tool found (wl-clipboard or xclip): selection mode disabled");
            SelectionProtocol::new(Box::new(NoClipboard), cfg.selection.read_timeout())
        }
    }
    .with_keys(Box::new(KeyboardSelection::new(keys.clone())))
    .with_paste_settle(cfg.selection.paste_settle());

    let window = XdotoolWindow::detect(display).map(|w| Box::new(w) as Box<dyn WindowInspector>);
    let policy = ConversionPolicy::new(window);

    // Learning
    let dictionary = match FileDictionary::default_path() {
        Some(path) => FileDictionary::open(&path),
        None => {
            warn!("Data directory not found: learned words are not persisted");
            FileDictionary::in_memory()
        }
    }
    .shared();
    let converter: Arc<dyn TextConverter> = Arc::new(KeymapConverter::new());
    let detector = Box::new(LearnedDetector::new(dictionary.clone(), converter.clone()));

    let mut engine = Engine::new(
        EngineParts {
            policy,
            selection,
            layouts: layouts.clone(),
            keys,
            converter,
            dictionary,
            detector,
            renderer: Some(Box::new(XkbKeymaps::new())),
        },
        &cfg,
    );

    info!("Monitoring {} input device(s)", devices.len());

    // Notify systemd that we're ready
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

    let poll_timeout = Duration::from_millis(constants::POLL_TIMEOUT_MS);
    loop {
        if signals::shutdown_requested() {
            info!("Shutdown requested, stopping...");
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            break;
        }

        for event in devices.poll(poll_timeout) {
            engine.handle_event(&event);
        }

        // Config hot-reload (Linux only)
        #[cfg(target_os = "linux")]
        if let Some(ref watcher) = config_watcher {
            if watcher.check_reload() {
                info!("Config file change detected, reloading...");
                cfg = Config::load();
                engine.apply_config(&cfg);
                if !cfg.layouts.layouts.is_empty() {
                    layouts.set_available(cfg.layouts.layouts.clone());
                }
            }
        }
    }

    if let Some(poller) = layout_poller.as_mut() {
        poller.stop();
    }
    #[cfg(target_os = "linux")]
    if let Some(watcher) = hotplug.as_mut() {
        watcher.stop();
    }
    devices.close();
    info!("relayout stopped");
    Ok(())
}
