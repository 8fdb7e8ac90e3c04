#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

mod config;

use std::{
    fs::{self, File},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};

use clap::Parser;
use rgpu_device::{
    CreateCompatibleError, Device, DeviceSelectConfig, Instance, InstanceExtensions,
    PhysicalDeviceSummary, Surface, VulkanLogLevel, list_physical_devices,
};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::{Window as WinitWindow, WindowAttributes},
};

use crate::config::ProbeConfig;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default, clap::ValueEnum)]
enum TracingLogLevel {
    Off,
    Trace,
    Info,
    Debug,
    Warn,
    #[default]
    Error,
}

impl From<TracingLogLevel> for tracing::Level {
    fn from(value: TracingLogLevel) -> Self {
        match value {
            //Off never installs a subscriber so this arm is never hit
            TracingLogLevel::Off => tracing::Level::TRACE,
            TracingLogLevel::Trace => tracing::Level::TRACE,
            TracingLogLevel::Info => tracing::Level::INFO,
            TracingLogLevel::Debug => tracing::Level::DEBUG,
            TracingLogLevel::Warn => tracing::Level::WARN,
            TracingLogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliVulkanLogLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

impl From<CliVulkanLogLevel> for VulkanLogLevel {
    fn from(value: CliVulkanLogLevel) -> Self {
        match value {
            CliVulkanLogLevel::Verbose => VulkanLogLevel::Verbose,
            CliVulkanLogLevel::Info => VulkanLogLevel::Info,
            CliVulkanLogLevel::Warning => VulkanLogLevel::Warning,
            CliVulkanLogLevel::Error => VulkanLogLevel::Error,
        }
    }
}

/// Bring up a Vulkan device against a window and report what was chosen.
#[derive(clap::Parser, Debug)]
struct CliArgs {
    #[arg(short, long, default_value = "error")]
    tracing_log_level: TracingLogLevel,
    /// Forward validation messages at or above this severity
    #[arg(short, long)]
    graphics_debug_level: Option<CliVulkanLogLevel>,
    /// Index of the physical device to prefer. Negative means no preference
    #[arg(short, long, allow_negative_numbers = true)]
    device: Option<i64>,
    /// Enable the validation layer on the logical device
    #[arg(long)]
    validation: bool,
    /// Config file. Defaults to probe.toml in the platform config directory
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Print every physical device instead of bringing one up
    #[arg(short, long)]
    list_devices: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeMode {
    List,
    BringUp,
}

fn main() -> eyre::Result<ExitCode> {
    let app_dirs = directories::ProjectDirs::from("", "parengus", "device-probe");

    let log_dir = match app_dirs
        .as_ref()
        .and_then(|x| x.runtime_dir().or_else(|| Some(x.data_dir())))
        .map(|p| p.to_owned())
    {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    let cli_args = CliArgs::parse();

    if cli_args.tracing_log_level != TracingLogLevel::Off {
        fs::create_dir_all(&log_dir)?;

        let log_file_path = log_dir.join("log-file.txt");
        let log_file = File::create(&log_file_path)?;
        let file_log = tracing_subscriber::fmt::layer()
            .with_writer(log_file)
            .with_ansi(false);

        let stdout_log = tracing_subscriber::fmt::layer().pretty();

        tracing_subscriber::registry()
            .with(
                stdout_log
                    .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
                        cli_args.tracing_log_level.into(),
                    ))
                    .and_then(file_log),
            )
            .init();
        tracing::debug!("Logging to {}", log_file_path.display());
    }

    let file_config = ProbeConfig::load(
        cli_args.config.as_deref(),
        app_dirs
            .as_ref()
            .map(|dirs| dirs.config_dir().join("probe.toml")),
    )?;
    let select_config = file_config.with_overrides(cli_args.device, cli_args.validation);
    tracing::debug!("Device selection config: {select_config:?}");

    let event_loop = winit::event_loop::EventLoop::builder().build()?;

    //SAFETY: Loads vulkan via libloading, nothing else in the process is
    //touching the loader yet
    let instance = Arc::new(unsafe {
        Instance::new(
            "device-probe",
            cli_args.graphics_debug_level.map(Into::into),
            Some(&event_loop),
            InstanceExtensions { surface: true },
        )
    }?);
    tracing::info!(
        "Vulkan instance {} (validation {})",
        instance.supported_ver(),
        if instance.has_validation() { "on" } else { "off" }
    );

    let mode = if cli_args.list_devices {
        ProbeMode::List
    } else {
        ProbeMode::BringUp
    };

    let mut app = AppRunner(Some(App::Probing(ProbingState {
        instance,
        select_config,
        mode,
    })));

    tracing::trace!("Entering main event loop");
    event_loop.run_app(&mut app)?;

    match app.0.take() {
        Some(App::Finished(FinishedState { outcome })) => {
            let report = outcome?;
            if let ProbeReport::BringUpFailed { class } = report {
                tracing::debug!("Exiting with failure status after: {class}");
            }
            Ok(report.exit_code())
        }
        _ => Err(eyre::eyre!("Event loop exited before the probe ran")),
    }
}

#[derive(Debug)]
struct AppRunner(Option<App>);

#[derive(Debug)]
enum App {
    Probing(ProbingState),
    Finished(FinishedState),
}

#[derive(Debug)]
struct ProbingState {
    instance: Arc<Instance>,
    select_config: DeviceSelectConfig,
    mode: ProbeMode,
}

#[derive(Debug)]
struct FinishedState {
    outcome: eyre::Result<ProbeReport>,
}

/// How a probe run ended once the window and surface existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeReport {
    Done,
    /// `Device::create_compatible` already logged the failure
    BringUpFailed { class: &'static str },
}

impl ProbeReport {
    fn exit_code(self) -> ExitCode {
        match self {
            ProbeReport::Done => ExitCode::SUCCESS,
            ProbeReport::BringUpFailed { .. } => ExitCode::FAILURE,
        }
    }
}

/// Print a successful bring-up. A failure is only turned into a report
/// since the library has logged it already.
fn report_bring_up<D>(
    result: Result<D, CreateCompatibleError>,
    print: impl FnOnce(&D),
) -> ProbeReport {
    match result {
        Ok(device) => {
            print(&device);
            ProbeReport::Done
        }
        Err(e) => ProbeReport::BringUpFailed {
            class: e.failure_class(),
        },
    }
}

fn print_device_list(devices: &[PhysicalDeviceSummary]) {
    println!("{} Vulkan-capable device(s)", devices.len());
    for dev in devices {
        println!(
            "[{}] {} {} ({}), Vulkan {}",
            dev.index, dev.vendor_name, dev.name, dev.device_type_name, dev.api_version
        );
    }
}

fn print_bring_up(device: &Device) {
    let physical = device.physical_device();
    let families = device.queue_families();
    let features = device.enabled_features();
    println!(
        "[{}] {} {} ({}), Vulkan {}",
        physical.index(),
        device.vendor_name(),
        physical.name(),
        device.device_type_name(),
        physical.api_version()
    );
    println!(
        "queue families: graphics {}, present {}, transfer {}",
        families.graphics, families.present, families.transfer
    );
    println!(
        "features: samplerAnisotropy {}, fillModeNonSolid {}, sampleRateShading {}",
        features.sampler_anisotropy != 0,
        features.fill_mode_non_solid != 0,
        features.sample_rate_shading != 0
    );
}

impl ProbingState {
    fn run(self, win: Arc<WinitWindow>) -> eyre::Result<ProbeReport> {
        //SAFETY: The surface is dropped at the end of this function, well
        //before the window or the event loop go away
        let surface = unsafe { Surface::new(&self.instance, win) }?;

        Ok(match self.mode {
            ProbeMode::List => {
                print_device_list(&list_physical_devices(&surface)?);
                ProbeReport::Done
            }
            ProbeMode::BringUp => report_bring_up(
                Device::create_compatible(&self.instance, &surface, &self.select_config),
                print_bring_up,
            ),
        })
    }
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        assert!(self.0.is_some());
        let Some(probing_state) = self.take_probing() else {
            tracing::warn!("resumed() called after the probe already ran");
            return;
        };

        let outcome = event_loop
            .create_window(
                WindowAttributes::default()
                    .with_title("device-probe")
                    .with_visible(false),
            )
            .map_err(eyre::Report::from)
            .and_then(|win| probing_state.run(Arc::new(win)));

        self.finish(outcome, event_loop);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        window_event: WindowEvent,
    ) {
        if matches!(window_event, WindowEvent::CloseRequested) {
            tracing::trace!("Close window request received for window");
            event_loop.exit();
        }
    }
}

impl AppRunner {
    fn take_probing(&mut self) -> Option<ProbingState> {
        assert!(self.0.is_some());
        if matches!(self.0, Some(App::Probing(_))) {
            match self.0.take() {
                Some(App::Probing(s)) => Some(s),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    fn finish(&mut self, outcome: eyre::Result<ProbeReport>, event_loop: &ActiveEventLoop) {
        assert!(self.0.is_none());
        tracing::debug!("State transition: Probing -> Finished");
        self.0 = Some(App::Finished(FinishedState { outcome }));
        event_loop.exit();
    }
}
