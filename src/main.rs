use anyhow::{Context, Result};
use clap::Parser;
use golive::platform::mock::{MockPlatformAdapter, MockSocialPoster};
use golive::transmission::mock::MockTransmissionEngine;
use golive::{
    ChecklistPlan, GoLiveConfig, GoLiveEvent, KeyboardInputHandler, Lifecycle, Platform, PlatformRegistry,
    SettingsSynchronizer, StreamErrorKind, StreamingService,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "golive")]
#[command(about = "Multi-destination go-live orchestrator")]
#[command(version)]
#[command(long_about = "Runs a streaming session against simulated platforms and a simulated \
transmission engine: settings synchronization, the go-live checklist, and live status tracking \
for streaming, recording, and the replay buffer.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "golive.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting a session")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Synchronize settings and print the checklist without going live
    #[arg(long, help = "Synchronize settings and print the go-live checklist, then exit")]
    dry_run: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Also write logs to daily rotated files in this directory
    #[arg(long, value_name = "DIR", help = "Write logs to daily rotated files in DIR")]
    log_dir: Option<String>,

    /// Make a simulated platform reject its broadcast start
    #[arg(long, value_name = "PLATFORM", value_parser = parse_platform, help = "Simulate a platform rejecting the go-live (repeatable)")]
    fail: Vec<Platform>,

    /// Control the session from the keyboard instead of going live immediately
    #[arg(short, long, help = "Interactive mode: s stream, r record, b replay buffer, q quit")]
    interactive: bool,
}

fn parse_platform(value: &str) -> std::result::Result<Platform, String> {
    value.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting golive v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = GoLiveConfig::load_from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config))?;

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate().context("invalid configuration")?;

    let adapters: Vec<Arc<MockPlatformAdapter>> = Platform::ALL
        .iter()
        .map(|platform| {
            let mut adapter = MockPlatformAdapter::new(*platform).with_delay(Duration::from_millis(300));
            if args.fail.contains(platform) {
                adapter = adapter.fail_start(StreamErrorKind::PlatformRejected, "simulated rejection");
            }
            Arc::new(adapter)
        })
        .collect();

    if args.dry_run {
        return dry_run(&config, &adapters).await;
    }

    let mut builder = StreamingService::builder()
        .with_config(config.clone())
        .with_engine(Arc::new(MockTransmissionEngine::new().with_delay(Duration::from_millis(500))))
        .with_social_poster(Arc::new(MockSocialPoster::new()));
    for adapter in &adapters {
        builder = builder.with_platform(adapter.clone());
    }
    let service = builder.build().context("failed to start streaming session")?;

    spawn_event_printer(&service);

    let quit = CancellationToken::new();
    let keyboard = if args.interactive {
        let handler = KeyboardInputHandler::new(service.clone(), quit.clone());
        handler.start().await?;
        Some(handler)
    } else {
        go_live(&service, &config).await;
        None
    };

    let reason = golive::run_until_shutdown(&service, quit).await?;

    if let Some(keyboard) = keyboard {
        keyboard.stop().await?;
    }
    info!("golive exited ({:?})", reason);
    Ok(())
}

/// Request, synchronize, and confirm the configured go-live
async fn go_live(service: &StreamingService, config: &GoLiveConfig) {
    if let Err(e) = service.request_go_live(config.go_live.clone()).await {
        error!("Go-live request rejected: {}", e);
        return;
    }

    let synced = service
        .wait_for(|state| state.info.lifecycle != Lifecycle::Prepopulate)
        .await;
    match synced {
        Ok(state) if state.info.lifecycle == Lifecycle::WaitForNewSettings => {
            if let Err(e) = service.confirm_checklist().await {
                error!("Go-live confirmation rejected: {}", e);
            }
        }
        Ok(state) => warn!(
            "Settings synchronization ended in {}: {:?}",
            state.info.lifecycle, state.info.error
        ),
        Err(e) => error!("Session closed during synchronization: {}", e),
    }
}

fn spawn_event_printer(service: &StreamingService) {
    let mut events = service.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(GoLiveEvent::GoLiveFailed { error }) => warn!("Go-live failed: {}", error),
                Ok(event) => info!("{}", event.description()),
                Err(RecvError::Lagged(n)) => warn!("Event printer lagged by {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn dry_run(config: &GoLiveConfig, adapters: &[Arc<MockPlatformAdapter>]) -> Result<()> {
    info!("Dry run - synchronizing settings without going live");

    let mut registry = PlatformRegistry::new();
    for adapter in adapters {
        registry.register(adapter.clone());
    }
    let synchronizer = SettingsSynchronizer::new(registry, config.timeouts.settings_fetch());
    let settings = synchronizer.synchronize(&config.go_live).await?;

    let plan = ChecklistPlan::from_settings(&settings);
    let steps: Vec<_> = plan
        .steps()
        .map(|step| {
            json!({
                "step": step,
                "dependsOn": plan.dependencies(step),
            })
        })
        .collect();
    let report = json!({
        "settings": settings,
        "validationError": settings.validate_for_go_live().map_err(|e| e.to_string()).err(),
        "checklist": steps,
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    println!("✓ Dry run completed successfully");
    Ok(())
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("golive={},telemetry={}", log_level, log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    let (file_layer, guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "golive.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_writer(writer).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# golive configuration file");
    println!("# Environment overrides use GOLIVE_<SECTION>__<KEY>, e.g. GOLIVE_TIMEOUTS__STEP_SECS=5");
    println!();
    println!("{}", toml::to_string_pretty(&GoLiveConfig::default())?);
    Ok(())
}
