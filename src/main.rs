//! CLI for devicelink
//!
//! Subcommands:
//! - `telemetry`: connect with the configured connection string and send a
//!   batch of messages, waiting for every confirmation
//! - `provision`: register through the provisioning endpoint, then send a few
//!   messages to the assigned hub
//! - `hub`: run the local hub and provisioning simulator
//!
//! `--dry-run` swaps the network transports for the in-memory loopback.

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use devicelink::client::{
    ClientOptions, DeviceClient, HttpProxy, Message, PrivateKey, TelemetryLoop, X509Credential,
};
use devicelink::config::{Settings, load_config};
use devicelink::hub::{Hub, start_hub_server};
use devicelink::persistence::EventStore;
use devicelink::platform::Platform;
use devicelink::provisioning::{ProvisioningClient, ProvisioningOption};
use devicelink::transport::{LoopbackConfig, LoopbackFactory, ProvisioningScript, TransportProvider};
use devicelink::utils::logging;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "devicelink", version, about = "Device-to-cloud telemetry client")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send telemetry with the configured connection string
    Telemetry {
        /// Number of messages to send (overrides configuration)
        #[arg(long)]
        count: Option<usize>,
        /// Transport: mqtt, mqtt-ws, amqp, amqp-ws or http (overrides configuration)
        #[arg(long)]
        transport: Option<String>,
        /// Use the in-memory loopback transport
        #[arg(long)]
        dry_run: bool,
    },
    /// Register the device, then send telemetry to the assigned hub
    Provision {
        /// Use the in-memory loopback transport
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the local hub simulator
    Hub,
}

#[tokio::main]
async fn main() -> CliResult {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let config = load_config()?;
    info!("devicelink {}", Platform::version());

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received. Cancelling.");
            on_signal.cancel();
        }
    });

    let outcome = match cli.command {
        Command::Telemetry {
            count,
            transport,
            dry_run,
        } => run_telemetry(&config, count, transport, dry_run, &cancel).await,
        Command::Provision { dry_run } => run_provision(&config, dry_run, &cancel).await,
        Command::Hub => run_hub(&config).await,
    };

    if let Err(e) = &outcome {
        error!("Command failed: {e}");
    }
    outcome
}

fn platform_for(dry_run: bool) -> Platform {
    if dry_run {
        info!("Dry run: using the loopback transport");
        Platform::with_factory(Arc::new(LoopbackFactory::new(
            LoopbackConfig::default(),
            ProvisioningScript::default(),
        )))
    } else {
        Platform::init()
    }
}

fn sample_message(payload: &str) -> Result<Message, Box<dyn std::error::Error>> {
    let mut message = Message::from_text(payload);
    message
        .set_message_id("MSG_ID")
        .set_correlation_id("CORE_ID")
        .set_content_type("application%2Fjson")
        .set_content_encoding("utf-8")
        .set_property("property_key", "property_value")?;
    Ok(message)
}

fn proxy_from(config: &Settings) -> Option<HttpProxy> {
    config.proxy.as_ref().map(|p| {
        let proxy = HttpProxy::new(p.host.clone(), p.port);
        match (&p.username, &p.password) {
            (Some(user), Some(pass)) => proxy.with_credentials(user.clone(), pass.clone()),
            _ => proxy,
        }
    })
}

fn client_options(config: &Settings) -> Result<ClientOptions, Box<dyn std::error::Error>> {
    let hub = &config.hub;
    let mut options = ClientOptions::default().with_trace(hub.trace);

    if let Some(path) = &hub.trusted_certificate_path {
        options = options.with_trusted_certificate(fs::read(path)?);
    }

    let private_key = match (&hub.x509_private_key_path, &hub.x509_engine, &hub.x509_key_id) {
        (Some(path), _, _) => Some(PrivateKey::Pem(fs::read_to_string(path)?)),
        (None, Some(engine), Some(key_id)) => Some(PrivateKey::Engine {
            engine: engine.clone(),
            key_id: key_id.clone(),
        }),
        _ => None,
    };
    if let Some(path) = &hub.x509_certificate_path {
        let Some(private_key) = private_key else {
            return Err("x509 certificate configured without a private key".into());
        };
        options = options.with_x509(X509Credential {
            certificate: fs::read_to_string(path)?,
            private_key,
        });
    }

    if let Some(proxy) = proxy_from(config) {
        options = options.with_http_proxy(proxy);
    }
    Ok(options)
}

async fn run_telemetry(
    config: &Settings,
    count: Option<usize>,
    transport: Option<String>,
    dry_run: bool,
    cancel: &CancellationToken,
) -> CliResult {
    let provider: TransportProvider = transport
        .as_deref()
        .unwrap_or(&config.hub.transport)
        .parse()?;
    let platform = platform_for(dry_run);

    let mut client = DeviceClient::from_connection_string(
        &platform,
        &config.hub.connection_string,
        provider,
        client_options(config)?,
    )?;

    let telemetry = TelemetryLoop::new(count.unwrap_or(config.telemetry.message_count))
        .with_poll_interval(Duration::from_millis(config.telemetry.poll_interval_ms))
        .with_timeout(Duration::from_secs(config.telemetry.timeout_secs));
    let message = sample_message(&config.telemetry.payload)?;

    let outcome = telemetry
        .run(&mut client, |_| message.clone(), cancel)
        .await;

    let leftover = client.destroy().await?;
    if !leftover.is_empty() {
        warn!("{} confirmations were still pending at shutdown", leftover.len());
    }
    platform.deinit()?;

    let report = outcome?;
    info!(
        sent = report.sent,
        confirmed = report.confirmed,
        failures = report.failures.len(),
        "telemetry finished"
    );
    if !report.is_success() {
        return Err(format!("{} messages were not confirmed as Ok", report.failures.len()).into());
    }
    Ok(())
}

async fn run_provision(config: &Settings, dry_run: bool, cancel: &CancellationToken) -> CliResult {
    let settings = &config.provisioning;
    let provider: TransportProvider = settings.transport.parse()?;
    let platform = platform_for(dry_run);

    let mut provisioning = ProvisioningClient::create(
        &platform,
        &settings.global_endpoint,
        &settings.id_scope,
        provider,
    )?;
    provisioning.set_option(ProvisioningOption::Trace(settings.trace))?;
    provisioning.set_option(ProvisioningOption::RegistrationId(
        settings.registration_id.clone(),
    ))?;
    if let Some(proxy) = proxy_from(config) {
        provisioning.set_option(ProvisioningOption::HttpProxy(proxy))?;
    }

    let mut handle = provisioning.register_device();
    let deadline = Instant::now() + Duration::from_secs(settings.timeout_secs);
    loop {
        tokio::select! {
            status = handle.next_status() => match status {
                Some(status) => info!("Provisioning status: {status}"),
                None => break,
            },
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }
    let assignment = handle
        .wait(deadline.saturating_duration_since(Instant::now()), cancel)
        .await?;
    info!(
        hub = assignment.assigned_hub(),
        device_id = assignment.device_id(),
        "registration complete"
    );

    let mut client = DeviceClient::from_device_auth(
        &platform,
        &assignment,
        provider,
        client_options_for_device_auth(config),
    )?;

    let telemetry = TelemetryLoop::new(settings.messages)
        .with_poll_interval(Duration::from_millis(config.telemetry.poll_interval_ms))
        .with_timeout(Duration::from_secs(config.telemetry.timeout_secs));
    let outcome = telemetry
        .run(
            &mut client,
            |n| Message::from_text(&format!("Hello World {}!", n + 1)),
            cancel,
        )
        .await;

    client.destroy().await?;
    platform.deinit()?;

    let report = outcome?;
    if !report.is_success() {
        return Err(format!("{} messages were not confirmed as Ok", report.failures.len()).into());
    }
    Ok(())
}

fn client_options_for_device_auth(config: &Settings) -> ClientOptions {
    let options = ClientOptions::default().with_trace(config.provisioning.trace);
    match proxy_from(config) {
        Some(proxy) => options.with_http_proxy(proxy),
        None => options,
    }
}

async fn run_hub(config: &Settings) -> CliResult {
    let settings = &config.simulator;
    let store = EventStore::new(
        &settings.db_path,
        settings.event_ttl_secs,
        settings.max_events_per_device,
    )?;
    let hub = Arc::new(Mutex::new(Hub::from_settings(store, settings)));

    tokio::select! {
        served = start_hub_server(settings.bind_addr(), hub) => {
            served?;
            error!("Hub simulator exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }
    Ok(())
}
