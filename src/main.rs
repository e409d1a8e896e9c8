use std::sync::Arc;

use kronos_lib::api::{ApiClient, Device};
use kronos_lib::channel::event_types::{
    EVENT_CONNECTED, EVENT_DISCONNECTED, EVENT_ERROR, EVENT_MESSAGE, EVENT_PREDICTION_UPDATE,
    EVENT_RECONNECTING, EVENT_RECONNECT_EXHAUSTED,
};
use kronos_lib::channel::{listener, ChannelEvent, EventChannel};
use kronos_lib::config::{ws_url_from_api, DashboardConfig};
use kronos_lib::preferences::Preferences;
use kronos_lib::session::DashboardSession;
use tracing::{error, info, warn};

struct Options {
    ws_url: Option<String>,
    api_url: Option<String>,
    use_api: bool,
    load_model: Option<String>,
    device: Option<Device>,
}

#[tokio::main]
async fn main() {
    kronos_lib::init_tracing();
    if let Err(error) = run().await {
        eprintln!("kronos-dashboard failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let Some(options) = parse_args()? else {
        return Ok(());
    };

    let mut config = DashboardConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(api_url) = options.api_url {
        config.api_base_url = api_url.trim_end_matches('/').to_string();
        if options.ws_url.is_none() {
            config.ws_url = ws_url_from_api(&config.api_base_url);
        }
    }
    if let Some(ws_url) = options.ws_url {
        config.ws_url = ws_url;
    }
    if let Some(device) = options.device {
        config.default_device = device;
    }

    match Preferences::load(&config.preferences_path()) {
        Ok(prefs) => info!("preferences loaded (dark mode: {})", prefs.dark_mode),
        Err(e) => warn!("ignoring unreadable preferences: {e}"),
    }

    let channel = Arc::new(EventChannel::websocket(
        config.transport_config(),
        config.reconnect,
    ));
    log_channel_events(&channel);

    let client = ApiClient::new(config.api_client_config()).map_err(|e| e.to_string())?;
    let session = DashboardSession::new(client, channel.clone());

    if options.use_api {
        match session.refresh_models().await {
            Ok(catalog) => info!(
                "{} models available, current: {}",
                catalog.models.len(),
                catalog.current.as_deref().unwrap_or("none")
            ),
            Err(e) => warn!("could not list models: {e}"),
        }
        match session.refresh_data_files().await {
            Ok(files) => {
                for file in &files {
                    info!("data file {} ({} bytes)", file.path, file.size);
                }
            }
            Err(e) => warn!("could not list data files: {e}"),
        }
        if let Some(model_key) = &options.load_model {
            if let Err(e) = session.load_model(model_key, &config.default_device).await {
                warn!("could not load model {model_key}: {e}");
            }
        }
    } else if options.load_model.is_some() {
        warn!("--load-model ignored because --no-api was given");
    }

    session.start(&config.ws_url).map_err(|e| e.to_string())?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for Ctrl-C: {e}"))?;
    info!("shutting down");

    if let Err(e) = session.stop().await {
        warn!("error while stopping session: {e}");
    }
    info!("{} prediction updates received", session.predictions().len());
    channel.shutdown().await;
    Ok(())
}

fn log_channel_events(channel: &EventChannel) {
    channel.on(EVENT_CONNECTED, listener(|_| info!("channel connected")));
    channel.on(EVENT_DISCONNECTED, listener(|_| info!("channel disconnected")));
    channel.on(
        EVENT_ERROR,
        listener(|event| {
            if let ChannelEvent::Error { message } = event {
                warn!("channel error: {message}");
            }
        }),
    );
    channel.on(
        EVENT_RECONNECTING,
        listener(|event| {
            if let ChannelEvent::Reconnecting { attempt, delay_ms } = event {
                info!("reconnect attempt {attempt} in {delay_ms}ms");
            }
        }),
    );
    channel.on(
        EVENT_RECONNECT_EXHAUSTED,
        listener(|event| {
            if let ChannelEvent::ReconnectExhausted { attempts } = event {
                error!("gave up reconnecting after {attempts} attempts; press Ctrl-C to exit");
            }
        }),
    );
    channel.on(
        EVENT_MESSAGE,
        listener(|event| {
            if let Some(payload) = event.payload() {
                info!("message: {payload}");
            }
        }),
    );
    channel.on(
        EVENT_PREDICTION_UPDATE,
        listener(|_| info!("prediction update received")),
    );
}

fn parse_args() -> Result<Option<Options>, String> {
    let mut options = Options {
        ws_url: None,
        api_url: None,
        use_api: true,
        load_model: None,
        device: None,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(None);
        }
        if arg == "--no-api" {
            options.use_api = false;
            continue;
        }
        if let Some(value) = arg.strip_prefix("--ws-url=") {
            options.ws_url = Some(value.to_string());
            continue;
        }
        if arg == "--ws-url" {
            let value = args
                .next()
                .ok_or_else(|| "--ws-url requires a value".to_string())?;
            options.ws_url = Some(value);
            continue;
        }
        if let Some(value) = arg.strip_prefix("--api-url=") {
            options.api_url = Some(value.to_string());
            continue;
        }
        if arg == "--api-url" {
            let value = args
                .next()
                .ok_or_else(|| "--api-url requires a value".to_string())?;
            options.api_url = Some(value);
            continue;
        }
        if let Some(value) = arg.strip_prefix("--load-model=") {
            options.load_model = Some(value.to_string());
            continue;
        }
        if arg == "--load-model" {
            let value = args
                .next()
                .ok_or_else(|| "--load-model requires a value".to_string())?;
            options.load_model = Some(value);
            continue;
        }
        if let Some(value) = arg.strip_prefix("--device=") {
            options.device = Some(parse_device(value));
            continue;
        }
        if arg == "--device" {
            let value = args
                .next()
                .ok_or_else(|| "--device requires a value".to_string())?;
            options.device = Some(parse_device(&value));
            continue;
        }
        return Err(format!("unknown argument '{arg}'. Use --help for usage"));
    }

    Ok(Some(options))
}

fn parse_device(value: &str) -> Device {
    // Infallible: unknown names are passed through to the server.
    value.parse().unwrap_or_default()
}

fn print_help() {
    println!(
        "kronos-dashboard\n\n\
         Connects to a Kronos forecasting service and logs pushed events.\n\n\
         USAGE:\n  kronos-dashboard [--ws-url URL] [--api-url URL] [--no-api] [--load-model KEY [--device NAME]]\n\n\
         OPTIONS:\n\
         \x20 --ws-url URL    push endpoint (default: KRONOS_WS_URL or derived from the API URL)\n\
         \x20 --api-url URL   REST base URL (default: KRONOS_API_URL or http://localhost:8000/api)\n\
         \x20 --no-api        skip listing models and data files at startup\n\
         \x20 --load-model KEY  load a model at startup\n\
         \x20 --device NAME   device for --load-model (default: KRONOS_DEVICE or cpu)\n\
         \x20 -h, --help      show this message"
    );
}
