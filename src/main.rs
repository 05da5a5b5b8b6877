use anyhow::Result;
use clap::Parser;
use forward_amd::{
    config::{Config, ForwardingMode, RescheduleMode},
    provider::{ProviderCredentials, ProviderEndpoints},
    server::run_server,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "forward-amd")]
#[command(about = "Call forwarding with answering machine detection")]
struct Args {
    /// Server host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(long, default_value = "5000")]
    port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Park callers in a conference or enqueue them through the task router
    #[arg(long, value_enum, default_value_t = ForwardingMode::Conference)]
    mode: ForwardingMode,

    /// Provider account SID
    #[arg(long, env = "TWILIO_ACCOUNT_SID")]
    account_sid: String,

    /// Provider auth token
    #[arg(long, env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    auth_token: String,

    /// Voice API base URL
    #[arg(long, default_value = "https://api.twilio.com")]
    api_base_url: String,

    /// Task-routing API base URL
    #[arg(long, default_value = "https://taskrouter.twilio.com")]
    taskrouter_base_url: String,

    /// Caller id for outbound calls; defaults to the inbound caller
    #[arg(long)]
    caller_id: Option<String>,

    /// Number to forward to (conference mode)
    #[arg(long)]
    destination: Option<String>,

    /// Task-router workspace friendly name (task-router mode)
    #[arg(long)]
    workspace_name: Option<String>,

    /// Externally reachable base URL; discovered from ngrok when omitted
    #[arg(long)]
    public_url: Option<String>,

    /// Seconds a worker stays unavailable after a dial attempt
    #[arg(long, default_value = "30")]
    cooldown_secs: u64,

    /// How workers return to Idle after a bridged call
    #[arg(long, value_enum, default_value_t = RescheduleMode::Timer)]
    reschedule: RescheduleMode,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing with both console and file logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let logs_dir = std::path::Path::new(".forward-amd/logs");
    std::fs::create_dir_all(logs_dir)?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, "server.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter.clone()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter),
        )
        .init();

    info!("Starting forward-amd");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Mode: {}", args.mode.as_str());
    info!("Server: {}:{}", args.host, args.port);

    let config = Config {
        host: args.host,
        port: args.port,
        mode: args.mode,
        credentials: ProviderCredentials {
            account_sid: args.account_sid,
            auth_token: args.auth_token,
        },
        endpoints: ProviderEndpoints {
            api_base: args.api_base_url,
            taskrouter_base: args.taskrouter_base_url,
        },
        caller_id: args.caller_id,
        destination_number: args.destination,
        workspace_name: args.workspace_name,
        public_url: args.public_url,
        cooldown_secs: args.cooldown_secs,
        reschedule: args.reschedule,
    };

    run_server(config).await?;

    Ok(())
}
