use std::time::Duration;

use agentwire_cli::{run_cli, CliError};
use agentwire_client::{AgentClient, ClientError};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "agentwire", version, about = "Chat with an AG-UI agent server")]
struct Args {
    /// Run endpoint that accepts AG-UI run requests.
    #[arg(long, env = "AGENTWIRE_URL")]
    url: Option<String>,

    /// Server base URL. The run endpoint is discovered through `/events`.
    #[arg(long, env = "AGENTWIRE_SERVER")]
    server: Option<String>,

    /// Upper bound on a single run, in seconds.
    #[arg(long, env = "AGENTWIRE_TIMEOUT_SECS", default_value_t = 600)]
    timeout: u64,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level(args.verbose)),
    )
    .init();

    let builder = AgentClient::builder().timeout(Duration::from_secs(args.timeout));
    let client = match (args.server, args.url) {
        (Some(server), _) => builder.connect(&server).await?,
        (None, Some(url)) => builder.url(url).build()?,
        (None, None) => {
            return Err(ClientError::Configuration(
                "pass --url or --server (or set AGENTWIRE_URL / AGENTWIRE_SERVER)".to_string(),
            )
            .into())
        }
    };
    log::info!("Using run endpoint {}", client.url().path());

    run_cli(client).await
}
