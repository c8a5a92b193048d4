//! Command-line entry point: drains one RabbitMQ queue into another.

use clap::Parser;
use rabbitmq_mover::config;
use rabbitmq_mover::{AckMode, AmqpSession, BrokerConfig, MoveConfig, Mover, MoverError};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

/// Move messages from one RabbitMQ queue to another
#[derive(Parser, Debug)]
#[command(name = "rabbitmq-mover", version)]
struct Args {
    /// The name of the queue to drain
    #[arg(long)]
    from: String,

    /// The name of the destination queue. Without it, each message's
    /// 'enqueue.topic' header names its destination
    #[arg(long)]
    to: Option<String>,

    /// Number of messages to move (0 for all messages)
    #[arg(long, default_value_t = 0, conflicts_with = "auto_ack")]
    count: u64,

    /// Consume messages as they are pulled. A message whose republish fails
    /// is lost rather than requeued. Requires --to
    #[arg(long)]
    auto_ack: bool,

    /// Wait for the broker to confirm every publish
    #[arg(long)]
    confirm: bool,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// AMQP URL of the broker
    #[arg(long, env = "RABBITMQ_URL", hide_env_values = true)]
    url: Option<String>,

    /// Environment file to load instead of .env, read before the other arguments
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // The env file has to be loaded before clap resolves RABBITMQ_URL.
    if let Err(e) = config::load_env_file(env_file_arg(std::env::args_os()).as_deref()) {
        log::error!("{}", e);
        return ExitCode::FAILURE;
    }

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Finds the `--env-file` value without a full parse.
fn env_file_arg<I>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--env-file" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.to_str().and_then(|a| a.strip_prefix("--env-file=")) {
            return Some(PathBuf::from(path));
        }
    }
    None
}

async fn run(args: Args) -> Result<(), MoverError> {
    if let Some(ref path) = args.env_file {
        log::info!("Using environment file {}", path.display());
    }
    let broker = BrokerConfig::new(args.url.unwrap_or_default())?.with_publisher_confirms(args.confirm);

    let ack_mode = if args.auto_ack {
        AckMode::Immediate
    } else {
        AckMode::Deferred
    };
    let mut builder = MoveConfig::builder(args.from)
        .limit(args.count)
        .ack_mode(ack_mode);
    if let Some(to) = args.to {
        builder = builder.to_queue(to);
    }
    let move_config = builder.build()?;

    let session = AmqpSession::connect(&broker).await?;
    let result = Mover::new(&session, move_config).run().await;

    if let Err(e) = session.close().await {
        log::warn!("Failed to close the RabbitMQ connection cleanly: {}", e);
    }

    let report = result?;
    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}
