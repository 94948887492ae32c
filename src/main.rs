use std::env;
use std::io;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;
use wager_eng::Engine;
use wager_eng::csv::{read_commands, write_accounts};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let path = args
        .next()
        .expect("usage: wager-eng <commands.csv> [seed]");
    let mut rng = match args.next() {
        Some(seed) => ChaCha20Rng::seed_from_u64(seed.parse().expect("seed must be a u64")),
        None => ChaCha20Rng::from_entropy(),
    };

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let commands = match read_commands(path) {
        Ok(commands) => commands,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let engine = Engine::new();
    let (cmd_sender, cmd_receiver) = tokio::sync::mpsc::channel(16);

    tokio::task::spawn_blocking(move || {
        for result in commands {
            match result {
                Ok(command) => {
                    if cmd_sender.blocking_send(command).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(cmd_receiver), &mut rng).await;

    let audits = match engine.audit_all() {
        Ok(audits) => audits,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = write_accounts(io::stdout().lock(), audits) {
        error!("failed to write accounts: {e}");
        std::process::exit(1);
    }
}
