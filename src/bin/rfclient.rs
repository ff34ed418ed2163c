//! Interactive remote file client.

use std::io;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use rfnet::console::{run_session, Console};
use rfnet::{logging, FileClient, RpcConfig};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "rfclient", about = "Get and send files through a remote file server")]
struct Args {
    /// Server address, e.g. 127.0.0.1:8770.
    server: SocketAddr,

    /// Per-call timeout in seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_tracing();
    let args = Args::parse();

    let mut config = RpcConfig::from_env("0.0.0.0:0");
    if let Some(secs) = args.timeout {
        config = config.with_call_timeout(Duration::from_secs(secs));
    }

    let client = match FileClient::connect(args.server, config).await {
        Ok(client) => client,
        Err(e) => {
            error!("cannot reach {}: {e}", args.server);
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stdout());
    match run_session(&client, &mut console).await {
        Ok(summary) => {
            println!(
                "Session finished: {} transfers completed, {} failed.",
                summary.completed, summary.failed
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("session aborted: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_must_be_positive() {
        assert!(Args::try_parse_from(["rfclient", "127.0.0.1:8770", "--timeout", "0"]).is_err());

        let args = Args::try_parse_from(["rfclient", "127.0.0.1:8770", "--timeout", "3"]).unwrap();
        assert_eq!(args.timeout, Some(3));
        let args = Args::try_parse_from(["rfclient", "127.0.0.1:8770"]).unwrap();
        assert_eq!(args.timeout, None);
    }
}
