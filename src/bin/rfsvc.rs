//! Remote file server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rfnet::{logging, FileServer, FileService, RpcConfig, ServiceConfig};

#[derive(Parser, Debug)]
#[command(name = "rfsvc", about = "Serve local files over the remote file protocol")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8770")]
    bind: String,

    /// Serve only paths beneath this directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Number of files that may be open at once.
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_tracing();
    let args = Args::parse();

    let mut config = ServiceConfig::new().with_capacity(args.capacity);
    if let Some(root) = args.root {
        config = config.with_root(root);
    }

    let service = Arc::new(FileService::new(config));
    let server = FileServer::new(service, RpcConfig::from_env(args.bind));
    server.serve().await?;
    Ok(())
}
