use std::net::SocketAddr;
use std::time::Duration;

use azureml_provider::{init_logging, serve, AzureMlProvider, ServeOptions};
use clap::Parser;

/// Provider plugin for Azure Machine Learning datastores.
///
/// Started by the host, which reads the handshake line from stdout and
/// connects over gRPC.
#[derive(Parser, Debug)]
#[command(name = "terraform-provider-azureml", version)]
struct Args {
    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, env = "AZUREML_PROVIDER_DEBUG")]
    debug: bool,

    /// Address to listen on. Defaults to an ephemeral port on localhost.
    #[arg(long, env = "AZUREML_PROVIDER_ADDRESS")]
    address: Option<SocketAddr>,

    /// Seconds to wait for in-flight requests after a shutdown signal.
    #[arg(long, default_value = "30")]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(if args.debug { "debug" } else { "info" });

    let mut options =
        ServeOptions::new().with_shutdown_timeout(Duration::from_secs(args.shutdown_timeout));
    if let Some(address) = args.address {
        options = options.with_address(address);
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting azureml provider");
    serve(AzureMlProvider::new(), options).await
}
