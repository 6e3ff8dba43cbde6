use std::net::SocketAddr;
use std::path::PathBuf;

use capgraph::{
    builder::build_demo_server,
    config::{Config, TransportKind},
    server::lifespan,
    transport::{HttpTransport, StdioTransport},
};
use clap::Parser;

/// CLI arguments for the capability host
#[derive(Parser, Debug)]
#[command(name = "capgraph")]
#[command(about = "MCP server exposing graph-defined tools, resources and prompts")]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/capgraph/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server name announced to clients
    #[arg(long)]
    name: Option<String>,

    /// Transport to serve on
    #[arg(short, long, value_enum)]
    transport: Option<TransportKind>,

    /// Address for the HTTP transport
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (silently ignore if not found)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?.apply_env()?;
    if let Some(name) = args.name {
        config.server.name = name;
    }
    if let Some(kind) = args.transport {
        config.transport.kind = kind;
    }
    if let Some(bind) = args.bind {
        config.transport.bind = bind;
    }

    // stdout is the protocol channel for stdio, so logs always go to stderr
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut server = build_demo_server(&config.server.name, config.server.dependencies.clone())?;

    let name = server.name().to_string();
    server.attach_lifespan(lifespan(
        move || {
            let name = name.clone();
            async move {
                tracing::info!("{} starting up", name);
                anyhow::Ok(())
            }
        },
        || async {
            tracing::info!("Shutting down");
            anyhow::Ok(())
        },
    ));

    let registry = server.registry();
    tracing::info!("Tools ({}):", registry.tools().len());
    for tool in registry.tools() {
        tracing::info!("  - {}", tool.identifier);
    }
    tracing::info!("Resources ({}):", registry.resources().len() + registry.resource_templates().len());
    for resource in registry.resources().iter().chain(registry.resource_templates().iter()) {
        tracing::info!("  - {}", resource.identifier);
    }
    tracing::info!("Prompts ({}):", registry.prompts().len());
    for prompt in registry.prompts() {
        tracing::info!("  - {}", prompt.identifier);
    }

    match config.transport.kind {
        TransportKind::Stdio => server.run(StdioTransport).await?,
        TransportKind::Http => server.run(HttpTransport::new(config.transport.bind)).await?,
    }

    Ok(())
}
