use anyhow::Context;
use sassy_language_server::{SassyLanguageServer, lsp::config::ServerConfig};
use std::path::PathBuf;
use structopt::StructOpt;
use tower_lsp_server::{LspService, Server};

#[derive(Debug, StructOpt)]
#[structopt(name = "sassy-language-server", about = "SCSS language server over stdio")]
struct Opt {
    /// JSON settings applied before the client's own configuration.
    #[structopt(long, parse(from_os_str))]
    settings: Option<PathBuf>,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::default();
    if let Some(path) = path {
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let value = serde_json::from_str(&raw)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        config.apply_settings(value);
    }
    Ok(config)
}

fn init_logging() {
    #[cfg(feature = "tracing")]
    {
        // Also routes `log` records through the subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .try_init();
    }
    #[cfg(not(feature = "tracing"))]
    env_logger::init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let opt = Opt::from_args();
    let config = load_config(opt.settings)?;

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) =
        LspService::build(|client| SassyLanguageServer::with_config(client, config)).finish();

    Server::new(stdin, stdout, socket).serve(service).await;
    Ok(())
}
