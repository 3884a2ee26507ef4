use clap::Parser;
use oidc_provider_server::ServerBuilder;
use oidc_provider_server::config::loader::load_config;

#[derive(Parser)]
#[command(name = "oidc-provider")]
#[command(about = "OpenID Connect / OAuth 2.0 authorization server")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML). Defaults to oidc-provider.toml when present.
    #[arg(short, long, env = "OIDC_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    oidc_provider_server::init_tracing();

    let cli = Cli::parse();
    let cfg = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = cli.config.as_deref().unwrap_or("<default>"),
        issuer = %cfg.provider.issuer,
        "Configuration loaded"
    );
    oidc_provider_server::apply_logging_level(&cfg.logging.level);

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}
