//! Dropbox loader binary
//!
//! Run with: cargo run -p dropbox-loader -- --auth auth.json --folder /Docs

use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use dropbox_loader::{DropboxAuth, DropboxLoader, LoadSource, LoaderConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Load text documents from Dropbox and print them as JSON
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["folder", "file"])))]
struct Args {
    /// JSON file with `access`, `refresh`, `id_token` and `expire`
    #[arg(long)]
    auth: PathBuf,

    /// Folder to load recursively
    #[arg(long)]
    folder: Option<String>,

    /// File to load (repeatable)
    #[arg(long)]
    file: Vec<String>,

    /// Dropbox app key, needed to refresh expired tokens
    #[arg(long, env = "DROPBOX_APP_KEY", requires = "app_secret")]
    app_key: Option<String>,

    /// Dropbox app secret
    #[arg(long, env = "DROPBOX_APP_SECRET", requires = "app_key", hide_env_values = true)]
    app_secret: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit one document per PDF page
    #[arg(long)]
    split_pdf_pages: bool,
}

impl Args {
    fn source(&self) -> LoadSource {
        match (&self.folder, self.file.as_slice()) {
            (Some(folder), _) => LoadSource::Folder(folder.clone()),
            (None, [single]) => LoadSource::File(single.clone()),
            (None, many) => LoadSource::Files(many.to_vec()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dropbox_loader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LoaderConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => LoaderConfig::default(),
    };
    if args.split_pdf_pages {
        config.parser.split_pdf_pages = true;
    }

    let auth_json = std::fs::read_to_string(&args.auth)
        .with_context(|| format!("Failed to read {}", args.auth.display()))?;
    let auth = DropboxAuth::from_json(&auth_json).context("Invalid auth file")?;

    let mut loader = DropboxLoader::new(auth, args.source()).with_config(config);
    if let (Some(key), Some(secret)) = (&args.app_key, &args.app_secret) {
        loader = loader.with_app_credentials(key, secret);
    }

    let documents = loader.load().await;

    let output = serde_json::json!({
        "documents": documents,
        "invalid_files": loader.invalid_files(),
        "errors": loader.errors(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
