//! CLI entry point for spacetraveling

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spacetraveling::generator::Generator;
use spacetraveling::Site;

#[derive(Parser)]
#[command(name = "spacetraveling")]
#[command(version)]
#[command(about = "A blog generator and preview server for a headless CMS", long_about = None)]
struct Cli {
    /// Set the base directory (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate static files
    #[command(alias = "g")]
    Generate {
        /// Read documents from a JSON dump instead of the CMS
        #[arg(short, long)]
        fixture: Option<PathBuf>,
    },

    /// Start a server rendering pages on request
    #[command(alias = "s")]
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// IP address to bind to
        #[arg(short, long, default_value = "localhost")]
        ip: String,

        /// Read documents from a JSON dump instead of the CMS
        #[arg(short, long)]
        fixture: Option<PathBuf>,
    },

    /// Clean the public folder
    Clean,

    /// List site information
    List {
        /// Type of content to list (post, author)
        #[arg(default_value = "post")]
        r#type: String,

        /// Read documents from a JSON dump instead of the CMS
        #[arg(short, long)]
        fixture: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "spacetraveling=debug,info"
    } else {
        "spacetraveling=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine base directory
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    let load_site = || -> Result<Site> {
        let mut site = Site::new(&base_dir)?;
        site.config.apply_env();
        Ok(site)
    };

    match cli.command {
        Commands::Generate { fixture } => {
            let site = load_site()?;
            let gateway = site.gateway(fixture.as_deref())?;
            tracing::info!("Generating static files...");
            site.generate(gateway).await?;
            println!("Generated successfully!");
        }

        Commands::Serve { port, ip, fixture } => {
            let site = load_site()?;
            let gateway = site.gateway(fixture.as_deref())?;
            let generator = Generator::new(&site, gateway)?;

            tracing::info!("Starting server at http://{}:{}", ip, port);
            spacetraveling::server::start(&site, generator, &ip, port).await?;
        }

        Commands::Clean => {
            let site = load_site()?;
            tracing::info!("Cleaning public folder...");
            site.clean()?;
            println!("Cleaned successfully!");
        }

        Commands::List { r#type, fixture } => {
            let site = load_site()?;
            let gateway = site.gateway(fixture.as_deref())?;
            spacetraveling::commands::list::run(&site, gateway.as_ref(), &r#type).await?;
        }

        Commands::Version => {
            println!("spacetraveling version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
