use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tee_studio::{
    AssetSnapshot, BackgroundRemovalGateway, Catalog, DesignSession, EXPORT_FILE_NAME,
    GarmentAsset, MemoryCart, SegmentationConfig, StudioConfig,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "tee-studio", version, about = "Compose and price custom garment designs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compose a design from artwork files, price it and export a PNG.
    Compose(ComposeArgs),
    /// Print the catalog as JSON.
    Catalog {
        /// Catalog JSON to validate and print instead of the stock one.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args)]
struct ComposeArgs {
    #[arg(long, default_value = "round-neck")]
    style: String,

    #[arg(long, default_value = "red")]
    color: String,

    /// Artwork image, bottom layer first. Repeat for more layers.
    #[arg(long = "artwork", required = true)]
    artwork: Vec<PathBuf>,

    /// Garment asset list (JSON array) to resolve backgrounds from.
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Image for the resolved garment asset.
    #[arg(long)]
    background: Option<PathBuf>,

    /// Catalog JSON to use instead of the stock one.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Remove each artwork's background through Photoroom.
    #[arg(long)]
    remove_background: bool,

    /// Refuse to price a design without layers.
    #[arg(long)]
    strict: bool,

    #[arg(long, default_value_t = 1)]
    quantity: u32,

    #[arg(long, default_value = EXPORT_FILE_NAME)]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tee_studio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match Cli::parse().command {
        Command::Compose(args) => compose(args).await,
        Command::Catalog { file } => {
            let catalog = load_catalog(file.as_ref()).await?;
            println!("{}", catalog.to_json_pretty()?);
            Ok(())
        }
    }
}

async fn load_catalog(path: Option<&PathBuf>) -> anyhow::Result<Catalog> {
    match path {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading catalog {}", path.display()))?;
            Ok(Catalog::from_json(&json)?)
        }
        None => Ok(Catalog::storefront()),
    }
}

async fn compose(args: ComposeArgs) -> anyhow::Result<()> {
    let mut config = StudioConfig::from_env()?;
    config.require_layers |= args.strict;

    let catalog = Arc::new(load_catalog(args.catalog.as_ref()).await?);
    let assets = match &args.assets {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading assets {}", path.display()))?;
            let assets: Vec<GarmentAsset> = serde_json::from_str(&json)
                .with_context(|| format!("parsing assets {}", path.display()))?;
            AssetSnapshot::new(assets)
        }
        None => AssetSnapshot::default(),
    };

    let mut session = DesignSession::start(catalog, &assets, config).await?;
    session.select_style(&args.style)?;
    session.select_color(&args.color)?;

    if let Some(path) = &args.background {
        match session.background_reference() {
            Some(reference) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading background {}", path.display()))?;
                session.attach_background_image(&reference, &bytes)?;
            }
            None => tracing::warn!("No garment asset resolved, ignoring --background"),
        }
    }

    let mut layers = Vec::with_capacity(args.artwork.len());
    for path in &args.artwork {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading artwork {}", path.display()))?;
        let id = session
            .add_layer(&bytes)
            .with_context(|| format!("adding {}", path.display()))?;
        layers.push(id);
    }

    if args.remove_background {
        let segmentation = SegmentationConfig::from_env()?
            .context("PHOTOROOM_API_KEY must be set to remove backgrounds")?;
        let gateway = BackgroundRemovalGateway::photoroom(segmentation);
        let cancel = CancellationToken::new();
        for id in &layers {
            session.select_layer(*id)?;
            session.remove_active_background(&gateway, &cancel).await?;
        }
    }

    let cart = MemoryCart::new();
    let item = session.add_to_cart(&cart, args.quantity).await?;

    let png = session.export_file()?;
    tokio::fs::write(&args.out, &png)
        .await
        .with_context(|| format!("writing {}", args.out.display()))?;

    let summary = serde_json::json!({
        "id": item.id,
        "productReference": item.product_reference,
        "displayName": item.display_name,
        "unitPrice": item.unit_price,
        "quantity": item.quantity,
        "lineTotal": item.line_total(),
        "design": item.design,
        "export": args.out,
        "share": session.share_reference(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
