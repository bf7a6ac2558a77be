use std::{fs, path::PathBuf};

use anyhow::{Context, bail};
use batch::{BatchItem, BatchRequest, BatchSettings, archive, generate};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use store::PgStore;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Pre-create Board Iraq accounts for printed cards")]
struct Args {
    /// Number of accounts to create
    #[arg(short, long)]
    count: usize,

    /// Username prefix, lowercase letters and digits
    #[arg(short, long, default_value = "board")]
    prefix: String,

    /// Where to write the zip with QR codes and credentials
    #[arg(short, long, default_value = "accounts.zip")]
    output: PathBuf,

    #[arg(long, env = "SITE_URL", default_value = "https://boardiraq.com")]
    site_url: String,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let store = PgStore::connect(&args.database_url)
        .await
        .context("Failed to connect to database")?;

    let pb = ProgressBar::new(args.count as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    let request = BatchRequest {
        count: args.count,
        prefix: Some(args.prefix),
    };
    let settings = BatchSettings {
        site_url: args.site_url,
    };

    let report = generate(&store, &request, &settings, |item| {
        match item {
            BatchItem::Created(account) => pb.set_message(account.username.clone()),
            BatchItem::Failed { index, error } => pb.println(format!("#{index} failed: {error}")),
        }
        pb.inc(1);
    })
    .await?;

    pb.finish_with_message("Done");

    fs::write(&args.output, archive(&report)?)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!("\nCreated: {}", report.created);
    println!("Failed: {}", report.failed);
    println!("Archive: {}", args.output.display());

    if report.created == 0 {
        bail!("No accounts were created");
    }

    Ok(())
}
