use std::path::PathBuf;

use clap::Parser;
use mediadrop_lib::{init_logging, setup_app, AppOptions};

#[derive(Debug, Parser)]
#[command(name = "mediadrop", version, about = "Import media received over Bluetooth")]
struct Cli {
    /// Directory the Bluetooth stack writes received files into
    #[arg(long, env = "MEDIADROP_DROP_DIR")]
    drop_dir: Option<PathBuf>,

    /// Where the library, config, stored media and logs live
    #[arg(long, env = "MEDIADROP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Leave received files in the drop directory after importing
    #[arg(long)]
    keep_files: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .or_else(|| dirs::data_dir().map(|d| d.join("mediadrop")))
        .ok_or("Could not determine a data directory; pass --data-dir")?;
    let _guard = init_logging(&data_dir.join("logs"))?;

    let options = AppOptions {
        drop_dir: cli.drop_dir,
        data_dir,
        keep_files: cli.keep_files,
    };
    let state = setup_app(&options)?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    // stop() joins the dispatch thread, which may be mid-import
    tokio::task::spawn_blocking(move || state.stop()).await?;
    tracing::info!("mediadrop stopped");
    Ok(())
}
