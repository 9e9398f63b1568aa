//! count_colonies - count colonies in stored plate images
//!
//! Runs the same counter the agent uses on captures, writing the sharpened,
//! grayscale and annotated artifacts next to each other in the output dir.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use colony_watch::colony::{ColonyCounter, LaplacianKernel};
use colony_watch::logging::init_logging;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Plate images to count.
    #[arg(required = true)]
    images: Vec<PathBuf>,
    /// Directory for the audit artifacts.
    #[arg(long, env = "COLONY_WORK_DIR", default_value = "captures")]
    output_dir: PathBuf,
    /// Sharpening kernel: weak or strong.
    #[arg(long, env = "COLONY_LAPLACIAN", default_value = "weak")]
    kernel: String,
    /// Print one JSON object per image instead of plain text.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(None)?;

    let kernel = LaplacianKernel::parse(&args.kernel)
        .ok_or_else(|| anyhow!("--kernel must be 'weak' or 'strong', got {:?}", args.kernel))?;
    let counter = ColonyCounter::new(&args.output_dir).with_kernel(kernel);

    let mut failures = 0usize;
    for path in &args.images {
        match counter.count_file(path) {
            Ok(result) if args.json => println!(
                "{}",
                serde_json::json!({
                    "image": path.display().to_string(),
                    "count": result.count,
                    "threshold": result.threshold,
                    "annotated": result.contours_path.display().to_string(),
                })
            ),
            Ok(result) => println!("{}: {}", path.display(), result.count),
            Err(err) => {
                failures += 1;
                log::error!("{}: {:#}", path.display(), err);
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!(
            "{} of {} image(s) could not be counted",
            failures,
            args.images.len()
        ));
    }
    Ok(())
}
