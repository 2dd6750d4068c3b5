use clap::{Parser, Subcommand};
use cli::RowJob;
use color_eyre::eyre::{Result, WrapErr};
use rowline::{CancellationToken, RunReport};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Extract planting-row centerlines from RGB orthomosaics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job file (.toml or .json)
    Run {
        /// Path to the job file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the pipeline with parameters given on the command line
    Extract {
        /// Orthomosaic to process
        #[arg(short, long)]
        input: PathBuf,
        /// GeoJSON file receiving the row centerlines
        #[arg(short, long)]
        output: PathBuf,
        /// GeoJSON polygon to clip the orthomosaic to
        #[arg(short, long)]
        boundary: Option<PathBuf>,
        /// CRS identifier of the orthomosaic, e.g. EPSG:31982
        #[arg(long)]
        crs: Option<String>,
        /// Ground size of a resampled cell
        #[arg(long, default_value = "0.4")]
        resolution: f64,
        /// Green Leaf Index threshold
        #[arg(long, default_value = "0.06")]
        threshold: f64,
        /// Upper bound on thinning iterations
        #[arg(long, default_value = "100")]
        thin_iterations: usize,
        /// Simplification tolerance
        #[arg(long, default_value = "0.5")]
        tolerance: f64,
    },
    /// Print the JSON schema of job files
    Schema,
    /// Write a job file with the canonical parameters
    Init {
        /// Where to write the job file (.toml or .json)
        #[arg(short, long)]
        output: PathBuf,
        /// Orthomosaic the job will process
        #[arg(short, long)]
        input: PathBuf,
        /// GeoJSON output path written into the job
        #[arg(long, default_value = "linhas.geojson")]
        lines: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let job = RowJob::from_file(&config)
                .wrap_err_with(|| format!("Failed to read job file {}", config.display()))?;
            run_job(job).await?;
        }
        Commands::Extract {
            input,
            output,
            boundary,
            crs,
            resolution,
            threshold,
            thin_iterations,
            tolerance,
        } => {
            let mut job = RowJob::new(input, output);
            job.boundary = boundary;
            job.crs = crs;
            job.pipeline.target_resolution = resolution;
            job.pipeline.threshold = threshold;
            job.pipeline.thin_iterations = thin_iterations;
            job.pipeline.simplify_tolerance = tolerance;
            run_job(job).await?;
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&RowJob::schema())?);
        }
        Commands::Init { output, input, lines } => {
            RowJob::new(input, lines).to_file(&output)?;
            info!("Job file written to {}", output.display());
        }
    }

    Ok(())
}

/// Run the job on a blocking thread; Ctrl+C cancels before the next stage.
async fn run_job(job: RowJob) -> Result<()> {
    let token = CancellationToken::new();
    let output = job.output.clone();

    let worker = tokio::task::spawn_blocking({
        let token = token.clone();
        move || job.execute(token)
    });
    tokio::pin!(worker);

    let report: RunReport = tokio::select! {
        joined = &mut worker => joined??,
        _ = tokio::signal::ctrl_c() => {
            warn!("Received Ctrl+C, stopping after the current stage");
            token.cancel();
            match worker.await? {
                Ok(report) => report,
                Err(err) => return Err(err).wrap_err("Extraction cancelled"),
            }
        }
    };

    info!(
        lines = report.line_count,
        vertices = report.vertex_count,
        crs = %report.crs,
        "Wrote {}",
        output.display()
    );
    Ok(())
}
