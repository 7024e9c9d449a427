use clap::{Parser, Subcommand};
use log::{error, info};
use quire::{Config, JobManager, OutputFormat, ServiceBuilder, ServiceError};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Renders templated business reports to PDF")]
struct Cli {
    /// Config file; `config/default.toml` (or $QUIRE_CONFIG) when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one report and write the PDF
    Render {
        /// Template id
        #[arg(short, long)]
        template: String,

        /// JSON file with the input data
        #[arg(short, long)]
        data: PathBuf,

        /// Where to write the PDF; the artifact's file name in the current directory when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// `native` or `office`
        #[arg(short, long, default_value = "native")]
        format: OutputFormat,
    },

    /// Write every table of a report as CSV
    ExportCsv {
        #[arg(short, long)]
        template: String,

        #[arg(short, long)]
        data: PathBuf,

        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// List the available templates
    Templates,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ServiceError> {
    let config = match &cli.config {
        Some(path) => Config::load_file(path)?,
        None => Config::load()?,
    };
    let builder = ServiceBuilder::new(config);

    match cli.command {
        Commands::Render { template, data, output, format } => {
            let data = read_data(&data)?;
            let manager = builder.start().await?;
            let result = render(&manager, &template, data, format, output.as_deref()).await;
            manager.shutdown().await;
            result
        }
        Commands::ExportCsv { template, data, out_dir } => {
            let data = read_data(&data)?;
            let pipeline = builder.build_pipeline()?;
            fs::create_dir_all(&out_dir)?;
            for table in pipeline.export_csv(&template, &data)? {
                let path = out_dir.join(&table.file_name);
                fs::write(&path, &table.data)?;
                info!("Wrote {}", path.display());
            }
            Ok(())
        }
        Commands::Templates => {
            let pipeline = builder.build_pipeline()?;
            for id in pipeline.templates().ids() {
                println!("{}", id);
            }
            Ok(())
        }
    }
}

async fn render(
    manager: &JobManager,
    template: &str,
    data: Value,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), ServiceError> {
    let id = manager.submit(template, data, format)?;
    info!("Submitted job {}.", id);

    let status = manager.wait(id).await?;
    info!("Job {} settled as {}.", id, status.state);
    let artifact = manager.fetch(id)?;
    let path = output.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(&artifact.file_name));
    fs::write(&path, &artifact.bytes)?;
    manager.acknowledge(id)?;
    info!("Wrote {} ({} bytes, sha256 {}).", path.display(), artifact.len(), artifact.sha256);
    Ok(())
}

fn read_data(path: &Path) -> Result<Value, ServiceError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
