use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use logal::config::{Config, DEFAULT_CONFIG_PATH};
use logal::infra::redshift_resolver;
use logal::logging;
use logal::pipeline::ingestion::CatalogRegistry;
use logal::pipeline::processing::catalog::GalaxyRecord;
use logal::pipeline::processing::conflation::overlap_report;
use logal::pipeline::storage::{SqliteStorage, Storage};
use logal::pipeline::{BuildOptions, BuildPipeline, BuildResult};
use logal::types::{parse_catalog_list, CatalogId};

#[derive(Parser)]
#[command(name = "logal")]
#[command(about = "Merge published infrared and line-flux catalogs of local galaxies")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read, cross-match and merge the catalogs into the record store
    Build {
        /// Catalogs to read (comma-separated codes, e.g. K16,L17). Default: all
        #[arg(long)]
        catalogs: Option<String>,
        /// Write the record store as JSON to this file or directory
        #[arg(long)]
        export: Option<PathBuf>,
        /// Merge into the existing store instead of rebuilding it
        #[arg(long)]
        keep: bool,
    },
    /// Print the cross-match overlap report
    Crossmatch {
        #[arg(long)]
        catalogs: Option<String>,
    },
    /// Print one record (canonical ID or alias) as JSON
    Show { name: String },
    /// Print canonical IDs with redshifts
    List,
    /// Print the supported catalogs, their files and cosmologies
    Catalogs,
}

fn catalogs_arg(arg: Option<&str>) -> Result<Vec<CatalogId>> {
    match arg {
        Some(list) => Ok(parse_catalog_list(list)?),
        None => Ok(Vec::new()),
    }
}

fn print_build_summary(result: &BuildResult) {
    println!("\n📊 Build {}:", result.run_id);
    for c in &result.catalogs {
        println!(
            "   {:<15} {:>4} rows ({} skipped lines, {} extended, {} duplicates)",
            c.label, c.rows, c.skipped_lines, c.dropped_extended, c.dropped_duplicates
        );
    }
    println!("   Master list: {} sources", result.master_size);
    println!(
        "   Records: {} created, {} updated, {} skipped, {} errors",
        result.merge.created, result.merge.updated, result.merge.skipped, result.merge.errors
    );
    if let Some(c) = result.merge.bolometric_factor {
        println!("   K16 bolometric correction: {:.4}", c);
    }
    if let Some(file) = &result.export_file {
        println!("   Exported to {}", file);
    }
    if !result.warnings.is_empty() {
        println!("\n⚠️  {} warnings:", result.warnings.len());
        for w in &result.warnings {
            println!("   - {}", w);
        }
    }
}

fn print_catalogs(registry: &CatalogRegistry) {
    for id in registry.list_catalogs() {
        let Some(reader) = registry.get_reader(id) else { continue };
        println!("{} ({}): {}", id.code(), id.label(), id.cosmology());
        for file in reader.files() {
            println!("    {}", file);
        }
    }
}

fn print_list(records: &[GalaxyRecord]) {
    for record in records {
        match record.z {
            Some(z) => println!("{:<24} {:.5}", record.id, z),
            None => println!("{:<24} -", record.id),
        }
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config).context("loading configuration")?;
    logging::init_logging(&config.data.log_dir);

    match cli.command {
        Commands::Build { catalogs, export, keep } => {
            let catalogs = catalogs_arg(catalogs.as_deref())?;
            let redshifts = redshift_resolver(&config.redshift)?;
            let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&config.data.database)?);
            let pipeline = BuildPipeline::new(&config, redshifts.as_ref(), storage);

            println!("🚀 Building the record store...");
            let options = BuildOptions { catalogs, keep, export };
            match pipeline.run(&options) {
                Ok(result) => {
                    info!("Build {} finished", result.run_id);
                    print_build_summary(&result);
                }
                Err(e) => {
                    error!("Build failed: {}", e);
                    println!("❌ Build failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Crossmatch { catalogs } => {
            let catalogs = catalogs_arg(catalogs.as_deref())?;
            let redshifts = redshift_resolver(&config.redshift)?;
            let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::in_memory()?);
            let pipeline = BuildPipeline::new(&config, redshifts.as_ref(), storage);

            let output = pipeline.crossmatch(&catalogs)?;
            let columns: Vec<CatalogId> = config
                .merge
                .crossmatch_order()?
                .into_iter()
                .filter(|c| output.tables.iter().any(|t| t.catalog == *c))
                .collect();
            print!("{}", overlap_report(&output.result, &columns));
            println!("\nMaster list size: {}", output.result.master.len());
            for w in &output.warnings {
                println!("⚠️  {}", w);
            }
        }
        Commands::Show { name } => {
            let storage = SqliteStorage::open(&config.data.database)?;
            let Some(record) = storage.lookup(&name)? else {
                bail!("no record named '{}' in {}", name, config.data.database.display());
            };
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::List => {
            let storage = SqliteStorage::open(&config.data.database)?;
            print_list(&storage.list_records()?);
        }
        Commands::Catalogs => print_catalogs(&CatalogRegistry::new()),
    }
    Ok(())
}
