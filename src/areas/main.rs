//! Command line front end.
//!
//! Runs the region engine and postcode sampler over shapes read from a JSON
//! file and writes the result as CSV or tab separated text.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use hashbrown::HashSet;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use townscope::catalog::{categorize, load_catalog};
use townscope::config::Config;
use townscope::customers::{estimate_costs, match_locations, overlaps_existing, read_customer_rows};
use townscope::export::{export_filename, export_places, export_postcodes, ExportKind, TableFormat};
use townscope::models::{BoundingBox, Shape};
use townscope::postcodes::{PostcodeFormat, PostcodeSampler, PostcodesIoClient, SampleReport};
use townscope::region::{filter_places, FilterOutcome, PlaceFilter, PlaceIndex, SortOrder};

#[derive(Parser, Debug)]
#[command(name = "areas")]
#[command(about = "Find UK places and postcode districts inside drawn regions")]
struct Args {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Place catalog CSV, overrides the config file
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog places inside the shapes
    Places {
        /// JSON array of shapes
        #[arg(short, long)]
        shapes: PathBuf,

        /// Minimum population
        #[arg(long, default_value = "0")]
        population_min: u64,

        /// Place names to leave out (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Sort largest population first
        #[arg(long)]
        by_population: bool,

        /// Print a per-category summary instead of the table
        #[arg(long)]
        summary: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Sample postcode districts covering the shapes
    Postcodes {
        /// JSON array of shapes
        #[arg(short, long)]
        shapes: PathBuf,

        /// Keep full unit postcodes instead of districts
        #[arg(long)]
        full: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Match customer locations and estimate costs
    Customers {
        /// Spreadsheet export with customer and location columns
        #[arg(short, long)]
        rows: PathBuf,

        /// Also report which of these shapes overlap a customer location
        #[arg(long)]
        shapes: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Table format
    #[arg(long, value_enum, default_value = "csv")]
    format: FormatArg,

    /// Output file, or a directory for a dated file name. Stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Csv,
    Xls,
}

impl From<FormatArg> for TableFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => TableFormat::Csv,
            FormatArg::Xls => TableFormat::Xls,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref())?;
    let catalog_path = args.catalog.unwrap_or_else(|| config.catalog.path.clone());

    match args.command {
        Command::Places {
            shapes,
            population_min,
            exclude,
            by_population,
            summary,
            output,
        } => {
            let index = PlaceIndex::build(load_catalog(&catalog_path)?);
            let shapes = load_shapes(&shapes, &config.region.bounds)?;

            let filter = PlaceFilter {
                population_min,
                excluded: exclude.into_iter().collect::<HashSet<_>>(),
                sort: if by_population {
                    SortOrder::PopulationDesc
                } else {
                    SortOrder::Catalog
                },
            };

            let places = match filter_places(&index, &shapes, &filter) {
                FilterOutcome::NoShapesDrawn => {
                    warn!("Shapes file is empty; draw at least one shape");
                    return Ok(());
                }
                FilterOutcome::Matched(places) if places.is_empty() => {
                    info!("No places match the current filters");
                    return Ok(());
                }
                FilterOutcome::Matched(places) => places,
            };

            info!("{} places inside {} shapes", places.len(), shapes.len());

            if summary {
                for (category, members) in categorize(&places) {
                    println!("{} ({})", category, members.len());
                    for place in members {
                        println!("  {}", place.name);
                    }
                }
                return Ok(());
            }

            let format = output.format.into();
            let table = export_places(&places, format)?;
            write_output(&table, output.output.as_deref(), ExportKind::Locations, format)?;
        }

        Command::Postcodes { shapes, full, output } => {
            let shapes = load_shapes(&shapes, &config.region.bounds)?;
            if shapes.is_empty() {
                warn!("Shapes file is empty; draw at least one shape");
                return Ok(());
            }

            let mut sampler_config = config.sampler.to_sampler_config()?;
            if full {
                sampler_config.format = PostcodeFormat::Full;
            }
            let client = PostcodesIoClient::new(&config.lookup.base_url, sampler_config.chunk_timeout)?;
            let sampler = PostcodeSampler::new(client, sampler_config);

            let pb = ProgressBar::new(shapes.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} shapes {msg}")?
                    .progress_chars("#>-"),
            );

            let mut report = SampleReport::default();
            for (i, shape) in shapes.iter().enumerate() {
                // Each shape is sampled on its own so the bar can advance
                if i > 0 {
                    tokio::time::sleep(sampler.config().chunk_delay).await;
                }
                report.merge(sampler.sample_shapes(std::slice::from_ref(shape)).await);
                pb.set_message(format!("{} postcodes", report.postcodes.len()));
                pb.inc(1);
            }
            pb.finish_with_message(format!("{} postcodes", report.postcodes.len()));

            // An empty table is still written so scripts see a result
            if let Some(message) = report.warning() {
                warn!("{}", message);
            }

            info!(
                "Found {} postcodes from {} sample points",
                report.postcodes.len(),
                report.points_sampled
            );

            let format = output.format.into();
            let table = export_postcodes(&report.postcodes, format)?;
            write_output(&table, output.output.as_deref(), ExportKind::Postcodes, format)?;
        }

        Command::Customers { rows, shapes } => {
            let index = PlaceIndex::build(load_catalog(&catalog_path)?);
            let file = fs::File::open(&rows).context("Failed to open customer file")?;
            let rows = read_customer_rows(file)?;
            let locations = match_locations(&rows, &index);

            for (customer, entries) in &locations.by_customer {
                let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
                println!("{}: {}", customer, labels.join(", "));
            }

            let totals = estimate_costs(&locations, &config.costs);
            println!(
                "ALD cost: {}  Adspend: {}  Total: {}",
                totals.ald,
                totals.adspend,
                totals.combined()
            );

            if let Some(path) = shapes {
                for (i, shape) in load_shapes(&path, &config.region.bounds)?.iter().enumerate() {
                    if overlaps_existing(shape, &locations) {
                        println!("Shape {} ({}) overlaps an existing customer location", i, shape.kind());
                    }
                }
            }
        }
    }

    Ok(())
}

/// Read a JSON array of shapes, each of which must fit inside `bounds`
fn load_shapes(path: &Path, bounds: &BoundingBox) -> Result<Vec<Shape>> {
    let content = fs::read_to_string(path).context("Failed to read shapes file")?;
    let shapes: Vec<Shape> = serde_json::from_str(&content).context("Failed to parse shapes file")?;

    for (i, shape) in shapes.iter().enumerate() {
        shape
            .validate_within(bounds)
            .with_context(|| format!("Shape {} is invalid", i))?;
    }

    Ok(shapes)
}

fn write_output(table: &str, output: Option<&Path>, kind: ExportKind, format: TableFormat) -> Result<()> {
    match output {
        None => {
            io::stdout().write_all(table.as_bytes())?;
        }
        Some(path) => {
            let path = if path.is_dir() {
                path.join(export_filename(kind, format, Local::now().date_naive()))
            } else {
                path.to_path_buf()
            };
            fs::write(&path, table).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
    }
    Ok(())
}
