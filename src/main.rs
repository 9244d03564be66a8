// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use nuget_feed::config::Settings;
use nuget_feed::manifest::{Manifest, ManifestEntry};
use nuget_feed::packages::{PackageIdentifier, PackageRecord};
use nuget_feed::repository::{DEFAULT_PAGE_SIZE, SearchQuery, open_sources};
use nuget_feed::resolver::UpdateResolver;
use tracing::info;

#[derive(Parser)]
#[command(name = "nuget-feed")]
#[command(author, version, about = "Find package updates across NuGet feeds", long_about = None)]
struct Cli {
    /// Settings file (created with defaults if missing)
    #[arg(short, long, global = true, default_value = "NuGet.config")]
    config: String,

    /// Installed package manifest
    #[arg(short, long, global = true, default_value = "packages.config")]
    manifest: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available updates for installed packages
    Updates {
        /// Consider prerelease versions
        #[arg(long)]
        prerelease: bool,
        /// Report every newer version, not just the latest
        #[arg(long)]
        all_versions: bool,
        #[arg(long)]
        json: bool,
    },
    /// Search packages across all sources
    Search {
        term: String,
        #[arg(long)]
        prerelease: bool,
        #[arg(long)]
        all_versions: bool,
        /// Number of results to skip
        #[arg(long, default_value_t = 0)]
        skip: usize,
        /// Page size
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        take: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show a package, or the nearest newer version if it does not exist
    Info {
        id: String,
        version: String,
        #[arg(long)]
        json: bool,
    },
    /// List installed packages
    List,
    /// Record a package in the manifest
    Add {
        id: String,
        version: String,
        #[arg(long)]
        target_framework: Option<String>,
        /// Version range updates must stay within, e.g. "[1.0,2.0)"
        #[arg(long)]
        allowed_versions: Option<String>,
    },
    /// Remove a package from the manifest
    Remove { id: String },
}

/// Log filter used when RUST_LOG is not set
fn default_filter(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

fn format_record(record: &PackageRecord) -> String {
    match &record.source {
        Some(source) => format!("{} {} ({})", record.id, record.version, source),
        None => format!("{} {}", record.id, record.version),
    }
}

fn print_records(records: &[PackageRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    for record in records {
        println!("{}", format_record(record));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter(settings.verbose))),
        )
        .init();

    match cli.command {
        Some(Commands::Updates {
            prerelease,
            all_versions,
            json,
        }) => {
            let manifest = Manifest::load(&cli.manifest)?;
            info!("Checking {} installed packages for updates", manifest.len());

            let sources = open_sources(&settings.resolved_sources(), &settings.source_options());
            let resolver = UpdateResolver::new(sources);
            let updates = resolver.resolve(&manifest, prerelease, all_versions);

            if updates.is_empty() && !json {
                println!("All packages are up to date");
                return Ok(());
            }
            print_records(&updates, json)
        }
        Some(Commands::Search {
            term,
            prerelease,
            all_versions,
            skip,
            take,
            json,
        }) => {
            let query = SearchQuery::new(term)
                .with_prerelease(prerelease)
                .with_all_versions(all_versions)
                .with_page(take, skip);

            let sources = open_sources(&settings.resolved_sources(), &settings.source_options());
            let results = UpdateResolver::new(sources).search(&query);
            print_records(&results, json)
        }
        Some(Commands::Info { id, version, json }) => {
            let package = PackageIdentifier::new(id, version);
            let sources = open_sources(&settings.lookup_sources(), &settings.source_options());

            let Some(record) = UpdateResolver::new(sources).find_package(&package) else {
                return Err(anyhow::anyhow!("Package {} not found in any source", package));
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
                return Ok(());
            }

            println!("{}", format_record(&record));
            println!("  Title: {}", record.title);
            if let Some(description) = &record.description {
                println!("  Description: {}", description);
            }
            if let Some(url) = &record.download_url {
                println!("  Download: {}", url);
            }
            if !record.dependencies.is_empty() {
                println!("  Dependencies:");
                for dependency in &record.dependencies {
                    println!("    {} {}", dependency.id, dependency.version);
                }
            }
            Ok(())
        }
        Some(Commands::List) => {
            let manifest = Manifest::load(&cli.manifest)?;
            if manifest.is_empty() {
                println!("No packages installed");
            }
            for entry in manifest.entries() {
                match &entry.target_framework {
                    Some(framework) => println!("{} {} [{}]", entry.id, entry.version, framework),
                    None => println!("{} {}", entry.id, entry.version),
                }
            }
            Ok(())
        }
        Some(Commands::Add {
            id,
            version,
            target_framework,
            allowed_versions,
        }) => {
            let mut manifest = Manifest::load(&cli.manifest)?;
            let mut entry = ManifestEntry::new(id, version);
            entry.target_framework = target_framework;
            entry.allowed_versions = allowed_versions;

            info!("Adding {} {} to {}", entry.id, entry.version, cli.manifest);
            manifest.add(entry);
            manifest.save(&cli.manifest)?;
            Ok(())
        }
        Some(Commands::Remove { id }) => {
            let mut manifest = Manifest::load(&cli.manifest)?;
            if !manifest.remove(&id) {
                return Err(anyhow::anyhow!("Package '{}' is not in {}", id, cli.manifest));
            }
            manifest.save(&cli.manifest)?;
            println!("Removed {}", id);
            Ok(())
        }
        None => {
            println!("nuget-feed - use --help for usage information");
            Ok(())
        }
    }
}
