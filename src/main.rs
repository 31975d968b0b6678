use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use metareview::config::{default_config_path, find_config_file, load_config, Config};
use metareview::models::{CanonicalPaper, SearchRequest, SortBy};
use metareview::reconcile::{
    attach_pdf_urls, discover_doi, discover_dois, enhance, resolve_pdf_url, DiscoveredPaper,
    DocumentMetadata, PaperReference, PdfLookup,
};
use metareview::search::{LookupOutcome, SearchService};
use is_terminal::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// metareview - Search, deduplicate and reconcile paper metadata from several providers
#[derive(Parser, Debug)]
#[command(name = "metareview")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search, deduplicate and reconcile paper metadata from several providers", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Automatic based on terminal (table if TTY, JSON otherwise)
    Auto,
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
}

/// Sort field for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SortField {
    Relevance,
    Date,
    #[value(alias = "citations")]
    Cited,
    Title,
}

impl From<SortField> for SortBy {
    fn from(field: SortField) -> Self {
        match field {
            SortField::Relevance => SortBy::Relevance,
            SortField::Date => SortBy::Date,
            SortField::Cited => SortBy::Cited,
            SortField::Title => SortBy::Title,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search every configured provider and merge the results
    #[command(alias = "s")]
    Search {
        /// Search query string
        query: String,

        /// Number of results to return
        #[arg(long, short = 'n', default_value_t = 20)]
        limit: usize,

        /// Number of results to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Earliest publication year
        #[arg(long)]
        year_from: Option<i32>,

        /// Latest publication year
        #[arg(long)]
        year_to: Option<i32>,

        /// Restrict to a journal
        #[arg(long)]
        journal: Option<String>,

        /// Restrict to an author
        #[arg(long)]
        author: Option<String>,

        /// Only return open-access papers
        #[arg(long)]
        open_access: bool,

        /// Sort order
        #[arg(long, value_enum, default_value_t = SortField::Relevance)]
        sort: SortField,

        /// Providers to query (repeatable); defaults to every configured provider
        #[arg(long = "provider", short = 'p')]
        providers: Vec<String>,
    },

    /// Look a paper up by DOI
    #[command(alias = "d")]
    Doi {
        /// DOI, with or without a resolver prefix
        doi: String,
    },

    /// Find an open-access PDF URL for a DOI
    PdfUrl {
        doi: String,
    },

    /// Find the DOI of a paper from its title, first author and year
    FindDoi {
        #[arg(long)]
        title: String,

        /// First author; a full name is narrowed to the surname
        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        year: Option<i32>,
    },

    /// Find DOIs for a JSON array of references ({title, authors, year})
    FindDois {
        /// Path to the reference list
        references: PathBuf,

        /// Also look for an open-access PDF of every DOI found
        #[arg(long)]
        pdf: bool,
    },

    /// Merge extracted document metadata with provider metadata
    Reconcile {
        /// Path to the extractor's JSON output
        #[arg(long)]
        document: PathBuf,
    },

    /// List providers and their state
    Sources,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Destination (defaults to the user config directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

fn init_tracing(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("metareview={}", level)));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    if let Commands::Config { action } = &cli.command {
        return run_config(action, cli.config.as_deref(), cli.output);
    }

    if cli.config.is_none() {
        if let Some(path) = find_config_file() {
            tracing::info!("Using config file: {}", path.display());
        }
    }
    let config = load_config(cli.config.as_deref())?;
    let service = SearchService::from_config(&config)?;

    match cli.command {
        Commands::Search {
            query,
            limit,
            offset,
            year_from,
            year_to,
            journal,
            author,
            open_access,
            sort,
            providers,
        } => {
            let mut request = SearchRequest::new(query)
                .limit(limit)
                .offset(offset)
                .years(year_from, year_to)
                .open_access_only(open_access)
                .sort(sort.into());
            if let Some(journal) = journal {
                request = request.journal(journal);
            }
            if let Some(author) = author {
                request = request.author(author);
            }
            if !providers.is_empty() {
                request = request.providers(providers);
            }

            let response = service.search(&request).await;
            match resolve_format(cli.output) {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
                _ => {
                    output_papers(&response.results);
                    println!(
                        "Showing {} of {} results",
                        response.results.len(),
                        response.total_results
                    );
                }
            }
        }

        Commands::Doi { doi } => match service.lookup_by_doi(&doi).await {
            LookupOutcome::Found(paper) => match resolve_format(cli.output) {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&paper)?),
                _ => output_papers(std::slice::from_ref(&paper)),
            },
            LookupOutcome::NotFound => anyhow::bail!("DOI {} not found at any provider", doi),
        },

        Commands::PdfUrl { doi } => match resolve_pdf_url(&service, &doi).await {
            Some(url) => println!("{}", url),
            None => anyhow::bail!("No open-access copy found for {}", doi),
        },

        Commands::FindDoi {
            title,
            author,
            year,
        } => match discover_doi(&service, &title, author.as_deref(), year).await {
            Some(doi) => println!("{}", doi),
            None => anyhow::bail!("No DOI found for '{}'", title),
        },

        Commands::FindDois { references, pdf } => {
            let raw = std::fs::read_to_string(&references)
                .with_context(|| format!("Failed to read {}", references.display()))?;
            let entries: Vec<serde_json::Value> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array", references.display()))?;
            let entries = entries.iter().map(PaperReference::from_value).collect();

            let mut found = discover_dois(&service, entries).await;
            if pdf {
                attach_pdf_urls(&service, &mut found).await;
            }
            match resolve_format(cli.output) {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&found)?),
                _ => output_discovered(&found),
            }
        }

        Commands::Reconcile { document } => {
            let raw = std::fs::read_to_string(&document)
                .with_context(|| format!("Failed to read {}", document.display()))?;
            let value: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", document.display()))?;
            let metadata = DocumentMetadata::from_value(&value)?;

            let paper = enhance(&service, metadata).await;
            match resolve_format(cli.output) {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&paper)?),
                _ => output_papers(std::slice::from_ref(&paper)),
            }
        }

        Commands::Sources => output_sources(&service, cli.output)?,

        // Handled before the service is built
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn run_config(
    action: &ConfigAction,
    config_path: Option<&std::path::Path>,
    format: OutputFormat,
) -> Result<()> {
    match action {
        ConfigAction::Init { path, force } => {
            let path = path
                .clone()
                .or_else(default_config_path)
                .context("Could not determine a config directory; pass --path")?;
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save(&path)?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            match resolve_format(format) {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                _ => println!("{}", toml::to_string_pretty(&config)?),
            }
        }
    }
    Ok(())
}

fn resolve_format(format: OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Auto if std::io::stdout().is_terminal() => OutputFormat::Table,
        OutputFormat::Auto => OutputFormat::Json,
        other => other,
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn output_papers(papers: &[CanonicalPaper]) {
    use comfy_table::{Attribute, Cell, Table};
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Title", "Authors", "Year", "DOI", "Cited", "OA", "Source"]);

    for paper in papers {
        table.add_row(vec![
            Cell::new(truncate(&paper.title, 50)).add_attribute(Attribute::Bold),
            Cell::new(truncate(&paper.author_names().join(", "), 30)),
            Cell::new(paper.year.map(|y| y.to_string()).unwrap_or_default()),
            Cell::new(paper.doi.clone().unwrap_or_default()),
            Cell::new(paper.citation_count),
            Cell::new(if paper.is_open_access { "yes" } else { "" }),
            Cell::new(paper.source_provider.name()),
        ]);
    }
    println!("{table}");
}

fn output_discovered(papers: &[DiscoveredPaper]) {
    use comfy_table::{Cell, Table};
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Title", "Authors", "Year", "DOI", "PDF"]);

    for paper in papers {
        let pdf = match &paper.pdf {
            Some(PdfLookup::Found(url)) => url.clone(),
            Some(PdfLookup::NotFound) => "not found".to_string(),
            Some(PdfLookup::NoDoi) | None => String::new(),
        };
        table.add_row(vec![
            Cell::new(truncate(&paper.reference.title, 50)),
            Cell::new(truncate(&paper.reference.authors, 30)),
            Cell::new(paper.reference.year.map(|y| y.to_string()).unwrap_or_default()),
            Cell::new(paper.doi.clone().unwrap_or_default()),
            Cell::new(pdf),
        ]);
    }
    let found = papers.iter().filter(|p| p.doi.is_some()).count();
    println!("{table}");
    println!("Found DOIs for {} of {} references", found, papers.len());
}

fn output_sources(service: &SearchService, format: OutputFormat) -> Result<()> {
    let registry = service.registry();

    if resolve_format(format) == OutputFormat::Json {
        let sources: Vec<_> = registry
            .all()
            .map(|s| {
                serde_json::json!({
                    "id": s.id(),
                    "name": s.name(),
                    "search": s.supports_search(),
                    "doiLookup": s.supports_doi_lookup(),
                    "configured": s.is_configured(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&sources)?);
        return Ok(());
    }

    use comfy_table::{Cell, Table};
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["ID", "Name", "Search", "DOI lookup", "Configured"]);
    let mark = |b: bool| if b { "yes" } else { "no" };
    for source in registry.all() {
        table.add_row(vec![
            Cell::new(source.id()),
            Cell::new(source.name()),
            Cell::new(mark(source.supports_search())),
            Cell::new(mark(source.supports_doi_lookup())),
            Cell::new(mark(source.is_configured())),
        ]);
    }
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::parse_from(["metareview", "-v", "sources"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["metareview", "-vv", "sources"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "metareview",
            "sources",
            "-q",
            "--log-json",
            "-o",
            "json",
            "--config",
            "/path/to/config.toml",
        ]);
        assert!(cli.quiet);
        assert!(cli.log_json);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.toml")));
    }

    #[test]
    fn test_cli_search_defaults() {
        let cli = Cli::parse_from(["metareview", "search", "climate policy"]);
        match cli.command {
            Commands::Search {
                query,
                limit,
                offset,
                sort,
                providers,
                open_access,
                ..
            } => {
                assert_eq!(query, "climate policy");
                assert_eq!(limit, 20);
                assert_eq!(offset, 0);
                assert_eq!(sort, SortField::Relevance);
                assert!(providers.is_empty());
                assert!(!open_access);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_search_with_options() {
        let cli = Cli::parse_from([
            "metareview",
            "search",
            "neural networks",
            "-n",
            "5",
            "--offset",
            "10",
            "--year-from",
            "2015",
            "--year-to",
            "2020",
            "--sort",
            "citations",
            "-p",
            "crossref",
            "-p",
            "openalex",
            "--open-access",
        ]);
        match cli.command {
            Commands::Search {
                limit,
                offset,
                year_from,
                year_to,
                sort,
                providers,
                open_access,
                ..
            } => {
                assert_eq!(limit, 5);
                assert_eq!(offset, 10);
                assert_eq!(year_from, Some(2015));
                assert_eq!(year_to, Some(2020));
                assert_eq!(SortBy::from(sort), SortBy::Cited);
                assert_eq!(providers, vec!["crossref", "openalex"]);
                assert!(open_access);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_doi_and_pdf_url() {
        let cli = Cli::parse_from(["metareview", "doi", "10.1038/nature12373"]);
        assert!(matches!(cli.command, Commands::Doi { ref doi } if doi == "10.1038/nature12373"));

        let cli = Cli::parse_from(["metareview", "pdf-url", "10.1/x"]);
        assert!(matches!(cli.command, Commands::PdfUrl { .. }));
    }

    #[test]
    fn test_cli_reconcile_command() {
        let cli = Cli::parse_from(["metareview", "reconcile", "--document", "meta.json"]);
        match cli.command {
            Commands::Reconcile { document } => assert_eq!(document, PathBuf::from("meta.json")),
            _ => panic!("Expected Reconcile command"),
        }
    }

    #[test]
    fn test_cli_find_doi_command() {
        let cli = Cli::parse_from([
            "metareview",
            "find-doi",
            "--title",
            "Sleep and memory",
            "--author",
            "John Smith",
            "--year",
            "2004",
        ]);
        match cli.command {
            Commands::FindDoi {
                title,
                author,
                year,
            } => {
                assert_eq!(title, "Sleep and memory");
                assert_eq!(author.as_deref(), Some("John Smith"));
                assert_eq!(year, Some(2004));
            }
            _ => panic!("Expected FindDoi command"),
        }

        assert!(Cli::try_parse_from(["metareview", "find-doi"]).is_err());
    }

    #[test]
    fn test_cli_find_dois_command() {
        let cli = Cli::parse_from(["metareview", "find-dois", "refs.json", "--pdf"]);
        match cli.command {
            Commands::FindDois { references, pdf } => {
                assert_eq!(references, PathBuf::from("refs.json"));
                assert!(pdf);
            }
            _ => panic!("Expected FindDois command"),
        }
    }

    #[test]
    fn test_cli_config_commands() {
        let cli = Cli::parse_from(["metareview", "config", "init", "--force"]);
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Init { force: true, .. }
            }
        ));

        let cli = Cli::parse_from(["metareview", "config", "show"]);
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["metareview"]).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a rather long title", 10), "a rathe...");
    }
}
