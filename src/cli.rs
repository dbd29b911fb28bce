use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Debug, Parser)]
#[command(
    name = "invobert",
    about = "Semantic search and extraction for scanned invoices"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest invoice documents: extract, embed, and store them
    Ingest(IngestArgs),
    /// Search invoice line items with structured filters
    Items(ItemsArgs),
    /// Search whole invoices by metadata
    Invoices(InvoicesArgs),
    /// Ask a natural-language question about ingested invoices
    Ask(AskArgs),
    /// Show store statistics
    Status(StatusArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Invoice files to ingest
    pub paths: Vec<PathBuf>,

    /// Ingest all invoice files found under this directory
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Glob pattern applied to paths relative to --dir
    #[arg(long, requires = "dir")]
    pub glob: Option<String>,
}

// -- Items --

#[derive(Debug, Parser)]
pub struct ItemsArgs {
    /// Semantic search terms (omit for purely structured filtering)
    pub query: Option<String>,

    /// Exact page number (overrides the page range)
    #[arg(long)]
    pub page: Option<u32>,

    /// Start of a page range, inclusive
    #[arg(long)]
    pub min_page: Option<u32>,

    /// End of a page range, inclusive
    #[arg(long)]
    pub max_page: Option<u32>,

    /// Exact invoice number of the parent document
    #[arg(long)]
    pub invoice_number: Option<String>,

    /// Sender/vendor name (fuzzy match)
    #[arg(long)]
    pub sender: Option<String>,

    /// Parent invoice issued on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub date_start: Option<String>,

    /// Parent invoice issued on or before this date (YYYY-MM-DD)
    #[arg(long)]
    pub date_end: Option<String>,

    /// Minimum line item total amount
    #[arg(long)]
    pub min_amount: Option<f64>,

    /// Maximum line item total amount
    #[arg(long)]
    pub max_amount: Option<f64>,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Invoices --

#[derive(Debug, Parser)]
pub struct InvoicesArgs {
    /// Exact invoice number to look up
    #[arg(long)]
    pub invoice_number: Option<String>,

    /// Sender/vendor name (fuzzy match)
    #[arg(long)]
    pub sender: Option<String>,

    /// Partial match for the original filename
    #[arg(long)]
    pub filename: Option<String>,

    /// Processing status: COMPLETED, FAILED, or PROCESSING
    #[arg(long)]
    pub status: Option<String>,

    /// Invoice date on or after (YYYY-MM-DD)
    #[arg(long)]
    pub date_start: Option<String>,

    /// Invoice date on or before (YYYY-MM-DD)
    #[arg(long)]
    pub date_end: Option<String>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question to ask
    pub query: String,

    /// Generate a prose answer over the retrieved results
    #[arg(long)]
    pub llm_answer: bool,

    /// Output results as JSON (ignored with --llm-answer)
    #[arg(long)]
    pub json: bool,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "invobert",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn parse_items_defaults() {
        let cli = Cli::parse_from(["invobert", "items", "maintenance"]);
        match cli.command {
            Command::Items(args) => {
                assert_eq!(args.query.as_deref(), Some("maintenance"));
                assert_eq!(args.limit, 20);
                assert!(!args.json);
                assert!(args.page.is_none());
            }
            _ => panic!("expected items command"),
        }
    }

    #[test]
    fn parse_items_without_query() {
        let cli = Cli::parse_from([
            "invobert",
            "items",
            "--min-page",
            "10",
            "--max-page",
            "15",
        ]);
        match cli.command {
            Command::Items(args) => {
                assert!(args.query.is_none());
                assert_eq!(args.min_page, Some(10));
                assert_eq!(args.max_page, Some(15));
            }
            _ => panic!("expected items command"),
        }
    }

    #[test]
    fn parse_ingest_with_dir() {
        let cli = Cli::parse_from([
            "invobert",
            "ingest",
            "--dir",
            "/invoices",
            "--glob",
            "*.txt",
        ]);
        match cli.command {
            Command::Ingest(args) => {
                assert!(args.paths.is_empty());
                assert_eq!(args.dir.as_deref().unwrap().to_str(), Some("/invoices"));
                assert_eq!(args.glob.as_deref(), Some("*.txt"));
            }
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn glob_requires_dir() {
        assert!(
            Cli::try_parse_from(["invobert", "ingest", "--glob", "*.txt"])
                .is_err()
        );
    }
}
