use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod chain;
pub mod cli;
pub mod criteria;
pub mod data_dir;
pub mod embed;
pub mod error;
pub mod executor;
pub mod extract;
pub mod ingest;
pub mod invoice_db;
pub mod mcp;
pub mod memory;
pub mod model;
pub mod plan;
pub mod qa;
pub mod record_id;
pub mod resolver;
pub mod search;
pub mod store;
pub mod text;
pub mod walker;

use cli::{Cli, Command};
use data_dir::DataDir;
use embed::HttpEmbedder;
use extract::HttpPageExtractor;
use ingest::{IngestOutcome, IngestionService};
use invoice_db::RedbInvoiceStore;
use model::ProcessingStatus;
use qa::{AskOutcome, AskService, HttpAnswerGenerator, HttpQueryRouter};
use search::RetrievalService;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("INVOBERT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    match cli.command {
        Command::Ingest(args) => {
            cmd_ingest(&data_dir, &args).await?;
        }
        Command::Items(args) => {
            cmd_items(&data_dir, &args).await?;
        }
        Command::Invoices(args) => {
            cmd_invoices(&data_dir, &args).await?;
        }
        Command::Ask(args) => {
            cmd_ask(&data_dir, &args).await?;
        }
        Command::Status(args) => {
            cmd_status(&data_dir, args.json).await?;
        }
        Command::Mcp => {
            mcp::run_mcp(data_dir).await?;
        }
        Command::Completions(args) => {
            args.generate();
        }
    }

    Ok(())
}

fn open_retrieval(data_dir: &DataDir) -> error::Result<RetrievalService> {
    let store = Arc::new(RedbInvoiceStore::open(&data_dir.invoices_db())?);
    let embedder = Arc::new(HttpEmbedder::from_env());
    Ok(RetrievalService::new(store, embedder))
}

async fn cmd_ingest(
    data_dir: &DataDir,
    args: &cli::IngestArgs,
) -> error::Result<()> {
    let mut paths = args.paths.clone();
    if let Some(dir) = &args.dir {
        paths.extend(walker::discover_invoice_files(
            dir,
            args.glob.as_deref(),
        )?);
    }
    if paths.is_empty() {
        return Err(error::Error::Config(
            "no input files; pass paths or --dir".into(),
        ));
    }

    let store = Arc::new(RedbInvoiceStore::open(&data_dir.invoices_db())?);
    let extractor = Arc::new(HttpPageExtractor::from_env());
    let embedder = Arc::new(HttpEmbedder::from_env());
    let service =
        Arc::new(IngestionService::new(store, extractor, embedder));

    let total = paths.len();
    let results = ingest::ingest_batch(service, paths).await;

    let mut failures = 0usize;
    for (path, outcome) in &results {
        match outcome {
            Ok(IngestOutcome::Completed {
                line_items,
                pages_processed,
                ..
            }) => {
                println!(
                    "OK: {} ({pages_processed} page(s), {line_items} line item(s))",
                    path.display()
                );
            }
            Ok(IngestOutcome::Skipped { .. }) => {
                println!("SKIP: {} (already ingested)", path.display());
            }
            Err(err) => {
                failures += 1;
                eprintln!("ERROR: {}: {err}", path.display());
            }
        }
    }
    println!("{}/{total} file(s) processed", total - failures);

    Ok(())
}

async fn cmd_items(
    data_dir: &DataDir,
    args: &cli::ItemsArgs,
) -> error::Result<()> {
    let criteria = criteria::LineItemCriteria {
        query_text: args.query.clone(),
        page_number: args.page,
        min_page: args.min_page,
        max_page: args.max_page,
        invoice_number: args.invoice_number.clone(),
        sender_name: args.sender.clone(),
        invoice_date_start: args.date_start.clone(),
        invoice_date_end: args.date_end.clone(),
        min_amount: args.min_amount,
        max_amount: args.max_amount,
        limit: args.limit,
    };

    let retrieval = open_retrieval(data_dir)?;
    let hits = retrieval.search_line_items(&criteria).await?;

    if args.json {
        println!("{}", search::format_json(&hits)?);
    } else {
        search::format_line_items_human(&hits);
    }
    Ok(())
}

async fn cmd_invoices(
    data_dir: &DataDir,
    args: &cli::InvoicesArgs,
) -> error::Result<()> {
    let status = args
        .status
        .as_deref()
        .map(str::parse::<ProcessingStatus>)
        .transpose()?;

    let criteria = criteria::InvoiceCriteria {
        invoice_number: args.invoice_number.clone(),
        sender_name: args.sender.clone(),
        filename_query: args.filename.clone(),
        status,
        start_date: args.date_start.clone(),
        end_date: args.date_end.clone(),
    };

    let retrieval = open_retrieval(data_dir)?;
    let hits = retrieval.search_invoices(&criteria).await?;

    if args.json {
        println!("{}", search::format_json(&hits)?);
    } else {
        search::format_invoices_human(&hits);
    }
    Ok(())
}

async fn cmd_ask(data_dir: &DataDir, args: &cli::AskArgs) -> error::Result<()> {
    let retrieval = open_retrieval(data_dir)?;
    let service = AskService::new(
        Arc::new(HttpQueryRouter::from_env()),
        retrieval,
        Arc::new(HttpAnswerGenerator::from_env()),
    );

    match service.ask(&args.query, args.llm_answer).await? {
        AskOutcome::Direct(text) | AskOutcome::Answer(text) => {
            println!("{text}");
        }
        AskOutcome::LineItems(hits) => {
            if args.json {
                println!("{}", search::format_json(&hits)?);
            } else {
                search::format_line_items_human(&hits);
            }
        }
        AskOutcome::Invoices(hits) => {
            if args.json {
                println!("{}", search::format_json(&hits)?);
            } else {
                search::format_invoices_human(&hits);
            }
        }
    }
    Ok(())
}

async fn cmd_status(data_dir: &DataDir, json: bool) -> error::Result<()> {
    let store = RedbInvoiceStore::open(&data_dir.invoices_db())?;
    let counts = store::InvoiceStore::counts(&store).await?;

    if json {
        println!(
            "{{\"data_dir\":\"{}\",\"invoices\":{},\"line_items\":{}}}",
            data_dir.root().display(),
            counts.invoices,
            counts.line_items
        );
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Invoices: {}", counts.invoices);
        println!("Line items: {}", counts.line_items);
    }
    Ok(())
}
