//! `cts` - command-line runner for the built-in suites

use clap::{Args, CommandFactory, Parser, Subcommand};
use cts_harness::framework::load_expectations;
use cts_harness::query::TestQuery;
use cts_harness::runner::{CtsRunner, RunnerConfig, Shard, ValidateOptions, validate_suite};
use cts_harness::suites::builtin_registry;
use cts_harness::tree::{CollapseOptions, NodeRef, load_tree};
use cts_harness::{HarnessError, Result, VERSION};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "cts", version = VERSION, about = "Run, list and validate test suites")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every case matched by the queries
    Run(RunArgs),
    /// Print the tree for a query
    List {
        query: String,
        /// Subqueries to show expanded
        #[arg(long = "expand")]
        expand: Vec<String>,
        /// Print the full tree instead of collapsed nodes
        #[arg(long)]
        tree: bool,
    },
    /// Check suites for structural problems
    Validate {
        /// Suites to check (default: all)
        suites: Vec<String>,
        #[arg(long)]
        print_metadata_warnings: bool,
        #[arg(long)]
        print_case_count_report: bool,
        #[arg(long, default_value_t = cts_harness::runner::DEFAULT_MAX_QUERY_LENGTH)]
        max_query_length: usize,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// e.g. `unittests:*` or `unittests:query:roundtrip:i=3`
    queries: Vec<String>,
    /// Log each case as it finishes and dump the results JSON
    #[arg(short, long)]
    verbose: bool,
    /// Keep debug messages in case logs
    #[arg(long)]
    debug: bool,
    #[arg(long, default_value_t = cts_harness::framework::DEFAULT_MAX_SUBCASES_IN_FLIGHT)]
    max_subcases_in_flight: usize,
    /// Fail any test body that runs longer than this
    #[arg(long)]
    case_timeout_ms: Option<u64>,
    /// Only run spec files in shard `index/count`
    #[arg(long)]
    shard: Option<Shard>,
    /// JSON list of `{"query", "expectation"}` overrides
    #[arg(long)]
    expectations: Option<PathBuf>,
    /// Write the results JSON here
    #[arg(long)]
    results: Option<PathBuf>,
}

fn parse_queries(queries: &[String]) -> Result<Vec<TestQuery>> {
    queries
        .iter()
        .map(|q| TestQuery::parse(q).map_err(HarnessError::from))
        .collect()
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    if args.queries.is_empty() {
        let _ = Cli::command().print_help();
        return Ok(ExitCode::SUCCESS);
    }
    let queries = parse_queries(&args.queries)?;
    let expectations = match &args.expectations {
        Some(path) => load_expectations(path)?,
        None => Vec::new(),
    };
    let verbose = args.verbose;
    let config = RunnerConfig {
        max_subcases_in_flight: args.max_subcases_in_flight,
        debug: args.debug,
        verbose,
        case_timeout_ms: args.case_timeout_ms,
        shard: args.shard,
        expectations,
    };

    let runner = CtsRunner::new(config);
    let report = runner.run_queries(&builtin_registry(), &queries).await?;

    let json = runner.logger().as_json()?;
    if verbose {
        println!("{}", json);
    }
    if let Some(path) = args.results {
        std::fs::write(&path, &json)?;
        log::info!("wrote results to {}", path.display());
    }

    if report.warned() > 0 {
        println!("\n** Warnings **");
        for o in report.warnings() {
            println!("{}", o.query);
        }
    }
    if report.failed() > 0 {
        println!("\n** Failures **");
        for o in report.failures() {
            println!("{}", o.query);
            for line in &o.result.logs {
                println!("  {}", line.render(true).replace('\n', "\n  "));
            }
        }
    }
    println!("\n{}", report.summary());
    Ok(ExitCode::from(report.exit_code() as u8))
}

async fn list(query: String, expand: Vec<String>, tree: bool) -> Result<ExitCode> {
    let query = TestQuery::parse(&query)?;
    let expand = parse_queries(&expand)?;
    let loaded = load_tree(&builtin_registry(), &query, &expand).await?;
    if tree {
        println!("{}", loaded);
        return Ok(ExitCode::SUCCESS);
    }
    for node in loaded.iterate_collapsed_nodes(CollapseOptions::default()) {
        match node {
            NodeRef::Subtree(s) => println!("{} ({} tests)", s.query(), s.counts().tests),
            NodeRef::Leaf(l) => println!("{}", l.query()),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn validate(suites: Vec<String>, opts: ValidateOptions) -> Result<ExitCode> {
    let registry = builtin_registry();
    let suites = if suites.is_empty() {
        registry.suite_names()
    } else {
        suites
    };

    let mut failed = false;
    for suite in &suites {
        let report = validate_suite(&registry, suite, &opts).await?;
        if opts.print_case_count_report {
            println!("{}", report.case_count_table());
        }
        if report.is_ok() {
            println!("{}: OK ({} warnings)", suite, report.warnings.len());
        } else {
            failed = true;
            println!("{}: {} errors", suite, report.errors.len());
            for e in &report.errors {
                println!("  {}", e);
            }
        }
    }
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_filter = match &cli.command {
        Command::Run(args) if args.verbose => "info",
        _ => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::List { query, expand, tree } => list(query, expand, tree).await,
        Command::Validate {
            suites,
            print_metadata_warnings,
            print_case_count_report,
            max_query_length,
        } => {
            let opts = ValidateOptions {
                max_query_length,
                print_metadata_warnings,
                print_case_count_report,
            };
            validate(suites, opts).await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
