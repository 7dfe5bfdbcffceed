//! CineGraph CLI
//!
//! Ask questions about the movie graph from the terminal:
//! - `ask` answers one question and exits
//! - `repl` keeps a session open
//! - `explain` shows the extracted intent and candidate query without running it
//! - `schema` prints the graph schema the query generator sees

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;

use cinegraph_qa::config::ConfigError;
use cinegraph_qa::graph::neo4j::Neo4jHttpEngine;
use cinegraph_qa::llm::providers::UnifiedClient;
use cinegraph_qa::llm::CompletionProvider;
use cinegraph_qa::pipeline::PipelineRun;
use cinegraph_qa::{GraphConfig, Mode, QaConfig, QaService, SchemaDescriptor};

mod logging;
mod repl;

#[derive(Parser)]
#[command(name = "cinegraph")]
#[command(
    author,
    version,
    about = "CineGraph: natural-language questions over a movie knowledge graph"
)]
struct Cli {
    #[command(flatten)]
    graph: GraphArgs,

    /// More log output on stderr (-v debug, -vv trace). Overrides RUST_LOG.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: logging::LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GraphArgs {
    /// Neo4j HTTP base URL.
    #[arg(long, env = "NEO4J_URL", global = true)]
    neo4j_url: Option<String>,

    #[arg(long, env = "NEO4J_USER", global = true)]
    neo4j_user: Option<String>,

    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true, global = true)]
    neo4j_password: Option<String>,

    #[arg(long, env = "NEO4J_DATABASE", global = true)]
    neo4j_database: Option<String>,
}

#[derive(Args)]
struct ModeArg {
    /// `direct` (templates) or `llm` (model-written queries).
    #[arg(long, env = "CINEGRAPH_MODE", default_value = "direct", value_parser = parse_mode)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question.
    Ask {
        /// The question; quoting is optional.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        #[command(flatten)]
        mode: ModeArg,
        /// Print the executed queries to stderr.
        #[arg(long)]
        show_query: bool,
    },

    /// Interactive session. Type `exit` to quit.
    Repl {
        #[command(flatten)]
        mode: ModeArg,
    },

    /// Show the extracted intent and candidate query without executing it.
    Explain {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        #[command(flatten)]
        mode: ModeArg,
    },

    /// Print the graph schema.
    Schema,
}

fn parse_mode(s: &str) -> std::result::Result<Mode, String> {
    s.parse::<Mode>().map_err(|e| e.to_string())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);

    if let Commands::Schema = cli.command {
        print!("{}", SchemaDescriptor::movie_graph().describe());
        return Ok(ExitCode::SUCCESS);
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    let service = build_service(&cli.graph)?;

    match cli.command {
        Commands::Ask {
            question,
            mode,
            show_query,
        } => {
            let question = question.join(" ");
            let run = runtime.block_on(service.run(&question, mode.mode));
            Ok(print_run(&run, show_query))
        }
        Commands::Repl { mode } => {
            repl::cmd_repl(&runtime, &service, mode.mode)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Explain { question, mode } => {
            let question = question.join(" ");
            let explanation = runtime
                .block_on(service.explain(&question, mode.mode))
                .with_context(|| format!("cannot explain {question:?}"))?;
            print_explanation(&explanation)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schema => Ok(ExitCode::SUCCESS),
    }
}

fn build_service(args: &GraphArgs) -> Result<QaService> {
    let mut graph = GraphConfig::from_env().context("invalid Neo4j settings")?;
    if let Some(url) = &args.neo4j_url {
        graph.url = url.trim_end_matches('/').to_string();
    }
    if let Some(user) = &args.neo4j_user {
        graph.user = user.clone();
    }
    if let Some(password) = &args.neo4j_password {
        graph.password = Some(password.clone());
    }
    if let Some(database) = &args.neo4j_database {
        graph.database = database.clone();
    }
    tracing::debug!(?graph, "graph endpoint");
    let engine = Neo4jHttpEngine::new(graph).context("failed to create the Neo4j client")?;

    let config = QaConfig::from_env().context("invalid pipeline settings")?;
    let mut builder = QaService::builder(Arc::new(engine)).config(config);

    match UnifiedClient::from_env() {
        Ok(client) => {
            let info = client.model_info();
            tracing::info!(provider = %info.provider, model = %info.name, "completion provider configured");
            builder = builder.completion(Arc::new(client));
        }
        Err(ConfigError::NoProviderConfigured) => {
            tracing::info!("no completion provider configured; llm mode disabled");
        }
        Err(e) => return Err(e).context("invalid LLM provider settings"),
    }

    Ok(builder.build())
}

/// Prints the answer (or the user-facing failure text) to stdout.
pub(crate) fn print_run(run: &PipelineRun, show_query: bool) -> ExitCode {
    if show_query {
        for (i, query) in run.trace.queries.iter().enumerate() {
            eprintln!("{} {}", format!("query #{}:", i + 1).dimmed(), query.text);
            if !query.parameters.is_empty() {
                eprintln!(
                    "{} {}",
                    "params:".dimmed(),
                    serde_json::Value::Object(query.parameters.clone())
                );
            }
        }
    }

    match &run.result {
        Ok(answer) => {
            println!("{}", answer.text);
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("{}", err.user_message().yellow());
            eprintln!(
                "{} {} ({})",
                "error:".red().bold(),
                err,
                run.trace.request_id
            );
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn print_explanation(explanation: &cinegraph_qa::pipeline::Explanation) -> Result<()> {
    println!("{} {}", "mode:".bold(), explanation.mode);
    match &explanation.intent {
        Some(intent) => {
            println!("{} {}", "intent:".bold(), intent.intent);
            for entity in &intent.entities {
                println!("  {} = {}", entity.role.cyan(), entity.value);
            }
        }
        None => println!("{} (extraction skipped)", "intent:".bold()),
    }
    println!("{}", "query:".bold());
    println!("{}", explanation.query.text.green());
    if !explanation.query.parameters.is_empty() {
        let params = serde_json::to_string_pretty(&explanation.query.parameters)
            .context("failed to render query parameters")?;
        println!("{} {params}", "params:".bold());
    }
    Ok(())
}
