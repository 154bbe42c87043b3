use anyhow::{Context, Result};
use chatbi::telemetry::init_tracing;
use chatbi::{Config, OpenAiCompatibleClient, Orchestrator, PipelineContext, PipelineSettings, SqlxWarehouse};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "chatbi")]
#[command(about = "Ask questions of a relational warehouse in natural language")]
struct Args {
    /// Database URL (or set DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question: generate SQL, run it and analyse the result
    Ask { question: String },
    /// Generate and validate SQL without running it
    Sql { question: String },
    /// Show the database schema, or one table
    Schema {
        #[arg(long)]
        table: Option<String>,
        /// Bypass the schema cache
        #[arg(long)]
        refresh: bool,
    },
    /// Set a table comment
    CommentTable { table: String, comment: String },
    /// Set a column comment
    CommentColumn {
        table: String,
        column: String,
        comment: String,
        /// Full column definition (MySQL); rebuilt from metadata when omitted
        #[arg(long)]
        definition: Option<String>,
    },
    /// Metadata completeness report
    Report,
    /// Metadata quality level with advice
    Quality,
    /// Example questions
    Suggest {
        #[arg(long)]
        table: Option<String>,
    },
    /// Row count and numeric column statistics for a table
    Profile { table: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();

    let mut config = Config::load(args.database_url)?;
    if let Some(key) = args.api_key {
        config = config.with_api_key(key);
    }

    let needs_completion = matches!(args.command, Command::Ask { .. } | Command::Sql { .. });
    if needs_completion {
        config.validate()?;
    }

    info!("ChatBI starting against {}", config.dialect);
    let store = Arc::new(
        SqlxWarehouse::connect(&config)
            .await
            .context("Failed to connect to the database")?,
    );
    let completion = Arc::new(OpenAiCompatibleClient::new(
        config.api_key.clone().unwrap_or_default(),
        config.llm_base_url.clone(),
        config.sql_model.clone(),
    ));
    let orchestrator = Orchestrator::new(PipelineContext::new(
        Arc::clone(&store) as _,
        completion,
        PipelineSettings::from(&config),
    ));

    let outcome = run(&orchestrator, args.command).await;
    store.pool().close().await;
    outcome
}

async fn run(orchestrator: &Orchestrator, command: Command) -> Result<()> {
    match command {
        Command::Ask { question } => print_json(&orchestrator.answer(&question).await)?,
        Command::Sql { question } => print_json(&orchestrator.generate_sql(&question).await?)?,
        Command::Schema { table: Some(table), refresh } => {
            print_json(&*orchestrator.introspector().get_table_schema(&table, refresh).await?)?
        }
        Command::Schema { table: None, refresh } => {
            if refresh {
                orchestrator.clear_cache();
            }
            print_json(&orchestrator.get_schema().await?)?
        }
        Command::CommentTable { table, comment } => {
            orchestrator.update_table_comment(&table, &comment).await?;
            println!("Updated comment on table {}", table);
        }
        Command::CommentColumn {
            table,
            column,
            comment,
            definition,
        } => {
            orchestrator
                .update_column_comment(&table, &column, &comment, definition.as_deref())
                .await?;
            println!("Updated comment on column {}.{}", table, column);
        }
        Command::Report => print_json(&orchestrator.metadata_completeness_report().await?)?,
        Command::Quality => print_json(&orchestrator.metadata_quality().await?)?,
        Command::Suggest { table } => print_json(&orchestrator.suggested_queries(table.as_deref()).await?)?,
        Command::Profile { table } => print_json(&orchestrator.table_profile(&table).await?)?,
    }

    Ok(())
}
