use sql_assistant::{
    AssistantReply, Config, QueryResult, ReplyOutcome, SessionId, SqlAssistant, EXAMPLE_QUESTIONS,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sql-assistant")]
#[command(about = "Ask questions about a relational database in plain English")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        /// The question in natural language
        question: String,

        /// Print the generated SQL, its confidence and the raw rows
        #[arg(long)]
        show_sql: bool,
    },
    /// Interactive conversation (:clear, :examples, :quit)
    Chat {
        /// Print the generated SQL, its confidence and the raw rows
        #[arg(long)]
        show_sql: bool,
    },
    /// Print the introspected schema
    Schema {
        /// Print the structured table map as JSON instead of prose
        #[arg(long)]
        json: bool,
    },
    /// Print sample rows of a table
    Sample {
        /// Table name
        table: String,

        /// Number of rows (default: 5)
        #[arg(short, long, default_value_t = 5)]
        limit: u32,
    },
    /// Print the row count of every table
    Stats,
    /// List required environment variables that are not set
    CheckEnv,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Commands::CheckEnv = args.command {
        return check_env();
    }

    let config = Config::from_env()?;
    let assistant = match SqlAssistant::connect(&config).await {
        Ok(assistant) => assistant,
        Err(e) => {
            error!("Startup failed: {}", e);
            eprintln!("{}", e.user_message());
            eprintln!("Run `sql-assistant check-env` to see which settings are missing.");
            return Err(e.into());
        }
    };

    match args.command {
        Commands::Ask { question, show_sql } => {
            let session = assistant.create_session();
            let reply = assistant.ask(&session, &question).await;
            print_reply(&reply, show_sql);
        }
        Commands::Chat { show_sql } => run_chat(&assistant, show_sql).await?,
        Commands::Schema { json } => {
            if json {
                println!("{}", assistant.description().tables_json());
            } else {
                print!("{}", assistant.description().text);
            }
        }
        Commands::Sample { table, limit } => match assistant.sample_rows(&table, limit).await {
            Ok(result) => println!("{}", result),
            Err(e) => {
                error!("Sample of {} failed: {}", table, e);
                eprintln!("{}", e.user_message());
            }
        },
        Commands::Stats => {
            println!("\n{}", "=".repeat(40));
            println!(" DATABASE OVERVIEW");
            println!("{}", "=".repeat(40));
            for (table, count) in assistant.table_row_counts().await {
                println!("   {:<24} {:>10}", table, count);
            }
        }
        Commands::CheckEnv => check_env()?,
    }

    Ok(())
}

fn check_env() -> Result<()> {
    let missing = Config::missing_variables();
    if missing.is_empty() {
        println!("All required environment variables are set.");
    } else {
        println!("Missing environment variables:");
        for var in &missing {
            println!("  - {}", var);
        }
    }
    Ok(())
}

async fn run_chat(assistant: &SqlAssistant, show_sql: bool) -> Result<()> {
    let mut session: SessionId = assistant.create_session();
    info!("Chat session {} started", session);

    println!("Ask me anything about the database. Commands: :examples, :clear, :quit");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let input = line.trim();

        match input {
            "" => continue,
            ":quit" | ":exit" => break,
            ":clear" => {
                session = assistant.reset_session();
                println!("History cleared.");
            }
            ":examples" => {
                for question in EXAMPLE_QUESTIONS {
                    println!("  - {}", question);
                }
            }
            question => {
                let reply = assistant.ask(&session, question).await;
                print_reply(&reply, show_sql);
            }
        }
    }

    Ok(())
}

fn print_reply(reply: &AssistantReply, show_sql: bool) {
    println!("{}", reply.answer);

    if show_sql && reply.outcome != ReplyOutcome::Rejected {
        println!("\n{}", "-".repeat(40));
        println!("SQL: {}", reply.sql);
        println!("Confidence: {:.0}%", reply.confidence * 100.0);
        if let Some(QueryResult::Rows(rows)) = &reply.result {
            println!("{}", rows.render_table(None));
        }
    }
}
