//! redwire CLI
//!
//! Command-line interface for talking to a RESP server.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use redwire::connection::DEFAULT_PORT;
use redwire::{
    CommandRequest, Config, Connection, Endpoint, ReplyValue, StatusMode, TransactionReplies,
};
use tracing_subscriber::{fmt, EnvFilter};

/// redwire CLI
#[derive(Parser, Debug)]
#[command(name = "redwire-cli")]
#[command(about = "Send commands to a RESP key-value server")]
#[command(version)]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT, conflicts_with = "socket")]
    port: u16,

    /// Connect to a Unix socket instead of TCP
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// How status replies are shown
    #[arg(long, value_enum, default_value = "tagged")]
    status_mode: StatusArg,

    /// What a transaction prints on success
    #[arg(long, value_enum, default_value = "full")]
    transaction_replies: TransactionArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one command, e.g. `call SET key value`
    Call {
        /// Command name and arguments
        #[arg(required = true, num_args = 1..)]
        args: Vec<String>,
    },

    /// Pipeline several commands, each given as one quoted string
    Pipeline {
        /// Commands such as "SET a 1" "GET a"
        #[arg(required = true, num_args = 1..)]
        commands: Vec<String>,
    },

    /// Run several commands inside MULTI / EXEC
    Transaction {
        /// Commands such as "INCR a" "GET a"
        #[arg(required = true, num_args = 1..)]
        commands: Vec<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatusArg {
    Tagged,
    Text,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TransactionArg {
    Full,
    Results,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,redwire=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let endpoint = match &args.socket {
        Some(path) => Endpoint::unix(path),
        None => Endpoint::tcp(&args.host, args.port),
    };

    let config = Config::builder()
        .endpoint(endpoint)
        .status_mode(match args.status_mode {
            StatusArg::Tagged => StatusMode::Tagged,
            StatusArg::Text => StatusMode::Text,
        })
        .transaction_replies(match args.transaction_replies {
            TransactionArg::Full => TransactionReplies::Full,
            TransactionArg::Results => TransactionReplies::ResultsOnly,
        })
        .build();

    tracing::debug!("redwire-cli v{}", redwire::VERSION);

    let mut conn = match Connection::open(config) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("Failed to connect: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&mut conn, args.command) {
        Ok(replies) => {
            let failed = replies.iter().any(ReplyValue::is_error);
            for reply in replies {
                println!("{}", reply);
            }
            if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(conn: &mut Connection, command: Commands) -> redwire::Result<Vec<ReplyValue>> {
    match command {
        Commands::Call { args } => Ok(vec![conn.call(args)?]),
        Commands::Pipeline { commands } => {
            for line in &commands {
                conn.queue(parse_line(line)?)?;
            }
            conn.bulk_reply()
        }
        Commands::Transaction { commands } => {
            let requests = commands
                .iter()
                .map(|line| parse_line(line))
                .collect::<redwire::Result<Vec<_>>>()?;
            conn.transaction(requests)
        }
    }
}

fn parse_line(line: &str) -> redwire::Result<CommandRequest> {
    let request = match line.parse::<CommandRequest>() {
        Ok(request) => request,
        Err(never) => match never {},
    };
    if request.is_empty() {
        return Err(redwire::RedwireError::TypeMismatch(
            "empty command".to_string(),
        ));
    }
    Ok(request)
}
