// blpdata/blp_query.rs
// Command-line front end: run a named request against a recorded session.

use anyhow::{anyhow, Context, Result};
use blpdata::config::{DEFAULT_HOST, DEFAULT_PORT};
use blpdata::{BlpClient, ClientOptions, RequestType};
use clap::Parser;
use log::{error, info};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::time::Duration;

// --- CLI Argument Parsing ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  #[clap(subcommand)]
  command: Command,
}

#[derive(Parser, Debug)]
enum Command {
  /// Run one request type with JSON parameters.
  Run(RunArgs),
  /// List the request types that can be run.
  List,
}

#[derive(Parser, Debug)]
struct RunArgs {
  /// Request type name (e.g. ReferenceDataRequest, HistoricalDataRequest, EQS).
  #[arg()]
  request_type: String,

  /// Request parameters as a JSON object.
  #[arg(default_value = "{}")]
  params: String,

  /// Path to the SQLite database holding recorded sessions.
  #[arg(long)]
  db: Option<PathBuf>,

  /// Recorded session to replay. Defaults to the request type name.
  #[arg(long)]
  session: Option<String>,

  /// Terminal host address.
  #[arg(long, default_value = DEFAULT_HOST)]
  host: String,

  /// Terminal port.
  #[arg(long, default_value_t = DEFAULT_PORT)]
  port: u16,

  /// Overall bound on waiting for a response, in milliseconds.
  #[arg(long)]
  deadline_ms: Option<u64>,

  #[arg(long)]
  ignore_security_errors: bool,

  #[arg(long)]
  ignore_field_errors: bool,

  /// Print the raw result set as JSON instead of a table.
  #[arg(long)]
  json: bool,
}

impl RunArgs {
  fn options(&self) -> ClientOptions {
    ClientOptions::new(&self.host, self.port)
      .ignore_security_errors(self.ignore_security_errors)
      .ignore_field_errors(self.ignore_field_errors)
      .with_deadline(self.deadline_ms.map(Duration::from_millis))
  }
}

fn create_client(args: &RunArgs, request_type: RequestType) -> Result<BlpClient> {
  let options = args.options();
  options.validate().context("Invalid connection options")?;
  let db_path = args.db.as_ref()
    .ok_or_else(|| anyhow!("No terminal library is linked into this binary; pass --db to replay a recorded session"))?;
  let session = args.session.clone().unwrap_or_else(|| request_type.name().to_string());
  info!("Replaying session '{}' from {}", session, db_path.display());
  BlpClient::from_db(db_path, &session, options)
    .with_context(|| format!("Failed to open session '{}' in {}", session, db_path.display()))
}

fn run(args: &RunArgs) -> Result<()> {
  let request_type: RequestType = args.request_type.parse()?;
  let params: JsonValue = serde_json::from_str(&args.params).context("Parameters are not valid JSON")?;
  let client = create_client(args, request_type)?;

  if args.json {
    let result = client.get(request_type.name(), &params)
      .with_context(|| format!("{} failed", request_type))?;
    println!("{}", serde_json::to_string_pretty(&result.to_json())?);
  } else {
    let table = client.get_table(request_type.name(), &params)
      .with_context(|| format!("{} failed", request_type))?;
    info!("{} returned {} rows", request_type, table.num_rows());
    println!("{}", table);
  }
  Ok(())
}

fn main() -> Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
  let args = Args::parse();

  match args.command {
    Command::List => {
      for name in RequestType::names() {
        println!("{}", name);
      }
      Ok(())
    }
    Command::Run(run_args) => {
      if let Err(e) = run(&run_args) {
        error!("{:#}", e);
        return Err(e);
      }
      Ok(())
    }
  }
}
