use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {status}: {message}")]
    ServerError { status: u16, message: String },
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
    #[error("frame is not a base64 string; fetch without --output to see it")]
    NotBase64Frame,
    #[error("invalid base64 frame: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Parser, Debug)]
#[command(name = "relay-cli", about = "Send and read frames on a frame relay")]
struct Cli {
    #[arg(long, env = "RELAY_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    #[arg(long, env = "RELAY_TIMEOUT_SECS", default_value_t = 5)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone)]
struct CliContext {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Post one frame.
    Send(SendArgs),
    /// Show server and stream status.
    Status,
    /// Read the current frame.
    Fetch(FetchArgs),
}

#[derive(Args, Debug)]
struct SendArgs {
    #[arg(long, env = "RELAY_STREAM_ID", default_value = "laptop_camera_001")]
    stream_id: String,

    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    frame: Option<String>,

    #[arg(long, help = "Send the file's bytes base64-encoded")]
    file: Option<PathBuf>,

    #[arg(long, default_value_t = false, help = "Parse --frame as a JSON value instead of a string")]
    json: bool,

    #[arg(long, help = "Client timestamp in Unix seconds; the server uses its own clock when omitted")]
    timestamp: Option<i64>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    #[arg(long, help = "Decode a base64 frame and write the raw bytes here")]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cli.timeout_secs))
        .build()?;
    let ctx = CliContext { base_url: cli.base_url, client };

    match cli.command {
        Command::Send(args) => run_send(&ctx, args).await,
        Command::Status => run_status(&ctx).await,
        Command::Fetch(args) => run_fetch(&ctx, args).await,
    }
}

async fn run_send(cli: &CliContext, args: SendArgs) -> Result<(), CliError> {
    let frame = match (&args.frame, &args.file) {
        (_, Some(path)) => file_frame(path)?,
        (Some(text), None) => text_frame(text, args.json)?,
        (None, None) => return Err(CliError::MissingField("frame")),
    };
    let body = ingest_body(&args.stream_id, frame, args.timestamp);
    let json = api_request(cli, reqwest::Method::POST, "/api/stream", Some(body)).await?;
    print_json(&json)
}

async fn run_status(cli: &CliContext) -> Result<(), CliError> {
    let json = api_request(cli, reqwest::Method::GET, "/api/status", None).await?;
    print_json(&json)
}

async fn run_fetch(cli: &CliContext, args: FetchArgs) -> Result<(), CliError> {
    let json = api_request(cli, reqwest::Method::GET, "/api/get_frame", None).await?;
    let Some(output) = args.output else {
        return print_json(&json);
    };

    let frame = json.get("frame").ok_or(CliError::MissingField("frame"))?;
    let bytes = decode_frame(frame)?;
    std::fs::write(&output, &bytes).map_err(|source| CliError::Io {
        action: "write",
        path: output.clone(),
        source,
    })?;
    eprintln!("wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

fn file_frame(path: &Path) -> Result<Value, CliError> {
    let bytes = std::fs::read(path).map_err(|source| CliError::Io {
        action: "read",
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Value::String(STANDARD.encode(bytes)))
}

fn text_frame(text: &str, as_json: bool) -> Result<Value, CliError> {
    if as_json {
        Ok(serde_json::from_str(text)?)
    } else {
        Ok(Value::String(text.to_owned()))
    }
}

fn ingest_body(stream_id: &str, frame: Value, timestamp: Option<i64>) -> Value {
    let mut body = Map::new();
    body.insert("stream_id".to_owned(), Value::String(stream_id.to_owned()));
    body.insert("frame".to_owned(), frame);
    if let Some(timestamp) = timestamp {
        body.insert("timestamp".to_owned(), Value::from(timestamp));
    }
    Value::Object(body)
}

fn decode_frame(frame: &Value) -> Result<Vec<u8>, CliError> {
    let encoded = frame.as_str().ok_or(CliError::NotBase64Frame)?;
    Ok(STANDARD.decode(encoded.trim())?)
}

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

async fn api_request(
    cli: &CliContext,
    method: reqwest::Method,
    path: &str,
    body: Option<Value>,
) -> Result<Value, CliError> {
    let url = endpoint_url(&cli.base_url, path);
    let request = cli.client.request(method, &url);
    let request = if let Some(json) = body {
        request.json(&json)
    } else {
        request
    };

    let response = request.send().await?;
    let status = response.status();
    let value = response
        .json::<Value>()
        .await
        .unwrap_or_else(|_| Value::Null);

    if !status.is_success() {
        return Err(CliError::ServerError {
            status: status.as_u16(),
            message: server_message(&value),
        });
    }

    Ok(value)
}

/// The relay's `{"error": ...}` text, or the raw body when it has another shape.
fn server_message(value: &Value) -> String {
    value
        .get("error")
        .and_then(Value::as_str)
        .map_or_else(|| value.to_string(), ToOwned::to_owned)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
