use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use proctor_core::relay::multipart_form;
use proctor_core::{IdentityKey, ImagePayload, OperationMode};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Covers the gateway's own backend timeout plus upload time.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "proctor", about = "Proctor face enrollment/verification CLI")]
struct Cli {
    /// Gateway base URL
    #[arg(
        long,
        global = true,
        env = "PROCTOR_GATEWAY_URL",
        default_value = "http://127.0.0.1:3000"
    )]
    gateway: Url,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an employee from a face image
    Enroll {
        /// Employee ID to enroll the face under
        #[arg(short, long)]
        employee_id: String,
        /// Image file (JPEG, PNG, ...)
        image: PathBuf,
    },
    /// Verify a face image against enrolled employees
    Verify {
        /// Image file (JPEG, PNG, ...)
        image: PathBuf,
    },
    /// Show gateway and backend status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let http = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let line = match cli.command {
        Commands::Enroll { employee_id, image } => {
            let key = IdentityKey::parse(employee_id).context("employee id must not be blank")?;
            let payload = load_image(&image).await?;
            println!("Enrolling employee {key}...");
            let (status, body) =
                upload(&http, &cli.gateway, OperationMode::Enroll, &payload, Some(&key)).await?;
            render(OperationMode::Enroll, status, &body)
        }
        Commands::Verify { image } => {
            let payload = load_image(&image).await?;
            println!("Verifying face...");
            let (status, body) =
                upload(&http, &cli.gateway, OperationMode::Verify, &payload, None).await?;
            render(OperationMode::Verify, status, &body)
        }
        Commands::Status => status(&http, &cli.gateway).await,
    };

    match line {
        Ok(line) => {
            println!("{line}");
            Ok(())
        }
        Err(message) => bail!(message),
    }
}

async fn load_image(path: &Path) -> Result<ImagePayload> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file_name = path.file_name().and_then(|n| n.to_str());
    Ok(ImagePayload::new(data, None, file_name))
}

fn endpoint(gateway: &Url, path: &str) -> String {
    format!("{}{}", gateway.as_str().trim_end_matches('/'), path)
}

async fn upload(
    http: &reqwest::Client,
    gateway: &Url,
    mode: OperationMode,
    payload: &ImagePayload,
    identity_key: Option<&IdentityKey>,
) -> Result<(u16, Value)> {
    let url = endpoint(gateway, mode.path());
    tracing::debug!(%mode, url = %url, bytes = payload.len(), "uploading");

    let resp = http
        .post(&url)
        .multipart(multipart_form(payload, identity_key))
        .send()
        .await
        .with_context(|| format!("gateway not reachable at {gateway}"))?;
    let status = resp.status().as_u16();
    let body = resp
        .json::<Value>()
        .await
        .with_context(|| format!("gateway returned a non-JSON reply (status {status})"))?;
    Ok((status, body))
}

/// Turn a gateway reply into the line shown to the user, or an error message.
fn render(mode: OperationMode, status: u16, body: &Value) -> Result<String, String> {
    if !(200..300).contains(&status) {
        let error = body["error"].as_str().unwrap_or("Error processing request");
        return Err(format!("{error} (status {status})"));
    }

    match mode {
        OperationMode::Enroll => Ok(body["message"].as_str().unwrap_or_default().to_string()),
        OperationMode::Verify => match (body["matched"].as_bool(), body["employeeId"].as_str()) {
            (Some(true), Some(id)) => Ok(format!("Matched ID: {id}")),
            (Some(false), _) => Ok("No match found".to_string()),
            _ => Err(format!("unexpected verify reply: {body}")),
        },
    }
}

async fn status(http: &reqwest::Client, gateway: &Url) -> Result<String, String> {
    let url = endpoint(gateway, "/api/health");
    let resp = http
        .get(&url)
        .send()
        .await
        .map_err(|e| format!("proctord: not connected ({e})"))?;
    let body: Value = resp
        .json()
        .await
        .map_err(|e| format!("proctord: unreadable status ({e})"))?;
    serde_json::to_string_pretty(&body).map_err(|e| e.to_string())
}
