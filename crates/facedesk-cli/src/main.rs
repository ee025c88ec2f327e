use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facedesk", about = "facedesk face registry and SMS relay CLI")]
struct Cli {
    /// Base URL of the facedeskd server
    #[arg(long, env = "FACEDESK_SERVER", default_value = "http://127.0.0.1:9000")]
    server: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload one or more photos under a label
    Enroll {
        /// Person the photos belong to (e.g. "alice")
        #[arg(short, long)]
        label: String,
        /// Photo files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List labels in the cached registry
    Faces {
        /// Print the raw descriptor JSON
        #[arg(long)]
        json: bool,
    },
    /// Match a photo against the registry
    Recognize {
        file: PathBuf,
    },
    /// Rebuild the registry from the uploaded photos
    Rebuild,
    /// Show daemon status
    Status,
    /// Send an SMS through the server's relay
    Sms {
        #[arg(long)]
        to: String,
        #[arg(short, long)]
        message: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEntry {
    label: String,
    descriptors: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct MatchResult {
    matched: bool,
    label: String,
    /// Absent when the server has no labels enrolled.
    distance: Option<f32>,
}

impl MatchResult {
    fn describe(&self) -> String {
        match (self.matched, self.distance) {
            (true, Some(d)) => format!("{} (distance {d:.3})", self.label),
            (_, Some(d)) => format!("no match (closest distance {d:.3})"),
            (_, None) => "no match (no labels enrolled)".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RebuildResponse {
    labels: usize,
    descriptors: usize,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    version: String,
    models_loaded: bool,
    engine_workers: usize,
    sms_configured: bool,
    labels: usize,
    cached: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = Client::builder()
        .timeout(Duration::from_secs(cli.timeout))
        .build()?;
    let base = cli.server.trim_end_matches('/');

    match cli.command {
        Commands::Enroll { label, files } => {
            for file in &files {
                let form = image_form(file).await?;
                let response = client
                    .post(format!("{base}/upload"))
                    .query(&[("label", label.as_str())])
                    .multipart(form)
                    .send()
                    .await
                    .with_context(|| format!("failed to reach {base}"))?;
                let text = checked(response).await?.text().await?;
                println!("{}: {text}", file.display());
            }
        }
        Commands::Faces { json } => {
            let response = client.get(format!("{base}/get-labeled-faces")).send().await?;
            let entries: Vec<WireEntry> = checked(response).await?.json().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No labeled faces cached");
            } else {
                for entry in &entries {
                    let dim = entry.descriptors.first().map(Vec::len).unwrap_or(0);
                    println!(
                        "{}: {} descriptor(s), {dim}-d",
                        entry.label,
                        entry.descriptors.len()
                    );
                }
            }
        }
        Commands::Recognize { file } => {
            let form = image_form(&file).await?;
            let response = client
                .post(format!("{base}/recognize"))
                .multipart(form)
                .send()
                .await?;
            let result: MatchResult = checked(response).await?.json().await?;
            println!("{}", result.describe());
        }
        Commands::Rebuild => {
            let response = client.post(format!("{base}/rebuild")).send().await?;
            let summary: RebuildResponse = checked(response).await?.json().await?;
            println!(
                "Registry rebuilt: {} label(s), {} descriptor(s)",
                summary.labels, summary.descriptors
            );
        }
        Commands::Status => {
            let response = client
                .get(format!("{base}/status"))
                .send()
                .await
                .with_context(|| format!("facedeskd not reachable at {base}"))?;
            let status: StatusResponse = checked(response).await?.json().await?;
            println!("facedeskd {}", status.version);
            println!("  models:  {}", if status.models_loaded { "loaded" } else { "unavailable" });
            println!("  workers: {}", status.engine_workers);
            println!("  sms:     {}", if status.sms_configured { "configured" } else { "not configured" });
            println!(
                "  cache:   {}",
                if status.cached {
                    format!("{} label(s)", status.labels)
                } else {
                    "empty".to_string()
                }
            );
        }
        Commands::Sms { to, message } => {
            let response = client
                .post(format!("{base}/send-sms"))
                .json(&serde_json::json!({"to": to, "message": message}))
                .send()
                .await?;
            println!("{}", checked(response).await?.text().await?);
        }
    }

    Ok(())
}

/// Multipart form with the file in the `image` field.
async fn image_form(path: &Path) -> Result<Form> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(Form::new().part("image", Part::bytes(bytes).file_name(name)))
}

/// Turn a non-2xx response into an error carrying the server's text.
async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    bail!("server returned {status}: {text}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_enroll_requires_files() {
        assert!(Cli::try_parse_from(["facedesk", "enroll", "--label", "alice"]).is_err());
        let cli = Cli::try_parse_from(["facedesk", "enroll", "-l", "alice", "a.jpg", "b.jpg"]).unwrap();
        match cli.command {
            Commands::Enroll { label, files } => {
                assert_eq!(label, "alice");
                assert_eq!(files.len(), 2);
            }
            _ => panic!("expected enroll"),
        }
    }

    #[test]
    fn test_server_override() {
        let cli = Cli::try_parse_from(["facedesk", "--server", "http://cam:9000", "status"]).unwrap();
        assert_eq!(cli.server, "http://cam:9000");
    }

    #[test]
    fn test_match_result_without_enrolled_labels() {
        let result: MatchResult =
            serde_json::from_str(r#"{"matched":false,"label":"unknown","distance":null}"#).unwrap();
        assert_eq!(result.distance, None);
        assert_eq!(result.describe(), "no match (no labels enrolled)");

        let result: MatchResult =
            serde_json::from_str(r#"{"matched":true,"label":"alice","distance":0.25}"#).unwrap();
        assert_eq!(result.describe(), "alice (distance 0.250)");
    }
}
