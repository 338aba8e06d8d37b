//! Catalog Ingest CLI - operator client for the import gateway

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser)]
#[command(name = "catalog-ingest-cli")]
#[command(about = "Catalog Ingest CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Gateway base URL
    #[arg(long, env = "CATALOG_INGEST_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a CSV file and start an import
    Upload {
        /// Path to the CSV file
        file: PathBuf,
    },

    /// Show an import job
    Status {
        /// Job ID
        job_id: String,
    },

    /// List rejected rows of an import
    Errors {
        /// Job ID
        job_id: String,

        #[arg(short, long, default_value = "1")]
        page: u32,

        #[arg(short = 's', long, default_value = "50")]
        page_size: u32,
    },

    /// Cancel a pending or running import
    Cancel {
        /// Job ID
        job_id: String,

        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Show job counts and queue depth
    Stats,

    /// List dead-lettered import messages
    DeadLetters {
        #[arg(short = 'n', long, default_value = "100")]
        limit: u32,
    },

    /// Replay a dead-lettered message as a new import
    Replay {
        /// Dead-letter ID
        id: i64,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: String,
}

#[derive(Deserialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct JobRow {
    id: String,
    status: String,
    #[tabled(rename = "file")]
    file_name: String,
    #[tabled(rename = "total")]
    total_rows: i64,
    #[tabled(rename = "processed")]
    processed_rows: i64,
    #[tabled(rename = "errors")]
    error_rows: i64,
    attempt: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDetail {
    #[serde(flatten)]
    row: JobRow,
    last_error: Option<String>,
}

#[derive(Deserialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct RowErrorRow {
    #[tabled(rename = "row")]
    row_number: i64,
    sku: String,
    outcome: String,
    #[tabled(display_with = "display_detail")]
    detail: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorsPage {
    items: Vec<RowErrorRow>,
    page: u32,
    total: i64,
    has_next: bool,
}

#[derive(Deserialize, Tabled)]
#[serde(rename_all = "camelCase")]
struct DeadLetterRow {
    id: i64,
    #[tabled(rename = "job")]
    job_id: String,
    #[tabled(rename = "origin")]
    origin_queue: String,
    #[tabled(rename = "file")]
    source_file_ref: String,
    attempt: i32,
}

fn display_detail(detail: &Option<String>) -> String {
    detail.clone().unwrap_or_default()
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    fn new(base: &str) -> Self {
        Self {
            http: Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .context("Failed to connect to daemon")?;
        decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .context("Failed to connect to daemon")?;
        decode(response).await
    }

    async fn upload(&self, file: &Path) -> Result<SubmitResponse> {
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Cannot read {}", file.display()))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.csv".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.url("/imports"))
            .multipart(form)
            .send()
            .await
            .context("Failed to connect to daemon")?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response.json().await.context("Failed to parse response");
    }

    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => anyhow::bail!("{} ({}): {}", body.error, status.as_u16(), body.message),
        Err(_) => anyhow::bail!("HTTP {}: {}", status.as_u16(), text),
    }
}

fn print_job(job: JobDetail) {
    let status = job.row.status.clone();
    let colored_status = match status.as_str() {
        "Completed" => status.green(),
        "CompletedWithErrors" => status.yellow(),
        "Failed" => status.red(),
        _ => status.cyan(),
    };
    println!("  {} {}", "Status:".bold(), colored_status);
    if let Some(err) = &job.last_error {
        println!("  {} {}", "Last error:".bold(), err);
    }
    println!();
    println!("{}", Table::new(vec![job.row]));
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.api_url);

    match cli.command {
        Commands::Upload { file } => {
            let submitted = client.upload(&file).await?;
            println!("{}", "✓ Import accepted".green().bold());
            println!("  {} {}", "Job ID:".bold(), submitted.job_id);
        }

        Commands::Status { job_id } => {
            let job: JobDetail = client.get(&format!("/imports/{}", job_id)).await?;
            print_job(job);
        }

        Commands::Errors {
            job_id,
            page,
            page_size,
        } => {
            let path = format!(
                "/imports/{}/errors?page={}&pageSize={}",
                job_id, page, page_size
            );
            let errors: ErrorsPage = client.get(&path).await?;

            if errors.items.is_empty() {
                println!("{}", "No rejected rows".green());
            } else {
                println!("{}", Table::new(errors.items));
            }
            println!();
            println!(
                "  page {} · {} total{}",
                errors.page,
                errors.total,
                if errors.has_next { " · more pages" } else { "" }
            );
        }

        Commands::Cancel { job_id, reason } => {
            let body = match reason {
                Some(reason) => json!({ "reason": reason }),
                None => json!({}),
            };
            let job: JobDetail = client
                .post(&format!("/imports/{}/cancel", job_id), body)
                .await?;
            println!("{}", format!("✓ Job {} cancelled", job_id).green().bold());
            print_job(job);
        }

        Commands::Stats => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match client.get::<Value>("/admin/stats").await {
                Ok(stats) => {
                    println!("  {} {}", "API URL:".bold(), cli.api_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    if let Some(counts) = stats["jobsByStatus"].as_array() {
                        for count in counts {
                            println!(
                                "  {} {}",
                                format!("{}:", count["status"].as_str().unwrap_or("?")).bold(),
                                count["count"]
                            );
                        }
                    }
                    println!();
                    println!("  {} {}", "Queue depth:".bold(), stats["queueDepth"]);
                    println!("  {} {}", "Dead letters:".bold(), stats["deadLetters"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::DeadLetters { limit } => {
            let dead: Vec<DeadLetterRow> = client
                .get(&format!("/admin/dead-letters?limit={}", limit))
                .await?;
            if dead.is_empty() {
                println!("{}", "Dead-letter queue is empty".green());
            } else {
                println!("{}", Table::new(dead));
            }
        }

        Commands::Replay { id } => {
            let submitted: SubmitResponse = client
                .post(&format!("/admin/dead-letters/{}/replay", id), json!({}))
                .await?;
            println!("{}", "✓ Dead letter replayed".green().bold());
            println!("  {} {}", "New job ID:".bold(), submitted.job_id);
        }
    }

    Ok(())
}
