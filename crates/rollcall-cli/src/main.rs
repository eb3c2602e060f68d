use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use reqwest::multipart;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall classroom attendance CLI")]
struct Cli {
    /// Address of the rollcalld HTTP API
    #[arg(long, env = "ROLLCALL_URL", default_value = "http://127.0.0.1:5000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

/// Class filter. Commands that act on one class need all three.
#[derive(Args, Default)]
struct ClassArgs {
    #[arg(short, long)]
    department: Option<String>,
    #[arg(short, long)]
    year: Option<String>,
    #[arg(short, long)]
    subject: Option<String>,
}

impl ClassArgs {
    fn query(&self) -> Vec<(&'static str, String)> {
        [
            ("department", &self.department),
            ("year", &self.year),
            ("subject", &self.subject),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|v| (key, v)))
        .collect()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Mark attendance from a class photo
    Upload {
        /// Photo of the class
        photo: PathBuf,
        #[arg(short, long)]
        department: String,
        #[arg(short, long)]
        year: String,
        /// Subject id; repeat for several
        #[arg(short, long = "subject", required = true)]
        subjects: Vec<String>,
        /// Attendance date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },
    /// Record a manual attendance sheet; listed rolls are present, the rest of the class absent
    Manual {
        #[command(flatten)]
        class: ClassArgs,
        #[arg(long)]
        date: String,
        /// Roll numbers present
        rolls: Vec<String>,
    },
    /// List approved students
    Students {
        #[command(flatten)]
        class: ClassArgs,
    },
    /// List registrations awaiting approval
    Pending {
        #[command(flatten)]
        class: ClassArgs,
    },
    /// Approve a pending registration, optionally overriding its placement
    Approve {
        roll_no: String,
        #[command(flatten)]
        class: ClassArgs,
    },
    /// Reject a pending registration
    Reject {
        roll_no: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Per-student attendance percentages for a class
    Summary {
        #[command(flatten)]
        class: ClassArgs,
    },
    /// Attendance sheet for one class on one day
    Day {
        #[command(flatten)]
        class: ClassArgs,
        #[arg(long)]
        date: String,
        /// Include names and unmarked students
        #[arg(long)]
        detailed: bool,
    },
    /// Every attendance record for one student
    History { roll_no: String },
    /// Email students below the low-attendance threshold
    NotifyLow {
        #[command(flatten)]
        class: ClassArgs,
        /// Percentage threshold; the daemon default applies when omitted
        #[arg(long)]
        threshold: Option<u32>,
    },
    /// Check that the daemon is reachable
    Status,
}

/// Thin JSON client for the daemon.
struct Daemon {
    http: reqwest::Client,
    base: String,
}

impl Daemon {
    fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let resp = self.http.get(self.url(path)).query(query).send().await;
        decode(path, resp).await
    }

    async fn post(&self, path: &str, query: &[(&str, String)], body: Value) -> Result<Value> {
        let resp = self.http.post(self.url(path)).query(query).json(&body).send().await;
        decode(path, resp).await
    }

    async fn post_form(&self, path: &str, form: multipart::Form) -> Result<Value> {
        let resp = self.http.post(self.url(path)).multipart(form).send().await;
        decode(path, resp).await
    }

    async fn status(&self) -> Result<String> {
        let resp = self
            .http
            .get(self.url("/"))
            .send()
            .await
            .with_context(|| format!("connecting to {}", self.base))?;
        if !resp.status().is_success() {
            bail!("daemon answered {}", resp.status());
        }
        Ok(resp.text().await?)
    }
}

/// Turn a daemon reply into JSON, surfacing its `{"error": ...}` body on failure.
async fn decode(path: &str, resp: reqwest::Result<reqwest::Response>) -> Result<Value> {
    let resp = resp.with_context(|| format!("request to {path} failed"))?;
    let status = resp.status();
    let body: Value = resp
        .json()
        .await
        .with_context(|| format!("{path} returned a non-JSON body ({status})"))?;
    if !status.is_success() {
        let msg = body.get("error").and_then(Value::as_str).unwrap_or("no detail");
        bail!("{path}: {status}: {msg}");
    }
    Ok(body)
}

async fn run(cli: Cli) -> Result<Value> {
    let daemon = Daemon::new(&cli.url)?;
    match cli.command {
        Commands::Upload {
            photo,
            department,
            year,
            subjects,
            date,
        } => {
            let bytes = tokio::fs::read(&photo)
                .await
                .with_context(|| format!("reading {}", photo.display()))?;
            let file_name = photo
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "photo.jpg".to_string());
            tracing::debug!(bytes = bytes.len(), %file_name, "uploading class photo");
            let form = multipart::Form::new()
                .part("file", multipart::Part::bytes(bytes).file_name(file_name))
                .text("department_id", department)
                .text("year", year)
                .text("subject_ids", serde_json::to_string(&subjects)?)
                .text("date", date);
            daemon.post_form("/upload", form).await
        }
        Commands::Manual { class, date, rolls } => {
            let body = json!({
                "date": date,
                "roll_nos": rolls,
                "department": class.department,
                "year": class.year,
                "subject": class.subject,
            });
            daemon.post("/attendance/manual", &[], body).await
        }
        Commands::Students { class } => daemon.get("/students", &class.query()).await,
        Commands::Pending { class } => daemon.get("/pending", &class.query()).await,
        Commands::Approve { roll_no, class } => {
            let body = json!({
                "roll_no": roll_no,
                "department": class.department,
                "year": class.year,
                "subject": class.subject,
            });
            daemon.post("/approve", &[], body).await
        }
        Commands::Reject { roll_no, reason } => {
            daemon
                .post("/reject", &[], json!({ "roll_no": roll_no, "reason": reason }))
                .await
        }
        Commands::Summary { class } => daemon.get("/attendance/summary", &class.query()).await,
        Commands::Day { class, date, detailed } => {
            let mut query = class.query();
            query.push(("date", date));
            let path = if detailed {
                "/attendance/by-date-detailed"
            } else {
                "/attendance/by-date"
            };
            daemon.get(path, &query).await
        }
        Commands::History { roll_no } => {
            daemon
                .get(&format!("/attendance/full-history/{roll_no}"), &[])
                .await
        }
        Commands::NotifyLow { class, threshold } => {
            let mut query = class.query();
            if let Some(t) = threshold {
                query.push(("threshold", t.to_string()));
            }
            daemon
                .post("/attendance/low-attendance/notify", &query, json!({}))
                .await
        }
        Commands::Status => {
            let banner = daemon.status().await?;
            Ok(json!({ "url": daemon.base, "status": banner }))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = run(cli).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
