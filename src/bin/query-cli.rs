use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "query-cli")]
#[command(about = "Management CLI for the resilient query layer", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "QUERY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show service status and cache counters
    Status,
    /// List circuit breaker state
    Breakers,
    /// Force a circuit breaker back to CLOSED
    Reset {
        /// Breaker name (Database, COODashboard, SchemaValidation)
        name: String,
    },
    /// Dump the cache state
    Cache,
    /// Invalidate cached keys
    Invalidate {
        /// Exact cache key
        #[arg(long, conflicts_with = "pattern", required_unless_present = "pattern")]
        key: Option<String>,
        /// Regular expression matched against cache keys
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Sweep expired cache entries now
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Breakers => client.get(format!("{}/admin/breakers", cli.url)),
        Commands::Reset { name } => client.post(format!("{}/admin/breakers/{}/reset", cli.url, name)),
        Commands::Cache => client.get(format!("{}/admin/cache", cli.url)),
        Commands::Invalidate { key, pattern } => {
            let body = match (key, pattern) {
                (Some(key), _) => json!({ "key": key }),
                (None, pattern) => json!({ "pattern": pattern }),
            };
            client
                .post(format!("{}/admin/cache/invalidate", cli.url))
                .json(&body)
        }
        Commands::Cleanup => client.post(format!("{}/admin/cache/cleanup", cli.url)),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
