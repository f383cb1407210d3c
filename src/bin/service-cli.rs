use clap::{Parser, Subcommand};
use serde_json::Value;
use service_host::admin::handlers::InstanceStatus;

#[derive(Parser)]
#[command(name = "service-cli")]
#[command(about = "Inspect a running service instance", long_about = None)]
struct Cli {
    /// Base URL of the instance.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lifecycle state, addresses and request totals
    Status,
    /// Health reports accepted by the instance
    Health,
    /// Load reports accepted by the instance
    Load,
    /// Current vote tallies
    Votes,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let url = match cli.command {
        Commands::Status => format!("{base}/admin/status"),
        Commands::Health => format!("{base}/admin/health"),
        Commands::Load => format!("{base}/admin/load"),
        Commands::Votes => {
            // the vote API lives under the instance's partition and replica
            let status: InstanceStatus = client
                .get(format!("{base}/admin/status"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            format!("{base}/{}/{}/api/votes", status.partition_id, status.replica_id)
        }
    };

    let res = client.get(url).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: instance returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
