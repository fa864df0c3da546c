use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "ingress-cli")]
#[command(about = "Management CLI for the ingress router", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "INGRESS_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rule set version and counts
    Status,
    /// List active rules in precedence order
    Rules,
    /// List backends and endpoint health
    Backends,
    /// Replace the endpoint set of one backend
    SetEndpoints {
        /// Service name
        service: String,
        /// Service port
        port: u16,
        /// Endpoint addresses (e.g. 10.0.0.12:8080)
        endpoints: Vec<String>,
        /// Named endpoint subset
        #[arg(long)]
        endpoint_set: Option<String>,
        /// Initial health of the endpoints
        #[arg(long, default_value = "healthy")]
        health: String,
    },
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

    let base = cli.url.trim_end_matches('/');
    let res = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")).headers(headers).send().await?,
        Commands::Rules => client.get(format!("{base}/admin/rules")).headers(headers).send().await?,
        Commands::Backends => client.get(format!("{base}/admin/backends")).headers(headers).send().await?,
        Commands::SetEndpoints {
            service,
            port,
            endpoints,
            endpoint_set,
            health,
        } => {
            let body = json!({
                "backend": { "service": service, "port": port, "endpoint_set": endpoint_set },
                "endpoints": endpoints
                    .iter()
                    .map(|address| json!({ "address": address, "health": health }))
                    .collect::<Vec<_>>(),
            });
            client
                .put(format!("{base}/admin/backends"))
                .headers(headers)
                .json(&body)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
