use clap::{Parser, Subcommand};
use serde_json::Value;

use browse_proxy::link::{normalize_target, proxied_link};
use browse_proxy::rewrite::DEFAULT_ROUTE_PATH;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Build and try browse links against a running proxy", long_about = None)]
struct Cli {
    /// Origin of the running proxy
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Route the browse handler is mounted on
    #[arg(short, long, default_value = DEFAULT_ROUTE_PATH)]
    route: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the proxied link for a URL (scheme defaults to https)
    Link { target: String },
    /// Fetch a URL through the proxy and print the response
    Fetch {
        target: String,
        /// Only print status and headers
        #[arg(long)]
        head: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Link { target } => {
            let target = normalize_target(&target)?;
            println!("{}", proxied_link(&cli.url, &cli.route, &target));
        }
        Commands::Fetch { target, head } => {
            let target = normalize_target(&target)?;
            let link = proxied_link(&cli.url, &cli.route, &target);
            let res = reqwest::Client::new().get(&link).send().await?;
            print_response(res, head).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response, head: bool) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let content_type = res
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    println!("{} ({})", status, content_type);
    if head {
        return Ok(());
    }

    if !status.is_success() {
        let text = res.text().await?;
        match serde_json::from_str::<Value>(&text) {
            Ok(json) => eprintln!("Error: {}", json["error"].as_str().unwrap_or(&text)),
            Err(_) => eprintln!("Error: {}", text),
        }
        return Ok(());
    }

    if content_type.starts_with("text/") {
        println!("{}", res.text().await?);
    } else {
        let bytes = res.bytes().await?;
        println!("<{} bytes of binary content>", bytes.len());
    }
    Ok(())
}
