//! AtlasKV CLI Client
//!
//! A thin blocking HTTP client over the endpoints in `atlaskv::http`: one
//! subcommand per route, JSON response printed to stdout.

use clap::{Parser, Subcommand};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "atlaskv-cli")]
#[command(about = "CLI for AtlasKV key-value store")]
struct Args {
    /// Base URL of the server's HTTP façade.
    #[arg(short, long, default_value = "http://127.0.0.1:6379")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get { key: String },

    /// Write a key-value pair
    Put { key: String, value: String },

    /// Delete a key
    Del { key: String },

    /// Ordered range scan over [start, end]
    Range {
        start: String,
        end: String,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Health check
    Health,

    /// Query replication role/status
    ReplicationStatus,
}

fn main() {
    let args = Args::parse();
    let client = reqwest::blocking::Client::new();
    let base = args.server.trim_end_matches('/');

    let result = match args.command {
        Commands::Get { key } => client.get(format!("{base}/get/{key}")).send(),
        Commands::Put { key, value } => client
            .post(format!("{base}/put"))
            .json(&json!({"key": key, "value": value}))
            .send(),
        Commands::Del { key } => client.delete(format!("{base}/delete/{key}")).send(),
        Commands::Range { start, end, limit } => {
            let mut url = format!("{base}/range?start={start}&end={end}");
            if let Some(limit) = limit {
                url.push_str(&format!("&limit={limit}"));
            }
            client.get(url).send()
        }
        Commands::Health => client.get(format!("{base}/health")).send(),
        Commands::ReplicationStatus => client.get(format!("{base}/replication/status")).send(),
    };

    match result {
        Ok(response) => {
            let status = response.status();
            match response.text() {
                Ok(body) => println!("{status}: {body}"),
                Err(e) => {
                    eprintln!("failed to read response body: {e}");
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("request failed: {e}");
            std::process::exit(1);
        }
    }
}
