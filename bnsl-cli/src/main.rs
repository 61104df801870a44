use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(author, version, about = "BNSL CLI: manage gold plans on a BNSL node")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, default_value = "http://localhost:3000")]
    node_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a pending plan at the current gold price
    Create {
        #[arg(long)]
        user: String,
        /// Principal in grams, e.g. 100 or 12.5
        #[arg(long)]
        grams: String,
        #[arg(long, default_value_t = 12)]
        tenor_months: u32,
    },
    /// Show a plan
    Show {
        #[arg(long)]
        plan: String,
    },
    /// Activate an approved plan
    Activate {
        #[arg(long)]
        plan: String,
    },
    /// Pay every distribution due today
    Distribute {
        #[arg(long)]
        plan: String,
    },
    /// Settle a plan at maturity
    Mature {
        #[arg(long)]
        plan: String,
    },
    /// Preview the early termination payout
    Quote {
        #[arg(long)]
        plan: String,
    },
    /// Terminate a plan before maturity
    Terminate {
        #[arg(long)]
        plan: String,
        #[arg(long)]
        requested_by: String,
    },
    /// Holder-level totals
    Portfolio {
        #[arg(long)]
        user: String,
    },
}

fn build_request(client: &Client, base: &str, command: &Commands) -> RequestBuilder {
    let base = base.trim_end_matches('/');
    match command {
        Commands::Create {
            user,
            grams,
            tenor_months,
        } => client.post(format!("{base}/plans")).json(&json!({
            "user_id": user,
            "gold_grams": grams,
            "tenor_months": tenor_months,
        })),
        Commands::Show { plan } => client.get(format!("{base}/plans/{plan}")),
        Commands::Activate { plan } => client.post(format!("{base}/plans/{plan}/activate")),
        Commands::Distribute { plan } => client.post(format!("{base}/plans/{plan}/distributions")),
        Commands::Mature { plan } => client.post(format!("{base}/plans/{plan}/mature")),
        Commands::Quote { plan } => client.get(format!("{base}/plans/{plan}/termination-quote")),
        Commands::Terminate { plan, requested_by } => client
            .post(format!("{base}/plans/{plan}/terminate"))
            .json(&json!({ "requested_by": requested_by })),
        Commands::Portfolio { user } => client.get(format!("{base}/users/{user}/portfolio")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();

    let res = build_request(&client, &cli.node_url, &cli.command)
        .send()
        .await
        .with_context(|| format!("Failed to reach node at {}", cli.node_url))?;
    let status = res.status();
    let body: Value = res.json().await.context("Node returned a non-JSON body")?;

    if !status.is_success() {
        let code = body["error"].as_str().unwrap_or("unknown");
        let message = body["message"].as_str().unwrap_or_default();
        return Err(anyhow!("{status} {code}: {message}"));
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_builds_post_with_requester() {
        let cli = Cli::try_parse_from([
            "bnsl",
            "--node-url",
            "http://node:3000/",
            "terminate",
            "--plan",
            "ab12",
            "--requested-by",
            "ops",
        ])
        .unwrap();
        let request = build_request(&Client::new(), &cli.node_url, &cli.command)
            .build()
            .unwrap();
        assert_eq!(request.method(), "POST");
        assert_eq!(request.url().as_str(), "http://node:3000/plans/ab12/terminate");
        let body: Value = serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["requested_by"], "ops");
    }

    #[test]
    fn create_defaults_to_twelve_months() {
        let cli = Cli::try_parse_from(["bnsl", "create", "--user", "alice", "--grams", "100"]).unwrap();
        match cli.command {
            Commands::Create { tenor_months, .. } => assert_eq!(tenor_months, 12),
            _ => panic!("expected create"),
        }
    }
}
