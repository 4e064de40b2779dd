use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::Value;

use uss_cli::auth::{generate_dummy_token, TokenConfig};
use uss_cli::flight_plan::{circular_flight_plan, CircularPlan};
use uss_core::models::LatLngPoint;
use uss_core::planning::{UasState, UsageState};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Usage {
    Planned,
    InUse,
    Closed,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Uas {
    Nominal,
    OffNominal,
    Contingent,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Submit a flight plan to a USS", long_about = None)]
struct Args {
    /// USS server URL
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Flight plan id
    #[arg(long)]
    id: String,

    #[arg(long, default_value_t = 46.97)]
    lat: f64,

    #[arg(long, default_value_t = 7.47)]
    lng: f64,

    /// Radius in meters
    #[arg(long, default_value_t = 200.0)]
    radius: f64,

    #[arg(long, default_value_t = 0)]
    priority: i32,

    #[arg(long, value_enum, default_value_t = Usage::Planned)]
    usage_state: Usage,

    #[arg(long, value_enum, default_value_t = Uas::Nominal)]
    uas_state: Uas,

    #[arg(long, default_value_t = 30)]
    duration_mins: i64,

    /// Delete the flight plan instead of submitting it
    #[arg(long)]
    delete: bool,

    /// Bearer token; generated with --secret when absent
    #[arg(long, env = "USS_TOKEN")]
    token: Option<String>,

    #[arg(long, env = "USS_JWT_SECRET", default_value = "dummy-secret")]
    secret: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let token = match args.token.clone() {
        Some(token) => token,
        None => generate_dummy_token(Some(TokenConfig {
            secret: args.secret.clone(),
            ..TokenConfig::default()
        }))?,
    };

    let url = format!(
        "{}/flight_planning/v1/flight_plans/{}",
        args.url.trim_end_matches('/'),
        args.id
    );
    let client = reqwest::Client::new();

    let request = if args.delete {
        client.delete(&url)
    } else {
        let plan = circular_flight_plan(&CircularPlan {
            center: LatLngPoint::new(args.lat, args.lng),
            radius_m: args.radius,
            priority: args.priority,
            usage_state: match args.usage_state {
                Usage::Planned => UsageState::Planned,
                Usage::InUse => UsageState::InUse,
                Usage::Closed => UsageState::Closed,
            },
            uas_state: match args.uas_state {
                Uas::Nominal => UasState::Nominal,
                Uas::OffNominal => UasState::OffNominal,
                Uas::Contingent => UasState::Contingent,
            },
            duration_mins: args.duration_mins,
        });
        client.put(&url).json(&plan)
    };

    let response = request
        .bearer_auth(token)
        .send()
        .await
        .with_context(|| format!("sending request to {}", url))?;
    let status = response.status();
    let body: Value = response.json().await.context("decoding response")?;
    if !status.is_success() {
        bail!("server returned {}: {}", status, body);
    }

    println!("{}: {}", args.id, body["result"].as_str().unwrap_or("unknown"));
    if let Some(notes) = body["notes"].as_str() {
        println!("notes: {}", notes);
    }
    if let Some(id) = body["operational_intent_id"].as_str() {
        println!("operational intent: {}", id);
    }
    Ok(())
}
