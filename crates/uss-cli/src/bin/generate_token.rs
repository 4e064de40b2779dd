use anyhow::Result;
use clap::Parser;

use uss_cli::auth::{generate_dummy_token, TokenConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate a JWT for the USS server", long_about = None)]
struct Args {
    /// Space-separated scopes
    #[arg(long, default_value = "interuss.flight_planning.plan interuss.flight_planning.direct_automated_test")]
    scopes: String,

    #[arg(long, default_value = "localhost")]
    audience: String,

    /// Validity in minutes
    #[arg(long, default_value_t = 60)]
    expiry: i64,

    /// Signing secret (must match USS_JWT_SECRET when the server verifies signatures)
    #[arg(long, env = "USS_JWT_SECRET", default_value = "dummy-secret")]
    secret: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let token = generate_dummy_token(Some(TokenConfig {
        scopes: args.scopes,
        audience: args.audience,
        expiry_minutes: args.expiry,
        secret: args.secret,
    }))?;
    println!("{}", token);
    Ok(())
}
