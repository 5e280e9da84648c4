use std::sync::Arc;

use anyhow::Result;
use audit::{build_report, format_stats, register_policies};
use clap::{Parser, Subcommand};
use compliance::{
    PolicyMetricsAggregator,
    database::{RedisPolicyDirectory, RedisStore, init_redis},
    utils::is_valid_id,
};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "REDIS_URL")]
    redis_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register policy ids so views and downloads against them are tracked
    Register { policy_ids: Vec<String> },

    /// Acknowledgment stats for one policy
    Policy { policy_id: String },

    /// One user's standing across every policy
    User { user_id: String },

    /// Stats for every registered policy
    Report {
        /// Flag policies whose average acknowledgment is below this percentage
        #[arg(long, default_value_t = 100)]
        target: u8,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();

    let redis_connection = init_redis(&args.redis_url).await?;
    let store = Arc::new(RedisStore::new(redis_connection.clone()));
    let directory = RedisPolicyDirectory::new(redis_connection);
    let aggregator = PolicyMetricsAggregator::new(store);

    match args.command {
        Command::Register { policy_ids } => {
            let added = register_policies(&directory, &policy_ids).await?;
            println!("Registered {added} new policies");
        }
        Command::Policy { policy_id } => {
            anyhow::ensure!(is_valid_id(&policy_id), "Invalid policy id {policy_id:?}");

            let stats = aggregator.policy_stats(&policy_id).await?;
            println!("{}", format_stats(&format!("Policy {policy_id}"), &stats));
        }
        Command::User { user_id } => {
            anyhow::ensure!(is_valid_id(&user_id), "Invalid user id {user_id:?}");

            let stats = aggregator.user_summary(&user_id).await?;
            println!("{}", format_stats(&format!("User {user_id}"), &stats));
        }
        Command::Report { target } => {
            let report = build_report(&aggregator, &directory, true).await?;

            println!("Compliance report generated at {}\n", report.generated_at.to_rfc3339());
            for policy in &report.policies {
                println!("{}\n", format_stats(&format!("Policy {}", policy.policy_id), &policy.stats));
            }
            println!("{}\n", format_stats("All policies", &report.overall()));

            let lagging = report.lagging(target);
            if lagging.is_empty() {
                println!("Every policy is at or above {target}%");
            } else {
                println!("Below {target}%:");
                for policy in lagging {
                    println!(
                        "  {} ({}%)",
                        policy.policy_id, policy.stats.avg_acknowledgment_percentage
                    );
                }
            }
        }
    }

    Ok(())
}
