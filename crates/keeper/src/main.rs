use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair},
    signer::Signer,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reflector_keeper::{
    config::create_example_config, scan_withheld, Distributor, DistributorConfig,
    DryRunSubmitter, LedgerSubmitter, PoolResolver, TransactionSubmitter,
};
use reflector_sdk::{HttpHolderDirectory, JupiterClient, Ledger, RpcLedger};

#[derive(Parser, Debug)]
#[command(name = "reflector-keeper")]
#[command(about = "Reclaims Token-2022 transfer fees and redistributes them")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "reflector.toml")]
    config: PathBuf,

    /// Distribution authority keypair file
    #[arg(short, long, global = true)]
    keypair: Option<PathBuf>,

    /// Authority to plan for when dry running without a keypair
    #[arg(long, global = true)]
    authority: Option<Pubkey>,

    /// RPC URL, overrides the configuration file
    #[arg(short, long, global = true)]
    rpc_url: Option<String>,

    /// Compute and log everything but submit nothing
    #[arg(long, global = true)]
    dry_run: bool,

    /// Disbursement output file, overrides the configuration file
    #[arg(short, long, global = true)]
    output: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reclaim fees and run the distribution (default)
    Distribute,
    /// Report transfer fees currently withheld on holder accounts
    Withheld,
    /// List the pools of the token and their LP providers
    LpOwners,
    /// Write an example configuration file
    InitConfig {
        #[arg(default_value = "reflector.toml")]
        path: PathBuf,
    },
}

fn init_logging(args: &Args) {
    let level = if args.verbose { "debug" } else { args.log_level.as_str() };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("reflector_keeper={0},reflector_sdk={0}", level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(args: &Args) -> Result<DistributorConfig> {
    let mut config = DistributorConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if let Some(rpc_url) = &args.rpc_url {
        config.rpc_url = rpc_url.clone();
    }
    if let Some(output) = &args.output {
        config.output_path = output.clone();
    }
    config.validate()?;
    Ok(config)
}

fn load_keypair(args: &Args) -> Result<Keypair> {
    match &args.keypair {
        Some(path) => read_keypair_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load keypair from {}: {}", path.display(), e)),
        None if args.dry_run => {
            warn!("No keypair provided, using a random keypair (dry run only)");
            Ok(Keypair::new())
        }
        None => bail!("--keypair is required unless --dry-run is set"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    if let Some(Command::InitConfig { path }) = &args.command {
        create_example_config(path)?;
        info!("Example configuration written to {}", path.display());
        return Ok(());
    }

    let config = load_config(&args)?;
    let ledger: Arc<dyn Ledger> = Arc::new(RpcLedger::new(
        config.rpc_url.clone(),
        config.commitment_config()?,
    ));
    info!("RPC URL: {}", config.rpc_url);

    match &args.command {
        Some(Command::Withheld) => {
            let summary = scan_withheld(ledger.as_ref(), &config.token_mint).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            println!("Total withheld: {}", summary.ui_total());
        }
        Some(Command::LpOwners) => {
            let resolved = PoolResolver::new(ledger, config.swap_program_id)
                .resolve(&config.token_mint)
                .await?;
            for (token_account, pool) in resolved.membership.iter() {
                println!("{} -> pool {}", token_account, pool);
            }
            for (pool, providers) in &resolved.providers {
                println!("pool {}", pool);
                for provider in providers {
                    println!(
                        "  {} ({}): {} ({:.4}%)",
                        provider.address,
                        provider.lp_token_account,
                        provider.amount,
                        provider.pct * 100.0
                    );
                }
            }
        }
        Some(Command::Distribute) | None => {
            if args.dry_run {
                warn!("Running in DRY RUN mode - no transactions will be submitted");
            }

            let keypair = Arc::new(load_keypair(&args)?);
            let authority = match args.authority {
                Some(authority) if args.dry_run => authority,
                Some(_) => bail!("--authority only applies to dry runs"),
                None => keypair.pubkey(),
            };
            info!("Distribution authority: {}", authority);

            let submitter: Arc<dyn TransactionSubmitter> = if args.dry_run {
                Arc::new(DryRunSubmitter)
            } else {
                Arc::new(LedgerSubmitter::new(
                    ledger.clone(),
                    keypair,
                    config.swap.skip_preflight,
                    Duration::from_millis(config.retry.confirm_poll_ms),
                ))
            };
            let directory = Arc::new(HttpHolderDirectory::new(
                config.holders.api_url.clone(),
                config.holders.page_size,
            ));
            let aggregator = Arc::new(JupiterClient::new(config.swap.aggregator_url.clone()));

            let distributor =
                Distributor::new(config, ledger, directory, aggregator, submitter, authority);
            let summary = distributor.run().await?;
            if summary.failed_batches() > 0 {
                warn!("{} batches failed, see the log for their destinations", summary.failed_batches());
            }
        }
        Some(Command::InitConfig { .. }) => {}
    }

    Ok(())
}
