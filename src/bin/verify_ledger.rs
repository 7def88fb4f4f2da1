use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{error, info, warn};

use timecard_ledger::audit::ActionContext;
use timecard_ledger::config::AppConfig;
use timecard_ledger::crypto::signer_from_config;
use timecard_ledger::database::Database;
use timecard_ledger::ledger::{IntegrityLedger, NsrSequencer};

/// Verify a tenant's timecard hash chain, optionally rebuilding it.
#[derive(Parser)]
#[command(name = "verify-ledger")]
#[command(version = "0.1.0")]
struct Cli {
    /// Tenant whose chain is checked
    #[arg(short, long)]
    tenant: String,

    /// Rewrite broken hashes after a failed verification
    #[arg(long)]
    rebuild: bool,

    /// Operator recorded in the audit trail of a rebuild
    #[arg(long, default_value = "verify-ledger")]
    operator: String,

    /// Database URL (defaults to the server configuration)
    #[arg(long)]
    database_url: Option<String>,

    /// Suppress output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = AppConfig::load()?;
    let database_url = cli.database_url.unwrap_or(config.database_url);
    let database = Database::new(&database_url).await?;
    database.run_migrations().await?;

    let signer = signer_from_config(&config.signing)?;
    let ledger =
        IntegrityLedger::new(database.pool().clone(), signer).with_page_size(config.page_size);

    info!("Verifying chain of tenant {}", cli.tenant);
    let check = ledger.verify_integrity_chain(&cli.tenant).await?;

    let issued = NsrSequencer::new(database.pool().clone())
        .current(&cli.tenant)
        .await?
        .map_or(0, |sequence| sequence.current_nsr);
    let missing = issued - check.records_checked as i64;
    if missing > 0 {
        warn!(
            "{} of {} issued NSR(s) of tenant {} have no record",
            missing, issued, cli.tenant
        );
    }

    let tampered = ledger.audit().find_tampered_entries(&cli.tenant).await?;
    if !tampered.is_empty() {
        for id in &tampered {
            error!("Audit entry {} no longer matches its hash", id);
        }
        return Err(anyhow!(
            "Audit trail of tenant {} has {} altered entry(ies)",
            cli.tenant,
            tampered.len()
        ));
    }

    if check.is_valid {
        if !cli.quiet {
            println!(
                "✓ Chain of tenant {} is intact ({} records)",
                cli.tenant, check.records_checked
            );
        }
        return Ok(());
    }

    for message in &check.errors {
        error!("{}", message);
    }

    if !cli.rebuild {
        return Err(anyhow!(
            "Chain of tenant {} is compromised: {} error(s)",
            cli.tenant,
            check.errors.len()
        ));
    }

    let context =
        ActionContext::new(cli.operator, "127.0.0.1").with_reason("verify-ledger --rebuild");
    let outcome = ledger.rebuild_integrity_chain(&cli.tenant, &context).await?;
    if !outcome.errors.is_empty() {
        for message in &outcome.errors {
            error!("{}", message);
        }
        return Err(anyhow!("Rebuild of tenant {} failed", cli.tenant));
    }

    let recheck = ledger.verify_integrity_chain(&cli.tenant).await?;
    if !recheck.is_valid {
        return Err(anyhow!(
            "Chain of tenant {} still invalid after rebuild",
            cli.tenant
        ));
    }

    if !cli.quiet {
        println!(
            "✓ Rebuilt chain of tenant {}: {} record(s) fixed",
            cli.tenant, outcome.fixed
        );
    }
    Ok(())
}
