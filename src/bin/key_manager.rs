//! Key Management CLI Tool
//!
//! Provisions and revokes per-tenant record signing keys.

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use secp256k1::Secp256k1;
use std::path::PathBuf;

use timecard_ledger::crypto::key_management::{KeyStatusReport, KeyStore, NewSigningKey};
use timecard_ledger::crypto::signatures::SECP256K1_ALGORITHM;
use timecard_ledger::database::Database;

#[derive(Parser)]
#[command(name = "key-manager")]
#[command(about = "Timecard ledger signing key management")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL
    #[arg(long, default_value = "sqlite://timecard_ledger.db")]
    database_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a secp256k1 key pair and register its public half
    Generate {
        /// Tenant the key signs for
        #[arg(short, long)]
        tenant: String,

        /// Human-readable key name
        #[arg(short, long)]
        name: String,

        /// Days until the key expires (never, if omitted)
        #[arg(long)]
        valid_days: Option<i64>,

        /// Write the secret key hex here instead of printing it
        #[arg(long)]
        secret_out: Option<PathBuf>,
    },

    /// List a tenant's keys with their status
    List {
        #[arg(short, long)]
        tenant: String,
    },

    /// Revoke a key
    Revoke {
        #[arg(short, long)]
        tenant: String,

        /// Key ID to revoke
        key_id: String,

        /// Revocation reason
        #[arg(short, long)]
        reason: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let db = Database::new(&cli.database_url).await?;
    db.run_migrations().await?;
    let store = KeyStore::new(db.pool().clone());

    match cli.command {
        Commands::Generate {
            tenant,
            name,
            valid_days,
            secret_out,
        } => {
            let secp = Secp256k1::new();
            let (secret_key, public_key) = secp.generate_keypair(&mut rand::thread_rng());
            let secret_hex = hex::encode(secret_key.secret_bytes());

            let key = store
                .register_key(NewSigningKey {
                    tenant_id: tenant,
                    key_name: name,
                    key_algorithm: SECP256K1_ALGORITHM.to_string(),
                    public_key: public_key.to_string(),
                    expires_at: valid_days.map(|days| Utc::now() + Duration::days(days)),
                })
                .await?;

            println!("Key generated successfully:");
            println!("  Key ID: {}", key.id);
            println!("  Tenant: {}", key.tenant_id);
            println!("  Name: {}", key.key_name);
            println!("  Public Key: {}", key.public_key);
            match key.expires_at {
                Some(expires) => println!("  Expires: {}", expires),
                None => println!("  Expires: never"),
            }

            match secret_out {
                Some(path) => {
                    std::fs::write(&path, &secret_hex)?;
                    println!("  Secret key written to {}", path.display());
                }
                None => println!("  Secret Key: {}", secret_hex),
            }
        }

        Commands::List { tenant } => {
            let keys = store.list_keys(&tenant).await?;
            print_keys(&keys);
        }

        Commands::Revoke {
            tenant,
            key_id,
            reason,
        } => {
            store.revoke_key(&tenant, &key_id, &reason).await?;
            println!("Key {} revoked: {}", key_id, reason);
        }
    }

    Ok(())
}

fn print_keys(keys: &[KeyStatusReport]) {
    if keys.is_empty() {
        println!("No keys found");
        return;
    }

    println!("Found {} keys:", keys.len());
    for report in keys {
        let key = &report.key;
        println!(
            "  {} | {} | {} | {} | created {}",
            key.id,
            key.key_name,
            key.key_algorithm,
            report.status.as_str(),
            key.created_at
        );
    }
}
