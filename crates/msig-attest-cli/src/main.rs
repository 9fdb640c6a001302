//! msig-attest: multisig proof-of-ownership tool
//!
//! Each cosigner signs the attestation message for every used address of
//! the wallet, the partial files are combined, and anyone holding the merged
//! file and the message can verify it.
//!
//! # Usage
//!
//! ```bash
//! msig-attest sign --wallet wallet.json --message message.txt \
//!     --output signed-a.json --receive-count 120 --change-count 40
//! msig-attest combine --output merged.json signed-a.json signed-b.json
//! msig-attest verify merged.json message.txt --report report.json
//! ```

mod commands;
mod config;
mod hardening;
mod io;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use msig_attest_core::AddressUsage;
use std::path::PathBuf;

use crate::commands::{SignArgs, VerifyArgs};
use crate::config::AttestConfig;

#[derive(Parser)]
#[command(name = "msig-attest")]
#[command(version)]
#[command(about = "Prove ownership of multisig wallet addresses by signing a message", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign the message for every used address of a wallet
    Sign {
        /// Decrypted wallet export (JSON)
        #[arg(short, long)]
        wallet: PathBuf,

        /// Attestation message file, signed byte for byte
        #[arg(short, long)]
        message: PathBuf,

        /// Output signature file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of receive addresses in use
        #[arg(long)]
        receive_count: u32,

        /// Number of change addresses in use
        #[arg(long)]
        change_count: u32,

        /// This cosigner's index (BIP45 wallets)
        #[arg(long)]
        copayer_index: Option<u32>,
    },

    /// Merge signature files; addresses follow the first file
    Combine {
        /// Merged output file
        #[arg(short, long)]
        output: PathBuf,

        /// Signature files to merge
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,
    },

    /// Verify a merged signature file
    Verify {
        /// Merged signature file
        records: PathBuf,

        /// Attestation message file
        message: PathBuf,

        /// Addresses are bare witness script hashes
        #[arg(long)]
        witness: bool,

        /// Write the per-address report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let mut config = AttestConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // Apply env overrides
    config.apply_env_overrides();

    // Validate
    config
        .validate()
        .context("Configuration validation failed")?;

    // Init logger
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", &config.general.log_level);
    }
    env_logger::init();

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    match cli.command {
        Commands::Sign {
            wallet,
            message,
            output,
            receive_count,
            change_count,
            copayer_index,
        } => {
            hardening::disable_core_dumps();
            let args = SignArgs {
                wallet,
                message,
                output,
                usage: AddressUsage {
                    receive_count,
                    change_count,
                    copayer_index,
                },
            };
            let summary = rt.block_on(commands::sign(&config, &args))?;
            println!("Signed {} addresses", summary.signed);

            if summary.failed > 0 {
                log::error!("{} addresses could not be signed", summary.failed);
                std::process::exit(1);
            }
        }
        Commands::Combine { output, inputs } => {
            let count = commands::combine(&inputs, &output)?;
            println!("Merged {} records", count);
        }
        Commands::Verify {
            records,
            message,
            witness,
            report,
        } => {
            let args = VerifyArgs {
                records,
                message,
                witness,
                report,
            };
            let report = rt.block_on(commands::verify(&config, &args))?;

            println!("Processed {} addresses", report.address_count);
            println!("Success count: {}", report.success_count);
            println!("Fail count: {}", report.fail_count);

            if commands::exceeds_max_failures(&config, &report) {
                log::error!(
                    "{} failures exceed verify.max_failures",
                    report.fail_count
                );
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
