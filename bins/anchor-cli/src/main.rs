//! anchor — command-line harness for the Anchor wallet.
//!
//! Wires configuration, logging, password prompts and the Esplora gateway
//! to the wallet engine. Every invocation is one short-lived session that
//! is locked again before the process exits.

use std::path::{Path, PathBuf};

use anchor_core::Network;
use anchor_gateway::EsploraGateway;
use anchor_wallet::{
    AnchorContainer, Mnemonic, Session, Wallet, WalletConfig, format_btc, parse_address, parse_btc,
    to_hex,
};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;

/// Self-custodial single-signature Bitcoin wallet.
#[derive(Parser)]
#[command(name = "anchor")]
#[command(version, about = "Self-custodial single-signature Bitcoin wallet")]
struct Cli {
    /// Configuration file (default: <config dir>/anchor/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Esplora base URL overriding the configured one.
    #[arg(long, global = true)]
    gateway_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new mnemonic and write an anchor file.
    Create(CreateArgs),
    /// Write an anchor file for an existing mnemonic.
    Restore(CreateArgs),
    /// Show the first unused receive address.
    Receive(FileArgs),
    /// Show balance, receive address and recent transactions.
    Balance(FileArgs),
    /// Build, sign and broadcast a payment.
    Send(SendArgs),
}

#[derive(Args)]
struct FileArgs {
    /// Anchor file (default: ~/.anchor/wallet.anchor.json).
    #[arg(short, long)]
    file: Option<PathBuf>,
}

#[derive(Args)]
struct CreateArgs {
    #[command(flatten)]
    file: FileArgs,

    /// Network (mainnet, testnet or signet). Defaults to the configured one.
    #[arg(short, long)]
    network: Option<Network>,
}

#[derive(Args)]
struct SendArgs {
    #[command(flatten)]
    file: FileArgs,

    /// Recipient address.
    #[arg(short, long)]
    to: String,

    /// Amount in BTC (e.g. 0.0003).
    #[arg(short, long)]
    amount: String,

    /// Fee rate in sat/vB. Defaults to the configured one.
    #[arg(long)]
    fee_rate: Option<u64>,

    /// Print the signed transaction without broadcasting it.
    #[arg(long)]
    no_broadcast: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = WalletConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = cli.gateway_url {
        config.gateway_url = Some(url);
    }

    match cli.command {
        Commands::Create(args) => create(args, config, None),
        Commands::Restore(args) => {
            let phrase = prompt_password("Enter 12-word mnemonic")?;
            let mnemonic = Mnemonic::parse(&phrase).context("Invalid mnemonic")?;
            create(args, config, Some(mnemonic))
        }
        Commands::Receive(args) => receive(args, config).await,
        Commands::Balance(args) => balance(args, config).await,
        Commands::Send(args) => send(args, config).await,
    }
}

/// Seal a fresh (or restored) mnemonic into a new anchor file.
fn create(args: CreateArgs, config: WalletConfig, restored: Option<Mnemonic>) -> Result<()> {
    let path = resolve_anchor_path(args.file.file)?;
    let network = args.network.unwrap_or(config.network);

    if path.exists() {
        bail!("Anchor file already exists: {}", path.display());
    }

    let password = prompt_new_password()?;
    let is_new = restored.is_none();
    let mnemonic = restored.unwrap_or_else(Mnemonic::generate);

    let container = anchor_wallet::seal(&mnemonic, &password, network).context("Failed to encrypt mnemonic")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    container.write_to_file(&path).context("Failed to write anchor file")?;

    let session = Session::open(mnemonic, network)?;
    let first = session.account().receive_address(0)?;

    if is_new {
        println!("\n=== WALLET CREATED ===");
        println!("Network: {network}");
        println!("\nMNEMONIC (BACKUP THIS, 12 WORDS):");
        println!("  {}", session.mnemonic().phrase());
        println!("\nWARNING: This mnemonic will NOT be shown again.");
        println!("Anyone with these words can spend your funds.");
    } else {
        println!("\n=== WALLET RESTORED ===");
        println!("Network: {network}");
    }
    println!("First receive address: {first}");
    println!("Anchor file saved to: {}", path.display());
    session.lock();
    Ok(())
}

async fn receive(args: FileArgs, config: WalletConfig) -> Result<()> {
    let mut wallet = open_wallet(args.file, config)?;
    let address = wallet.receive_address().await.context("Failed to find a receive address")?;
    println!("{address}");
    wallet.lock();
    Ok(())
}

async fn balance(args: FileArgs, config: WalletConfig) -> Result<()> {
    let mut wallet = open_wallet(args.file, config)?;
    let summary = wallet.refresh().await.context("Failed to refresh wallet")?;
    wallet.lock();

    println!("Balance: {} BTC", format_btc(summary.balance));
    if !summary.unresolved.is_empty() {
        println!(
            "  ({} address lookups failed; balance may be incomplete)",
            summary.unresolved.len()
        );
    }
    println!("Receive address (index {}): {}", summary.receive_index, summary.receive_address);
    if !summary.recent_txids.is_empty() {
        println!("Recent transactions:");
        for txid in &summary.recent_txids {
            println!("  {txid}");
        }
    }
    Ok(())
}

async fn send(args: SendArgs, config: WalletConfig) -> Result<()> {
    let mut wallet = open_wallet(args.file.file, config)?;
    let network = wallet.session()?.network();
    let destination = parse_address(&args.to, network).context("Bad destination address")?;
    let amount = parse_btc(&args.amount).context("Bad amount")?;

    // Recover the change counter so change never lands on a used address.
    wallet.sync_change_index().await.context("Failed to sync change index")?;
    let prepared = wallet
        .build_send(&destination, amount, args.fee_rate)
        .await
        .context("Failed to build transaction")?;
    wallet.lock();

    let txid = prepared.signed.txid();
    println!("Built: {txid}");
    println!("  amount: {} BTC", format_btc(amount as i64));
    println!("  fee:    {} BTC", format_btc(prepared.plan.fee as i64));
    match prepared.change_index {
        Some(index) => println!(
            "  change: {} BTC (change index {index})",
            format_btc(prepared.plan.change.amount() as i64)
        ),
        None => println!("  change: none"),
    }

    if args.no_broadcast {
        println!("{}", to_hex(&prepared.signed));
        return Ok(());
    }

    match wallet.broadcast(&prepared.signed).await {
        Ok(accepted) => {
            info!(%accepted, "broadcast accepted");
            println!("Broadcasted: {accepted}");
            Ok(())
        }
        Err(e) => {
            // The signed bytes stay valid; print them for a manual retry.
            println!("{}", to_hex(&prepared.signed));
            Err(e).context("Broadcast failed; the signed transaction is printed above")
        }
    }
}

/// Read the anchor file, prompt for its password and unlock a wallet on
/// the file's network.
fn open_wallet(file: Option<PathBuf>, mut config: WalletConfig) -> Result<Wallet<EsploraGateway>> {
    let path = resolve_anchor_path(file)?;
    let container = read_container(&path)?;
    config.network = container.network()?;

    let gateway = EsploraGateway::for_network(config.network, config.gateway_url.as_deref())
        .context("Failed to set up gateway")?;
    let mut wallet = Wallet::new(gateway, config);

    let password = prompt_password("Anchor file password")?;
    wallet
        .unlock_container(&container, &password)
        .context("Failed to open anchor file (check password)")?;
    Ok(wallet)
}

fn read_container(path: &Path) -> Result<AnchorContainer> {
    AnchorContainer::read_from_file(path)
        .with_context(|| format!("Failed to read anchor file: {}", path.display()))
}

/// Prompt for a password securely (no echo).
fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(format!("{prompt}: ")).context("Failed to read password")
}

fn prompt_new_password() -> Result<String> {
    let password = prompt_password("Enter anchor file password")?;
    let confirm = prompt_password("Confirm password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    if password.is_empty() {
        bail!("Password must not be empty");
    }
    Ok(password)
}

/// Resolve the anchor file path, using the default if not provided.
fn resolve_anchor_path(path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(p) = path {
        return Ok(p);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".anchor").join("wallet.anchor.json"))
}
