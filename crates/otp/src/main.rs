//! custody-otp - print or check TOTP codes for a Base32 secret
//!
//! Handy when walking through a 2FA flow by hand against a test deployment.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use custody_otp::{now_unix, SharedSecret, TotpGenerator, TotpParams};

#[derive(Parser)]
#[command(name = "custody-otp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the code for a secret
    Code {
        #[command(flatten)]
        secret: SecretArgs,

        /// Unix timestamp to generate for instead of now
        #[arg(long)]
        at: Option<u64>,

        /// Number of digits
        #[arg(long, default_value_t = custody_otp::DEFAULT_DIGITS)]
        digits: usize,
    },

    /// Check a code, exiting non-zero when it is rejected
    Verify {
        #[command(flatten)]
        secret: SecretArgs,

        /// The code to check
        code: String,

        /// Unix timestamp to verify at instead of now
        #[arg(long)]
        at: Option<u64>,
    },
}

#[derive(Args)]
struct SecretArgs {
    /// Base32 secret
    #[arg(short, long, required_unless_present = "secret_env")]
    secret: Option<String>,

    /// Read the secret from this environment variable
    #[arg(long, conflicts_with = "secret")]
    secret_env: Option<String>,
}

impl SecretArgs {
    fn resolve(&self) -> anyhow::Result<SharedSecret> {
        let raw = match (&self.secret, &self.secret_env) {
            (Some(s), _) => s.clone(),
            (None, Some(var)) => std::env::var(var)
                .with_context(|| format!("environment variable {} is not set", var))?,
            (None, None) => bail!("a secret or --secret-env is required"),
        };
        Ok(SharedSecret::parse(&raw)?)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Code { secret, at, digits } => {
            let secret = secret.resolve()?;
            let params = TotpParams { digits, ..Default::default() };
            let generator = TotpGenerator::with_params(&secret, params)?;
            let now = at.unwrap_or_else(now_unix);

            debug!(counter = generator.counter_at(now), bytes = secret.len(), "generating code");
            println!("{}", generator.generate_at(now));
            eprintln!("valid for {}s", generator.seconds_remaining_at(now));
        }
        Commands::Verify { secret, code, at } => {
            let secret = secret.resolve()?;
            let generator = TotpGenerator::new(&secret);
            let now = at.unwrap_or_else(now_unix);

            if generator.verify_at(&code, now) {
                println!("✅ accepted");
            } else {
                println!("❌ rejected");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
