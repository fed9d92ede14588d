//! CLI definitions and command routing.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use time::{Duration, OffsetDateTime};

use crate::cert::{Certificate, CertificateTemplate};
use crate::config::TrustConfig;
use crate::key::PrivateKey;
use crate::platform::{default_trust_store, InstallAttempt, InstallPrompt, TrustStore};

#[derive(Parser)]
#[command(name = "trustkit")]
#[command(about = "Mint locally-trusted certificates and manage OS trust stores")]
pub struct Cli {
    /// Config file (defaults to TRUSTKIT_CONFIG or the per-user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate RSA private keys
    Key {
        #[command(subcommand)]
        cmd: KeyCmd,
    },

    /// Build self-signed or issuer-signed certificates
    Cert {
        #[command(subcommand)]
        cmd: CertCmd,
    },

    /// Install a certificate as a trusted root where it is missing
    Install {
        /// PEM certificate to trust
        cert: PathBuf,
        /// Elevation prompt; empty runs without elevation
        #[arg(long, default_value = "")]
        prompt: String,
        /// Title of the notice shown before installing (Windows)
        #[arg(long, default_value = "")]
        title: String,
        /// Body of the notice shown before installing (Windows)
        #[arg(long, default_value = "")]
        body: String,
    },

    /// Report whether a certificate's Common Name is in every target store
    Status {
        /// PEM certificate to look for
        cert: PathBuf,
    },

    /// Remove trusted roots by Common Name
    Remove {
        common_name: String,
        /// Elevation prompt; empty runs without elevation
        #[arg(long, default_value = "")]
        prompt: String,
    },

    /// List the stores this platform targets
    Stores,

    /// Mint a throwaway root, install it twice, check it, then remove it
    Demo {
        #[arg(long, default_value = "trustdemo.trustkit.local")]
        cn: String,
        /// Wait for Enter before removing the certificate
        #[arg(long)]
        pause: bool,
    },
}

#[derive(Subcommand)]
pub enum KeyCmd {
    /// Generate a PKCS#1 RSA key and write it as PEM
    Generate {
        #[arg(long, default_value_t = 2048)]
        bits: usize,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum CertCmd {
    /// Sign a certificate with the given key
    Create {
        /// Signing key (PEM)
        #[arg(long)]
        key: PathBuf,
        /// Subject Common Name
        #[arg(long)]
        cn: String,
        #[arg(long, default_value = "")]
        org: String,
        /// Subject alternative name; IP addresses become IP SANs
        #[arg(long = "san")]
        sans: Vec<String>,
        /// Days of validity from now
        #[arg(long, default_value_t = 365, value_parser = clap::value_parser!(u32).range(1..=36_500))]
        days: u32,
        /// Make a CA certificate
        #[arg(long)]
        ca: bool,
        /// Issuer certificate (PEM); self-signed when omitted
        #[arg(long)]
        issuer: Option<PathBuf>,
        /// Bind this key's public key instead of the signing key's
        #[arg(long)]
        subject_key: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Print subject, SANs and validity of a PEM certificate
    Show { cert: PathBuf },
}

/// Run CLI and dispatch to handlers.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => TrustConfig::load_from(path)?,
        None => TrustConfig::load()?,
    };

    match cli.command {
        Commands::Key { cmd } => cmd_key(cmd),
        Commands::Cert { cmd } => cmd_cert(cmd),
        Commands::Install {
            cert,
            prompt,
            title,
            body,
        } => {
            let cert = Certificate::load_from_file(&cert)?;
            let store = default_trust_store(&config)?;
            let prompt = InstallPrompt {
                elevate: prompt,
                title,
                body,
            };
            cmd_install(store.as_ref(), &cert, &prompt)
        }
        Commands::Status { cert } => {
            let cert = Certificate::load_from_file(&cert)?;
            let store = default_trust_store(&config)?;
            let installed = store.is_installed(&cert)?;
            let status = if installed { "installed" } else { "not installed" };
            println!("{}: {status}", cert.common_name());
            Ok(())
        }
        Commands::Remove {
            common_name,
            prompt,
        } => {
            let store = default_trust_store(&config)?;
            store.delete_trusted_root_by_name(&common_name, &prompt)?;
            println!("Removed: {common_name}");
            Ok(())
        }
        Commands::Stores => {
            let store = default_trust_store(&config)?;
            for locator in store.stores()? {
                println!("{}\t{locator}", store.name());
            }
            Ok(())
        }
        Commands::Demo { cn, pause } => {
            let store = default_trust_store(&config)?;
            cmd_demo(store.as_ref(), &cn, pause)
        }
    }
}

fn cmd_key(cmd: KeyCmd) -> Result<()> {
    match cmd {
        KeyCmd::Generate { bits, out } => {
            let key = PrivateKey::generate(bits)?;
            key.write_to_file(&out)?;
            println!("Wrote {bits}-bit key: {}", out.display());
            Ok(())
        }
    }
}

fn cmd_cert(cmd: CertCmd) -> Result<()> {
    match cmd {
        CertCmd::Create {
            key,
            cn,
            org,
            sans,
            days,
            ca,
            issuer,
            subject_key,
            out,
        } => {
            let key = PrivateKey::load_from_file(&key)?;
            let issuer = issuer
                .map(|p| Certificate::load_from_file(&p))
                .transpose()
                .context("load issuer certificate")?;

            let mut template =
                CertificateTemplate::new(org, cn).valid_for(Duration::days(days.into()))?;
            for san in &sans {
                template = template.san(san);
            }
            if ca {
                template = template.ca();
            }

            let cert = match subject_key {
                Some(path) => {
                    let subject = PrivateKey::load_from_file(&path)?.public_key()?;
                    key.certificate_for_key(&template, issuer.as_ref(), &subject)?
                }
                None => key.certificate(&template, issuer.as_ref())?,
            };
            cert.write_to_file(&out)?;
            println!("Wrote certificate for {}: {}", cert.common_name(), out.display());
            Ok(())
        }
        CertCmd::Show { cert } => {
            let cert = Certificate::load_from_file(&cert)?;
            println!("subject CN:   {}", cert.common_name());
            if let Some(org) = cert.organization() {
                println!("organization: {org}");
            }
            for dns in cert.dns_names() {
                println!("DNS SAN:      {dns}");
            }
            for ip in cert.ip_addresses() {
                println!("IP SAN:       {ip}");
            }
            println!("not before:   {}", cert.not_before());
            println!("not after:    {}", cert.not_after());
            println!("CA:           {}", cert.is_ca());
            Ok(())
        }
    }
}

fn cmd_install(store: &dyn TrustStore, cert: &Certificate, prompt: &InstallPrompt) -> Result<()> {
    let mut log_attempt = |attempt: &InstallAttempt<'_>| match attempt.error {
        Some(e) => eprintln!("Warning: {}: {e}", attempt.store),
        None => println!("Installed into {}", attempt.store),
    };
    let changed = store.add_as_trusted_root_if_needed(cert, prompt, Some(&mut log_attempt))?;
    if !changed {
        println!("{} already trusted.", cert.common_name());
    }
    Ok(())
}

fn cmd_demo(store: &dyn TrustStore, cn: &str, pause: bool) -> Result<()> {
    let key = PrivateKey::generate(2048).context("generate demo key")?;
    let valid_until = OffsetDateTime::now_utc() + Duration::days(1);
    let cert = key
        .tls_certificate_for(valid_until, true, None, "Trustkit", cn, &["san1.test", "san2.test"])
        .context("generate demo certificate")?;

    let prompt = InstallPrompt::elevated(format!(
        "Please allow trustkit to install a certificate for {cn}"
    ));
    store
        .add_as_trusted_root_if_needed(&cert, &prompt, None)
        .context("add as trusted root")?;

    let again = InstallPrompt::elevated(format!("You should not have been prompted to reinstall {cn}!"));
    if store.add_as_trusted_root_if_needed(&cert, &again, None)? {
        eprintln!("Warning: second install changed the store");
    }

    if store.is_installed(&cert)? {
        println!("Cert was correctly detected as installed");
    } else {
        println!("Cert doesn't show as being installed even though it should");
    }

    if pause {
        println!("Installed certificate with common name {cn}, hit Enter to continue ...");
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
    }

    store
        .delete_trusted_root_by_name(
            cn,
            &format!("Please allow trustkit to uninstall the certificate for {cn}"),
        )
        .context("delete trusted root")?;
    println!("Uninstalled certificate with common name {cn}");
    Ok(())
}
