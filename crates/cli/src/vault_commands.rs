use {
    anyhow::Context,
    clap::Subcommand,
    ferry_config::FerryConfig,
    ferry_vault::{Vault, generate_key},
    secrecy::ExposeSecret,
};

use crate::read_secret;

#[derive(Subcommand)]
pub enum VaultAction {
    /// Print a fresh random encryption key for `FERRY_ENCRYPTION_KEY`.
    Keygen,
    /// Encrypt a secret read from stdin and print the stored form.
    Encrypt,
}

pub fn handle_vault(action: VaultAction, config: &FerryConfig) -> anyhow::Result<()> {
    match action {
        VaultAction::Keygen => {
            println!("{}", generate_key());
            Ok(())
        },
        VaultAction::Encrypt => {
            let vault = Vault::from_config(&config.vault).context("vault unavailable")?;
            let secret = read_secret("Secret to encrypt")?;
            println!("{}", vault.encrypt(secret.expose_secret())?);
            Ok(())
        },
    }
}
