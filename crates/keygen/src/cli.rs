//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Mint a new symmetric key version, wrap it with a key pair, and persist it.
#[derive(Debug, Parser)]
#[command(name = "fieldcrypt-keygen", version)]
pub struct Cli {
    /// Encryption version to create. Must be greater than zero.
    #[arg(id = "new_version", value_name = "NEW_VERSION", value_parser = clap::value_parser!(u32).range(1..))]
    pub version: u32,

    /// Fingerprint of the wrapping key pair in KEY_PAIR_DIR. Spaces and colons
    /// are ignored.
    #[arg(value_name = "WRAPPING_KEY_FINGERPRINT")]
    pub fingerprint: String,

    /// Key repository directory.
    #[arg(value_name = "STORE_CONNECTION_INFO")]
    pub store: PathBuf,

    /// Replace an existing record with the same version.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn parses_positional_arguments() {
        let cli = Cli::try_parse_from(["fieldcrypt-keygen", "1000", "AB:CD", "/var/keys"]).unwrap();
        assert_eq!(cli.version, 1000);
        assert_eq!(cli.fingerprint, "AB:CD");
        assert_eq!(cli.store, PathBuf::from("/var/keys"));
        assert!(!cli.force);
    }

    #[test]
    fn force_flag() {
        let cli =
            Cli::try_parse_from(["fieldcrypt-keygen", "--force", "2", "AB", "keys"]).unwrap();
        assert!(cli.force);
    }

    #[test]
    fn rejects_missing_arguments() {
        let err = Cli::try_parse_from(["fieldcrypt-keygen", "1000"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn rejects_bad_versions() {
        assert!(Cli::try_parse_from(["fieldcrypt-keygen", "0", "AB", "keys"]).is_err());
        assert!(Cli::try_parse_from(["fieldcrypt-keygen", "-5", "AB", "keys"]).is_err());
        assert!(Cli::try_parse_from(["fieldcrypt-keygen", "ten", "AB", "keys"]).is_err());
    }
}
