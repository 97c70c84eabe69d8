// src/cli/index.rs
//! Index publishing commands

use clap::Subcommand;

#[derive(Subcommand)]
pub enum IndexCommands {
    /// Convert a legacy index-v1.json into the unified format
    Convert {
        /// Legacy index (index-v1.json, or a signed index-v1.jar)
        input: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<String>,

        /// Locale for text the legacy format leaves unlocalized
        #[arg(long, default_value = "en-US")]
        locale: String,
    },

    /// Generate an Ed25519 signing key pair
    Keygen {
        /// Key name (files are {name}.private and {name}.public)
        name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: String,

        /// Optional key identifier stored alongside the key
        #[arg(long)]
        key_id: Option<String>,
    },

    /// Wrap an index document in a signed container
    Sign {
        /// Payload to sign (index-v1.json or entry.json)
        input: String,

        /// Private key file
        #[arg(short, long)]
        key: String,

        /// Container to write (default: input with a .jar extension)
        #[arg(short, long)]
        output: Option<String>,

        /// Entry name of the payload (default: the input's file name)
        #[arg(long)]
        payload_name: Option<String>,
    },

    /// Verify a signed container and print its signer
    Verify {
        /// Signed container (.jar)
        input: String,

        /// Entry name of the payload (default: derived from the container name)
        #[arg(long)]
        payload_name: Option<String>,

        /// Fail unless the signer has this fingerprint
        #[arg(long, conflicts_with = "certificate")]
        fingerprint: Option<String>,

        /// Fail unless the signer matches this public key file
        #[arg(long)]
        certificate: Option<String>,
    },
}
