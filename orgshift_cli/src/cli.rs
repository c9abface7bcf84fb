use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "orgshift", version, about = "Org-to-org record graph migration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import snapshots into the destination org, in dependency order,
    /// then reconcile lookup fields.
    Run {
        /// Import a single object type instead of the whole order.
        /// Reconciliation is skipped; run `reconcile` separately.
        #[arg(long)]
        object: Option<String>,

        /// Root directory holding exported_data/, exported_metadata/ and
        /// id_maps/.
        #[arg(long, env = "ORGSHIFT_DATA_DIR", default_value = ".")]
        data_dir: PathBuf,

        /// Optional YAML overriding the built-in migration config.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Insert only; leave lookup rewriting to a later `reconcile`.
        #[arg(long)]
        skip_reconcile: bool,
    },

    /// Rewrite lookup fields on already-created records from the persisted
    /// id maps. Requires a prior `run` (the id map files must exist).
    Reconcile {
        #[arg(long, env = "ORGSHIFT_DATA_DIR", default_value = ".")]
        data_dir: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Export every configured object type from the org into snapshot CSVs
    /// plus per-object field listings.
    Export {
        #[arg(long, env = "ORGSHIFT_DATA_DIR", default_value = ".")]
        data_dir: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Collapse user references in the snapshot files onto one destination
    /// user, looked up by the given source-user emails.
    RewriteOwners {
        #[arg(long, env = "ORGSHIFT_DATA_DIR", default_value = ".")]
        data_dir: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Comma-delimited emails of source-org users to replace.
        #[arg(long, value_delimiter = ',', required = true)]
        emails: Vec<String>,

        /// Destination user id written in their place.
        #[arg(long)]
        replacement: String,
    },

    /// Verify credentials and connectivity to the destination org.
    Check,
}
