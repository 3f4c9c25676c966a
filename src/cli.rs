use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Base directory holding config.yaml and relative data paths.
    /// Defaults to $SREF_BASE_PATH or ~/.local/share/sref-search
    #[clap(long, global = true)]
    pub base_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build fingerprints and the search index from the metadata table
    Analyze {
        /// Don't run the sample queries after indexing
        #[clap(long, default_value = "false")]
        skip_smoke_test: bool,
    },

    /// Search SREF styles by text description
    Search {
        /// Free-text query; with --batch every argument is its own query
        #[clap(required = true, num_args = 1.., trailing_var_arg = true)]
        query: Vec<String>,

        /// Run each argument as a separate query (3 results each by default)
        #[clap(long, default_value = "false")]
        batch: bool,

        /// Number of results
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Score by keyword overlap instead of embeddings
        #[clap(long, default_value = "false")]
        keyword: bool,

        /// Print results as json
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Find SREF styles similar to a given code
    Similar {
        /// Reference SREF code
        code: String,

        /// Number of results
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Print results as json
        #[clap(long, default_value = "false")]
        json: bool,
    },

    /// Prompt for queries until quit
    Interactive {
        /// Score by keyword overlap instead of embeddings
        #[clap(long, default_value = "false")]
        keyword: bool,
    },

    /// Start the HTTP API
    Serve {
        /// Listen address, e.g. 127.0.0.1:8080
        #[clap(long)]
        addr: Option<String>,

        /// Score text queries by keyword overlap, without loading a model
        #[clap(long, default_value = "false")]
        keyword: bool,
    },
}
