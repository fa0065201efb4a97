use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strata - Versioned, layered content store
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Optional log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Repository directory (default: ~/.local/share/strata)
    #[arg(long, short, global = true, value_name = "DIRECTORY")]
    pub repo: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new, empty repository directory
    Init {
        /// Bound on nested indirections followed by one lookup
        #[arg(long, value_name = "DEPTH")]
        max_indirection_depth: Option<usize>,

        /// Creator recorded on stores and versions (default: $USER)
        #[arg(long)]
        creator: Option<String>,
    },

    /// Manage stores
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Create a directory, e.g. `strata mkdir main:/www`
    Mkdir {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Write a file from a local file or from text
    Write {
        #[arg(value_name = "PATH")]
        path: String,

        /// Read the content from this local file
        #[arg(long, short, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Use this text as content
        #[arg(long, short)]
        text: Option<String>,

        /// Mime type to record
        #[arg(long)]
        mime_type: Option<String>,
    },

    /// Print a file's content
    Cat {
        #[arg(value_name = "PATH")]
        path: String,

        /// Committed version to read (default: head)
        #[arg(long, value_name = "VERSION", allow_negative_numbers = true)]
        at: Option<i64>,
    },

    /// List a directory
    Ls {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(long, value_name = "VERSION", allow_negative_numbers = true)]
        at: Option<i64>,

        /// Only local entries, ignoring layering
        #[arg(long)]
        direct: bool,

        /// Also show whiteouts
        #[arg(long)]
        deleted: bool,
    },

    /// Describe a node
    Stat {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(long, value_name = "VERSION", allow_negative_numbers = true)]
        at: Option<i64>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Remove a node (whites it out in a layered directory)
    Rm {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Move a node within a store
    Mv {
        #[arg(value_name = "FROM")]
        from: String,

        #[arg(value_name = "TO")]
        to: String,
    },

    /// Create a layered directory (or file) pointing at TARGET
    Layer {
        /// Indirection target, e.g. `base:/www` or `/www` in the same store
        #[arg(value_name = "TARGET")]
        target: String,

        #[arg(value_name = "PATH")]
        path: String,

        /// Create a layered file instead of a directory
        #[arg(long)]
        file: bool,
    },

    /// Point a layered directory at a new target
    Retarget {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(value_name = "TARGET")]
        target: String,
    },

    /// Turn a derived indirection into a primary one
    MakePrimary {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Remove the whiteout of PATH's name in its parent
    Uncover {
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Set whether a layered directory is opaque
    Opacity {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(value_name = "OPAQUE", action = clap::ArgAction::Set)]
        opaque: bool,
    },

    /// Freeze a store's head into a new version
    Snapshot {
        #[arg(value_name = "STORE")]
        store: String,

        #[arg(long)]
        label: Option<String>,

        #[arg(long)]
        comment: Option<String>,
    },

    /// List a store's versions
    Versions {
        #[arg(value_name = "STORE")]
        store: String,

        /// Only versions created at or after this RFC 3339 time
        #[arg(long)]
        since: Option<String>,

        /// Only versions created at or before this RFC 3339 time
        #[arg(long)]
        until: Option<String>,
    },

    /// Purge a committed version
    PurgeVersion {
        #[arg(value_name = "STORE")]
        store: String,

        #[arg(value_name = "VERSION")]
        version: u32,
    },

    /// Copy SOURCE (as of --at) to DESTINATION
    Branch {
        #[arg(value_name = "SOURCE")]
        source: String,

        #[arg(value_name = "DESTINATION")]
        destination: String,

        #[arg(long, value_name = "VERSION", allow_negative_numbers = true)]
        at: Option<i64>,
    },

    /// Replace the head node at PATH with a copy of node NODE_ID
    Revert {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(value_name = "NODE_ID")]
        node: u64,
    },

    /// Show the predecessors of a node
    History {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(long, value_name = "VERSION", allow_negative_numbers = true)]
        at: Option<i64>,

        /// Number of predecessors to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Find the common ancestor of two nodes
    Ancestor {
        #[arg(value_name = "LEFT")]
        left: String,

        #[arg(value_name = "RIGHT")]
        right: String,
    },

    /// Manage node properties
    Prop {
        #[command(subcommand)]
        action: PropAction,
    },

    /// Manage node aspects
    Aspect {
        #[command(subcommand)]
        action: AspectAction,
    },

    /// Collect nodes no store or version can reach
    Gc {
        /// Only report what would be collected
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum StoreAction {
    /// Create a new store
    Create {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// List all stores
    List {
        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Show store details
    Info {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Rename a store
    Rename {
        #[arg(value_name = "FROM")]
        from: String,

        #[arg(value_name = "TO")]
        to: String,
    },

    /// Remove a store and all its versions
    Purge {
        #[arg(value_name = "NAME")]
        name: String,

        /// Don't prompt for confirmation
        #[arg(long)]
        force: bool,
    },

    /// Set a store property
    PropSet {
        #[arg(value_name = "STORE")]
        store: String,

        /// Property name, `{namespace}local`
        #[arg(value_name = "NAME")]
        name: String,

        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Show store properties
    PropGet {
        #[arg(value_name = "STORE")]
        store: String,

        /// Only this property
        #[arg(value_name = "NAME")]
        name: Option<String>,
    },

    /// Find store properties whose key matches a LIKE pattern
    PropQuery {
        /// Pattern with `%` and `_` wildcards
        #[arg(value_name = "PATTERN")]
        pattern: String,

        /// Only search this store
        #[arg(long)]
        store: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum PropAction {
    /// Set a node property
    Set {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(value_name = "NAME")]
        name: String,

        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Show node properties
    Get {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(value_name = "NAME")]
        name: Option<String>,

        #[arg(long, value_name = "VERSION", allow_negative_numbers = true)]
        at: Option<i64>,
    },

    /// Delete a node property, or all of them
    Rm {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(value_name = "NAME")]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum AspectAction {
    /// Add an aspect to a node
    Add {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(value_name = "ASPECT")]
        aspect: String,
    },

    /// Remove an aspect from a node
    Rm {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(value_name = "ASPECT")]
        aspect: String,
    },

    /// List a node's aspects
    List {
        #[arg(value_name = "PATH")]
        path: String,

        #[arg(long, value_name = "VERSION", allow_negative_numbers = true)]
        at: Option<i64>,
    },
}
