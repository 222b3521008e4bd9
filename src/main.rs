//! catree CLI - Command line interface for catree
//!
//! Manages a content-addressed Merkle tree in a store directory. Every
//! mutating command commits before exiting, since each invocation is a
//! separate process. Output is JSON on stdout; logs go to stderr.

use anyhow::{bail, Context};
use catree::{
    block_on, Blake3Policy, ContentAddressedTree, Hash, HashPolicy, NodeStore, Sha256Policy,
    StoreConfig, ThreadPool, TreeConfig, TreeMode,
};
use clap::{Parser, Subcommand};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, Level};

#[derive(Parser)]
#[command(name = "catree")]
#[command(about = "Content-addressed append-only Merkle trees")]
#[command(version)]
struct Cli {
    /// Directory holding the stores (default: .catree)
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Tree name; one store per name (default: tree)
    #[arg(short, long)]
    name: Option<String>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Worker threads for hashing and callbacks
    #[arg(long)]
    threads: Option<usize>,

    /// Hash policy for new trees; existing trees use the policy they were built with
    #[arg(long, default_value = "blake3")]
    policy: PolicyName,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum PolicyName {
    Blake3,
    Sha256,
}

impl PolicyName {
    fn as_str(&self) -> &'static str {
        match self {
            PolicyName::Blake3 => Blake3Policy::NAME,
            PolicyName::Sha256 => Sha256Policy::NAME,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty tree
    Init {
        /// Tree depth (capacity is 2^depth leaves)
        #[arg(long)]
        depth: Option<u32>,
    },

    /// Append leaves and commit
    Add {
        /// Leaf values as 64-digit hex
        values: Vec<String>,
        /// Append this many pseudo-random leaves instead
        #[arg(long)]
        random: Option<u64>,
    },

    /// Replace a leaf and commit
    Update {
        /// Leaf index
        index: u64,
        /// New value as 64-digit hex
        value: String,
    },

    /// Show a leaf value
    Leaf {
        /// Leaf index
        index: u64,
    },

    /// Show the sibling path of a leaf and verify it against the root
    Path {
        /// Leaf index
        index: u64,
    },

    /// Show tree root, size and store statistics
    Status,

    /// Time batch insertion into a scratch tree
    Bench {
        /// Leaves per batch
        #[arg(long, default_value = "64")]
        batch_size: u64,
        /// Number of batches
        #[arg(long, default_value = "16")]
        batches: u64,
        /// Depth of the scratch tree
        #[arg(long, default_value = "32")]
        depth: u32,
    },
}

/// Settings read from `--config`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
struct Config {
    store: StoreConfig,
    tree: TreeConfig,
    threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store: StoreConfig::default(),
            tree: TreeConfig::default(),
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let workers = Arc::new(ThreadPool::new(config.threads)?);

    if let Commands::Bench {
        batch_size,
        batches,
        depth,
    } = cli.command
    {
        let value = match cli.policy {
            PolicyName::Blake3 => bench::<Blake3Policy>(&config, workers, batch_size, batches, depth)?,
            PolicyName::Sha256 => bench::<Sha256Policy>(&config, workers, batch_size, batches, depth)?,
        };
        return output(&cli.format, &value);
    }

    let store = Arc::new(NodeStore::open(config.store.clone())?);
    let policy = match store.meta() {
        Some(meta) => meta.hash_policy,
        None => cli.policy.as_str().to_string(),
    };

    let value = match policy.as_str() {
        Blake3Policy::NAME => run::<Blake3Policy>(&cli, config, store, workers)?,
        Sha256Policy::NAME => run::<Sha256Policy>(&cli, config, store, workers)?,
        other => bail!("Unknown hash policy in store: {other}"),
    };
    output(&cli.format, &value)
}

fn run<P: HashPolicy>(
    cli: &Cli,
    mut config: Config,
    store: Arc<NodeStore>,
    workers: Arc<ThreadPool>,
) -> anyhow::Result<serde_json::Value> {
    let existing = store.meta();

    if let Commands::Init { depth } = &cli.command {
        if let Some(meta) = existing {
            bail!(
                "Tree {} already exists at {}",
                meta.name,
                store.path().display()
            );
        }
        if let Some(depth) = depth {
            config.tree.depth = *depth;
        }
        let tree = ContentAddressedTree::<P>::open(store.clone(), config.tree, workers)?;
        return Ok(serde_json::json!({
            "status": "ok",
            "message": format!("Created tree at {}", store.path().display()),
            "name": tree.config().name,
            "depth": tree.depth(),
            "policy": P::NAME,
            "root": tree.root().to_hex(),
        }));
    }

    let Some(meta) = existing else {
        bail!(
            "No tree at {} (run `catree init` first)",
            store.path().display()
        );
    };
    config.tree.depth = meta.depth;
    if let Commands::Update { .. } = cli.command {
        config.tree.mode = TreeMode::Indexed;
    }
    let tree = ContentAddressedTree::<P>::open(store, config.tree, workers)?;

    let value = match &cli.command {
        Commands::Add { values, random } => {
            let leaves = match random {
                Some(count) => random_leaves(*count),
                None => values
                    .iter()
                    .map(|value| parse_hash(value))
                    .collect::<anyhow::Result<Vec<_>>>()?,
            };
            if leaves.is_empty() {
                bail!("No values given (pass hex values or --random N)");
            }

            let added = wait(|done| tree.add_values(leaves, move |r| done.complete(r)))??;
            let committed = wait(|done| tree.commit(move |r| done.complete(r)))??;
            info!(count = added.end_index - added.start_index, size = committed.size, "added leaves");

            serde_json::json!({
                "status": "ok",
                "start_index": added.start_index,
                "end_index": added.end_index,
                "subtree_root": added.subtree_root.to_hex(),
                "subtree_height": added.subtree_height,
                "root": committed.root.to_hex(),
                "size": committed.size,
                "nodes_written": committed.nodes_written,
            })
        }

        Commands::Update { index, value } => {
            let value = parse_hash(value)?;
            let updated = wait(|done| tree.update_value(*index, value, move |r| done.complete(r)))??;
            let committed = wait(|done| tree.commit(move |r| done.complete(r)))??;

            serde_json::json!({
                "status": "ok",
                "index": updated.index,
                "previous_value": updated.previous_value.to_hex(),
                "previous_root": updated.previous_root.to_hex(),
                "root": committed.root.to_hex(),
            })
        }

        Commands::Leaf { index } => {
            let leaf = tree.get_leaf(*index, false)?;
            serde_json::json!({
                "index": index,
                "value": leaf.to_hex(),
            })
        }

        Commands::Path { index } => {
            let root = tree.committed_root();
            let path = tree.get_hash_path_at(*index, false)?;
            let leaf = path
                .leaf(*index)
                .context("Hash path is empty")?;
            let verified = path.check_membership::<P>(&root, leaf, *index);
            let siblings = (0..path.pairs().len() as u32)
                .filter_map(|level| path.sibling(*index, level))
                .map(|sibling| sibling.to_hex())
                .collect::<Vec<_>>();

            serde_json::json!({
                "index": index,
                "leaf": leaf.to_hex(),
                "root": root.to_hex(),
                "verified": verified,
                "siblings": siblings,
                "path": path
                    .pairs()
                    .iter()
                    .map(|(left, right)| [left.to_hex(), right.to_hex()])
                    .collect::<Vec<_>>(),
            })
        }

        Commands::Status => {
            let meta = tree.meta(false);
            let store = tree.store();
            serde_json::json!({
                "name": meta.name,
                "policy": meta.hash_policy,
                "depth": meta.depth,
                "capacity": meta.capacity(),
                "size": meta.size,
                "root": meta.root.to_hex(),
                "objects": store.object_count(),
                "segments": store.segment_count(),
                "bytes": store.committed_len(),
                "path": store.path().display().to_string(),
            })
        }

        Commands::Init { .. } | Commands::Bench { .. } => bail!("Command already handled"),
    };
    Ok(value)
}

/// Append `batches` random batches to a scratch store, committing each one
fn bench<P: HashPolicy>(
    config: &Config,
    workers: Arc<ThreadPool>,
    batch_size: u64,
    batches: u64,
    depth: u32,
) -> anyhow::Result<serde_json::Value> {
    let name = format!("bench-{}-{}", P::NAME, std::process::id());
    let store_config = StoreConfig {
        name: name.clone(),
        ..config.store.clone()
    };
    let scratch = store_config.directory.join(&name);

    let result = (|| -> anyhow::Result<serde_json::Value> {
        let store = Arc::new(NodeStore::open(store_config)?);
        let tree_config = TreeConfig {
            name: name.clone(),
            depth,
            ..config.tree.clone()
        };
        let tree = ContentAddressedTree::<P>::open(store, tree_config, workers.clone())?;

        let mut insert_ms = 0.0;
        let mut commit_ms = 0.0;
        for batch in 0..batches {
            let leaves = random_leaves(batch_size);

            let started = Instant::now();
            wait(|done| tree.add_values(leaves, move |r| done.complete(r)))??;
            insert_ms += started.elapsed().as_secs_f64() * 1000.0;

            let started = Instant::now();
            wait(|done| tree.commit(move |r| done.complete(r)))??;
            commit_ms += started.elapsed().as_secs_f64() * 1000.0;

            debug!(batch, size = tree.size(), "bench batch done");
        }

        let leaves = batch_size * batches;
        let total_ms = insert_ms + commit_ms;
        Ok(serde_json::json!({
            "policy": P::NAME,
            "depth": depth,
            "threads": workers.size(),
            "batch_size": batch_size,
            "batches": batches,
            "leaves": leaves,
            "insert_ms": insert_ms,
            "commit_ms": commit_ms,
            "leaves_per_sec": if total_ms > 0.0 { leaves as f64 * 1000.0 / total_ms } else { 0.0 },
            "root": tree.root().to_hex(),
        }))
    })();

    if scratch.exists() {
        std::fs::remove_dir_all(&scratch)
            .with_context(|| format!("Failed to remove {}", scratch.display()))?;
    }
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(directory) = &cli.directory {
        config.store.directory = directory.clone();
    }
    if let Some(name) = &cli.name {
        config.store.name = name.clone();
    }
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }
    // One store per tree: the store namespace is the tree name
    config.tree.name = config.store.name.clone();
    Ok(config)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Block on a callback-style tree operation
fn wait<T>(start: impl FnOnce(catree::Completion<T>)) -> anyhow::Result<T> {
    block_on(start).context("Operation finished without a result")
}

fn parse_hash(value: &str) -> anyhow::Result<Hash> {
    Hash::from_hex(value).with_context(|| format!("Invalid leaf value: {value}"))
}

/// Uniformly random leaves for `add --random` and `bench`
fn random_leaves(count: u64) -> Vec<Hash> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| Hash::from_bytes(rng.gen())).collect()
}

fn output(format: &OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => match value.as_object() {
            Some(fields) => {
                for (key, field) in fields {
                    match field {
                        serde_json::Value::String(s) => println!("{key}: {s}"),
                        other => println!("{key}: {other}"),
                    }
                }
            }
            None => println!("{}", serde_json::to_string_pretty(value)?),
        },
    }
    Ok(())
}
