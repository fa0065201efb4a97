use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::Path;
use strata_lib::cli::commands::{AspectAction, Cli, Commands, PropAction, StoreAction};
use strata_lib::cli::{parse_property_value, parse_time, version_arg};
use strata_lib::config::default_repository_dir;
use strata_lib::{
    NodeDescriptor, NodeId, QName, QualifiedPath, Repository, RepositoryConfig, StrataProject,
    VersionSpec,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger with specified or default log level
    let env = match cli.log_level {
        Some(ref log_level) => Env::default().filter_or("RUST_LOG", log_level),
        None => Env::default().filter_or("RUST_LOG", "info"),
    };
    env_logger::init_from_env(env);

    let repo_dir = cli.repo.clone().unwrap_or_else(default_repository_dir);

    if let Commands::Init {
        max_indirection_depth,
        creator,
    } = cli.command
    {
        return cmd_init(&repo_dir, max_indirection_depth, creator);
    }

    let repo = open_repository(&repo_dir)?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Store { action } => cmd_store(&repo, action)?,
        Commands::Mkdir { path } => {
            let (parent, name) = split(&path)?;
            repo.create_directory(&parent, &name)
                .with_context(|| format!("Failed to create directory {}", path))?;
            println!("✓ Created {}", path);
        }
        Commands::Write {
            path,
            file,
            text,
            mime_type,
        } => cmd_write(&repo, &path, file.as_deref(), text, mime_type.as_deref())?,
        Commands::Cat { path, at } => {
            let bytes = repo
                .read_file(version_arg(at)?, &qualified(&path)?)
                .with_context(|| format!("Failed to read {}", path))?;
            print!("{}", String::from_utf8_lossy(&bytes));
        }
        Commands::Ls {
            path,
            at,
            direct,
            deleted,
        } => cmd_ls(&repo, &path, version_arg(at)?, direct, deleted)?,
        Commands::Stat { path, at, format } => {
            let desc = repo
                .lookup(version_arg(at)?, &qualified(&path)?)
                .with_context(|| format!("Failed to look up {}", path))?;
            print_descriptor(&desc, &format)?;
        }
        Commands::Rm { path } => {
            let (parent, name) = split(&path)?;
            repo.remove_node(&parent, &name)
                .with_context(|| format!("Failed to remove {}", path))?;
            println!("✓ Removed {}", path);
        }
        Commands::Mv { from, to } => {
            let (src_parent, src_name) = split(&from)?;
            let (dst_parent, dst_name) = split(&to)?;
            repo.rename(&src_parent, &src_name, &dst_parent, &dst_name)
                .with_context(|| format!("Failed to move {} to {}", from, to))?;
            println!("✓ Moved {} to {}", from, to);
        }
        Commands::Layer { target, path, file } => {
            let (parent, name) = split(&path)?;
            let desc = if file {
                repo.create_layered_file(&target, &parent, &name)
            } else {
                repo.create_layered_directory(&target, &parent, &name)
            }
            .with_context(|| format!("Failed to create layered node {}", path))?;
            println!(
                "✓ Created {} -> {}",
                path,
                desc.indirection.as_deref().unwrap_or("?")
            );
        }
        Commands::Retarget { path, target } => {
            repo.retarget_layered_directory(&qualified(&path)?, &target)
                .with_context(|| format!("Failed to retarget {}", path))?;
            println!("✓ Retargeted {} -> {}", path, target);
        }
        Commands::MakePrimary { path } => {
            repo.make_primary(&qualified(&path)?)
                .with_context(|| format!("Failed to make {} primary", path))?;
            println!("✓ {} is now primary", path);
        }
        Commands::Uncover { path } => {
            let (parent, name) = split(&path)?;
            repo.uncover(&parent, &name)
                .with_context(|| format!("Failed to uncover {}", path))?;
            println!("✓ Uncovered {}", path);
        }
        Commands::Opacity { path, opaque } => {
            repo.set_opacity(&qualified(&path)?, opaque)
                .with_context(|| format!("Failed to set opacity of {}", path))?;
            println!("✓ {} opaque={}", path, opaque);
        }
        Commands::Snapshot {
            store,
            label,
            comment,
        } => {
            let id = repo
                .create_snapshot(&store, label.as_deref(), comment.as_deref())
                .with_context(|| format!("Failed to snapshot store {}", store))?;
            println!("✓ Created version {} of {}", id, store);
        }
        Commands::Versions {
            store,
            since,
            until,
        } => cmd_versions(&repo, &store, since.as_deref(), until.as_deref())?,
        Commands::PurgeVersion { store, version } => {
            let stats = repo
                .purge_version(&store, version)
                .with_context(|| format!("Failed to purge version {} of {}", version, store))?;
            println!(
                "✓ Purged version {} of {} ({} nodes collected)",
                version, store, stats.collected
            );
        }
        Commands::Branch {
            source,
            destination,
            at,
        } => {
            let (parent, name) = split(&destination)?;
            let desc = repo
                .create_branch(version_arg(at)?, &qualified(&source)?, &parent, &name)
                .with_context(|| format!("Failed to branch {} to {}", source, destination))?;
            println!("✓ Branched {} to {} (node {})", source, destination, desc.id);
        }
        Commands::Revert { path, node } => {
            let desc = repo
                .revert(&qualified(&path)?, NodeId(node))
                .with_context(|| format!("Failed to revert {}", path))?;
            println!("✓ Reverted {} to a copy of {} (node {})", path, NodeId(node), desc.id);
        }
        Commands::History { path, at, limit } => {
            cmd_history(&repo, &path, version_arg(at)?, limit)?
        }
        Commands::Ancestor { left, right } => cmd_ancestor(&repo, &left, &right)?,
        Commands::Prop { action } => cmd_prop(&repo, action)?,
        Commands::Aspect { action } => cmd_aspect(&repo, action)?,
        Commands::Gc { dry_run } => {
            let stats = if dry_run {
                repo.gc_dry_run()
            } else {
                repo.collect_garbage()
                    .with_context(|| "Failed to collect garbage")?
            };
            println!(
                "{} {} of {} nodes",
                if dry_run { "Would collect" } else { "✓ Collected" },
                stats.collected,
                stats.total_before
            );
        }
    }

    Ok(())
}

/// Create a new repository directory
fn cmd_init(
    directory: &Path,
    max_indirection_depth: Option<usize>,
    creator: Option<String>,
) -> Result<()> {
    info!("Initializing repository at {:?}", directory);

    let mut config = RepositoryConfig::default();
    if let Some(depth) = max_indirection_depth {
        config = config.with_max_indirection_depth(depth);
    }
    if let Some(creator) = creator {
        config = config.with_creator(creator);
    }

    let project = StrataProject::init(directory, config)
        .with_context(|| format!("Failed to initialize repository at {:?}", directory))?;

    println!("✓ Initialized repository at '{}'", directory.display());
    println!("  Repository UUID: {}", project.uuid());
    println!();
    println!("Next steps:");
    println!("  Create a store: strata --repo {} store create main", directory.display());
    println!("  Add content:    strata --repo {} mkdir main:/www", directory.display());

    Ok(())
}

fn open_repository(directory: &Path) -> Result<Repository> {
    let project = StrataProject::open(directory).with_context(|| {
        format!(
            "No repository at {:?}\nInitialize one with: strata --repo {:?} init",
            directory, directory
        )
    })?;
    project
        .repository()
        .with_context(|| format!("Failed to load repository at {:?}", directory))
}

fn qualified(raw: &str) -> Result<QualifiedPath> {
    QualifiedPath::parse(raw).with_context(|| format!("Invalid path: {}", raw))
}

/// Split `store:/a/b` into `store:/a` and `b`.
fn split(raw: &str) -> Result<(QualifiedPath, String)> {
    let path = qualified(raw)?;
    let (parent, name) = path
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("{} names a store root", raw))?;
    Ok((parent, name.to_string()))
}

fn qname(raw: &str) -> Result<QName> {
    raw.parse::<QName>()
        .with_context(|| format!("Invalid qualified name: {}", raw))
}

fn cmd_store(repo: &Repository, action: StoreAction) -> Result<()> {
    match action {
        StoreAction::Create { name } => {
            let desc = repo
                .create_store(&name)
                .with_context(|| format!("Failed to create store {}", name))?;
            println!("✓ Created store {} (next version {})", desc.name, desc.next_version_id);
        }
        StoreAction::List { format } => {
            let stores = repo.get_stores();
            if stores.is_empty() {
                println!("No stores found.");
                println!("Create one with: strata store create <name>");
                return Ok(());
            }
            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&stores)?),
                _ => {
                    println!("{:<24} {:<10} {:<10} {:<20}", "STORE", "VERSIONS", "LATEST", "CREATOR");
                    println!("{}", "-".repeat(66));
                    for s in stores {
                        let latest = s
                            .latest_snapshot_id
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "-".to_string());
                        println!(
                            "{:<24} {:<10} {:<10} {:<20}",
                            s.name, s.version_count, latest, s.creator
                        );
                    }
                }
            }
        }
        StoreAction::Info { name } => {
            let desc = repo
                .get_store(&name)
                .with_context(|| format!("Failed to read store {}", name))?;
            println!("Store:           {}", desc.name);
            println!("Creator:         {}", desc.creator);
            println!("Created:         {}", desc.created.to_rfc3339());
            println!("Next version:    {}", desc.next_version_id);
            match desc.latest_snapshot_id {
                Some(v) => println!("Latest snapshot: {}", v),
                None => println!("Latest snapshot: -"),
            }
            for (k, v) in repo.get_store_properties(&name)? {
                println!("  {} = {}", k, v);
            }
        }
        StoreAction::Rename { from, to } => {
            repo.rename_store(&from, &to)
                .with_context(|| format!("Failed to rename store {}", from))?;
            println!("✓ Renamed store {} to {}", from, to);
        }
        StoreAction::Purge { name, force } => {
            if !force {
                print!("This will remove store '{}' and all its versions. Are you sure? [y/N] ", name);
                use std::io::Write;
                std::io::stdout().flush()?;

                let mut input = String::new();
                std::io::stdin().read_line(&mut input)?;
                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("Aborted.");
                    return Ok(());
                }
            }
            let stats = repo
                .purge_store(&name)
                .with_context(|| format!("Failed to purge store {}", name))?;
            println!("✓ Purged store {} ({} nodes collected)", name, stats.collected);
        }
        StoreAction::PropSet { store, name, value } => {
            repo.set_store_property(&store, qname(&name)?, parse_property_value(&value))
                .with_context(|| format!("Failed to set property on store {}", store))?;
        }
        StoreAction::PropGet { store, name } => match name {
            Some(name) => match repo.get_store_property(&store, &qname(&name)?)? {
                Some(v) => println!("{}", v),
                None => println!("(unset)"),
            },
            None => {
                for (k, v) in repo.get_store_properties(&store)? {
                    println!("{} = {}", k, v);
                }
            }
        },
        StoreAction::PropQuery { pattern, store } => match store {
            Some(store) => {
                for (k, v) in repo.query_store_property_key(&store, &pattern)? {
                    println!("{} = {}", k, v);
                }
            }
            None => {
                for (store, props) in repo.query_stores_property_key(&pattern) {
                    for (k, v) in props {
                        println!("{}: {} = {}", store, k, v);
                    }
                }
            }
        },
    }
    Ok(())
}

fn cmd_write(
    repo: &Repository,
    path: &str,
    file: Option<&Path>,
    text: Option<String>,
    mime_type: Option<&str>,
) -> Result<()> {
    let data = match (file, text) {
        (Some(file), _) => {
            std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?
        }
        (None, Some(text)) => text.into_bytes(),
        (None, None) => {
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut std::io::stdin(), &mut buf)?;
            buf
        }
    };
    let (parent, name) = split(path)?;
    repo.write_file(&parent, &name, &data)
        .with_context(|| format!("Failed to write {}", path))?;
    if let Some(mime) = mime_type {
        repo.set_mime_type(&qualified(path)?, mime)?;
    }
    println!("✓ Wrote {} bytes to {}", data.len(), path);
    Ok(())
}

fn cmd_ls(
    repo: &Repository,
    path: &str,
    version: VersionSpec,
    direct: bool,
    deleted: bool,
) -> Result<()> {
    let dir = qualified(path)?;
    let listing = if direct {
        repo.get_directory_listing_direct(version, &dir)
    } else {
        repo.get_directory_listing(version, &dir)
    }
    .with_context(|| format!("Failed to list {}", path))?;

    for (name, desc) in listing {
        let suffix = if desc.is_directory() { "/" } else { "" };
        println!("{:<18} {:>8} {}{}", desc.kind, desc.id.to_string(), name, suffix);
    }
    if deleted {
        for name in repo.get_deleted(version, &dir)? {
            println!("{:<18} {:>8} {}", "whiteout", "-", name);
        }
    }
    Ok(())
}

fn print_descriptor(desc: &NodeDescriptor, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(desc)?);
        return Ok(());
    }
    println!("Node:        {}", desc.id);
    println!("Kind:        {}", desc.kind);
    if let Some(path) = &desc.path {
        println!("Path:        {}", path);
    }
    println!("Guid:        {}", desc.guid);
    if let Some(pred) = desc.predecessor {
        println!("Predecessor: {}", pred);
    }
    if let Some(ind) = &desc.indirection {
        let kind = if desc.primary_indirection { "primary" } else { "derived" };
        println!("Indirection: {} ({})", ind, kind);
    }
    if desc.opaque {
        println!("Opaque:      yes");
    }
    if let Some(mime) = &desc.mime_type {
        println!("Mime type:   {}", mime);
    }
    if desc.is_directory() {
        println!("Entries:     {}", desc.entry_count);
    }
    println!("Mutable:     {}", if desc.mutable { "yes" } else { "no" });
    println!("Modified:    {}", desc.modified.to_rfc3339());
    Ok(())
}

fn cmd_versions(
    repo: &Repository,
    store: &str,
    since: Option<&str>,
    until: Option<&str>,
) -> Result<()> {
    let since = since.map(parse_time).transpose()?;
    let until = until.map(parse_time).transpose()?;
    let versions = repo
        .get_store_versions_between(store, since, until)
        .with_context(|| format!("Failed to list versions of {}", store))?;

    println!("{:<8} {:<26} {:<16} {}", "VERSION", "CREATED", "CREATOR", "LABEL");
    println!("{}", "-".repeat(66));
    for v in versions {
        println!(
            "{:<8} {:<26} {:<16} {}",
            v.id,
            v.created.format("%Y-%m-%d %H:%M:%S"),
            v.creator,
            v.label.unwrap_or_default()
        );
    }
    println!();
    println!("Next version: {}", repo.get_next_version_id(store)?);
    Ok(())
}

fn cmd_history(repo: &Repository, path: &str, version: VersionSpec, limit: usize) -> Result<()> {
    let desc = repo
        .lookup(version, &qualified(path)?)
        .with_context(|| format!("Failed to look up {}", path))?;
    println!("{} {}", desc.id, path);
    for ancestor in repo.get_history(desc.id, limit)? {
        let location = repo
            .get_a_path(ancestor.id)?
            .map(|(_, p)| p.to_string())
            .unwrap_or_else(|| "(unreachable)".to_string());
        println!("{} {}", ancestor.id, location);
    }
    Ok(())
}

fn cmd_ancestor(repo: &Repository, left: &str, right: &str) -> Result<()> {
    let l = locate(repo, left)?;
    let r = locate(repo, right)?;
    match repo.get_common_ancestor(l.id, r.id)? {
        Some(desc) => println!("{}", desc.id),
        None => println!("No common ancestor"),
    }
    Ok(())
}

/// Paths may carry `@version`; lookups honor it.
fn locate(repo: &Repository, raw: &str) -> Result<NodeDescriptor> {
    repo.lookup(VersionSpec::Head, &qualified(raw)?)
        .with_context(|| format!("Failed to look up {}", raw))
}

fn cmd_prop(repo: &Repository, action: PropAction) -> Result<()> {
    match action {
        PropAction::Set { path, name, value } => {
            repo.set_node_property(&qualified(&path)?, qname(&name)?, parse_property_value(&value))
                .with_context(|| format!("Failed to set property on {}", path))?;
        }
        PropAction::Get { path, name, at } => {
            let p = qualified(&path)?;
            let version = version_arg(at)?;
            match name {
                Some(name) => match repo.get_node_property(version, &p, &qname(&name)?)? {
                    Some(v) => println!("{}", v),
                    None => println!("(unset)"),
                },
                None => {
                    for (k, v) in repo.get_node_properties(version, &p)? {
                        println!("{} = {}", k, v);
                    }
                }
            }
        }
        PropAction::Rm { path, name } => {
            let p = qualified(&path)?;
            match name {
                Some(name) => repo.delete_node_property(&p, &qname(&name)?)?,
                None => repo.delete_node_properties(&p)?,
            }
        }
    }
    Ok(())
}

fn cmd_aspect(repo: &Repository, action: AspectAction) -> Result<()> {
    match action {
        AspectAction::Add { path, aspect } => {
            repo.add_aspect(&qualified(&path)?, qname(&aspect)?)
                .with_context(|| format!("Failed to add aspect to {}", path))?;
        }
        AspectAction::Rm { path, aspect } => {
            repo.remove_aspect(&qualified(&path)?, &qname(&aspect)?)
                .with_context(|| format!("Failed to remove aspect from {}", path))?;
        }
        AspectAction::List { path, at } => {
            for aspect in repo.get_aspects(version_arg(at)?, &qualified(&path)?)? {
                println!("{}", aspect);
            }
        }
    }
    Ok(())
}
