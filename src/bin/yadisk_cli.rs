//! yadisk-cli - Command-line access to configured Yandex Disk remotes
//!
//! Usage:
//!   yadisk-cli ls [-R] <remote:path>          List files
//!   yadisk-cli lsd <remote:path>              List directories
//!   yadisk-cli cat <remote:path>              Print a file to stdout
//!   yadisk-cli copyto <local> <remote:path>   Upload a file
//!   yadisk-cli get <remote:path> [local]      Download a file
//!   yadisk-cli mkdir|rmdir|purge <remote:path>
//!   yadisk-cli delete <remote:path>           Delete a file
//!   yadisk-cli touch <remote:path> [--time]   Set (or create with) a modification time
//!   yadisk-cli md5sum <remote:path>           MD5 of every file below a path
//!   yadisk-cli remotes                        Show configured remotes

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use yadisk_fs::providers::metadata::parse_time;
use yadisk_fs::{
    default_config_path, load_config, HashType, ListDepth, ListItem, ProviderError, SourceInfo, YandexFs,
};

#[derive(Parser)]
#[command(
    name = "yadisk-cli",
    about = "yadisk-cli - Yandex Disk as a filesystem",
    version,
    long_about = "Paths are written as <remote>:<path>, where <remote> names an entry of the config file."
)]
struct Cli {
    /// Config file (default: <config dir>/yadisk-fs/remotes.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files with their sizes
    Ls {
        target: String,
        /// Recurse into subdirectories
        #[arg(short = 'R', long)]
        recursive: bool,
    },
    /// List directories
    Lsd { target: String },
    /// Print a file to stdout
    Cat { target: String },
    /// Upload a local file to the given remote path
    Copyto { local: PathBuf, target: String },
    /// Download a file
    Get {
        target: String,
        /// Local destination (default: the remote file name)
        local: Option<PathBuf>,
    },
    /// Create a directory and its parents
    Mkdir { target: String },
    /// Remove an empty directory
    Rmdir { target: String },
    /// Remove a directory with all its contents
    Purge { target: String },
    /// Delete a single file
    Delete { target: String },
    /// Set a file's modification time, creating an empty file if missing
    Touch {
        target: String,
        /// RFC 3339 timestamp (default: now)
        #[arg(long)]
        time: Option<String>,
    },
    /// Print the MD5 of every file below a path
    Md5sum { target: String },
    /// List configured remotes
    Remotes,
}

/// Split `remote:path` into its two halves
fn parse_target(target: &str) -> Result<(&str, &str)> {
    let (remote, path) = target
        .split_once(':')
        .ok_or_else(|| anyhow!("{:?} is not of the form <remote>:<path>", target))?;
    if remote.is_empty() {
        bail!("Missing remote name in {:?}", target);
    }
    Ok((remote, path.trim_matches('/')))
}

/// Parent directory and leaf name of a root-relative path
fn split_leaf(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| "-".to_string())
}

struct App {
    config_path: PathBuf,
}

impl App {
    /// Open the named remote with its filesystem rooted at `root`
    async fn open(&self, remote: &str, root: &str) -> Result<(YandexFs, bool)> {
        let config = load_config(&self.config_path)?;
        let opened = config
            .remote(remote)?
            .open_fs(remote, root)
            .await
            .with_context(|| format!("Failed to open {}:{}", remote, root))?;
        let is_file = opened.root_is_file();
        Ok((opened.into_fs(), is_file))
    }

    async fn ls(&self, target: &str, recursive: bool) -> Result<()> {
        let (remote, path) = parse_target(target)?;
        let (fs, is_file) = self.open(remote, path).await?;
        if is_file {
            let object = fs.new_object(split_leaf(path).1).await?;
            println!("{:>12} {}", object.size(), object.remote());
            return Ok(());
        }
        let depth = if recursive { ListDepth::Full } else { ListDepth::One };
        fs.list("", depth, |item| {
            if let ListItem::Object(object) = item {
                println!("{:>12} {}", object.size(), object.remote());
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn lsd(&self, target: &str) -> Result<()> {
        let (remote, path) = parse_target(target)?;
        let (fs, _) = self.open(remote, path).await?;
        fs.list("", ListDepth::One, |item| {
            if let ListItem::Dir(dir) = item {
                println!("{:>12} {} {}", -1, format_time(dir.modified), dir.name);
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn cat(&self, target: &str) -> Result<()> {
        let (remote, path) = parse_target(target)?;
        let (dir, leaf) = split_leaf(path);
        let (fs, _) = self.open(remote, dir).await?;
        let object = fs.new_object(leaf).await?;
        let mut reader = object.open().await?;
        let mut stdout = tokio::io::stdout();
        tokio::io::copy(&mut reader, &mut stdout).await?;
        stdout.flush().await?;
        Ok(())
    }

    async fn copyto(&self, local: &PathBuf, target: &str) -> Result<()> {
        let (remote, path) = parse_target(target)?;
        let (dir, leaf) = split_leaf(path);
        if leaf.is_empty() {
            bail!("Destination {:?} needs a file name", target);
        }
        let meta = tokio::fs::metadata(local)
            .await
            .with_context(|| format!("Cannot stat {}", local.display()))?;
        let mod_time: DateTime<Utc> = meta.modified()?.into();
        let file = tokio::fs::File::open(local).await?;

        let (fs, _) = self.open(remote, dir).await?;
        let src = SourceInfo::new(leaf, meta.len(), mod_time);
        match fs.put(Box::new(file), &src).await {
            Ok(object) => {
                tracing::info!("Uploaded {} ({} bytes)", object.remote(), object.size());
                Ok(())
            }
            Err(e @ ProviderError::ModTimeNotSet(_)) => {
                tracing::warn!("{}", e);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, target: &str, local: Option<&PathBuf>) -> Result<()> {
        let (remote, path) = parse_target(target)?;
        let (dir, leaf) = split_leaf(path);
        let destination = local.cloned().unwrap_or_else(|| PathBuf::from(leaf));
        let (fs, _) = self.open(remote, dir).await?;
        let object = fs.new_object(leaf).await?;
        let mut reader = object.open().await?;
        let mut file = tokio::fs::File::create(&destination)
            .await
            .with_context(|| format!("Cannot create {}", destination.display()))?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        if let Some(time) = object.mod_time() {
            let std_file = file.into_std().await;
            std_file.set_modified(time.into())?;
        }
        tracing::info!("Downloaded {} bytes to {}", written, destination.display());
        Ok(())
    }

    async fn mkdir(&self, target: &str) -> Result<()> {
        let (remote, path) = parse_target(target)?;
        let (fs, _) = self.open(remote, "").await?;
        fs.mkdir(path).await?;
        Ok(())
    }

    async fn rmdir(&self, target: &str, purge: bool) -> Result<()> {
        let (remote, path) = parse_target(target)?;
        let (fs, _) = self.open(remote, "").await?;
        if purge {
            fs.purge(path).await?;
        } else {
            fs.rmdir(path).await?;
        }
        Ok(())
    }

    async fn delete(&self, target: &str) -> Result<()> {
        let (remote, path) = parse_target(target)?;
        let (dir, leaf) = split_leaf(path);
        let (fs, _) = self.open(remote, dir).await?;
        fs.new_object(leaf).await?.remove().await?;
        Ok(())
    }

    async fn touch(&self, target: &str, time: Option<&str>) -> Result<()> {
        let (remote, path) = parse_target(target)?;
        let (dir, leaf) = split_leaf(path);
        let mod_time = match time {
            Some(value) => parse_time(value).ok_or_else(|| anyhow!("Invalid timestamp {:?}", value))?,
            None => Utc::now(),
        };
        let (fs, _) = self.open(remote, dir).await?;
        match fs.new_object(leaf).await {
            Ok(mut object) => object.set_mod_time(mod_time).await?,
            Err(ProviderError::NotFound(_)) => {
                let src = SourceInfo::new(leaf, 0, mod_time);
                fs.put(Box::new(tokio::io::empty()), &src).await?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn md5sum(&self, target: &str) -> Result<()> {
        let (remote, path) = parse_target(target)?;
        let (fs, _) = self.open(remote, path).await?;
        fs.list("", ListDepth::Full, |item| {
            if let ListItem::Object(object) = item {
                println!("{:<32}  {}", object.hash(HashType::Md5)?, object.remote());
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    fn remotes(&self) -> Result<()> {
        let config = load_config(&self.config_path)?;
        for name in config.remotes.keys() {
            println!("{}:", name);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let app = App {
        config_path: cli.config.clone().unwrap_or_else(default_config_path),
    };

    match &cli.command {
        Commands::Ls { target, recursive } => app.ls(target, *recursive).await,
        Commands::Lsd { target } => app.lsd(target).await,
        Commands::Cat { target } => app.cat(target).await,
        Commands::Copyto { local, target } => app.copyto(local, target).await,
        Commands::Get { target, local } => app.get(target, local.as_ref()).await,
        Commands::Mkdir { target } => app.mkdir(target).await,
        Commands::Rmdir { target } => app.rmdir(target, false).await,
        Commands::Purge { target } => app.rmdir(target, true).await,
        Commands::Delete { target } => app.delete(target).await,
        Commands::Touch { target, time } => app.touch(target, time.as_deref()).await,
        Commands::Md5sum { target } => app.md5sum(target).await,
        Commands::Remotes => app.remotes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("disk:a/b.txt").unwrap(), ("disk", "a/b.txt"));
        assert_eq!(parse_target("disk:/dir/").unwrap(), ("disk", "dir"));
        assert_eq!(parse_target("disk:").unwrap(), ("disk", ""));
        assert!(parse_target("no-colon").is_err());
        assert!(parse_target(":path").is_err());
    }

    #[test]
    fn test_split_leaf() {
        assert_eq!(split_leaf("a/b/c.txt"), ("a/b", "c.txt"));
        assert_eq!(split_leaf("c.txt"), ("", "c.txt"));
        assert_eq!(split_leaf(""), ("", ""));
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["yadisk-cli", "-v", "ls", "-R", "disk:music"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Ls { recursive: true, .. }));

        let cli = Cli::try_parse_from(["yadisk-cli", "touch", "disk:a", "--time", "2020-01-01T00:00:00Z"]).unwrap();
        assert!(matches!(cli.command, Commands::Touch { time: Some(_), .. }));
    }
}
