use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use riv::branch;
use riv::checkout;
use riv::commit;
use riv::config::split_key;
use riv::diff::{self, DiffTarget};
use riv::error::Error;
use riv::hash::hash_to_hex;
use riv::log;
use riv::merge::{self, MergeOutcome, MergeStrategy};
use riv::remote;
use riv::repository::Repository;
use riv::reset::{self, ResetMode};
use riv::stage;
use riv::status;
use riv::tag;

#[derive(Parser)]
#[command(name = "riv")]
#[command(about = "A file-based version control engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty repository
    Init {
        path: Option<PathBuf>,
    },
    /// Stage files for the next commit
    Add {
        paths: Vec<PathBuf>,
    },
    /// Record the staged snapshot
    Commit {
        #[arg(short = 'm')]
        message: String,
    },
    /// Show staged, unstaged, and untracked paths
    Status,
    /// Show changes between the working tree and the index
    Diff {
        /// Compare the index against HEAD instead
        #[arg(long)]
        staged: bool,
    },
    /// List, create, delete, or rename branches
    Branch {
        /// Name of branch to create (omit to list branches)
        name: Option<String>,

        /// Create at a specific commit or branch instead of HEAD
        #[arg(long)]
        at: Option<String>,

        /// Delete branch (safe: refuses unmerged branches)
        #[arg(short = 'd', long, conflicts_with_all = ["force_delete", "rename_to", "name"])]
        delete: Option<String>,

        /// Force delete branch
        #[arg(short = 'D', long = "force-delete", conflicts_with_all = ["delete", "rename_to", "name"])]
        force_delete: Option<String>,

        /// Rename: riv branch -m old new
        #[arg(short = 'm', long = "rename", num_args = 2, conflicts_with_all = ["delete", "force_delete"])]
        rename_to: Vec<String>,
    },
    /// Switch to a branch, tag, or commit
    Checkout {
        target: String,

        /// Create and switch to a new branch
        #[arg(short = 'b', long)]
        new_branch: bool,

        /// Discard local changes instead of refusing
        #[arg(short, long)]
        force: bool,
    },
    /// Merge a branch into the current one
    Merge {
        branch: String,

        /// Resolve conflicts by keeping our side
        #[arg(long, conflicts_with = "theirs")]
        ours: bool,

        /// Resolve conflicts by taking their side
        #[arg(long)]
        theirs: bool,
    },
    /// Show commit history
    Log {
        #[arg(short = 'n', long, default_value_t = 100)]
        max_count: usize,

        /// Show the patch of each commit
        #[arg(short = 'p', long)]
        patch: bool,
    },
    /// List or create tags; a message makes the tag annotated
    Tag {
        name: Option<String>,
        message: Option<String>,

        /// Delete a tag
        #[arg(short = 'd', long, conflicts_with_all = ["name", "message"])]
        delete: Option<String>,
    },
    /// Manage the remote-URL registry
    Remote {
        #[command(subcommand)]
        action: RemoteAction,
    },
    /// Read or write configuration values
    Config {
        /// section.key
        key: Option<String>,
        value: Option<String>,

        #[arg(long, conflicts_with_all = ["key", "value"])]
        list: bool,

        /// Remove the key instead of setting it
        #[arg(long, conflicts_with = "value")]
        unset: bool,
    },
    /// Move HEAD (and optionally index and workspace) to a commit
    Reset {
        commit: String,

        #[arg(long)]
        soft: bool,
        #[arg(long)]
        mixed: bool,
        #[arg(long)]
        hard: bool,

        /// Allow --hard to discard uncommitted changes
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum RemoteAction {
    Add { name: String, url: String },
    Remove { name: String },
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cwd = PathBuf::from(".");

    match cli.command {
        Commands::Init { path } => {
            let path = path.unwrap_or_else(|| cwd.clone());
            let repo = Repository::init(&path)?;
            println!(
                "Initialized empty riv repository in {}",
                repo.control_dir().display()
            );
        }

        Commands::Add { paths } => {
            let repo = Repository::open(&cwd)?;
            stage::stage(&repo, &paths)?;
        }

        Commands::Commit { message } => {
            let repo = Repository::open(&cwd)?;
            let hash = commit::commit(&repo, &message)?;
            println!("Created commit {}", hash_to_hex(&hash));
        }

        Commands::Status => {
            let repo = Repository::open(&cwd)?;
            status::status(&repo)?;
        }

        Commands::Diff { staged } => {
            let repo = Repository::open(&cwd)?;
            let target = if staged {
                DiffTarget::Staged
            } else {
                DiffTarget::WorkingVsIndex
            };
            diff::diff(&repo, target)?;
        }

        Commands::Branch {
            name,
            at,
            delete,
            force_delete,
            rename_to,
        } => {
            let repo = Repository::open(&cwd)?;
            if let Some(branch) = delete {
                branch::delete(&repo, &branch, false)?;
                println!("deleted branch '{branch}'");
            } else if let Some(branch) = force_delete {
                branch::delete(&repo, &branch, true)?;
                println!("force-deleted branch '{branch}'");
            } else if rename_to.len() == 2 {
                branch::rename(&repo, &rename_to[0], &rename_to[1])?;
                println!("renamed branch '{}' to '{}'", rename_to[0], rename_to[1]);
            } else if let Some(name) = name {
                let hash = branch::create(&repo, &name, at.as_deref())?;
                println!("created branch '{name}' at {}", &hash_to_hex(&hash)[..8]);
            } else {
                branch::list(&repo, &mut std::io::stdout())?;
            }
        }

        Commands::Checkout {
            target,
            new_branch,
            force,
        } => {
            let repo = Repository::open(&cwd)?;
            if new_branch {
                checkout::checkout_new_branch(&repo, &target)?;
                println!("Switched to a new branch '{target}'");
            } else {
                checkout::checkout(&repo, &target, force)?;
                println!("Switched to '{target}'");
            }
        }

        Commands::Merge {
            branch,
            ours,
            theirs,
        } => {
            let repo = Repository::open(&cwd)?;
            let strategy = if ours {
                MergeStrategy::Ours
            } else if theirs {
                MergeStrategy::Theirs
            } else {
                MergeStrategy::Normal
            };
            match merge::merge(&repo, &branch, strategy) {
                Ok(MergeOutcome::AlreadyUpToDate) => println!("Already up to date."),
                Ok(MergeOutcome::FastForward(hash)) => {
                    println!("Fast-forward to {}", &hash_to_hex(&hash)[..8]);
                }
                Ok(MergeOutcome::Merged(hash)) => {
                    println!("Merge made commit {}", &hash_to_hex(&hash)[..8]);
                }
                Err(Error::MergeConflict(paths)) => {
                    let mut err = std::io::stderr();
                    writeln!(err, "Automatic merge failed; fix conflicts and commit.")?;
                    for path in &paths {
                        writeln!(err, "CONFLICT (content): {path}")?;
                    }
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Log { max_count, patch } => {
            let repo = Repository::open(&cwd)?;
            log::log(&repo, &mut std::io::stdout(), max_count, patch)?;
        }

        Commands::Tag {
            name,
            message,
            delete,
        } => {
            let repo = Repository::open(&cwd)?;
            if let Some(name) = delete {
                tag::delete(&repo, &name)?;
                println!("deleted tag '{name}'");
            } else if let Some(name) = name {
                let hash = tag::create(&repo, &name, None, message.as_deref())?;
                println!("created tag '{name}' at {}", &hash_to_hex(&hash)[..8]);
            } else {
                tag::list(&repo, &mut std::io::stdout())?;
            }
        }

        Commands::Remote { action } => {
            let repo = Repository::open(&cwd)?;
            match action {
                RemoteAction::Add { name, url } => remote::add(&repo, &name, &url)?,
                RemoteAction::Remove { name } => remote::remove(&repo, &name)?,
                RemoteAction::List => {
                    for (name, url) in remote::list(&repo)? {
                        println!("{name}\t{url}");
                    }
                }
            }
        }

        Commands::Config {
            key,
            value,
            list,
            unset,
        } => {
            let mut repo = Repository::open(&cwd)?;
            if list {
                for (key, value) in repo.config.list() {
                    println!("{key}={value}");
                }
            } else if let Some(key) = key {
                let (section, k) = split_key(&key)?;
                if unset {
                    repo.config.unset(section, k)?;
                } else if let Some(value) = value {
                    repo.config.set(section, k, &value)?;
                } else {
                    match repo.config.get(section, k) {
                        Some(v) => println!("{v}"),
                        None => std::process::exit(1),
                    }
                }
            } else {
                return Err(Error::InvalidArgument("config needs a key or --list".into()).into());
            }
        }

        Commands::Reset {
            commit,
            soft,
            mixed,
            hard,
            force,
        } => {
            let repo = Repository::open(&cwd)?;
            let mode = match (soft, mixed, hard) {
                (true, false, false) => ResetMode::Soft,
                (false, false, true) => ResetMode::Hard,
                (false, true, false) | (false, false, false) => ResetMode::Mixed,
                _ => {
                    return Err(Error::InvalidArgument(
                        "pick one of --soft, --mixed, --hard".into(),
                    )
                    .into())
                }
            };
            reset::reset(&repo, mode, &commit, force)?;
        }
    }

    Ok(())
}
