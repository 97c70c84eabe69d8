// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, IndexCommands, MirrorCommands, RepoCommands};
use reposync::SyncConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let Some(command) = cli.command else {
        println!("Reposync v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'reposync --help' for usage information");
        return Ok(());
    };

    let config = SyncConfig::load(cli.config.as_deref())?;

    match command {
        Commands::Init { db, no_defaults } => commands::cmd_init(&db.resolve(&config), !no_defaults),

        Commands::Repo(repo_cmd) => match repo_cmd {
            RepoCommands::Add {
                name,
                url,
                disabled,
                weight,
                db,
            } => commands::cmd_repo_add(&name, &url, &db.resolve(&config), !disabled, weight),
            RepoCommands::List { all, db } => commands::cmd_repo_list(&db.resolve(&config), all),
            RepoCommands::Remove { name, db } => {
                commands::cmd_repo_remove(&name, &db.resolve(&config))
            }
            RepoCommands::Enable { name, db } => {
                commands::cmd_repo_enable(&name, &db.resolve(&config), true)
            }
            RepoCommands::Disable { name, db } => {
                commands::cmd_repo_enable(&name, &db.resolve(&config), false)
            }
            RepoCommands::Mirror(mirror_cmd) => match mirror_cmd {
                MirrorCommands::Add {
                    name,
                    url,
                    ipfs,
                    location,
                    db,
                } => commands::cmd_mirror_add(&name, &url, ipfs, location, &db.resolve(&config)),
                MirrorCommands::Remove { name, url, db } => {
                    commands::cmd_mirror_remove(&name, &url, &db.resolve(&config))
                }
                MirrorCommands::Enable { name, url, db } => {
                    commands::cmd_mirror_enable(&name, &url, &db.resolve(&config), true)
                }
                MirrorCommands::Disable { name, url, db } => {
                    commands::cmd_mirror_enable(&name, &url, &db.resolve(&config), false)
                }
            },
        },

        Commands::Bootstrap { file, db } => {
            commands::cmd_bootstrap(file.as_deref(), &db.resolve(&config))
        }

        Commands::Update {
            name,
            fingerprint,
            db,
        } => {
            commands::cmd_update(name.as_deref(), fingerprint.as_deref(), &db.resolve(&config), &config)
                .await
        }

        Commands::Fetch {
            repo,
            name,
            sha256,
            size,
            output,
            db,
        } => {
            commands::cmd_fetch(
                &repo,
                &name,
                sha256.as_deref(),
                size,
                output.as_deref(),
                &db.resolve(&config),
                &config,
            )
            .await
        }

        Commands::Index(index_cmd) => match index_cmd {
            IndexCommands::Convert {
                input,
                output,
                locale,
            } => commands::cmd_index_convert(&input, output.as_deref(), &locale),
            IndexCommands::Keygen { name, output, key_id } => {
                commands::cmd_index_keygen(&name, &output, key_id.as_deref())
            }
            IndexCommands::Sign {
                input,
                key,
                output,
                payload_name,
            } => commands::cmd_index_sign(&input, &key, output.as_deref(), payload_name.as_deref()),
            IndexCommands::Verify {
                input,
                payload_name,
                fingerprint,
                certificate,
            } => commands::cmd_index_verify(
                &input,
                payload_name.as_deref(),
                fingerprint.as_deref(),
                certificate.as_deref(),
            ),
        },
    }
}
