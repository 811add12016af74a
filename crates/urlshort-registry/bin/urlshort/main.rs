mod cli;

use crate::cli::{Command, CLI};
use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use urlshort_registry::{Registry, RegistryError, ShortLink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = CLI::parse();
    let storage = config.storage_settings();

    info!(
        backend = %storage.kind(),
        id_length = config.id_length,
        "starting urlshort"
    );

    let backend = storage
        .open()
        .await
        .context("failed to open storage backend")?;
    let registry = Registry::new(backend, config.registry_settings());

    let outcome = tokio::select! {
        outcome = run(&registry, config.command) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, draining pending deletions");
            Ok(())
        }
    };

    registry
        .shutdown()
        .await
        .context("failed to shut the registry down")?;
    outcome
}

async fn run(registry: &Registry, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Shorten { urls, owner } if urls.len() == 1 => {
            match registry.create(&urls[0], &owner).await {
                Ok(link) => print_link(&link, ""),
                Err(RegistryError::AlreadyExists(link)) => print_link(&link, "existing"),
                Err(err) => return Err(err).context("failed to shorten url"),
            }
        }
        Command::Shorten { urls, owner } => {
            let links = registry
                .create_batch(&urls, &owner)
                .await
                .context("failed to shorten urls")?;
            for link in &links {
                print_link(link, "");
            }
        }
        Command::Resolve { id } => {
            let link = registry.resolve(&id).await?;
            print_link(&link, if link.deleted { "deleted" } else { "" });
        }
        Command::List { owner } => {
            for link in registry.list_by_owner(&owner).await? {
                print_link(&link, "");
            }
        }
        Command::Delete { owner, ids } => {
            let accepted = registry.delete(&ids, &owner);
            info!(requested = ids.len(), accepted, owner = %owner, "deletions queued");
        }
        Command::Ping => {
            registry.ping().await?;
            println!("ok");
        }
    }

    Ok(())
}

fn print_link(link: &ShortLink, note: &str) {
    if note.is_empty() {
        println!("{}\t{}", link.id, link.original_url);
    } else {
        println!("{}\t{}\t({note})", link.id, link.original_url);
    }
}
