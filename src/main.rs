//! linewiki - serve a directory of text notes as a line-addressable wiki.

mod cli;
mod config;
mod logger;
mod render;
mod serve;
mod site;
mod store;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use config::WikiConfig;
use render::Renderer;
use serve::serve_wiki;
use site::{Rebuilder, Site};
use std::{
    io::{self, Write},
    sync::Arc,
};
use store::Store;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = WikiConfig::load(&cli)?;

    let renderer = Renderer::from_config(&config.render);
    let site = Site::new(&config, renderer);

    match &cli.command {
        Commands::Render { file } => render_one(&site, file),
        Commands::List => {
            let rebuilder = Rebuilder::new(site, Arc::new(Store::new()));
            rebuilder.rebuild();
            list_pages(rebuilder.store())
        }
        Commands::Serve { .. } => {
            let rebuilder = Arc::new(Rebuilder::new(site, Arc::new(Store::new())));
            rebuilder.rebuild();
            serve_wiki(&config, rebuilder)
        }
    }
}

/// Render one file and print the fragment to stdout.
fn render_one(site: &Site, file: &std::path::Path) -> Result<()> {
    let html = site
        .renderer()
        .render_file(file)
        .with_context(|| format!("Failed to render {}", file.display()))?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{html}")?;
    Ok(())
}

/// Print every page key with its line count, sorted by key.
fn list_pages(store: &Store) -> Result<()> {
    let snapshot = store.snapshot();
    let mut keys: Vec<_> = snapshot.keys().collect();
    keys.sort();

    let mut stdout = io::stdout().lock();
    for key in keys {
        writeln!(stdout, "{}\t{}", snapshot[key].lines, key)?;
    }
    Ok(())
}
