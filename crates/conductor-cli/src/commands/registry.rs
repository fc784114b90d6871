//! Registry browsing commands.

use conductor_core::Config;
use conductor_registry::RegistryStore;

use super::report;
use crate::RegistryAction;

pub async fn handle(action: RegistryAction, config: &Config) -> anyhow::Result<()> {
    let store = RegistryStore::new(&config.registry.root).map_err(report)?;

    match action {
        RegistryAction::Ls { path, filter } => {
            let listing = match filter {
                Some(keyword) => store.filter_list(&path, &keyword).await,
                None => store.list(&path).await,
            }
            .map_err(report)?;

            for dir in &listing.directories {
                println!("{}/", dir);
            }
            for file in &listing.files {
                println!("{}", file);
            }
            if listing.directories.is_empty() && listing.files.is_empty() {
                println!("(empty)");
            }
        }
        RegistryAction::Cat { path } => {
            let content = store.read(&path).await.map_err(report)?;
            println!("{}", content.render_pretty());
        }
    }
    Ok(())
}
