//! `fspx store-import` - ingest one file and root a named symlink to it

use std::path::Path;

use anyhow::Result;
use kiln_store::Store;

pub fn run(dstore: &Path, file: &Path, link_name: &Path) -> Result<()> {
    let store = Store::new(dstore);
    let hash = store.copy_to_store(file)?;
    store.link_to_store(link_name, &hash, true, true)?;
    println!("{} -> {hash}", link_name.display());
    Ok(())
}
