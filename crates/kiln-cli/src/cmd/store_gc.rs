//! `fspx store-gc` - reap dead GC roots and sweep orphaned blobs

use std::path::Path;

use anyhow::Result;
use kiln_store::Store;

pub fn run(dstore: &Path) -> Result<()> {
    let store = Store::new(dstore);
    let removed = store.clean_garbage()?;
    println!("removed {removed} blobs");
    Ok(())
}
