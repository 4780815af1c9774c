//! `fspx store-check` - verify store integrity

use std::path::Path;

use anyhow::Result;
use kiln_store::Store;

pub fn run(dstore: &Path) -> Result<bool> {
    let store = Store::new(dstore);
    let ok = store.verify_store()?;
    if ok {
        println!("store OK");
    } else {
        println!("store has integrity violations");
    }
    Ok(ok)
}
