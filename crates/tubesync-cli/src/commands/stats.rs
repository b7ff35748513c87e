use anyhow::Result;
use tubesync_store::CatalogStore;

use super::format;

pub fn run(store: &CatalogStore) -> Result<()> {
    let counts = store.row_counts()?;
    format::print_counts(&counts);
    Ok(())
}
