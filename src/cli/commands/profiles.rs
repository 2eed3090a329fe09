//! Profiles command implementation

use anyhow::Result;

use crate::cli::output;
use crate::core::profile::ProfileStore;

/// List the profile names in `store`
pub fn execute(store: &ProfileStore, json: bool) -> Result<()> {
    output::print_names(&store.names(), json)
}
