//! Removal of pool and wallet directories left behind by interrupted runs

use crate::util::{print_header, print_ok, print_warning};
use anyhow::{bail, Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default client-library working directory, `~/.indy_client`
pub fn default_client_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".indy_client"))
}

/// What [`delete_pool_and_wallet`] did with each directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Deleted(PathBuf),
    Missing(PathBuf),
}

/// Delete `<client_home>/pool/<pool_name>` and
/// `<client_home>/wallet/<wallet_name>`; missing directories are skipped
pub fn delete_pool_and_wallet(
    client_home: &Path,
    pool_name: Option<&str>,
    wallet_name: Option<&str>,
) -> Result<Vec<Removal>> {
    if pool_name.is_none() && wallet_name.is_none() {
        bail!("No pool or wallet name configured; nothing to clean up");
    }

    print_header("\nCheck if the wallet and pool for this test already exist and delete them...\n");

    let targets = [("pool", pool_name), ("wallet", wallet_name)];
    let mut removals = Vec::new();

    for (sub_dir, name) in targets {
        let Some(name) = name else { continue };
        let dir = client_home.join(sub_dir).join(name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(path = %dir.display(), "Deleted");
                removals.push(Removal::Deleted(dir));
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                print_warning(&format!("{} does not exist, skipping", dir.display()));
                removals.push(Removal::Missing(dir));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to delete {}", dir.display()));
            }
        }
    }

    print_ok(&format!(
        "Finished deleting wallet and pool folders in {}",
        client_home.display()
    ));
    Ok(removals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deletes_existing_and_skips_missing() {
        let home = tempfile::tempdir().unwrap();
        let pool_dir = home.path().join("pool").join("perf_pool");
        fs::create_dir_all(&pool_dir).unwrap();
        fs::write(pool_dir.join("perf_pool.txn"), "genesis").unwrap();

        let removals =
            delete_pool_and_wallet(home.path(), Some("perf_pool"), Some("perf_wallet")).unwrap();

        assert_eq!(
            removals,
            vec![
                Removal::Deleted(pool_dir.clone()),
                Removal::Missing(home.path().join("wallet").join("perf_wallet")),
            ]
        );
        assert!(!pool_dir.exists());
    }

    #[test]
    fn test_nothing_configured() {
        let home = tempfile::tempdir().unwrap();
        assert!(delete_pool_and_wallet(home.path(), None, None).is_err());
    }
}
