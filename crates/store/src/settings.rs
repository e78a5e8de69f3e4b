//! Runtime-mutable settings (`settings.db`).

use rusqlite::params;
use serde::Serialize;

use cf_domain::error::Result;
use cf_domain::now_string;

use crate::{db_err, Store};

/// Keys seeded on first start. `password` is seeded by the CLI, not here,
/// so a fresh install without a password refuses logins.
const DEFAULTS: &[(&str, &str)] = &[
    ("username", "admin"),
    ("secure_entrance", "/login"),
    ("https", "0"),
    ("port", "7979"),
    ("timeout", "86400"),
    ("plugin_dir", "plugins"),
    ("workflow_log_path", "logs"),
];

#[derive(Debug, Clone, Serialize)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
}

impl Store {
    pub fn setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.settings_db()?;
        let mut stmt = conn
            .prepare("SELECT value FROM settings WHERE key = ?1")
            .map_err(db_err)?;
        let mut rows = stmt.query(params![key]).map_err(db_err)?;
        match rows.next().map_err(db_err)? {
            Some(row) => Ok(row.get(0).ok()),
            None => Ok(None),
        }
    }

    /// Setting lookup that swallows errors; for paths consulted on hot
    /// paths where a missing settings file must not abort the caller.
    pub fn setting_or(&self, key: &str, default: &str) -> String {
        match self.setting(key) {
            Ok(Some(v)) if !v.is_empty() => v,
            _ => default.to_string(),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.settings_db()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn settings_all(&self) -> Result<Vec<SettingRow>> {
        let conn = self.settings_db()?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM settings ORDER BY key")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SettingRow {
                    key: row.get(0)?,
                    value: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(db_err)
    }
}

pub(crate) fn ensure_defaults(store: &Store) -> Result<()> {
    let conn = store.settings_db()?;
    for (key, value) in DEFAULTS {
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(db_err)?;
    }
    // Per-install salt for the password digest.
    conn.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES ('salt', ?1)",
        params![random_salt()],
    )
    .map_err(db_err)?;
    conn.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES ('install_time', ?1)",
        params![now_string()],
    )
    .map_err(db_err)?;
    Ok(())
}

fn random_salt() -> String {
    // Hash of a few unpredictable process facts; not a secret key, just a
    // per-install salt.
    let seed = format!(
        "{:?}-{}-{:p}",
        std::time::SystemTime::now(),
        std::process::id(),
        &DEFAULTS
    );
    let mut acc: u64 = 0xcbf2_9ce4_8422_2325;
    for b in seed.bytes() {
        acc ^= b as u64;
        acc = acc.wrapping_mul(0x100_0000_01b3);
    }
    format!("{acc:016x}")
}

#[cfg(test)]
mod tests {
    use crate::test_store;

    #[test]
    fn defaults_are_seeded_once() {
        let (_dir, store) = test_store();
        assert_eq!(store.setting("username").unwrap().as_deref(), Some("admin"));
        let salt = store.setting("salt").unwrap().expect("salt seeded");
        assert_eq!(salt.len(), 16);

        // Reopening must not clobber operator changes.
        store.set_setting("username", "ops").unwrap();
        let store2 = crate::Store::open(store.data_dir()).unwrap();
        assert_eq!(store2.setting("username").unwrap().as_deref(), Some("ops"));
        assert_eq!(store2.setting("salt").unwrap().unwrap(), salt);
    }

    #[test]
    fn setting_or_falls_back() {
        let (_dir, store) = test_store();
        assert_eq!(store.setting_or("no_such_key", "x"), "x");
        assert_eq!(store.setting_or("plugin_dir", "x"), "plugins");
    }
}
