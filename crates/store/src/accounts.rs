//! ACME accounts and standalone EAB credentials (`accounts.db`).
//!
//! An account is unique per `(email, ca)`. Its `credentials` column holds
//! the serialized registration (which embeds the ECDSA P-256 account key);
//! EAB kid/hmac and a custom directory URL sit in sibling columns.

use rusqlite::{params, Row};
use serde::Serialize;

use cf_domain::error::{Error, Result};
use cf_domain::now_string;

use crate::{db_err, page_limits, Store};

#[derive(Debug, Clone, Serialize)]
pub struct AccountRow {
    pub id: i64,
    pub email: String,
    /// CA tag; `"Let's Encrypt"` is the stored spelling of `letsencrypt`.
    pub ca: String,
    #[serde(skip_serializing)]
    pub credentials: Option<String>,
    pub kid: Option<String>,
    pub hmac_encoded: Option<String>,
    pub ca_dir_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EabRow {
    pub id: i64,
    pub name: Option<String>,
    pub kid: String,
    pub hmac_encoded: String,
    pub ca: String,
    pub mail: Option<String>,
}

fn map_account(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get("id")?,
        email: row.get("email")?,
        ca: row.get("type")?,
        credentials: row.get("credentials")?,
        kid: row.get("Kid")?,
        hmac_encoded: row.get("HmacEncoded")?,
        ca_dir_url: row.get("CADirURL")?,
    })
}

fn map_eab(row: &Row<'_>) -> rusqlite::Result<EabRow> {
    Ok(EabRow {
        id: row.get("id")?,
        name: row.get("name")?,
        kid: row.get("Kid")?,
        hmac_encoded: row.get("HmacEncoded")?,
        ca: row.get("ca")?,
        mail: row.get("mail")?,
    })
}

impl Store {
    pub fn get_account(&self, email: &str, ca: &str) -> Result<Option<AccountRow>> {
        let conn = self.accounts_db()?;
        let mut stmt = conn
            .prepare("SELECT * FROM accounts WHERE email = ?1 AND type = ?2")
            .map_err(db_err)?;
        let mut rows = stmt.query_map(params![email, ca], map_account).map_err(db_err)?;
        rows.next().transpose().map_err(db_err)
    }

    pub fn add_account(
        &self,
        email: &str,
        ca: &str,
        kid: &str,
        hmac_encoded: &str,
        ca_dir_url: &str,
    ) -> Result<i64> {
        if (ca == "sslcom" || ca == "google") && (kid.is_empty() || hmac_encoded.is_empty()) {
            return Err(Error::Config(format!("{ca} accounts require EAB kid and hmac")));
        }
        if ca == "custom" && ca_dir_url.is_empty() {
            return Err(Error::Config("custom CA accounts require a directory URL".into()));
        }
        let conn = self.accounts_db()?;
        conn.execute(
            "INSERT INTO accounts (email, type, Kid, HmacEncoded, CADirURL, create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![email, ca, kid, hmac_encoded, ca_dir_url, now_string()],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_account(
        &self,
        id: &str,
        email: &str,
        ca: &str,
        kid: &str,
        hmac_encoded: &str,
        ca_dir_url: &str,
    ) -> Result<()> {
        let conn = self.accounts_db()?;
        conn.execute(
            "UPDATE accounts SET email = ?2, type = ?3, Kid = ?4, HmacEncoded = ?5,
                                 CADirURL = ?6, update_time = ?7
             WHERE id = ?1",
            params![id, email, ca, kid, hmac_encoded, ca_dir_url, now_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn delete_account(&self, id: &str) -> Result<()> {
        let conn = self.accounts_db()?;
        conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    /// Persist a freshly registered account's serialized credentials,
    /// creating the row when registration happened without a stored one.
    pub fn save_account_credentials(&self, email: &str, ca: &str, credentials: &str) -> Result<()> {
        let conn = self.accounts_db()?;
        let now = now_string();
        let updated = conn
            .execute(
                "UPDATE accounts SET credentials = ?3, update_time = ?4 WHERE email = ?1 AND type = ?2",
                params![email, ca, credentials, now],
            )
            .map_err(db_err)?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO accounts (email, type, credentials, create_time, update_time)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![email, ca, credentials, now],
            )
            .map_err(db_err)?;
        }
        Ok(())
    }

    pub fn list_accounts(&self, search: &str, page: i64, limit: i64) -> Result<(Vec<AccountRow>, i64)> {
        let conn = self.accounts_db()?;
        let (offset, limit) = page_limits(page, limit);
        let like = format!("%{search}%");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM accounts WHERE email LIKE ?1 OR type LIKE ?1",
                params![like],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        let mut stmt = conn
            .prepare("SELECT * FROM accounts WHERE email LIKE ?1 OR type LIKE ?1 LIMIT ?2, ?3")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![like, offset, limit], map_account)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok((rows, count))
    }

    // ── EAB credentials ─────────────────────────────────────────────

    pub fn get_eab(&self, id: &str) -> Result<Option<EabRow>> {
        let conn = self.accounts_db()?;
        let mut stmt = conn.prepare("SELECT * FROM _eab WHERE id = ?1").map_err(db_err)?;
        let mut rows = stmt.query_map(params![id], map_eab).map_err(db_err)?;
        rows.next().transpose().map_err(db_err)
    }

    pub fn add_eab(&self, name: &str, kid: &str, hmac_encoded: &str, ca: &str, mail: &str) -> Result<i64> {
        let conn = self.accounts_db()?;
        conn.execute(
            "INSERT INTO _eab (name, Kid, HmacEncoded, ca, mail, create_time, update_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![name, kid, hmac_encoded, ca, mail, now_string()],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_eab(&self, id: &str, name: &str, kid: &str, hmac_encoded: &str, ca: &str, mail: &str) -> Result<()> {
        let conn = self.accounts_db()?;
        conn.execute(
            "UPDATE _eab SET name = ?2, Kid = ?3, HmacEncoded = ?4, ca = ?5, mail = ?6, update_time = ?7
             WHERE id = ?1",
            params![id, name, kid, hmac_encoded, ca, mail, now_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn delete_eab(&self, id: &str) -> Result<()> {
        let conn = self.accounts_db()?;
        conn.execute("DELETE FROM _eab WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(())
    }

    pub fn list_eab(&self, ca: &str) -> Result<Vec<EabRow>> {
        let conn = self.accounts_db()?;
        let ca_like = if ca.is_empty() { "%".to_string() } else { ca.to_string() };
        let mut stmt = conn
            .prepare("SELECT * FROM _eab WHERE ca LIKE ?1 ORDER BY update_time DESC")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![ca_like], map_eab)
            .map_err(db_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_store;

    #[test]
    fn email_ca_pair_is_unique() {
        let (_dir, store) = test_store();
        store.add_account("op@example.com", "Let's Encrypt", "", "", "").unwrap();
        assert!(
            store.add_account("op@example.com", "Let's Encrypt", "", "", "").is_err(),
            "(email, ca) must be unique"
        );
        store.add_account("op@example.com", "buypass", "", "", "").unwrap();
    }

    #[test]
    fn eab_required_for_sslcom_and_google() {
        let (_dir, store) = test_store();
        assert!(store.add_account("a@b.c", "sslcom", "", "", "").is_err());
        assert!(store.add_account("a@b.c", "google", "kid", "", "").is_err());
        assert!(store.add_account("a@b.c", "sslcom", "kid", "hmac", "").is_ok());
    }

    #[test]
    fn custom_ca_requires_directory_url() {
        let (_dir, store) = test_store();
        assert!(store.add_account("a@b.c", "custom", "", "", "").is_err());
        assert!(store
            .add_account("a@b.c", "custom", "", "", "https://ca.internal/dir")
            .is_ok());
    }

    #[test]
    fn credentials_upsert_creates_row_when_missing() {
        let (_dir, store) = test_store();
        store.save_account_credentials("new@example.com", "buypass", "{\"id\":1}").unwrap();
        let acc = store.get_account("new@example.com", "buypass").unwrap().unwrap();
        assert_eq!(acc.credentials.as_deref(), Some("{\"id\":1}"));

        store.save_account_credentials("new@example.com", "buypass", "{\"id\":2}").unwrap();
        let acc = store.get_account("new@example.com", "buypass").unwrap().unwrap();
        assert_eq!(acc.credentials.as_deref(), Some("{\"id\":2}"));
    }
}
