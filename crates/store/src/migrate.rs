//! Schema creation and first-run seeding.

use rusqlite::Connection;

use cf_domain::error::Result;

use crate::{db_err, Store};

pub(crate) fn run(store: &Store) -> Result<()> {
    data_schema(&store.data()?)?;
    settings_schema(&store.settings_db()?)?;
    accounts_schema(&store.accounts_db()?)?;
    monitors_schema(&store.monitors_db()?)?;
    crate::settings::ensure_defaults(store)?;
    Ok(())
}

fn data_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS workflow (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL,
            content         TEXT NOT NULL,
            exec_type       TEXT NOT NULL DEFAULT 'manual',
            active          INTEGER NOT NULL DEFAULT 0,
            exec_time       TEXT,
            last_run_time   TEXT,
            last_run_status TEXT,
            create_time     TEXT,
            update_time     TEXT
        );
        CREATE TABLE IF NOT EXISTS workflow_history (
            id          TEXT PRIMARY KEY,
            workflow_id TEXT NOT NULL,
            status      TEXT NOT NULL,
            exec_type   TEXT,
            create_time TEXT,
            end_time    TEXT
        );
        CREATE TABLE IF NOT EXISTS cert (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            sha256      TEXT NOT NULL UNIQUE,
            source      TEXT NOT NULL,
            key         TEXT NOT NULL,
            cert        TEXT NOT NULL,
            issuer      TEXT,
            issuer_cert TEXT,
            domains     TEXT,
            history_id  TEXT,
            workflow_id TEXT,
            start_time  TEXT,
            end_time    TEXT,
            end_day     INTEGER,
            create_time TEXT,
            update_time TEXT
        );
        CREATE TABLE IF NOT EXISTS access (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            type        TEXT NOT NULL,
            config      TEXT NOT NULL,
            create_time TEXT,
            update_time TEXT
        );
        CREATE TABLE IF NOT EXISTS report (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            type        TEXT NOT NULL,
            config      TEXT NOT NULL,
            create_time TEXT,
            update_time TEXT
        );
        CREATE TABLE IF NOT EXISTS workflow_deploy (
            workflow_id TEXT NOT NULL,
            node_id     TEXT NOT NULL,
            cert_hash   TEXT,
            status      TEXT,
            PRIMARY KEY (workflow_id, node_id)
        );
        "#,
    )
    .map_err(db_err)
}

fn settings_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key   TEXT PRIMARY KEY,
            value TEXT,
            type  TEXT
        );
        "#,
    )
    .map_err(db_err)
}

fn accounts_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            email       TEXT NOT NULL,
            type        TEXT NOT NULL,
            credentials TEXT,
            Kid         TEXT,
            HmacEncoded TEXT,
            CADirURL    TEXT,
            create_time TEXT,
            update_time TEXT,
            UNIQUE (email, type)
        );
        CREATE TABLE IF NOT EXISTS _eab (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT,
            Kid         TEXT NOT NULL,
            HmacEncoded TEXT NOT NULL,
            ca          TEXT NOT NULL,
            mail        TEXT,
            create_time TEXT,
            update_time TEXT
        );
        "#,
    )
    .map_err(db_err)
}

fn monitors_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS site_monitor (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL,
            site_domain     TEXT NOT NULL,
            report_type     TEXT,
            cycle           INTEGER NOT NULL DEFAULT 1,
            repeat_send_gap INTEGER NOT NULL DEFAULT 10,
            state           TEXT,
            ca              TEXT,
            cert_domain     TEXT,
            end_time        TEXT,
            end_day         INTEGER,
            last_time       TEXT,
            except_end_time TEXT,
            active          INTEGER NOT NULL DEFAULT 1,
            create_time     TEXT,
            update_time     TEXT
        );
        "#,
    )
    .map_err(db_err)
}
