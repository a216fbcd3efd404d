//! # Client Store
//!
//! SQLite-backed persistence for everything a client owns: its identity,
//! named friends, and the private halves of its published pre-keys and
//! one-time keys.
//!
//! ```text
//! ┌─────────────────┐
//! │   Application   │
//! └────────┬────────┘
//!          ▼
//! ┌─────────────────┐   identity  — exactly one row (CHECK constraint)
//! │   ClientStore   │   friend    — public key → human name
//! │   (this file)   │   prekey    — public key → private key
//! └────────┬────────┘   onetime   — public key → private key
//!          ▼
//! ┌─────────────────┐
//! │     rusqlite    │   file for production, in-memory for tests
//! └─────────────────┘
//! ```
//!
//! One-time secrets are burned on use: the lookup that feeds a backward
//! exchange deletes the row in the same transaction, so the same one-time
//! key can never complete two handshakes.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::crypto::bundle::{BundlePriv, BundlePub};
use crate::crypto::keys::{ExchangePriv, ExchangePub, IdentityPriv, IdentityPub};
use crate::error::Result;

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS identity (
    id BOOLEAN PRIMARY KEY CONSTRAINT one_row CHECK (id) NOT NULL,
    public BLOB NOT NULL,
    private BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS friend (
    public BLOB PRIMARY KEY NOT NULL,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prekey (
    public BLOB PRIMARY KEY NOT NULL,
    private BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS onetime (
    public BLOB PRIMARY KEY NOT NULL,
    private BLOB NOT NULL
);
";

/// A store for information local to the client application.
pub struct ClientStore {
    conn: Mutex<Connection>,
}

impl ClientStore {
    /// Open or create a store.
    ///
    /// With `None` an in-memory database is used (tests). With a path,
    /// parent directories are created as needed.
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => {
                if let Some(parent) = std::path::Path::new(p).parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(p)?
            }
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ========================================================================
    // IDENTITY
    // ========================================================================

    /// The user's current public identity, if one has been generated.
    pub fn get_identity(&self) -> Result<Option<IdentityPub>> {
        let conn = self.conn.lock();
        let row: Option<Vec<u8>> = conn
            .query_row("SELECT public FROM identity LIMIT 1", [], |row| row.get(0))
            .optional()?;
        row.map(|bytes| IdentityPub::from_bytes(&bytes)).transpose()
    }

    /// The user's current identity pair, if one has been generated.
    pub fn get_full_identity(&self) -> Result<Option<(IdentityPub, IdentityPriv)>> {
        let conn = self.conn.lock();
        let row: Option<(Vec<u8>, Vec<u8>)> = conn
            .query_row(
                "SELECT public, private FROM identity LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(public, private)| {
            Ok((
                IdentityPub::from_bytes(&public)?,
                IdentityPriv::from_bytes(&private)?,
            ))
        })
        .transpose()
    }

    /// Save an identity pair, replacing any existing identity.
    pub fn save_identity(&self, public: &IdentityPub, private: &IdentityPriv) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO identity (id, public, private) VALUES (1, ?1, ?2)",
            params![public.as_bytes().as_slice(), private.to_bytes().as_slice()],
        )?;
        Ok(())
    }

    // ========================================================================
    // FRIENDS
    // ========================================================================

    /// Register a friend by identity and name, replacing any previous name.
    pub fn add_friend(&self, public: &IdentityPub, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO friend (public, name) VALUES (?1, ?2)",
            params![public.as_bytes().as_slice(), name],
        )?;
        Ok(())
    }

    /// Look up a friend's identity by name.
    pub fn get_friend(&self, name: &str) -> Result<Option<IdentityPub>> {
        let conn = self.conn.lock();
        let row: Option<Vec<u8>> = conn
            .query_row(
                "SELECT public FROM friend WHERE name = ?1 LIMIT 1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        row.map(|bytes| IdentityPub::from_bytes(&bytes)).transpose()
    }

    // ========================================================================
    // PRE-KEYS
    // ========================================================================

    /// Save a pre-key pair we have registered with a relay.
    pub fn save_prekey(&self, public: &ExchangePub, private: &ExchangePriv) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO prekey (public, private) VALUES (?1, ?2)",
            params![public.as_bytes().as_slice(), private.to_bytes().as_slice()],
        )?;
        Ok(())
    }

    /// Look up the private half of one of our pre-keys.
    pub fn prekey_secret(&self, public: &ExchangePub) -> Result<Option<ExchangePriv>> {
        let conn = self.conn.lock();
        let row: Option<Vec<u8>> = conn
            .query_row(
                "SELECT private FROM prekey WHERE public = ?1",
                params![public.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        row.map(|bytes| ExchangePriv::from_bytes(&bytes)).transpose()
    }

    // ========================================================================
    // ONE-TIME KEYS
    // ========================================================================

    /// Save a freshly generated bundle's private halves, all or nothing.
    pub fn save_onetime_bundle(&self, public: &BundlePub, private: &BundlePriv) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for i in 0..public.len() {
            tx.execute(
                "INSERT OR REPLACE INTO onetime (public, private) VALUES (?1, ?2)",
                params![
                    public.get(i).as_bytes().as_slice(),
                    private.get(i).to_bytes().as_slice(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Take the private half of one of our one-time keys, burning it.
    ///
    /// The select and delete happen in one transaction; a second call with
    /// the same public key returns `None`.
    pub fn take_onetime_secret(&self, public: &ExchangePub) -> Result<Option<ExchangePriv>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let row: Option<Vec<u8>> = tx
            .query_row(
                "SELECT private FROM onetime WHERE public = ?1",
                params![public.as_bytes().as_slice()],
                |row| row.get(0),
            )
            .optional()?;
        if row.is_some() {
            tx.execute(
                "DELETE FROM onetime WHERE public = ?1",
                params![public.as_bytes().as_slice()],
            )?;
        }
        tx.commit()?;
        row.map(|bytes| ExchangePriv::from_bytes(&bytes)).transpose()
    }

    /// Number of one-time secrets still held locally.
    pub fn count_onetime_secrets(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count =
            conn.query_row("SELECT COUNT(*) FROM onetime", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl std::fmt::Debug for ClientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::bundle::generate_bundle;
    use crate::crypto::keys::{generate_exchange, generate_identity};

    fn store() -> ClientStore {
        ClientStore::open(None).unwrap()
    }

    #[test]
    fn test_identity_round_trip() {
        let store = store();
        assert!(store.get_identity().unwrap().is_none());

        let (public, private) = generate_identity();
        store.save_identity(&public, &private).unwrap();

        assert_eq!(store.get_identity().unwrap(), Some(public));
        let (loaded_pub, loaded_priv) = store.get_full_identity().unwrap().unwrap();
        assert_eq!(loaded_pub, public);
        assert_eq!(loaded_priv.public_key(), public);
    }

    #[test]
    fn test_identity_single_row_replaced() {
        let store = store();
        let (first_pub, first_priv) = generate_identity();
        let (second_pub, second_priv) = generate_identity();

        store.save_identity(&first_pub, &first_priv).unwrap();
        store.save_identity(&second_pub, &second_priv).unwrap();

        // Replacement, not accumulation: only the new identity remains.
        assert_eq!(store.get_identity().unwrap(), Some(second_pub));
        let (_, loaded_priv) = store.get_full_identity().unwrap().unwrap();
        assert_eq!(loaded_priv.public_key(), second_pub);
    }

    #[test]
    fn test_friend_round_trip() {
        let store = store();
        let (friend, _) = generate_identity();

        assert!(store.get_friend("alice").unwrap().is_none());
        store.add_friend(&friend, "alice").unwrap();
        assert_eq!(store.get_friend("alice").unwrap(), Some(friend));
    }

    #[test]
    fn test_prekey_round_trip() {
        let store = store();
        let (public, private) = generate_exchange();
        store.save_prekey(&public, &private).unwrap();

        let loaded = store.prekey_secret(&public).unwrap().unwrap();
        assert_eq!(loaded.public_key().as_bytes(), public.as_bytes());

        let (unknown, _) = generate_exchange();
        assert!(store.prekey_secret(&unknown).unwrap().is_none());
    }

    #[test]
    fn test_onetime_bundle_save_and_burn() {
        let store = store();
        let (public, private) = generate_bundle();
        store.save_onetime_bundle(&public, &private).unwrap();
        assert_eq!(store.count_onetime_secrets().unwrap(), public.len() as i64);

        let key = public.get(17);
        let secret = store.take_onetime_secret(&key).unwrap().unwrap();
        assert_eq!(secret.public_key().as_bytes(), key.as_bytes());

        // Burned: a second take finds nothing.
        assert!(store.take_onetime_secret(&key).unwrap().is_none());
        assert_eq!(
            store.count_onetime_secrets().unwrap(),
            public.len() as i64 - 1
        );
    }
}
