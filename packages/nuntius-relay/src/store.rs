//! # Relay Store
//!
//! Durable key distribution state: one signed pre-key row per identity
//! (upsert on renewal) and a multi-set of one-time keys (inserted a bundle
//! at a time, deleted one at a time on dispense).
//!
//! Dispense is select-then-delete inside a single transaction, so any given
//! one-time key is handed out at most once even under concurrent session
//! requests.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use nuntius_core::crypto::bundle::BundlePub;
use nuntius_core::error::Result;
use nuntius_core::{ExchangePub, IdentityPub, Signature};

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS prekey (
    identity BLOB PRIMARY KEY NOT NULL,
    prekey BLOB NOT NULL,
    signature BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS onetime (
    id INTEGER PRIMARY KEY,
    identity BLOB NOT NULL,
    onetime BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS onetime_identity ON onetime (identity);
";

/// The relay's persistent pre-key / one-time-key store.
pub struct RelayStore {
    conn: Mutex<Connection>,
}

impl RelayStore {
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

    /// Upsert the signed pre-key row for an identity.
    pub fn save_prekey(
        &self,
        identity: &IdentityPub,
        prekey: &ExchangePub,
        signature: &Signature,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO prekey (identity, prekey, signature) VALUES (?1, ?2, ?3)",
            params![
                identity.as_bytes().as_slice(),
                prekey.as_bytes().as_slice(),
                signature.as_bytes().as_slice(),
            ],
        )?;
        Ok(())
    }

    /// The signed pre-key registered for an identity, if any.
    pub fn get_prekey(&self, identity: &IdentityPub) -> Result<Option<(ExchangePub, Signature)>> {
        let conn = self.conn.lock();
        let row: Option<(Vec<u8>, Vec<u8>)> = conn
            .query_row(
                "SELECT prekey, signature FROM prekey WHERE identity = ?1",
                params![identity.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        row.map(|(prekey, signature)| {
            Ok((
                ExchangePub::from_bytes(&prekey)?,
                Signature::from_bytes(&signature)?,
            ))
        })
        .transpose()
    }

    /// Insert every key of a bundle for an identity, all or nothing.
    pub fn add_onetimes(&self, identity: &IdentityPub, bundle: &BundlePub) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for i in 0..bundle.len() {
            tx.execute(
                "INSERT INTO onetime (identity, onetime) VALUES (?1, ?2)",
                params![
                    identity.as_bytes().as_slice(),
                    bundle.get(i).as_bytes().as_slice(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Number of one-time keys outstanding for an identity.
    pub fn count_onetimes(&self, identity: &IdentityPub) -> Result<i64> {
        let conn = self.conn.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM onetime WHERE identity = ?1",
            params![identity.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Dispense one one-time key for an identity, burning it.
    ///
    /// Select and delete commit together; on any error the transaction
    /// rolls back and the key stays available.
    pub fn take_onetime(&self, identity: &IdentityPub) -> Result<Option<ExchangePub>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let row: Option<(i64, Vec<u8>)> = tx
            .query_row(
                "SELECT id, onetime FROM onetime WHERE identity = ?1 LIMIT 1",
                params![identity.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let taken = match row {
            Some((row_id, bytes)) => {
                tx.execute("DELETE FROM onetime WHERE id = ?1", params![row_id])?;
                Some(ExchangePub::from_bytes(&bytes)?)
            }
            None => None,
        };
        tx.commit()?;
        Ok(taken)
    }
}

impl std::fmt::Debug for RelayStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nuntius_core::crypto::bundle::generate_bundle;
    use nuntius_core::crypto::keys::{generate_exchange, generate_identity};
    use std::collections::HashSet;

    fn store() -> RelayStore {
        RelayStore::open(None).unwrap()
    }

    #[test]
    fn test_prekey_upsert() {
        let store = store();
        let (identity, id_priv) = generate_identity();

        assert!(store.get_prekey(&identity).unwrap().is_none());

        let (first, _) = generate_exchange();
        let first_sig = id_priv.sign(first.as_bytes());
        store.save_prekey(&identity, &first, &first_sig).unwrap();

        let (second, _) = generate_exchange();
        let second_sig = id_priv.sign(second.as_bytes());
        store.save_prekey(&identity, &second, &second_sig).unwrap();

        // Renewal replaces, it does not accumulate.
        let (stored, stored_sig) = store.get_prekey(&identity).unwrap().unwrap();
        assert_eq!(stored.as_bytes(), second.as_bytes());
        assert_eq!(stored_sig.as_bytes(), second_sig.as_bytes());
    }

    #[test]
    fn test_onetime_burn_exclusivity() {
        let store = store();
        let (identity, _) = generate_identity();
        let (bundle, _) = generate_bundle();
        store.add_onetimes(&identity, &bundle).unwrap();
        assert_eq!(store.count_onetimes(&identity).unwrap(), 64);

        let mut seen = HashSet::new();
        for _ in 0..64 {
            let key = store.take_onetime(&identity).unwrap().unwrap();
            assert!(seen.insert(*key.as_bytes()), "one-time key dispensed twice");
        }

        // Pool exhausted.
        assert!(store.take_onetime(&identity).unwrap().is_none());
        assert_eq!(store.count_onetimes(&identity).unwrap(), 0);
    }

    #[test]
    fn test_onetime_pools_are_per_identity() {
        let store = store();
        let (alice, _) = generate_identity();
        let (bob, _) = generate_identity();
        let (bundle, _) = generate_bundle();
        store.add_onetimes(&alice, &bundle).unwrap();

        assert_eq!(store.count_onetimes(&bob).unwrap(), 0);
        assert!(store.take_onetime(&bob).unwrap().is_none());
        assert_eq!(store.count_onetimes(&alice).unwrap(), 64);
    }
}
