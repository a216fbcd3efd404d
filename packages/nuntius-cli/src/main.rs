//! The nuntius command-line front-end.
//!
//! `generate` / `identity` / `add-friend` manage the local identity store,
//! `register` publishes key material to a relay, `server` runs a relay, and
//! `chat` opens an interactive encrypted session with a named friend.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use nuntius_core::api::{ensure_bundle, renew_prekey, ClientApi};
use nuntius_core::error::Result;
use nuntius_core::session::start_chat;
use nuntius_core::store::ClientStore;
use nuntius_core::IdentityPub;

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "nuntius", version, about = "End-to-end encrypted chat over an untrusted relay")]
struct Cli {
    /// Path to the local database
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new identity pair
    Generate {
        /// Overwrite an existing identity
        #[arg(long)]
        force: bool,
    },
    /// Print the current identity
    Identity,
    /// Add a new friend
    AddFriend {
        /// The name of the friend
        name: String,
        /// Their public identity key
        #[arg(value_name = "PUB")]
        public: String,
    },
    /// Register with a relay server
    Register {
        /// The URL used to access the server
        url: String,
    },
    /// Start a relay server
    Server {
        /// The port to use
        #[arg(default_value_t = 1234)]
        port: u16,
    },
    /// Chat with a friend
    Chat {
        /// The URL used to access the server
        url: String,
        /// The name of the friend to chat with
        name: String,
    },
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nuntius=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let database = cli.database.as_deref();
    match cli.command {
        Command::Generate { force } => generate(database, force),
        Command::Identity => identity(database),
        Command::AddFriend { name, public } => add_friend(database, &name, &public),
        Command::Register { url } => register(database, &url).await,
        Command::Server { port } => {
            println!("Listening on port {port}");
            nuntius_relay::run(server_database(database).as_deref(), port).await
        }
        Command::Chat { url, name } => chat(database, &url, &name).await,
    }
}

// ── Database locations ────────────────────────────────────────────────────────

fn default_path(file: &str) -> Option<String> {
    let home = std::env::var_os("HOME")?;
    let mut path = std::path::PathBuf::from(home);
    path.push(".nuntius");
    path.push(file);
    Some(path.to_string_lossy().into_owned())
}

fn client_database(database: Option<&str>) -> Option<String> {
    database
        .map(str::to_string)
        .or_else(|| default_path("client.db"))
}

fn server_database(database: Option<&str>) -> Option<String> {
    database
        .map(str::to_string)
        .or_else(|| default_path("server.db"))
}

fn open_client_store(database: Option<&str>) -> Result<ClientStore> {
    ClientStore::open(client_database(database).as_deref())
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn generate(database: Option<&str>, force: bool) -> Result<()> {
    let store = open_client_store(database)?;

    if let Some(existing) = store.get_identity()? {
        if !force {
            println!("An existing identity exists:");
            println!("{existing}");
            println!("Use `--force` if you want to overwrite this identity.");
            return Ok(());
        }
    }

    let (public, private) = nuntius_core::crypto::generate_identity();
    store.save_identity(&public, &private)?;
    println!("{public}");
    Ok(())
}

fn identity(database: Option<&str>) -> Result<()> {
    let store = open_client_store(database)?;
    match store.get_identity()? {
        Some(public) => println!("{public}"),
        None => {
            println!("No identity found.");
            println!("You can use `nuntius generate` to generate an identity.");
        }
    }
    Ok(())
}

fn add_friend(database: Option<&str>, name: &str, public: &str) -> Result<()> {
    let public = IdentityPub::from_str(public)?;
    let store = open_client_store(database)?;
    store.add_friend(&public, name)
}

async fn register(database: Option<&str>, url: &str) -> Result<()> {
    let store = open_client_store(database)?;
    let Some((public, private)) = store.get_full_identity()? else {
        println!("No identity found.");
        println!("You can use `nuntius generate` to generate an identity.");
        return Ok(());
    };

    let api = ClientApi::new(url);
    let prekey = renew_prekey(&api, &store, &public, &private).await?;
    println!("New Prekey registered:\n  {}", hex::encode(prekey.as_bytes()));

    if ensure_bundle(&api, &store, &public, &private).await? {
        println!("New bundle created.");
    }
    Ok(())
}

async fn chat(database: Option<&str>, url: &str, name: &str) -> Result<()> {
    let store = Arc::new(open_client_store(database)?);
    let Some((public, private)) = store.get_full_identity()? else {
        println!("No identity found.");
        println!("You can use `nuntius generate` to generate an identity.");
        return Ok(());
    };

    let friend = store
        .get_friend(name)?
        .ok_or_else(|| nuntius_core::Error::UnknownFriend(name.to_string()))?;

    let api = ClientApi::new(url);
    if ensure_bundle(&api, &store, &public, &private).await? {
        println!("New bundle created.");
    }

    let (input_tx, input_rx) = mpsc::channel(64);
    let mut incoming = start_chat(url, store, public, private, friend, input_rx).await?;
    println!("Connected.");

    // Forward stdin lines into the session.
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if input_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    while let Some(line) = incoming.recv().await {
        println!("{name}> {line}");
        std::io::stdout().flush()?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// A throwaway database path, removed when dropped.
    struct TempDb(std::path::PathBuf);

    impl TempDb {
        fn new(tag: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "nuntius-cli-test-{tag}-{}.db",
                std::process::id()
            ));
            let _ = std::fs::remove_file(&path);
            Self(path)
        }

        fn as_str(&self) -> &str {
            self.0.to_str().unwrap()
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_generate_refuses_overwrite_without_force() {
        let db = TempDb::new("generate");
        generate(Some(db.as_str()), false).unwrap();

        let first = ClientStore::open(Some(db.as_str()))
            .unwrap()
            .get_identity()
            .unwrap()
            .unwrap();

        // Without --force the identity stays put.
        generate(Some(db.as_str()), false).unwrap();
        let unchanged = ClientStore::open(Some(db.as_str()))
            .unwrap()
            .get_identity()
            .unwrap()
            .unwrap();
        assert_eq!(unchanged, first);

        // With --force both halves are replaced.
        generate(Some(db.as_str()), true).unwrap();
        let store = ClientStore::open(Some(db.as_str())).unwrap();
        let (replaced, replaced_priv) = store.get_full_identity().unwrap().unwrap();
        assert_ne!(replaced, first);
        assert_eq!(replaced_priv.public_key(), replaced);
    }

    #[test]
    fn test_add_friend_round_trip() {
        let db = TempDb::new("friend");
        let (public, _) = nuntius_core::crypto::generate_identity();

        add_friend(Some(db.as_str()), "alice", &public.to_string()).unwrap();

        let store = ClientStore::open(Some(db.as_str())).unwrap();
        assert_eq!(store.get_friend("alice").unwrap(), Some(public));
    }

    #[test]
    fn test_add_friend_rejects_bad_key() {
        let db = TempDb::new("badfriend");
        assert!(add_friend(Some(db.as_str()), "mallory", "not-a-key").is_err());
    }
}
