// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{BTreeMap, HashMap},
    error::Error,
    path::{Path, PathBuf},
};

use cardamom_carddav::{AddressObject, CardDavConfig, ETag, Href, SyncHandler, synchronize};
use clap::{ArgMatches, Command, ValueHint, arg, value_parser};
use colored::Colorize;
use tokio::fs;

use crate::util::{CardRow, arg_collection, arg_props, get_collection, get_props, open_addressbook};

#[derive(Debug, Clone)]
pub struct CmdSync {
    pub collection: String,
    pub state: Option<PathBuf>,
    pub props: Vec<String>,
}

impl CmdSync {
    pub const NAME: &str = "sync";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Synchronize an address book and print what changed")
            .arg(arg_collection())
            .arg(
                arg!(--state [FILE] "State file holding the sync token and entity tags")
                    .long_help(
                        "\
State file holding the sync token and entity tags of the last run. It is created if missing. \
Without it every run is a full synchronization.",
                    )
                    .value_parser(value_parser!(PathBuf))
                    .value_hint(ValueHint::FilePath),
            )
            .arg(arg_props())
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            collection: get_collection(matches),
            state: matches.get_one("state").cloned(),
            props: get_props(matches),
        }
    }

    pub async fn run(self, config: CardDavConfig) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "synchronizing address book...");
        let mut abook = open_addressbook(config, &self.collection)?;

        let state = match &self.state {
            Some(path) => SyncState::load(path).await?,
            None => SyncState::default(),
        };
        let mut printer = SyncPrinter::new(state);
        let prev_token = printer.state.sync_token.clone();
        let token = synchronize(&mut abook, &mut printer, &self.props, &prev_token).await?;

        printer.state.sync_token = token;
        println!(
            "{} changed, {} deleted",
            printer.changed.to_string().green(),
            printer.deleted.to_string().red()
        );
        if let Some(path) = &self.state {
            printer.state.save(path).await?;
        }
        Ok(())
    }
}

/// What a previous synchronization left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SyncState {
    /// Token returned by the last synchronization.
    #[serde(default)]
    pub sync_token: String,

    /// Entity tags of the known cards, by href.
    #[serde(default)]
    pub etags: BTreeMap<String, String>,
}

impl SyncState {
    /// Loads the state, or an empty one if the file does not exist yet.
    pub async fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(serde_json::from_str(&content)
                .map_err(|e| format!("Invalid state file {}: {}", path.display(), e))?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no state file, running a full synchronization");
                Ok(Self::default())
            }
            Err(e) => Err(format!("Failed to read state file {}: {}", path.display(), e).into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .await
            .map_err(|e| format!("Failed to write state file {}: {}", path.display(), e))?;
        Ok(())
    }
}

/// Applies the changes to the state and prints them.
#[derive(Debug)]
struct SyncPrinter {
    state: SyncState,
    changed: usize,
    deleted: usize,
}

impl SyncPrinter {
    fn new(state: SyncState) -> Self {
        Self {
            state,
            changed: 0,
            deleted: 0,
        }
    }
}

impl SyncHandler for SyncPrinter {
    fn existing_etags(&self) -> HashMap<Href, ETag> {
        self.state
            .etags
            .iter()
            .map(|(href, etag)| (Href::from(href.as_str()), ETag::from(etag.as_str())))
            .collect()
    }

    fn address_object_changed(&mut self, object: &AddressObject) {
        let href = object.href.to_string();
        match &object.etag {
            Some(etag) => self.state.etags.insert(href, etag.to_string()),
            None => self.state.etags.remove(&href),
        };
        self.changed += 1;
        println!("{} {}", "+".green(), CardRow::from(object).table_line());
    }

    fn address_object_deleted(&mut self, href: &Href) {
        self.state.etags.remove(href.as_str());
        self.deleted += 1;
        println!("{} {}", "-".red(), href);
    }

    fn finalize(&mut self) {
        tracing::debug!(
            changed = self.changed,
            deleted = self.deleted,
            "batch finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_sync() {
        let cmd = Command::new("test").subcommand(CmdSync::command());

        let matches = cmd
            .try_get_matches_from(["test", "sync", "contacts/", "--prop", "FN"])
            .unwrap();
        let sub_matches = matches.subcommand_matches("sync").unwrap();
        let parsed = CmdSync::from(sub_matches);
        assert_eq!(parsed.collection, "contacts/");
        assert_eq!(parsed.state, None);
        assert_eq!(parsed.props, vec!["FN"]);
    }

    #[test]
    fn test_printer_tracks_etags() {
        let mut printer = SyncPrinter::new(SyncState {
            sync_token: "t1".to_string(),
            etags: BTreeMap::from([
                ("/ab/a.vcf".to_string(), "\"a1\"".to_string()),
                ("/ab/b.vcf".to_string(), "\"b1\"".to_string()),
            ]),
        });

        let existing = printer.existing_etags();
        assert_eq!(
            existing.get(&Href::from("/ab/a.vcf")),
            Some(&ETag::from("\"a1\""))
        );

        let object = AddressObject::pending(Href::from("/ab/a.vcf"), Some(ETag::from("\"a2\"")));
        printer.address_object_changed(&object);
        printer.address_object_deleted(&Href::from("/ab/b.vcf"));

        assert_eq!(printer.changed, 1);
        assert_eq!(printer.deleted, 1);
        assert_eq!(
            printer.state.etags,
            BTreeMap::from([("/ab/a.vcf".to_string(), "\"a2\"".to_string())])
        );
    }

    #[tokio::test]
    async fn test_state_round_trip_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");

        let missing = SyncState::load(&path).await.unwrap();
        assert_eq!(missing, SyncState::default());

        let state = SyncState {
            sync_token: "http://example.com/sync/3".to_string(),
            etags: BTreeMap::from([("/ab/a.vcf".to_string(), "\"a1\"".to_string())]),
        };
        state.save(&path).await.unwrap();
        assert_eq!(SyncState::load(&path).await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_invalid_state_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();

        let err = SyncState::load(&path).await.unwrap_err();
        assert!(err.to_string().contains("Invalid state file"));
    }
}
