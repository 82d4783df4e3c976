// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use cardamom_carddav::{AddressObject, AddressbookCollection, CardDavClient, CardDavConfig};
use clap::{Arg, ArgAction, ArgMatches, arg, value_parser};
use url::Url;

/// The output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ArgOutputFormat {
    Json,
    Table,
}

impl ArgOutputFormat {
    pub fn arg() -> Arg {
        arg!(--"output-format" <FORMAT> "Output format")
            .value_parser(value_parser!(ArgOutputFormat))
            .default_value("table")
    }

    pub fn from(matches: &ArgMatches) -> Self {
        matches
            .get_one("output-format")
            .copied()
            .unwrap_or(ArgOutputFormat::Table)
    }
}

pub fn arg_collection() -> Arg {
    arg!(collection: <COLLECTION> "Address book URL, absolute or relative to the server")
}

pub fn get_collection(matches: &ArgMatches) -> String {
    matches
        .get_one::<String>("collection")
        .cloned()
        .unwrap_or_default()
}

pub fn arg_props() -> Arg {
    arg!(--prop <NAME> "vCard property to fetch, repeatable; full cards if omitted")
        .required(false)
        .action(ArgAction::Append)
}

pub fn get_props(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>("prop")
        .map(|props| props.cloned().collect())
        .unwrap_or_default()
}

/// Opens the address book at `collection`, resolved against the configured
/// server when relative.
pub fn open_addressbook(
    config: CardDavConfig,
    collection: &str,
) -> Result<AddressbookCollection, Box<dyn Error>> {
    let client = CardDavClient::new(config)?;
    let url = match Url::parse(collection) {
        Ok(url) => url,
        Err(_) => client.base_url()?.join(collection)?,
    };
    Ok(client.addressbook(url))
}

/// A card as printed by the commands.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CardRow {
    pub href: String,
    pub etag: Option<String>,
    pub name: Option<String>,
    pub uid: Option<String>,
}

impl From<&AddressObject> for CardRow {
    fn from(object: &AddressObject) -> Self {
        let card = object.card.as_ref();
        Self {
            href: object.href.to_string(),
            etag: object.etag.as_ref().map(ToString::to_string),
            name: card.and_then(|c| c.formatted_name()).map(str::to_string),
            uid: card.and_then(|c| c.uid()).map(str::to_string),
        }
    }
}

impl CardRow {
    pub fn table_line(&self) -> String {
        format!(
            "{}\t{}",
            self.href,
            self.name.as_deref().unwrap_or("(unnamed)")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command;

    #[test]
    fn test_parse_props() {
        let cmd = Command::new("test").arg(arg_props());
        let matches = cmd
            .try_get_matches_from(["test", "--prop", "FN", "--prop", "EMAIL"])
            .unwrap();
        assert_eq!(get_props(&matches), vec!["FN", "EMAIL"]);

        let cmd = Command::new("test").arg(arg_props());
        let matches = cmd.try_get_matches_from(["test"]).unwrap();
        assert!(get_props(&matches).is_empty());
    }

    #[test]
    fn test_open_relative_collection() {
        let config = CardDavConfig {
            base_url: "https://dav.example.com/dav/".to_string(),
            ..Default::default()
        };
        let abook = open_addressbook(config, "addressbooks/jane/contacts").unwrap();
        assert_eq!(
            abook.url().as_str(),
            "https://dav.example.com/dav/addressbooks/jane/contacts/"
        );
    }

    #[test]
    fn test_open_absolute_collection() {
        let config = CardDavConfig {
            base_url: "example.com".to_string(),
            ..Default::default()
        };
        let abook = open_addressbook(config, "https://other.example.com/ab/").unwrap();
        assert_eq!(abook.url().as_str(), "https://other.example.com/ab/");
    }
}
