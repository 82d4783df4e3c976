// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use cardamom_carddav::{AddressbookInfo, CardDavConfig, Discovery};
use clap::{ArgMatches, Command};
use colored::Colorize;

use crate::util::ArgOutputFormat;

#[derive(Debug, Clone, Copy)]
pub struct CmdDiscover {
    pub output_format: ArgOutputFormat,
}

impl CmdDiscover {
    pub const NAME: &str = "discover";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Find the address books of the account")
            .arg(ArgOutputFormat::arg())
    }

    pub fn from(matches: &ArgMatches) -> Self {
        Self {
            output_format: ArgOutputFormat::from(matches),
        }
    }

    pub async fn run(self, config: CardDavConfig) -> Result<(), Box<dyn Error>> {
        tracing::debug!(?self, "discovering address books...");
        let discovery = Discovery::new(config)?;
        let books = discovery.discover_addressbooks().await;
        if books.is_empty() {
            return Err("No address books found".into());
        }

        match self.output_format {
            ArgOutputFormat::Table => {
                for book in &books {
                    println!("{}", format_book(book));
                }
            }
            ArgOutputFormat::Json => {
                let rows: Vec<_> = books.iter().map(BookRow::from).collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        }
        Ok(())
    }
}

fn format_book(book: &AddressbookInfo) -> String {
    match &book.display_name {
        Some(name) => format!("{}\t{}", book.url, name.bold()),
        None => book.url.to_string(),
    }
}

#[derive(Debug, serde::Serialize)]
struct BookRow<'a> {
    url: &'a str,
    display_name: Option<&'a str>,
}

impl<'a> From<&'a AddressbookInfo> for BookRow<'a> {
    fn from(book: &'a AddressbookInfo) -> Self {
        Self {
            url: book.url.as_str(),
            display_name: book.display_name.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_discover() {
        let cmd = Command::new("test").subcommand(CmdDiscover::command());

        let matches = cmd
            .try_get_matches_from(["test", "discover", "--output-format", "json"])
            .unwrap();
        let sub_matches = matches.subcommand_matches("discover").unwrap();
        let parsed = CmdDiscover::from(sub_matches);
        assert_eq!(parsed.output_format, ArgOutputFormat::Json);
    }

    #[test]
    fn test_book_row_json() {
        let book = AddressbookInfo {
            url: url::Url::parse("https://dav.example.com/ab/contacts/").unwrap(),
            display_name: Some("Contacts".to_string()),
        };
        let json = serde_json::to_string(&BookRow::from(&book)).unwrap();
        assert_eq!(
            json,
            r#"{"url":"https://dav.example.com/ab/contacts/","display_name":"Contacts"}"#
        );
    }
}
