// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::error::Error;

use cardamom_carddav::{CardDavConfig, Filter, FilterSpec, SimpleCondition};
use clap::{ArgAction, ArgMatches, Command, arg, value_parser};

use crate::util::{
    ArgOutputFormat, CardRow, arg_collection, arg_props, get_collection, get_props,
    open_addressbook,
};

#[derive(Debug, Clone)]
pub struct CmdQuery {
    pub collection: String,
    pub filter: Filter,
    pub limit: Option<u32>,
    pub props: Vec<String>,
    pub output_format: ArgOutputFormat,
}

impl CmdQuery {
    pub const NAME: &str = "query";

    pub fn command() -> Command {
        Command::new(Self::NAME)
            .about("Search an address book on the server")
            .arg(arg_collection())
            .arg(
                arg!(-f --filter <FILTER> "Property condition, repeatable")
                    .long_help(
                        "\
Property condition, repeatable. `PROP=SPEC` matches the property value, `PROP;PARAM=SPEC` a \
parameter value, `PROP` or `PROP;PARAM` alone requires it to be absent. SPEC is `/text/` for \
a substring match, followed by `^` to match the start, `$` the end or `=` the whole value; a \
leading `!` negates it.",
                    )
                    .required(true)
                    .action(ArgAction::Append)
                    .value_parser(parse_filter_arg),
            )
            .arg(arg!(--all "Cards must match every condition instead of any"))
            .arg(
                arg!(-l --limit [N] "Maximum number of cards returned")
                    .value_parser(value_parser!(u32)),
            )
            .arg(arg_props())
            .arg(ArgOutputFormat::arg())
    }

    pub fn from(matches: &ArgMatches) -> Result<Self, Box<dyn Error>> {
        let conditions: Vec<(String, SimpleCondition)> = matches
            .get_many::<(String, SimpleCondition)>("filter")
            .map(|c| c.cloned().collect())
            .unwrap_or_default();
        let filter = Filter::new(FilterSpec::Simple(conditions), matches.get_flag("all"))?;

        Ok(Self {
            collection: get_collection(matches),
            filter,
            limit: matches.get_one("limit").copied(),
            props: get_props(matches),
            output_format: ArgOutputFormat::from(matches),
        })
    }

    #[tracing::instrument(skip_all, fields(collection = %self.collection))]
    pub async fn run(self, config: CardDavConfig) -> Result<(), Box<dyn Error>> {
        let abook = open_addressbook(config, &self.collection)?;
        let objects = abook.query(&self.filter, &self.props, self.limit).await?;
        tracing::debug!(count = objects.len(), "query finished");

        let rows: Vec<_> = objects.iter().map(CardRow::from).collect();
        match self.output_format {
            ArgOutputFormat::Table => {
                for row in &rows {
                    println!("{}", row.table_line());
                }
            }
            ArgOutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        }
        Ok(())
    }
}

/// Parses `PROP[;PARAM][=SPEC]` into a simple filter condition.
fn parse_filter_arg(s: &str) -> Result<(String, SimpleCondition), String> {
    let (target, spec) = match s.split_once('=') {
        Some((target, spec)) => (target, Some(spec.to_string())),
        None => (s, None),
    };
    let (property, param) = match target.split_once(';') {
        Some((property, param)) => (property, Some(param)),
        None => (target, None),
    };
    if property.is_empty() {
        return Err(format!("missing property name in `{s}`"));
    }

    let condition = match (param, spec) {
        (Some(""), _) => return Err(format!("missing parameter name in `{s}`")),
        (Some(name), condition) => SimpleCondition::Param {
            name: name.to_string(),
            condition,
        },
        (None, Some(spec)) => SimpleCondition::Text(spec),
        (None, None) => SimpleCondition::NotDefined,
    };
    Ok((property.to_string(), condition))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_arg() {
        assert_eq!(
            parse_filter_arg("EMAIL=/@example.com/$").unwrap(),
            (
                "EMAIL".to_string(),
                SimpleCondition::Text("/@example.com/$".to_string())
            )
        );
        assert_eq!(
            parse_filter_arg("NICKNAME").unwrap(),
            ("NICKNAME".to_string(), SimpleCondition::NotDefined)
        );
        assert_eq!(
            parse_filter_arg("TEL;TYPE=/cell/=").unwrap(),
            (
                "TEL".to_string(),
                SimpleCondition::Param {
                    name: "TYPE".to_string(),
                    condition: Some("/cell/=".to_string()),
                }
            )
        );
        assert_eq!(
            parse_filter_arg("TEL;TYPE").unwrap(),
            (
                "TEL".to_string(),
                SimpleCondition::Param {
                    name: "TYPE".to_string(),
                    condition: None,
                }
            )
        );
        assert!(parse_filter_arg("=x").is_err());
        assert!(parse_filter_arg("TEL;=x").is_err());
    }

    #[test]
    fn test_parse_query() {
        let cmd = Command::new("test").subcommand(CmdQuery::command());

        let matches = cmd
            .try_get_matches_from([
                "test",
                "query",
                "contacts/",
                "-f",
                "FN=/Smith/",
                "-f",
                "EMAIL=/@example.com/$",
                "--all",
                "--limit",
                "5",
            ])
            .unwrap();
        let sub_matches = matches.subcommand_matches("query").unwrap();
        let parsed = CmdQuery::from(sub_matches).unwrap();
        assert_eq!(parsed.collection, "contacts/");
        assert_eq!(parsed.limit, Some(5));
        assert_eq!(parsed.output_format, ArgOutputFormat::Table);
        assert_eq!(parsed.filter.prop_filters().len(), 2);
        assert!(parsed.filter.to_xml().unwrap().contains("test=\"allof\""));
    }

    #[test]
    fn test_parse_query_requires_filter() {
        let cmd = Command::new("test").subcommand(CmdQuery::command());

        let matches = cmd.try_get_matches_from(["test", "query", "contacts/"]);
        assert!(matches.is_err());
    }
}
