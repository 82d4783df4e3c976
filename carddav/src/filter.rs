// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Address book query filters (RFC 6352 §10.5).
//!
//! A [`Filter`] is built once from caller input, validated on construction
//! and serialized into the `<C:filter>` element of an `addressbook-query`
//! REPORT. Two input shapes are accepted:
//!
//! * [`FilterSpec::Simple`]: one condition per property.
//! * [`FilterSpec::Elaborate`]: an ordered list of property filters, each with
//!   any number of conditions combined with AND or OR. The same property may
//!   appear several times.
//!
//! Text conditions use a compact notation: an optional leading `!` negates
//! the match, the needle is enclosed in slashes, and an optional trailing
//! modifier selects the match type (`^` starts-with, `$` ends-with,
//! `=` equals, none for contains). `"!/foo/^"` thus matches values that do
//! not start with `foo`. Matching is always case-insensitive.
//!
//! ```
//! use cardamom_carddav::{Filter, FilterSpec, SimpleCondition};
//!
//! let filter = Filter::new(
//!     FilterSpec::Simple(vec![
//!         ("EMAIL".to_string(), SimpleCondition::Text("/@example.com/$".to_string())),
//!     ]),
//!     false,
//! )?;
//! assert_eq!(filter.prop_filters().len(), 1);
//! # Ok::<(), cardamom_carddav::CardDavError>(())
//! ```

use std::fmt;
use std::str::FromStr;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::CardDavError;
use crate::request::XmlWriter;

/// Collation used for every text match.
pub const COLLATION: &str = "i;unicode-casemap";

/// How a needle is compared against a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// The whole value equals the needle.
    Equals,
    /// The value contains the needle.
    Contains,
    /// The value starts with the needle.
    StartsWith,
    /// The value ends with the needle.
    EndsWith,
}

impl MatchType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::StartsWith => "starts-with",
            Self::EndsWith => "ends-with",
        }
    }
}

/// Whether all or any of a set of conditions must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestType {
    /// Any condition matching is sufficient (OR).
    AnyOf,
    /// All conditions must match (AND).
    AllOf,
}

impl TestType {
    const fn from_match_all(match_all: bool) -> Self {
        if match_all { Self::AllOf } else { Self::AnyOf }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::AnyOf => "anyof",
            Self::AllOf => "allof",
        }
    }
}

/// A text comparison on a property or parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    needle: String,
    match_type: MatchType,
    invert: bool,
}

impl TextMatch {
    /// Creates a text match.
    #[must_use]
    pub fn new(needle: impl Into<String>, match_type: MatchType, invert: bool) -> Self {
        Self {
            needle: needle.into(),
            match_type,
            invert,
        }
    }

    /// Parses the `!/needle/^` notation, attributing errors to `property`.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::Validation`] if `spec` is malformed.
    pub fn parse(spec: &str, property: &str) -> Result<Self, CardDavError> {
        Self::parse_spec(spec).map_err(|reason| CardDavError::validation(property, reason))
    }

    fn parse_spec(spec: &str) -> Result<Self, String> {
        let (invert, rest) = match spec.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };

        let Some(body) = rest.strip_prefix('/') else {
            return Err(format!("text match '{spec}' must start with '/' or '!/'"));
        };
        let Some(end) = body.rfind('/') else {
            return Err(format!("text match '{spec}' lacks the closing '/'"));
        };

        let (needle, modifier) = body.split_at(end);
        let modifier = modifier.strip_prefix('/').unwrap_or(modifier);
        let match_type = match modifier {
            "" => MatchType::Contains,
            "^" => MatchType::StartsWith,
            "$" => MatchType::EndsWith,
            "=" => MatchType::Equals,
            other => return Err(format!("unknown match modifier '{other}' in '{spec}'")),
        };

        Ok(Self::new(needle, match_type, invert))
    }

    /// The text searched for.
    #[must_use]
    pub fn needle(&self) -> &str {
        &self.needle
    }

    /// The comparison applied.
    #[must_use]
    pub const fn match_type(&self) -> MatchType {
        self.match_type
    }

    /// Whether the result of the comparison is negated.
    #[must_use]
    pub const fn invert(&self) -> bool {
        self.invert
    }

    fn write_xml(&self, writer: &mut XmlWriter) -> Result<(), CardDavError> {
        let mut elem = BytesStart::new("C:text-match");
        elem.push_attribute(("collation", COLLATION));
        elem.push_attribute(("match-type", self.match_type.as_str()));
        elem.push_attribute(("negate-condition", if self.invert { "yes" } else { "no" }));
        writer.write_event(Event::Start(elem))?;
        writer.write_event(Event::Text(BytesText::new(&self.needle)))?;
        writer.write_event(Event::End(BytesEnd::new("C:text-match")))?;
        Ok(())
    }
}

impl FromStr for TextMatch {
    type Err = CardDavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, "text-match")
    }
}

impl fmt::Display for TextMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modifier = match self.match_type {
            MatchType::Contains => "",
            MatchType::StartsWith => "^",
            MatchType::EndsWith => "$",
            MatchType::Equals => "=",
        };
        let bang = if self.invert { "!" } else { "" };
        write!(f, "{bang}/{}/{modifier}", self.needle)
    }
}

/// A condition on a property parameter.
///
/// Without a text match, the parameter must not be defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamFilter {
    param: String,
    filter: Option<TextMatch>,
}

impl ParamFilter {
    /// Creates a parameter filter on `param` of `property`.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::Validation`] if the parameter name is empty.
    pub fn new(
        property: &str,
        param: impl Into<String>,
        filter: Option<TextMatch>,
    ) -> Result<Self, CardDavError> {
        let param = param.into();
        if param.trim().is_empty() {
            return Err(CardDavError::validation(property, "empty parameter name"));
        }
        Ok(Self { param, filter })
    }

    /// The parameter name.
    #[must_use]
    pub fn param(&self) -> &str {
        &self.param
    }

    /// The text match, `None` for is-not-defined.
    #[must_use]
    pub const fn filter(&self) -> Option<&TextMatch> {
        self.filter.as_ref()
    }

    fn write_xml(&self, writer: &mut XmlWriter) -> Result<(), CardDavError> {
        let mut elem = BytesStart::new("C:param-filter");
        elem.push_attribute(("name", self.param.as_str()));
        writer.write_event(Event::Start(elem))?;
        match &self.filter {
            Some(text_match) => text_match.write_xml(writer)?,
            None => writer.write_event(Event::Empty(BytesStart::new("C:is-not-defined")))?,
        }
        writer.write_event(Event::End(BytesEnd::new("C:param-filter")))?;
        Ok(())
    }
}

/// One condition of a property filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Match on the property value.
    Text(TextMatch),
    /// Match on one of the property's parameters.
    Param(ParamFilter),
}

impl Condition {
    fn write_xml(&self, writer: &mut XmlWriter) -> Result<(), CardDavError> {
        match self {
            Self::Text(text_match) => text_match.write_xml(writer),
            Self::Param(param_filter) => param_filter.write_xml(writer),
        }
    }
}

/// A filter on a single vCard property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropFilter {
    property: String,
    test: TestType,
    conditions: Option<Vec<Condition>>,
}

impl PropFilter {
    /// Creates a property filter.
    ///
    /// `conditions` is either `None`, meaning the property must not be
    /// defined, or a non-empty list of conditions combined according to
    /// `test`.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::Validation`] if the property name is empty or
    /// `conditions` is an empty list.
    pub fn new(
        property: impl Into<String>,
        test: TestType,
        conditions: Option<Vec<Condition>>,
    ) -> Result<Self, CardDavError> {
        let property = property.into();
        if property.trim().is_empty() {
            return Err(CardDavError::validation(property, "empty property name"));
        }
        if conditions.as_ref().is_some_and(Vec::is_empty) {
            return Err(CardDavError::validation(
                property,
                "condition list must not be empty; use None for is-not-defined",
            ));
        }
        Ok(Self {
            property,
            test,
            conditions,
        })
    }

    /// A filter matching cards without `property`.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::Validation`] if the property name is empty.
    pub fn not_defined(property: impl Into<String>) -> Result<Self, CardDavError> {
        Self::new(property, TestType::AnyOf, None)
    }

    /// The vCard property name.
    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// How the conditions are combined.
    #[must_use]
    pub const fn test(&self) -> TestType {
        self.test
    }

    /// The conditions, `None` for is-not-defined.
    #[must_use]
    pub fn conditions(&self) -> Option<&[Condition]> {
        self.conditions.as_deref()
    }

    fn write_xml(&self, writer: &mut XmlWriter) -> Result<(), CardDavError> {
        let mut elem = BytesStart::new("C:prop-filter");
        elem.push_attribute(("name", self.property.as_str()));
        elem.push_attribute(("test", self.test.as_str()));
        writer.write_event(Event::Start(elem))?;
        match &self.conditions {
            Some(conditions) => {
                for condition in conditions {
                    condition.write_xml(writer)?;
                }
            }
            None => writer.write_event(Event::Empty(BytesStart::new("C:is-not-defined")))?,
        }
        writer.write_event(Event::End(BytesEnd::new("C:prop-filter")))?;
        Ok(())
    }
}

/// Condition of the simple filter form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleCondition {
    /// The property must not be defined.
    NotDefined,
    /// A text match in `!/needle/^` notation.
    Text(String),
    /// A condition on a parameter: `None` for is-not-defined, otherwise a
    /// text match in `!/needle/^` notation.
    Param {
        /// Parameter name.
        name: String,
        /// Text match on the parameter value.
        condition: Option<String>,
    },
}

/// One condition of the elaborate filter form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionSpec {
    /// A text match in `!/needle/^` notation.
    Text(String),
    /// A condition on a parameter.
    Param {
        /// Parameter name.
        name: String,
        /// Text match on the parameter value, `None` for is-not-defined.
        condition: Option<String>,
    },
}

/// The conditions of one property filter in the elaborate form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionGroup {
    /// Conditions in order. An empty list means the property must not be
    /// defined.
    pub conditions: Vec<ConditionSpec>,
    /// Combine the conditions with AND instead of OR.
    pub match_all: bool,
}

/// Caller input a [`Filter`] is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    /// One condition per property.
    Simple(Vec<(String, SimpleCondition)>),
    /// Property filters with several conditions each; a property may repeat.
    Elaborate(Vec<(String, ConditionGroup)>),
}

/// A validated `addressbook-query` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    prop_filters: Vec<PropFilter>,
    test: TestType,
}

impl Filter {
    /// Builds a filter from caller input.
    ///
    /// With `match_all`, a card must satisfy every property filter; otherwise
    /// any one suffices.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::Validation`] naming the offending property if
    /// any part of `spec` is malformed.
    pub fn new(spec: FilterSpec, match_all: bool) -> Result<Self, CardDavError> {
        let prop_filters = match spec {
            FilterSpec::Simple(conditions) => conditions
                .into_iter()
                .map(|(property, condition)| Self::simple_prop_filter(property, condition))
                .collect::<Result<Vec<_>, _>>()?,
            FilterSpec::Elaborate(groups) => groups
                .into_iter()
                .map(|(property, group)| Self::elaborate_prop_filter(property, group))
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(Self::from_prop_filters(prop_filters, match_all))
    }

    /// Builds a filter from already validated property filters.
    #[must_use]
    pub const fn from_prop_filters(prop_filters: Vec<PropFilter>, match_all: bool) -> Self {
        Self {
            prop_filters,
            test: TestType::from_match_all(match_all),
        }
    }

    fn simple_prop_filter(
        property: String,
        condition: SimpleCondition,
    ) -> Result<PropFilter, CardDavError> {
        let condition = match condition {
            SimpleCondition::NotDefined => return PropFilter::not_defined(property),
            SimpleCondition::Text(spec) => Condition::Text(TextMatch::parse(&spec, &property)?),
            SimpleCondition::Param { name, condition } => {
                Self::param_condition(&property, name, condition)?
            }
        };
        PropFilter::new(property, TestType::AnyOf, Some(vec![condition]))
    }

    fn elaborate_prop_filter(
        property: String,
        group: ConditionGroup,
    ) -> Result<PropFilter, CardDavError> {
        if group.conditions.is_empty() {
            return PropFilter::not_defined(property);
        }
        let conditions = group
            .conditions
            .into_iter()
            .map(|spec| match spec {
                ConditionSpec::Text(spec) => {
                    TextMatch::parse(&spec, &property).map(Condition::Text)
                }
                ConditionSpec::Param { name, condition } => {
                    Self::param_condition(&property, name, condition)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        PropFilter::new(
            property,
            TestType::from_match_all(group.match_all),
            Some(conditions),
        )
    }

    fn param_condition(
        property: &str,
        name: String,
        condition: Option<String>,
    ) -> Result<Condition, CardDavError> {
        let text_match = condition
            .map(|spec| TextMatch::parse(&spec, property))
            .transpose()?;
        ParamFilter::new(property, name, text_match).map(Condition::Param)
    }

    /// The property filters in input order.
    #[must_use]
    pub fn prop_filters(&self) -> &[PropFilter] {
        &self.prop_filters
    }

    /// How the property filters are combined.
    #[must_use]
    pub const fn test(&self) -> TestType {
        self.test
    }

    pub(crate) fn write_xml(&self, writer: &mut XmlWriter) -> Result<(), CardDavError> {
        let mut elem = BytesStart::new("C:filter");
        elem.push_attribute(("test", self.test.as_str()));
        if self.prop_filters.is_empty() {
            writer.write_event(Event::Empty(elem))?;
            return Ok(());
        }

        writer.write_event(Event::Start(elem))?;
        for prop_filter in &self.prop_filters {
            prop_filter.write_xml(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new("C:filter")))?;
        Ok(())
    }

    /// Serializes the `<C:filter>` element on its own, with the `C` prefix
    /// bound to the `CardDAV` namespace by the enclosing document.
    ///
    /// # Errors
    ///
    /// Returns an error if XML writing fails.
    pub fn to_xml(&self) -> Result<String, CardDavError> {
        let mut writer = quick_xml::Writer::new(std::io::Cursor::new(Vec::new()));
        self.write_xml(&mut writer)?;
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| CardDavError::Xml(format!("UTF-8 error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple(conditions: Vec<(&str, SimpleCondition)>, match_all: bool) -> Filter {
        let conditions = conditions
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Filter::new(FilterSpec::Simple(conditions), match_all).unwrap()
    }

    #[test]
    fn text_match_parses_negation_and_modifiers() {
        let m: TextMatch = "!/foo/^".parse().unwrap();
        assert!(m.invert());
        assert_eq!(m.match_type(), MatchType::StartsWith);
        assert_eq!(m.needle(), "foo");

        let m: TextMatch = "/abc/".parse().unwrap();
        assert!(!m.invert());
        assert_eq!(m.match_type(), MatchType::Contains);
        assert_eq!(m.needle(), "abc");

        assert_eq!("/x/$".parse::<TextMatch>().unwrap().match_type(), MatchType::EndsWith);
        assert_eq!("/x/=".parse::<TextMatch>().unwrap().match_type(), MatchType::Equals);
    }

    #[test]
    fn text_match_keeps_inner_slashes() {
        let m: TextMatch = "/a/b/=".parse().unwrap();
        assert_eq!(m.needle(), "a/b");
        assert_eq!(m.to_string(), "/a/b/=");
    }

    #[test]
    fn text_match_rejects_malformed_specs() {
        for spec in ["", "foo", "/foo", "!foo/", "/foo/x", "!"] {
            let err = TextMatch::parse(spec, "EMAIL").unwrap_err();
            assert!(
                matches!(&err, CardDavError::Validation { property, .. } if property == "EMAIL"),
                "{spec:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn simple_not_defined_serializes_single_prop_filter() {
        let filter = simple(vec![("EMAIL", SimpleCondition::NotDefined)], false);
        let xml = filter.to_xml().unwrap();
        assert_eq!(
            xml,
            "<C:filter test=\"anyof\"><C:prop-filter name=\"EMAIL\" test=\"anyof\"><C:is-not-defined/></C:prop-filter></C:filter>"
        );
    }

    #[test]
    fn simple_param_condition_serializes_param_filter() {
        let filter = simple(
            vec![(
                "TEL",
                SimpleCondition::Param {
                    name: "TYPE".to_string(),
                    condition: Some("/cell/=".to_string()),
                },
            )],
            true,
        );
        let xml = filter.to_xml().unwrap();
        assert!(xml.starts_with("<C:filter test=\"allof\">"));
        assert!(xml.contains(
            "<C:param-filter name=\"TYPE\"><C:text-match collation=\"i;unicode-casemap\" match-type=\"equals\" negate-condition=\"no\">cell</C:text-match></C:param-filter>"
        ));
    }

    #[test]
    fn param_without_condition_is_not_defined() {
        let filter = simple(
            vec![(
                "EMAIL",
                SimpleCondition::Param {
                    name: "PREF".to_string(),
                    condition: None,
                },
            )],
            false,
        );
        let xml = filter.to_xml().unwrap();
        assert!(xml.contains("<C:param-filter name=\"PREF\"><C:is-not-defined/></C:param-filter>"));
    }

    #[test]
    fn elaborate_form_keeps_order_and_repeated_properties() {
        let spec = FilterSpec::Elaborate(vec![
            (
                "EMAIL".to_string(),
                ConditionGroup {
                    conditions: vec![
                        ConditionSpec::Text("/@example.com/$".to_string()),
                        ConditionSpec::Param {
                            name: "TYPE".to_string(),
                            condition: Some("/work/".to_string()),
                        },
                    ],
                    match_all: true,
                },
            ),
            (
                "EMAIL".to_string(),
                ConditionGroup {
                    conditions: vec![ConditionSpec::Text("!/spam/".to_string())],
                    match_all: false,
                },
            ),
        ]);
        let filter = Filter::new(spec, false).unwrap();
        assert_eq!(filter.prop_filters().len(), 2);
        assert_eq!(filter.prop_filters()[0].test(), TestType::AllOf);
        assert_eq!(filter.prop_filters()[1].test(), TestType::AnyOf);

        let xml = filter.to_xml().unwrap();
        let text_pos = xml.find("@example.com").unwrap();
        let param_pos = xml.find("<C:param-filter").unwrap();
        let spam_pos = xml.find("negate-condition=\"yes\">spam").unwrap();
        assert!(text_pos < param_pos && param_pos < spam_pos);
    }

    #[test]
    fn elaborate_empty_group_means_not_defined() {
        let spec = FilterSpec::Elaborate(vec![("NOTE".to_string(), ConditionGroup::default())]);
        let filter = Filter::new(spec, false).unwrap();
        assert_eq!(filter.prop_filters()[0].conditions(), None);
    }

    #[test]
    fn simple_not_defined_builds_not_defined_prop_filter() {
        let filter = simple(vec![("NICKNAME", SimpleCondition::NotDefined)], true);
        assert_eq!(
            filter.prop_filters(),
            &[PropFilter::not_defined("NICKNAME").unwrap()]
        );
        assert!(PropFilter::not_defined(" ").is_err());
    }

    #[test]
    fn construction_rejects_empty_names() {
        let err = Filter::new(
            FilterSpec::Simple(vec![(" ".to_string(), SimpleCondition::NotDefined)]),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, CardDavError::Validation { .. }));

        let err = Filter::new(
            FilterSpec::Simple(vec![(
                "EMAIL".to_string(),
                SimpleCondition::Param {
                    name: String::new(),
                    condition: None,
                },
            )]),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, CardDavError::Validation { property, .. } if property == "EMAIL"));
    }

    #[test]
    fn prop_filter_rejects_empty_condition_list() {
        let err = PropFilter::new("EMAIL", TestType::AnyOf, Some(Vec::new())).unwrap_err();
        assert!(matches!(err, CardDavError::Validation { property, .. } if property == "EMAIL"));
    }

    #[test]
    fn needle_is_escaped() {
        let filter = simple(vec![("FN", SimpleCondition::Text("/a<b&c/".to_string()))], false);
        assert!(filter.to_xml().unwrap().contains(">a&lt;b&amp;c</C:text-match>"));
    }
}
