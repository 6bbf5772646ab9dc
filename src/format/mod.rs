//! Literal escaping and placeholder substitution.

use std::borrow::Cow;
use std::collections::BTreeMap;

mod escape;
mod scanner;

use escape::{
    float_literal, hex_literal, instant_literal, instant_text, naive_literal, naive_text,
    quote_identifier, quote_str,
};
use scanner::{Placeholder, rewrite};

use crate::types::{Params, RowValues};

/// Text layout of date/time values, both as literals and as bound parameters.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Literal dialect used when rendering values into SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeStyle {
    /// Backslash escapes inside `'...'`, identifiers in backticks.
    #[default]
    MySql,
    /// Quote doubling inside `'...'`, identifiers in double quotes.
    Standard,
}

impl EscapeStyle {
    fn backslash_escapes(self) -> bool {
        matches!(self, EscapeStyle::MySql)
    }
}

/// Renders values as SQL literals and substitutes them into statement text.
///
/// ```rust
/// use sql_session::prelude::*;
///
/// let fmt = ValueFormatter::new(EscapeStyle::MySql);
/// let sql = fmt.format(
///     "select * from users where name = ? and id = ?",
///     &Params::Positional(vec!["O'Brien".into(), RowValues::Int(7)]),
/// );
/// assert_eq!(sql, "select * from users where name = 'O\\'Brien' and id = 7");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueFormatter<'a> {
    style: EscapeStyle,
    timezone: Option<&'a str>,
}

impl<'a> ValueFormatter<'a> {
    #[must_use]
    pub fn new(style: EscapeStyle) -> Self {
        Self {
            style,
            timezone: None,
        }
    }

    /// Timezone for `TimestampTz` values: `local`, `Z`/`UTC`, or `+HH:MM`.
    #[must_use]
    pub fn with_timezone(mut self, timezone: Option<&'a str>) -> Self {
        self.timezone = timezone;
        self
    }

    #[must_use]
    pub fn style(&self) -> EscapeStyle {
        self.style
    }

    /// Render one value as a literal.
    #[must_use]
    pub fn escape(&self, value: &RowValues) -> String {
        match value {
            RowValues::Null => "NULL".to_string(),
            RowValues::Bool(true) => "TRUE".to_string(),
            RowValues::Bool(false) => "FALSE".to_string(),
            RowValues::Int(i) => i.to_string(),
            RowValues::Float(f) => float_literal(*f),
            RowValues::Text(s) => quote_str(s, self.style),
            RowValues::Timestamp(ts) => naive_literal(ts, self.style),
            RowValues::TimestampTz(ts) => instant_literal(ts, self.timezone, self.style),
            RowValues::JSON(json) => quote_str(&json.to_string(), self.style),
            RowValues::Blob(bytes) => hex_literal(bytes),
        }
    }

    /// Date/time values rendered as the text their literal would contain, so bound and
    /// substituted parameters store the same thing. Other values pass through.
    #[must_use]
    pub fn bind_values<'v>(&self, values: &'v [RowValues]) -> Cow<'v, [RowValues]> {
        if !values
            .iter()
            .any(|v| matches!(v, RowValues::Timestamp(_) | RowValues::TimestampTz(_)))
        {
            return Cow::Borrowed(values);
        }
        Cow::Owned(
            values
                .iter()
                .map(|v| match v {
                    RowValues::Timestamp(ts) => RowValues::Text(naive_text(ts)),
                    RowValues::TimestampTz(ts) => {
                        RowValues::Text(instant_text(ts, self.timezone))
                    }
                    other => other.clone(),
                })
                .collect(),
        )
    }

    /// Quote an identifier such as a table or column name.
    #[must_use]
    pub fn escape_id(&self, name: &str) -> String {
        quote_identifier(name, self.style)
    }

    /// Substitute `params` into `sql`.
    ///
    /// Positional values fill `?` in order (`??` takes the value as an identifier); extra
    /// placeholders are left as written and extra values are ignored. Named values fill
    /// `:name`; names without a value are left as written.
    #[must_use]
    pub fn format<'s>(&self, sql: &'s str, params: &Params) -> Cow<'s, str> {
        match params {
            Params::Named(map) => self.format_named(sql, map),
            other => self.format_positional(sql, other.positional().unwrap_or_default()),
        }
    }

    #[must_use]
    pub fn format_positional<'s>(&self, sql: &'s str, values: &[RowValues]) -> Cow<'s, str> {
        let mut next = values.iter();
        rewrite(sql, self.style.backslash_escapes(), |placeholder| {
            match placeholder {
                Placeholder::Value => next.next().map(|v| self.escape(v)),
                Placeholder::Identifier => next.next().map(|v| match v {
                    RowValues::Text(name) => self.escape_id(name),
                    other => self.escape_id(&self.escape(other)),
                }),
                Placeholder::Named(_) => None,
            }
        })
    }

    #[must_use]
    pub fn format_named<'s>(
        &self,
        sql: &'s str,
        values: &BTreeMap<String, RowValues>,
    ) -> Cow<'s, str> {
        rewrite(sql, self.style.backslash_escapes(), |placeholder| {
            match placeholder {
                Placeholder::Named(name) => values.get(name).map(|v| self.escape(v)),
                Placeholder::Value | Placeholder::Identifier => None,
            }
        })
    }
}
