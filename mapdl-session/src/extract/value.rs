//! Scalar retrieval through a sentinel parameter.
//!
//! The engine has no structured output, so a value is read back by storing it
//! in a throwaway parameter and echoing that parameter between two markers in
//! a comment line.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::driver::Session;
use crate::error::{ExtractError, Result};

/// Name of the throwaway parameter used by [`Session::get`].
pub const SENTINEL: &str = "mypar__";

/// Delimits the substituted value in the echoed comment.
const VALUE_MARKER: &str = "__VAL__";

/// A value read back from the engine, as the most specific literal type it parses as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    /// Coerce `text` into an integer, then a float, else keep it as text.
    ///
    /// Surrounding whitespace is ignored and a matching pair of quotes is
    /// removed from text values.
    pub fn coerce(text: &str) -> Self {
        let text = text.trim();
        if let Ok(value) = text.parse::<i64>() {
            return ScalarValue::Integer(value);
        }
        // Rust also accepts "inf" and "NaN"; engine numbers always carry a digit.
        if text.bytes().any(|b| b.is_ascii_digit()) {
            if let Ok(value) = text.parse::<f64>() {
                return ScalarValue::Float(value);
            }
        }
        ScalarValue::Text(unquote(text).to_string())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(value) => Some(*value),
            ScalarValue::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(value) => Some(*value as f64),
            ScalarValue::Float(value) => Some(*value),
            ScalarValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ScalarValue::Text(_))
    }
}

impl FromStr for ScalarValue {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(ScalarValue::coerce(s))
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Integer(value) => write!(f, "{value}"),
            ScalarValue::Float(value) => write!(f, "{value}"),
            ScalarValue::Text(text) => write!(f, "{text}"),
        }
    }
}

fn unquote(text: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}

/// Selectors of an engine `*get` query, in the order the command takes them.
///
/// ```
/// use mapdl_session::extract::GetQuery;
///
/// let query = GetQuery::new("node", "12", "loc").item1_index("x");
/// assert_eq!(query.command("p"), "*get,p,node,12,loc,x,,");
///
/// let count: GetQuery = ("node", "", "count").into();
/// assert_eq!(count.command("p"), "*get,p,node,0,count,,,");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetQuery {
    pub entity: String,
    pub entity_number: String,
    pub item1: String,
    pub item1_index: String,
    pub item2: String,
    pub item2_index: String,
}

impl GetQuery {
    pub fn new(
        entity: impl Into<String>,
        entity_number: impl Into<String>,
        item1: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            entity_number: entity_number.into(),
            item1: item1.into(),
            ..Default::default()
        }
    }

    pub fn item1_index(mut self, index: impl Into<String>) -> Self {
        self.item1_index = index.into();
        self
    }

    pub fn item2(mut self, item: impl Into<String>, index: impl Into<String>) -> Self {
        self.item2 = item.into();
        self.item2_index = index.into();
        self
    }

    /// The `*get` command storing the result in `parameter`.
    ///
    /// An empty entity number is sent as `0`.
    pub fn command(&self, parameter: &str) -> String {
        let entity_number = match self.entity_number.trim() {
            "" => "0",
            number => number,
        };
        format!(
            "*get,{},{},{},{},{},{},{}",
            parameter,
            self.entity,
            entity_number,
            self.item1,
            self.item1_index,
            self.item2,
            self.item2_index
        )
    }
}

impl<E, N, I> From<(E, N, I)> for GetQuery
where
    E: Into<String>,
    N: Into<String>,
    I: Into<String>,
{
    fn from((entity, entity_number, item1): (E, N, I)) -> Self {
        GetQuery::new(entity, entity_number, item1)
    }
}

/// Find the value echoed between markers, searching from the end of `output`
/// so that an echoed copy of the command itself is never picked.
fn echoed_value(output: &str) -> Option<&str> {
    output.lines().rev().find_map(|line| {
        let start = line.find(VALUE_MARKER)? + VALUE_MARKER.len();
        let end = line.rfind(VALUE_MARKER)?;
        (end >= start).then(|| line[start..end].trim())
    })
}

impl Session {
    /// Read one value from the engine database.
    ///
    /// Deletes the sentinel parameter first so a value left over from an
    /// earlier query can never be returned.
    ///
    /// ```rust,no_run
    /// # async fn example(session: &mut mapdl_session::Session) -> Result<(), mapdl_session::Error> {
    /// let nodes = session.get(("node", "", "count")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get(&mut self, query: impl Into<GetQuery>) -> Result<ScalarValue> {
        let query = query.into();
        let command = query.command(SENTINEL);

        self.send(&format!("*del,{SENTINEL}")).await?;
        self.send(&command).await?;
        let response = self
            .send(&format!("/com,{VALUE_MARKER} %{SENTINEL}% {VALUE_MARKER}"))
            .await?;

        let line = echoed_value(&response.output).unwrap_or_default();
        if line.is_empty() || line.contains(SENTINEL) {
            return Err(ExtractError::NoValue {
                query: command,
                line: line.to_string(),
            }
            .into());
        }

        debug!("{} = {}", command, line);
        Ok(ScalarValue::coerce(line))
    }

    /// The engine release, e.g. `15.0`.
    pub async fn version(&mut self) -> Result<ScalarValue> {
        self.get(("active", "", "rev")).await
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::Error;
    use crate::driver::testing::scripted_session;

    #[test]
    fn test_coerce_literals() {
        assert_eq!(ScalarValue::coerce(" 42 "), ScalarValue::Integer(42));
        assert_eq!(ScalarValue::coerce("-3"), ScalarValue::Integer(-3));
        assert_eq!(ScalarValue::coerce("15.0"), ScalarValue::Float(15.0));
        assert_eq!(
            ScalarValue::coerce("0.15000000E+02"),
            ScalarValue::Float(15.0)
        );
        assert_eq!(
            ScalarValue::coerce("'BEAM188'"),
            ScalarValue::Text("BEAM188".into())
        );
        assert_eq!(ScalarValue::coerce("inf"), ScalarValue::Text("inf".into()));
        assert_eq!(ScalarValue::coerce("NaN"), ScalarValue::Text("NaN".into()));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(ScalarValue::Float(3.0).as_i64(), Some(3));
        assert_eq!(ScalarValue::Float(3.5).as_i64(), None);
        assert_eq!(ScalarValue::Integer(2).as_f64(), Some(2.0));
        assert_eq!(ScalarValue::Text("x".into()).as_str(), Some("x"));
        assert!(!ScalarValue::Text("x".into()).is_numeric());
    }

    #[test]
    fn test_scalar_serializes_untagged() {
        let values = vec![
            ScalarValue::Integer(1),
            ScalarValue::Float(0.5),
            ScalarValue::Text("a".into()),
        ];
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[1,0.5,"a"]"#);
    }

    #[test]
    fn test_query_command_keeps_positional_order() {
        let query = GetQuery::new("node", 3.to_string(), "u").item1_index("x").item2("set", "1");
        assert_eq!(query.command(SENTINEL), "*get,mypar__,node,3,u,x,set,1");
    }

    #[test]
    fn test_query_command_sends_empty_entity_number_as_zero() {
        let query: GetQuery = ("active", "", "rev").into();
        assert_eq!(query.command(SENTINEL), "*get,mypar__,active,0,rev,,,");

        let query = GetQuery::new("elem", " ", "count");
        assert_eq!(query.command(SENTINEL), "*get,mypar__,elem,0,count,,,");
    }

    #[test]
    fn test_echoed_value_prefers_last_line() {
        let output = "/com,__VAL__ %mypar__% __VAL__\r\n __VAL__ 12 __VAL__\r\n\r\n BEGIN:\r\n";
        assert_eq!(echoed_value(output), Some("12"));
        assert_eq!(echoed_value(" BEGIN:\r\n"), None);
    }

    #[tokio::test]
    async fn test_get_returns_coerced_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = scripted_session(
            dir.path(),
            vec![
                ("*del,mypar__", vec![" PREP7:\r\n"]),
                ("*get,mypar__,node,0,count,,,", vec![" PARAMETER MYPAR__ = 4.000\r\n PREP7:\r\n"]),
                (
                    "/com,__VAL__ %mypar__% __VAL__",
                    vec![" __VAL__ 4 __VAL__\r\n PREP7:\r\n"],
                ),
            ],
        )
        .await;

        let value = assert_ok!(session.get(("node", "", "count")).await);
        assert_eq!(value, ScalarValue::Integer(4));
    }

    #[tokio::test]
    async fn test_unsubstituted_sentinel_is_no_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = scripted_session(
            dir.path(),
            vec![
                ("*del,mypar__", vec![" BEGIN:\r\n"]),
                (
                    "*get,mypar__,node,99,loc,x,,",
                    vec![" *** WARNING ***\r\n Node 99 is not defined.\r\n\r\n BEGIN:\r\n"],
                ),
                (
                    "/com,__VAL__ %mypar__% __VAL__",
                    vec![" __VAL__ %mypar__% __VAL__\r\n BEGIN:\r\n"],
                ),
            ],
        )
        .await;

        let query = GetQuery::new("node", "99", "loc").item1_index("x");
        let err = assert_err!(session.get(query).await);
        assert!(matches!(err, Error::Extract(ExtractError::NoValue { .. })));
    }
}
