use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects a set of objects by their labels.
///
/// An empty selector matches everything.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct Selector {
    match_labels: Option<Map>,
    match_expressions: Option<Expressions>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid label selector operator: {0}")]
pub struct InvalidOperator(String);

// === Selector ===

impl Selector {
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels.as_ref()) {
                return false;
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if labels.0.get(k) != Some(v) {
                    return false;
                }
            }
        }

        true
    }

    /// Equality requirements, in key order.
    pub fn match_labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.match_labels
            .iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl TryFrom<&LabelSelector> for Selector {
    type Error = InvalidOperator;

    fn try_from(selector: &LabelSelector) -> Result<Self, Self::Error> {
        let match_expressions = selector
            .match_expressions
            .as_ref()
            .map(|exprs| {
                exprs
                    .iter()
                    .map(Expression::try_from)
                    .collect::<Result<Expressions, _>>()
            })
            .transpose()?;

        Ok(Self {
            match_labels: selector.match_labels.clone(),
            match_expressions,
        })
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

// === Labels ===

impl Labels {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<Option<Map>> for Labels {
    #[inline]
    fn from(labels: Option<Map>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === Expression ===

impl Expression {
    pub fn new(
        key: impl ToString,
        operator: Operator,
        values: impl IntoIterator<Item = impl ToString>,
    ) -> Self {
        Self {
            key: key.to_string(),
            operator,
            values: values.into_iter().map(|v| v.to_string()).collect(),
        }
    }

    fn matches(&self, labels: &Map) -> bool {
        match self.operator {
            Operator::In => labels
                .get(&self.key)
                .map(|v| self.values.contains(v))
                .unwrap_or(false),
            Operator::NotIn => labels
                .get(&self.key)
                .map(|v| !self.values.contains(v))
                .unwrap_or(true),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

impl TryFrom<&LabelSelectorRequirement> for Expression {
    type Error = InvalidOperator;

    fn try_from(req: &LabelSelectorRequirement) -> Result<Self, Self::Error> {
        let operator = match req.operator.as_str() {
            "In" => Operator::In,
            "NotIn" => Operator::NotIn,
            "Exists" => Operator::Exists,
            "DoesNotExist" => Operator::DoesNotExist,
            op => return Err(InvalidOperator(op.to_string())),
        };
        Ok(Self::new(
            &req.key,
            operator,
            req.values.iter().flatten(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    #[test]
    fn test_matches() {
        for (selector, labels, matches, msg) in &[
            (Selector::default(), Labels::default(), true, "empty match"),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(Some(("foo", "bar"))),
                true,
                "exact label match",
            ),
            (
                Selector::from_iter(Some(("foo", "bar"))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "sufficient label match",
            ),
            (
                Selector::from_iter(Some(("foo", ""))),
                Labels::from_iter(Some(("foo", "bar"))),
                false,
                "empty value requires an empty label",
            ),
            (
                Selector::from_iter(Some(("foo", ""))),
                Labels::from_iter(Some(("foo", ""))),
                true,
                "empty value matches an empty label",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::In, ["bar"]))),
                Labels::from_iter(vec![("foo", "bar"), ("bah", "baz")]),
                true,
                "expression match",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::NotIn, ["bar"]))),
                Labels::from_iter(Some(("foo", "bar"))),
                false,
                "not-in excludes",
            ),
            (
                Selector::from_iter(Some(Expression::new("foo", Operator::NotIn, ["bar"]))),
                Labels::default(),
                true,
                "not-in admits missing keys",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    Operator::Exists,
                    None::<String>,
                ))),
                Labels::from_iter(Some(("foo", "x"))),
                true,
                "exists",
            ),
            (
                Selector::from_iter(Some(Expression::new(
                    "foo",
                    Operator::DoesNotExist,
                    None::<String>,
                ))),
                Labels::from_iter(Some(("foo", "x"))),
                false,
                "does not exist",
            ),
        ] {
            assert_eq!(selector.matches(labels), *matches, "{}", msg);
        }
    }

    #[test]
    fn from_label_selector() {
        let selector = LabelSelector {
            match_labels: Some(
                Some(("cluster.x-k8s.io/deployment-name".to_string(), "md".to_string()))
                    .into_iter()
                    .collect(),
            ),
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "pool".to_string(),
                operator: "In".to_string(),
                values: Some(vec!["a".to_string(), "b".to_string()]),
            }]),
        };
        let selector = Selector::try_from(&selector).expect("selector must parse");
        assert!(selector.matches(&Labels::from_iter(vec![
            ("cluster.x-k8s.io/deployment-name", "md"),
            ("pool", "b"),
        ])));
        assert!(!selector.matches(&Labels::from_iter(vec![
            ("cluster.x-k8s.io/deployment-name", "md"),
            ("pool", "c"),
        ])));

        let bad = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "pool".to_string(),
                operator: "Gt".to_string(),
                values: None,
            }]),
            ..Default::default()
        };
        assert_eq!(
            Selector::try_from(&bad),
            Err(InvalidOperator("Gt".to_string()))
        );
    }
}
