//! Query model
//!
//! Queries are immutable values: equality and hashing are structural, which
//! is what the query cache keys on.

use std::fmt;
use std::hash::{Hash, Hasher};

/// A `(field, value)` pair as indexed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Term {
    field: String,
    text: String,
}

impl Term {
    /// Create a term
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Field name
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Indexed value
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

/// How a clause participates in a [`BooleanQuery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    /// Must match
    Must,
    /// Must match, never contributes to scoring
    Filter,
    /// Optional unless the query has no required clause
    Should,
    /// Must not match
    MustNot,
}

impl Occur {
    fn prefix(self) -> &'static str {
        match self {
            Occur::Must => "+",
            Occur::Filter => "#",
            Occur::Should => "",
            Occur::MustNot => "-",
        }
    }
}

/// Score multiplier around another query
///
/// The boost never changes which documents match.
#[derive(Debug, Clone)]
pub struct BoostQuery {
    query: Box<Query>,
    boost: f32,
}

impl BoostQuery {
    /// Wrapped query
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Score multiplier
    pub fn boost(&self) -> f32 {
        self.boost
    }
}

impl PartialEq for BoostQuery {
    fn eq(&self, other: &Self) -> bool {
        self.boost.to_bits() == other.boost.to_bits() && self.query == other.query
    }
}

impl Eq for BoostQuery {}

impl Hash for BoostQuery {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.query.hash(state);
        self.boost.to_bits().hash(state);
    }
}

/// Conjunction/disjunction of clauses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BooleanQuery {
    clauses: Vec<(Occur, Query)>,
}

impl BooleanQuery {
    /// Start building a boolean query
    pub fn builder() -> BooleanQueryBuilder {
        BooleanQueryBuilder::default()
    }

    /// Clauses in insertion order
    pub fn clauses(&self) -> &[(Occur, Query)] {
        &self.clauses
    }

    /// Sub-queries with the given occurrence
    pub fn clauses_with(&self, occur: Occur) -> impl Iterator<Item = &Query> {
        self.clauses
            .iter()
            .filter(move |(o, _)| *o == occur)
            .map(|(_, q)| q)
    }
}

/// Builder for [`BooleanQuery`]
#[derive(Debug, Default)]
pub struct BooleanQueryBuilder {
    clauses: Vec<(Occur, Query)>,
}

impl BooleanQueryBuilder {
    /// Add a clause
    pub fn add(mut self, query: Query, occur: Occur) -> Self {
        self.clauses.push((occur, query));
        self
    }

    /// Add a required clause
    pub fn must(self, query: Query) -> Self {
        self.add(query, Occur::Must)
    }

    /// Add a required, non-scoring clause
    pub fn filter(self, query: Query) -> Self {
        self.add(query, Occur::Filter)
    }

    /// Add an optional clause
    pub fn should(self, query: Query) -> Self {
        self.add(query, Occur::Should)
    }

    /// Add an excluding clause
    pub fn must_not(self, query: Query) -> Self {
        self.add(query, Occur::MustNot)
    }

    /// Finish the query
    pub fn build(self) -> Query {
        Query::Bool(BooleanQuery {
            clauses: self.clauses,
        })
    }
}

/// A query over one index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    /// Every document
    MatchAll,
    /// Documents containing a term
    Term(Term),
    /// Score multiplier around another query
    Boost(BoostQuery),
    /// Constant score around another query
    ConstantScore(Box<Query>),
    /// Boolean combination
    Bool(BooleanQuery),
}

impl Query {
    /// Query matching every document
    pub fn match_all() -> Self {
        Query::MatchAll
    }

    /// Query matching documents with `field == text`
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Term(Term::new(field, text))
    }

    /// Wrap `query` with a score multiplier
    pub fn boost(query: Query, boost: f32) -> Self {
        Query::Boost(BoostQuery {
            query: Box::new(query),
            boost,
        })
    }

    /// Wrap `query` so every match gets the same score
    pub fn constant_score(query: Query) -> Self {
        Query::ConstantScore(Box::new(query))
    }

    /// The wrapped query if this query only affects scores
    pub fn score_wrapped(&self) -> Option<&Query> {
        match self {
            Query::Boost(boost) => Some(boost.query()),
            Query::ConstantScore(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::MatchAll => write!(f, "*:*"),
            Query::Term(term) => write!(f, "{}", term),
            Query::Boost(boost) => write!(f, "({})^{}", boost.query, boost.boost),
            Query::ConstantScore(inner) => write!(f, "ConstantScore({})", inner),
            Query::Bool(bool_query) => {
                write!(f, "(")?;
                for (i, (occur, query)) in bool_query.clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}{}", occur.prefix(), query)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(query: &Query) -> u64 {
        let mut hasher = DefaultHasher::new();
        query.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_structural_equality() {
        let a = Query::term("color", "red");
        let b = Query::term("color", "red");

        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_ne!(a, Query::term("color", "blue"));
    }

    #[test]
    fn test_boost_equality_uses_value() {
        let red = Query::term("color", "red");
        assert_eq!(Query::boost(red.clone(), 2.0), Query::boost(red.clone(), 2.0));
        assert_ne!(Query::boost(red.clone(), 2.0), Query::boost(red, 5.0));
    }

    #[test]
    fn test_score_wrapped() {
        let red = Query::term("color", "red");
        let boosted = Query::boost(Query::constant_score(red.clone()), 3.0);

        let inner = boosted.score_wrapped().unwrap();
        assert_eq!(inner.score_wrapped(), Some(&red));
        assert!(red.score_wrapped().is_none());
    }

    #[test]
    fn test_display() {
        let query = BooleanQuery::builder()
            .must(Query::term("color", "red"))
            .filter(Query::term("size", "xl"))
            .should(Query::match_all())
            .must_not(Query::boost(Query::term("color", "blue"), 2.0))
            .build();

        assert_eq!(
            query.to_string(),
            "(+color:red #size:xl *:* -(color:blue)^2)"
        );
    }
}
