//! Rule selection before a session starts.
//!
//! Besides category and explicit-name filters, rules can be selected with a
//! small property expression language:
//!
//! ```text
//! cat=social and name~git
//! e_code>200 or m_string!="Not Found"
//! ```
//!
//! Operators are `=`, `!=`, `~` (contains), `<` and `>`. Text comparisons
//! ignore case. `and` binds tighter than `or`.

use crate::error::FilterError;
use kestrel_catalog::SiteRule;
use std::str::FromStr;
use std::sync::Arc;

/// Which rules a session probes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SiteFilter {
    /// Every rule
    #[default]
    All,
    /// Rules in one category
    Category(String),
    /// Rules with one of these names
    Specific(Vec<String>),
    /// Rules matching a property expression
    Expression(FilterExpr),
}

impl SiteFilter {
    /// Parse a property expression into a filter.
    pub fn expression(source: &str) -> Result<Self, FilterError> {
        Ok(Self::Expression(source.parse()?))
    }

    /// Whether `rule` passes the filter.
    #[must_use]
    pub fn matches(&self, rule: &SiteRule) -> bool {
        match self {
            Self::All => true,
            Self::Category(cat) => rule.category.eq_ignore_ascii_case(cat),
            Self::Specific(names) => names.iter().any(|n| rule.name.eq_ignore_ascii_case(n)),
            Self::Expression(expr) => expr.matches(rule),
        }
    }

    /// Select the matching rules, optionally dropping NSFW ones, keeping catalog order.
    #[must_use]
    pub fn select(&self, rules: &[Arc<SiteRule>], exclude_nsfw: bool) -> Vec<Arc<SiteRule>> {
        rules
            .iter()
            .filter(|rule| !(exclude_nsfw && rule.is_nsfw()))
            .filter(|rule| self.matches(rule))
            .cloned()
            .collect()
    }
}

/// Rule property an expression can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    /// Site name
    Name,
    /// Category label
    Category,
    /// URL template
    Uri,
    /// HTTP method
    Method,
    /// Existence status
    ExistenceCode,
    /// Existence body string
    ExistenceString,
    /// Absence status
    AbsenceCode,
    /// Absence body string
    AbsenceString,
}

impl Property {
    fn parse(name: &str) -> Result<Self, FilterError> {
        match name.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "cat" | "category" => Ok(Self::Category),
            "uri" | "url" | "uri_check" => Ok(Self::Uri),
            "method" => Ok(Self::Method),
            "e_code" => Ok(Self::ExistenceCode),
            "e_string" => Ok(Self::ExistenceString),
            "m_code" => Ok(Self::AbsenceCode),
            "m_string" => Ok(Self::AbsenceString),
            _ => Err(FilterError::UnknownProperty(name.to_string())),
        }
    }

    fn value(self, rule: &SiteRule) -> Option<String> {
        match self {
            Self::Name => Some(rule.name.clone()),
            Self::Category => Some(rule.category.clone()),
            Self::Uri => Some(rule.uri_template.clone()),
            Self::Method => Some(rule.method.to_string()),
            Self::ExistenceCode => rule.existence.status().map(|s| s.to_string()),
            Self::ExistenceString => rule.existence.body().map(str::to_string),
            Self::AbsenceCode => rule.absence.status().map(|s| s.to_string()),
            Self::AbsenceString => rule.absence.body().map(str::to_string),
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal, ignoring case
    Eq,
    /// Not equal, ignoring case
    Ne,
    /// Contains, ignoring case
    Contains,
    /// Numerically less than
    Lt,
    /// Numerically greater than
    Gt,
}

/// One `property op value` test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Property tested
    pub property: Property,
    /// Operator
    pub operator: Operator,
    /// Right-hand side
    pub value: String,
}

impl Condition {
    fn matches(&self, rule: &SiteRule) -> bool {
        let actual = self.property.value(rule);
        match self.operator {
            Operator::Eq => actual.is_some_and(|a| a.eq_ignore_ascii_case(&self.value)),
            Operator::Ne => !actual.is_some_and(|a| a.eq_ignore_ascii_case(&self.value)),
            Operator::Contains => actual
                .is_some_and(|a| a.to_lowercase().contains(&self.value.to_lowercase())),
            Operator::Lt | Operator::Gt => {
                let (Some(actual), Ok(expected)) = (
                    actual.and_then(|a| a.parse::<f64>().ok()),
                    self.value.parse::<f64>(),
                ) else {
                    return false;
                };
                if self.operator == Operator::Lt {
                    actual < expected
                } else {
                    actual > expected
                }
            }
        }
    }
}

/// Parsed filter expression in disjunctive normal form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpr {
    /// Alternatives; each is a conjunction of conditions
    pub any_of: Vec<Vec<Condition>>,
}

impl FilterExpr {
    /// Whether `rule` satisfies the expression.
    #[must_use]
    pub fn matches(&self, rule: &SiteRule) -> bool {
        self.any_of
            .iter()
            .any(|all_of| all_of.iter().all(|c| c.matches(rule)))
    }
}

impl FromStr for FilterExpr {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser { source: s, pos: 0 }.parse()
    }
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse(mut self) -> Result<FilterExpr, FilterError> {
        let mut any_of = vec![vec![self.condition()?]];

        loop {
            self.skip_whitespace();
            if self.at_end() {
                break;
            }

            let start = self.pos;
            let word = self.identifier();
            match word.to_ascii_lowercase().as_str() {
                "and" => {
                    let condition = self.condition()?;
                    if let Some(last) = any_of.last_mut() {
                        last.push(condition);
                    }
                }
                "or" => any_of.push(vec![self.condition()?]),
                _ => return Err(self.error_at(start, "expected 'and' or 'or'")),
            }
        }

        Ok(FilterExpr { any_of })
    }

    fn condition(&mut self) -> Result<Condition, FilterError> {
        self.skip_whitespace();
        let start = self.pos;
        let name = self.identifier();
        if name.is_empty() {
            return Err(self.error_at(start, "expected a property name"));
        }
        let property = Property::parse(name)?;

        self.skip_whitespace();
        let operator = self.operator()?;

        self.skip_whitespace();
        let value = self.value()?;

        if matches!(operator, Operator::Lt | Operator::Gt) && value.parse::<f64>().is_err() {
            return Err(FilterError::NotNumeric {
                operator: if operator == Operator::Lt { "<" } else { ">" }.to_string(),
                value,
            });
        }

        Ok(Condition {
            property,
            operator,
            value,
        })
    }

    fn operator(&mut self) -> Result<Operator, FilterError> {
        let source = self.source;
        let rest = &source[self.pos..];
        let (operator, len) = if rest.starts_with("!=") {
            (Operator::Ne, 2)
        } else if rest.starts_with('=') {
            (Operator::Eq, 1)
        } else if rest.starts_with('~') {
            (Operator::Contains, 1)
        } else if rest.starts_with('<') {
            (Operator::Lt, 1)
        } else if rest.starts_with('>') {
            (Operator::Gt, 1)
        } else {
            return Err(self.error_at(self.pos, "expected one of = != ~ < >"));
        };
        self.pos += len;
        Ok(operator)
    }

    fn value(&mut self) -> Result<String, FilterError> {
        let source = self.source;
        let rest = &source[self.pos..];
        let Some(first) = rest.chars().next() else {
            return Err(self.error_at(self.pos, "expected a value"));
        };

        if first == '"' || first == '\'' {
            let body = &rest[1..];
            let Some(end) = body.find(first) else {
                return Err(self.error_at(self.pos, "unterminated quoted value"));
            };
            self.pos += end + 2;
            return Ok(body[..end].to_string());
        }

        let len = rest.find(char::is_whitespace).unwrap_or(rest.len());
        self.pos += len;
        Ok(rest[..len].to_string())
    }

    fn identifier(&mut self) -> &'a str {
        let source = self.source;
        let rest = &source[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn skip_whitespace(&mut self) {
        let source = self.source;
        let rest = &source[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn error_at(&self, position: usize, reason: &str) -> FilterError {
        FilterError::Syntax {
            position,
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_catalog::Catalog;

    fn rules() -> Vec<Arc<SiteRule>> {
        let catalog = Catalog::from_json_str(
            "test",
            r#"{"sites": [
                {"name": "GitHub", "cat": "coding", "uri_check": "https://api.github.com/users/{account}",
                 "e_code": 200, "e_string": "login", "m_code": 404, "m_string": "Not Found"},
                {"name": "GitLab", "cat": "coding", "uri_check": "https://gitlab.com/api/v4/users?username={account}",
                 "e_code": 200, "e_string": "\"id\":", "m_code": 200, "m_string": "[]"},
                {"name": "Mastodon", "cat": "social", "uri_check": "https://mastodon.social/@{account}",
                 "e_code": 200, "e_string": "profile", "m_code": 404, "m_string": "Not Found"},
                {"name": "AdultSite", "cat": "xx NSFW xx", "uri_check": "https://adult.example/{account}",
                 "e_code": 302, "e_string": ""}
            ]}"#,
        )
        .expect("catalog");
        catalog.rules().to_vec()
    }

    fn names(selected: &[Arc<SiteRule>]) -> Vec<&str> {
        selected.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_category_and_specific() {
        let rules = rules();
        assert_eq!(
            names(&SiteFilter::Category("CODING".to_string()).select(&rules, false)),
            vec!["GitHub", "GitLab"]
        );
        assert_eq!(
            names(&SiteFilter::Specific(vec!["mastodon".to_string()]).select(&rules, false)),
            vec!["Mastodon"]
        );
    }

    #[test]
    fn test_exclude_nsfw() {
        let rules = rules();
        assert_eq!(SiteFilter::All.select(&rules, false).len(), 4);
        assert_eq!(
            names(&SiteFilter::All.select(&rules, true)),
            vec!["GitHub", "GitLab", "Mastodon"]
        );
    }

    #[test]
    fn test_expressions() {
        let rules = rules();
        let cases = [
            ("cat=social", vec!["Mastodon"]),
            ("name~git", vec!["GitHub", "GitLab"]),
            ("cat=coding and m_code=404", vec!["GitHub"]),
            ("name=Mastodon or name=GitLab", vec!["GitLab", "Mastodon"]),
            ("e_code>200", vec!["AdultSite"]),
            ("m_code<300", vec!["GitLab"]),
            ("m_string=\"Not Found\" and name!=github", vec!["Mastodon"]),
            ("cat='xx NSFW xx'", vec!["AdultSite"]),
            ("name~lab or cat=social and m_code=404", vec!["GitLab", "Mastodon"]),
        ];

        for (source, expected) in cases {
            let filter = SiteFilter::expression(source).expect("valid expression");
            assert_eq!(names(&filter.select(&rules, false)), expected, "expression {source}");
        }
    }

    #[test]
    fn test_expression_errors() {
        assert!(matches!(
            "colour=red".parse::<FilterExpr>(),
            Err(FilterError::UnknownProperty(_))
        ));
        assert!(matches!(
            "e_code>abc".parse::<FilterExpr>(),
            Err(FilterError::NotNumeric { .. })
        ));
        for source in ["", "name", "name=", "name=a xor cat=b", "name=\"open"] {
            assert!(
                matches!(source.parse::<FilterExpr>(), Err(FilterError::Syntax { .. })),
                "Should fail for: {source:?}"
            );
        }
    }
}
