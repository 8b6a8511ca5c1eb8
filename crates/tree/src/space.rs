//! Whitespace stripping rules (`xsl:strip-space` / `xsl:preserve-space`).

use crate::names::{Atom, NameId, NamePool};

/// A name test as it appears in `elements="..."`.
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceTest {
    Name(NameId),
    /// `prefix:*`, stored as the namespace URI.
    Namespace(Atom),
    Any,
}

impl SpaceTest {
    fn priority(&self) -> f64 {
        match self {
            SpaceTest::Name(_) => 0.0,
            SpaceTest::Namespace(_) => -0.25,
            SpaceTest::Any => -0.5,
        }
    }

    fn matches(&self, name: NameId, pool: &NamePool) -> bool {
        match self {
            SpaceTest::Name(n) => *n == name,
            SpaceTest::Namespace(uri) => pool.uri(name) == *uri,
            SpaceTest::Any => true,
        }
    }
}

#[derive(Debug, Clone)]
struct SpaceRule {
    test: SpaceTest,
    strip: bool,
    precedence: i32,
}

#[derive(Debug, Clone, Default)]
pub struct SpaceRules {
    rules: Vec<SpaceRule>,
}

impl SpaceRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, test: SpaceTest, strip: bool, precedence: i32) {
        self.rules.push(SpaceRule {
            test,
            strip,
            precedence,
        });
    }

    pub fn is_empty(&self) -> bool {
        !self.rules.iter().any(|r| r.strip)
    }

    /// Whether whitespace-only text children of an element named `name` are dropped.
    /// The best rule by (precedence, priority) decides; a tie preserves.
    pub fn strips(&self, name: NameId, pool: &NamePool) -> bool {
        let mut best: Option<(i32, f64, bool)> = None;
        for rule in self.rules.iter().filter(|r| r.test.matches(name, pool)) {
            let priority = rule.test.priority();
            best = match best {
                None => Some((rule.precedence, priority, rule.strip)),
                Some((prec, prio, strip)) => {
                    if rule.precedence > prec || (rule.precedence == prec && priority > prio) {
                        Some((rule.precedence, priority, rule.strip))
                    } else if rule.precedence == prec && priority == prio {
                        Some((prec, prio, strip && rule.strip))
                    } else {
                        Some((prec, prio, strip))
                    }
                }
            };
        }
        best.is_some_and(|(_, _, strip)| strip)
    }
}
