//! Route Classifier
//!
//! Static registry of the platform's page routes. Every request path is classified as
//! public, protected, or unknown, and protected paths are checked against the coarse
//! role → subtree table. The tables are compiled once at startup and never mutated.
//!
//! The tables themselves live in two modules that mirror the access scopes.

/// Routes anyone may visit, logged in or not.
pub mod public;

/// Staff routes, partitioned by role, and each role's dashboard.
pub mod protected;

use std::collections::HashMap;

use crate::{error::RouteTableError, models::Role};

/// Scope
///
/// The access scope a pattern belongs to. A path matching no pattern has no scope and
/// is "unknown"; it is never treated as protected by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Public,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    // Matches exactly one non-empty segment.
    Wildcard,
}

/// RoutePattern
///
/// A compiled path matcher. Patterns use the router's own syntax: `/schools/{id}`, where a
/// `{name}` (or `*`) segment matches any single segment. Empty segments are ignored on
/// both sides, so `/admin/` matches `/admin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
    scope: Scope,
}

impl RoutePattern {
    pub fn parse(pattern: &str, scope: Scope) -> Result<Self, RouteTableError> {
        let invalid = |reason| RouteTableError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let segments = path_segments(pattern)
            .map(|segment| {
                let is_param = segment.len() > 2
                    && segment.starts_with('{')
                    && segment.ends_with('}')
                    && !segment[1..segment.len() - 1].contains(['{', '}']);

                if segment == "*" || is_param {
                    Ok(Segment::Wildcard)
                } else if segment.contains(['{', '}', '*']) {
                    Err(invalid("a wildcard must span a whole segment"))
                } else {
                    Ok(Segment::Literal(segment.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: pattern.to_string(),
            segments,
            scope,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn matches(&self, path: &str) -> bool {
        let mut parts = path_segments(path);
        for segment in &self.segments {
            match (segment, parts.next()) {
                (_, None) => return false,
                (Segment::Literal(expected), Some(actual)) if expected != actual => return false,
                _ => {}
            }
        }
        parts.next().is_none()
    }

    /// True when some concrete path would match both patterns.
    pub fn overlaps(&self, other: &RoutePattern) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Wildcard, _) | (_, Segment::Wildcard) => true,
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                })
    }

    fn same_shape(&self, other: &RoutePattern) -> bool {
        self.segments == other.segments
    }
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// normalize
///
/// Collapses empty segments the same way pattern matching does: `/login/` and
/// `//login` both become `/login`, and `//` becomes `/`.
pub fn normalize(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    for segment in path_segments(path) {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// RouteClassifier
///
/// The compiled route tables. All queries are pure and linear in the number of patterns,
/// which is small and fixed.
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    public: Vec<RoutePattern>,
    protected: Vec<RoutePattern>,
    role_routes: HashMap<Role, Vec<RoutePattern>>,
    dashboards: HashMap<Role, String>,
}

impl RouteClassifier {
    /// new
    ///
    /// Compiles and validates route tables:
    /// - no public pattern may overlap a protected one,
    /// - every pattern granted to a role must also be listed as protected.
    pub fn new(
        public: &[&str],
        protected: &[&str],
        role_routes: &[(Role, &[&str])],
        dashboards: &[(Role, &str)],
    ) -> Result<Self, RouteTableError> {
        let compile = |patterns: &[&str], scope| {
            patterns
                .iter()
                .map(|pattern| RoutePattern::parse(pattern, scope))
                .collect::<Result<Vec<_>, _>>()
        };

        let public = compile(public, Scope::Public)?;
        let protected = compile(protected, Scope::Protected)?;

        for open in &public {
            if let Some(closed) = protected.iter().find(|closed| open.overlaps(closed)) {
                return Err(RouteTableError::Overlap {
                    public: open.as_str().to_string(),
                    protected: closed.as_str().to_string(),
                });
            }
        }

        let mut compiled_roles: HashMap<Role, Vec<RoutePattern>> = HashMap::new();
        for (role, patterns) in role_routes {
            let patterns = compile(*patterns, Scope::Protected)?;
            if let Some(stray) = patterns
                .iter()
                .find(|pattern| !protected.iter().any(|p| p.same_shape(pattern)))
            {
                return Err(RouteTableError::RoleRouteNotProtected {
                    role: *role,
                    pattern: stray.as_str().to_string(),
                });
            }
            compiled_roles.entry(*role).or_default().extend(patterns);
        }

        let dashboards = dashboards
            .iter()
            .map(|(role, path)| (*role, path.to_string()))
            .collect();

        Ok(Self {
            public,
            protected,
            role_routes: compiled_roles,
            dashboards,
        })
    }

    /// standard
    ///
    /// The platform's route tables.
    ///
    /// # Panics
    /// Panics if the built-in tables are inconsistent, so a bad table fails at startup
    /// instead of misrouting requests.
    pub fn standard() -> Self {
        let role_routes = protected::role_routes();
        let protected_routes: Vec<&str> = role_routes
            .iter()
            .flat_map(|(_, patterns)| patterns.iter().copied())
            .collect();

        Self::new(
            public::PUBLIC_ROUTES,
            &protected_routes,
            &role_routes,
            protected::DASHBOARDS,
        )
        .unwrap_or_else(|e| panic!("FATAL: invalid built-in route tables: {e}"))
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|pattern| pattern.matches(path))
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|pattern| pattern.matches(path))
    }

    pub fn is_known(&self, path: &str) -> bool {
        self.is_public(path) || self.is_protected(path)
    }

    pub fn scope(&self, path: &str) -> Option<Scope> {
        self.public
            .iter()
            .chain(&self.protected)
            .find(|pattern| pattern.matches(path))
            .map(RoutePattern::scope)
    }

    /// has_access
    ///
    /// True iff `path` is in the role's route set. A caller without a role has access
    /// to nothing protected.
    pub fn has_access(&self, path: &str, role: Option<Role>) -> bool {
        role.and_then(|role| self.role_routes.get(&role))
            .is_some_and(|patterns| patterns.iter().any(|pattern| pattern.matches(path)))
    }

    pub fn dashboard(&self, role: Option<Role>) -> Option<&str> {
        role.and_then(|role| self.dashboards.get(&role))
            .map(String::as_str)
    }
}
