//! Route matching (spec §3 "Route", §4.3)

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct RawRoute {
    path: String,
    method: String,
    function: String,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone)]
pub struct Route {
    pub method: String,
    pub pattern: String,
    pub function: String,
    segments: Vec<Segment>,
}

impl Route {
    fn compile(raw: RawRoute) -> Self {
        let segments = raw
            .path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|segment| {
                if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Placeholder(name.to_string())
                } else {
                    Segment::Literal(segment.to_string())
                }
            })
            .collect();

        Self {
            method: raw.method.to_uppercase(),
            pattern: raw.path,
            function: raw.function,
            segments,
        }
    }

    /// Match the full path, returning captured placeholder values on
    /// success. The method match is case-insensitive (spec §4.3); the path
    /// match is exact segment-for-segment.
    fn matches(&self, method: &str, path: &str) -> Option<HashMap<String, String>> {
        if !self.method.eq_ignore_ascii_case(method) {
            return None;
        }

        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut captures = HashMap::new();
        for (segment, actual) in self.segments.iter().zip(path_segments.iter()) {
            match segment {
                Segment::Literal(lit) if lit == actual => {}
                Segment::Literal(_) => return None,
                Segment::Placeholder(name) => {
                    captures.insert(name.clone(), actual.to_string());
                }
            }
        }

        Some(captures)
    }
}

/// Ordered sequence of routes, scanned linearly; first match wins (spec
/// §4.3). At most one route per `(method, exact_pattern)` (spec §3
/// invariant) is enforced at load time.
pub struct RouteTable {
    routes: Vec<Route>,
}

pub struct RouteMatch<'a> {
    pub function_name: &'a str,
    pub path_params: HashMap<String, String>,
    pub matched_pattern: &'a str,
}

impl RouteTable {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read routes file: {}", path.display()))?;
        let raw: Vec<RawRoute> = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse routes file: {}", path.display()))?;

        let mut seen = std::collections::HashSet::new();
        let mut routes = Vec::with_capacity(raw.len());
        for entry in raw {
            let key = (entry.method.to_uppercase(), entry.path.clone());
            if !seen.insert(key) {
                anyhow::bail!("duplicate route for {} {}", entry.method, entry.path);
            }
            routes.push(Route::compile(entry));
        }

        Ok(Self { routes })
    }

    pub fn matches(&self, method: &str, path: &str) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            route.matches(method, path).map(|path_params| RouteMatch {
                function_name: &route.function,
                path_params,
                matched_pattern: &route.pattern,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(content: &str) -> RouteTable {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        RouteTable::load(f.path()).unwrap()
    }

    #[test]
    fn matches_literal_and_placeholder_segments() {
        let t = table(
            r#"
- path: /api/echo
  method: POST
  function: echo
- path: /api/users/{id}
  method: GET
  function: get_user
"#,
        );

        let m = t.matches("POST", "/api/echo").unwrap();
        assert_eq!(m.function_name, "echo");
        assert!(m.path_params.is_empty());

        let m = t.matches("get", "/api/users/42").unwrap();
        assert_eq!(m.function_name, "get_user");
        assert_eq!(m.path_params.get("id").unwrap(), "42");

        assert!(t.matches("GET", "/api/users/42/extra").is_none());
    }

    #[test]
    fn first_match_wins_and_duplicates_are_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(
            br#"
- path: /x
  method: GET
  function: a
- path: /x
  method: GET
  function: b
"#,
        )
        .unwrap();

        assert!(RouteTable::load(f.path()).is_err());
    }
}
