//! Route resolution.
//!
//! Every entry is tried in registration order. A pattern match is checked
//! against the entry's verbs separately, so a path that exists under other
//! verbs resolves to `405 Method Not Allowed` rather than `404 Not Found`.
//! Cost is linear in the number of routes times their segment count.

use super::{pattern::split_path, table::RouteEntry};
use crate::{query::Params, Method, Verbs};

/// Outcome of resolving one request against a route table.
#[derive(Debug)]
pub enum Resolution<'a, H> {
    /// Entries accepting the method, in registration order, with the merged
    /// path bindings.
    Matched {
        entries: Vec<&'a RouteEntry<H>>,
        params: Params,
    },
    /// Some patterns match the path, none accepts the method. `allowed` is the
    /// union of their verbs.
    MethodNotAllowed { allowed: Verbs },
    NotFound,
}

/// Finds every entry matching `method` and `path`.
///
/// The first matching entry binds the parameters; later matches only add
/// names that are not bound yet.
pub fn resolve<'a, H>(entries: &'a [RouteEntry<H>], method: Method, path: &str) -> Resolution<'a, H> {
    let segments = split_path(path);

    let mut matched = Vec::new();
    let mut params = Params::new();
    let mut allowed = Verbs::NONE;

    for entry in entries {
        let Some(bindings) = entry.pattern.matches(&segments) else {
            continue;
        };

        if !entry.verbs.contains(method) {
            allowed = allowed.union(entry.verbs);
            continue;
        }

        for (name, value) in bindings.iter() {
            params.insert_if_absent(name, value);
        }
        matched.push(entry);
    }

    match (matched.is_empty(), allowed.is_empty()) {
        (false, _) => Resolution::Matched {
            entries: matched,
            params,
        },
        (true, false) => Resolution::MethodNotAllowed { allowed },
        (true, true) => Resolution::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{pattern::WILDCARD_KEY, RouteTable};

    fn table(routes: &[(&'static str, Verbs)]) -> RouteTable<usize> {
        let mut table = RouteTable::new();
        for (index, (pattern, verbs)) in routes.iter().enumerate() {
            table.register(pattern, *verbs, index).unwrap();
        }
        table
    }

    fn matched(resolution: Resolution<'_, usize>) -> (Vec<usize>, Params) {
        match resolution {
            Resolution::Matched { entries, params } => {
                (entries.iter().map(|e| e.handler).collect(), params)
            }
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn first_registered_runs_first() {
        let table = table(&[("/a/:x", Verbs::ALL), ("/a/b", Verbs::ALL)]);

        let (order, params) = matched(table.match_all(Method::Get, "/a/b"));
        assert_eq!(order, [0, 1]);
        assert_eq!(params.get("x"), Some("b"));
    }

    #[test]
    fn later_matches_only_add_new_bindings() {
        let table = table(&[
            ("/*", Verbs::ALL),
            ("/users/:id", Verbs::of(Method::Get)),
            ("/:kind/:id", Verbs::of(Method::Get)),
            ("/users/:name", Verbs::of(Method::Post)),
        ]);

        let (order, params) = matched(table.match_all(Method::Get, "/users/42"));
        assert_eq!(order, [0, 1, 2]);
        assert_eq!(params.get(WILDCARD_KEY), Some("users/42"));
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("kind"), Some("users"));
        assert_eq!(params.get("name"), None);
    }

    #[test]
    fn not_found_vs_method_not_allowed() {
        let table = table(&[
            ("/users", Verbs::of(Method::Get)),
            ("/users", Method::Post | Method::Put),
            ("/files/*", Verbs::of(Method::Get)),
        ]);

        assert!(matches!(
            table.match_all(Method::Get, "/missing"),
            Resolution::NotFound
        ));

        match table.match_all(Method::Delete, "/users") {
            Resolution::MethodNotAllowed { allowed } => {
                assert_eq!(allowed, Method::Get | Method::Post | Method::Put);
                assert_eq!(allowed.to_header_value(), "GET, POST, PUT");
            }
            other => panic!("expected 405, got {other:?}"),
        }

        let (order, _) = matched(table.match_all(Method::Put, "/users"));
        assert_eq!(order, [1]);

        let (_, params) = matched(table.match_all(Method::Get, "/files/a/b/c"));
        assert_eq!(params.get(WILDCARD_KEY), Some("a/b/c"));
    }

    #[test]
    fn empty_table() {
        let table = RouteTable::<()>::new();
        assert!(matches!(
            table.match_all(Method::Get, "/"),
            Resolution::NotFound
        ));
    }
}
