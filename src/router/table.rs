//! Ordered route storage.

use super::{
    dispatcher::{self, Resolution},
    pattern::Pattern,
};
use crate::{errors::CompileError, Method, Verbs};

/// A mounted route: compiled pattern, accepted verbs and handler.
#[derive(Debug)]
pub struct RouteEntry<H> {
    pub pattern: Pattern,
    pub verbs: Verbs,
    pub handler: H,
}

/// Routes in registration order.
///
/// Registration order is the tie-break between overlapping patterns: the
/// first registered matching route runs first. The table is built before
/// serving and read-only afterwards.
///
/// # Examples
/// ```
/// use maestro_web::{router::{Resolution, RouteTable}, Method};
///
/// let mut table = RouteTable::new();
/// table
///     .register("/a/:x", Method::Get, "param")?
///     .register("/a/b", Method::Get, "literal")?;
///
/// let Resolution::Matched { entries, params } = table.match_all(Method::Get, "/a/b") else {
///     panic!("no match");
/// };
/// assert_eq!(entries[0].handler, "param");
/// assert_eq!(entries[1].handler, "literal");
/// assert_eq!(params.get("x"), Some("b"));
/// # Ok::<(), maestro_web::errors::CompileError>(())
/// ```
#[derive(Debug)]
pub struct RouteTable<H> {
    entries: Vec<RouteEntry<H>>,
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<H> RouteTable<H> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `pattern` and appends the route.
    pub fn register<V: Into<Verbs>>(
        &mut self,
        pattern: &str,
        verbs: V,
        handler: H,
    ) -> Result<&mut Self, CompileError> {
        let entry = Self::compile(pattern, verbs.into(), handler)?;
        self.entries.push(entry);
        Ok(self)
    }

    /// Registers several routes at once. Either all of them are appended, in
    /// order, or none is.
    pub fn batch<I, P, V>(&mut self, routes: I) -> Result<&mut Self, CompileError>
    where
        I: IntoIterator<Item = (P, V, H)>,
        P: AsRef<str>,
        V: Into<Verbs>,
    {
        let entries = routes
            .into_iter()
            .map(|(pattern, verbs, handler)| Self::compile(pattern.as_ref(), verbs.into(), handler))
            .collect::<Result<Vec<_>, _>>()?;

        self.entries.extend(entries);
        Ok(self)
    }

    fn compile(pattern: &str, verbs: Verbs, handler: H) -> Result<RouteEntry<H>, CompileError> {
        if verbs.is_empty() {
            return Err(CompileError::NoVerbs(pattern.to_string()));
        }

        Ok(RouteEntry {
            pattern: Pattern::compile(pattern)?,
            verbs,
            handler,
        })
    }

    /// Resolves `method` and `path` against the table.
    #[inline]
    pub fn match_all(&self, method: Method, path: &str) -> Resolution<'_, H> {
        dispatcher::resolve(&self.entries, method, path)
    }

    #[inline(always)]
    pub fn entries(&self) -> &[RouteEntry<H>] {
        &self.entries
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
