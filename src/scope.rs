//! Resolution scopes for schema reference construction.
//!
//! A scope is an immutable `(base, current_output)` pair of URI strings.
//! The base is the identifier of the innermost enclosing schema that
//! declared an `id`; the current output is the URI the emitted fragment is
//! anchored at. References are built relative to the current output, so a
//! definition extracted for a recursive document resets the output to the
//! document's own base before the reference is created.

use serde_json::{json, Value};

/// An immutable resolution scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionScope {
    base: String,
    current_output: String,
}

impl ResolutionScope {
    pub fn new(base: impl Into<String>, current_output: impl Into<String>) -> Self {
        ResolutionScope {
            base: base.into(),
            current_output: current_output.into(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn current_output(&self) -> &str {
        &self.current_output
    }

    /// The scope introduced by a nested schema declaring `new_id`.
    ///
    /// An empty `new_id` leaves the scope untouched. Otherwise the new id
    /// is resolved against the current base and restarts the base for
    /// everything beneath it.
    pub fn derive(&self, new_id: &str) -> Self {
        if new_id.is_empty() {
            return self.clone();
        }
        let resolved = resolve_reference(&self.base, new_id);
        ResolutionScope {
            base: resolved.clone(),
            current_output: resolved,
        }
    }

    /// A scope whose output is anchored back at its own base.
    pub fn reset_output(&self) -> Self {
        ResolutionScope {
            base: self.base.clone(),
            current_output: self.base.clone(),
        }
    }

    /// Build a `{"$ref": ...}` fragment pointing at a named definition.
    ///
    /// The pointer is relative to the current output: when the output
    /// already sits at the base, a bare `#/definitions/<id>` pointer is
    /// enough; otherwise the base is prepended so the reference stays
    /// resolvable from the nested scope.
    pub fn create_ref(&self, definition_id: &str) -> Value {
        let prefix = if self.base != self.current_output {
            self.base.as_str()
        } else {
            ""
        };
        json!({ "$ref": format!("{}#/definitions/{}", prefix, definition_id) })
    }
}

/// Resolve `reference` against `base`, RFC 3986 style, covering the forms
/// that occur as schema ids: absolute URIs, network-path and absolute-path
/// references, and relative path segments.
pub(crate) fn resolve_reference(base: &str, reference: &str) -> String {
    if reference.is_empty() {
        return base.to_string();
    }
    if base.is_empty() || has_scheme(reference) {
        return reference.to_string();
    }
    if let Some(rest) = reference.strip_prefix("//") {
        return match base.split_once(':') {
            Some((scheme, _)) => format!("{}://{}", scheme, rest),
            None => reference.to_string(),
        };
    }
    if reference.starts_with('/') {
        return format!("{}{}", authority_root(base), reference);
    }
    match base[path_start(base)..].rfind('/') {
        Some(idx) => {
            let split = path_start(base) + idx + 1;
            format!("{}{}", &base[..split], reference)
        }
        None if path_start(base) > 0 => format!("{}/{}", base, reference),
        None => reference.to_string(),
    }
}

/// Whether the string starts with a URI scheme (`scheme:` before any
/// path/query/fragment delimiter).
fn has_scheme(s: &str) -> bool {
    match s.find(|c| c == ':' || c == '/' || c == '?' || c == '#') {
        Some(idx) => {
            s.as_bytes()[idx] == b':'
                && idx > 0
                && s.as_bytes()[0].is_ascii_alphabetic()
                && s[..idx]
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.')
        }
        None => false,
    }
}

/// `scheme://authority` of the base, or empty for bases without one.
fn authority_root(base: &str) -> &str {
    &base[..path_start(base)]
}

/// Index where the path component of `base` starts (0 when the base has
/// no `scheme://authority` part).
fn path_start(base: &str) -> usize {
    match base.find("://") {
        Some(idx) => {
            let after = idx + 3;
            match base[after..].find('/') {
                Some(p) => after + p,
                None => base.len(),
            }
        }
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derive_resolves_against_base() {
        let scope = ResolutionScope::new("http://example.com/schema.json", "");
        let derived = scope.derive("sub.json");
        assert_eq!(derived.base(), "http://example.com/sub.json");
        assert_eq!(derived.current_output(), "http://example.com/sub.json");
    }

    #[test]
    fn derive_with_empty_id_is_identity() {
        let scope = ResolutionScope::new("http://example.com/a.json", "out");
        assert_eq!(scope.derive(""), scope);
    }

    #[test]
    fn derive_with_absolute_id_replaces_base() {
        let scope = ResolutionScope::new("http://example.com/a.json", "");
        let derived = scope.derive("http://other.org/b.json");
        assert_eq!(derived.base(), "http://other.org/b.json");
    }

    #[test]
    fn ref_is_bare_pointer_when_output_matches_base() {
        let scope = ResolutionScope::new("http://example.com/a.json", "http://example.com/a.json");
        assert_eq!(
            scope.create_ref("main.Node"),
            json!({ "$ref": "#/definitions/main.Node" })
        );
    }

    #[test]
    fn ref_carries_base_when_output_differs() {
        let scope = ResolutionScope::new("http://example.com/a.json", "");
        assert_eq!(
            scope.create_ref("main.Node"),
            json!({ "$ref": "http://example.com/a.json#/definitions/main.Node" })
        );
    }

    #[test]
    fn reset_output_anchors_at_base() {
        let scope = ResolutionScope::new("http://example.com/a.json", "").reset_output();
        assert_eq!(
            scope.create_ref("main.Node"),
            json!({ "$ref": "#/definitions/main.Node" })
        );
    }

    #[test]
    fn resolve_reference_relative_path() {
        assert_eq!(
            resolve_reference("http://example.com/dir/a.json", "b.json"),
            "http://example.com/dir/b.json"
        );
        assert_eq!(resolve_reference("dir/a.json", "b.json"), "dir/b.json");
        assert_eq!(resolve_reference("a.json", "b.json"), "b.json");
    }

    #[test]
    fn resolve_reference_absolute_path() {
        assert_eq!(
            resolve_reference("http://example.com/dir/a.json", "/b.json"),
            "http://example.com/b.json"
        );
    }

    #[test]
    fn resolve_reference_network_path() {
        assert_eq!(
            resolve_reference("https://example.com/a.json", "//other.org/b.json"),
            "https://other.org/b.json"
        );
    }

    #[test]
    fn resolve_reference_host_without_path() {
        assert_eq!(
            resolve_reference("http://example.com", "sub.json"),
            "http://example.com/sub.json"
        );
    }

    #[test]
    fn resolve_reference_empty_cases() {
        assert_eq!(resolve_reference("", "b.json"), "b.json");
        assert_eq!(resolve_reference("http://example.com/a.json", ""), "http://example.com/a.json");
    }
}
