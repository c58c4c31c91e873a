//! Text rendering for error messages and resolution diagnostics.
//!
//! Injection errors carry a token and the chain of sessions that led to it.
//! These helpers turn that raw material into something a developer can read
//! at a glance.

use std::fmt::Write as _;

/// Renders a resolution path on one line.
///
/// # Examples
/// ```
/// use graft_support::rendering::render_chain;
///
/// let chain = vec!["UserService", "UserRepo", "Database", "UserService"];
/// assert_eq!(render_chain(&chain), "UserService → UserRepo → Database → UserService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    let mut rendered = String::new();
    for (index, step) in chain.iter().enumerate() {
        if index > 0 {
            rendered.push_str(" → ");
        }
        rendered.push_str(step.as_ref());
    }
    rendered
}

/// One step of a resolution path, rendered by [`render_path`].
#[derive(Debug, Clone)]
pub struct PathEntry {
    /// Display name of the requested token.
    pub token: String,
    /// Scope that governs the resolved instance, if one was selected yet.
    pub scope: Option<String>,
    /// Injector that owns the selected definition, if lookup finished.
    pub injector: Option<String>,
}

/// Renders a resolution path vertically, outermost request first.
///
/// ```text
/// [Singleton] UserService   @ app
///       ↓
/// [Transient] UserRepo      @ app::users
///       ↓
/// [?]         Database
/// ```
pub fn render_path(entries: &[PathEntry]) -> String {
    let label = |entry: &PathEntry| entry.scope.clone().unwrap_or_else(|| "?".to_string());
    let scope_width = entries.iter().map(|e| label(e).len()).max().unwrap_or(0);
    let token_width = entries.iter().map(|e| e.token.len()).max().unwrap_or(0);

    let mut out = String::new();
    for (index, entry) in entries.iter().enumerate() {
        if index > 0 {
            let _ = writeln!(out, "{}↓", " ".repeat(scope_width + 3));
        }
        let _ = write!(out, "[{:<scope_width$}] ", label(entry));
        match entry.injector {
            Some(ref injector) => {
                let _ = writeln!(out, "{:<token_width$} @ {injector}", entry.token);
            }
            None => {
                let _ = writeln!(out, "{}", entry.token);
            }
        }
    }
    out
}

/// Strips module paths from a fully qualified type name.
///
/// ```
/// use graft_support::rendering::shorten_type_name;
///
/// assert_eq!(shorten_type_name("my_app::services::user::UserService"), "UserService");
/// assert_eq!(
///     shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>"),
///     "Arc<dyn Logger>"
/// );
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    let mut out = String::with_capacity(full_name.len());
    let mut segment_start = 0;
    let bytes = full_name.as_bytes();
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b':' if bytes.get(index + 1) == Some(&b':') => {
                index += 2;
                segment_start = index;
                continue;
            }
            b'<' | b'>' | b',' | b' ' | b'(' | b')' | b'[' | b']' | b'&' | b';' => {
                out.push_str(&full_name[segment_start..index]);
                out.push(bytes[index] as char);
                segment_start = index + 1;
            }
            _ => {}
        }
        index += 1;
    }

    out.push_str(&full_name[segment_start..]);
    out
}

/// Suggests registered names close to a requested one ("did you mean?").
///
/// Candidates are ranked by containment first, then by edit distance of
/// their shortened forms. At most `limit` names are returned.
pub fn suggest_similar(requested: &str, available: &[&str], limit: usize) -> Vec<String> {
    let wanted = shorten_type_name(requested).to_lowercase();
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut ranked: Vec<(usize, &str)> = available
        .iter()
        .filter_map(|&candidate| {
            let short = shorten_type_name(candidate).to_lowercase();
            if short == wanted {
                return None;
            }
            if short.contains(&wanted) || wanted.contains(&short) {
                return Some((0, candidate));
            }
            let budget = (wanted.len().max(short.len()) / 3).max(1);
            edit_distance(&wanted, &short)
                .filter(|distance| *distance <= budget)
                .map(|distance| (distance, candidate))
        })
        .collect();

    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    ranked.dedup_by(|a, b| a.1 == b.1);
    ranked
        .into_iter()
        .take(limit)
        .map(|(_, name)| name.to_string())
        .collect()
}

/// Levenshtein distance over chars, `None` when the lengths alone rule out
/// a useful suggestion.
fn edit_distance(a: &str, b: &str) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > a.len().max(b.len()) / 2 {
        return None;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    Some(previous[b.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_simple_chain() {
        assert_eq!(render_chain(&["A", "B", "A"]), "A → B → A");
    }

    #[test]
    fn render_empty_chain() {
        let chain: Vec<&str> = vec![];
        assert_eq!(render_chain(&chain), "");
    }

    #[test]
    fn shorten_nested_generics() {
        assert_eq!(
            shorten_type_name("core::option::Option<alloc::vec::Vec<my::Thing>>"),
            "Option<Vec<Thing>>"
        );
        assert_eq!(shorten_type_name("String"), "String");
        assert_eq!(shorten_type_name("&str"), "&str");
    }

    #[test]
    fn suggests_typos_first() {
        let available = ["app::UserService", "app::UserRepository", "app::Database"];
        let suggestions = suggest_similar("app::UserServise", &available, 2);
        assert_eq!(suggestions.first().map(String::as_str), Some("app::UserService"));
    }

    #[test]
    fn no_suggestion_for_unrelated_names() {
        assert!(suggest_similar("XyzAbcDef", &["app::Database"], 3).is_empty());
    }

    #[test]
    fn exact_match_is_not_a_suggestion() {
        assert!(suggest_similar("Database", &["app::Database"], 3).is_empty());
    }

    #[test]
    fn path_rendering_lists_every_step() {
        let rendered = render_path(&[
            PathEntry {
                token: "UserService".into(),
                scope: Some("Singleton".into()),
                injector: Some("app".into()),
            },
            PathEntry {
                token: "Database".into(),
                scope: None,
                injector: None,
            },
        ]);
        assert!(rendered.contains("[Singleton] UserService"));
        assert!(rendered.contains("@ app"));
        assert!(rendered.contains('↓'));
        assert!(rendered.contains("[?"));
    }
}
