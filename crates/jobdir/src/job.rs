//! Job names, attributes, and selector types.

use serde_json::Value;

/// Open key/value data attached to a job (`"path"`, `"command"`, templating
/// inputs, anything the caller wants to carry along).
pub type Attributes = serde_json::Map<String, Value>;

/// Characters stripped from job names. Path separators, shell metacharacters
/// and punctuation that would break directory names or rendered scripts.
const DISALLOWED_CHARS: &str = "-()\"#/@;:<>{}[]`+=~|.!?,\\'*&$%";

/// Normalize a user-supplied job name into a filesystem-safe identifier.
///
/// Strips every character in the disallowed set and all whitespace. The
/// sanitized value is used regardless; a change is reported as a warning,
/// never an error. Idempotent.
pub fn sanitize_job_name(raw: &str) -> String {
    let clean: String = raw
        .chars()
        .filter(|c| !DISALLOWED_CHARS.contains(*c) && !c.is_whitespace())
        .collect();
    if clean != raw {
        tracing::warn!(raw, clean = %clean, "job name contained disallowed characters");
    }
    clean
}

/// Selection of jobs (or queue ids) for an operation.
///
/// `Offset(k)` selects entries from index `k` to the end in insertion order,
/// with Python slice semantics for negative values: `0` means everything,
/// `-1` means the most recently inserted entry only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A single name.
    Single(String),
    /// An explicit list of names.
    Many(Vec<String>),
    /// All entries from this offset to the end, in insertion order.
    Offset(isize),
}

impl Selector {
    /// Resolve this selector against an ordered list of known names.
    ///
    /// Unknown names are dropped with a warning; this never fails.
    pub fn resolve(&self, all: &[String]) -> Vec<String> {
        match self {
            Selector::Single(name) => {
                if all.iter().any(|x| x == name) {
                    vec![name.clone()]
                } else {
                    tracing::warn!(name = %name, "selected name is unknown");
                    Vec::new()
                }
            }
            Selector::Many(names) => {
                let found: Vec<String> = names
                    .iter()
                    .filter(|n| all.iter().any(|x| &x == n))
                    .cloned()
                    .collect();
                if found.len() < names.len() {
                    tracing::warn!(
                        requested = names.len(),
                        found = found.len(),
                        "some selected names are unknown"
                    );
                }
                found
            }
            Selector::Offset(k) => {
                let start = if *k < 0 {
                    all.len().saturating_sub(k.unsigned_abs())
                } else {
                    (*k as usize).min(all.len())
                };
                all[start..].to_vec()
            }
        }
    }
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::Single(name.to_string())
    }
}

impl From<String> for Selector {
    fn from(name: String) -> Self {
        Selector::Single(name)
    }
}

impl From<Vec<String>> for Selector {
    fn from(names: Vec<String>) -> Self {
        Selector::Many(names)
    }
}

impl From<Vec<&str>> for Selector {
    fn from(names: Vec<&str>) -> Self {
        Selector::Many(names.into_iter().map(String::from).collect())
    }
}

impl From<isize> for Selector {
    fn from(k: isize) -> Self {
        Selector::Offset(k)
    }
}

impl From<i32> for Selector {
    fn from(k: i32) -> Self {
        Selector::Offset(k as isize)
    }
}

/// The shapes accepted by `add`: one name, many names, or names with
/// caller-supplied attributes.
#[derive(Debug, Clone)]
pub enum AddSpec {
    /// A single job name with no extra attributes.
    One(String),
    /// Several job names with no extra attributes.
    Many(Vec<String>),
    /// Job names each carrying an attribute map to merge in.
    WithAttributes(Vec<(String, Attributes)>),
}

impl AddSpec {
    /// Flatten into `(name, attributes)` pairs in caller order.
    pub fn into_entries(self) -> Vec<(String, Attributes)> {
        match self {
            AddSpec::One(name) => vec![(name, Attributes::new())],
            AddSpec::Many(names) => names.into_iter().map(|n| (n, Attributes::new())).collect(),
            AddSpec::WithAttributes(entries) => entries,
        }
    }
}

impl From<&str> for AddSpec {
    fn from(name: &str) -> Self {
        AddSpec::One(name.to_string())
    }
}

impl From<String> for AddSpec {
    fn from(name: String) -> Self {
        AddSpec::One(name)
    }
}

impl From<Vec<String>> for AddSpec {
    fn from(names: Vec<String>) -> Self {
        AddSpec::Many(names)
    }
}

impl From<Vec<&str>> for AddSpec {
    fn from(names: Vec<&str>) -> Self {
        AddSpec::Many(names.into_iter().map(String::from).collect())
    }
}

impl From<(String, Attributes)> for AddSpec {
    fn from(entry: (String, Attributes)) -> Self {
        AddSpec::WithAttributes(vec![entry])
    }
}

impl From<(&str, Attributes)> for AddSpec {
    fn from((name, attrs): (&str, Attributes)) -> Self {
        AddSpec::WithAttributes(vec![(name.to_string(), attrs)])
    }
}

impl From<Vec<(String, Attributes)>> for AddSpec {
    fn from(entries: Vec<(String, Attributes)>) -> Self {
        AddSpec::WithAttributes(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_removes_disallowed() {
        assert_eq!(sanitize_job_name("my_job"), "my_job");
        assert_eq!(sanitize_job_name("my job"), "myjob");
        assert_eq!(sanitize_job_name("a/b:c;d"), "abcd");
        assert_eq!(sanitize_job_name("job-1.2!"), "job12");
        assert_eq!(sanitize_job_name("job[1]"), "job1");
    }

    #[test]
    fn test_sanitize_idempotent() {
        let once = sanitize_job_name("we!rd (name) #5");
        assert_eq!(sanitize_job_name(&once), once);
    }

    proptest! {
        #[test]
        fn prop_sanitize_idempotent(raw in "\\PC{0,40}") {
            let once = sanitize_job_name(&raw);
            prop_assert_eq!(sanitize_job_name(&once), once.clone());
            prop_assert!(!once.chars().any(|c| DISALLOWED_CHARS.contains(c) || c.is_whitespace()));
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_selector_offset() {
        let all = names(&["a", "b", "c", "d"]);
        assert_eq!(Selector::Offset(0).resolve(&all), all);
        assert_eq!(Selector::Offset(2).resolve(&all), names(&["c", "d"]));
        assert_eq!(Selector::Offset(-1).resolve(&all), names(&["d"]));
        assert_eq!(Selector::Offset(-10).resolve(&all), all);
        assert_eq!(Selector::Offset(10).resolve(&all), Vec::<String>::new());
    }

    #[test]
    fn test_selector_unknown_names_dropped() {
        let all = names(&["a", "b"]);
        assert_eq!(
            Selector::Many(names(&["a", "missing"])).resolve(&all),
            names(&["a"])
        );
        assert_eq!(
            Selector::Single("missing".to_string()).resolve(&all),
            Vec::<String>::new()
        );
    }

    #[test]
    fn test_addspec_shapes() {
        let one: AddSpec = "job_1".into();
        assert_eq!(one.into_entries().len(), 1);

        let many: AddSpec = vec!["a", "b", "c"].into();
        let entries = many.into_entries();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|(_, a)| a.is_empty()));

        let mut attrs = Attributes::new();
        attrs.insert("command".to_string(), "echo hi".into());
        let with: AddSpec = ("job_x", attrs).into();
        let entries = with.into_entries();
        assert_eq!(entries[0].0, "job_x");
        assert_eq!(entries[0].1["command"], "echo hi");
    }
}
