//! Structural annotation parser.
//!
//! Test files are parsed as text: decorator blocks are accumulated until
//! the next `def`, and decorators on the recognized traceability axes
//! (`epic`, `user_story`, `defect`, `component`, `priority`,
//! `test_category`, `scenario`) are harvested. The contract is defined on
//! annotation shape, not on any test runner's object model.

use std::sync::LazyLock;

use regex::Regex;

use gonogo_core::enums::{TestPriority, TestType};
use gonogo_core::id::{EntityKind, is_valid_id};

static DECORATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*@([A-Za-z_][\w.]*)\s*(?:\((.*)\))?\s*$").unwrap());

static DEF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").unwrap());

static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^class\s+([A-Za-z_]\w*)").unwrap());

static STRING_ARG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)"|'([^']*)'"#).unwrap());

static ID_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:EP|US|DEF)-\d+\b").unwrap());

/// Annotation metadata harvested from one test definition. Duplicate
/// values per axis are coalesced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    pub epics: Vec<String>,
    pub stories: Vec<String>,
    pub defects: Vec<String>,
    pub components: Vec<String>,
    pub priority: Option<TestPriority>,
    pub test_type: Option<TestType>,
    pub bdd_scenario: Option<String>,
}

impl Annotations {
    /// Returns `true` if no traceability axis was annotated.
    pub fn is_empty(&self) -> bool {
        self.epics.is_empty()
            && self.stories.is_empty()
            && self.defects.is_empty()
            && self.components.is_empty()
            && self.priority.is_none()
            && self.test_type.is_none()
            && self.bdd_scenario.is_none()
    }
}

/// One discovered test definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTest {
    /// Path relative to the scan root, forward slashes.
    pub file_path: String,
    /// Qualified symbol: `test_name` or `ClassName::test_name`.
    pub symbol: String,
    pub annotations: Annotations,
}

/// The result of parsing one file.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub tests: Vec<ParsedTest>,
    /// Item-level problems: malformed IDs, unknown axes, unknown levels.
    pub warnings: Vec<String>,
}

/// One raw decorator: last dotted name segment plus the argument text.
struct RawDecorator {
    name: String,
    args: String,
}

/// Parses a test file's source text.
///
/// Line-based with decorator-block tracking: decorators accumulate until
/// the next `def`; a `def test_*` at module level or one indent inside a
/// top-level class yields a test. Multi-line decorator calls are joined by
/// paren balancing.
pub fn parse_source(rel_path: &str, source: &str) -> ParsedFile {
    let mut parsed = ParsedFile::default();
    let mut pending: Vec<RawDecorator> = Vec::new();
    let mut current_class: Option<String> = None;

    let lines: Vec<&str> = source.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }

        if trimmed.starts_with('@') {
            // Join continuation lines until parens balance.
            let mut joined = line.to_string();
            let mut j = i;
            while paren_depth(&joined) > 0 && j + 1 < lines.len() && (j - i) < 20 {
                j += 1;
                joined.push(' ');
                joined.push_str(lines[j].trim());
            }
            i = j + 1;

            if let Some(caps) = DECORATOR_RE.captures(&joined) {
                let dotted = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let name = dotted.rsplit('.').next().unwrap_or(dotted).to_string();
                let args = caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string();
                pending.push(RawDecorator { name, args });
            }
            continue;
        }

        if let Some(caps) = CLASS_RE.captures(line) {
            current_class = Some(caps[1].to_string());
            pending.clear();
            i += 1;
            continue;
        }

        if let Some(caps) = DEF_RE.captures(line) {
            let indent = caps[1].len();
            let name = caps[2].to_string();
            let decorators = std::mem::take(&mut pending);

            if name.starts_with("test_") {
                let symbol = match (indent, &current_class) {
                    (0, _) => Some(name.clone()),
                    (_, Some(class)) if indent > 0 => Some(format!("{class}::{name}")),
                    _ => None,
                };
                if let Some(symbol) = symbol {
                    let annotations =
                        harvest(rel_path, &symbol, &decorators, &mut parsed.warnings);
                    parsed.tests.push(ParsedTest {
                        file_path: rel_path.to_string(),
                        symbol,
                        annotations,
                    });
                }
            }
            if indent == 0 {
                current_class = None;
            }
            i += 1;
            continue;
        }

        // Any other statement at module level breaks a decorator block and
        // leaves class scope.
        if !line.starts_with(char::is_whitespace) {
            current_class = None;
        }
        pending.clear();
        i += 1;
    }

    parsed
}

/// Net paren depth of a line, ignoring parens inside string literals.
fn paren_depth(line: &str) -> i32 {
    let stripped = STRING_ARG_RE.replace_all(line, "");
    let mut depth = 0;
    for c in stripped.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Extracts the quoted string arguments of a decorator call.
fn string_args(args: &str) -> Vec<String> {
    STRING_ARG_RE
        .captures_iter(args)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}

fn harvest(
    rel_path: &str,
    symbol: &str,
    decorators: &[RawDecorator],
    warnings: &mut Vec<String>,
) -> Annotations {
    let mut out = Annotations::default();

    for dec in decorators {
        match dec.name.as_str() {
            "epic" => {
                for id in string_args(&dec.args) {
                    if is_valid_id(EntityKind::Epic, &id) {
                        push_unique(&mut out.epics, id);
                    } else {
                        warnings.push(format!("{rel_path}::{symbol}: malformed epic id {id:?}"));
                    }
                }
            }
            "user_story" => {
                for id in string_args(&dec.args) {
                    if is_valid_id(EntityKind::Story, &id) {
                        push_unique(&mut out.stories, id);
                    } else {
                        warnings
                            .push(format!("{rel_path}::{symbol}: malformed user story id {id:?}"));
                    }
                }
            }
            "defect" => {
                for id in string_args(&dec.args) {
                    if is_valid_id(EntityKind::Defect, &id) {
                        push_unique(&mut out.defects, id);
                    } else {
                        warnings.push(format!("{rel_path}::{symbol}: malformed defect id {id:?}"));
                    }
                }
            }
            "component" => {
                for tag in string_args(&dec.args) {
                    push_unique(&mut out.components, tag);
                }
            }
            "priority" => {
                for level in string_args(&dec.args) {
                    match TestPriority::parse(&level) {
                        Some(p) => out.priority = Some(p),
                        None => warnings.push(format!(
                            "{rel_path}::{symbol}: unknown priority {level:?}"
                        )),
                    }
                }
            }
            "test_category" => {
                for category in string_args(&dec.args) {
                    match TestType::parse(&category) {
                        Some(t) => out.test_type = Some(t),
                        None => warnings.push(format!(
                            "{rel_path}::{symbol}: unknown test category {category:?}"
                        )),
                    }
                }
            }
            "scenario" => {
                if let Some(name) = string_args(&dec.args).into_iter().next() {
                    out.bdd_scenario = Some(name);
                }
            }
            other => {
                // Only flag decorators that look like traceability markers;
                // ordinary runner decorators (parametrize, fixtures) pass
                // through silently.
                if ID_LIKE_RE.is_match(&dec.args) {
                    warnings.push(format!(
                        "{rel_path}::{symbol}: unknown annotation {other:?} carrying entity ids"
                    ));
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn harvests_annotated_module_level_test() {
        let src = r#"
import pytest

@pytest.mark.epic("EP-00003")
@pytest.mark.user_story("US-00006")
@pytest.mark.component("backend", "auth")
@pytest.mark.priority("high")
def test_login(client):
    assert client.login()
"#;
        let parsed = parse_source("tests/test_auth.py", src);
        assert_eq!(parsed.warnings, Vec::<String>::new());
        assert_eq!(parsed.tests.len(), 1);
        let t = &parsed.tests[0];
        assert_eq!(t.symbol, "test_login");
        assert_eq!(t.annotations.epics, vec!["EP-00003"]);
        assert_eq!(t.annotations.stories, vec!["US-00006"]);
        assert_eq!(t.annotations.components, vec!["backend", "auth"]);
        assert_eq!(t.annotations.priority, Some(TestPriority::High));
    }

    #[test]
    fn class_methods_get_qualified_symbols() {
        let src = r#"
class TestCheckout:
    @pytest.mark.user_story("US-00010")
    def test_checkout_total(self):
        pass

    def test_checkout_empty(self):
        pass

def test_module_level():
    pass
"#;
        let parsed = parse_source("tests/test_checkout.py", src);
        let symbols: Vec<&str> = parsed.tests.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(
            symbols,
            vec![
                "TestCheckout::test_checkout_total",
                "TestCheckout::test_checkout_empty",
                "test_module_level",
            ]
        );
        assert_eq!(parsed.tests[0].annotations.stories, vec!["US-00010"]);
        assert!(parsed.tests[1].annotations.is_empty());
    }

    #[test]
    fn duplicate_ids_coalesce() {
        let src = r#"
@pytest.mark.epic("EP-00001", "EP-00001")
@pytest.mark.epic("EP-00001")
def test_dup():
    pass
"#;
        let parsed = parse_source("t.py", src);
        assert_eq!(parsed.tests[0].annotations.epics, vec!["EP-00001"]);
    }

    #[test]
    fn malformed_id_warns_and_is_skipped() {
        let src = r#"
@pytest.mark.epic("EP-3")
def test_bad():
    pass
"#;
        let parsed = parse_source("t.py", src);
        assert!(parsed.tests[0].annotations.epics.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].contains("malformed epic id"));
    }

    #[test]
    fn unknown_axis_with_ids_warns() {
        let src = r#"
@pytest.mark.requirement("EP-00001")
def test_unknown():
    pass
"#;
        let parsed = parse_source("t.py", src);
        assert_eq!(parsed.warnings.len(), 1);
        assert!(parsed.warnings[0].contains("unknown annotation"));
    }

    #[test]
    fn ordinary_decorators_pass_silently() {
        let src = r#"
@pytest.mark.parametrize("n", [1, 2, 3])
@pytest.fixture
def test_params(n):
    pass
"#;
        let parsed = parse_source("t.py", src);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn multiline_decorator_call_joined() {
        let src = r#"
@pytest.mark.component(
    "backend",
    "payments",
)
def test_multiline():
    pass
"#;
        let parsed = parse_source("t.py", src);
        assert_eq!(
            parsed.tests[0].annotations.components,
            vec!["backend", "payments"]
        );
    }

    #[test]
    fn unknown_priority_warns() {
        let src = r#"
@pytest.mark.priority("urgent")
def test_priority():
    pass
"#;
        let parsed = parse_source("t.py", src);
        assert_eq!(parsed.tests[0].annotations.priority, None);
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn scenario_reference_harvested() {
        let src = r#"
@pytest.mark.scenario("checkout-happy-path")
@pytest.mark.test_category("bdd")
def test_scenario():
    pass
"#;
        let parsed = parse_source("t.py", src);
        let a = &parsed.tests[0].annotations;
        assert_eq!(a.bdd_scenario.as_deref(), Some("checkout-happy-path"));
        assert_eq!(a.test_type, Some(TestType::Bdd));
    }

    #[test]
    fn non_test_defs_ignored() {
        let src = r#"
@pytest.mark.epic("EP-00001")
def helper():
    pass

def test_real():
    pass
"#;
        let parsed = parse_source("t.py", src);
        let symbols: Vec<&str> = parsed.tests.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["test_real"]);
        // Decorators on the helper do not leak onto the next test.
        assert!(parsed.tests[0].annotations.is_empty());
    }
}
