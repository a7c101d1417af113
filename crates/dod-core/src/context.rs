//! Where rule contexts come from.
//!
//! Real metric collection (coverage runs, linters, scanners) happens outside
//! this crate; those tools write a metrics file that [`MetricsFileProvider`]
//! reads. [`ProjectContextProvider`] adds a handful of facts it can observe
//! from the file tree itself.

use crate::error::Result;
use crate::rule::Rule;
use crate::value::{Context, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// ContextProvider
// ---------------------------------------------------------------------------

pub trait ContextProvider {
    fn gather(&self, project: &Path, rule: &Rule) -> Context;
}

impl<T: ContextProvider + ?Sized> ContextProvider for &T {
    fn gather(&self, project: &Path, rule: &Rule) -> Context {
        (**self).gather(project, rule)
    }
}

impl<T: ContextProvider + ?Sized> ContextProvider for Box<T> {
    fn gather(&self, project: &Path, rule: &Rule) -> Context {
        (**self).gather(project, rule)
    }
}

// ---------------------------------------------------------------------------
// StaticContextProvider
// ---------------------------------------------------------------------------

/// The same context for every rule and project.
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    context: Context,
}

impl StaticContextProvider {
    pub fn new(context: Context) -> Self {
        Self { context }
    }
}

impl ContextProvider for StaticContextProvider {
    fn gather(&self, _project: &Path, _rule: &Rule) -> Context {
        self.context.clone()
    }
}

// ---------------------------------------------------------------------------
// MetricsFileProvider
// ---------------------------------------------------------------------------

/// Reads a flat YAML (or JSON) map of metric values. Relative paths resolve
/// against the project root. A missing file is an empty context.
#[derive(Debug, Clone)]
pub struct MetricsFileProvider {
    path: PathBuf,
}

impl MetricsFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn resolve(&self, project: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            project.join(&self.path)
        }
    }

    /// Load the metrics map. Entries that are not scalars (null, lists,
    /// nested maps) are skipped with a warning; the rest still load.
    pub fn load(path: &Path) -> Result<Context> {
        if !path.exists() {
            return Ok(Context::new());
        }
        let data = std::fs::read_to_string(path)?;
        // Empty and comment-only files parse as null.
        let mapping = match serde_yaml::from_str::<serde_yaml::Value>(&data)? {
            serde_yaml::Value::Null => return Ok(Context::new()),
            other => serde_yaml::from_value::<serde_yaml::Mapping>(other)?,
        };

        let mut ctx = Context::new();
        for (key, raw) in mapping {
            let Some(key) = scalar_key(&key) else {
                tracing::warn!(path = %path.display(), "skipping metric with a non-scalar key");
                continue;
            };
            match scalar_value(raw) {
                Some(value) => ctx.insert(key, value),
                None => {
                    tracing::warn!(path = %path.display(), metric = %key, "skipping metric that is not a scalar")
                }
            }
        }
        Ok(ctx)
    }
}

fn scalar_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_value(raw: serde_yaml::Value) -> Option<Value> {
    match raw {
        serde_yaml::Value::Bool(b) => Some(Value::Bool(b)),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Value::Int(i)),
            None => n.as_f64().map(Value::Float),
        },
        serde_yaml::Value::String(s) => Some(Value::Str(s)),
        serde_yaml::Value::Tagged(tagged) => scalar_value(tagged.value),
        serde_yaml::Value::Null
        | serde_yaml::Value::Sequence(_)
        | serde_yaml::Value::Mapping(_) => None,
    }
}

impl ContextProvider for MetricsFileProvider {
    fn gather(&self, project: &Path, _rule: &Rule) -> Context {
        let path = self.resolve(project);
        match Self::load(&path) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable metrics file");
                Context::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LayeredContextProvider
// ---------------------------------------------------------------------------

/// Merges several providers; later layers override earlier ones.
#[derive(Default)]
pub struct LayeredContextProvider {
    layers: Vec<Box<dyn ContextProvider>>,
}

impl LayeredContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.layers.push(Box::new(provider));
        self
    }
}

impl ContextProvider for LayeredContextProvider {
    fn gather(&self, project: &Path, rule: &Rule) -> Context {
        let mut ctx = Context::new();
        for layer in &self.layers {
            ctx.merge(layer.gather(project, rule));
        }
        ctx
    }
}

// ---------------------------------------------------------------------------
// ProjectContextProvider
// ---------------------------------------------------------------------------

const SKIP_DIRS: &[&str] = &[
    ".git",
    ".dod",
    ".venv",
    "venv",
    "target",
    "node_modules",
    "__pycache__",
    "dist",
    "build",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "c", "h", "cpp", "hpp", "cs", "rb",
    "swift",
];

/// Skip reading files larger than this when counting TODO markers.
const MAX_SCAN_BYTES: u64 = 1024 * 1024;

/// Scans the project tree once per path and overlays the metrics file.
#[derive(Debug, Default)]
pub struct ProjectContextProvider {
    metrics: Option<MetricsFileProvider>,
    cache: RefCell<HashMap<PathBuf, Context>>,
}

impl ProjectContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics = Some(MetricsFileProvider::new(path));
        self
    }

    /// Drop cached scans so the next `gather` rescans the tree.
    pub fn invalidate(&self) {
        self.cache.borrow_mut().clear();
    }

    pub fn scan(project: &Path) -> Context {
        let mut stats = TreeStats::default();
        walk(project, &mut stats);

        let top: Vec<String> = std::fs::read_dir(project)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_lowercase())
                    .collect()
            })
            .unwrap_or_default();
        let has_prefix = |prefixes: &[&str]| {
            top.iter()
                .any(|name| prefixes.iter().any(|p| name.starts_with(p)))
        };
        let exists = |rel: &str| project.join(rel).exists();

        Context::new()
            .with("has_readme", has_prefix(&["readme"]))
            .with("has_license", has_prefix(&["license", "licence", "copying"]))
            .with("has_changelog", has_prefix(&["changelog", "changes", "history"]))
            .with("has_gitignore", exists(".gitignore"))
            .with(
                "has_ci",
                exists(".github/workflows") || exists(".gitlab-ci.yml") || exists(".circleci"),
            )
            .with(
                "has_dockerfile",
                exists("Dockerfile") || exists("docker-compose.yml") || exists("compose.yaml"),
            )
            .with(
                "has_tests",
                exists("tests") || exists("test") || stats.test_files > 0,
            )
            .with("source_files", stats.source_files as i64)
            .with("test_files", stats.test_files as i64)
            .with("source_lines", stats.source_lines as i64)
            .with("todo_count", stats.todos as i64)
    }
}

impl ContextProvider for ProjectContextProvider {
    fn gather(&self, project: &Path, rule: &Rule) -> Context {
        if let Some(ctx) = self.cache.borrow().get(project) {
            return ctx.clone();
        }
        let mut ctx = Self::scan(project);
        if let Some(metrics) = &self.metrics {
            ctx.merge(metrics.gather(project, rule));
        }
        tracing::debug!(project = %project.display(), fields = ctx.len(), "project context gathered");
        self.cache
            .borrow_mut()
            .insert(project.to_path_buf(), ctx.clone());
        ctx
    }
}

#[derive(Debug, Default)]
struct TreeStats {
    source_files: u64,
    test_files: u64,
    source_lines: u64,
    todos: u64,
}

fn walk(project: &Path, stats: &mut TreeStats) {
    let entries = WalkDir::new(project)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !is_skipped_dir(e));
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !SOURCE_EXTENSIONS.contains(&ext) {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if in_test_dir(project, path) || is_test_file(&name) {
            stats.test_files += 1;
        } else {
            stats.source_files += 1;
        }
        let small = entry
            .metadata()
            .map(|m| m.len() <= MAX_SCAN_BYTES)
            .unwrap_or(false);
        if small {
            if let Ok(text) = std::fs::read_to_string(path) {
                stats.source_lines += text.lines().count() as u64;
                stats.todos += (text.matches("TODO").count() + text.matches("FIXME").count()) as u64;
            }
        }
    }
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    SKIP_DIRS.contains(&&*name)
}

/// Any directory between the project root and the file is a test directory.
fn in_test_dir(project: &Path, file: &Path) -> bool {
    let rel = file.strip_prefix(project).unwrap_or(file);
    let Some(parent) = rel.parent() else {
        return false;
    };
    parent.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("tests" | "test" | "__tests__")
        )
    })
}

fn is_test_file(name: &str) -> bool {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with(".test")
        || stem.ends_with(".spec")
}

/// Parse `key=value` into a context entry, typing the value the same way
/// condition literals are typed.
pub fn parse_assignment(raw: &str) -> Option<(String, Value)> {
    let (key, value) = raw.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), Value::parse_literal(value)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleCompiler, RuleDefinition};
    use crate::types::Category;
    use tempfile::TempDir;

    fn any_rule() -> Rule {
        let def: RuleDefinition = serde_yaml::from_str("name: r\ncondition: x > 0\n").unwrap();
        RuleCompiler::default()
            .compile(Category::Testing, &def)
            .unwrap()
    }

    #[test]
    fn static_provider_returns_same_context() {
        let provider = StaticContextProvider::new(Context::new().with("coverage", 85i64));
        let ctx = provider.gather(Path::new("/tmp"), &any_rule());
        assert_eq!(ctx.lookup("coverage"), Value::Int(85));
    }

    #[test]
    fn metrics_file_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        let provider = MetricsFileProvider::new("metrics.yaml");
        assert!(provider.gather(dir.path(), &any_rule()).is_empty());
    }

    #[test]
    fn metrics_file_with_only_comments_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.yaml");
        std::fs::write(&path, "# coverage: 85\n").unwrap();
        assert!(MetricsFileProvider::load(&path).unwrap().is_empty());
    }

    #[test]
    fn metrics_file_skips_non_scalar_entries_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.yaml");
        std::fs::write(
            &path,
            "vulnerabilities: 5\nowner: ~\nlanguages: [rust, go]\nlatency:\n  p95: 120\ncoverage: 81.5\n",
        )
        .unwrap();
        let ctx = MetricsFileProvider::load(&path).unwrap();
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.lookup("vulnerabilities"), Value::Int(5));
        assert_eq!(ctx.lookup("coverage"), Value::Float(81.5));
        assert!(ctx.get("owner").is_none());
        assert!(ctx.get("latency").is_none());

        let rule = crate::rule::RuleCompiler::default()
            .compile(
                Category::Security,
                &serde_yaml::from_str::<RuleDefinition>("name: v\ncondition: vulnerabilities == 0\n")
                    .unwrap(),
            )
            .unwrap();
        let gathered = MetricsFileProvider::new("metrics.yaml").gather(dir.path(), &rule);
        assert!(!rule.evaluate(&gathered).unwrap());
    }

    #[test]
    fn metrics_file_yaml_and_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("m.yaml"), "coverage: 91.5\nlint_errors: 0\n").unwrap();
        std::fs::write(dir.path().join("m.json"), "{\"coverage\": 70}").unwrap();
        let yaml = MetricsFileProvider::new("m.yaml").gather(dir.path(), &any_rule());
        assert_eq!(yaml.lookup("coverage"), Value::Float(91.5));
        let json = MetricsFileProvider::new(dir.path().join("m.json")).gather(dir.path(), &any_rule());
        assert_eq!(json.lookup("coverage"), Value::Int(70));
    }

    #[test]
    fn layered_later_wins() {
        let provider = LayeredContextProvider::new()
            .layer(StaticContextProvider::new(
                Context::new().with("a", 1i64).with("b", 1i64),
            ))
            .layer(StaticContextProvider::new(Context::new().with("b", 2i64)));
        let ctx = provider.gather(Path::new("/tmp"), &any_rule());
        assert_eq!(ctx.lookup("a"), Value::Int(1));
        assert_eq!(ctx.lookup("b"), Value::Int(2));
    }

    #[test]
    fn project_scan_observes_tree() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::write(root.join("README.md"), "# demo\n").unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("tests")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::write(root.join("src/main.py"), "# TODO: tidy\nprint('hi')\n").unwrap();
        std::fs::write(root.join("src/test_main.py"), "def test_x(): pass\n").unwrap();
        std::fs::write(root.join("tests/it.rs"), "fn t() {}\n").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "// TODO\n").unwrap();

        std::fs::create_dir_all(root.join("pkg/test/unit")).unwrap();
        std::fs::write(root.join("pkg/test/unit/deep.go"), "package unit\n").unwrap();
        std::fs::create_dir_all(root.join("pkg/target")).unwrap();
        std::fs::write(root.join("pkg/target/gen.rs"), "// TODO\n").unwrap();

        let ctx = ProjectContextProvider::scan(root);
        assert_eq!(ctx.lookup("has_readme"), Value::Bool(true));
        assert_eq!(ctx.lookup("has_license"), Value::Bool(false));
        assert_eq!(ctx.lookup("has_tests"), Value::Bool(true));
        assert_eq!(ctx.lookup("source_files"), Value::Int(1));
        assert_eq!(ctx.lookup("test_files"), Value::Int(3));
        assert_eq!(ctx.lookup("todo_count"), Value::Int(1));
        assert_eq!(ctx.lookup("source_lines"), Value::Int(5));
    }

    #[test]
    fn project_provider_overlays_metrics_and_caches() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("metrics.yaml"), "coverage: 88\nhas_readme: true\n").unwrap();
        let provider = ProjectContextProvider::new().with_metrics_file("metrics.yaml");
        let first = provider.gather(dir.path(), &any_rule());
        assert_eq!(first.lookup("coverage"), Value::Int(88));
        assert_eq!(first.lookup("has_readme"), Value::Bool(true));

        std::fs::write(dir.path().join("metrics.yaml"), "coverage: 10\n").unwrap();
        let cached = provider.gather(dir.path(), &any_rule());
        assert_eq!(cached.lookup("coverage"), Value::Int(88));

        provider.invalidate();
        let fresh = provider.gather(dir.path(), &any_rule());
        assert_eq!(fresh.lookup("coverage"), Value::Int(10));
    }

    #[test]
    fn parse_assignment_types_values() {
        assert_eq!(
            parse_assignment("coverage=85"),
            Some(("coverage".to_string(), Value::Int(85)))
        );
        assert_eq!(
            parse_assignment("has_ci=true"),
            Some(("has_ci".to_string(), Value::Bool(true)))
        );
        assert!(parse_assignment("novalue").is_none());
        assert!(parse_assignment("=3").is_none());
    }
}
