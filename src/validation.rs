//! ValidationPipeline (C10): priority-ordered static validators with
//! auto-fix.
//!
//! Grounded on the teacher's `ContentFilter` (`safety/content_filter.rs`)
//! for the regex-table idiom the security validator reuses directly, and
//! on `MutationTool`'s backup-before-write discipline
//! (`tools/mutation.rs`) for the auto-fix rollback-on-regression rule.
//! Real external linters (an AST parser, `mypy`, `radon`) are exactly the
//! kind of collaborator this crate treats as swappable; the reference
//! validators here implement conservative heuristics in their place and
//! the `complexity` validator demonstrates the missing-tool-recipe path
//! against a `radon` binary that is frequently absent.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::artifact::store::ArtifactStore;
use crate::config::ValidationConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidatorVerdict {
    Pass,
    Fixed,
    Fail { kind: String, detail: String },
    SkippedMissingTool,
    Skipped { reason: String },
}

pub enum CheckResult {
    Pass,
    Fail { kind: String, detail: String },
}

pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> u32;
    fn auto_fix_capable(&self) -> bool {
        false
    }
    fn required_tool(&self) -> Option<&'static str> {
        None
    }
    /// Subsumption: a FAIL here aborts every lower-priority validator.
    fn subsumes(&self) -> bool {
        false
    }
    fn check(&self, source: &str, config: &ValidationConfig) -> CheckResult;
    fn fix(&self, _source: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorReportEntry {
    pub name: String,
    pub verdict: ValidatorVerdict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub entries: Vec<ValidatorReportEntry>,
    pub quality_score: f32,
    pub grade: Grade,
    pub final_source: String,
}

impl ValidationReport {
    pub fn all_pass_or_fixed(&self) -> bool {
        self.entries
            .iter()
            .all(|e| matches!(e.verdict, ValidatorVerdict::Pass | ValidatorVerdict::Fixed | ValidatorVerdict::SkippedMissingTool | ValidatorVerdict::Skipped { .. }))
    }

    pub fn failure_messages(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| match &e.verdict {
                ValidatorVerdict::Fail { kind, detail } => Some(format!("{} ({kind}): {detail}", e.name)),
                _ => None,
            })
            .collect()
    }
}

pub struct ValidationPipeline {
    validators: Vec<Box<dyn Validator>>,
    config: ValidationConfig,
    store: Option<Arc<ArtifactStore>>,
}

fn weight_for(config: &ValidationConfig, name: &str) -> f32 {
    let w = &config.weights;
    match name {
        "syntax" => w.syntax,
        "structure" => w.structure,
        // The config groups these four under one "imports" weight bucket.
        "json-output" | "stdin-json" | "import-order" | "runtime-import-order" => w.imports / 4.0,
        "undefined-names" => w.undefined,
        "tool-call-arity" => w.tool_call,
        "type-check" => w.type_check,
        "security" => w.security,
        "complexity" => w.complexity,
        _ => 0.0,
    }
}

impl ValidationPipeline {
    pub fn new(config: ValidationConfig, store: Option<Arc<ArtifactStore>>) -> Self {
        let mut validators: Vec<Box<dyn Validator>> = vec![
            Box::new(SyntaxValidator),
            Box::new(StructureValidator),
            Box::new(JsonOutputValidator),
            Box::new(StdinJsonValidator),
            Box::new(UndefinedNamesValidator),
            Box::new(ImportOrderValidator),
            Box::new(RuntimeImportOrderValidator),
            Box::new(ToolCallArityValidator),
            Box::new(TypeCheckValidator),
            Box::new(SecurityValidator::new()),
            Box::new(ComplexityValidator),
        ];
        validators.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { config, store, validators }
    }

    /// Pure scoring pass -- no auto-fix, no tool auto-install -- used to
    /// decide whether an auto-fix attempt should be accepted (IA5: a
    /// regressing fix is rolled back).
    fn score_source(&self, source: &str) -> f32 {
        let mut total_weight = 0.0_f32;
        let mut earned = 0.0_f32;
        for v in &self.validators {
            let weight = weight_for(&self.config, v.name());
            total_weight += weight;
            if matches!(v.check(source, &self.config), CheckResult::Pass) {
                earned += weight;
            }
        }
        if total_weight <= 0.0 {
            0.0
        } else {
            earned / total_weight
        }
    }

    async fn tool_available(tool: &str) -> bool {
        Command::new(tool)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok()
    }

    /// Look up a `static_tool_fix` recipe for `tool` and attempt the
    /// bounded install once (§4.8 "missing tool auto-install").
    async fn try_auto_install(&self, tool: &str) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let recipes = match store.find_by_tags(&["static_tool_fix".to_string(), tool.to_string()], true).await {
            Ok(r) => r,
            Err(_) => return false,
        };
        let Some(recipe) = recipes.into_iter().next() else {
            return false;
        };

        let timeout = Duration::from_secs(self.config.tool_install_timeout_secs);
        let parts: Vec<&str> = recipe.content.split_whitespace().collect();
        let Some((program, args)) = parts.split_first() else {
            return false;
        };
        let fut = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let installed = matches!(tokio::time::timeout(timeout, fut).await, Ok(Ok(status)) if status.success());

        let mut updated = recipe.clone();
        let attempts = updated.metadata.extra.get("install_attempts").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
        let successes = updated.metadata.extra.get("install_successes").and_then(|v| v.as_u64()).unwrap_or(0) + if installed { 1 } else { 0 };
        updated.metadata.extra.insert("install_attempts".to_string(), serde_json::json!(attempts));
        updated.metadata.extra.insert("install_successes".to_string(), serde_json::json!(successes));
        let _ = store.store(updated, true, true).await;

        installed && Self::tool_available(tool).await
    }

    pub async fn run(&self, source: &str) -> ValidationReport {
        let mut current = source.to_string();
        let mut entries = Vec::new();
        let mut aborted = false;

        for v in &self.validators {
            if aborted {
                entries.push(ValidatorReportEntry {
                    name: v.name().to_string(),
                    verdict: ValidatorVerdict::Skipped { reason: "aborted by higher-priority failure".to_string() },
                });
                continue;
            }

            if let Some(tool) = v.required_tool() {
                if !Self::tool_available(tool).await && !self.try_auto_install(tool).await {
                    entries.push(ValidatorReportEntry {
                        name: v.name().to_string(),
                        verdict: ValidatorVerdict::SkippedMissingTool,
                    });
                    continue;
                }
            }

            match v.check(&current, &self.config) {
                CheckResult::Pass => entries.push(ValidatorReportEntry {
                    name: v.name().to_string(),
                    verdict: ValidatorVerdict::Pass,
                }),
                CheckResult::Fail { kind, detail } => {
                    let mut accepted_fix = false;
                    if v.auto_fix_capable() {
                        if let Some(fixed) = v.fix(&current) {
                            let before = self.score_source(&current);
                            let after = self.score_source(&fixed);
                            if after + f32::EPSILON >= before {
                                current = fixed;
                                accepted_fix = true;
                            }
                        }
                    }
                    if accepted_fix {
                        entries.push(ValidatorReportEntry {
                            name: v.name().to_string(),
                            verdict: ValidatorVerdict::Fixed,
                        });
                    } else {
                        entries.push(ValidatorReportEntry {
                            name: v.name().to_string(),
                            verdict: ValidatorVerdict::Fail { kind, detail },
                        });
                        if v.subsumes() {
                            aborted = true;
                        }
                    }
                }
            }
        }

        let mut total_weight = 0.0_f32;
        let mut earned = 0.0_f32;
        for e in &entries {
            let weight = weight_for(&self.config, &e.name);
            match &e.verdict {
                ValidatorVerdict::Pass | ValidatorVerdict::Fixed => {
                    total_weight += weight;
                    earned += weight;
                }
                ValidatorVerdict::Fail { .. } => {
                    total_weight += weight;
                }
                ValidatorVerdict::SkippedMissingTool | ValidatorVerdict::Skipped { .. } => {}
            }
        }
        let quality_score = if total_weight <= 0.0 { 0.0 } else { earned / total_weight };
        let grade = if quality_score >= 0.9 {
            Grade::A
        } else if quality_score >= 0.8 {
            Grade::B
        } else if quality_score >= 0.7 {
            Grade::C
        } else if quality_score >= 0.6 {
            Grade::D
        } else {
            Grade::F
        };

        ValidationReport {
            entries,
            quality_score,
            grade,
            final_source: current,
        }
    }
}

// ---------------------------------------------------------------------
// Default validators
// ---------------------------------------------------------------------

struct SyntaxValidator;
impl Validator for SyntaxValidator {
    fn name(&self) -> &'static str {
        "syntax"
    }
    fn priority(&self) -> u32 {
        200
    }
    fn subsumes(&self) -> bool {
        true
    }
    fn check(&self, source: &str, _config: &ValidationConfig) -> CheckResult {
        let mut stack = Vec::new();
        for (i, c) in source.chars().enumerate() {
            match c {
                '(' | '[' | '{' => stack.push(c),
                ')' => {
                    if stack.pop() != Some('(') {
                        return CheckResult::Fail { kind: "syntax".to_string(), detail: format!("unbalanced ')' at byte {i}") };
                    }
                }
                ']' => {
                    if stack.pop() != Some('[') {
                        return CheckResult::Fail { kind: "syntax".to_string(), detail: format!("unbalanced ']' at byte {i}") };
                    }
                }
                '}' => {
                    if stack.pop() != Some('{') {
                        return CheckResult::Fail { kind: "syntax".to_string(), detail: format!("unbalanced '}}' at byte {i}") };
                    }
                }
                _ => {}
            }
        }
        if !stack.is_empty() {
            return CheckResult::Fail { kind: "syntax".to_string(), detail: format!("{} unclosed bracket(s)", stack.len()) };
        }
        CheckResult::Pass
    }
}

struct StructureValidator;
impl Validator for StructureValidator {
    fn name(&self) -> &'static str {
        "structure"
    }
    fn priority(&self) -> u32 {
        180
    }
    fn auto_fix_capable(&self) -> bool {
        true
    }
    fn check(&self, source: &str, _config: &ValidationConfig) -> CheckResult {
        let has_main = source.contains("def main(");
        let has_guard = source.contains("if __name__ == \"__main__\":") || source.contains("if __name__ == '__main__':");
        let guard_calls_main = has_guard && source.contains("main()");
        if !has_main {
            return CheckResult::Fail { kind: "structure".to_string(), detail: "no `def main()` declared".to_string() };
        }
        if !has_guard || !guard_calls_main {
            return CheckResult::Fail { kind: "structure".to_string(), detail: "missing `__main__` guard invoking main()".to_string() };
        }
        CheckResult::Pass
    }
    fn fix(&self, source: &str) -> Option<String> {
        if !source.contains("def main(") {
            return None;
        }
        if source.contains("if __name__ == \"__main__\":") || source.contains("if __name__ == '__main__':") {
            return None;
        }
        Some(format!("{}\n\nif __name__ == \"__main__\":\n    main()\n", source.trim_end()))
    }
}

struct JsonOutputValidator;
impl Validator for JsonOutputValidator {
    fn name(&self) -> &'static str {
        "json-output"
    }
    fn priority(&self) -> u32 {
        150
    }
    fn check(&self, source: &str, _config: &ValidationConfig) -> CheckResult {
        if source.contains("json.dumps(") {
            CheckResult::Pass
        } else {
            CheckResult::Fail { kind: "json-output".to_string(), detail: "no `json.dumps` call found".to_string() }
        }
    }
}

struct StdinJsonValidator;
impl Validator for StdinJsonValidator {
    fn name(&self) -> &'static str {
        "stdin-json"
    }
    fn priority(&self) -> u32 {
        140
    }
    fn check(&self, source: &str, _config: &ValidationConfig) -> CheckResult {
        let reads_stdin = source.contains("sys.stdin");
        if !reads_stdin {
            return CheckResult::Pass; // nothing to check if input is not consumed
        }
        if source.contains("json.load(") || source.contains("json.loads(") {
            CheckResult::Pass
        } else {
            CheckResult::Fail { kind: "stdin-json".to_string(), detail: "reads stdin but never parses it as JSON".to_string() }
        }
    }
}

struct UndefinedNamesValidator;
impl Validator for UndefinedNamesValidator {
    fn name(&self) -> &'static str {
        "undefined-names"
    }
    fn priority(&self) -> u32 {
        120
    }
    fn check(&self, source: &str, _config: &ValidationConfig) -> CheckResult {
        let import_re = Regex::new(r"(?m)^import (\w+)$").unwrap();
        for cap in import_re.captures_iter(source) {
            let name = &cap[1];
            let uses = source.matches(name).count();
            if uses <= 1 {
                return CheckResult::Fail { kind: "undefined-names".to_string(), detail: format!("unused import `{name}`") };
            }
        }
        CheckResult::Pass
    }
}

struct ImportOrderValidator;
impl Validator for ImportOrderValidator {
    fn name(&self) -> &'static str {
        "import-order"
    }
    fn priority(&self) -> u32 {
        110
    }
    fn auto_fix_capable(&self) -> bool {
        true
    }
    fn check(&self, source: &str, _config: &ValidationConfig) -> CheckResult {
        let groups = import_groups(source);
        if is_sorted_nondecreasing(&groups) {
            CheckResult::Pass
        } else {
            CheckResult::Fail { kind: "import-order".to_string(), detail: "imports not grouped stdlib/third-party/local".to_string() }
        }
    }
    fn fix(&self, source: &str) -> Option<String> {
        reorder_imports(source)
    }
}

struct RuntimeImportOrderValidator;
impl Validator for RuntimeImportOrderValidator {
    fn name(&self) -> &'static str {
        "runtime-import-order"
    }
    fn priority(&self) -> u32 {
        100
    }
    fn auto_fix_capable(&self) -> bool {
        true
    }
    fn check(&self, source: &str, _config: &ValidationConfig) -> CheckResult {
        let Some(runtime_line) = source.lines().position(|l| l.contains("tool_runtime")) else {
            return CheckResult::Pass;
        };
        let Some(path_setup_line) = source.lines().position(|l| l.contains("sys.path")) else {
            return CheckResult::Pass;
        };
        if runtime_line > path_setup_line {
            CheckResult::Pass
        } else {
            CheckResult::Fail { kind: "runtime-import-order".to_string(), detail: "tool_runtime import precedes sys.path setup".to_string() }
        }
    }
    fn fix(&self, source: &str) -> Option<String> {
        let mut lines: Vec<&str> = source.lines().collect();
        let runtime_idx = lines.iter().position(|l| l.contains("tool_runtime"))?;
        let path_idx = lines.iter().position(|l| l.contains("sys.path"))?;
        if runtime_idx < path_idx {
            let runtime_line = lines.remove(runtime_idx);
            let insert_at = path_idx; // path_idx shifted down by one removal
            lines.insert(insert_at, runtime_line);
            Some(lines.join("\n"))
        } else {
            None
        }
    }
}

struct ToolCallArityValidator;
impl Validator for ToolCallArityValidator {
    fn name(&self) -> &'static str {
        "tool-call-arity"
    }
    fn priority(&self) -> u32 {
        90
    }
    fn check(&self, source: &str, _config: &ValidationConfig) -> CheckResult {
        let re = Regex::new(r#"call_tool\(\s*([^,)]+)"#).unwrap();
        for cap in re.captures_iter(source) {
            let first_arg = cap[1].trim();
            let is_literal = (first_arg.starts_with('"') && first_arg.ends_with('"'))
                || (first_arg.starts_with('\'') && first_arg.ends_with('\''));
            if !is_literal {
                return CheckResult::Fail {
                    kind: "tool-call-arity".to_string(),
                    detail: format!("call_tool's tool_name argument `{first_arg}` is not a literal string"),
                };
            }
        }
        CheckResult::Pass
    }
}

struct TypeCheckValidator;
impl Validator for TypeCheckValidator {
    fn name(&self) -> &'static str {
        "type-check"
    }
    fn priority(&self) -> u32 {
        80
    }
    fn check(&self, source: &str, _config: &ValidationConfig) -> CheckResult {
        // Heuristic: a function declared with a `-> None` return
        // annotation must not contain a bare `return <expr>`.
        let re = Regex::new(r"def\s+\w+\([^)]*\)\s*->\s*None\s*:").unwrap();
        for m in re.find_iter(source) {
            let after = &source[m.end()..];
            let body_end = after.find("\ndef ").unwrap_or(after.len());
            let body = &after[..body_end];
            if Regex::new(r"return\s+\S").unwrap().is_match(body) {
                return CheckResult::Fail {
                    kind: "type-check".to_string(),
                    detail: "function annotated `-> None` returns a value".to_string(),
                };
            }
        }
        CheckResult::Pass
    }
}

struct SecurityValidator {
    patterns: Vec<(Regex, &'static str)>,
}
impl SecurityValidator {
    fn new() -> Self {
        Self {
            patterns: vec![
                (Regex::new(r#"(?i)(api_key|secret|password|token)\s*=\s*["'][^"']{4,}["']"#).unwrap(), "hardcoded_secret"),
                (Regex::new(r"(?i)subprocess\.(Popen|call|run)\([^)]*shell\s*=\s*True").unwrap(), "unchecked_shell"),
                (Regex::new(r"os\.system\(").unwrap(), "unchecked_shell"),
                (Regex::new(r"(?i)rm\s+-rf\s+/").unwrap(), "destructive_command"),
                (Regex::new(r"\beval\(").unwrap(), "raw_eval"),
                (Regex::new(r"\bexec\(").unwrap(), "raw_exec"),
            ],
        }
    }
}
impl Validator for SecurityValidator {
    fn name(&self) -> &'static str {
        "security"
    }
    fn priority(&self) -> u32 {
        70
    }
    fn check(&self, source: &str, _config: &ValidationConfig) -> CheckResult {
        for (pattern, name) in &self.patterns {
            if pattern.is_match(source) {
                return CheckResult::Fail { kind: "security".to_string(), detail: name.to_string() };
            }
        }
        CheckResult::Pass
    }
}

struct ComplexityValidator;
impl Validator for ComplexityValidator {
    fn name(&self) -> &'static str {
        "complexity"
    }
    fn priority(&self) -> u32 {
        60
    }
    fn required_tool(&self) -> Option<&'static str> {
        Some("radon")
    }
    fn check(&self, source: &str, config: &ValidationConfig) -> CheckResult {
        let branch_re = Regex::new(r"\b(if|elif|for|while|except|and|or)\b").unwrap();
        let cyclomatic = 1 + branch_re.find_iter(source).count() as u32;
        if cyclomatic > config.max_cc {
            return CheckResult::Fail {
                kind: "complexity".to_string(),
                detail: format!("cyclomatic complexity {cyclomatic} exceeds max_cc {}", config.max_cc),
            };
        }
        let lines = source.lines().filter(|l| !l.trim().is_empty()).count().max(1) as f32;
        let maintainability = (171.0 - 5.2 * (lines.ln()) - 0.23 * cyclomatic as f32).max(0.0).min(100.0);
        if maintainability < config.min_mi {
            return CheckResult::Fail {
                kind: "complexity".to_string(),
                detail: format!("maintainability index {maintainability:.1} below min_mi {}", config.min_mi),
            };
        }
        CheckResult::Pass
    }
}

fn import_groups(source: &str) -> Vec<u8> {
    const STDLIB: &[&str] = &["sys", "os", "json", "re", "math", "itertools", "collections", "typing"];
    let import_re = Regex::new(r"(?m)^(?:import|from) (\w+)").unwrap();
    import_re
        .captures_iter(source)
        .map(|cap| {
            let module = &cap[1];
            if STDLIB.contains(&module) {
                0
            } else if module == "tool_runtime" {
                2
            } else {
                1
            }
        })
        .collect()
}

fn is_sorted_nondecreasing(groups: &[u8]) -> bool {
    groups.windows(2).all(|w| w[0] <= w[1])
}

fn reorder_imports(source: &str) -> Option<String> {
    let import_re = Regex::new(r"(?m)^(?:import|from) .+$").unwrap();
    let import_lines: Vec<&str> = import_re.find_iter(source).map(|m| m.as_str()).collect();
    if import_lines.len() < 2 {
        return None;
    }
    const STDLIB: &[&str] = &["sys", "os", "json", "re", "math", "itertools", "collections", "typing"];
    let group_of = |line: &str| -> u8 {
        let word = line.split_whitespace().nth(1).unwrap_or("");
        let module = word.trim_end_matches(',');
        if STDLIB.contains(&module) {
            0
        } else if module == "tool_runtime" {
            2
        } else {
            1
        }
    };
    let mut sorted = import_lines.clone();
    sorted.sort_by_key(|l| group_of(l));
    if sorted == import_lines {
        return None;
    }
    let mut result = source.to_string();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut sorted_iter = sorted.into_iter();
    for original in &import_lines {
        if seen.insert(original) {
            if let Some(replacement) = sorted_iter.next() {
                result = result.replacen(original, replacement, 1);
            }
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_source() -> String {
        "import sys\nimport json\n\n\
         def main():\n    data = json.loads(sys.stdin.read())\n    print(json.dumps({\"result\": data}))\n\n\
         if __name__ == \"__main__\":\n    main()\n"
            .to_string()
    }

    #[tokio::test]
    async fn a_clean_script_passes_every_validator() {
        let pipeline = ValidationPipeline::new(ValidationConfig::default(), None);
        let report = pipeline.run(&good_source()).await;
        assert!(report.all_pass_or_fixed(), "{:?}", report.entries);
        assert!(report.quality_score > 0.9);
    }

    #[tokio::test]
    async fn missing_main_guard_is_auto_fixed() {
        let source = "def main():\n    print('hi')\n";
        let pipeline = ValidationPipeline::new(ValidationConfig::default(), None);
        let report = pipeline.run(source).await;
        let structure = report.entries.iter().find(|e| e.name == "structure").unwrap();
        assert_eq!(structure.verdict, ValidatorVerdict::Fixed);
        assert!(report.final_source.contains("__main__"));
    }

    #[tokio::test]
    async fn unbalanced_brackets_abort_the_pipeline() {
        let source = "def main(:\n    pass\n";
        let pipeline = ValidationPipeline::new(ValidationConfig::default(), None);
        let report = pipeline.run(source).await;
        let syntax = report.entries.iter().find(|e| e.name == "syntax").unwrap();
        assert!(matches!(syntax.verdict, ValidatorVerdict::Fail { .. }));
        let structure = report.entries.iter().find(|e| e.name == "structure").unwrap();
        assert!(matches!(structure.verdict, ValidatorVerdict::Skipped { .. }));
    }

    #[tokio::test]
    async fn hardcoded_secret_fails_security_and_is_never_autofixed() {
        let source = format!("{}\napi_key = \"sk-thisislongenough\"\n", good_source());
        let pipeline = ValidationPipeline::new(ValidationConfig::default(), None);
        let report = pipeline.run(&source).await;
        let security = report.entries.iter().find(|e| e.name == "security").unwrap();
        assert!(matches!(security.verdict, ValidatorVerdict::Fail { .. }));
        assert!(report.final_source.contains("api_key"), "security never auto-fixes (B3)");
    }

    #[tokio::test]
    async fn complexity_is_skipped_missing_tool_when_radon_is_absent_and_no_recipe_exists() {
        let pipeline = ValidationPipeline::new(ValidationConfig::default(), None);
        let report = pipeline.run(&good_source()).await;
        let complexity = report.entries.iter().find(|e| e.name == "complexity").unwrap();
        assert_eq!(complexity.verdict, ValidatorVerdict::SkippedMissingTool);
    }

    #[test]
    fn unused_import_fails_undefined_names() {
        let source = "import os\n\ndef main():\n    pass\n\nif __name__ == \"__main__\":\n    main()\n";
        let validator = UndefinedNamesValidator;
        assert!(matches!(validator.check(source, &ValidationConfig::default()), CheckResult::Fail { .. }));
    }
}
