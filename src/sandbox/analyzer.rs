//! Static security analysis of submitted programs.
//!
//! The analyzer parses the source and inspects every node of the resulting
//! arena for constructs that could reach outside the sandbox:
//!
//! - imports of modules that are not allow-listed (and every relative import),
//! - references to built-ins of the host language that are not allow-listed,
//! - dunder and reflection attribute access, which could otherwise walk from
//!   an ordinary value to its class, its bases and the global namespace,
//! - definitions (`def`, `class`, `lambda`), which are refused outright,
//! - `str.format` templates that are not literals or whose replacement
//!   fields walk attributes or items (`"{0.__class__}"`).
//!
//! All violations are collected instead of stopping at the first one. The
//! inspection is a flat pass over the node arenas, so adversarially deep
//! programs cannot exhaust the analyzer's stack.

use tracing::debug;

use crate::sandbox::config::{is_dunder, AllowList, KNOWN_BUILTINS};
use crate::sandbox::outcome::{AnalysisViolation, ViolationKind};
use crate::syntax::ast::{Constant, ExprId, ExprKind, Program, StmtKind};
use crate::syntax::{parse_program, Location};

/// Methods that resolve replacement fields against their arguments.
const FORMAT_METHODS: &[&str] = &["format", "format_map"];

/// A program that passed analysis.
///
/// Only [`analyze`] can produce one, so holding an `AnalyzedProgram` proves
/// the source was inspected against an allow-list.
#[derive(Debug, Clone)]
pub struct AnalyzedProgram {
    source: String,
    program: Program,
}

impl AnalyzedProgram {
    /// The approved source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The approved syntax tree.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Take the approved source text.
    pub fn into_source(self) -> String {
        self.source
    }
}

/// Parse `source` and check it against `allow_list`.
///
/// On rejection the violations are ordered by source position. A parse
/// failure is reported as exactly one [`ViolationKind::SyntaxError`].
pub fn analyze(
    source: &str,
    allow_list: &AllowList,
) -> Result<AnalyzedProgram, Vec<AnalysisViolation>> {
    let program = match parse_program(source) {
        Ok(program) => program,
        Err(err) => {
            debug!(error = %err, "source failed to parse");
            return Err(vec![AnalysisViolation::new(
                ViolationKind::SyntaxError,
                err.message,
                err.location,
            )]);
        }
    };

    let violations = inspect(&program, allow_list);
    if violations.is_empty() {
        debug!(
            statements = program.stmts().len(),
            expressions = program.exprs().len(),
            "program approved"
        );
        Ok(AnalyzedProgram {
            source: source.to_owned(),
            program,
        })
    } else {
        debug!(count = violations.len(), "program rejected");
        Err(violations)
    }
}

/// Collect every violation in `program`, sorted by location.
fn inspect(program: &Program, allow_list: &AllowList) -> Vec<AnalysisViolation> {
    let mut inspector = Inspector {
        program,
        allow_list,
        violations: Vec::new(),
    };
    for expr in program.exprs() {
        inspector.check_expr(&expr.kind, expr.location);
    }
    for stmt in program.stmts() {
        inspector.check_stmt(&stmt.kind, stmt.location);
    }
    let mut violations = inspector.violations;
    violations.sort_by_key(|v| v.location());
    violations
}

struct Inspector<'a> {
    program: &'a Program,
    allow_list: &'a AllowList,
    violations: Vec<AnalysisViolation>,
}

impl Inspector<'_> {
    fn report(&mut self, kind: ViolationKind, symbol: impl Into<String>, location: Location) {
        self.violations
            .push(AnalysisViolation::new(kind, symbol, location));
    }

    /// Names bound or referenced directly, outside of attribute access.
    fn check_identifier(&mut self, name: &str, location: Location) {
        if is_dunder(name) {
            self.report(ViolationKind::ForbiddenAttribute, name, location);
        } else if KNOWN_BUILTINS.contains(&name) && !self.allow_list.allows_builtin(name) {
            self.report(ViolationKind::ForbiddenCall, name, location);
        }
    }

    fn check_binding(&mut self, name: &str, location: Location) {
        if is_dunder(name) {
            self.report(ViolationKind::ForbiddenAttribute, name, location);
        }
    }

    fn check_expr(&mut self, kind: &ExprKind, location: Location) {
        match kind {
            ExprKind::Name(name) => self.check_identifier(name, location),
            ExprKind::Attribute { value, attr } => {
                if self.allow_list.forbids_attribute(attr)
                    || (FORMAT_METHODS.contains(&attr.as_str()) && !self.is_plain_template(*value))
                {
                    self.report(ViolationKind::ForbiddenAttribute, attr.as_str(), location);
                }
            }
            ExprKind::Call { keywords, .. } => {
                for keyword in keywords {
                    if let Some(name) = &keyword.name {
                        self.check_binding(name, location);
                    }
                }
            }
            ExprKind::Lambda { .. } => {
                self.report(ViolationKind::ForbiddenDefinition, "lambda", location)
            }
            ExprKind::Constant(_)
            | ExprKind::FString(_)
            | ExprKind::List(_)
            | ExprKind::Tuple(_)
            | ExprKind::Set(_)
            | ExprKind::Dict(_)
            | ExprKind::BinOp { .. }
            | ExprKind::UnaryOp { .. }
            | ExprKind::BoolOp { .. }
            | ExprKind::Compare { .. }
            | ExprKind::IfExp { .. }
            | ExprKind::Starred(_)
            | ExprKind::Subscript { .. }
            | ExprKind::Slice { .. }
            | ExprKind::ListComp { .. }
            | ExprKind::SetComp { .. }
            | ExprKind::GeneratorExp { .. }
            | ExprKind::DictComp { .. }
            | ExprKind::Yield(_)
            | ExprKind::Await(_) => {}
        }
    }

    fn is_plain_template(&self, id: ExprId) -> bool {
        match &self.program.expr(id).kind {
            ExprKind::Constant(Constant::Str(template)) => fields_are_plain(template),
            _ => false,
        }
    }

    fn check_stmt(&mut self, kind: &StmtKind, location: Location) {
        match kind {
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    if !self.allow_list.allows_module(&alias.name) {
                        self.report(
                            ViolationKind::ForbiddenImport,
                            alias.name.as_str(),
                            alias.location,
                        );
                    }
                    if let Some(asname) = &alias.asname {
                        self.check_binding(asname, alias.location);
                    }
                }
            }
            StmtKind::ImportFrom {
                module,
                names,
                level,
            } => {
                let module_name = module.as_deref().unwrap_or("");
                if *level > 0 {
                    let dots = ".".repeat(*level as usize);
                    self.report(
                        ViolationKind::ForbiddenImport,
                        format!("{dots}{module_name}"),
                        location,
                    );
                } else if !self.allow_list.allows_module(module_name) {
                    self.report(ViolationKind::ForbiddenImport, module_name, location);
                }
                for alias in names {
                    if self.allow_list.forbids_attribute(&alias.name) {
                        self.report(
                            ViolationKind::ForbiddenAttribute,
                            alias.name.as_str(),
                            alias.location,
                        );
                    }
                    if let Some(asname) = &alias.asname {
                        self.check_binding(asname, alias.location);
                    }
                }
            }
            StmtKind::FunctionDef { name, .. } | StmtKind::ClassDef { name, .. } => {
                self.report(ViolationKind::ForbiddenDefinition, name.as_str(), location)
            }
            StmtKind::Global(names) | StmtKind::Nonlocal(names) => {
                for name in names {
                    self.check_binding(name, location);
                }
            }
            StmtKind::Try { handlers, .. } => {
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        self.check_binding(name, handler.location);
                    }
                }
            }
            StmtKind::Expr(_)
            | StmtKind::Assign { .. }
            | StmtKind::AugAssign { .. }
            | StmtKind::AnnAssign { .. }
            | StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::For { .. }
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass
            | StmtKind::Delete(_)
            | StmtKind::Assert { .. }
            | StmtKind::Raise { .. }
            | StmtKind::Return(_) => {}
        }
    }
}

/// Whether no replacement field name in `template` contains `.` or `[`.
fn fields_are_plain(template: &str) -> bool {
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '{' {
            continue;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            continue;
        }
        for c in chars.by_ref() {
            match c {
                '.' | '[' => return false,
                ':' | '!' | '}' => break,
                _ => {}
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reject(source: &str) -> Vec<AnalysisViolation> {
        match analyze(source, &AllowList::default()) {
            Ok(_) => panic!("expected {source:?} to be rejected"),
            Err(violations) => violations,
        }
    }

    fn summary(violations: &[AnalysisViolation]) -> Vec<(ViolationKind, &str)> {
        violations.iter().map(|v| (v.kind(), v.symbol())).collect()
    }

    #[test]
    fn test_accepts_plain_program() {
        let analyzed = analyze(
            "import math\nvalues = [math.sqrt(x) for x in range(10)]\nresult = sum(values)",
            &AllowList::default(),
        )
        .unwrap();
        assert!(!analyzed.program().body().is_empty());
    }

    #[test]
    fn test_forbidden_import() {
        let violations = reject("import os");
        assert_eq!(summary(&violations), [(ViolationKind::ForbiddenImport, "os")]);
        assert_eq!(violations[0].location(), Location::new(1, 8));
    }

    #[test]
    fn test_dotted_import_needs_full_name() {
        let violations = reject("import os.path\nfrom subprocess import run");
        assert_eq!(
            summary(&violations),
            [
                (ViolationKind::ForbiddenImport, "os.path"),
                (ViolationKind::ForbiddenImport, "subprocess"),
            ]
        );
    }

    #[test]
    fn test_relative_import_always_forbidden() {
        let violations = reject("from . import math");
        assert_eq!(summary(&violations), [(ViolationKind::ForbiddenImport, ".")]);
    }

    #[test]
    fn test_from_import_of_dunder() {
        let violations = reject("from math import __loader__");
        assert_eq!(
            summary(&violations),
            [(ViolationKind::ForbiddenAttribute, "__loader__")]
        );
    }

    #[test]
    fn test_forbidden_call() {
        let violations = reject("eval('1 + 1')\nx = open('/etc/passwd')");
        assert_eq!(
            summary(&violations),
            [
                (ViolationKind::ForbiddenCall, "eval"),
                (ViolationKind::ForbiddenCall, "open"),
            ]
        );
    }

    #[test]
    fn test_aliasing_a_builtin_is_caught() {
        let violations = reject("f = getattr\nf(1, 'real')");
        assert_eq!(summary(&violations), [(ViolationKind::ForbiddenCall, "getattr")]);
    }

    #[test]
    fn test_attribute_chain() {
        let violations = reject("x = ().__class__.__bases__");
        assert_eq!(
            summary(&violations),
            [
                (ViolationKind::ForbiddenAttribute, "__class__"),
                (ViolationKind::ForbiddenAttribute, "__bases__"),
            ]
        );
    }

    #[test]
    fn test_reflection_attribute() {
        let violations = reject("g = (x for x in []).gi_frame.f_globals");
        assert_eq!(
            summary(&violations),
            [
                (ViolationKind::ForbiddenAttribute, "gi_frame"),
                (ViolationKind::ForbiddenAttribute, "f_globals"),
            ]
        );
    }

    #[test]
    fn test_dunder_name() {
        let violations = reject("b = __builtins__");
        assert_eq!(
            summary(&violations),
            [(ViolationKind::ForbiddenAttribute, "__builtins__")]
        );
    }

    #[test]
    fn test_definitions_rejected() {
        let violations = reject("def f(): pass");
        assert_eq!(summary(&violations), [(ViolationKind::ForbiddenDefinition, "f")]);

        let violations = reject("class A:\n    pass\n");
        assert_eq!(summary(&violations), [(ViolationKind::ForbiddenDefinition, "A")]);

        let violations = reject("square = lambda x: x * x");
        assert_eq!(
            summary(&violations),
            [(ViolationKind::ForbiddenDefinition, "lambda")]
        );
    }

    #[test]
    fn test_definition_body_is_still_inspected() {
        let violations = reject("def f():\n    import os\n    return eval('1')\n");
        assert_eq!(
            summary(&violations),
            [
                (ViolationKind::ForbiddenDefinition, "f"),
                (ViolationKind::ForbiddenImport, "os"),
                (ViolationKind::ForbiddenCall, "eval"),
            ]
        );
    }

    #[test]
    fn test_all_violations_reported_in_order() {
        let source = "\
import os
import sys
x = ().__class__
exec('pass')
def g(): pass
";
        let violations = reject(source);
        assert_eq!(violations.len(), 5);
        let lines: Vec<u32> = violations.iter().map(|v| v.location().line).collect();
        assert_eq!(lines, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_violation_inside_fstring() {
        let violations = reject("s = f'{x.__class__}'");
        assert_eq!(
            summary(&violations),
            [(ViolationKind::ForbiddenAttribute, "__class__")]
        );
    }

    #[test]
    fn test_syntax_error_is_single_violation() {
        let violations = reject("x = (1 +");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind(), ViolationKind::SyntaxError);
    }

    #[test]
    fn test_custom_allow_list() {
        let allow = AllowList::new(["print"], ["math"]);
        assert!(analyze("print(1)", &allow).is_ok());
        let violations = analyze("len([1])", &allow).unwrap_err();
        assert_eq!(summary(&violations), [(ViolationKind::ForbiddenCall, "len")]);
        assert!(analyze("import json", &allow).is_err());
    }

    #[test]
    fn test_deep_nesting_does_not_crash() {
        let source = format!("x = {}1{}", "(".repeat(5000), ")".repeat(5000));
        let violations = reject(&source);
        assert_eq!(violations[0].kind(), ViolationKind::SyntaxError);
    }

    #[test]
    fn test_long_elif_chain_does_not_crash() {
        let source = format!("if x:\n    pass\n{}", "elif x:\n    pass\n".repeat(7000));
        // the size of a tokio worker thread's stack
        let analyzed = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || analyze(&source, &AllowList::default()).map(|a| a.program().stmts().len()))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(analyzed.unwrap(), 14_002);
    }

    #[test]
    fn test_unbound_method_reference_is_allowed() {
        let analyzed = analyze(
            "words = ['b', 'A', 'c']\nresult = sorted(words, key=str.lower)\n",
            &AllowList::default(),
        )
        .unwrap();
        assert!(analyzed.source().contains("str.lower"));
    }

    #[test]
    fn test_literal_format_templates() {
        let source = "a = '{} and {name}'.format(1, name=2)\nb = '{{0.x}} {0:>{1}}'.format(3, 4)\n";
        assert!(analyze(source, &AllowList::default()).is_ok());

        let source = "a = '{0.__class__}'.format(1)\nb = '{0[0]}'.format([1])\nc = '{x:{y.real}}'.format_map(d)\n";
        assert_eq!(
            summary(&reject(source)),
            [
                (ViolationKind::ForbiddenAttribute, "format"),
                (ViolationKind::ForbiddenAttribute, "format"),
                (ViolationKind::ForbiddenAttribute, "format_map"),
            ]
        );
    }

    #[test]
    fn test_non_literal_format_template() {
        let source = "t = '{0.real}'\na = t.format(1)\nb = str.format('{}', 1)\n";
        assert_eq!(
            summary(&reject(source)),
            [
                (ViolationKind::ForbiddenAttribute, "format"),
                (ViolationKind::ForbiddenAttribute, "format"),
            ]
        );
    }

    #[test]
    fn test_exception_alias_cannot_bind_dunder() {
        let violations = reject("try:\n    pass\nexcept ValueError as __builtins__:\n    pass\n");
        assert_eq!(
            summary(&violations),
            [(ViolationKind::ForbiddenAttribute, "__builtins__")]
        );
    }
}
