//! Parsing with `rustpython-parser` and lowering into the arena.
//!
//! The lowering pass and the teardown of the parser's own tree both recurse
//! once per nesting level, so [`parse_program`] runs them on a dedicated
//! thread with a large stack. Long `elif` chains and operator chains then
//! behave the same no matter which thread the caller is on.

use std::thread;

use rustpython_parser::ast::{self as py, Ranged};
use rustpython_parser::lexer::lex;
use rustpython_parser::text_size::{TextRange, TextSize};
use rustpython_parser::{Mode, Parse, Tok};
use tracing::warn;

use super::ast::{
    Alias, BinOp, BoolOp, CmpOp, Comprehension, Constant, ExceptHandler, ExprId, ExprKind,
    FStringPart, Keyword, Location, Program, StmtId, StmtKind, UnaryOp,
};
use super::{SyntaxError, MAX_NESTING_DEPTH, MAX_TREE_DEPTH};

/// Name reported by the parser for the submitted text.
const SOURCE_PATH: &str = "<sandbox>";

const PARSER_STACK_SIZE: usize = 256 * 1024 * 1024;

type Lowered<T> = Result<T, SyntaxError>;

/// Parse `source` into an arena [`Program`].
///
/// Bracket and indentation nesting deeper than [`MAX_NESTING_DEPTH`], trees
/// deeper than [`MAX_TREE_DEPTH`] and constructs outside the supported
/// subset are reported as syntax errors.
pub fn parse_program(source: &str) -> Result<Program, SyntaxError> {
    thread::scope(|scope| {
        let parser = thread::Builder::new()
            .name("sandbox-parser".into())
            .stack_size(PARSER_STACK_SIZE)
            .spawn_scoped(scope, || parse_on_current_thread(source));
        match parser {
            Ok(handle) => handle.join().unwrap_or_else(|_| {
                warn!("parser thread panicked");
                Err(SyntaxError::new("program could not be parsed", Location::new(1, 1)))
            }),
            Err(e) => {
                warn!(error = %e, "failed to spawn parser thread");
                Err(SyntaxError::new(
                    format!("program could not be parsed: {e}"),
                    Location::new(1, 1),
                ))
            }
        }
    })
}

fn parse_on_current_thread(source: &str) -> Result<Program, SyntaxError> {
    let lines = LineIndex::new(source);
    check_nesting(source, &lines)?;
    let suite = py::Suite::parse(source, SOURCE_PATH)
        .map_err(|e| SyntaxError::new(e.error.to_string(), lines.at(e.offset)))?;
    let mut lowering = Lowering {
        lines: &lines,
        program: Program::default(),
        depth: 0,
        loops: 0,
        in_function: false,
    };
    let body = lowering.block(&suite)?;
    lowering.program.set_body(body);
    Ok(lowering.program)
}

/// Reject bracket or block nesting beyond [`MAX_NESTING_DEPTH`].
fn check_nesting(source: &str, lines: &LineIndex<'_>) -> Lowered<()> {
    let mut brackets = 0usize;
    let mut blocks = 0usize;
    for token in lex(source, Mode::Module) {
        // lexical errors are left to the parser, which reports them better
        let Ok((tok, range)) = token else { break };
        match tok {
            Tok::Lpar | Tok::Lsqb | Tok::Lbrace => {
                brackets += 1;
                if brackets > MAX_NESTING_DEPTH {
                    return Err(SyntaxError::new(
                        "too many nested parentheses",
                        lines.at(range.start()),
                    ));
                }
            }
            Tok::Rpar | Tok::Rsqb | Tok::Rbrace => brackets = brackets.saturating_sub(1),
            Tok::Indent => {
                blocks += 1;
                if blocks > MAX_NESTING_DEPTH {
                    return Err(SyntaxError::new(
                        "too many levels of indentation",
                        lines.at(range.start()),
                    ));
                }
            }
            Tok::Dedent => blocks = blocks.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// Maps byte offsets to 1-based line and character columns.
struct LineIndex<'a> {
    source: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(source: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { source, starts }
    }

    fn at(&self, offset: TextSize) -> Location {
        let offset = usize::from(offset).min(self.source.len());
        let line = self
            .starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let start = self.starts.get(line).copied().unwrap_or(0);
        let column = self
            .source
            .get(start..offset)
            .map_or(0, |text| text.chars().count());
        Location::new(line as u32 + 1, column as u32 + 1)
    }
}

struct Lowering<'a> {
    lines: &'a LineIndex<'a>,
    program: Program,
    depth: usize,
    /// Enclosing loops of the current function or class body.
    loops: usize,
    in_function: bool,
}

impl Lowering<'_> {
    fn error(&self, message: impl Into<String>, range: TextRange) -> SyntaxError {
        SyntaxError::new(message, self.lines.at(range.start()))
    }

    fn block(&mut self, stmts: &[py::Stmt]) -> Lowered<Vec<StmtId>> {
        stmts.iter().map(|stmt| self.stmt(stmt)).collect()
    }

    fn exprs(&mut self, exprs: &[py::Expr]) -> Lowered<Vec<ExprId>> {
        exprs.iter().map(|expr| self.expr(expr)).collect()
    }

    fn opt_expr(&mut self, expr: Option<&py::Expr>) -> Lowered<Option<ExprId>> {
        expr.map(|expr| self.expr(expr)).transpose()
    }

    /// Run `lower` in a fresh function or class body.
    fn nested_scope<T>(
        &mut self,
        function: bool,
        lower: impl FnOnce(&mut Self) -> Lowered<T>,
    ) -> Lowered<T> {
        let saved = (self.loops, self.in_function);
        self.loops = 0;
        self.in_function |= function;
        let lowered = lower(self);
        (self.loops, self.in_function) = saved;
        lowered
    }

    fn stmt(&mut self, stmt: &py::Stmt) -> Lowered<StmtId> {
        self.depth += 1;
        let kind = if self.depth > MAX_TREE_DEPTH {
            Err(self.error("program is too deeply nested", stmt.range()))
        } else {
            self.stmt_kind(stmt)
        };
        self.depth -= 1;
        let location = self.lines.at(stmt.range().start());
        Ok(self.program.push_stmt(kind?, location))
    }

    fn expr(&mut self, expr: &py::Expr) -> Lowered<ExprId> {
        self.depth += 1;
        let kind = if self.depth > MAX_TREE_DEPTH {
            Err(self.error("expression is too deeply nested", expr.range()))
        } else {
            self.expr_kind(expr)
        };
        self.depth -= 1;
        let location = self.lines.at(expr.range().start());
        Ok(self.program.push_expr(kind?, location))
    }

    fn stmt_kind(&mut self, stmt: &py::Stmt) -> Lowered<StmtKind> {
        let range = stmt.range();
        Ok(match stmt {
            py::Stmt::FunctionDef(py::StmtFunctionDef {
                name,
                args,
                body,
                decorator_list,
                returns,
                ..
            }) => self.function(name, args, body, decorator_list, returns.as_deref(), false)?,
            py::Stmt::AsyncFunctionDef(py::StmtAsyncFunctionDef {
                name,
                args,
                body,
                decorator_list,
                returns,
                ..
            }) => self.function(name, args, body, decorator_list, returns.as_deref(), true)?,
            py::Stmt::ClassDef(py::StmtClassDef {
                name,
                bases,
                keywords,
                body,
                decorator_list,
                ..
            }) => {
                let decorators = self.exprs(decorator_list)?;
                let mut bases = self.exprs(bases)?;
                for keyword in keywords {
                    bases.push(self.expr(&keyword.value)?);
                }
                let body = self.nested_scope(false, |this| this.block(body))?;
                StmtKind::ClassDef {
                    name: name.as_str().to_owned(),
                    bases,
                    decorators,
                    body,
                }
            }
            py::Stmt::Return(py::StmtReturn { value, .. }) => {
                if !self.in_function {
                    return Err(self.error("'return' outside function", range));
                }
                StmtKind::Return(self.opt_expr(value.as_deref())?)
            }
            py::Stmt::Delete(py::StmtDelete { targets, .. }) => {
                StmtKind::Delete(self.exprs(targets)?)
            }
            py::Stmt::Assign(py::StmtAssign { targets, value, .. }) => StmtKind::Assign {
                targets: self.exprs(targets)?,
                value: self.expr(value)?,
            },
            py::Stmt::AugAssign(py::StmtAugAssign {
                target, op, value, ..
            }) => StmtKind::AugAssign {
                target: self.expr(target)?,
                op: bin_op(*op),
                value: self.expr(value)?,
            },
            py::Stmt::AnnAssign(py::StmtAnnAssign {
                target,
                annotation,
                value,
                ..
            }) => StmtKind::AnnAssign {
                target: self.expr(target)?,
                annotation: self.expr(annotation)?,
                value: self.opt_expr(value.as_deref())?,
            },
            py::Stmt::For(py::StmtFor {
                target,
                iter,
                body,
                orelse,
                ..
            }) => {
                let target = self.expr(target)?;
                let iter = self.expr(iter)?;
                self.loops += 1;
                let body = self.block(body);
                self.loops -= 1;
                StmtKind::For {
                    target,
                    iter,
                    body: body?,
                    orelse: self.block(orelse)?,
                }
            }
            py::Stmt::While(py::StmtWhile {
                test, body, orelse, ..
            }) => {
                let test = self.expr(test)?;
                self.loops += 1;
                let body = self.block(body);
                self.loops -= 1;
                StmtKind::While {
                    test,
                    body: body?,
                    orelse: self.block(orelse)?,
                }
            }
            py::Stmt::If(py::StmtIf {
                test, body, orelse, ..
            }) => StmtKind::If {
                test: self.expr(test)?,
                body: self.block(body)?,
                orelse: self.block(orelse)?,
            },
            py::Stmt::Raise(py::StmtRaise { exc, cause, .. }) => StmtKind::Raise {
                exc: self.opt_expr(exc.as_deref())?,
                cause: self.opt_expr(cause.as_deref())?,
            },
            py::Stmt::Try(py::StmtTry {
                body,
                handlers,
                orelse,
                finalbody,
                ..
            }) => {
                let body = self.block(body)?;
                let mut lowered = Vec::with_capacity(handlers.len());
                for handler in handlers {
                    let py::ExceptHandler::ExceptHandler(handler) = handler;
                    lowered.push(ExceptHandler {
                        kind: self.opt_expr(handler.type_.as_deref())?,
                        name: handler.name.as_ref().map(|n| n.as_str().to_owned()),
                        body: self.block(&handler.body)?,
                        location: self.lines.at(handler.range.start()),
                    });
                }
                StmtKind::Try {
                    body,
                    handlers: lowered,
                    orelse: self.block(orelse)?,
                    finalbody: self.block(finalbody)?,
                }
            }
            py::Stmt::Assert(py::StmtAssert { test, msg, .. }) => StmtKind::Assert {
                test: self.expr(test)?,
                msg: self.opt_expr(msg.as_deref())?,
            },
            py::Stmt::Import(py::StmtImport { names, .. }) => {
                StmtKind::Import(names.iter().map(|alias| self.alias(alias)).collect())
            }
            py::Stmt::ImportFrom(py::StmtImportFrom {
                module,
                names,
                level,
                ..
            }) => StmtKind::ImportFrom {
                module: module.as_ref().map(|m| m.as_str().to_owned()),
                names: names.iter().map(|alias| self.alias(alias)).collect(),
                level: level.as_ref().map_or(0, |level| level.to_u32()),
            },
            py::Stmt::Global(py::StmtGlobal { names, .. }) => StmtKind::Global(identifiers(names)),
            py::Stmt::Nonlocal(py::StmtNonlocal { names, .. }) => {
                if !self.in_function {
                    return Err(self.error("nonlocal declaration not allowed at module level", range));
                }
                StmtKind::Nonlocal(identifiers(names))
            }
            py::Stmt::Expr(py::StmtExpr { value, .. }) => StmtKind::Expr(self.expr(value)?),
            py::Stmt::Pass(_) => StmtKind::Pass,
            py::Stmt::Break(_) => {
                if self.loops == 0 {
                    return Err(self.error("'break' outside loop", range));
                }
                StmtKind::Break
            }
            py::Stmt::Continue(_) => {
                if self.loops == 0 {
                    return Err(self.error("'continue' not properly in loop", range));
                }
                StmtKind::Continue
            }
            py::Stmt::With(_) | py::Stmt::AsyncWith(_) => {
                return Err(self.error("'with' statements are not supported", range))
            }
            py::Stmt::Match(_) => {
                return Err(self.error("'match' statements are not supported", range))
            }
            py::Stmt::AsyncFor(_) => {
                return Err(self.error("'async for' is not supported", range))
            }
            _ => return Err(self.error("statement is not supported", range)),
        })
    }

    fn function(
        &mut self,
        name: &py::Identifier,
        args: &py::Arguments,
        body: &[py::Stmt],
        decorators: &[py::Expr],
        returns: Option<&py::Expr>,
        is_async: bool,
    ) -> Lowered<StmtKind> {
        let decorators = self.exprs(decorators)?;
        let (params, defaults) = self.arguments(args)?;
        let returns = self.opt_expr(returns)?;
        let body = self.nested_scope(true, |this| this.block(body))?;
        Ok(StmtKind::FunctionDef {
            name: name.as_str().to_owned(),
            params,
            defaults,
            returns,
            decorators,
            body,
            is_async,
        })
    }

    /// Parameter names, and every default and annotation expression.
    fn arguments(&mut self, args: &py::Arguments) -> Lowered<(Vec<String>, Vec<ExprId>)> {
        let mut params = Vec::new();
        let mut values = Vec::new();
        for arg in args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
        {
            params.push(arg.def.arg.as_str().to_owned());
            if let Some(default) = &arg.default {
                values.push(self.expr(default)?);
            }
            if let Some(annotation) = &arg.def.annotation {
                values.push(self.expr(annotation)?);
            }
        }
        for arg in args.vararg.iter().chain(&args.kwarg) {
            params.push(arg.arg.as_str().to_owned());
            if let Some(annotation) = &arg.annotation {
                values.push(self.expr(annotation)?);
            }
        }
        Ok((params, values))
    }

    fn alias(&self, alias: &py::Alias) -> Alias {
        Alias {
            name: alias.name.as_str().to_owned(),
            asname: alias.asname.as_ref().map(|n| n.as_str().to_owned()),
            location: self.lines.at(alias.range.start()),
        }
    }

    fn expr_kind(&mut self, expr: &py::Expr) -> Lowered<ExprKind> {
        let range = expr.range();
        Ok(match expr {
            py::Expr::BoolOp(py::ExprBoolOp { op, values, .. }) => ExprKind::BoolOp {
                op: match op {
                    py::BoolOp::And => BoolOp::And,
                    py::BoolOp::Or => BoolOp::Or,
                },
                values: self.exprs(values)?,
            },
            py::Expr::NamedExpr(_) => {
                return Err(self.error("assignment expressions are not supported", range))
            }
            py::Expr::BinOp(py::ExprBinOp {
                left, op, right, ..
            }) => ExprKind::BinOp {
                left: self.expr(left)?,
                op: bin_op(*op),
                right: self.expr(right)?,
            },
            py::Expr::UnaryOp(py::ExprUnaryOp { op, operand, .. }) => ExprKind::UnaryOp {
                op: match op {
                    py::UnaryOp::Not => UnaryOp::Not,
                    py::UnaryOp::USub => UnaryOp::Neg,
                    py::UnaryOp::UAdd => UnaryOp::Pos,
                    py::UnaryOp::Invert => UnaryOp::Invert,
                },
                operand: self.expr(operand)?,
            },
            py::Expr::Lambda(py::ExprLambda { args, body, .. }) => {
                let (params, defaults) = self.arguments(args)?;
                let body = self.nested_scope(true, |this| this.expr(body))?;
                ExprKind::Lambda {
                    params,
                    defaults,
                    body,
                }
            }
            py::Expr::IfExp(py::ExprIfExp {
                test, body, orelse, ..
            }) => ExprKind::IfExp {
                test: self.expr(test)?,
                body: self.expr(body)?,
                orelse: self.expr(orelse)?,
            },
            py::Expr::Dict(py::ExprDict { keys, values, .. }) => {
                let mut pairs = Vec::with_capacity(values.len());
                for (key, value) in keys.iter().zip(values) {
                    pairs.push((self.opt_expr(key.as_ref())?, self.expr(value)?));
                }
                ExprKind::Dict(pairs)
            }
            py::Expr::Set(py::ExprSet { elts, .. }) => ExprKind::Set(self.exprs(elts)?),
            py::Expr::ListComp(py::ExprListComp {
                elt, generators, ..
            }) => ExprKind::ListComp {
                element: self.expr(elt)?,
                generators: self.comprehensions(generators)?,
            },
            py::Expr::SetComp(py::ExprSetComp {
                elt, generators, ..
            }) => ExprKind::SetComp {
                element: self.expr(elt)?,
                generators: self.comprehensions(generators)?,
            },
            py::Expr::DictComp(py::ExprDictComp {
                key,
                value,
                generators,
                ..
            }) => ExprKind::DictComp {
                key: self.expr(key)?,
                value: self.expr(value)?,
                generators: self.comprehensions(generators)?,
            },
            py::Expr::GeneratorExp(py::ExprGeneratorExp {
                elt, generators, ..
            }) => ExprKind::GeneratorExp {
                element: self.expr(elt)?,
                generators: self.comprehensions(generators)?,
            },
            py::Expr::Await(py::ExprAwait { value, .. }) => {
                if !self.in_function {
                    return Err(self.error("'await' outside function", range));
                }
                ExprKind::Await(self.expr(value)?)
            }
            py::Expr::Yield(py::ExprYield { value, .. }) => {
                if !self.in_function {
                    return Err(self.error("'yield' outside function", range));
                }
                ExprKind::Yield(self.opt_expr(value.as_deref())?)
            }
            py::Expr::YieldFrom(py::ExprYieldFrom { value, .. }) => {
                if !self.in_function {
                    return Err(self.error("'yield' outside function", range));
                }
                ExprKind::Yield(Some(self.expr(value)?))
            }
            py::Expr::Compare(py::ExprCompare {
                left,
                ops,
                comparators,
                ..
            }) => ExprKind::Compare {
                left: self.expr(left)?,
                ops: ops.iter().map(|op| cmp_op(*op)).collect(),
                comparators: self.exprs(comparators)?,
            },
            py::Expr::Call(py::ExprCall {
                func,
                args,
                keywords,
                ..
            }) => {
                let func = self.expr(func)?;
                let args = self.exprs(args)?;
                let mut lowered = Vec::with_capacity(keywords.len());
                for keyword in keywords {
                    lowered.push(Keyword {
                        name: keyword.arg.as_ref().map(|n| n.as_str().to_owned()),
                        value: self.expr(&keyword.value)?,
                    });
                }
                ExprKind::Call {
                    func,
                    args,
                    keywords: lowered,
                }
            }
            py::Expr::FormattedValue(_) => {
                ExprKind::FString(self.fstring_parts(std::slice::from_ref(expr))?)
            }
            py::Expr::JoinedStr(py::ExprJoinedStr { values, .. }) => {
                ExprKind::FString(self.fstring_parts(values)?)
            }
            py::Expr::Constant(py::ExprConstant { value, .. }) => {
                ExprKind::Constant(self.constant(value, range)?)
            }
            py::Expr::Attribute(py::ExprAttribute { value, attr, .. }) => ExprKind::Attribute {
                value: self.expr(value)?,
                attr: attr.as_str().to_owned(),
            },
            py::Expr::Subscript(py::ExprSubscript { value, slice, .. }) => ExprKind::Subscript {
                value: self.expr(value)?,
                index: self.expr(slice)?,
            },
            py::Expr::Starred(py::ExprStarred { value, .. }) => ExprKind::Starred(self.expr(value)?),
            py::Expr::Name(py::ExprName { id, .. }) => ExprKind::Name(id.as_str().to_owned()),
            py::Expr::List(py::ExprList { elts, .. }) => ExprKind::List(self.exprs(elts)?),
            py::Expr::Tuple(py::ExprTuple { elts, .. }) => ExprKind::Tuple(self.exprs(elts)?),
            py::Expr::Slice(py::ExprSlice {
                lower, upper, step, ..
            }) => ExprKind::Slice {
                lower: self.opt_expr(lower.as_deref())?,
                upper: self.opt_expr(upper.as_deref())?,
                step: self.opt_expr(step.as_deref())?,
            },
        })
    }

    fn comprehensions(&mut self, generators: &[py::Comprehension]) -> Lowered<Vec<Comprehension>> {
        let mut lowered = Vec::with_capacity(generators.len());
        for generator in generators {
            if generator.is_async {
                return Err(self.error(
                    "asynchronous comprehensions are not supported",
                    generator.target.range(),
                ));
            }
            lowered.push(Comprehension {
                target: self.expr(&generator.target)?,
                iter: self.expr(&generator.iter)?,
                ifs: self.exprs(&generator.ifs)?,
            });
        }
        Ok(lowered)
    }

    fn fstring_parts(&mut self, values: &[py::Expr]) -> Lowered<Vec<FStringPart>> {
        let mut parts = Vec::with_capacity(values.len());
        for value in values {
            match value {
                py::Expr::Constant(py::ExprConstant {
                    value: py::Constant::Str(text),
                    ..
                }) => parts.push(FStringPart::Literal(text.clone())),
                py::Expr::FormattedValue(py::ExprFormattedValue {
                    value,
                    conversion,
                    format_spec,
                    ..
                }) => {
                    let value = self.expr(value)?;
                    let conversion = match conversion {
                        py::ConversionFlag::None => None,
                        py::ConversionFlag::Str => Some('s'),
                        py::ConversionFlag::Ascii => Some('a'),
                        py::ConversionFlag::Repr => Some('r'),
                    };
                    let spec = match format_spec.as_deref() {
                        None => Vec::new(),
                        Some(py::Expr::JoinedStr(py::ExprJoinedStr { values, .. })) => {
                            self.fstring_parts(values)?
                        }
                        Some(other) => vec![FStringPart::Field {
                            value: self.expr(other)?,
                            conversion: None,
                            spec: Vec::new(),
                        }],
                    };
                    parts.push(FStringPart::Field {
                        value,
                        conversion,
                        spec,
                    });
                }
                other => parts.push(FStringPart::Field {
                    value: self.expr(other)?,
                    conversion: None,
                    spec: Vec::new(),
                }),
            }
        }
        Ok(parts)
    }

    fn constant(&self, value: &py::Constant, range: TextRange) -> Lowered<Constant> {
        Ok(match value {
            py::Constant::None => Constant::None,
            py::Constant::Bool(value) => Constant::Bool(*value),
            py::Constant::Str(value) => Constant::Str(value.clone()),
            py::Constant::Int(value) => Constant::Int(value.to_string()),
            py::Constant::Float(value) => Constant::Float(*value),
            py::Constant::Ellipsis => Constant::Ellipsis,
            py::Constant::Bytes(_) => {
                return Err(self.error("bytes literals are not supported", range))
            }
            py::Constant::Complex { .. } => {
                return Err(self.error("complex literals are not supported", range))
            }
            py::Constant::Tuple(_) => {
                return Err(self.error("constant tuples are not supported", range))
            }
        })
    }
}

fn identifiers(names: &[py::Identifier]) -> Vec<String> {
    names.iter().map(|n| n.as_str().to_owned()).collect()
}

fn bin_op(op: py::Operator) -> BinOp {
    match op {
        py::Operator::Add => BinOp::Add,
        py::Operator::Sub => BinOp::Sub,
        py::Operator::Mult => BinOp::Mul,
        py::Operator::MatMult => BinOp::MatMul,
        py::Operator::Div => BinOp::Div,
        py::Operator::Mod => BinOp::Mod,
        py::Operator::Pow => BinOp::Pow,
        py::Operator::LShift => BinOp::LShift,
        py::Operator::RShift => BinOp::RShift,
        py::Operator::BitOr => BinOp::BitOr,
        py::Operator::BitXor => BinOp::BitXor,
        py::Operator::BitAnd => BinOp::BitAnd,
        py::Operator::FloorDiv => BinOp::FloorDiv,
    }
}

fn cmp_op(op: py::CmpOp) -> CmpOp {
    match op {
        py::CmpOp::Eq => CmpOp::Eq,
        py::CmpOp::NotEq => CmpOp::NotEq,
        py::CmpOp::Lt => CmpOp::Lt,
        py::CmpOp::LtE => CmpOp::LtE,
        py::CmpOp::Gt => CmpOp::Gt,
        py::CmpOp::GtE => CmpOp::GtE,
        py::CmpOp::Is => CmpOp::Is,
        py::CmpOp::IsNot => CmpOp::IsNot,
        py::CmpOp::In => CmpOp::In,
        py::CmpOp::NotIn => CmpOp::NotIn,
    }
}
