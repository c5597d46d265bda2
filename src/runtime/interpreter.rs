//! Interpreter setup and execution for one approved program.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use rustpython_vm::builtins::PyBaseExceptionRef;
use rustpython_vm::compiler::Mode;
use rustpython_vm::function::FuncArgs;
use rustpython_vm::scope::Scope;
use rustpython_vm::{AsObject, Interpreter, PyObjectRef, PyResult, Settings, VirtualMachine};
use tracing::debug;

use super::imports::{expose_allowed_modules, install_import_hook, PROGRAM_MODULE_NAME};
use crate::sandbox::analyzer::AnalyzedProgram;
use crate::sandbox::config::{AllowList, KNOWN_BUILTINS};
use crate::sandbox::io::CapturedOutput;

/// Stack reserved for the interpreter thread. Only touched pages are
/// committed, so the reservation costs address space, not memory.
pub const INTERPRETER_STACK_SIZE: usize = 512 * 1024 * 1024;

/// Name of the global the host reads back after a run.
pub const RESULT_VARIABLE: &str = "result";

const SOURCE_PATH: &str = "<sandbox>";

/// Built-ins that reach the host or the interpreter itself. They are
/// deleted from the shared `builtins` module unless allow-listed, so
/// library code loses them as well.
const HOST_BUILTINS: &[&str] = &[
    "open",
    "input",
    "breakpoint",
    "help",
    "exit",
    "quit",
    "eval",
    "exec",
    "compile",
    "globals",
    "locals",
    "vars",
    "dir",
    "memoryview",
    "copyright",
    "credits",
    "license",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Cap on captured `print` output; the excess is dropped.
    pub max_output_bytes: usize,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        output: String,
        /// `str()` of the global `result`, when the program bound one.
        result: Option<String>,
    },
    Failed {
        error_type: String,
        message: String,
    },
    /// The interpreter raised `MemoryError`.
    MemoryExceeded,
}

/// Run `program` on a dedicated thread with [`INTERPRETER_STACK_SIZE`] of
/// stack.
pub fn run_isolated(
    program: AnalyzedProgram,
    allow_list: AllowList,
    options: RunOptions,
) -> io::Result<RunOutcome> {
    let handle = thread::Builder::new()
        .name("interpreter".to_owned())
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(move || run(program.source(), &allow_list, options))?;
    handle
        .join()
        .map_err(|_| io::Error::other("interpreter thread panicked"))
}

/// Run `source` on the calling thread.
///
/// The source is expected to have passed
/// [`analyze`](crate::sandbox::analyzer::analyze) against `allow_list`.
pub fn run(source: &str, allow_list: &AllowList, options: RunOptions) -> RunOutcome {
    let interpreter = Interpreter::with_init(Settings::default(), |vm| {
        vm.add_native_modules(rustpython_stdlib::get_module_inits());
        vm.add_frozen(rustpython_pylib::FROZEN_STDLIB);
    });
    let output = Arc::new(Mutex::new(CapturedOutput::with_limit(options.max_output_bytes)));
    let outcome = interpreter.enter(|vm| execute(vm, source, allow_list, &output));
    // The worker exits right after reporting; tearing down the heap the
    // program built is wasted work.
    std::mem::forget(interpreter);
    outcome
}

fn execute(
    vm: &VirtualMachine,
    source: &str,
    allow_list: &AllowList,
    output: &Arc<Mutex<CapturedOutput>>,
) -> RunOutcome {
    let code = match vm.compile(source, Mode::Exec, SOURCE_PATH.to_owned()) {
        Ok(code) => code,
        Err(e) => {
            return RunOutcome::Failed {
                error_type: "SyntaxError".to_owned(),
                message: e.to_string(),
            }
        }
    };
    let scope = match prepare(vm, allow_list, output) {
        Ok(scope) => scope,
        Err(exc) => return failure(vm, &exc),
    };
    let outcome = match vm
        .run_code_obj(code, scope.clone())
        .and_then(|_| result_value(vm, &scope))
    {
        Ok(result) => RunOutcome::Completed {
            output: take_output(output),
            result,
        },
        Err(exc) => failure(vm, &exc),
    };
    std::mem::forget(scope);
    outcome
}

/// Restrict the interpreter to `allow_list` and build the program's globals.
fn prepare(
    vm: &VirtualMachine,
    allow_list: &AllowList,
    output: &Arc<Mutex<CapturedOutput>>,
) -> PyResult<Scope> {
    expose_allowed_modules(vm, allow_list)?;
    install_import_hook(vm, allow_list)?;
    capture_stdout(vm, Arc::clone(output))?;

    for &name in HOST_BUILTINS {
        if !allow_list.allows_builtin(name) && vm.builtins.get_attr(name, vm).is_ok() {
            vm.builtins.as_object().del_attr(name, vm)?;
        }
    }

    let scope = vm.new_scope_with_builtins();
    scope
        .globals
        .set_item("__name__", vm.ctx.new_str(PROGRAM_MODULE_NAME).into(), vm)?;
    // Library code shares `builtins`, so the remaining names are hidden
    // from the program's globals only.
    for &name in KNOWN_BUILTINS {
        if allow_list.allows_builtin(name) || HOST_BUILTINS.contains(&name) {
            continue;
        }
        let hidden = vm.new_function(
            name,
            move |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
                Err(vm.new_exception_msg(
                    vm.ctx.exceptions.name_error.to_owned(),
                    format!("name '{name}' is not defined"),
                ))
            },
        );
        scope.globals.set_item(name, hidden.into(), vm)?;
    }
    debug!(
        builtins = allow_list.builtins().count(),
        modules = allow_list.modules().count(),
        "interpreter restricted"
    );
    Ok(scope)
}

/// Point `sys.stdout` at `output`.
fn capture_stdout(vm: &VirtualMachine, output: Arc<Mutex<CapturedOutput>>) -> PyResult<()> {
    let write = vm.new_function(
        "write",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            let text = match args.args.first() {
                Some(text) => text.str(vm)?,
                None => return Err(vm.new_type_error("write() takes exactly one argument".to_owned())),
            };
            output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_str(text.as_str());
            Ok(vm.ctx.new_int(text.as_str().chars().count()).into())
        },
    );
    let flush = vm.new_function(
        "flush",
        |_args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> { Ok(vm.ctx.none()) },
    );
    let writer = vm.new_module("<stdout>", vm.ctx.new_dict(), None);
    writer.set_attr("write", write, vm)?;
    writer.set_attr("flush", flush, vm)?;
    writer.set_attr("closed", vm.ctx.new_bool(false), vm)?;
    writer.set_attr("encoding", vm.ctx.new_str("utf-8"), vm)?;
    vm.sys_module.set_attr("stdout", writer, vm)?;
    Ok(())
}

fn result_value(vm: &VirtualMachine, scope: &Scope) -> PyResult<Option<String>> {
    match scope.globals.get_item_opt(RESULT_VARIABLE, vm)? {
        Some(value) => Ok(Some(value.str(vm)?.as_str().to_owned())),
        None => Ok(None),
    }
}

fn take_output(output: &Arc<Mutex<CapturedOutput>>) -> String {
    std::mem::take(&mut *output.lock().unwrap_or_else(PoisonError::into_inner)).into_string()
}

fn failure(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> RunOutcome {
    let error_type = exc
        .class()
        .as_object()
        .get_attr("__name__", vm)
        .and_then(|name| name.str(vm))
        .map(|name| name.as_str().to_owned())
        .unwrap_or_else(|_| "Exception".to_owned());
    if error_type == "MemoryError" {
        return RunOutcome::MemoryExceeded;
    }
    let message = exc
        .as_object()
        .str(vm)
        .map(|s| s.as_str().to_owned())
        .unwrap_or_default();
    RunOutcome::Failed {
        error_type,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `run` on a thread with the interpreter's stack size.
    fn run_with(source: &str, options: RunOptions) -> RunOutcome {
        let source = source.to_owned();
        thread::Builder::new()
            .stack_size(INTERPRETER_STACK_SIZE)
            .spawn(move || run(&source, &AllowList::default(), options))
            .unwrap()
            .join()
            .unwrap()
    }

    fn run_default(source: &str) -> RunOutcome {
        run_with(source, RunOptions { max_output_bytes: 1024 * 1024 })
    }

    fn completed(source: &str) -> (String, Option<String>) {
        match run_default(source) {
            RunOutcome::Completed { output, result } => (output, result),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    fn failed(source: &str) -> (String, String) {
        match run_default(source) {
            RunOutcome::Failed { error_type, message } => (error_type, message),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_print_is_captured() {
        let (output, result) = completed("print('hello', 42)\nprint(1, 2, sep='-', end='!')\n");
        assert_eq!(output, "hello 42\n1-2!");
        assert_eq!(result, None);
    }

    #[test]
    fn test_result_is_stringified() {
        let (_, result) = completed("result = {'a': [1, 2.5, None, True]}\n");
        assert_eq!(result.as_deref(), Some("{'a': [1, 2.5, None, True]}"));
    }

    #[test]
    fn test_integers_are_unbounded() {
        let (_, result) = completed("result = 2 ** 100\n");
        assert_eq!(result.as_deref(), Some("1267650600228229401496703205376"));
    }

    #[test]
    fn test_exception_type_and_message() {
        let (error_type, message) = failed("x = 1 / 0\n");
        assert_eq!(error_type, "ZeroDivisionError");
        assert_eq!(message, "division by zero");
    }

    #[test]
    fn test_output_is_truncated() {
        let outcome = run_with(
            "for i in range(100):\n    print('x' * 10)\n",
            RunOptions { max_output_bytes: 25 },
        );
        match outcome {
            RunOutcome::Completed { output, .. } => {
                assert!(output.starts_with("xxxxxxxxxx\nxxxxxxxxxx\nxxx"));
                assert!(output.ends_with(crate::sandbox::io::TRUNCATION_MARKER));
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_allowed_module_is_usable() {
        let (_, result) = completed("import json\nresult = json.dumps({'a': [1, 2]})\n");
        assert_eq!(result.as_deref(), Some("{\"a\": [1, 2]}"));
        let (_, result) = completed("from math import sqrt\nresult = sqrt(16)\n");
        assert_eq!(result.as_deref(), Some("4.0"));
    }

    #[test]
    fn test_module_proxy_hides_submodules() {
        let (error_type, _) = failed("import json\nresult = json.codecs\n");
        assert_eq!(error_type, "AttributeError");
        let (error_type, _) = failed("import re\nresult = re.enum\n");
        assert_eq!(error_type, "AttributeError");
        let (error_type, _) = failed("from json import decoder\n");
        assert_eq!(error_type, "ImportError");
        let (error_type, _) = failed("import string\nresult = string.Formatter\n");
        assert_eq!(error_type, "AttributeError");
    }

    #[test]
    fn test_import_outside_allow_list_is_refused() {
        let (error_type, message) = failed("import socket\n");
        assert_eq!(error_type, "ImportError");
        assert!(message.contains("socket"), "{message}");
        let (error_type, _) = failed("from os import path\n");
        assert_eq!(error_type, "ImportError");
    }

    #[test]
    fn test_hidden_builtin_raises_name_error() {
        let (error_type, message) = failed("x = getattr(1, 'real')\n");
        assert_eq!(error_type, "NameError");
        assert_eq!(message, "name 'getattr' is not defined");
    }

    #[test]
    fn test_host_builtins_are_gone() {
        let (error_type, _) = failed("f = open('/etc/passwd')\n");
        assert_eq!(error_type, "NameError");
    }

    #[test]
    fn test_unbound_method_as_key() {
        let (_, result) = completed("result = sorted(['b', 'C', 'a'], key=str.lower)\n");
        assert_eq!(result.as_deref(), Some("['a', 'b', 'C']"));
    }

    #[test]
    fn test_named_unicode_escape() {
        let (_, result) = completed("result = 'A\\N{BULLET}'\n");
        assert_eq!(result.as_deref(), Some("A\u{2022}"));
    }

    #[test]
    fn test_range_is_lazy() {
        let (_, result) = completed("r = range(10**12)\nresult = (len(r), r[-1], 10**11 in r)\n");
        assert_eq!(result.as_deref(), Some("(1000000000000, 999999999999, True)"));
    }

    #[test]
    fn test_run_isolated_uses_large_stack() {
        let source = format!("result = {}1{}\n", "(".repeat(90), ")".repeat(90));
        let analyzed = crate::sandbox::analyzer::analyze(&source, &AllowList::default()).unwrap();
        let outcome = run_isolated(analyzed, AllowList::default(), RunOptions { max_output_bytes: 64 }).unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                output: String::new(),
                result: Some("1".to_owned())
            }
        );
    }
}
