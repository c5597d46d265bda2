//! Module access for sandboxed programs.
//!
//! RustPython returns a module straight from `sys.modules` for a plain
//! `import name` without consulting `__import__`, so the allow-list is
//! enforced in two places: every allow-listed module is preloaded and its
//! `sys.modules` entry replaced by a proxy, and `__import__` is wrapped so
//! that any other import issued by the program is refused or proxied.

use rustpython_vm::builtins::{PyModule, PyStr};
use rustpython_vm::function::FuncArgs;
use rustpython_vm::{AsObject, PyObjectRef, PyResult, TryFromObject, VirtualMachine};
use tracing::debug;

use crate::sandbox::config::AllowList;

/// `__name__` of the program's global namespace.
pub(crate) const PROGRAM_MODULE_NAME: &str = "__main__";

/// Public module attributes that still hand out reflective access.
///
/// `string.Formatter().get_field` resolves `"0.__class__"` style paths to
/// live objects.
const HIDDEN_ATTRIBUTES: &[(&str, &str)] = &[("string", "Formatter")];

/// Import every allow-listed module and publish its proxy in `sys.modules`.
///
/// Runs before the import hook is installed, with the interpreter's own
/// `__import__`. Modules that fail to import stay unavailable; the program
/// then sees an `ImportError` when it asks for them.
pub(crate) fn expose_allowed_modules(vm: &VirtualMachine, allow_list: &AllowList) -> PyResult<()> {
    let import = vm.builtins.get_attr("__import__", vm)?;
    let sys_modules = vm.sys_module.get_attr("modules", vm)?;
    // Import everything before swapping any entry, so allow-listed modules
    // importing each other bind the real modules.
    let mut available = Vec::new();
    for name in allow_list.modules() {
        match import.call((vm.ctx.new_str(name),), vm) {
            Ok(_) => available.push(name),
            Err(e) => {
                let reason = e.as_object().str(vm).map(|s| s.as_str().to_owned()).unwrap_or_default();
                debug!(module = name, %reason, "allow-listed module is unavailable");
            }
        }
    }
    for name in available {
        let module = sys_modules.get_item(name, vm)?;
        let proxy = module_proxy(vm, &module, name, allow_list)?;
        sys_modules.set_item(name, proxy, vm)?;
    }
    Ok(())
}

/// Replace `builtins.__import__` with one that applies the allow-list to
/// imports issued by the program itself.
///
/// Imports made by library code run with that library's globals and pass
/// through untouched.
pub(crate) fn install_import_hook(vm: &VirtualMachine, allow_list: &AllowList) -> PyResult<()> {
    let original = vm.builtins.get_attr("__import__", vm)?;
    let allow_list = allow_list.clone();
    let hook = vm.new_function(
        "__import__",
        move |args: FuncArgs, vm: &VirtualMachine| -> PyResult<PyObjectRef> {
            if !called_from_program(&args, vm) {
                return original.call(args, vm);
            }
            let name = match args.args.first() {
                Some(name) => name.str(vm)?.as_str().to_owned(),
                None => return Err(vm.new_type_error("__import__() missing argument 'name'".to_owned())),
            };
            let level = match args.args.get(4).or_else(|| args.kwargs.get("level")) {
                Some(level) => i64::try_from_object(vm, level.clone())?,
                None => 0,
            };
            if level != 0 || !allow_list.allows_module(&name) {
                return Err(vm.new_import_error(
                    format!("import of '{name}' is not allowed"),
                    vm.ctx.new_str(name),
                ));
            }
            let has_fromlist = match args.args.get(3).or_else(|| args.kwargs.get("fromlist")) {
                Some(fromlist) => fromlist.clone().try_to_bool(vm)?,
                None => false,
            };
            let module = original.call(args, vm)?;
            // `import a.b` binds the top-level package
            let path = if has_fromlist {
                name.as_str()
            } else {
                name.split('.').next().unwrap_or(name.as_str())
            };
            module_proxy(vm, &module, path, &allow_list)
        },
    );
    vm.builtins.set_attr("__import__", hook, vm)?;
    Ok(())
}

fn called_from_program(args: &FuncArgs, vm: &VirtualMachine) -> bool {
    let Some(globals) = args.args.get(1) else {
        return true;
    };
    if vm.is_none(globals) {
        return true;
    }
    match vm.call_method(globals, "get", (vm.ctx.new_str("__name__"),)) {
        Ok(name) => name
            .str(vm)
            .map_or(true, |name| name.as_str() == PROGRAM_MODULE_NAME),
        Err(_) => true,
    }
}

/// A fresh module holding the public, non-module attributes of `module`.
///
/// Submodules are only carried over, as proxies themselves, when their
/// dotted path is allow-listed. The proxy's `__name__` does not name a real
/// module, so `from proxy import submodule` cannot fall back to
/// `sys.modules` either.
fn module_proxy(
    vm: &VirtualMachine,
    module: &PyObjectRef,
    path: &str,
    allow_list: &AllowList,
) -> PyResult<PyObjectRef> {
    let attributes = vm.ctx.new_dict();
    if let Some(namespace) = module.dict() {
        for (key, value) in &namespace {
            let Some(name) = key.downcast_ref::<PyStr>().map(|s| s.as_str().to_owned()) else {
                continue;
            };
            if name.starts_with('_') || HIDDEN_ATTRIBUTES.contains(&(path, name.as_str())) {
                continue;
            }
            if value.payload_is::<PyModule>() {
                let child = format!("{path}.{name}");
                if allow_list.allows_module(&child) {
                    let proxy = module_proxy(vm, &value, &child, allow_list)?;
                    attributes.set_item(name.as_str(), proxy, vm)?;
                }
                continue;
            }
            attributes.set_item(name.as_str(), value, vm)?;
        }
    }
    let proxy = vm.new_module(path, attributes.clone(), None);
    attributes.set_item("__name__", vm.ctx.new_str(format!("<sandboxed {path}>")).into(), vm)?;
    Ok(proxy.into())
}
