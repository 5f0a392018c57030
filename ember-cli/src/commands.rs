//! Subcommand implementations. Each returns the process exit code on
//! failure after printing a diagnostic to stderr.

use crate::host;
use clap::Args;
use ember_common::Module;
use ember_vm::{ApiError, InstanceId, Runtime, RuntimeConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Module files, one instance each.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Stack cells for modules that do not request a size.
    #[arg(long, default_value_t = 1024)]
    pub stack_size: usize,

    /// Live objects that trigger the first collection.
    #[arg(long, default_value_t = 64)]
    pub gc_threshold: usize,

    /// Largest object a script may allocate, in fields.
    #[arg(long, default_value_t = ember_vm::heap::DEFAULT_MAX_FIELDS)]
    pub max_object_fields: usize,

    /// Stop scheduling after this many milliseconds.
    #[arg(long)]
    pub budget_ms: Option<u64>,
}

/// Load, start and schedule every module, then report exit codes.
pub fn run(args: &RunArgs) -> Result<(), i32> {
    let defaults = RuntimeConfig::default();
    let config = RuntimeConfig {
        default_stack_size: args.stack_size,
        initial_gc_threshold: args.gc_threshold,
        max_object_fields: args.max_object_fields,
        max_instances: defaults.max_instances.max(args.files.len()),
        ..defaults
    };
    let mut runtime = Runtime::new(config);
    host::register_builtins(&mut runtime);

    let mut instances = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let id = runtime.load_file(path).map_err(|e| {
            eprintln!("error: {e}");
            1
        })?;
        debug!(file = %path.display(), instance = %id, "loaded");
        instances.push((id, path.as_path()));
    }

    let mut faulted = false;
    for &(id, path) in &instances {
        if let Err(e) = runtime.start(id) {
            report(path, &e);
            faulted = true;
        }
    }

    loop {
        let result = match args.budget_ms {
            Some(ms) => runtime.run_for(ms),
            None => runtime.run_until_idle(),
        };
        match result {
            Ok(()) => break,
            Err(e @ ApiError::Fault { instance, .. }) => {
                report(path_of(&instances, instance), &e);
                faulted = true;
                // A budgeted run is not restarted after a fault.
                if args.budget_ms.is_some() {
                    break;
                }
            }
            Err(e) => {
                eprintln!("runtime error: {e}");
                return Err(3);
            }
        }
    }

    for &(id, path) in &instances {
        if let Ok(code) = runtime.exit_code(id) {
            println!("{}: exit code {code}", path.display());
        }
    }

    if faulted {
        Err(3)
    } else {
        Ok(())
    }
}

fn path_of<'a>(instances: &[(InstanceId, &'a Path)], id: InstanceId) -> &'a Path {
    instances
        .iter()
        .find(|(i, _)| *i == id)
        .map_or(Path::new("<unknown>"), |&(_, p)| p)
}

fn report(path: &Path, e: &ApiError) {
    match e {
        ApiError::Fault { source, .. } => {
            eprintln!("{}: runtime error: {source}", path.display());
        }
        other => eprintln!("{}: runtime error: {other}", path.display()),
    }
}

/// Print a module's header, tables and a numbered instruction listing.
pub fn inspect(path: &Path) -> Result<(), i32> {
    let module = read_module(path)?;
    print!("{}", listing(&module));
    Ok(())
}

fn listing(module: &Module) -> String {
    let mut out = String::new();
    let stack = match module.stack_size {
        0 => "default".to_owned(),
        n => n.to_string(),
    };
    out.push_str(&format!("stack size:  {stack}\n"));
    out.push_str(&format!("globals:     {}\n", module.global_size));
    out.push_str(&format!("priority:    {:?}\n", module.priority));
    let main = module
        .main
        .and_then(|m| module.function(m))
        .map_or("none", |f| f.name.as_str());
    out.push_str(&format!("main:        {main}\n"));

    out.push_str(&format!("\nfunctions ({}):\n", module.functions.len()));
    for (i, f) in module.functions.iter().enumerate() {
        out.push_str(&format!(
            "  #{i:<3} {:<16} entry {:<5} params {:<3} locals {}\n",
            f.name, f.entry, f.param_count, f.local_count
        ));
    }

    out.push_str(&format!("\nhost calls ({}):\n", module.host_calls.len()));
    for (i, name) in module.host_calls.iter().enumerate() {
        out.push_str(&format!("  #{i:<3} {name}\n"));
    }

    out.push_str(&format!("\ninstructions ({}):\n", module.instructions.len()));
    for (i, instr) in module.instructions.iter().enumerate() {
        for f in module.functions.iter().filter(|f| f.entry as usize == i) {
            out.push_str(&format!("{}:\n", f.name));
        }
        out.push_str(&format!("  {i:04}  {instr}\n"));
    }
    out
}

/// Read and decode a module file.
fn read_module(path: &Path) -> Result<Module, i32> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("error: cannot read '{}': {e}", path.display());
        1
    })?;

    Module::decode(&bytes).map_err(|e| {
        eprintln!("error: invalid module: {e}");
        1
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_common::{ModuleBuilder, Opcode, Operand};

    #[test]
    fn listing_shows_tables_and_code() {
        let mut b = ModuleBuilder::new();
        let main = b.function("_Main", 0, 1);
        let print = b.host_call("Print");
        b.emit(Opcode::Push, vec![Operand::from("hi")]);
        b.emit(Opcode::Call, vec![Operand::HostCallTarget(print)]);
        b.op(Opcode::Ret);
        b.set_main(main);
        let text = listing(&b.build().unwrap());

        assert!(text.contains("stack size:  default"));
        assert!(text.contains("main:        _Main"));
        assert!(text.contains("#0   Print"));
        assert!(text.contains("_Main:\n  0000  "));
        assert!(text.contains("0002  RET"));
    }
}
