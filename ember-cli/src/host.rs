//! Host functions every module run by the CLI can call.

use ember_vm::{ExecutionState, Runtime, RuntimeError};

pub fn register_builtins(runtime: &mut Runtime) {
    runtime.register_host("Print", print);
    runtime.register_host("PrintInt", print_int);
    runtime.register_host("Explode", explode);
    runtime.register_host("Average", average);
}

/// `Print(s)`: write `s` and a newline to stdout.
fn print(s: &mut ExecutionState) -> Result<(), RuntimeError> {
    println!("{}", s.param_as_string(0)?);
    s.return_void();
    Ok(())
}

fn print_int(s: &mut ExecutionState) -> Result<(), RuntimeError> {
    println!("{}", s.param_as_int(0)?);
    s.return_void();
    Ok(())
}

fn explode(s: &mut ExecutionState) -> Result<(), RuntimeError> {
    println!("Explode {}!", s.param_as_int(0)?);
    s.return_void();
    Ok(())
}

/// `Average(a, b, ...)`: integer mean of the arguments.
fn average(s: &mut ExecutionState) -> Result<(), RuntimeError> {
    let n = s.param_count();
    if n == 0 {
        return Err(s.host_error("Average needs at least one argument"));
    }
    let mut sum = 0i64;
    for i in 0..n {
        sum = sum.wrapping_add(s.param_as_int(i)?);
    }
    s.return_int(sum / n as i64);
    Ok(())
}
