//! The embedding API: a runtime holding independent script instances and
//! the cooperative scheduler that interleaves them.
//!
//! Everything runs on the caller's thread. An instance executes only while
//! the host is inside one of [`Runtime::run_slice`], [`Runtime::run_for`],
//! [`Runtime::run_until_idle`] or [`Runtime::call_sync`], and only one
//! instance executes at a time.

use crate::call::CallKind;
use crate::clock::{Clock, SystemClock};
use crate::config::RuntimeConfig;
use crate::error::{ApiError, LoadError, RuntimeError};
use crate::execute::{Budget, RunOutcome};
use crate::host::HostRegistry;
use crate::machine::{ExecutionState, Wake};
use crate::output::Output;
use ember_common::{Module, RuntimeValue};
use indexmap::IndexMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Opaque handle to a loaded instance. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u32);

impl InstanceId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which instances the scheduler may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    /// Every runnable instance in turn.
    RoundRobin,
    /// Only this instance, until a synchronous call returns.
    RunToCompletion(InstanceId),
}

/// Result of one scheduling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceReport {
    pub instance: InstanceId,
    pub outcome: RunOutcome,
}

/// A set of script instances plus the host functions they share.
pub struct Runtime {
    config: RuntimeConfig,
    clock: Rc<dyn Clock>,
    instances: IndexMap<InstanceId, ExecutionState>,
    globals: HostRegistry,
    mode: SchedulerMode,
    output: Output,
    /// Position in `instances` where the next slice search starts.
    cursor: usize,
    next_id: u32,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .field("globals", &self.globals)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

/// Whether the scheduler may run `state` at time `now`.
fn is_runnable(state: &ExecutionState, now: u64) -> bool {
    state.running
        && match state.pause {
            None => true,
            Some(Wake::At(t)) => now >= t,
            Some(Wake::OnResume) => false,
        }
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_clock(config, Rc::new(SystemClock::new()))
    }

    /// A runtime that reads time from `clock`.
    pub fn with_clock(config: RuntimeConfig, clock: Rc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            instances: IndexMap::new(),
            globals: HostRegistry::default(),
            mode: SchedulerMode::RoundRobin,
            output: Output::default(),
            cursor: 0,
            next_id: 0,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn mode(&self) -> SchedulerMode {
        self.mode
    }

    /// Send `TRAP 0` output of every instance, loaded now or later, to
    /// `output`.
    pub fn set_output(&mut self, output: Output) {
        for state in self.instances.values_mut() {
            state.set_output(output.clone());
        }
        self.output = output;
    }

    // ---- Loading ----

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<InstanceId, LoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_bytes(&bytes)
    }

    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<InstanceId, LoadError> {
        self.load_module(Module::decode(bytes)?)
    }

    /// Load `module` into a new, stopped instance.
    pub fn load_module(&mut self, module: Module) -> Result<InstanceId, LoadError> {
        module.validate()?;

        let limit = self.config.max_instances;
        if self.instances.len() >= limit {
            return Err(LoadError::NoFreeInstanceSlot { limit });
        }
        let cells = match module.stack_size {
            0 => self.config.default_stack_size,
            n => n as usize,
        };
        if cells > self.config.max_stack_size {
            return Err(LoadError::OutOfMemory { cells });
        }

        let timeslice = self.config.timeslices.for_priority(module.priority);
        let instructions = module.instructions.len();
        let functions = module.functions.len();
        let mut state = ExecutionState::new(
            Rc::new(module),
            cells,
            self.config.initial_gc_threshold,
            timeslice,
        )?;
        state.heap.set_max_fields(self.config.max_object_fields);
        state.set_output(self.output.clone());

        let id = InstanceId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.instances.insert(id, state);
        info!(
            instance = %id,
            instructions,
            functions,
            stack_cells = cells,
            timeslice_ms = timeslice,
            "loaded module"
        );
        Ok(id)
    }

    /// Drop an instance and everything it owns.
    pub fn unload(&mut self, id: InstanceId) -> Result<(), ApiError> {
        let (index, _, _) = self
            .instances
            .shift_remove_full(&id)
            .ok_or(ApiError::UnknownInstance(id))?;
        if index < self.cursor {
            self.cursor -= 1;
        }
        if self.mode == SchedulerMode::RunToCompletion(id) {
            self.mode = SchedulerMode::RoundRobin;
        }
        info!(instance = %id, "unloaded instance");
        Ok(())
    }

    pub fn instance_ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.keys().copied()
    }

    pub fn state(&self, id: InstanceId) -> Result<&ExecutionState, ApiError> {
        self.instances.get(&id).ok_or(ApiError::UnknownInstance(id))
    }

    pub fn state_mut(&mut self, id: InstanceId) -> Result<&mut ExecutionState, ApiError> {
        self.instances
            .get_mut(&id)
            .ok_or(ApiError::UnknownInstance(id))
    }

    // ---- Lifecycle ----

    /// Return an instance to its freshly loaded state.
    pub fn reset(&mut self, id: InstanceId) -> Result<(), ApiError> {
        self.state_mut(id)?.reset();
        Ok(())
    }

    /// Mark an instance runnable. If it is not already running and the
    /// module has a main function, main is entered.
    pub fn start(&mut self, id: InstanceId) -> Result<(), ApiError> {
        let state = self.state_mut(id)?;
        if state.running {
            return Ok(());
        }
        if let Some(main) = state.module.main {
            let ip = state.ip;
            state
                .push_call(main, CallKind::Scheduled, ip)
                .map_err(|source| ApiError::Fault {
                    instance: id,
                    source,
                })?;
        }
        state.running = true;
        state.pause = None;
        Ok(())
    }

    /// Clear the running flag; the instance stops at the next instruction
    /// boundary.
    pub fn stop(&mut self, id: InstanceId) -> Result<(), ApiError> {
        self.state_mut(id)?.running = false;
        Ok(())
    }

    /// Suspend an instance for `ms` milliseconds.
    pub fn pause(&mut self, id: InstanceId, ms: u64) -> Result<(), ApiError> {
        let now = self.clock.now_ms();
        self.state_mut(id)?.pause = Some(Wake::At(now.saturating_add(ms)));
        Ok(())
    }

    /// Make a paused instance runnable immediately.
    pub fn resume(&mut self, id: InstanceId) -> Result<(), ApiError> {
        self.state_mut(id)?.pause = None;
        Ok(())
    }

    pub fn set_timeslice(&mut self, id: InstanceId, ms: u64) -> Result<(), ApiError> {
        self.state_mut(id)?.timeslice_ms = ms;
        Ok(())
    }

    // ---- Calls ----

    /// Push an integer argument for the next call into `id`.
    pub fn pass_int(&mut self, id: InstanceId, value: i64) -> Result<(), ApiError> {
        self.pass(id, RuntimeValue::Int(value))
    }

    pub fn pass_float(&mut self, id: InstanceId, value: f64) -> Result<(), ApiError> {
        self.pass(id, RuntimeValue::Float(value))
    }

    pub fn pass_string(&mut self, id: InstanceId, value: &str) -> Result<(), ApiError> {
        self.pass(id, RuntimeValue::from(value))
    }

    fn pass(&mut self, id: InstanceId, value: RuntimeValue) -> Result<(), ApiError> {
        self.state_mut(id)?
            .push_value(value)
            .map_err(|source| ApiError::Fault {
                instance: id,
                source,
            })
    }

    fn function_index(&self, id: InstanceId, name: &str) -> Result<u32, ApiError> {
        self.state(id)?
            .module
            .find_function(name)
            .ok_or_else(|| ApiError::FunctionNotFound {
                instance: id,
                name: name.to_owned(),
            })
    }

    /// Enter `name` and let it run under the scheduler. The instance
    /// becomes runnable; when the call returns with no outer call left the
    /// instance stops.
    pub fn call_async(&mut self, id: InstanceId, name: &str) -> Result<(), ApiError> {
        let function = self.function_index(id, name)?;
        let state = self.state_mut(id)?;
        let ip = state.ip;
        state
            .push_call(function, CallKind::Scheduled, ip)
            .map_err(|source| ApiError::Fault {
                instance: id,
                source,
            })?;
        state.running = true;
        Ok(())
    }

    /// Call `name` and run the instance until it returns, then give back
    /// the return register.
    ///
    /// Other instances do not run meanwhile. Timed pauses inside the call
    /// are slept through on the runtime's clock. If the instance was
    /// interrupted mid-slice, it resumes at the interrupted instruction on
    /// its next slice.
    pub fn call_sync(&mut self, id: InstanceId, name: &str) -> Result<RuntimeValue, ApiError> {
        let function = self.function_index(id, name)?;
        self.call_sync_index(id, function, name)
    }

    fn call_sync_index(
        &mut self,
        id: InstanceId,
        function: u32,
        name: &str,
    ) -> Result<RuntimeValue, ApiError> {
        let state = self.state_mut(id)?;
        let was_running = state.running;
        let prior_pause = state.pause;
        let ip = state.ip;
        state
            .push_call(function, CallKind::HostBoundary, ip)
            .map_err(|source| ApiError::Fault {
                instance: id,
                source,
            })?;
        state.running = true;
        state.pause = None;

        debug!(instance = %id, function = name, "entering synchronous call");
        let prior_mode = self.mode;
        self.mode = SchedulerMode::RunToCompletion(id);
        let result = self.run_to_completion(id, name);
        self.mode = prior_mode;

        let state = self.state_mut(id)?;
        result?;
        state.running = was_running;
        state.pause = prior_pause;
        debug!(instance = %id, function = name, "synchronous call returned");
        Ok(state.ret.clone())
    }

    fn run_to_completion(&mut self, id: InstanceId, name: &str) -> Result<(), ApiError> {
        loop {
            let state = self
                .instances
                .get_mut(&id)
                .ok_or(ApiError::UnknownInstance(id))?;
            match state.run(Budget::Unbounded, &self.globals, self.clock.as_ref()) {
                Ok(RunOutcome::Returned) => return Ok(()),
                Ok(RunOutcome::Paused) => {
                    if let Some(Wake::At(t)) = state.pause {
                        let now = self.clock.now_ms();
                        self.clock.sleep_ms(t.saturating_sub(now));
                        continue;
                    }
                }
                Ok(RunOutcome::Stopped | RunOutcome::SliceExpired) => {}
                Err(source) => return Err(self.fault(id, source)),
            }
            return Err(ApiError::SyncCallSuspended {
                instance: id,
                name: name.to_owned(),
            });
        }
    }

    /// Start the instance's main function and run it to completion,
    /// returning the exit code.
    pub fn run_main(&mut self, id: InstanceId) -> Result<i64, ApiError> {
        let state = self.state(id)?;
        let main = state
            .module
            .main
            .and_then(|m| state.module.function(m).map(|f| (m, f.name.clone())));
        let Some((index, name)) = main else {
            return Err(ApiError::FunctionNotFound {
                instance: id,
                name: "_Main".to_owned(),
            });
        };
        self.call_sync_index(id, index, &name)?;
        Ok(self.state(id)?.exit_code)
    }

    fn fault(&self, id: InstanceId, source: RuntimeError) -> ApiError {
        warn!(instance = %id, error = %source, "instance faulted");
        ApiError::Fault {
            instance: id,
            source,
        }
    }

    // ---- Results and queries ----

    pub fn return_value(&self, id: InstanceId) -> Result<&RuntimeValue, ApiError> {
        Ok(&self.state(id)?.ret)
    }

    pub fn return_as_int(&self, id: InstanceId) -> Result<i64, ApiError> {
        Ok(self.return_value(id)?.coerce_int())
    }

    pub fn return_as_float(&self, id: InstanceId) -> Result<f64, ApiError> {
        Ok(self.return_value(id)?.coerce_float())
    }

    /// The return register as a string; `None` for null and objects.
    pub fn return_as_string(&self, id: InstanceId) -> Result<Option<String>, ApiError> {
        Ok(self.return_value(id)?.coerce_string())
    }

    pub fn is_running(&self, id: InstanceId) -> Result<bool, ApiError> {
        Ok(self.state(id)?.running)
    }

    pub fn exit_code(&self, id: InstanceId) -> Result<i64, ApiError> {
        Ok(self.state(id)?.exit_code)
    }

    /// Values pushed above the current frame, e.g. by `pass_*`.
    pub fn param_count(&self, id: InstanceId) -> Result<usize, ApiError> {
        Ok(self.state(id)?.param_count())
    }

    // ---- Host functions ----

    /// Register a host function visible to every instance.
    pub fn register_host<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut ExecutionState) -> Result<(), RuntimeError> + 'static,
    {
        self.globals.register(name, f);
    }

    /// Register a host function visible only to `id`; it shadows a global
    /// function of the same name.
    pub fn register_instance_host<F>(
        &mut self,
        id: InstanceId,
        name: &str,
        f: F,
    ) -> Result<(), ApiError>
    where
        F: Fn(&mut ExecutionState) -> Result<(), RuntimeError> + 'static,
    {
        self.state_mut(id)?.register_host(name, f);
        Ok(())
    }

    // ---- Scheduling ----

    /// Run the next runnable instance for its timeslice.
    ///
    /// Returns `None` when no instance can run right now.
    pub fn run_slice(&mut self) -> Result<Option<SliceReport>, ApiError> {
        let count = self.instances.len();
        if count == 0 {
            return Ok(None);
        }
        let now = self.clock.now_ms();
        let start = self.cursor % count;
        let mode = self.mode;
        let next = (0..count).map(|k| (start + k) % count).find(|&i| {
            self.instances.get_index(i).is_some_and(|(id, state)| {
                let allowed = match mode {
                    SchedulerMode::RoundRobin => true,
                    SchedulerMode::RunToCompletion(only) => *id == only,
                };
                allowed && is_runnable(state, now)
            })
        });
        let Some(index) = next else {
            return Ok(None);
        };
        self.cursor = (index + 1) % count;

        let Some((&id, state)) = self.instances.get_index_mut(index) else {
            return Ok(None);
        };
        let slice = state.timeslice_ms;
        debug!(instance = %id, slice_ms = slice, ip = state.ip, "switching to instance");
        match state.run(Budget::Millis(slice), &self.globals, self.clock.as_ref()) {
            Ok(outcome) => Ok(Some(SliceReport {
                instance: id,
                outcome,
            })),
            Err(source) => Err(self.fault(id, source)),
        }
    }

    /// Earliest timed wake among running instances.
    fn next_wake(&self) -> Option<u64> {
        self.instances
            .values()
            .filter(|s| s.running)
            .filter_map(|s| match s.pause {
                Some(Wake::At(t)) => Some(t),
                _ => None,
            })
            .min()
    }

    /// Schedule instances for about `ms` milliseconds. The budget is
    /// checked between slices, so a slice in progress is never cut short.
    pub fn run_for(&mut self, ms: u64) -> Result<(), ApiError> {
        let start = self.clock.now_ms();
        let deadline = start.saturating_add(ms);
        loop {
            let now = self.clock.now_ms();
            if now >= deadline {
                return Ok(());
            }
            if self.run_slice()?.is_none() {
                match self.next_wake() {
                    Some(t) => self.clock.sleep_ms(t.min(deadline).saturating_sub(now)),
                    None => return Ok(()),
                }
            }
        }
    }

    /// Schedule instances until none is running, or every running instance
    /// waits for [`Runtime::resume`].
    ///
    /// A fault stops the faulting instance and is returned; calling again
    /// continues with the others.
    pub fn run_until_idle(&mut self) -> Result<(), ApiError> {
        loop {
            if self.run_slice()?.is_some() {
                continue;
            }
            let Some(t) = self.next_wake() else {
                return Ok(());
            };
            let now = self.clock.now_ms();
            self.clock.sleep_ms(t.saturating_sub(now));
        }
    }
}
