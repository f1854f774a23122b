//! Compilation pipeline: prepare, emit, size the stack, package.

use tracing::{debug, info, warn};

use crate::bytecode::buffer::Buffer;
use crate::bytecode::compile::compile_program;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::prepare::prepare;
use crate::bytecode::stack_check::estimate_stack_bytes;
use crate::config::{CompilerOptions, YIELD_STACK_RESERVE};
use crate::diagnostics::Diagnostics;
use crate::lang::node::NodeType;
use crate::lang::script::{DEFINE_STACK_SIZE, Script, Validation};
use crate::package::{Package, PackageMode, package};

/// Outcome of running a package once.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrialRun {
    /// Highest stack use observed, in bytes.
    pub max_stack_bytes: u32,
    /// Data segment after the run, one value per slot.
    pub data: Vec<f32>,
}

/// Runs a Normal-layout package once; the compiler uses this to measure the
/// stack and evaluate validations.
pub trait TrialRunner {
    fn run(&self, package: &Package) -> Result<TrialRun, String>;
}

/// Replaces jump placeholders with offsets.
pub trait JumpResolver {
    fn resolve(&self, buffer: Buffer) -> Result<Vec<u8>, String>;
}

/// Which rule produced the stack size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSource {
    /// `stack_size` define or option.
    Explicit,
    /// Measured by a trial run.
    Trial,
    /// Static push/pop walk, floored by the default.
    Estimate,
}

#[derive(Debug, Clone)]
pub struct CompiledScript {
    pub package: Package,
    /// Emitted bytecode with its jump annotations.
    pub bytecode: Buffer,
    /// Stack bytes reserved in the package, yield reserve included.
    pub stack_size: u32,
    pub stack_source: StackSource,
}

/// State of one script's compilation. Nothing is shared between
/// compilations.
pub struct Compilation<'a> {
    script: Script,
    options: CompilerOptions,
    diagnostics: Diagnostics,
    trial_runner: Option<&'a dyn TrialRunner>,
    jump_resolver: Option<&'a dyn JumpResolver>,
    prepared: bool,
}

impl<'a> Compilation<'a> {
    pub fn new(script: Script, options: CompilerOptions) -> Self {
        Self {
            script,
            options,
            diagnostics: Diagnostics::new(),
            trial_runner: None,
            jump_resolver: None,
            prepared: false,
        }
    }

    pub fn with_trial_runner(mut self, runner: &'a dyn TrialRunner) -> Self {
        self.trial_runner = Some(runner);
        self
    }

    pub fn with_jump_resolver(mut self, resolver: &'a dyn JumpResolver) -> Self {
        self.jump_resolver = Some(resolver);
        self
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Run the tree rewrites once and emit bytecode.
    pub fn compile_bytecode(&mut self) -> Result<Buffer, CompileError> {
        let options = self.options.clone();
        let result = self.emit(&options);
        self.record_failure(result)
    }

    /// Compile and package. On failure the error is also in the diagnostics.
    pub fn compile(&mut self) -> Result<CompiledScript, CompileError> {
        let result = self.run();
        self.record_failure(result)
    }

    fn record_failure<T>(&mut self, result: Result<T, CompileError>) -> Result<T, CompileError> {
        if let Err(err) = &result {
            self.diagnostics
                .error(err.to_string(), err.node().map(str::to_string));
        }
        result
    }

    fn emit(&mut self, options: &CompilerOptions) -> Result<Buffer, CompileError> {
        if !self.prepared {
            prepare(
                &mut self.script.ast,
                &mut self.script.variables,
                &self.options,
                &mut self.diagnostics,
            )?;
            self.prepared = true;
        }
        compile_program(&self.script.ast, &self.script.variables, options)
    }

    fn resolve(&self, bytecode: &Buffer) -> Result<Vec<u8>, CompileError> {
        match self.jump_resolver {
            Some(resolver) => resolver
                .resolve(bytecode.clone())
                .map_err(CompileError::JumpResolution),
            None => Ok(bytecode.bytes().to_vec()),
        }
    }

    fn run(&mut self) -> Result<CompiledScript, CompileError> {
        let options = self.options.clone();
        let bytecode = self.emit(&options)?;
        let code = self.resolve(&bytecode)?;

        let explicit = self.explicit_stack_size();
        let measure = explicit.is_none() && options.estimate_stack_size;
        let validate = options.validate && !self.script.validations.is_empty();
        let trial = if measure || validate {
            self.trial_run()?
        } else {
            None
        };

        if let Some(trial) = trial.as_ref().filter(|_| validate) {
            self.check_validations(trial);
        }

        let measured = trial.as_ref().filter(|_| measure);
        let (mut stack_size, stack_source) = match (explicit, measured) {
            (Some(size), _) => (size, StackSource::Explicit),
            (None, Some(trial)) => (trial.max_stack_bytes, StackSource::Trial),
            (None, None) => (self.estimated_stack_size(), StackSource::Estimate),
        };

        let ast = &self.script.ast;
        if options.support_yield && ast.contains_type(ast.root(), NodeType::Yield) {
            stack_size += YIELD_STACK_RESERVE;
        }

        let package = package(&code, &self.script.variables, stack_size, &options)?;

        info!(
            script = %self.script.name,
            bytes = code.len(),
            stack = stack_size,
            source = ?stack_source,
            "compiled script"
        );

        Ok(CompiledScript {
            package,
            bytecode,
            stack_size,
            stack_source,
        })
    }

    fn explicit_stack_size(&mut self) -> Option<u32> {
        if let Some(define) = self.script.defines.get(DEFINE_STACK_SIZE) {
            match define.trim().parse::<u32>() {
                Ok(size) => return Some(size),
                Err(_) => {
                    let message =
                        format!("ignoring invalid {} define '{}'", DEFINE_STACK_SIZE, define);
                    self.diagnostics.warning(message, None);
                }
            }
        }
        self.options.stack_size
    }

    fn estimated_stack_size(&mut self) -> u32 {
        let floor = self.options.default_stack_size;
        match estimate_stack_bytes(&self.script.ast, &self.script.variables, floor) {
            Ok(size) => size,
            Err(err) => {
                self.diagnostics.warning(err.to_string(), None);
                floor
            }
        }
    }

    /// Package in the Normal layout with a generous stack and run it once.
    /// SSMD code differs (inlined constants), so it is emitted again.
    fn trial_run(&mut self) -> Result<Option<TrialRun>, CompileError> {
        let Some(runner) = self.trial_runner else {
            self.diagnostics
                .warning("trial run requested but no trial runner is attached", None);
            return Ok(None);
        };

        let options = CompilerOptions {
            package_mode: PackageMode::Normal,
            package_stack: true,
            ..self.options.clone()
        };

        let bytecode = self.emit(&options)?;
        let code = self.resolve(&bytecode)?;
        let trial_package = package(
            &code,
            &self.script.variables,
            options.trial_stack_size,
            &options,
        )?;

        let trial = runner.run(&trial_package).map_err(CompileError::TrialRun)?;
        debug!(max_stack = trial.max_stack_bytes, "trial run finished");
        Ok(Some(trial))
    }

    /// Compare each assertion against the trial data. Failures are logged,
    /// never returned.
    fn check_validations(&mut self, trial: &TrialRun) -> usize {
        let epsilon = self.options.constant_epsilon;
        let mut failures = 0;

        for validation in self.script.validations.clone() {
            match self.validation_values(&validation, trial) {
                Ok((actual, expected)) if (actual - expected).abs() <= epsilon => {
                    self.diagnostics.trace(
                        format!(
                            "validation passed: {} == {}",
                            validation.name, validation.expected
                        ),
                        None,
                    );
                }
                Ok((actual, expected)) => {
                    failures += 1;
                    self.diagnostics.error(
                        format!(
                            "validation failed: {} is {}, expected {} ({})",
                            validation.name, actual, expected, validation.expected
                        ),
                        None,
                    );
                }
                Err(message) => {
                    failures += 1;
                    self.diagnostics.error(message, None);
                }
            }
        }

        if failures > 0 {
            warn!(failures, "validations failed");
        }
        failures
    }

    fn validation_values(
        &self,
        validation: &Validation,
        trial: &TrialRun,
    ) -> Result<(f32, f32), String> {
        let actual = self.trial_value(&validation.name, trial)?;
        let expected = match validation.expected.trim().parse::<f32>() {
            Ok(value) => value,
            Err(_) => self.trial_value(validation.expected.trim(), trial)?,
        };
        Ok((actual, expected))
    }

    fn trial_value(&self, name: &str, trial: &TrialRun) -> Result<f32, String> {
        let variable = self
            .script
            .variables
            .find(name)
            .ok_or_else(|| format!("validation references unknown variable '{}'", name))?;
        let offset = variable
            .offset
            .ok_or_else(|| format!("variable '{}' has no data offset", name))?;
        trial
            .data
            .get(offset as usize)
            .copied()
            .ok_or_else(|| format!("trial run data has no slot for '{}'", name))
    }
}

/// Compile `script` with `options`, without trial runner or jump resolver.
pub fn compile(script: Script, options: CompilerOptions) -> Result<CompiledScript, CompileError> {
    Compilation::new(script, options).compile()
}
