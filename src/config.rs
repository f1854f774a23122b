use serde::{Deserialize, Serialize};

use crate::package::PackageMode;

/// Options steering emission, stack sizing and packaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Tolerance when matching constants by value.
    pub constant_epsilon: f32,

    pub package_mode: PackageMode,

    /// In the SSMD layout, emit constants into the code stream instead of
    /// storing them in every lane's data segment.
    pub inline_constant_data: bool,

    /// Reserve a stack region inside the package.
    pub package_stack: bool,

    /// Align the stack region to 8 bytes.
    pub align_stack: bool,

    /// Explicit stack size in bytes; wins over every estimate.
    pub stack_size: Option<u32>,

    /// Floor for the static stack estimate, in bytes.
    pub default_stack_size: u32,

    /// Measure the stack by running the program once.
    pub estimate_stack_size: bool,

    /// Stack given to the trial run, in bytes.
    pub trial_stack_size: u32,

    pub support_yield: bool,

    /// Emit `debug` and `debugstack` statements; skipped otherwise.
    pub include_debug_functions: bool,

    /// Compile top-level statements in parallel.
    pub parallel_compilation: bool,

    /// Evaluate the script's validation assertions on the trial run.
    pub validate: bool,
}

/// Bytes reserved on top of the stack estimate when a script yields.
pub const YIELD_STACK_RESERVE: u32 = 20;

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            constant_epsilon: 0.0001,
            package_mode: PackageMode::Normal,
            inline_constant_data: false,
            package_stack: true,
            align_stack: false,
            stack_size: None,
            default_stack_size: 16,
            estimate_stack_size: false,
            trial_stack_size: 1024,
            support_yield: false,
            include_debug_functions: true,
            parallel_compilation: false,
            validate: false,
        }
    }
}

impl CompilerOptions {
    pub fn ssmd() -> Self {
        Self {
            package_mode: PackageMode::Ssmd,
            inline_constant_data: true,
            ..Self::default()
        }
    }

    pub fn with_package_mode(mut self, mode: PackageMode) -> Self {
        self.package_mode = mode;
        self
    }

    pub fn with_inline_constants(mut self, inline: bool) -> Self {
        self.inline_constant_data = inline;
        self
    }

    pub fn with_stack_size(mut self, bytes: u32) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn with_estimated_stack(mut self, estimate: bool) -> Self {
        self.estimate_stack_size = estimate;
        self
    }

    pub fn with_parallel_compilation(mut self, parallel: bool) -> Self {
        self.parallel_compilation = parallel;
        self
    }

    pub fn with_yield(mut self, support: bool) -> Self {
        self.support_yield = support;
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_aligned_stack(mut self, align: bool) -> Self {
        self.align_stack = align;
        self
    }

    /// Constants go into the code stream rather than the data segment.
    pub fn inlines_constants(&self) -> bool {
        self.package_mode == PackageMode::Ssmd && self.inline_constant_data
    }
}
