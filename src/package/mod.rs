//! Executable packaging.
//!
//! A package is the bytecode plus everything the interpreter needs to run
//! it without allocating: one metadata byte per data slot, the initial data
//! and a stack region. The Normal layout keeps all of it in one buffer. The
//! SSMD layout shares code and metadata between lanes and gives every lane
//! its own copy of the data and stack record.

mod error;
mod layout;

pub use error::PackageError;
pub use layout::{Boundaries, PackageLayout, PackageMode, SegmentSizes};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CompilerOptions;
use crate::lang::variable::{Variable, Variables};

/// Bytes per data or stack slot.
pub const SLOT_BYTES: usize = 4;

/// A packaged program, ready to hand to an interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    layout: PackageLayout,
    /// Normal: the whole package. SSMD: code and metadata.
    shared: Vec<u8>,
    /// SSMD: initial data and stack of one lane. Empty for Normal.
    record: Vec<u8>,
}

impl Package {
    pub fn layout(&self) -> &PackageLayout {
        &self.layout
    }

    pub fn mode(&self) -> PackageMode {
        self.layout.mode
    }

    pub fn sizes(&self) -> SegmentSizes {
        self.layout.sizes
    }

    pub fn boundaries(&self) -> Boundaries {
        self.layout.boundaries
    }

    pub fn code(&self) -> &[u8] {
        &self.shared[..self.layout.metadata_start()]
    }

    pub fn metadata(&self) -> &[u8] {
        let start = self.layout.metadata_start();
        &self.shared[start..start + self.layout.sizes.metadata as usize]
    }

    fn record_bytes(&self) -> &[u8] {
        match self.layout.mode {
            PackageMode::Normal => &self.shared,
            PackageMode::Ssmd => &self.record,
        }
    }

    pub fn data(&self) -> &[u8] {
        let start = self.layout.data_start();
        &self.record_bytes()[start..start + self.layout.sizes.data as usize]
    }

    pub fn stack(&self) -> &[u8] {
        let start = self.layout.stack_start();
        &self.record_bytes()[start..start + self.layout.sizes.stack as usize]
    }

    /// The single allocation of a Normal package, or the shared block of an
    /// SSMD package.
    pub fn shared(&self) -> &[u8] {
        &self.shared
    }

    /// Template of one lane record (SSMD only).
    pub fn record(&self) -> Result<&[u8], PackageError> {
        match self.layout.mode {
            PackageMode::Ssmd => Ok(&self.record),
            PackageMode::Normal => Err(PackageError::NotBatched),
        }
    }

    /// `count` independent lane records, each a fresh copy of the template.
    pub fn lane_records(&self, count: usize) -> Result<Vec<Vec<u8>>, PackageError> {
        let record = self.record()?;
        Ok(vec![record.to_vec(); count])
    }

    /// Data segment decoded as floats.
    pub fn data_values(&self) -> Vec<f32> {
        self.data()
            .chunks_exact(SLOT_BYTES)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PackageError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode a package and check that its buffers match its layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PackageError> {
        let package: Package = postcard::from_bytes(bytes)?;

        let layout = package.layout;
        let recomputed = PackageLayout::compute(layout.mode, layout.sizes, layout.align_stack)?;
        if recomputed != layout {
            return Err(PackageError::Corrupt(format!(
                "stored boundaries {:?} differ from computed {:?}",
                layout.boundaries, recomputed.boundaries
            )));
        }
        if package.shared.len() != layout.shared_size()
            || package.record.len() != layout.lane_size()
        {
            return Err(PackageError::Corrupt(format!(
                "buffer sizes {}/{} do not match layout {}/{}",
                package.shared.len(),
                package.record.len(),
                layout.shared_size(),
                layout.lane_size()
            )));
        }

        Ok(package)
    }
}

/// Variables that get a data slot, in layout order.
fn packaged_variables<'a>(
    variables: &'a Variables,
    options: &CompilerOptions,
) -> Vec<&'a Variable> {
    let mut ordered = variables.in_layout_order();
    if options.inlines_constants() {
        ordered.retain(|v| !v.is_constant);
    }
    ordered
}

/// Lay out `code`, the variable table and a stack of `stack_bytes` into a
/// package of the mode selected by `options`.
///
/// When constants are inlined, constant variables get no data slot and no
/// metadata, and every offset is taken relative to the first non-constant.
pub fn package(
    code: &[u8],
    variables: &Variables,
    stack_bytes: u32,
    options: &CompilerOptions,
) -> Result<Package, PackageError> {
    let inline = options.inlines_constants();
    let skipped = if inline { variables.constant_slots() } else { 0 };
    let ordered = packaged_variables(variables, options);

    // metadata and initial values, checking that offsets agree with the order
    let mut metadata = Vec::new();
    let mut data = Vec::new();
    for var in &ordered {
        let offset = var.offset.ok_or_else(|| PackageError::MissingOffset {
            variable: var.name.clone(),
        })? as usize;
        let slot = data.len() / SLOT_BYTES;
        if offset < skipped || offset - skipped != slot {
            return Err(PackageError::OffsetMismatch {
                variable: var.name.clone(),
                expected: slot,
                found: offset.saturating_sub(skipped),
            });
        }

        let descriptor = var.metadata_byte();
        for value in var.initial_values() {
            metadata.push(descriptor);
            data.extend_from_slice(&value.to_le_bytes());
        }
    }

    let stack = if options.package_stack {
        (stack_bytes as usize).div_ceil(SLOT_BYTES) * SLOT_BYTES
    } else {
        0
    };
    // stack slots carry zeroed metadata
    metadata.resize(metadata.len() + stack / SLOT_BYTES, 0);

    let sizes = SegmentSizes::new(
        fit(code.len(), "code")?,
        fit(metadata.len(), "metadata")?,
        fit(data.len(), "data")?,
        fit(stack, "stack")?,
    );
    let layout = PackageLayout::compute(options.package_mode, sizes, options.align_stack)?;

    let mut shared = vec![0u8; layout.shared_size()];
    shared[..code.len()].copy_from_slice(code);
    let meta_start = layout.metadata_start();
    shared[meta_start..meta_start + metadata.len()].copy_from_slice(&metadata);

    let mut record = vec![0u8; layout.lane_size()];
    let target = match layout.mode {
        PackageMode::Normal => &mut shared,
        PackageMode::Ssmd => &mut record,
    };
    let data_start = layout.data_start();
    target[data_start..data_start + data.len()].copy_from_slice(&data);
    fill_nan(&mut target[layout.stack_start()..layout.stack_start() + stack]);

    debug!(
        mode = ?layout.mode,
        code = sizes.code,
        metadata = sizes.metadata,
        data = sizes.data,
        stack = sizes.stack,
        inlined_constants = inline,
        "packaged program"
    );

    Ok(Package {
        layout,
        shared,
        record,
    })
}

fn fit(size: usize, what: &'static str) -> Result<u32, PackageError> {
    u32::try_from(size).map_err(|_| PackageError::TooLarge { what, size })
}

/// Reading the stack before writing it yields NaN rather than stale values.
fn fill_nan(stack: &mut [u8]) {
    for slot in stack.chunks_exact_mut(SLOT_BYTES) {
        slot.copy_from_slice(&f32::NAN.to_le_bytes());
    }
}
