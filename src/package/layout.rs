use serde::{Deserialize, Serialize};

use super::error::PackageError;

/// Memory layout of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PackageMode {
    /// One allocation: `[code][metadata][data][stack]`.
    #[default]
    Normal,
    /// Shared `[code][metadata]` plus one `[data][stack]` record per lane.
    Ssmd,
}

/// Region sizes in bytes. Metadata holds one byte per 4-byte data or stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SegmentSizes {
    pub code: u32,
    pub metadata: u32,
    pub data: u32,
    pub stack: u32,
}

impl SegmentSizes {
    pub fn new(code: u32, metadata: u32, data: u32, stack: u32) -> Self {
        Self {
            code,
            metadata,
            data,
            stack,
        }
    }

    fn check(&self) -> Result<(), PackageError> {
        let slots = self.data as u64 + self.stack as u64;
        if slots % 4 != 0 || self.metadata as u64 != slots / 4 {
            return Err(PackageError::MetadataMismatch {
                metadata: self.metadata,
                data: self.data,
                stack: self.stack,
            });
        }
        Ok(())
    }
}

/// Region boundaries `O1..O4`.
///
/// Normal: metadata start, data start, stack start, total size.
/// SSMD: metadata start, shared block size, stack start within a lane
/// record, lane record size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Boundaries {
    pub o1: u32,
    pub o2: u32,
    pub o3: u32,
    pub o4: u32,
}

/// Where every region of a package starts, derived from its sizes alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLayout {
    pub mode: PackageMode,
    pub sizes: SegmentSizes,
    pub align_stack: bool,
    pub boundaries: Boundaries,
}

fn align(value: u64, to: u64) -> u64 {
    value.div_ceil(to) * to
}

fn narrow(value: u64, what: &'static str) -> Result<u32, PackageError> {
    u32::try_from(value).map_err(|_| PackageError::TooLarge {
        what,
        size: value as usize,
    })
}

impl PackageLayout {
    pub fn compute(
        mode: PackageMode,
        sizes: SegmentSizes,
        align_stack: bool,
    ) -> Result<Self, PackageError> {
        sizes.check()?;

        let code = sizes.code as u64;
        let metadata_end = code + sizes.metadata as u64;
        let stack_align = if align_stack { 8 } else { 4 };

        let boundaries = match mode {
            PackageMode::Normal => {
                let data_start = align(metadata_end, 4);
                let stack_start = align(data_start + sizes.data as u64, stack_align);
                let total = stack_start + sizes.stack as u64;
                Boundaries {
                    o1: narrow(code, "code")?,
                    o2: narrow(data_start, "data start")?,
                    o3: narrow(stack_start, "stack start")?,
                    o4: narrow(total, "package")?,
                }
            }
            PackageMode::Ssmd => {
                let stack_start = align(sizes.data as u64, stack_align);
                let record = stack_start + sizes.stack as u64;
                Boundaries {
                    o1: narrow(code, "code")?,
                    o2: narrow(metadata_end, "shared block")?,
                    o3: narrow(stack_start, "stack start")?,
                    o4: narrow(record, "lane record")?,
                }
            }
        };

        Ok(Self {
            mode,
            sizes,
            align_stack,
            boundaries,
        })
    }

    /// Bytes of the single allocation (Normal) or of the shared block (SSMD).
    pub fn shared_size(&self) -> usize {
        match self.mode {
            PackageMode::Normal => self.boundaries.o4 as usize,
            PackageMode::Ssmd => self.boundaries.o2 as usize,
        }
    }

    /// Bytes of one lane record; zero for the Normal layout.
    pub fn lane_size(&self) -> usize {
        match self.mode {
            PackageMode::Normal => 0,
            PackageMode::Ssmd => self.boundaries.o4 as usize,
        }
    }

    /// Start of the data region inside whichever buffer holds it.
    pub fn data_start(&self) -> usize {
        match self.mode {
            PackageMode::Normal => self.boundaries.o2 as usize,
            PackageMode::Ssmd => 0,
        }
    }

    pub fn stack_start(&self) -> usize {
        self.boundaries.o3 as usize
    }

    pub fn metadata_start(&self) -> usize {
        self.boundaries.o1 as usize
    }
}
