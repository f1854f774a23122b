use serde::{Deserialize, Serialize};

use crate::bytecode::op::BlastOp;

/// Role of an annotated byte in jump resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JumpLabelKind {
    /// The byte is the opcode of a jump to a symbolic target.
    Jump,
    /// The byte is a placeholder for the offset to the named target.
    Offset,
    /// The byte marks the address bound to the name.
    Label,
}

/// Symbolic annotation attached to one byte of a [`Buffer`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JumpLabel {
    pub kind: JumpLabelKind,
    pub name: String,
}

impl JumpLabel {
    pub fn jump(name: impl Into<String>) -> Self {
        Self {
            kind: JumpLabelKind::Jump,
            name: name.into(),
        }
    }

    pub fn offset(name: impl Into<String>) -> Self {
        Self {
            kind: JumpLabelKind::Offset,
            name: name.into(),
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self {
            kind: JumpLabelKind::Label,
            name: name.into(),
        }
    }
}

/// Intermediate bytecode: an append-only byte sequence where each byte may
/// carry one jump annotation.
///
/// Buffers compiled independently (one per top-level statement) are joined
/// with [`Buffer::append_segment`]; annotations move along with their bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buffer {
    code: Vec<u8>,
    labels: Vec<Option<JumpLabel>>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            code: Vec::with_capacity(capacity),
            labels: Vec::with_capacity(capacity),
        }
    }

    /// Concatenate segments in the given order.
    pub fn from_segments(segments: impl IntoIterator<Item = Buffer>) -> Self {
        let mut buffer = Buffer::new();
        for segment in segments {
            buffer.append_segment(segment);
        }
        buffer
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn add(&mut self, byte: u8) {
        self.code.push(byte);
        self.labels.push(None);
    }

    pub fn add_op(&mut self, op: BlastOp) {
        self.add(op.byte());
    }

    pub fn add_labeled(&mut self, byte: u8, label: JumpLabel) {
        self.code.push(byte);
        self.labels.push(Some(label));
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
        self.labels.resize(self.code.len(), None);
    }

    /// Emit a jump opcode and its offset placeholder, both tagged with `target`.
    pub fn add_jump(&mut self, op: BlastOp, target: &str) {
        self.add_labeled(op.byte(), JumpLabel::jump(target));
        self.add_labeled(0, JumpLabel::offset(target));
    }

    /// Emit a `nop` bound to `name`; the resolver turns it into an address.
    pub fn add_label(&mut self, name: &str) {
        self.add_labeled(BlastOp::Nop.byte(), JumpLabel::label(name));
    }

    pub fn append_segment(&mut self, segment: Buffer) {
        self.code.extend(segment.code);
        self.labels.extend(segment.labels);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.code
    }

    pub fn label_at(&self, index: usize) -> Option<&JumpLabel> {
        self.labels.get(index).and_then(Option::as_ref)
    }

    /// All annotated positions in byte order.
    pub fn labels(&self) -> impl Iterator<Item = (usize, &JumpLabel)> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.as_ref().map(|l| (i, l)))
    }

    pub fn has_labels(&self) -> bool {
        self.labels.iter().any(Option::is_some)
    }

    pub fn last(&self) -> Option<u8> {
        self.code.last().copied()
    }

    /// Position of the label byte bound to `name`.
    pub fn find_label(&self, name: &str) -> Option<usize> {
        self.labels()
            .find(|(_, l)| l.kind == JumpLabelKind::Label && l.name == name)
            .map(|(i, _)| i)
    }
}
