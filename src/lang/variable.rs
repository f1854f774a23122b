use serde::{Deserialize, Serialize};

/// Stable handle into a [`Variables`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableId(pub u16);

impl std::fmt::Display for VariableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Element type stored in a data slot, written into the metadata segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    #[default]
    Numeric = 0,
    Bool32 = 1,
}

/// A script variable or an interned constant.
///
/// Constants are named by their literal spelling (`"3.5"`, `"-2"`), the
/// value is recovered by parsing the name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    pub vector_size: u8,
    pub is_constant: bool,
    pub data_type: DataType,

    /// Initial value for inputs, one entry per vector element.
    pub default: Option<Vec<f32>>,

    /// Offset in 4-byte slots from the start of the data segment.
    /// Assigned by [`Variables::calculate_offsets`]. Whether it fits a
    /// reference byte is checked at emission, after inlined constants are
    /// taken out.
    pub offset: Option<u32>,
}

impl Variable {
    /// Number of 4-byte data slots the variable occupies.
    pub fn slots(&self) -> usize {
        self.vector_size.max(1) as usize
    }

    pub fn constant_value(&self) -> Option<f32> {
        if !self.is_constant {
            return None;
        }
        self.name.parse::<f32>().ok()
    }

    /// Metadata descriptor: data type in the high nibble, vector size in the low nibble.
    pub fn metadata_byte(&self) -> u8 {
        ((self.data_type as u8) << 4) | (self.vector_size.max(1) & 0x0F)
    }

    /// Values written into the data segment before the first run.
    pub fn initial_values(&self) -> Vec<f32> {
        if let Some(value) = self.constant_value() {
            return vec![value; self.slots()];
        }
        let mut values = self.default.clone().unwrap_or_default();
        values.resize(self.slots(), 0.0);
        values
    }
}

/// The variable table of one script.
///
/// Nodes reference variables by [`VariableId`]; the table owns them. Data
/// layout places every constant first, then every other variable, each group
/// in id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variables {
    vars: Vec<Variable>,
}

impl Variables {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.vars.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: VariableId) -> Option<&mut Variable> {
        self.vars.get_mut(id.0 as usize)
    }

    pub fn find(&self, name: &str) -> Option<&Variable> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// Declare a plain variable. Offsets are not updated.
    pub fn declare(&mut self, name: impl Into<String>, vector_size: u8) -> VariableId {
        self.push(name.into(), vector_size, false, None)
    }

    /// Declare an input with initial values.
    pub fn declare_input(&mut self, name: impl Into<String>, default: Vec<f32>) -> VariableId {
        let size = default.len().max(1) as u8;
        self.push(name.into(), size, false, Some(default))
    }

    /// Declare a scalar constant. Offsets are not updated.
    pub fn declare_constant(&mut self, value: f32) -> VariableId {
        self.push(format!("{}", value), 1, true, None)
    }

    fn push(
        &mut self,
        name: String,
        vector_size: u8,
        is_constant: bool,
        default: Option<Vec<f32>>,
    ) -> VariableId {
        let id = VariableId(self.vars.len() as u16);
        self.vars.push(Variable {
            id,
            name,
            vector_size: vector_size.max(1),
            is_constant,
            data_type: DataType::Numeric,
            default,
            offset: None,
        });
        id
    }

    /// Find a constant whose value lies within `epsilon` of `value`.
    pub fn find_constant(&self, value: f32, epsilon: f32) -> Option<VariableId> {
        self.vars
            .iter()
            .filter_map(|v| v.constant_value().map(|c| (v.id, c)))
            .find(|(_, c)| (c - value).abs() <= epsilon || c.to_bits() == value.to_bits())
            .map(|(id, _)| id)
    }

    /// Reassign every data offset. Runs over the whole table.
    pub fn calculate_offsets(&mut self) {
        let mut offset = 0u32;
        for constants in [true, false] {
            for var in self.vars.iter_mut().filter(|v| v.is_constant == constants) {
                var.offset = Some(offset);
                offset += var.slots() as u32;
            }
        }
    }

    /// Slots occupied by constants; these sit at the front of the data segment.
    pub fn constant_slots(&self) -> usize {
        self.vars.iter().filter(|v| v.is_constant).map(Variable::slots).sum()
    }

    /// Total data slots, constants included.
    pub fn data_slots(&self) -> usize {
        self.vars.iter().map(Variable::slots).sum()
    }

    /// Variables sorted by data offset.
    pub fn in_layout_order(&self) -> Vec<&Variable> {
        let mut ordered: Vec<&Variable> = self.vars.iter().collect();
        ordered.sort_by_key(|v| (!v.is_constant, v.id));
        ordered
    }
}
