//! Parameter and leaf-function emission.
//!
//! By the time a node gets here every parameter is simplex: a well-known
//! constant, a variable or `pop`. Anything still nested is rejected rather
//! than compiled partially.

use crate::bytecode::buffer::Buffer;
use crate::bytecode::compile::Emitter;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::{BlastOp, ID_THRESHOLD, MAX_DATA_OFFSET, ScriptFunction};
use crate::lang::node::{NodeId, NodeType};
use crate::lang::variable::{Variable, VariableId};

/// Largest element count that fits the `pushv` control byte.
pub const MAX_PUSHV_ELEMENTS: usize = 63;

/// Largest vector size the `pushv` control byte can express; 4 wraps to 0.
pub const MAX_PUSHV_VECTOR_SIZE: u8 = 4;

/// Pack element count and vector size into the `pushv` control byte.
pub fn pack_vector_control(count: usize, vector_size: u8) -> Option<u8> {
    if count == 0
        || count > MAX_PUSHV_ELEMENTS
        || vector_size == 0
        || vector_size > MAX_PUSHV_VECTOR_SIZE
    {
        return None;
    }
    Some(((count as u8) << 2) | (vector_size & 0b11))
}

impl Emitter<'_> {
    /// Emit one simplex parameter.
    pub fn compile_parameter(
        &self,
        id: NodeId,
        buf: &mut Buffer,
        allow_pop: bool,
    ) -> Result<(), CompileError> {
        let node = self.node(id);

        if node.is_operation() {
            return Err(CompileError::malformed(
                self.subject(),
                id,
                "operation found where a parameter was expected",
            ));
        }
        if !node.children.is_empty() {
            return Err(CompileError::structural(
                self.subject(),
                id,
                "parameter still has nested children",
            ));
        }

        if let Some(op) = node.constant_op {
            buf.add_op(op);
            return Ok(());
        }

        if node.is_pop() {
            if !allow_pop {
                return Err(CompileError::structural(
                    self.subject(),
                    id,
                    "pop is not allowed in this position",
                ));
            }
            buf.add_op(BlastOp::Pop);
            return Ok(());
        }

        match node.variable {
            Some(var) => self.emit_variable(id, var, buf),
            None => Err(CompileError::unresolved(
                self.subject(),
                id,
                "parameter is bound to neither a constant nor a variable",
            )),
        }
    }

    /// Check the count, then emit every parameter in order.
    pub fn compile_parameters(
        &self,
        owner: NodeId,
        params: &[NodeId],
        min: u8,
        max: u8,
        buf: &mut Buffer,
    ) -> Result<(), CompileError> {
        self.check_arity(owner, params.len(), min, max)?;

        for &param in params {
            let node = self.node(param);
            if !node.children.is_empty() {
                return Err(CompileError::structural_with_hint(
                    self.subject(),
                    param,
                    "function parameter still has nested children",
                    "nested expressions must be flattened into dependencies first",
                ));
            }
            match node.node_type {
                NodeType::Parameter => self.compile_parameter(param, buf, true)?,
                NodeType::Function => self.compile_function(param, buf)?,
                _ => {
                    return Err(CompileError::malformed(
                        self.subject(),
                        param,
                        "expected a parameter",
                    ));
                }
            }
        }

        Ok(())
    }

    fn check_arity(
        &self,
        owner: NodeId,
        count: usize,
        min: u8,
        max: u8,
    ) -> Result<(), CompileError> {
        if count < min as usize || count > max as usize {
            return Err(CompileError::arity(self.subject(), owner, min, max, count));
        }
        Ok(())
    }

    /// Emit a call: opcode, optional count byte, parameters.
    pub fn compile_function(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        let function = self.function_of(id)?;
        if function.is_push() {
            return self.compile_push(id, buf);
        }
        self.compile_call(id, function, buf, true)
    }

    /// `prefixed == false` drops the `ex_op` byte of extended functions; the
    /// `assignfe` family implies it.
    pub(super) fn compile_call(
        &self,
        id: NodeId,
        function: &ScriptFunction,
        buf: &mut Buffer,
        prefixed: bool,
    ) -> Result<(), CompileError> {
        let params = self.node(id).children.as_slice();
        self.check_arity(id, params.len(), function.min_params, function.max_params)?;

        match function.extended {
            Some(ext) => {
                if prefixed {
                    buf.add_op(BlastOp::ExOp);
                }
                buf.add(ext as u8);
            }
            None => buf.add_op(function.op),
        }

        if function.has_variable_arity() {
            buf.add(params.len() as u8);
        }

        self.compile_parameters(id, params, function.min_params, function.max_params, buf)
    }

    pub(super) fn function_of(&self, id: NodeId) -> Result<&'static ScriptFunction, CompileError> {
        self.node(id).function.ok_or_else(|| {
            CompileError::unresolved(self.subject(), id, "function binding is missing")
        })
    }

    /// Pick the cheapest push form for the child list.
    fn compile_push(&self, id: NodeId, buf: &mut Buffer) -> Result<(), CompileError> {
        let node = self.node(id);
        let children = node.children.as_slice();

        if children.is_empty() {
            return Err(CompileError::arity(self.subject(), id, 1, MAX_PUSHV_ELEMENTS as u8, 0));
        }

        // operators anywhere in the list: inline operation sequence
        if children.iter().any(|c| self.node(*c).is_operation()) {
            buf.add_op(BlastOp::Pushc);
            self.compile_operation_list(children, buf)?;
            buf.add_op(BlastOp::Nop);
            return Ok(());
        }

        if let [only] = children {
            let child = self.node(*only);
            if child.is_simplex() {
                buf.add_op(BlastOp::Push);
                return self.compile_parameter(*only, buf, true);
            }
            if child.is_function() {
                buf.add_op(BlastOp::Pushf);
                return self.compile_function(*only, buf);
            }
        }

        if self.is_flat_vector(id) {
            let control = pack_vector_control(children.len(), node.vector_size).ok_or_else(|| {
                CompileError::encoding_limit(
                    self.subject(),
                    id,
                    format!(
                        "pushv holds at most {} elements of size {}, got {} of size {}",
                        MAX_PUSHV_ELEMENTS,
                        MAX_PUSHV_VECTOR_SIZE,
                        children.len(),
                        node.vector_size
                    ),
                )
            })?;
            buf.add_op(BlastOp::Pushv);
            buf.add(control);
            for &child in children {
                self.compile_parameter(child, buf, false)?;
            }
            return Ok(());
        }

        buf.add_op(BlastOp::Push);
        buf.add_op(BlastOp::Begin);
        match children {
            [only] if self.node(*only).node_type == NodeType::Compound => {
                self.compile_operation_list(self.ast.children(*only), buf)?;
            }
            _ => self.compile_operation_list(children, buf)?,
        }
        buf.add_op(BlastOp::End);
        Ok(())
    }

    /// Vector literal whose elements are all simplex. `pop` has no size of
    /// its own, so vectors holding one take the generic form.
    pub(super) fn is_flat_vector(&self, id: NodeId) -> bool {
        let node = self.node(id);
        node.is_vector
            && node.children.len() > 1
            && node.children.iter().all(|c| {
                let element = self.node(*c);
                element.is_simplex() && !element.is_pop()
            })
    }

    /// Emit operands and operators in order; nested compounds become
    /// `begin .. end`.
    pub fn compile_operation_list(
        &self,
        items: &[NodeId],
        buf: &mut Buffer,
    ) -> Result<(), CompileError> {
        for &item in items {
            let node = self.node(item);
            match node.node_type {
                NodeType::Operation => self.compile_operation(item, buf)?,
                NodeType::Parameter => self.compile_parameter(item, buf, true)?,
                NodeType::Function => self.compile_function(item, buf)?,
                NodeType::Compound => {
                    buf.add_op(BlastOp::Begin);
                    self.compile_operation_list(&node.children, buf)?;
                    buf.add_op(BlastOp::End);
                }
                _ => {
                    return Err(CompileError::structural(
                        self.subject(),
                        item,
                        "statement found inside an expression",
                    ));
                }
            }
        }
        Ok(())
    }

    pub(super) fn compile_operation(
        &self,
        id: NodeId,
        buf: &mut Buffer,
    ) -> Result<(), CompileError> {
        let Some(token) = self.node(id).token else {
            return Err(CompileError::malformed(self.subject(), id, "operation without a token"));
        };
        let op = BlastOp::from_token(token).ok_or_else(|| {
            CompileError::structural(
                self.subject(),
                id,
                format!("token '{}' has no opcode", token.symbol()),
            )
        })?;
        buf.add_op(op);
        Ok(())
    }

    /// Emit a read of `var`: a data reference, or the constant itself when
    /// constants are inlined.
    pub(super) fn emit_variable(
        &self,
        id: NodeId,
        var: VariableId,
        buf: &mut Buffer,
    ) -> Result<(), CompileError> {
        let variable = self.variable(id, var)?;

        if variable.is_constant && self.options.inlines_constants() {
            let value = variable.constant_value().ok_or_else(|| {
                CompileError::unresolved(
                    self.subject(),
                    id,
                    format!("constant '{}' has no numeric value", variable.name),
                )
            })?;
            match BlastOp::constant_for(value, self.options.constant_epsilon) {
                Some(op) => buf.add_op(op),
                None => {
                    buf.add_op(BlastOp::ConstantF32);
                    buf.extend_from_slice(&value.to_le_bytes());
                }
            }
            return Ok(());
        }

        buf.add(self.data_reference(id, variable)?);
        Ok(())
    }

    /// Byte of an assignment destination. Constants are never written.
    pub(super) fn destination_byte(&self, id: NodeId) -> Result<u8, CompileError> {
        let Some(var) = self.node(id).variable else {
            return Err(CompileError::unresolved(
                self.subject(),
                id,
                "assignment has no destination variable",
            ));
        };
        let variable = self.variable(id, var)?;
        if variable.is_constant {
            return Err(CompileError::structural(
                self.subject(),
                id,
                format!("cannot assign to constant '{}'", variable.name),
            ));
        }
        self.data_reference(id, variable)
    }

    fn variable(&self, id: NodeId, var: VariableId) -> Result<&Variable, CompileError> {
        self.variables.get(var).ok_or_else(|| {
            CompileError::unresolved(
                self.subject(),
                id,
                format!("variable {} is not declared", var),
            )
        })
    }

    fn data_reference(&self, id: NodeId, variable: &Variable) -> Result<u8, CompileError> {
        let Some(offset) = variable.offset else {
            return Err(CompileError::unresolved(
                self.subject(),
                id,
                format!("variable '{}' has no data offset", variable.name),
            ));
        };

        let mut offset = offset as usize;
        if self.options.inlines_constants() {
            // constants are left out of the lane's data segment
            offset = offset.checked_sub(self.variables.constant_slots()).ok_or_else(|| {
                CompileError::internal(format!(
                    "variable '{}' sits inside the constant region",
                    variable.name
                ))
            })?;
        }

        if offset > MAX_DATA_OFFSET {
            return Err(CompileError::encoding_limit(
                self.subject(),
                id,
                format!(
                    "data offset {} of '{}' exceeds {}",
                    offset, variable.name, MAX_DATA_OFFSET
                ),
            ));
        }

        Ok((offset + ID_THRESHOLD) as u8)
    }
}
