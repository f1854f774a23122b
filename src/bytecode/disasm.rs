use crate::bytecode::buffer::{Buffer, JumpLabelKind};
use crate::bytecode::op::{BlastOp, ExtendedOp, FUNCTIONS, ID_THRESHOLD};
use crate::lang::variable::Variables;

/// Render one line per instruction, with label bytes marked `►`.
///
/// Operands that belong to an instruction (jump offsets, destinations,
/// count and control bytes, inlined constants) are folded into its line;
/// parameter bytes get lines of their own.
pub fn disassemble(buffer: &Buffer, variables: Option<&Variables>) -> String {
    let mut output = String::new();
    let mut ip = 0;

    while ip < buffer.len() {
        let (text, width) = decode(buffer, ip, variables);

        match buffer.label_at(ip) {
            Some(label) if label.kind == JumpLabelKind::Label => {
                output.push_str(&format!("      ┌── {}\n", label.name));
                output.push_str(&format!("{:04} ► {}\n", ip, text));
            }
            _ => output.push_str(&format!("{:04}   {}\n", ip, text)),
        }

        ip += width.max(1);
    }

    output
}

/// Name of the data slot a reference byte points at.
fn operand(byte: u8, variables: Option<&Variables>) -> String {
    let offset = byte as usize - ID_THRESHOLD;
    variables
        .and_then(|vars| vars.iter().find(|v| v.offset.map(|o| o as usize) == Some(offset)))
        .map(|v| format!("{} (#{})", v.name, offset))
        .unwrap_or_else(|| format!("#{}", offset))
}

fn byte_text(byte: Option<u8>, variables: Option<&Variables>) -> String {
    match byte {
        Some(b) if b as usize >= ID_THRESHOLD => operand(b, variables),
        Some(b) => BlastOp::from_byte(b)
            .map(|op| op.name().to_string())
            .unwrap_or_else(|| format!("0x{:02x}", b)),
        None => "<truncated>".to_string(),
    }
}

fn has_count_byte(op: BlastOp, ext: Option<ExtendedOp>) -> bool {
    FUNCTIONS
        .iter()
        .any(|f| f.op == op && f.extended == ext && f.has_variable_arity() && !f.is_push())
}

/// Decode the instruction at `ip`; returns its text and byte width.
fn decode(buffer: &Buffer, ip: usize, variables: Option<&Variables>) -> (String, usize) {
    let code = buffer.bytes();
    let byte = code[ip];
    let next = |n: usize| code.get(ip + n).copied();

    if byte as usize >= ID_THRESHOLD {
        return (operand(byte, variables), 1);
    }
    let Some(op) = BlastOp::from_byte(byte) else {
        return (format!("?? 0x{:02x}", byte), 1);
    };
    let name = op.name().to_uppercase();

    match op {
        _ if op.is_jump() => {
            let target = buffer
                .label_at(ip)
                .filter(|l| l.kind == JumpLabelKind::Jump)
                .map_or("?", |l| l.name.as_str());
            let offset = next(1).map_or("?".to_string(), |o| o.to_string());
            (format!("{:<11} {} → {}", name, offset, target), 2)
        }

        BlastOp::ConstantF32 => match code.get(ip + 1..ip + 5) {
            Some(bytes) => {
                let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                (format!("{:<11} {:?}", name, value), 5)
            }
            None => (format!("{:<11} <truncated>", name), code.len() - ip),
        },

        BlastOp::ExOp => {
            let ext = next(1).and_then(ExtendedOp::from_byte);
            let ext_name = ext.map_or("?", ExtendedOp::name);
            if has_count_byte(BlastOp::ExOp, ext) {
                let count = next(2).map_or("?".to_string(), |c| c.to_string());
                (format!("{:<11} {} n={}", name, ext_name, count), 3)
            } else {
                (format!("{:<11} {}", name, ext_name), 2)
            }
        }

        BlastOp::Pushv => match next(1) {
            Some(control) => (
                format!(
                    "{:<11} count={} size={}",
                    name,
                    control >> 2,
                    match control & 0b11 {
                        0 => 4,
                        s => s,
                    }
                ),
                2,
            ),
            None => (format!("{:<11} <truncated>", name), 1),
        },

        BlastOp::Assignfe | BlastOp::Assignfen => {
            let destination = byte_text(next(1), variables);
            let ext = next(2).and_then(ExtendedOp::from_byte);
            let ext_name = ext.map_or("?", ExtendedOp::name);
            if has_count_byte(BlastOp::ExOp, ext) {
                let count = next(3).map_or("?".to_string(), |c| c.to_string());
                (format!("{:<11} {} = {} n={}", name, destination, ext_name, count), 4)
            } else {
                (format!("{:<11} {} = {}", name, destination, ext_name), 3)
            }
        }

        BlastOp::Assign
        | BlastOp::Assigns
        | BlastOp::Assignf
        | BlastOp::Assignfn
        | BlastOp::Assignv => (format!("{:<11} {}", name, byte_text(next(1), variables)), 2),

        _ if has_count_byte(op, None) => {
            let count = next(1).map_or("?".to_string(), |c| c.to_string());
            (format!("{:<11} n={}", name, count), 2)
        }

        _ => (name, 1),
    }
}
