use std::fmt::{Display, Write};

use super::error::InternalError;
use super::heap::Heap;
use super::value::Value;

/// A single instruction, in a parsed/type-safe format.
/// The chunk stores raw bytes; this type is what the compiler hands to `Chunk::write_instruction`
/// and what the VM gets back from `Chunk::read_instruction`, so the execution loop never touches
/// the byte encoding itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Stop executing the chunk.
    Return,
    /// Load a constant by its index into the constant table.
    Constant(u8),
    /// Negate the top value on the stack
    Negate,
    /// If stack is TOP: b, a ..., pop two and push (a+b)
    Add,
    /// If stack is TOP: b, a ..., pop two and push (a-b)
    Subtract,
    /// If stack is TOP: b, a ..., pop two and push (a*b)
    Multiply,
    /// If stack is TOP: b, a ..., pop two and push (a/b)
    Divide,
    /// Put Nil on the stack
    Nil,
    /// Put false on the stack
    False,
    /// Put true on the stack
    True,
    /// Logical negation of the top stack item
    Not,
    /// Pop two and push a bool for if they are equal or not
    Equal,
    /// If stack is TOP: b, a, ..., push the bool a>b
    Greater,
    /// If stack is TOP: b, a, ..., push the bool a<b
    Less,
    /// Pop and print the top value
    Print,
    /// Pop and discard the top value
    Pop,
    /// Bind the top value to the global named by a constant, then pop it
    DefineGlobal(u8),
    /// Push the value of the global named by a constant
    GetGlobal(u8),
    /// Store the top value (without popping) into an existing global named by a constant
    SetGlobal(u8),
}

impl Instruction {
    const OP_CODE_RETURN: u8 = 0;
    const OP_CODE_CONSTANT: u8 = 1;
    const OP_CODE_NEGATE: u8 = 2;
    const OP_CODE_ADD: u8 = 3;
    const OP_CODE_SUBTRACT: u8 = 4;
    const OP_CODE_MULTIPLY: u8 = 5;
    const OP_CODE_DIVIDE: u8 = 6;
    const OP_CODE_NIL: u8 = 7;
    const OP_CODE_FALSE: u8 = 8;
    const OP_CODE_TRUE: u8 = 9;
    const OP_CODE_NOT: u8 = 10;
    const OP_CODE_EQUAL: u8 = 11;
    const OP_CODE_GREATER: u8 = 12;
    const OP_CODE_LESS: u8 = 13;
    const OP_CODE_PRINT: u8 = 14;
    const OP_CODE_POP: u8 = 15;
    const OP_CODE_DEFINE_GLOBAL: u8 = 16;
    const OP_CODE_GET_GLOBAL: u8 = 17;
    const OP_CODE_SET_GLOBAL: u8 = 18;

    /// Try to parse an instruction from the beginning of some bytes, returning the number of bytes that the instruction
    /// consists of on success in addition. `offset` is only used for error reporting.
    pub fn from_bytes(bytes: &[u8], offset: usize) -> Result<(Instruction, usize), InternalError> {
        let (&op_code, rest) = bytes
            .split_first()
            .ok_or(InternalError::TruncatedInstruction(offset))?;
        let operand = || {
            rest.first()
                .copied()
                .ok_or(InternalError::TruncatedInstruction(offset))
        };
        let instruction = match op_code {
            Instruction::OP_CODE_RETURN => Instruction::Return,
            Instruction::OP_CODE_CONSTANT => Instruction::Constant(operand()?),
            Instruction::OP_CODE_NEGATE => Instruction::Negate,
            Instruction::OP_CODE_ADD => Instruction::Add,
            Instruction::OP_CODE_SUBTRACT => Instruction::Subtract,
            Instruction::OP_CODE_MULTIPLY => Instruction::Multiply,
            Instruction::OP_CODE_DIVIDE => Instruction::Divide,
            Instruction::OP_CODE_NIL => Instruction::Nil,
            Instruction::OP_CODE_FALSE => Instruction::False,
            Instruction::OP_CODE_TRUE => Instruction::True,
            Instruction::OP_CODE_NOT => Instruction::Not,
            Instruction::OP_CODE_EQUAL => Instruction::Equal,
            Instruction::OP_CODE_GREATER => Instruction::Greater,
            Instruction::OP_CODE_LESS => Instruction::Less,
            Instruction::OP_CODE_PRINT => Instruction::Print,
            Instruction::OP_CODE_POP => Instruction::Pop,
            Instruction::OP_CODE_DEFINE_GLOBAL => Instruction::DefineGlobal(operand()?),
            Instruction::OP_CODE_GET_GLOBAL => Instruction::GetGlobal(operand()?),
            Instruction::OP_CODE_SET_GLOBAL => Instruction::SetGlobal(operand()?),
            opcode => return Err(InternalError::UnknownOpcode { opcode, offset }),
        };
        Ok((instruction, instruction.num_bytes()))
    }

    /// The tag byte.
    pub fn op_code(&self) -> u8 {
        match self {
            Self::Return => Instruction::OP_CODE_RETURN,
            Self::Constant(_) => Instruction::OP_CODE_CONSTANT,
            Self::Negate => Instruction::OP_CODE_NEGATE,
            Self::Add => Instruction::OP_CODE_ADD,
            Self::Subtract => Instruction::OP_CODE_SUBTRACT,
            Self::Multiply => Instruction::OP_CODE_MULTIPLY,
            Self::Divide => Instruction::OP_CODE_DIVIDE,
            Self::Nil => Instruction::OP_CODE_NIL,
            Self::False => Instruction::OP_CODE_FALSE,
            Self::True => Instruction::OP_CODE_TRUE,
            Self::Not => Instruction::OP_CODE_NOT,
            Self::Equal => Instruction::OP_CODE_EQUAL,
            Self::Greater => Instruction::OP_CODE_GREATER,
            Self::Less => Instruction::OP_CODE_LESS,
            Self::Print => Instruction::OP_CODE_PRINT,
            Self::Pop => Instruction::OP_CODE_POP,
            Self::DefineGlobal(_) => Instruction::OP_CODE_DEFINE_GLOBAL,
            Self::GetGlobal(_) => Instruction::OP_CODE_GET_GLOBAL,
            Self::SetGlobal(_) => Instruction::OP_CODE_SET_GLOBAL,
        }
    }

    /// The inline operand byte, for the instructions that carry one.
    pub fn operand(&self) -> Option<u8> {
        match self {
            Self::Constant(u) | Self::DefineGlobal(u) | Self::GetGlobal(u) | Self::SetGlobal(u) => {
                Some(*u)
            }
            _ => None,
        }
    }

    /// Number of bytes in the byte represention of this instruction
    pub fn num_bytes(&self) -> usize {
        match self.operand() {
            Some(_) => 2,
            None => 1,
        }
    }

    /// The mnemonic used by the disassembler.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Return => "OP_RETURN",
            Instruction::Constant(_) => "OP_CONSTANT",
            Instruction::Negate => "OP_NEGATE",
            Instruction::Add => "OP_ADD",
            Instruction::Subtract => "OP_SUBTRACT",
            Instruction::Multiply => "OP_MULTIPLY",
            Instruction::Divide => "OP_DIVIDE",
            Instruction::Nil => "OP_NIL",
            Instruction::False => "OP_FALSE",
            Instruction::True => "OP_TRUE",
            Instruction::Not => "OP_NOT",
            Instruction::Equal => "OP_EQUAL",
            Instruction::Greater => "OP_GREATER",
            Instruction::Less => "OP_LESS",
            Instruction::Print => "OP_PRINT",
            Instruction::Pop => "OP_POP",
            Instruction::DefineGlobal(_) => "OP_DEFINE_GLOBAL",
            Instruction::GetGlobal(_) => "OP_GET_GLOBAL",
            Instruction::SetGlobal(_) => "OP_SET_GLOBAL",
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.operand() {
            Some(u) => write!(f, "{:<16} {:4}", self.name(), u),
            None => f.write_str(self.name()),
        }
    }
}

/// A chunk is the unit of execution for the VM: encoded instructions, the source line of every byte,
/// and the constants the instructions refer to.
#[derive(Debug, Default)]
pub struct Chunk {
    code: Vec<u8>,
    constants: Vec<Value>,
    lines: Vec<usize>,
}

impl Chunk {
    /// A new chunk is empty.
    pub fn new() -> Self {
        Chunk {
            code: Vec::new(),
            constants: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Append one raw byte, recording the line it came from.
    pub fn write(&mut self, byte: u8, line: usize) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Add an instruction to the chunk's code.
    pub fn write_instruction(&mut self, instruction: Instruction, line: usize) {
        self.write(instruction.op_code(), line);
        if let Some(operand) = instruction.operand() {
            self.write(operand, line);
        }
    }

    /// Add a constant to the chunk's constants table, returning its index.
    /// Instructions can only address the first 256 constants; checking that is up to the caller.
    pub fn add_constant(&mut self, constant: Value) -> usize {
        self.constants.push(constant);
        self.constants.len() - 1
    }

    /// Decode the instruction starting at `offset`, along with its size in bytes.
    pub fn read_instruction(&self, offset: usize) -> Result<(Instruction, usize), InternalError> {
        let bytes = self
            .code
            .get(offset..)
            .ok_or(InternalError::TruncatedInstruction(offset))?;
        Instruction::from_bytes(bytes, offset)
    }

    /// The constant at `idx`.
    pub fn constant(&self, idx: u8) -> Result<Value, InternalError> {
        self.constants
            .get(usize::from(idx))
            .copied()
            .ok_or(InternalError::MissingConstant(idx))
    }

    /// The source line of the byte at `offset`.
    pub fn line(&self, offset: usize) -> Option<usize> {
        self.lines.get(offset).copied()
    }

    /// The encoded instructions.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// One line number per byte of `code()`.
    pub fn lines(&self) -> &[usize] {
        &self.lines
    }

    /// The constant table.
    pub fn constants(&self) -> &[Value] {
        &self.constants
    }

    /// Size of the code in bytes.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether no code has been written.
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Render the instruction at `offset` as one line of text, returning the offset of the next instruction.
    /// The heap is needed to show string constants.
    pub fn disassemble_instruction(&self, offset: usize, heap: &Heap) -> (String, usize) {
        let mut ret = format!("{:04} ", offset);
        if offset > 0 && self.line(offset) == self.line(offset - 1) {
            ret.push_str("   | ");
        } else {
            let _ = write!(&mut ret, "{:4} ", self.line(offset).unwrap_or(0));
        }

        match self.read_instruction(offset) {
            Ok((instruction, size)) => {
                let _ = write!(&mut ret, "{}", instruction);
                if let Some(idx) = instruction.operand() {
                    match self.constant(idx) {
                        Ok(value) => {
                            let _ = write!(&mut ret, " '{}'", value.display(heap));
                        }
                        Err(_) => ret.push_str(" <missing constant>"),
                    }
                }
                (ret, offset + size)
            }
            Err(InternalError::UnknownOpcode { opcode, .. }) => {
                let _ = write!(&mut ret, "Unknown opcode {}", opcode);
                (ret, offset + 1)
            }
            Err(_) => {
                ret.push_str("<truncated instruction>");
                (ret, self.code.len())
            }
        }
    }

    /// Return a human-readable string for a chunk.
    pub fn disassemble(&self, title: &str, heap: &Heap) -> String {
        let mut ret = format!("== {} ==\n", title);
        let mut offset = 0;
        while offset < self.code.len() {
            let (line, next) = self.disassemble_instruction(offset, heap);
            ret.push_str(&line);
            ret.push('\n');
            offset = next;
        }
        ret
    }
}
