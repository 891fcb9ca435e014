use std::io::{Stdout, Write};

use thiserror::Error;

use crate::compiler::compile;
use crate::scanner::Scanner;

/// The bytecode container and the instruction encoding.
pub mod chunk;
mod error;
/// Heap objects, string interning.
pub mod heap;
/// Maps from interned strings to values.
pub mod table;
/// Lox values.
pub mod value;

pub use chunk::{Chunk, Instruction};
pub use error::{InternalError, LoxError, RuntimeError};
pub use heap::{Heap, LoxString, ObjRef, Object};
pub use table::Table;
pub use value::Value;

macro_rules! binary_op {
    ($self:ident, $op:tt) => {
        {
            let b = $self.stack_pop()?;
            let a = $self.stack_pop()?;
            match (a, b) {
                // Lox is lax about comparing NaNs and stuff
                #[allow(clippy::float_cmp)]
                (Value::Number(a), Value::Number(b)) => $self.stack_push((a $op b).into()),
                _ => Err(RuntimeError::OperandsMustBeNumbers.into()),
            }
        }
    };
}

const STACK_SIZE: usize = 256;

/// A Vm is a stateful executor of chunks.
///
/// The globals and the heap (and with it every interned string) persist across calls to `interpret`,
/// so a REPL can feed it one line at a time. The stack is emptied after every error.
#[derive(Debug)]
pub struct Vm<W = Stdout> {
    // The book uses an array for the stack. A Vec with a hard length check gives the same
    // fixed capacity without needing placeholder values for the unused slots.
    stack: Vec<Value>,
    heap: Heap,
    globals: Table,
    out: W,
}

// What can go wrong while executing one instruction, before we know which line to blame.
#[derive(Debug, Error)]
enum Fault {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Internal(#[from] InternalError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Fault {
    fn at_line(self, line: usize) -> LoxError {
        match self {
            Fault::Runtime(error) => LoxError::Runtime { error, line },
            Fault::Internal(e) => LoxError::Internal(e),
            Fault::Io(e) => LoxError::Io(e),
        }
    }
}

// Whether the loop should keep going after an instruction.
enum Flow {
    Continue,
    Halt,
}

impl Vm<Stdout> {
    /// A VM that prints to stdout.
    pub fn new() -> Self {
        Vm::with_output(std::io::stdout())
    }
}

impl Default for Vm<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Vm<W> {
    /// A VM whose `print` statements write to `out`.
    pub fn with_output(out: W) -> Self {
        Vm {
            stack: Vec::with_capacity(STACK_SIZE),
            heap: Heap::new(),
            globals: Table::new(),
            out,
        }
    }

    /// Compile `source` and run it.
    ///
    /// Nothing runs if compilation fails. A runtime error stops execution at the failing instruction;
    /// output printed before it stays printed.
    pub fn interpret(&mut self, source: &str) -> Result<(), LoxError> {
        let chunk = compile(Scanner::new(source), &mut self.heap).map_err(LoxError::Compile)?;
        self.run(&chunk)
    }

    /// Run an already compiled chunk. Its constants must have been interned into this VM's heap.
    pub fn run(&mut self, chunk: &Chunk) -> Result<(), LoxError> {
        let result = self.run_chunk(chunk);
        if let Err(e) = &result {
            log::debug!("execution stopped: {}", e);
            self.stack.clear();
        }
        self.out.flush()?;
        result
    }

    fn run_chunk(&mut self, chunk: &Chunk) -> Result<(), LoxError> {
        let mut ip = 0;
        while ip < chunk.len() {
            let (instruction, size) = chunk.read_instruction(ip)?;
            #[cfg(feature = "trace")]
            self.trace(chunk, ip);
            match self.execute(chunk, instruction) {
                Ok(Flow::Continue) => ip += size,
                Ok(Flow::Halt) => return Ok(()),
                Err(fault) => return Err(fault.at_line(chunk.line(ip).unwrap_or(0))),
            }
        }
        Ok(())
    }

    #[cfg(feature = "trace")]
    fn trace(&self, chunk: &Chunk, ip: usize) {
        if log::log_enabled!(log::Level::Trace) {
            let stack: String = self
                .stack
                .iter()
                .map(|v| format!("[ {} ]", v.display(&self.heap)))
                .collect();
            log::trace!("          {}", stack);
            log::trace!("{}", chunk.disassemble_instruction(ip, &self.heap).0);
        }
    }

    fn execute(&mut self, chunk: &Chunk, instruction: Instruction) -> Result<Flow, Fault> {
        match instruction {
            Instruction::Return => return Ok(Flow::Halt),
            Instruction::Constant(idx) => {
                let value = self.constant(chunk, idx)?;
                self.stack_push(value)?;
            }
            Instruction::Nil => self.stack_push(Value::Nil)?,
            Instruction::False => self.stack_push(Value::Boolean(false))?,
            Instruction::True => self.stack_push(Value::Boolean(true))?,
            Instruction::Pop => {
                self.stack_pop()?;
            }
            Instruction::GetGlobal(idx) => {
                let name = self.global_name(chunk, idx)?;
                match self.globals.get(name) {
                    Some(value) => self.stack_push(value)?,
                    None => return Err(self.undefined_variable(name).into()),
                }
            }
            Instruction::DefineGlobal(idx) => {
                let name = self.global_name(chunk, idx)?;
                let value = self.stack_peek(0)?;
                self.globals.set(name, value);
                self.stack_pop()?;
            }
            Instruction::SetGlobal(idx) => {
                let name = self.global_name(chunk, idx)?;
                let value = self.stack_peek(0)?;
                if self.globals.set(name, value) {
                    // Assignment doesn't declare; undo the accidental definition.
                    self.globals.delete(name);
                    return Err(self.undefined_variable(name).into());
                }
            }
            Instruction::Equal => {
                let b = self.stack_pop()?;
                let a = self.stack_pop()?;
                self.stack_push(Value::Boolean(a.equals(&b, &self.heap)))?;
            }
            Instruction::Greater => binary_op!(self, >)?,
            Instruction::Less => binary_op!(self, <)?,
            Instruction::Add => {
                let b = self.stack_pop()?;
                let a = self.stack_pop()?;
                let sum = match (a, b) {
                    (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
                    (Value::Object(a), Value::Object(b)) => self
                        .heap
                        .concatenate(a, b)
                        .map(Value::Object)
                        .ok_or(RuntimeError::OperandsMustBeNumbersOrStrings)?,
                    _ => return Err(RuntimeError::OperandsMustBeNumbersOrStrings.into()),
                };
                self.stack_push(sum)?;
            }
            Instruction::Subtract => binary_op!(self, -)?,
            Instruction::Multiply => binary_op!(self, *)?,
            Instruction::Divide => binary_op!(self, /)?,
            Instruction::Not => {
                let value = self.stack_pop()?;
                self.stack_push(Value::Boolean(value.is_falsey()))?;
            }
            Instruction::Negate => {
                let value = self.stack_pop()?;
                match value {
                    Value::Number(number) => self.stack_push(Value::Number(-number))?,
                    _ => return Err(RuntimeError::OperandMustBeNumber.into()),
                }
            }
            Instruction::Print => {
                let value = self.stack_pop()?;
                writeln!(self.out, "{}", value.display(&self.heap))?;
            }
        }
        Ok(Flow::Continue)
    }

    // Every object that reaches the stack or the globals comes through here or from the heap itself,
    // so nothing downstream sees a handle this heap doesn't own.
    fn constant(&self, chunk: &Chunk, idx: u8) -> Result<Value, InternalError> {
        match chunk.constant(idx)? {
            Value::Object(obj) if self.heap.get(obj).is_none() => {
                Err(InternalError::DanglingObject(idx))
            }
            value => Ok(value),
        }
    }

    fn global_name(&self, chunk: &Chunk, idx: u8) -> Result<ObjRef, InternalError> {
        match self.constant(chunk, idx)? {
            Value::Object(name) if self.heap.as_string(name).is_some() => Ok(name),
            _ => Err(InternalError::GlobalNameNotString(idx)),
        }
    }

    fn undefined_variable(&self, name: ObjRef) -> RuntimeError {
        let name = self
            .heap
            .as_string(name)
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        RuntimeError::UndefinedVariable(name)
    }

    fn stack_push(&mut self, value: Value) -> Result<(), Fault> {
        if self.stack.len() >= STACK_SIZE {
            Err(RuntimeError::StackOverflow.into())
        } else {
            self.stack.push(value);
            Ok(())
        }
    }

    fn stack_pop(&mut self) -> Result<Value, Fault> {
        self.stack
            .pop()
            .ok_or_else(|| InternalError::EmptyStack.into())
    }

    // The value `distance` slots down from the top, without popping.
    fn stack_peek(&self, distance: usize) -> Result<Value, Fault> {
        self.stack
            .len()
            .checked_sub(distance + 1)
            .and_then(|i| self.stack.get(i))
            .copied()
            .ok_or_else(|| InternalError::EmptyStack.into())
    }

    /// The current value of the global called `name`, if it's defined.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(self.heap.find_string(name)?)
    }

    /// The global variables.
    pub fn globals(&self) -> &Table {
        &self.globals
    }

    /// The heap holding every object this VM has created.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable access to the heap, e.g. to compile chunks for `run`.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Number of values currently on the stack. Zero between successful or failed runs.
    pub fn stack_len(&self) -> usize {
        self.stack.len()
    }

    /// Where `print` output goes.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Take the output sink back.
    pub fn into_output(self) -> W {
        self.out
    }
}
