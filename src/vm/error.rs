use thiserror::Error;

use crate::compiler::CompileError;

/// Errors that can be returned by running the intepreter.
#[derive(Debug, Error)]
pub enum LoxError {
    /// Scanning/parsing failed; every diagnostic that was reported, in source order.
    #[error("{}", render_compile_errors(.0))]
    Compile(Vec<CompileError>),
    /// RuntimeError happens with runtime problems, like mismatched types
    #[error("{error}\n[line {line}] in script")]
    Runtime {
        /// What went wrong.
        error: RuntimeError,
        /// Source line of the instruction that failed.
        line: usize,
    },
    /// Internal Errors should not occur for code that compiled successfully, but just in case.
    #[error("lox internal error: {0}")]
    Internal(#[from] InternalError),
    /// Writing `print` output failed.
    #[error("could not write output: {0}")]
    Io(#[from] std::io::Error),
}

impl LoxError {
    /// The process exit code a script runner should use for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoxError::Compile(_) => 65,
            LoxError::Runtime { .. } | LoxError::Internal(_) => 70,
            LoxError::Io(_) => 74,
        }
    }
}

fn render_compile_errors(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Problems a well-formed program can still run into.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Unary minus on a non-number.
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    /// Arithmetic or comparison with a non-number.
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    /// `+` with anything but two numbers or two strings.
    #[error("Operands must be two numbers or two strings.")]
    OperandsMustBeNumbersOrStrings,
    /// Reading or assigning a global that was never defined.
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    /// We have a hardcoded max stack size
    #[error("Stack overflow.")]
    StackOverflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// VM error that should never come up in code that compiled correctly
pub enum InternalError {
    /// Tried to get a value from an empty stack
    #[error("popped from an empty stack")]
    EmptyStack,
    /// A byte that isn't any instruction's op code.
    #[error("unknown opcode {opcode} at offset {offset}")]
    UnknownOpcode {
        /// The offending byte.
        opcode: u8,
        /// Where it was found.
        offset: usize,
    },
    /// The chunk ended in the middle of an instruction.
    #[error("instruction at offset {0} is missing its operand")]
    TruncatedInstruction(usize),
    /// An operand pointed past the end of the constant table.
    #[error("no constant at index {0}")]
    MissingConstant(u8),
    /// A global instruction whose name constant isn't a string.
    #[error("constant {0} names a global but is not a string")]
    GlobalNameNotString(u8),
    /// An object constant that isn't on this VM's heap, e.g. from a chunk compiled against another heap.
    #[error("constant {0} refers to an object this heap doesn't own")]
    DanglingObject(u8),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::ErrorLocation;

    #[test]
    fn test_runtime_error_rendering() {
        let error = LoxError::Runtime {
            error: RuntimeError::UndefinedVariable("y".to_string()),
            line: 3,
        };
        assert_eq!(error.to_string(), "Undefined variable 'y'.\n[line 3] in script");
        assert_eq!(error.exit_code(), 70);
    }

    #[test]
    fn test_compile_errors_render_one_per_line() {
        let error = LoxError::Compile(vec![
            CompileError {
                line: 1,
                location: ErrorLocation::At(";".to_string()),
                message: "Expect expression.".to_string(),
            },
            CompileError {
                line: 2,
                location: ErrorLocation::End,
                message: "Expect ';' after value.".to_string(),
            },
        ]);
        assert_eq!(
            error.to_string(),
            "[line 1] Error at ';': Expect expression.\n[line 2] Error at end: Expect ';' after value."
        );
        assert_eq!(error.exit_code(), 65);
    }
}
