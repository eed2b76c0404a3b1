use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Most failures inside the simplifier never reach the caller: an emulation error aborts only
/// the block (or method) currently being rewritten, and that unit is left untouched for the
/// round. The variants below surface where a caller can act on them, when building a block
/// graph from a flat body, when generating a flat body back, and when the fixed-point driver
/// gives up.
///
/// # Error Categories
///
/// ## Structural Errors
/// - [`Error::Malformed`] - Inconsistent method body or block graph
/// - [`Error::InvalidBranchTarget`] - Branch operand does not start an instruction
/// - [`Error::InvalidBlock`] - Stale or out-of-range block index
/// - [`Error::StackUnderflow`] - Code generation found an impossible stack shape
///
/// ## Analysis Errors
/// - [`Error::UnresolvedOperand`] - A metadata operand could not be resolved
/// - [`Error::UnsupportedOperand`] - An instruction carries an operand of the wrong kind
/// - [`Error::OscillationDetected`] - The driver did not reach a fixed point
///
/// # Examples
///
/// ```rust
/// use dotflow::{blocks::Blocks, metadata::method::MethodBody, Error};
///
/// match Blocks::from_body(&MethodBody::default()) {
///     Ok(_) => println!("built"),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed body: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The method body or block graph is inconsistent.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A metadata token used as an instruction operand could not be resolved.
    ///
    /// Raised by the emulator for calls and field accesses whose target is unknown to
    /// the [`crate::metadata::resolver::MetadataResolver`]. Passes catch this and skip the
    /// affected block.
    #[error("Failed to resolve operand - {0}")]
    UnresolvedOperand(Token),

    /// An instruction carries an operand of the wrong kind for its opcode.
    #[error("Unexpected operand for '{0}'")]
    UnsupportedOperand(&'static str),

    /// A block index does not name a live block.
    #[error("Invalid block index - {0}")]
    InvalidBlock(usize),

    /// A branch in a flat body points at an index that does not start an instruction.
    #[error("Invalid branch target - {0}")]
    InvalidBranchTarget(usize),

    /// Code generation found a block whose instructions pop more than is available.
    #[error("Stack underflow in block {block} at depth {depth}")]
    StackUnderflow {
        /// Block in which the underflow happened
        block: usize,
        /// Depth after the underflowing instruction popped its operands
        depth: i64,
    },

    /// The fixed-point driver hit its iteration bound without converging.
    #[error("No fixed point reached after {0} iterations")]
    OscillationDetected(usize),
}
