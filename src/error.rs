use thiserror::Error;

/// The error surface of the UM-32 core.
///
/// `FailLoad`/`FailAlloc` map to spec's pre-execution failures; the
/// `Fatal*` variants are runtime traps raised mid-spin-cycle. Every
/// variant carries enough context to print the "short diagnostic"
/// the spec's propagation policy calls for.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UmError {
    #[error("program image size {0} is not a multiple of 4 bytes")]
    FailLoadMisaligned(usize),

    #[error("failed to read program image: {0}")]
    FailLoadIo(String),

    #[error("allocation of {0} platters was refused")]
    FailAlloc(u32),

    #[error("division by zero in register {c}")]
    FatalDivisionByZero { c: u8 },

    #[error("output value {value} in register {c} is out of range 0..=255")]
    FatalOutOfRangeOutput { c: u8, value: u32 },

    #[error("array {id} is not mapped")]
    FatalUnmappedArray { id: u32 },

    #[error("offset {offset} is out of range for array {id} of length {len}")]
    FatalOutOfRangeOffset { id: u32, offset: u32, len: u32 },

    #[error("cannot free the reserved program array (id 0)")]
    FatalFreeReservedArray,

    #[error("cannot free unmapped array {id}")]
    FatalFreeUnmappedArray { id: u32 },

    #[error("reserved opcode {op} has no defined operation")]
    FatalReservedOpcode { op: u8 },

    #[error("output sink failed: {0}")]
    FatalIoSink(String),

    #[error("input source failed: {0}")]
    FatalIoSource(String),
}

impl UmError {
    /// Short tag used in CLI diagnostics, mirroring the taxonomy in spec §7.
    pub fn kind(&self) -> &'static str {
        match self {
            UmError::FailLoadMisaligned(_) | UmError::FailLoadIo(_) => "FailLoad",
            UmError::FailAlloc(_) => "FailAlloc",
            _ => "Fatal",
        }
    }
}
