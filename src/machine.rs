//! Machine state and the execution core.
//!
//! Eight general-purpose registers, the execution finger, a handle on
//! the array heap, and the fetch-advance-decode-execute spin cycle that
//! ties all of it together. This is the hot loop: a dense 14-way match
//! on the decoded operator, mirroring the teacher's `clock_cycle`/
//! `decode_by` shape but generalized from a byte-at-a-time 6502 fetch to
//! a platter-at-a-time UM-32 fetch.

use crate::error::UmError;
use crate::heap::{ArrayHeap, PROGRAM_ARRAY};
use crate::io::{ByteSink, ByteSource};
use crate::platter::{decode, platters_from_be_bytes, Decoded, Operator};

/// The eight general-purpose 32-bit registers.
pub type RegisterFile = [u32; 8];

/// Either the machine is still spinning, or it has come to rest for one
/// of the two non-error reasons the spec distinguishes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// Executed operator 7.
    Halt,
    /// The execution finger ran off the end of array 0.
    FellOffEnd,
}

/// Outcome of a single spin cycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Spin {
    Running,
    Halted(HaltReason),
}

/// The UM-32 virtual machine: registers, execution finger, array heap,
/// and the I/O boundary it talks to. Owns its I/O exclusively — per
/// spec §5 there is exactly one execution context and no locking is
/// ever required, so plain owned trait objects replace the teacher's
/// `Rc<RefCell<dyn CommunicationInterface>>` bus-sharing pattern (there
/// is nothing here for multiple owners to share).
pub struct Machine {
    regs: RegisterFile,
    finger: u32,
    heap: ArrayHeap,
    input: Box<dyn ByteSource>,
    output: Box<dyn ByteSink>,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("regs", &self.regs)
            .field("finger", &self.finger)
            .finish()
    }
}

impl Machine {
    /// Creates a machine with all registers zeroed, finger at 0, and an
    /// empty program array. Attaches the given I/O boundary.
    pub fn new(input: Box<dyn ByteSource>, output: Box<dyn ByteSink>) -> Self {
        log::info!("creating um32 machine");
        Self {
            regs: [0; 8],
            finger: 0,
            heap: ArrayHeap::new(),
            input,
            output,
        }
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn finger(&self) -> u32 {
        self.finger
    }

    /// Initializes array 0 from a raw big-endian byte image and resets
    /// the execution finger to 0. A source whose length is not a
    /// multiple of 4 bytes is `FailLoad`.
    pub fn load_program(&mut self, bytes: &[u8]) -> Result<(), UmError> {
        let platters =
            platters_from_be_bytes(bytes).ok_or(UmError::FailLoadMisaligned(bytes.len()))?;
        log::info!("loaded program: {} platters", platters.len());
        self.heap.install_program(platters);
        self.finger = 0;
        Ok(())
    }

    fn reg(&self, i: u8) -> u32 {
        self.regs[i as usize]
    }

    fn set_reg(&mut self, i: u8, value: u32) {
        self.regs[i as usize] = value;
    }

    /// Fetches the platter at the finger and advances the finger, or
    /// reports that execution has fallen off the end of array 0.
    fn fetch(&mut self) -> Option<u32> {
        let word = self.heap.program_word(self.finger)?;
        self.finger = self.finger.wrapping_add(1);
        Some(word)
    }

    /// Runs a single spin cycle: fetch, advance, decode, dispatch.
    pub fn step(&mut self) -> Result<Spin, UmError> {
        let Some(word) = self.fetch() else {
            log::info!("execution finger ran off the end of array 0");
            return Ok(Spin::Halted(HaltReason::FellOffEnd));
        };

        // Opcodes 14 and 15 are reserved and never emitted by decode()'s
        // Standard/Orthography variants; a fetched word can still carry
        // one, since array content is attacker- or bug-controlled (a
        // raw file load, or a running program AMENDing and then LOADP-ing
        // an arbitrary word into array 0). Surface it as a Fatal trap
        // rather than trusting the image to be well-formed.
        let op = ((word >> 28) & 0xF) as u8;
        let Some(decoded) = decode(word) else {
            return Err(UmError::FatalReservedOpcode { op });
        };

        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "finger={} word={word:#010x} decoded={decoded:?} regs={:?}",
                self.finger.wrapping_sub(1),
                self.regs
            );
        }

        match decoded {
            Decoded::Orthography { a, value } => {
                self.set_reg(a, value);
                Ok(Spin::Running)
            }
            Decoded::Standard { op, a, b, c } => self.dispatch(op, a, b, c),
        }
    }

    fn dispatch(&mut self, op: Operator, a: u8, b: u8, c: u8) -> Result<Spin, UmError> {
        match op {
            Operator::ConditionalMove => {
                if self.reg(c) != 0 {
                    self.set_reg(a, self.reg(b));
                }
                Ok(Spin::Running)
            }
            Operator::ArrayIndex => {
                let value = self.heap.read(self.reg(b), self.reg(c))?;
                self.set_reg(a, value);
                Ok(Spin::Running)
            }
            Operator::ArrayAmendment => {
                self.heap.write(self.reg(a), self.reg(b), self.reg(c))?;
                Ok(Spin::Running)
            }
            Operator::Addition => {
                self.set_reg(a, self.reg(b).wrapping_add(self.reg(c)));
                Ok(Spin::Running)
            }
            Operator::Multiplication => {
                self.set_reg(a, self.reg(b).wrapping_mul(self.reg(c)));
                Ok(Spin::Running)
            }
            Operator::Division => {
                let divisor = self.reg(c);
                if divisor == 0 {
                    return Err(UmError::FatalDivisionByZero { c });
                }
                self.set_reg(a, self.reg(b) / divisor);
                Ok(Spin::Running)
            }
            Operator::NotAnd => {
                self.set_reg(a, !(self.reg(b) & self.reg(c)));
                Ok(Spin::Running)
            }
            Operator::Halt => {
                log::info!("halt operator executed");
                Ok(Spin::Halted(HaltReason::Halt))
            }
            Operator::Allocation => {
                let len = self.reg(c);
                let id = self.heap.allocate(len)?;
                log::debug!("alloc: id={id} len={len}");
                self.set_reg(b, id);
                Ok(Spin::Running)
            }
            Operator::Abandonment => {
                let id = self.reg(c);
                log::debug!("free: id={id}");
                self.heap.free(id)?;
                Ok(Spin::Running)
            }
            Operator::Output => {
                let value = self.reg(c);
                if value > 0xFF {
                    return Err(UmError::FatalOutOfRangeOutput { c, value });
                }
                self.output.put(value as u8)?;
                // Flush before any subsequent input, so interactive
                // programs never deadlock waiting on a prompt the
                // terminal hasn't actually displayed yet.
                self.output.flush()?;
                Ok(Spin::Running)
            }
            Operator::Input => {
                let byte = self.input.get()?;
                let value = byte.map(u32::from).unwrap_or(0xFFFF_FFFF);
                self.set_reg(c, value);
                Ok(Spin::Running)
            }
            Operator::LoadProgram => {
                let source = self.reg(b);
                if source != PROGRAM_ARRAY {
                    log::debug!("loadp: duplicating array {source} into array 0");
                    self.heap.replace_zero_from(source)?;
                }
                self.finger = self.reg(c);
                Ok(Spin::Running)
            }
            Operator::Orthography => unreachable!("orthography decodes to its own variant"),
        }
    }

    /// Runs the spin cycle until halt or fall-off; propagates the first
    /// Fatal/FailAlloc error encountered.
    pub fn run(&mut self) -> Result<HaltReason, UmError> {
        loop {
            match self.step()? {
                Spin::Running => continue,
                Spin::Halted(reason) => return Ok(reason),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BufferSink, BufferSource};

    fn ortho(reg: u8, value: u32) -> u32 {
        (13u32 << 28) | ((reg as u32) << 25) | (value & 0x01FF_FFFF)
    }

    fn standard(op: u8, a: u8, b: u8, c: u8) -> u32 {
        ((op as u32) << 28) | ((a as u32) << 6) | ((b as u32) << 3) | (c as u32)
    }

    fn bytes_of(program: &[u32]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for w in program {
            bytes.extend_from_slice(&w.to_be_bytes());
        }
        bytes
    }

    fn machine_with(program: &[u32], input: Vec<u8>) -> Machine {
        let mut m = Machine::new(
            Box::new(BufferSource::new(input)),
            Box::new(BufferSink::default()),
        );
        m.load_program(&bytes_of(program)).unwrap();
        m
    }

    fn run_capturing(program: &[u32], input: Vec<u8>) -> (HaltReason, Vec<u8>) {
        struct Capture {
            sink: std::rc::Rc<std::cell::RefCell<BufferSink>>,
        }
        impl ByteSink for Capture {
            fn put(&mut self, byte: u8) -> Result<(), UmError> {
                self.sink.borrow_mut().put(byte)
            }
            fn flush(&mut self) -> Result<(), UmError> {
                self.sink.borrow_mut().flush()
            }
        }

        let sink = std::rc::Rc::new(std::cell::RefCell::new(BufferSink::default()));
        let mut m = Machine::new(
            Box::new(BufferSource::new(input)),
            Box::new(Capture { sink: sink.clone() }),
        );
        m.load_program(&bytes_of(program)).unwrap();
        let reason = m.run().unwrap();
        let out = sink.borrow().bytes.clone();
        (reason, out)
    }

    #[test]
    fn s1_halt_only() {
        let (reason, out) = run_capturing(&[standard(7, 0, 0, 0)], vec![]);
        assert_eq!(reason, HaltReason::Halt);
        assert!(out.is_empty());
    }

    #[test]
    fn s2_hello_a() {
        let program = [ortho(0, 65), standard(10, 0, 0, 0), standard(7, 0, 0, 0)];
        let (reason, out) = run_capturing(&program, vec![]);
        assert_eq!(reason, HaltReason::Halt);
        assert_eq!(out, vec![b'A']);
    }

    #[test]
    fn s3_addition() {
        let program = [
            ortho(0, 3),
            ortho(1, 4),
            standard(3, 2, 0, 1), // R2 = R0 + R1
            ortho(3, 48),
            standard(3, 4, 2, 3), // R4 = R2 + R3
            standard(10, 0, 0, 4),
            standard(7, 0, 0, 0),
        ];
        let (_, out) = run_capturing(&program, vec![]);
        assert_eq!(out, vec![b'7']);
    }

    #[test]
    fn s4_alloc_index_amend_free() {
        let program = [
            ortho(0, 1),
            standard(8, 0, 1, 0), // R1 = alloc(R0)
            ortho(2, 0),
            ortho(3, 66),
            standard(2, 1, 2, 3), // heap[R1][R2] = R3
            standard(1, 4, 1, 2), // R4 = heap[R1][R2]
            standard(10, 0, 0, 4),
            standard(9, 0, 0, 1), // free(R1)
            standard(7, 0, 0, 0),
        ];
        let (_, out) = run_capturing(&program, vec![]);
        assert_eq!(out, vec![b'B']);
    }

    #[test]
    fn s5_loadp_identity_jump() {
        // ORTHO R0=2, LOADP(R1=0, R0), HALT at offset 2
        let program = [
            ortho(0, 2),
            standard(12, 0, 1, 0), // loadp with B=0 (R1=0): pure jump
            standard(7, 0, 0, 0),
        ];
        let (reason, out) = run_capturing(&program, vec![]);
        assert_eq!(reason, HaltReason::Halt);
        assert!(out.is_empty());
    }

    #[test]
    fn s6_eof_sentinel_on_empty_stdin() {
        let program = [
            standard(11, 0, 0, 0), // IN R0
            standard(7, 0, 0, 0),
        ];
        let mut m = machine_with(&program, vec![]);
        let reason = m.run().unwrap();
        assert_eq!(reason, HaltReason::Halt);
        assert_eq!(m.registers()[0], 0xFFFF_FFFF);
    }

    #[test]
    fn division_by_zero_is_fatal() {
        let mut m = machine_with(&[standard(5, 0, 1, 2), standard(7, 0, 0, 0)], vec![]);
        let err = m.run().unwrap_err();
        assert_eq!(err, UmError::FatalDivisionByZero { c: 2 });
    }

    #[test]
    fn output_above_255_is_fatal() {
        let program = [ortho(0, 256), standard(10, 0, 0, 0)];
        let mut m = machine_with(&program, vec![]);
        let err = m.run().unwrap_err();
        assert_eq!(err, UmError::FatalOutOfRangeOutput { c: 0, value: 256 });
    }

    #[test]
    fn output_of_255_is_valid() {
        let program = [ortho(0, 255), standard(10, 0, 0, 0), standard(7, 0, 0, 0)];
        let (reason, out) = run_capturing(&program, vec![]);
        assert_eq!(reason, HaltReason::Halt);
        assert_eq!(out, vec![0xFF]);
    }

    #[test]
    fn wrapping_addition() {
        // R0 = u32::MAX via NAND(0, 0) = !0; R0 + R0 must wrap, not panic.
        let program = [
            ortho(0, 0),
            standard(6, 1, 0, 0), // R1 = NAND(R0, R0) = !0 = 0xFFFFFFFF
            standard(3, 2, 1, 1), // R2 = R1 + R1, wraps modulo 2^32
            standard(7, 0, 0, 0),
        ];
        let mut m = machine_with(&program, vec![]);
        m.run().unwrap();
        assert_eq!(m.registers()[1], u32::MAX);
        assert_eq!(m.registers()[2], u32::MAX.wrapping_add(u32::MAX));
    }

    #[test]
    fn nand_algebra() {
        let program = [
            ortho(0, 0x0F0_F0F0),
            ortho(1, 0x00F_F00F),
            standard(6, 2, 0, 1),
            standard(7, 0, 0, 0),
        ];
        let mut m = machine_with(&program, vec![]);
        m.run().unwrap();
        let b = m.registers()[0];
        let c = m.registers()[1];
        assert_eq!(m.registers()[2], !(b & c));
    }

    #[test]
    fn register_independence() {
        let program = [ortho(0, 7), standard(7, 0, 0, 0)];
        let mut m = machine_with(&program, vec![]);
        m.run().unwrap();
        assert_eq!(m.registers()[0], 7);
        for i in 1..8 {
            assert_eq!(m.registers()[i], 0);
        }
    }

    #[test]
    fn round_trip_load() {
        let program = [standard(7, 0, 0, 0), ortho(0, 1)];
        let mut m = machine_with(&program, vec![]);
        m.run().unwrap();
        assert_eq!(m.heap.program_word(0), Some(program[0]));
        assert_eq!(m.heap.program_word(1), Some(program[1]));
    }

    #[test]
    fn rejects_misaligned_image() {
        let mut m = Machine::new(
            Box::new(BufferSource::new(vec![])),
            Box::new(BufferSink::default()),
        );
        assert_eq!(
            m.load_program(&[0, 1, 2]),
            Err(UmError::FailLoadMisaligned(3))
        );
    }

    #[test]
    fn reserved_opcode_is_a_fatal_error_not_a_panic() {
        let mut m = machine_with(&[14u32 << 28], vec![]);
        let err = m.run().unwrap_err();
        assert_eq!(err, UmError::FatalReservedOpcode { op: 14 });
    }
}
