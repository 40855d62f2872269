//! The instruction dispatcher: owns the memory map and the program counter,
//! evaluates one [`crate::instruction::Instruction`] per iteration, and
//! produces a [`KipResult`] per executed instruction.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use crate::argument::Argument;
use crate::fault::Fault;
use crate::instruction::Instruction;
use crate::memory::{Backing, MemoryMap, ReadFn, WriteFn};
use crate::opcode;

/// Tunable knobs for a single [`Engine::interpret_lines`] run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// A result is kept only when it failed or `verbosity >= opcode_verbosity`.
    pub verbosity: u8,
    /// Stops the run cleanly after this many dispatched (non-blank)
    /// instructions, if set.
    pub instruction_budget: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions { verbosity: 0, instruction_budget: None }
    }
}

/// The outcome of one executed instruction or one compile-time check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KipResult {
    pub success: bool,
    pub message: String,
    pub opcode_id: u8,
}

fn ok(opcode_id: u8, message: impl Into<String>) -> KipResult {
    KipResult { success: true, message: message.into(), opcode_id }
}

fn fail(opcode_id: u8, instruction: &Instruction, err: impl Display) -> KipResult {
    KipResult { success: false, message: format!("{} at \"{}\"", err, instruction.source_line), opcode_id }
}

/// Owns the address space and the program counter for one interpretation
/// run. Host buffers passed to [`Engine::map_memory_buffer`] are borrowed for
/// the engine's lifetime, never copied.
pub struct Engine<'a> {
    pub memory: MemoryMap<'a>,
    pc: u32,
    halted: bool,
    import_base_folder: PathBuf,
}

impl<'a> Engine<'a> {
    pub fn new() -> Engine<'a> {
        Engine { memory: MemoryMap::new(), pc: 0, halted: false, import_base_folder: PathBuf::new() }
    }

    pub fn map_memory_buffer(&mut self, buf: &'a mut [u8], mapped_start: u32) -> bool {
        let size = buf.len() as u32;
        self.memory.map(mapped_start, size, Backing::Buffer(buf))
    }

    pub fn map_memory_callbacks(
        &mut self,
        read: Option<ReadFn<'a>>,
        write: Option<WriteFn<'a>>,
        size: u32,
        mapped_start: u32,
    ) -> bool {
        self.memory.map(mapped_start, size, Backing::Callbacks { read, write })
    }

    pub fn unmap_by_start(&mut self, mapped_start: u32) -> bool {
        self.memory.unmap_by_start(mapped_start)
    }

    pub fn unmap_by_ptr(&mut self, ptr: *const u8) -> bool {
        self.memory.unmap_by_ptr(ptr)
    }

    pub fn set_stack_pointer(&mut self, addr: u32) -> bool {
        self.memory.set_stack_pointer(addr)
    }

    pub fn get_stack_pointer(&self) -> Option<u32> {
        self.memory.get_stack_pointer()
    }

    pub fn program_counter(&self) -> u32 {
        self.pc
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Evaluate one instruction with no program counter and no stack of
    /// instructions behind it — the REPL-style contextless mode from the
    /// dispatcher design. Handlers that need to mutate the PC (jumps, `CAL`,
    /// `HLT`) fail in this mode instead of silently doing nothing.
    pub fn interpret_line(&mut self, instruction: &Instruction) -> KipResult {
        if instruction.opcode_id == 0 {
            return ok(0, instruction.source_line.clone());
        }
        if is_control_flow(instruction.opcode_id) {
            return fail(instruction.opcode_id, instruction, "control-flow opcodes require a running program");
        }
        self.dispatch(instruction)
    }

    /// Run a full program starting at `initial_pc`. Returns the complete,
    /// undeduplicated sequence of results for every dispatched (non-blank)
    /// instruction — the full prefix of successes plus the terminal failure,
    /// if any.
    pub fn interpret_lines(
        &mut self,
        instructions: &[Instruction],
        initial_pc: u32,
        import_base_folder: PathBuf,
        options: &RunOptions,
    ) -> Vec<KipResult> {
        self.pc = initial_pc;
        self.halted = false;
        self.import_base_folder = import_base_folder;

        let reserve_hint = options.instruction_budget.map(|b| b as usize).unwrap_or(instructions.len());
        let mut results = Vec::with_capacity(reserve_hint);
        let mut executed: u64 = 0;

        loop {
            if self.halted {
                break;
            }
            let Some(instruction) = instructions.get(self.pc as usize) else {
                break;
            };
            if instruction.opcode_id == 0 {
                self.pc = self.pc.wrapping_add(1);
                continue;
            }
            if let Some(budget) = options.instruction_budget {
                if executed >= budget {
                    break;
                }
            }

            let result = self.dispatch(instruction);
            executed += 1;
            self.pc = self.pc.wrapping_add(1);
            let failed = !result.success;
            results.push(result);
            if failed {
                break;
            }
        }

        results
    }

    fn resolve_host_path(&self, raw: &[u8]) -> PathBuf {
        let raw = String::from_utf8_lossy(raw);
        if let Some(rest) = raw.strip_prefix("./").or_else(|| raw.strip_prefix(".\\")) {
            self.import_base_folder.join(rest)
        } else {
            PathBuf::from(raw.into_owned())
        }
    }

    fn dispatch(&mut self, instruction: &Instruction) -> KipResult {
        match dispatch_inner(self, instruction) {
            Ok(result) => result,
            Err(Fault::DivideByZero) => KipResult {
                success: false,
                message: format!("Divide by zero at {}", instruction.source_line),
                opcode_id: instruction.opcode_id,
            },
            Err(fault) => fail(instruction.opcode_id, instruction, fault),
        }
    }
}

impl<'a> Default for Engine<'a> {
    fn default() -> Self {
        Engine::new()
    }
}

fn is_control_flow(opcode_id: u8) -> bool {
    matches!(
        opcode::by_id(opcode_id).map(|o| o.mnemonic),
        Some("JMP" | "JEQ" | "JNE" | "JGT" | "JLT" | "JGE" | "JLE" | "HLT" | "CAL")
    )
}

/// Byte-arithmetic helper: `a op b`, wrapping modulo 256.
fn byte_op(a: u8, b: u8, op: &str) -> Result<u8, Fault> {
    let a = a as u32;
    let b = b as u32;
    let result = match op {
        "ADD" => a.wrapping_add(b) % 256,
        "SUB" => a.wrapping_sub(b) % 256,
        "MUL" => a.wrapping_mul(b) % 256,
        "DIV" => {
            if b == 0 {
                return Err(Fault::DivideByZero);
            }
            a / b
        }
        "MOD" => {
            if b == 0 {
                return Err(Fault::DivideByZero);
            }
            a % b
        }
        _ => unreachable!("unknown byte_op {}", op),
    };
    Ok(result as u8)
}

/// Word-arithmetic helper: `a op b`, wrapping modulo 2**32.
fn word_op(a: u32, b: u32, op: &str) -> Result<u32, Fault> {
    Ok(match op {
        "ADD" => a.wrapping_add(b),
        "SUB" => a.wrapping_sub(b),
        "MUL" => a.wrapping_mul(b),
        "DIV" => {
            if b == 0 {
                return Err(Fault::DivideByZero);
            }
            a / b
        }
        "MOD" => {
            if b == 0 {
                return Err(Fault::DivideByZero);
            }
            a % b
        }
        _ => unreachable!("unknown word_op {}", op),
    })
}

fn dispatch_inner(engine: &mut Engine, instruction: &Instruction) -> Result<KipResult, Fault> {
    let args = &instruction.args;
    let id = instruction.opcode_id;
    let mnemonic = opcode::by_id(id).map(|o| o.mnemonic).unwrap_or("");
    let memory = &mut engine.memory;

    macro_rules! addr {
        ($i:expr) => {
            args[$i].addr(memory)?
        };
    }
    macro_rules! byte {
        ($i:expr) => {
            args[$i].byte(memory)?
        };
    }
    macro_rules! string {
        ($i:expr) => {
            args[$i].string(memory)?
        };
    }

    match mnemonic {
        "STB" => {
            let value = byte!(0);
            let dest = addr!(1);
            memory.write_byte(dest, value)?;
        }
        "STA" => {
            let value = addr!(0);
            let dest = addr!(1);
            memory.write_u32(dest, value)?;
        }
        "STS" => {
            let text = string!(0);
            let dest = addr!(1);
            memory.write_string(dest, &text)?;
        }
        "FIL" => {
            let value = byte!(0);
            let start = addr!(1);
            let count = addr!(2);
            for i in 0..count {
                memory.write_byte(start.wrapping_add(i), value)?;
            }
        }
        "CPY" => {
            let src = addr!(0);
            let dest = addr!(1);
            let count = addr!(2);
            let data = memory.read_bytes_range(src, count)?;
            memory.write_bytes_range(dest, &data)?;
        }
        "BIN" => {
            let path_bytes = string!(0);
            let dest = addr!(1);
            let path = engine.resolve_host_path(&path_bytes);
            let data = fs::read(&path).map_err(|_| Fault::Unmapped { addr: dest })?;
            engine.memory.write_bytes_range(dest, &data)?;
        }
        "SAV" => {
            let src = addr!(0);
            let count = addr!(1);
            let path_bytes = string!(2);
            let path = engine.resolve_host_path(&path_bytes);
            let data = engine.memory.read_bytes_range(src, count)?;
            fs::write(&path, &data).map_err(|_| Fault::Unmapped { addr: src })?;
        }
        "RDB" => {
            let value = byte!(0);
            return Ok(ok(id, format!("RDB: {}", value)));
        }
        "RDA" => {
            let value = addr!(0);
            return Ok(ok(id, format!("RDA: {}", value)));
        }
        "RDS" => {
            let value = string!(0);
            return Ok(ok(id, format!("RDS: {}", String::from_utf8_lossy(&value))));
        }
        "JMP" => {
            let target = addr!(0);
            engine.pc = target.wrapping_sub(1);
        }
        "JEQ" | "JNE" | "JGT" | "JLT" | "JGE" | "JLE" => {
            let target = addr!(0);
            let lhs = byte!(1);
            let rhs = byte!(2);
            let take = match mnemonic {
                "JEQ" => lhs == rhs,
                "JNE" => lhs != rhs,
                "JGT" => lhs > rhs,
                "JLT" => lhs < rhs,
                "JGE" => lhs >= rhs,
                "JLE" => lhs <= rhs,
                _ => unreachable!(),
            };
            if take {
                engine.pc = target.wrapping_sub(1);
            }
        }
        "HLT" => {
            engine.halted = true;
        }
        "CAL" => {
            let target = addr!(0);
            let return_index = engine.pc.wrapping_add(1);
            engine.memory.push_bytes(&return_index.to_le_bytes())?;
            engine.pc = target.wrapping_sub(1);
        }
        "ADB" | "SBB" | "MLB" | "DVB" | "MDB" => {
            let a = byte!(0);
            let b = byte!(1);
            let dest = addr!(2);
            let op = match mnemonic {
                "ADB" => "ADD",
                "SBB" => "SUB",
                "MLB" => "MUL",
                "DVB" => "DIV",
                "MDB" => "MOD",
                _ => unreachable!(),
            };
            let result = byte_op(a, b, op)?;
            engine.memory.write_byte(dest, result)?;
        }
        "ADA" | "SBA" | "MLA" | "DVA" | "MDA" => {
            let a = addr!(0);
            let b = addr!(1);
            let dest = addr!(2);
            let op = match mnemonic {
                "ADA" => "ADD",
                "SBA" => "SUB",
                "MLA" => "MUL",
                "DVA" => "DIV",
                "MDA" => "MOD",
                _ => unreachable!(),
            };
            let result = word_op(a, b, op)?;
            engine.memory.write_u32(dest, result)?;
        }
        "INB" => {
            let addr = addr!(0);
            let value = engine.memory.read_byte(addr)?;
            engine.memory.write_byte(addr, value.wrapping_add(1))?;
        }
        "DCB" => {
            let addr = addr!(0);
            let value = engine.memory.read_byte(addr)?;
            engine.memory.write_byte(addr, value.wrapping_sub(1))?;
        }
        "INA" => {
            let addr = addr!(0);
            let value = engine.memory.read_u32(addr)?;
            engine.memory.write_u32(addr, value.wrapping_add(1))?;
        }
        "DCA" => {
            let addr = addr!(0);
            let value = engine.memory.read_u32(addr)?;
            engine.memory.write_u32(addr, value.wrapping_sub(1))?;
        }
        "BLS" | "BRS" => {
            let value = byte!(0);
            let shift = (byte!(1) % 8) as u32;
            let dest = addr!(2);
            let result = if mnemonic == "BLS" { value.wrapping_shl(shift) } else { value.wrapping_shr(shift) };
            memory.write_byte(dest, result)?;
        }
        "ROL" | "ROR" => {
            let value = byte!(0);
            let shift = (byte!(1) % 8) as u32;
            let dest = addr!(2);
            let result = if mnemonic == "ROL" { value.rotate_left(shift) } else { value.rotate_right(shift) };
            memory.write_byte(dest, result)?;
        }
        "AND" | "BOR" | "XOR" => {
            let a = byte!(0);
            let b = byte!(1);
            let dest = addr!(2);
            let result = match mnemonic {
                "AND" => a & b,
                "BOR" => a | b,
                "XOR" => a ^ b,
                _ => unreachable!(),
            };
            memory.write_byte(dest, result)?;
        }
        "NOT" => {
            let value = byte!(0);
            let dest = addr!(1);
            memory.write_byte(dest, !value)?;
        }
        "PUB" => {
            let value = byte!(0);
            engine.memory.push_bytes(&[value])?;
        }
        "PUA" => {
            let value = addr!(0);
            engine.memory.push_bytes(&value.to_le_bytes())?;
        }
        "PUS" => {
            let value = string!(0);
            engine.memory.push_string(&value)?;
        }
        "POB" => {
            let dest = addr!(0);
            let value = engine.memory.pop_bytes(1)?[0];
            engine.memory.write_byte(dest, value)?;
        }
        "POA" => {
            let dest = addr!(0);
            let bytes = engine.memory.pop_bytes(4)?;
            let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            engine.memory.write_u32(dest, value)?;
        }
        "POS" => {
            let dest = addr!(0);
            let value = engine.memory.pop_string()?;
            engine.memory.write_string(dest, &value)?;
        }
        _ => return Ok(fail(id, instruction, "unimplemented opcode")),
    }

    Ok(ok(id, instruction.source_line.clone()))
}

/// Convenience constructor mirroring [`Argument::addr`]'s "zero dereferences
/// yields the literal" rule, used by callers that build arguments by hand
/// (tests, the CLI).
pub fn literal(value: u32) -> Argument {
    Argument::Data { value, dereference_count: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{self};
    use crate::instruction::parse_line;
    use std::path::Path;

    fn build_program(lines: &[&str]) -> (Vec<Instruction>, u32, PathBuf) {
        let owned: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        let result = context::build(owned, PathBuf::new(), &|_: &Path| Ok(Vec::new())).unwrap();
        let instructions: Vec<Instruction> = result
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| parse_line(line, i + 1, &result.context).unwrap())
            .collect();
        (instructions, result.initial_pc, result.context.import_base_folder)
    }

    #[test]
    fn sta_writes_a_little_endian_word() {
        let mut buf = [0u8; 4096];
        let mut engine = Engine::new();
        engine.map_memory_buffer(&mut buf, 0);
        let (instructions, pc, folder) = build_program(&["STA 2864352239 100"]);
        let results = engine.interpret_lines(&instructions, pc, folder, &RunOptions::default());
        assert!(results.last().unwrap().success);
        assert_eq!(engine.memory.read_u32(100).unwrap(), 2864352239);
    }

    #[test]
    fn stb_with_binary_prefix() {
        let mut buf = [0u8; 4096];
        let mut engine = Engine::new();
        engine.map_memory_buffer(&mut buf, 0);
        let (instructions, pc, folder) = build_program(&["STB :10 100"]);
        let results = engine.interpret_lines(&instructions, pc, folder, &RunOptions::default());
        assert!(results.last().unwrap().success);
        assert_eq!(engine.memory.read_byte(100).unwrap(), 2);
    }

    #[test]
    fn double_dereference_chains_through_memory() {
        let mut buf = [0u8; 4096];
        buf[100..104].copy_from_slice(&200u32.to_le_bytes());
        buf[200] = 10;
        let mut engine = Engine::new();
        engine.map_memory_buffer(&mut buf, 0);
        let (instructions, pc, folder) = build_program(&["STB **100 300"]);
        let results = engine.interpret_lines(&instructions, pc, folder, &RunOptions::default());
        assert!(results.iter().all(|r| r.success));
        assert_eq!(engine.memory.read_byte(300).unwrap(), 10);
    }

    #[test]
    fn instruction_budget_stops_a_tight_loop() {
        // A flat count of every dispatched instruction: STB, JMP, STB, then
        // the budget is exhausted before the second JMP is reached.
        let mut buf = [0u8; 4096];
        let mut engine = Engine::new();
        engine.map_memory_buffer(&mut buf, 0);
        let (instructions, pc, folder) = build_program(&["> LOOP", "STB 1 10", "JMP LOOP"]);
        let options = RunOptions { verbosity: 0, instruction_budget: Some(3) };
        let results = engine.interpret_lines(&instructions, pc, folder, &options);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));
        let stb_id = opcode::lookup("STB").unwrap().id;
        let jmp_id = opcode::lookup("JMP").unwrap().id;
        assert_eq!(results.iter().filter(|r| r.opcode_id == stb_id).count(), 2);
        assert_eq!(results.iter().filter(|r| r.opcode_id == jmp_id).count(), 1);
    }

    #[test]
    fn pua_then_poa_roundtrips_and_restores_sp() {
        let mut buf = [0u8; 4096];
        let mut engine = Engine::new();
        engine.map_memory_buffer(&mut buf, 0);
        engine.set_stack_pointer(4096);
        let (instructions, pc, folder) = build_program(&["PUA $CAFEBABE", "POA 40"]);
        let results = engine.interpret_lines(&instructions, pc, folder, &RunOptions::default());
        assert!(results.iter().all(|r| r.success));
        assert_eq!(engine.memory.read_u32(40).unwrap(), 0xCAFEBABE);
        assert_eq!(engine.get_stack_pointer().unwrap(), 4096);
    }

    #[test]
    fn cpy_reports_the_unmapped_destination_range() {
        let mut buf = [0u8; 512];
        let mut engine = Engine::new();
        engine.map_memory_buffer(&mut buf, 0);
        let (instructions, pc, folder) = build_program(&["CPY 0 1000 16"]);
        let results = engine.interpret_lines(&instructions, pc, folder, &RunOptions::default());
        assert!(!results.last().unwrap().success);
        assert!(results.last().unwrap().message.contains("[1000, 1016)"));
    }

    #[test]
    fn divide_by_zero_is_a_clean_failure_not_a_panic() {
        let mut buf = [0u8; 64];
        let mut engine = Engine::new();
        engine.map_memory_buffer(&mut buf, 0);
        let (instructions, pc, folder) = build_program(&["DVB 10 0 20"]);
        let results = engine.interpret_lines(&instructions, pc, folder, &RunOptions::default());
        assert!(!results.last().unwrap().success);
        assert!(results.last().unwrap().message.starts_with("Divide by zero at"));
    }

    #[test]
    fn cal_pushes_the_line_after_itself_as_the_return_address() {
        let mut buf = [0u8; 4096];
        let mut engine = Engine::new();
        engine.map_memory_buffer(&mut buf, 0);
        engine.set_stack_pointer(4096);
        // line 0: CAL SUB, line 1: HLT, line 2: "> SUB" (blanked), line 3: HLT
        let (instructions, pc, folder) = build_program(&["CAL SUB", "HLT", "> SUB", "HLT"]);
        let results = engine.interpret_lines(&instructions, pc, folder, &RunOptions::default());
        assert!(results[0].success);
        let bytes = engine.memory.pop_bytes(4).unwrap();
        let return_index = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(return_index, 1);
    }

    #[test]
    fn non_jump_handler_advances_pc_by_exactly_one() {
        let mut buf = [0u8; 4096];
        let mut engine = Engine::new();
        engine.map_memory_buffer(&mut buf, 0);
        let (instructions, pc, folder) = build_program(&["STB 1 10", "STB 2 11"]);
        engine.interpret_lines(&instructions, pc, folder, &RunOptions::default());
        assert_eq!(engine.program_counter(), 2);
    }

    #[test]
    fn contextless_mode_rejects_control_flow_opcodes() {
        let mut engine = Engine::new();
        let context = context::Context { labels: Default::default(), import_base_folder: PathBuf::new() };
        let instr = parse_line("HLT", 1, &context).unwrap();
        let result = engine.interpret_line(&instr);
        assert!(!result.success);
    }
}
