// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The bytecode interpreter.
//!
//! The interpreter is stateless: every register lives on the [`Amx`]
//! instance, so execution can stop at any opcode boundary (sleep, fault,
//! debug veto) and resume later. `exec` resolves the entry point, frames
//! the host-pushed arguments, and drives the fetch/decode/dispatch loop
//! until the code halts, returns to the entry frame, faults, or sleeps.
//!
//! Fault discipline: a fatal error restores the stack and heap to the
//! marks captured at entry, leaves the error sticky on the instance, and
//! returns it. Sleep preserves every register verbatim; a later
//! `exec(EXEC_CONT)` continues at the saved instruction pointer.

#[cfg(test)]
mod vm_test;

use alloc::sync::Arc;
use alloc::vec::Vec;

use pawn_abi::cell::{CELL_SIZE, STK_MARGIN};
use pawn_abi::{AmxError, AmxFlags, Cell, EXEC_CONT, EXEC_MAIN, Ucell};

use crate::bytecode::Opcode;
use crate::machine::Amx;
use crate::natives::param_cells;

impl Amx {
    /// Run a public function, `main`, or resume from sleep.
    ///
    /// `index` selects a public by table index, [`EXEC_MAIN`] runs the
    /// module entry point, [`EXEC_CONT`] resumes a sleeping instance.
    /// Host-pushed cells become the call's arguments; their count is
    /// framed on the stack and [`Amx::pri`] carries the return value,
    /// which is also returned.
    ///
    /// # Errors
    ///
    /// - [`AmxError::Init`] when no module is loaded
    /// - [`AmxError::InvState`] on reentry or a resume without sleep
    /// - [`AmxError::Callback`] when no callback is installed
    /// - [`AmxError::Index`] for an unknown entry index
    /// - [`AmxError::Sleep`] when the script sleeps; the sleep value is
    ///   in [`Amx::pri`] and `exec(EXEC_CONT)` resumes
    /// - any script fault, with stack and heap restored to entry state
    pub fn exec(&mut self, index: i32) -> Result<Cell, AmxError> {
        if !self.is_initialized() {
            return Err(AmxError::Init);
        }
        if self.flags.contains(AmxFlags::BROWSE) {
            return Err(AmxError::InvState);
        }
        if self.callback.is_none() {
            return Err(AmxError::Callback);
        }

        if index == EXEC_CONT {
            if self.error != Some(AmxError::Sleep) {
                return Err(AmxError::InvState);
            }
            self.error = None;
        } else {
            let header = self.header()?;
            let cip = if index == EXEC_MAIN {
                if header.cip < 0 {
                    return Err(AmxError::Index);
                }
                header.cip as Cell
            } else {
                let public = usize::try_from(index).map_err(|_| AmxError::Index)?;
                self.public_address(public)?
            };
            self.error = None;
            self.cip = cip;

            // The reset marks describe the state before the host pushed
            // this call's arguments.
            self.reset_stk = self.stk + (self.paramcount * CELL_SIZE) as Cell;
            self.reset_hea = self.hea;

            // Frame the arguments: their byte count, then a zero return
            // address; returning to code offset zero executes the halt
            // instruction every module carries there.
            let arg_bytes = (self.paramcount * CELL_SIZE) as Cell;
            self.paramcount = 0;
            frame_push(self, arg_bytes)?;
            frame_push(self, 0)?;
        }

        self.flags.insert(AmxFlags::BROWSE);
        let result = run(self);
        self.flags.remove(AmxFlags::BROWSE);

        match result {
            Ok(retval) => {
                self.stk = self.reset_stk;
                self.hea = self.reset_hea;
                Ok(retval)
            }
            Err(AmxError::Sleep) => {
                self.error = Some(AmxError::Sleep);
                Err(AmxError::Sleep)
            }
            Err(error) => {
                self.stk = self.reset_stk;
                self.hea = self.reset_hea;
                self.error = Some(error);
                Err(error)
            }
        }
    }
}

/// Push without counting toward `paramcount`; used by the interpreter.
fn frame_push(amx: &mut Amx, value: Cell) -> Result<(), AmxError> {
    let new_stk = i64::from(amx.stk) - CELL_SIZE as i64;
    if new_stk < i64::from(amx.hea) + i64::from(STK_MARGIN) {
        return Err(AmxError::StackErr);
    }
    amx.stk = new_stk as Cell;
    amx.write_cell(amx.stk, value)
}

fn pop(amx: &mut Amx) -> Result<Cell, AmxError> {
    let value = amx.read_cell(amx.stk)?;
    amx.stk += CELL_SIZE as Cell;
    if amx.stk > amx.stp {
        return Err(AmxError::StackLow);
    }
    Ok(value)
}

/// Convert a code-relative byte target into a cell index.
fn code_index(target: Cell, code_len: usize) -> Result<usize, AmxError> {
    let target = usize::try_from(target).map_err(|_| AmxError::MemAccess)?;
    if target.rem_euclid(CELL_SIZE) != 0 || target / CELL_SIZE >= code_len {
        return Err(AmxError::MemAccess);
    }
    Ok(target / CELL_SIZE)
}

/// Validate a byte block for indirect access: in range and not
/// straddling the free gap between heap and stack.
fn chk_block(amx: &Amx, addr: Cell, len: usize) -> Result<usize, AmxError> {
    let offset = amx.chk_range(addr, len)?;
    let end = addr + len as Cell;
    if addr < amx.stk && end > amx.hea {
        return Err(AmxError::MemAccess);
    }
    Ok(offset)
}

/// Floored signed division: quotient toward negative infinity, the
/// remainder takes the divisor's sign.
fn floored_div(dividend: Cell, divisor: Cell) -> Result<(Cell, Cell), AmxError> {
    if divisor == 0 {
        return Err(AmxError::Divide);
    }
    let mut quotient = dividend.wrapping_div(divisor);
    let mut remainder = dividend.wrapping_rem(divisor);
    if remainder != 0 && (remainder ^ divisor) < 0 {
        quotient -= 1;
        remainder += divisor;
    }
    Ok((quotient, remainder))
}

fn unsigned_div(dividend: Cell, divisor: Cell) -> Result<(Cell, Cell), AmxError> {
    if divisor == 0 {
        return Err(AmxError::Divide);
    }
    let quotient = (dividend as Ucell) / (divisor as Ucell);
    let remainder = (dividend as Ucell) % (divisor as Ucell);
    Ok((quotient as Cell, remainder as Cell))
}

/// Gather the system-request parameter cells: the argument byte count at
/// the top of the stack, then the arguments.
fn sysreq_params(amx: &Amx) -> Result<Vec<Cell>, AmxError> {
    let arg_bytes = amx.read_cell(amx.stk)?;
    if arg_bytes < 0 {
        return Err(AmxError::MemAccess);
    }
    amx.get_cells(amx.stk, param_cells(arg_bytes))
}

/// Invoke the system-request callback and handle raised errors.
///
/// The result cell lands in `pri`. An error returned by the callback, or
/// raised on the instance by the native, aborts execution; sleep
/// propagates with all registers preserved.
fn sysreq(amx: &mut Amx, index: Cell, resume_at: usize) -> Result<(), AmxError> {
    let callback = amx.callback.ok_or(AmxError::Callback)?;
    amx.cip = (resume_at * CELL_SIZE) as Cell;
    let params = sysreq_params(amx)?;

    let result = callback(amx, index, &params);
    let raised = amx.error.take();
    match result {
        Ok(value) => {
            amx.pri = value;
            match raised {
                None => Ok(()),
                Some(error) => Err(error),
            }
        }
        Err(error) => Err(error),
    }
}

/// Call a native directly, bypassing the callback.
fn sysreq_direct(amx: &mut Amx, index: Cell, resume_at: usize) -> Result<(), AmxError> {
    let native = usize::try_from(index)
        .ok()
        .and_then(|i| amx.native_fn(i))
        .ok_or(AmxError::NotFound)?;
    amx.cip = (resume_at * CELL_SIZE) as Cell;
    amx.sysreq_d = index;
    let params = sysreq_params(amx)?;

    let result = native(amx, &params);
    let raised = amx.error.take();
    match result {
        Ok(value) => {
            amx.pri = value;
            match raised {
                None => Ok(()),
                Some(error) => Err(error),
            }
        }
        Err(error) => Err(error),
    }
}

/// The fetch/decode/dispatch loop.
///
/// Returns the value of `pri` at the terminating halt.
#[expect(clippy::too_many_lines, reason = "one arm per opcode")]
fn run(amx: &mut Amx) -> Result<Cell, AmxError> {
    let image = Arc::clone(amx.shared()?);
    let code = &image.code;

    let mut at = code_index(amx.cip, code.len())?;

    loop {
        let opcode = Opcode::from_cell(*code.get(at).ok_or(AmxError::MemAccess)?)?;
        let param = |k: usize| code.get(at + k).copied().ok_or(AmxError::MemAccess);
        // Default fall-through; control flow overrides it.
        let mut next = at + 1 + opcode.operand_cells().unwrap_or(0);

        match opcode {
            // ----- data movement ---------------------------------------------
            Opcode::LoadPri => amx.pri = amx.read_cell(param(1)?)?,
            Opcode::LoadAlt => amx.alt = amx.read_cell(param(1)?)?,
            Opcode::LoadSPri => amx.pri = amx.read_cell(amx.frm.wrapping_add(param(1)?))?,
            Opcode::LoadSAlt => amx.alt = amx.read_cell(amx.frm.wrapping_add(param(1)?))?,
            Opcode::LrefPri => {
                let indirect = amx.read_cell(param(1)?)?;
                amx.pri = amx.read_cell(indirect)?;
            }
            Opcode::LrefAlt => {
                let indirect = amx.read_cell(param(1)?)?;
                amx.alt = amx.read_cell(indirect)?;
            }
            Opcode::LrefSPri => {
                let indirect = amx.read_cell(amx.frm.wrapping_add(param(1)?))?;
                amx.pri = amx.read_cell(indirect)?;
            }
            Opcode::LrefSAlt => {
                let indirect = amx.read_cell(amx.frm.wrapping_add(param(1)?))?;
                amx.alt = amx.read_cell(indirect)?;
            }
            Opcode::LoadI => {
                let offset = amx.chk_mem(amx.pri)?;
                amx.pri = amx.cell_at(offset);
            }
            Opcode::LodbI => {
                let width = param(1)?;
                let offset = chk_block(amx, amx.pri, width_bytes(width)?)?;
                let mut value: Ucell = 0;
                for i in (0..width_bytes(width)?).rev() {
                    value = (value << 8) | Ucell::from(amx.data_byte(offset + i));
                }
                amx.pri = value as Cell;
            }
            Opcode::ConstPri => amx.pri = param(1)?,
            Opcode::ConstAlt => amx.alt = param(1)?,
            Opcode::AddrPri => amx.pri = amx.frm.wrapping_add(param(1)?),
            Opcode::AddrAlt => amx.alt = amx.frm.wrapping_add(param(1)?),
            Opcode::StorPri => amx.write_cell(param(1)?, amx.pri)?,
            Opcode::StorAlt => amx.write_cell(param(1)?, amx.alt)?,
            Opcode::StorSPri => amx.write_cell(amx.frm.wrapping_add(param(1)?), amx.pri)?,
            Opcode::StorSAlt => amx.write_cell(amx.frm.wrapping_add(param(1)?), amx.alt)?,
            Opcode::SrefPri => {
                let indirect = amx.read_cell(param(1)?)?;
                amx.write_cell(indirect, amx.pri)?;
            }
            Opcode::SrefAlt => {
                let indirect = amx.read_cell(param(1)?)?;
                amx.write_cell(indirect, amx.alt)?;
            }
            Opcode::SrefSPri => {
                let indirect = amx.read_cell(amx.frm.wrapping_add(param(1)?))?;
                amx.write_cell(indirect, amx.pri)?;
            }
            Opcode::SrefSAlt => {
                let indirect = amx.read_cell(amx.frm.wrapping_add(param(1)?))?;
                amx.write_cell(indirect, amx.alt)?;
            }
            Opcode::StorI => {
                let offset = amx.chk_mem(amx.alt)?;
                amx.set_cell_at(offset, amx.pri);
            }
            Opcode::StrbI => {
                let width = param(1)?;
                let offset = chk_block(amx, amx.alt, width_bytes(width)?)?;
                let value = amx.pri as Ucell;
                for i in 0..width_bytes(width)? {
                    amx.set_data_byte(offset + i, (value >> (8 * i)) as u8);
                }
            }
            Opcode::Lidx => {
                let addr = amx.alt.wrapping_add(amx.pri.wrapping_mul(CELL_SIZE as Cell));
                let offset = amx.chk_mem(addr)?;
                amx.pri = amx.cell_at(offset);
            }
            Opcode::LidxB => {
                let addr = amx.alt.wrapping_add(amx.pri.wrapping_shl(param(1)? as u32));
                let offset = amx.chk_mem(addr)?;
                amx.pri = amx.cell_at(offset);
            }
            Opcode::Idxaddr => {
                amx.pri = amx.alt.wrapping_add(amx.pri.wrapping_mul(CELL_SIZE as Cell));
            }
            Opcode::IdxaddrB => {
                amx.pri = amx.alt.wrapping_add(amx.pri.wrapping_shl(param(1)? as u32));
            }
            Opcode::AlignPri => {
                let width = param(1)?;
                if (width as usize) < CELL_SIZE {
                    amx.pri ^= CELL_SIZE as Cell - width;
                }
            }
            Opcode::AlignAlt => {
                let width = param(1)?;
                if (width as usize) < CELL_SIZE {
                    amx.alt ^= CELL_SIZE as Cell - width;
                }
            }
            Opcode::Lctrl => {
                let header = &image.header;
                amx.pri = match param(1)? {
                    0 => header.cod as Cell,
                    1 => header.dat as Cell,
                    2 => amx.hea,
                    3 => amx.stp,
                    4 => amx.stk,
                    5 => amx.frm,
                    6 => (next * CELL_SIZE) as Cell,
                    _ => amx.pri,
                };
            }
            Opcode::Sctrl => match param(1)? {
                2 => amx.hea = amx.pri,
                4 => amx.stk = amx.pri,
                5 => amx.frm = amx.pri,
                6 => next = code_index(amx.pri, code.len())?,
                _ => {}
            },
            Opcode::MovePri => amx.pri = amx.alt,
            Opcode::MoveAlt => amx.alt = amx.pri,
            Opcode::Xchg => core::mem::swap(&mut amx.pri, &mut amx.alt),
            Opcode::PushPri => frame_push(amx, amx.pri)?,
            Opcode::PushAlt => frame_push(amx, amx.alt)?,
            Opcode::PushC => frame_push(amx, param(1)?)?,
            Opcode::Push => {
                let value = amx.read_cell(param(1)?)?;
                frame_push(amx, value)?;
            }
            Opcode::PushS => {
                let value = amx.read_cell(amx.frm.wrapping_add(param(1)?))?;
                frame_push(amx, value)?;
            }
            Opcode::PushAdr => frame_push(amx, amx.frm.wrapping_add(param(1)?))?,
            Opcode::PopPri => amx.pri = pop(amx)?,
            Opcode::PopAlt => amx.alt = pop(amx)?,
            Opcode::SwapPri => {
                let top = amx.read_cell(amx.stk)?;
                amx.write_cell(amx.stk, amx.pri)?;
                amx.pri = top;
            }
            Opcode::SwapAlt => {
                let top = amx.read_cell(amx.stk)?;
                amx.write_cell(amx.stk, amx.alt)?;
                amx.alt = top;
            }
            Opcode::Stack => {
                let adjust = param(1)?;
                if adjust.rem_euclid(CELL_SIZE as Cell) != 0 {
                    return Err(AmxError::MemAccess);
                }
                amx.alt = amx.stk;
                let stk = amx.stk.checked_add(adjust).ok_or(AmxError::MemAccess)?;
                if stk < amx.hea + STK_MARGIN {
                    return Err(AmxError::StackErr);
                }
                if stk > amx.stp {
                    return Err(AmxError::StackLow);
                }
                amx.stk = stk;
            }
            Opcode::Heap => {
                let adjust = param(1)?;
                if adjust.rem_euclid(CELL_SIZE as Cell) != 0 {
                    return Err(AmxError::MemAccess);
                }
                amx.alt = amx.hea;
                let hea = amx.hea.checked_add(adjust).ok_or(AmxError::MemAccess)?;
                if hea + STK_MARGIN > amx.stk {
                    return Err(AmxError::StackErr);
                }
                if hea < amx.hlw {
                    return Err(AmxError::HeapLow);
                }
                amx.hea = hea;
            }

            // ----- frames and control flow -----------------------------------
            Opcode::Proc => {
                frame_push(amx, amx.frm)?;
                amx.frm = amx.stk;
            }
            Opcode::Ret => {
                amx.frm = pop(amx)?;
                next = code_index(pop(amx)?, code.len())?;
            }
            Opcode::Retn => {
                amx.frm = pop(amx)?;
                next = code_index(pop(amx)?, code.len())?;
                let arg_bytes = amx.read_cell(amx.stk)?;
                if arg_bytes < 0 || arg_bytes.rem_euclid(CELL_SIZE as Cell) != 0 {
                    return Err(AmxError::MemAccess);
                }
                let stk = amx
                    .stk
                    .checked_add(arg_bytes)
                    .and_then(|s| s.checked_add(CELL_SIZE as Cell))
                    .ok_or(AmxError::MemAccess)?;
                if stk > amx.stp {
                    return Err(AmxError::StackLow);
                }
                amx.stk = stk;
            }
            Opcode::Call => {
                frame_push(amx, ((at + 2) * CELL_SIZE) as Cell)?;
                next = code_index(param(1)?, code.len())?;
            }
            Opcode::CallPri => {
                frame_push(amx, ((at + 1) * CELL_SIZE) as Cell)?;
                next = code_index(amx.pri, code.len())?;
            }
            Opcode::Jump => next = code_index(param(1)?, code.len())?,
            Opcode::JumpPri => next = code_index(amx.pri, code.len())?,
            Opcode::Jzer => {
                if amx.pri == 0 {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jnz => {
                if amx.pri != 0 {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jeq => {
                if amx.pri == amx.alt {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jneq => {
                if amx.pri != amx.alt {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jless => {
                if (amx.pri as Ucell) < (amx.alt as Ucell) {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jleq => {
                if (amx.pri as Ucell) <= (amx.alt as Ucell) {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jgrtr => {
                if (amx.pri as Ucell) > (amx.alt as Ucell) {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jgeq => {
                if (amx.pri as Ucell) >= (amx.alt as Ucell) {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jsless => {
                if amx.pri < amx.alt {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jsleq => {
                if amx.pri <= amx.alt {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jsgrtr => {
                if amx.pri > amx.alt {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Jsgeq => {
                if amx.pri >= amx.alt {
                    next = code_index(param(1)?, code.len())?;
                }
            }
            Opcode::Switch => {
                let table = code_index(param(1)?, code.len())?;
                let records = usize::try_from(*code.get(table + 1).ok_or(AmxError::MemAccess)?)
                    .map_err(|_| AmxError::MemAccess)?;
                let mut target = *code.get(table + 2).ok_or(AmxError::MemAccess)?;
                for record in 0..records {
                    let value = *code.get(table + 3 + 2 * record).ok_or(AmxError::MemAccess)?;
                    if value == amx.pri {
                        target = *code.get(table + 4 + 2 * record).ok_or(AmxError::MemAccess)?;
                        break;
                    }
                }
                next = code_index(target, code.len())?;
            }
            Opcode::Halt => {
                let halt_code = param(1)?;
                amx.cip = (next * CELL_SIZE) as Cell;
                return match halt_code {
                    0 => Ok(amx.pri),
                    c if c == AmxError::Sleep.code() as Cell => Err(AmxError::Sleep),
                    c => Err(AmxError::from_code(c as i32).unwrap_or(AmxError::General)),
                };
            }
            Opcode::Bounds => {
                if (amx.pri as Ucell) > (param(1)? as Ucell) {
                    return Err(AmxError::Bounds);
                }
            }

            // ----- system requests -------------------------------------------
            Opcode::SysreqPri => sysreq(amx, amx.pri, next)?,
            Opcode::SysreqC => sysreq(amx, param(1)?, next)?,
            Opcode::SysreqD => sysreq_direct(amx, param(1)?, next)?,
            Opcode::SysreqN => {
                let index = param(1)?;
                let arg_bytes = param(2)?;
                if arg_bytes < 0 || arg_bytes.rem_euclid(CELL_SIZE as Cell) != 0 {
                    return Err(AmxError::MemAccess);
                }
                frame_push(amx, arg_bytes)?;
                let result = sysreq(amx, index, next);
                let stk = amx
                    .stk
                    .checked_add(arg_bytes)
                    .and_then(|s| s.checked_add(CELL_SIZE as Cell))
                    .filter(|&s| s <= amx.stp)
                    .ok_or(AmxError::StackLow)?;
                amx.stk = stk;
                result?;
            }
            Opcode::SysreqNd => {
                let index = param(1)?;
                let arg_bytes = param(2)?;
                if arg_bytes < 0 || arg_bytes.rem_euclid(CELL_SIZE as Cell) != 0 {
                    return Err(AmxError::MemAccess);
                }
                frame_push(amx, arg_bytes)?;
                let result = sysreq_direct(amx, index, next);
                let stk = amx
                    .stk
                    .checked_add(arg_bytes)
                    .and_then(|s| s.checked_add(CELL_SIZE as Cell))
                    .filter(|&s| s <= amx.stp)
                    .ok_or(AmxError::StackLow)?;
                amx.stk = stk;
                result?;
            }

            // ----- arithmetic and logic --------------------------------------
            Opcode::Shl => amx.pri = (amx.pri as Ucell).wrapping_shl(amx.alt as u32) as Cell,
            Opcode::Shr => amx.pri = (amx.pri as Ucell).wrapping_shr(amx.alt as u32) as Cell,
            Opcode::Sshr => amx.pri = amx.pri.wrapping_shr(amx.alt as u32),
            Opcode::ShlCPri => amx.pri = (amx.pri as Ucell).wrapping_shl(param(1)? as u32) as Cell,
            Opcode::ShlCAlt => amx.alt = (amx.alt as Ucell).wrapping_shl(param(1)? as u32) as Cell,
            Opcode::ShrCPri => amx.pri = (amx.pri as Ucell).wrapping_shr(param(1)? as u32) as Cell,
            Opcode::ShrCAlt => amx.alt = (amx.alt as Ucell).wrapping_shr(param(1)? as u32) as Cell,
            Opcode::Smul => amx.pri = amx.pri.wrapping_mul(amx.alt),
            Opcode::Umul => {
                amx.pri = ((amx.pri as Ucell).wrapping_mul(amx.alt as Ucell)) as Cell;
            }
            Opcode::Sdiv => (amx.pri, amx.alt) = floored_div(amx.pri, amx.alt)?,
            Opcode::SdivAlt => (amx.pri, amx.alt) = floored_div(amx.alt, amx.pri)?,
            Opcode::Udiv => (amx.pri, amx.alt) = unsigned_div(amx.pri, amx.alt)?,
            Opcode::UdivAlt => (amx.pri, amx.alt) = unsigned_div(amx.alt, amx.pri)?,
            Opcode::Add => amx.pri = amx.pri.wrapping_add(amx.alt),
            Opcode::Sub => amx.pri = amx.pri.wrapping_sub(amx.alt),
            Opcode::SubAlt => amx.pri = amx.alt.wrapping_sub(amx.pri),
            Opcode::And => amx.pri &= amx.alt,
            Opcode::Or => amx.pri |= amx.alt,
            Opcode::Xor => amx.pri ^= amx.alt,
            Opcode::Not => amx.pri = Cell::from(amx.pri == 0),
            Opcode::Neg => amx.pri = amx.pri.wrapping_neg(),
            Opcode::Invert => amx.pri = !amx.pri,
            Opcode::AddC => amx.pri = amx.pri.wrapping_add(param(1)?),
            Opcode::SmulC => amx.pri = amx.pri.wrapping_mul(param(1)?),
            Opcode::ZeroPri => amx.pri = 0,
            Opcode::ZeroAlt => amx.alt = 0,
            Opcode::Zero => amx.write_cell(param(1)?, 0)?,
            Opcode::ZeroS => amx.write_cell(amx.frm.wrapping_add(param(1)?), 0)?,
            Opcode::SignPri => amx.pri = Cell::from(amx.pri as u8 as i8),
            Opcode::SignAlt => amx.alt = Cell::from(amx.alt as u8 as i8),
            Opcode::Eq => amx.pri = Cell::from(amx.pri == amx.alt),
            Opcode::Neq => amx.pri = Cell::from(amx.pri != amx.alt),
            Opcode::Less => amx.pri = Cell::from((amx.pri as Ucell) < (amx.alt as Ucell)),
            Opcode::Leq => amx.pri = Cell::from((amx.pri as Ucell) <= (amx.alt as Ucell)),
            Opcode::Grtr => amx.pri = Cell::from((amx.pri as Ucell) > (amx.alt as Ucell)),
            Opcode::Geq => amx.pri = Cell::from((amx.pri as Ucell) >= (amx.alt as Ucell)),
            Opcode::Sless => amx.pri = Cell::from(amx.pri < amx.alt),
            Opcode::Sleq => amx.pri = Cell::from(amx.pri <= amx.alt),
            Opcode::Sgrtr => amx.pri = Cell::from(amx.pri > amx.alt),
            Opcode::Sgeq => amx.pri = Cell::from(amx.pri >= amx.alt),
            Opcode::EqCPri => amx.pri = Cell::from(amx.pri == param(1)?),
            Opcode::EqCAlt => amx.pri = Cell::from(amx.alt == param(1)?),
            Opcode::IncPri => amx.pri = amx.pri.wrapping_add(1),
            Opcode::IncAlt => amx.alt = amx.alt.wrapping_add(1),
            Opcode::Inc => {
                let addr = param(1)?;
                let value = amx.read_cell(addr)?;
                amx.write_cell(addr, value.wrapping_add(1))?;
            }
            Opcode::IncS => {
                let addr = amx.frm.wrapping_add(param(1)?);
                let value = amx.read_cell(addr)?;
                amx.write_cell(addr, value.wrapping_add(1))?;
            }
            Opcode::IncI => {
                let offset = amx.chk_mem(amx.pri)?;
                let value = amx.cell_at(offset);
                amx.set_cell_at(offset, value.wrapping_add(1));
            }
            Opcode::DecPri => amx.pri = amx.pri.wrapping_sub(1),
            Opcode::DecAlt => amx.alt = amx.alt.wrapping_sub(1),
            Opcode::Dec => {
                let addr = param(1)?;
                let value = amx.read_cell(addr)?;
                amx.write_cell(addr, value.wrapping_sub(1))?;
            }
            Opcode::DecS => {
                let addr = amx.frm.wrapping_add(param(1)?);
                let value = amx.read_cell(addr)?;
                amx.write_cell(addr, value.wrapping_sub(1))?;
            }
            Opcode::DecI => {
                let offset = amx.chk_mem(amx.pri)?;
                let value = amx.cell_at(offset);
                amx.set_cell_at(offset, value.wrapping_sub(1));
            }

            // ----- block operations ------------------------------------------
            Opcode::Movs => {
                let len = usize::try_from(param(1)?).map_err(|_| AmxError::MemAccess)?;
                let src = chk_block(amx, amx.pri, len)?;
                let dst = chk_block(amx, amx.alt, len)?;
                amx.copy_data(src, dst, len);
            }
            Opcode::Cmps => {
                let len = usize::try_from(param(1)?).map_err(|_| AmxError::MemAccess)?;
                let lhs = chk_block(amx, amx.pri, len)?;
                let rhs = chk_block(amx, amx.alt, len)?;
                amx.pri = amx.compare_data(lhs, rhs, len);
            }
            Opcode::Fill => {
                let len = usize::try_from(param(1)?).map_err(|_| AmxError::MemAccess)?;
                let offset = chk_block(amx, amx.alt, len)?;
                for i in 0..len / CELL_SIZE {
                    amx.set_cell_at(offset + i * CELL_SIZE, amx.pri);
                }
            }

            // ----- debug hook ------------------------------------------------
            Opcode::Break => {
                if let Some(debug) = amx.debug {
                    amx.cip = (next * CELL_SIZE) as Cell;
                    let result = debug(amx);
                    let raised = amx.error.take();
                    result?;
                    if let Some(error) = raised {
                        return Err(error);
                    }
                }
            }
            Opcode::Nop => {}

            // ----- macro-fused forms -----------------------------------------
            Opcode::Push2C | Opcode::Push3C | Opcode::Push4C | Opcode::Push5C => {
                for k in 0..push_count(opcode) {
                    frame_push(amx, param(1 + k)?)?;
                }
            }
            Opcode::Push2 | Opcode::Push3 | Opcode::Push4 | Opcode::Push5 => {
                for k in 0..push_count(opcode) {
                    let value = amx.read_cell(param(1 + k)?)?;
                    frame_push(amx, value)?;
                }
            }
            Opcode::Push2S | Opcode::Push3S | Opcode::Push4S | Opcode::Push5S => {
                for k in 0..push_count(opcode) {
                    let value = amx.read_cell(amx.frm.wrapping_add(param(1 + k)?))?;
                    frame_push(amx, value)?;
                }
            }
            Opcode::Push2Adr | Opcode::Push3Adr | Opcode::Push4Adr | Opcode::Push5Adr => {
                for k in 0..push_count(opcode) {
                    frame_push(amx, amx.frm.wrapping_add(param(1 + k)?))?;
                }
            }
            Opcode::LoadBoth => {
                amx.pri = amx.read_cell(param(1)?)?;
                amx.alt = amx.read_cell(param(2)?)?;
            }
            Opcode::LoadSBoth => {
                amx.pri = amx.read_cell(amx.frm.wrapping_add(param(1)?))?;
                amx.alt = amx.read_cell(amx.frm.wrapping_add(param(2)?))?;
            }
            Opcode::Const => amx.write_cell(param(1)?, param(2)?)?,
            Opcode::ConstS => amx.write_cell(amx.frm.wrapping_add(param(1)?), param(2)?)?,

            // Executing into a case table or an opcode the browse pass
            // rejects means the flow left verified ground.
            Opcode::None
            | Opcode::Casetbl
            | Opcode::PushR
            | Opcode::Jrel
            | Opcode::File
            | Opcode::Line
            | Opcode::Symbol
            | Opcode::Srange
            | Opcode::Symtag => return Err(AmxError::InvInstr),
        }

        at = next;
    }
}

/// Byte width operand of the partial-cell access opcodes.
fn width_bytes(width: Cell) -> Result<usize, AmxError> {
    match width {
        1 | 2 => Ok(width as usize),
        4 if CELL_SIZE >= 4 => Ok(4),
        8 if CELL_SIZE >= 8 => Ok(8),
        _ => Err(AmxError::InvInstr),
    }
}

/// Number of cells pushed by a multi-push macro form.
fn push_count(opcode: Opcode) -> usize {
    match opcode {
        Opcode::Push2C | Opcode::Push2 | Opcode::Push2S | Opcode::Push2Adr => 2,
        Opcode::Push3C | Opcode::Push3 | Opcode::Push3S | Opcode::Push3Adr => 3,
        Opcode::Push4C | Opcode::Push4 | Opcode::Push4S | Opcode::Push4Adr => 4,
        _ => 5,
    }
}
