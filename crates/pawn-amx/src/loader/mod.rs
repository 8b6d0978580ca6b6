// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Module loading: validation, expansion, browse, and clone.
//!
//! Loading proceeds in strict order so that a failure leaves no partial
//! state observable:
//!
//! 1. decode and validate the header (magic, version window, section
//!    ordering, table offsets, record size)
//! 2. expand compact-encoded code+data into plain cells
//! 3. browse the code once: verify every opcode and operand count, mark
//!    instruction starts, then check that every branch lands on one
//! 4. split the image: the shared read-only half (header, tables, code,
//!    pristine data) and a private data+heap+stack region
//! 5. set the initial registers and capture the reset marks
//!
//! Address operands stay module-relative throughout; the successful
//! browse is what sets the `RELOC` flag. Host pointers are never written
//! into code, so the image can be shared by clones as-is.


use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use pawn_abi::cell::{CELL_SIZE, cell_from_le};
use pawn_abi::{AmxError, AmxFlags, AmxHeader, Cell};

use crate::bytecode::{Opcode, expand};
use crate::machine::{Amx, SharedImage};
use crate::natives::default_callback;

impl Amx {
    /// Load and verify a module, binding it to this instance.
    ///
    /// The buffer holds the module as produced by the toolchain; the
    /// instance copies what it keeps, so the buffer can be dropped
    /// afterwards.
    ///
    /// # Errors
    ///
    /// - [`AmxError::Init`] when the instance is already initialized
    /// - [`AmxError::Memory`] when the buffer is too small
    /// - [`AmxError::Format`] on malformed headers or code
    /// - [`AmxError::Version`] outside the supported version window
    /// - [`AmxError::InvInstr`] when browse finds an unknown opcode
    pub fn init(&mut self, program: &[u8]) -> Result<(), AmxError> {
        if self.is_initialized() {
            return Err(AmxError::Init);
        }

        let header = AmxHeader::parse(program)?;
        let mut flags = AmxFlags::from_bits_truncate(header.flags);

        let cod = header.cod as usize;
        let dat = header.dat as usize;
        let hea = header.hea as usize;
        let size = header.size as usize;

        // Code and initial data, as plain little-endian cell images.
        let (code_bytes, init_data) = if flags.contains(AmxFlags::COMPACT) {
            let expanded = expand(&program[cod..size], hea - cod)?;
            flags.remove(AmxFlags::COMPACT);
            let (code, data) = expanded.split_at(dat - cod);
            (code.to_vec(), data.to_vec())
        } else {
            let data_end = size.min(hea);
            (
                program[cod..dat].to_vec(),
                program[dat..data_end].to_vec(),
            )
        };

        let code: Vec<Cell> = code_bytes.chunks_exact(CELL_SIZE).map(cell_from_le).collect();
        verify_code(&code)?;
        flags.insert(AmxFlags::RELOC);

        // Private data+heap+stack region, seeded from the initial data.
        // The topmost cell is reserved, so the region can never be empty.
        let data_size = (header.stp - header.dat) as usize;
        if data_size < CELL_SIZE {
            return Err(AmxError::Format);
        }
        let mut data = vec![0u8; data_size];
        data[..init_data.len()].copy_from_slice(&init_data);

        self.image = Some(Arc::new(SharedImage {
            header,
            prefix: program[..cod].to_vec(),
            code,
            init_data,
        }));
        self.data = data;
        self.natives = vec![None; header.num_natives()];
        self.callback = Some(default_callback);
        self.flags = flags;
        self.reset_registers();
        Ok(())
    }

    /// Load a module into a fresh instance.
    ///
    /// # Errors
    ///
    /// See [`Amx::init`].
    pub fn load(program: &[u8]) -> Result<Self, AmxError> {
        let mut amx = Self::new();
        amx.init(program)?;
        Ok(amx)
    }

    /// Create a second instance sharing this module's code.
    ///
    /// The clone owns a private data region seeded from the pristine
    /// initial data and inherits native bindings and the callback, but
    /// neither the debug hook nor user data. The two instances never
    /// observe each other's variables.
    ///
    /// # Errors
    ///
    /// [`AmxError::Init`] when no module is loaded,
    /// [`AmxError::InvState`] while the source is busy executing.
    pub fn clone_instance(&self) -> Result<Self, AmxError> {
        if self.flags.contains(AmxFlags::BROWSE) {
            return Err(AmxError::InvState);
        }
        let image = self.shared()?;

        let header = &image.header;
        let mut data = vec![0u8; (header.stp - header.dat) as usize];
        data[..image.init_data.len()].copy_from_slice(&image.init_data);

        let mut clone = Self::new();
        clone.image = Some(Arc::clone(image));
        clone.data = data;
        clone.natives = self.natives.clone();
        clone.callback = self.callback;
        clone.flags = self.flags;
        clone.reset_registers();
        Ok(clone)
    }

    /// Set the registers to the state of a freshly loaded module.
    fn reset_registers(&mut self) {
        // The header was validated, so the image is present here.
        let Some(image) = self.image.as_deref() else {
            return;
        };
        let header = &image.header;

        self.hlw = (header.hea - header.dat) as Cell;
        self.hea = self.hlw;
        // The topmost slot is reserved.
        self.stp = ((header.stp - header.dat) as usize - CELL_SIZE) as Cell;
        self.stk = self.stp;
        self.frm = self.stp;
        self.cip = if header.cip < 0 { 0 } else { header.cip as Cell };
        self.pri = 0;
        self.alt = 0;
        self.reset_stk = self.stk;
        self.reset_hea = self.hea;
        self.paramcount = 0;
        self.sysreq_d = 0;
        self.error = None;
    }
}

/// A branch operand to check once all instruction starts are known.
struct BranchCheck {
    /// Code-relative byte target.
    target: Cell,
    /// The target must be a case table rather than a plain instruction.
    wants_casetbl: bool,
}

/// Walk the code once, verifying opcodes and operand counts, then check
/// every branch target against the collected instruction starts.
fn verify_code(code: &[Cell]) -> Result<(), AmxError> {
    let mut starts = vec![false; code.len()];
    let mut casetbls = vec![false; code.len()];
    let mut branches: Vec<BranchCheck> = Vec::new();

    let mut at = 0;
    while at < code.len() {
        let opcode = Opcode::from_cell(code[at])?;
        if opcode == Opcode::None || opcode.is_obsolete() {
            return Err(AmxError::InvInstr);
        }
        // The direct forms only exist after call-site rewriting; a
        // module file never contains them.
        if opcode == Opcode::SysreqD || opcode == Opcode::SysreqNd {
            return Err(AmxError::InvInstr);
        }
        starts[at] = true;

        let operands = match opcode.operand_cells() {
            Some(n) => n,
            None => {
                // Case table: record count, default target, records.
                casetbls[at] = true;
                let records = *code.get(at + 1).ok_or(AmxError::Format)?;
                let records = usize::try_from(records).map_err(|_| AmxError::Format)?;
                let default = *code.get(at + 2).ok_or(AmxError::Format)?;
                branches.push(BranchCheck {
                    target: default,
                    wants_casetbl: false,
                });
                for record in 0..records {
                    let target =
                        *code.get(at + 4 + 2 * record).ok_or(AmxError::Format)?;
                    branches.push(BranchCheck {
                        target,
                        wants_casetbl: false,
                    });
                }
                2 + 2 * records
            }
        };
        if at + 1 + operands > code.len() {
            return Err(AmxError::Format);
        }

        if opcode.is_branch() || opcode == Opcode::Switch {
            branches.push(BranchCheck {
                target: code[at + 1],
                wants_casetbl: opcode == Opcode::Switch,
            });
        }

        at += 1 + operands;
    }

    for check in &branches {
        let target = usize::try_from(check.target).map_err(|_| AmxError::Format)?;
        if target.rem_euclid(CELL_SIZE) != 0 {
            return Err(AmxError::Format);
        }
        let index = target / CELL_SIZE;
        let valid = if check.wants_casetbl {
            casetbls.get(index).copied().unwrap_or(false)
        } else {
            starts.get(index).copied().unwrap_or(false)
        };
        if !valid {
            return Err(AmxError::Format);
        }
    }

    Ok(())
}
