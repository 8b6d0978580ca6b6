// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Native function registry.
//!
//! A module imports natives by name; the host binds each name to a
//! function before execution. Bindings live on the instance, parallel to
//! the module's native table, so clones inherit them without sharing
//! mutable state.
//!
//! Calling convention, matching the script side: `params[0]` is the
//! argument byte count, `params[1..]` are the argument cells (values or
//! data-relative addresses). The return cell lands in `pri`.


use alloc::sync::Arc;

use pawn_abi::cell::CELL_SIZE;
use pawn_abi::{AmxError, AmxFlags, Cell};

use crate::bytecode::Opcode;
use crate::machine::Amx;

/// A native function implemented by the host.
pub type AmxNative = fn(amx: &mut Amx, params: &[Cell]) -> Result<Cell, AmxError>;

/// System-request callback: receives the native index and the parameter
/// cells, returns the result cell.
pub type AmxCallback = fn(amx: &mut Amx, index: Cell, params: &[Cell]) -> Result<Cell, AmxError>;

/// Per-statement debug hook; a returned error aborts execution.
pub type AmxDebug = fn(amx: &mut Amx) -> Result<(), AmxError>;

/// A name-to-function binding supplied by the host.
#[derive(Clone, Copy)]
pub struct NativeEntry {
    /// Imported name, compared case-sensitively.
    pub name: &'static str,
    /// The implementation.
    pub func: AmxNative,
}

/// Number of parameter cells for a given argument byte count: the count
/// cell itself plus one cell per argument.
pub(crate) fn param_cells(arg_bytes: Cell) -> usize {
    1 + (arg_bytes as usize) / CELL_SIZE
}

/// The default system-request callback: dispatch through the registry.
///
/// # Errors
///
/// [`AmxError::NotFound`] when the indexed native is unbound, plus
/// whatever the native itself returns.
pub fn default_callback(amx: &mut Amx, index: Cell, params: &[Cell]) -> Result<Cell, AmxError> {
    let func = usize::try_from(index)
        .ok()
        .and_then(|i| amx.natives.get(i).copied())
        .flatten()
        .ok_or(AmxError::NotFound)?;
    func(amx, params)
}

impl Amx {
    /// Bind host natives to the module's imported names.
    ///
    /// Registration is additive: names the module does not import are
    /// ignored, and already-bound slots keep their binding. When every
    /// import is bound this sets [`AmxFlags::NTVREG`] and, if the module
    /// permits, rewrites system-request call sites to the direct form.
    ///
    /// # Errors
    ///
    /// [`AmxError::NotFound`] when unbound imports remain after this
    /// call; the host may register more and call again.
    pub fn register(&mut self, natives: &[NativeEntry]) -> Result<(), AmxError> {
        self.shared()?;
        let count = self.num_natives();
        if self.natives.len() < count {
            self.natives.resize(count, None);
        }

        let mut missing = false;
        for index in 0..count {
            if self.natives[index].is_some() {
                continue;
            }
            let name = self.get_native(index)?;
            match natives.iter().find(|entry| entry.name == name) {
                Some(entry) => self.natives[index] = Some(entry.func),
                None => missing = true,
            }
        }

        if missing {
            return Err(AmxError::NotFound);
        }
        self.flags.insert(AmxFlags::NTVREG);
        self.rewrite_sysreq();
        Ok(())
    }

    /// The bound function for a native index, if any.
    pub(crate) fn native_fn(&self, index: usize) -> Option<AmxNative> {
        self.natives.get(index).copied().flatten()
    }

    /// Rewrite indexed system requests to the direct forms.
    ///
    /// Only possible while this instance owns the code exclusively;
    /// after a clone the image is immutable and the indexed path stays.
    fn rewrite_sysreq(&mut self) {
        if self.flags.contains(AmxFlags::NO_SYSREQD) {
            return;
        }
        let Some(image) = self.image.as_mut().and_then(Arc::get_mut) else {
            return;
        };

        let code = &mut image.code;
        let mut at = 0;
        while at < code.len() {
            let Ok(opcode) = Opcode::from_cell(code[at]) else {
                return; // verified at load; never reached
            };
            match opcode {
                Opcode::SysreqC => code[at] = Opcode::SysreqD as u32 as Cell,
                Opcode::SysreqN => code[at] = Opcode::SysreqNd as u32 as Cell,
                _ => {}
            }
            let operands = match opcode.operand_cells() {
                Some(n) => n,
                // Case table: record count, default target, value/target pairs.
                None => 2 + 2 * code.get(at + 1).copied().unwrap_or(0) as usize,
            };
            at += 1 + operands;
        }
    }
}
