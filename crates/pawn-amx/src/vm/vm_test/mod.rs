// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the interpreter.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod memory_test;
mod sleep_test;

use pawn_abi::cell::CELL_SIZE;
use pawn_abi::{AmxError, Cell, EXEC_MAIN};

use crate::bytecode::Opcode;
use crate::machine::Amx;
use crate::testimg::ImageBuilder;

/// Build a module whose `main` wraps the given body in `proc`/`retn`,
/// load it, and return the instance.
pub fn load_main(body: impl FnOnce(&mut ImageBuilder)) -> Amx {
    let mut img = ImageBuilder::new();
    img.main_here();
    img.emit(Opcode::Proc, &[]);
    body(&mut img);
    img.emit(Opcode::Retn, &[]);
    Amx::load(&img.build()).expect("module should load")
}

/// Load and immediately run `main`.
pub fn run_main(body: impl FnOnce(&mut ImageBuilder)) -> (Amx, Result<Cell, AmxError>) {
    let mut amx = load_main(body);
    let result = amx.exec(EXEC_MAIN);
    (amx, result)
}

/// Assert the stack and heap returned to their entry marks.
pub fn assert_balanced(amx: &Amx) {
    assert_eq!(amx.stk, amx.reset_stk, "stack not balanced");
    assert_eq!(amx.hea, amx.reset_hea, "heap not balanced");
}

#[test]
fn exec_main_without_entry_point_is_index_error() {
    let img = ImageBuilder::new();
    let mut amx = Amx::load(&img.build()).unwrap();
    assert_eq!(amx.exec(EXEC_MAIN), Err(AmxError::Index));
    // The failed lookup leaves no sticky error state behind.
    amx.cleanup().unwrap();
    assert!(!amx.is_initialized());
}

#[test]
fn exec_unknown_public_is_index_error() {
    let mut amx = load_main(|_| {});
    assert_eq!(amx.exec(3), Err(AmxError::Index));
}

#[test]
fn exec_public_by_index() {
    let mut img = ImageBuilder::new();
    img.public_here("answer");
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::ConstPri, &[42]);
    img.emit(Opcode::Retn, &[]);
    let mut amx = Amx::load(&img.build()).unwrap();

    let index = amx.find_public("answer").unwrap();
    assert_eq!(amx.exec(index as i32).unwrap(), 42);
}

#[test]
fn exec_public_receives_host_arguments() {
    let mut img = ImageBuilder::new();
    img.public_here("add2");
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::LoadSPri, &[3 * CELL_SIZE as Cell]);
    img.emit(Opcode::LoadSAlt, &[4 * CELL_SIZE as Cell]);
    img.emit(Opcode::Add, &[]);
    img.emit(Opcode::Retn, &[]);
    let mut amx = Amx::load(&img.build()).unwrap();

    // Arguments go on in reverse: the first argument is pushed last.
    amx.push(32).unwrap();
    amx.push(10).unwrap();
    assert_eq!(amx.exec(0).unwrap(), 42);
    assert_balanced(&amx);
}

#[test]
fn exec_returns_value_of_pri() {
    let (amx, result) = run_main(|img| {
        img.emit(Opcode::ConstPri, &[77]);
    });
    assert_eq!(result.unwrap(), 77);
    assert_eq!(amx.pri(), 77);
    assert_balanced(&amx);
}

#[test]
fn halt_with_exit_code_surfaces_as_error() {
    let (amx, result) = run_main(|img| {
        img.emit(Opcode::Halt, &[AmxError::Exit.code() as Cell]);
    });
    assert_eq!(result, Err(AmxError::Exit));
    assert_eq!(amx.error(), Some(AmxError::Exit));
    assert_balanced(&amx);
}

#[test]
fn clone_executes_identically() {
    let mut original = load_main(|img| {
        img.emit(Opcode::ConstPri, &[1000]);
        img.emit(Opcode::AddC, &[-7]);
    });
    let mut clone = original.clone_instance().unwrap();

    assert_eq!(original.exec(EXEC_MAIN).unwrap(), 993);
    assert_eq!(clone.exec(EXEC_MAIN).unwrap(), 993);
}
