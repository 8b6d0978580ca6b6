// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Cooperative sleep and resume.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::assert_balanced;
use crate::bytecode::Opcode;
use crate::machine::Amx;
use crate::testimg::ImageBuilder;
use pawn_abi::{AmxError, Cell, EXEC_CONT, EXEC_MAIN};

/// `sleep <value>` as the toolchain emits it: save the accumulators on
/// the stack, halt with the sleep code, restore after re-entry.
fn emit_sleep(img: &mut ImageBuilder, value: Cell) {
    img.emit(Opcode::PushPri, &[]);
    img.emit(Opcode::PushAlt, &[]);
    img.emit(Opcode::ConstPri, &[value]);
    img.emit(Opcode::Halt, &[AmxError::Sleep.code() as Cell]);
    img.emit(Opcode::PopAlt, &[]);
    img.emit(Opcode::PopPri, &[]);
}

fn sleeper() -> Amx {
    let mut img = ImageBuilder::new();
    img.main_here();
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::ConstPri, &[7]);
    emit_sleep(&mut img, 99);
    img.emit(Opcode::Retn, &[]);
    Amx::load(&img.build()).unwrap()
}

#[test]
fn sleep_suspends_with_value_and_resume_restores() {
    let mut amx = sleeper();

    // First run suspends; the sleep value is the result.
    assert_eq!(amx.exec(EXEC_MAIN), Err(AmxError::Sleep));
    assert_eq!(amx.error(), Some(AmxError::Sleep));
    assert_eq!(amx.pri(), 99);

    // Resuming finishes the function with the preserved accumulator.
    assert_eq!(amx.exec(EXEC_CONT).unwrap(), 7);
    assert!(amx.error().is_none());
    assert_balanced(&amx);
}

#[test]
fn sleep_preserves_the_stack_verbatim() {
    let mut amx = sleeper();
    let stk_before = amx.stk;
    assert_eq!(amx.exec(EXEC_MAIN), Err(AmxError::Sleep));
    // The suspended frame still holds the saved accumulators.
    assert!(amx.stk < stk_before);
}

#[test]
fn resume_without_sleep_is_invalid_state() {
    let mut amx = sleeper();
    assert_eq!(amx.exec(EXEC_CONT), Err(AmxError::InvState));
}

#[test]
fn fresh_exec_after_sleep_abandons_the_suspended_call() {
    let mut amx = sleeper();
    assert_eq!(amx.exec(EXEC_MAIN), Err(AmxError::Sleep));

    // Starting over runs the whole function again from the top.
    assert_eq!(amx.exec(EXEC_MAIN), Err(AmxError::Sleep));
    assert_eq!(amx.exec(EXEC_CONT).unwrap(), 7);
}

#[test]
fn native_returning_sleep_suspends_and_resumes() {
    fn dozer(_amx: &mut Amx, _params: &[Cell]) -> Result<Cell, AmxError> {
        Err(AmxError::Sleep)
    }

    let mut img = ImageBuilder::new();
    img.native("dozer");
    img.main_here();
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::SysreqN, &[0, 0]);
    img.emit(Opcode::ConstPri, &[55]);
    img.emit(Opcode::Retn, &[]);
    let mut amx = Amx::load(&img.build()).unwrap();
    amx.register(&[crate::natives::NativeEntry {
        name: "dozer",
        func: dozer,
    }])
    .unwrap();

    assert_eq!(amx.exec(EXEC_MAIN), Err(AmxError::Sleep));
    assert_eq!(amx.exec(EXEC_CONT).unwrap(), 55);
    assert_balanced(&amx);
}
