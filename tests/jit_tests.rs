use std::ffi::c_int;

use anyhow::Result;
use rtjit::compiler::UnitOrigin;
use rtjit::dsp::{PARAMS_SYMBOL, ParamBlock};
use rtjit::{ErrorKind, JitError, JitSession, LinkFailure};

mod support;
use support::require_toolchain;

type BinaryFn = unsafe extern "C" fn(c_int, c_int) -> c_int;
type UnaryFn = unsafe extern "C" fn(c_int) -> c_int;

#[test]
fn extern_c_and_mangled_functions_are_callable() -> Result<()> {
    require_toolchain!();
    let mut session = JitSession::new(support::options())?;
    let origins = session.add_modules(&[support::fixture("add.cc"), support::fixture("mul.cc")])?;
    assert_eq!(origins, [UnitOrigin::Compiled, UnitOrigin::Compiled]);

    let add: BinaryFn = unsafe { session.lookup_fn("add")? };
    let mul: BinaryFn = unsafe { session.lookup_fn("mul")? };
    assert_eq!(unsafe { add(2, 3) }, 5);
    assert_eq!(unsafe { mul(-4, 6) }, -24);

    assert!(session.symbols().entries().iter().any(|entry| entry.demangled == "mul(int, int)"));
    assert!(session.lookup_function("not_defined_anywhere").is_none());
    Ok(())
}

#[test]
fn single_unit_add() -> Result<()> {
    require_toolchain!();
    let mut session = JitSession::new(support::options())?;
    session.add_module(support::fixture("add.cc"))?;

    let add: BinaryFn = unsafe { session.lookup_fn("add")? };
    assert_eq!(unsafe { add(100, 200) }, 300);
    Ok(())
}

#[test]
fn sum_of_squares_uses_square_from_earlier_unit() -> Result<()> {
    require_toolchain!();
    let mut session = JitSession::new(support::options())?;
    session.add_modules(&[
        support::fixture("square.cc"),
        support::fixture("sum_of_squares.cc"),
    ])?;

    let square: UnaryFn = unsafe { session.lookup_fn("square")? };
    let sum_of_squares: BinaryFn = unsafe { session.lookup_fn("sumOfSquares")? };
    assert_eq!(unsafe { square(7) }, 49);
    assert_eq!(unsafe { sum_of_squares(3, 4) }, 25);
    Ok(())
}

#[test]
fn contexts_do_not_share_inline_statics() -> Result<()> {
    require_toolchain!();
    type BumpFn = unsafe extern "C" fn() -> c_int;

    let mut first = JitSession::new(support::options())?;
    first.add_module(support::fixture("counter.cc"))?;
    let bump_first: BumpFn = unsafe { first.lookup_fn("bump")? };
    assert_eq!(unsafe { bump_first() }, 1);
    assert_eq!(unsafe { bump_first() }, 2);

    let mut second = JitSession::new(support::options())?;
    second.add_module(support::fixture("counter.cc"))?;
    let bump_second: BumpFn = unsafe { second.lookup_fn("bump")? };
    assert_eq!(unsafe { bump_second() }, 1);
    assert_eq!(unsafe { bump_first() }, 3);
    Ok(())
}

#[test]
fn later_units_call_into_earlier_ones() -> Result<()> {
    require_toolchain!();
    let mut session = JitSession::new(support::options())?;
    session.add_module(support::fixture("helper.cc"))?;
    session.add_module(support::fixture("uses_helper.cc"))?;

    let twice_plus_one: UnaryFn = unsafe { session.lookup_fn("twice_plus_one")? };
    assert_eq!(unsafe { twice_plus_one(20) }, 41);
    assert_eq!(session.context().unit_count(), 2);
    Ok(())
}

#[test]
fn syntax_errors_carry_diagnostics_and_leave_context_alone() -> Result<()> {
    require_toolchain!();
    let mut session = JitSession::new(support::options())?;
    session.add_module(support::fixture("add.cc"))?;

    let err = session
        .add_module(support::fixture("syntax_error.cc"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CompilationFailed);
    match &err {
        JitError::Frontend { path, diagnostics } => {
            assert!(path.ends_with("syntax_error.cc"));
            assert!(diagnostics.contains("error"), "diagnostics: {diagnostics}");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(session.context().unit_count(), 1);
    assert!(session.lookup_function("add").is_some());
    Ok(())
}

#[test]
fn duplicate_definitions_are_rejected() -> Result<()> {
    require_toolchain!();
    let mut session = JitSession::new(support::options())?;
    session.add_module(support::fixture("dup_a.cc"))?;

    let err = session.add_module(support::fixture("dup_b.cc")).unwrap_err();
    match err {
        JitError::Link {
            failure: LinkFailure::DuplicateSymbol { symbol, previous },
            ..
        } => {
            assert_eq!(symbol, "square(int)");
            assert!(previous.ends_with("dup_a.cc"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.context().unit_count(), 1);
    Ok(())
}

#[test]
fn unresolved_references_fail_at_load() -> Result<()> {
    require_toolchain!();
    let mut session = JitSession::new(support::options())?;
    let err = session
        .add_module(support::fixture("unresolved.cc"))
        .unwrap_err();
    assert!(
        matches!(
            err,
            JitError::Link {
                failure: LinkFailure::Unresolved { .. },
                ..
            }
        ),
        "unexpected error: {err}"
    );
    assert_eq!(session.context().unit_count(), 0);
    Ok(())
}

#[test]
fn overloads_need_a_full_signature() -> Result<()> {
    require_toolchain!();
    let mut session = JitSession::new(support::options())?;
    session.add_module(support::fixture("overloads.cc"))?;

    let err = session.find_symbol("scale").unwrap_err();
    assert!(matches!(err, JitError::AmbiguousSymbol(_)), "unexpected error: {err}");

    let scale: unsafe extern "C" fn(f32) -> f32 = unsafe { session.lookup_fn("scale(float)")? };
    assert_eq!(unsafe { scale(1.5) }, 3.0);
    Ok(())
}

#[test]
fn injected_symbols_are_visible_to_compiled_code() -> Result<()> {
    require_toolchain!();
    let params = ParamBlock::new();
    params.set(0, 0.5);
    params.set(3, -2.0);

    let mut session = JitSession::new(support::options())?;
    session.define_symbol(PARAMS_SYMBOL, params.as_ptr())?;
    session.add_module(support::fixture("read_param.cc"))?;

    let read_param: unsafe extern "C" fn(c_int) -> f32 = unsafe { session.lookup_fn("read_param")? };
    assert_eq!(unsafe { read_param(0) }, 0.5);
    assert_eq!(unsafe { read_param(3) }, -2.0);

    params.set(0, 0.75);
    assert_eq!(unsafe { read_param(0) }, 0.75);
    Ok(())
}

#[test]
fn definitions_may_not_shadow_injected_symbols() -> Result<()> {
    require_toolchain!();
    let dir = support::temp_dir("rtjit-shadow");
    let source = dir.path().join("shadow.cc");
    std::fs::write(&source, "float g_params[16];\nextern \"C\" int touch() { return 1; }\n")?;

    let params = ParamBlock::new();
    let mut session = JitSession::new(support::options())?;
    session.define_symbol(PARAMS_SYMBOL, params.as_ptr())?;

    let err = session.add_module(&source).unwrap_err();
    assert!(
        matches!(
            err,
            JitError::Link {
                failure: LinkFailure::DuplicateSymbol { .. },
                ..
            }
        ),
        "unexpected error: {err}"
    );
    Ok(())
}
