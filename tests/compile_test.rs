use p_lang::lang::ErrorCode;
use p_lang::mach::{Compiler, OpCode};

fn diagnose(source: &str) -> (usize, Vec<ErrorCode>) {
    let mut comp = Compiler::new("test", false);
    let nerrors = comp.compile(source);
    let codes = comp.errors().iter().map(|e| e.code()).collect();
    (nerrors, codes)
}

#[test]
fn test_a_clean_program_has_no_diagnostics() {
    let (nerrors, codes) = diagnose("program t; var x: integer; begin x := 1 end.");
    assert_eq!(nerrors, 0, "{:?}", codes);
}

#[test]
fn test_undefined_identifier() {
    let (nerrors, codes) = diagnose("program t; begin x := 1 end.");
    assert!(nerrors >= 1);
    assert!(codes.contains(&ErrorCode::Undefined));
}

#[test]
fn test_redefined_at_the_same_level() {
    let (_, codes) = diagnose("program t; var x, x: integer; begin end.");
    assert!(codes.contains(&ErrorCode::Redefined));

    let (_, codes) = diagnose("program t; const c = 1; var c: integer; begin end.");
    assert!(codes.contains(&ErrorCode::Redefined));
}

#[test]
fn test_shadowing_across_levels_is_fine() {
    let (nerrors, codes) = diagnose(
        "program t;
         var x: integer;
         procedure p;
         var x: integer;
         begin x := 1 end;
         begin x := 2 end.",
    );
    assert_eq!(nerrors, 0, "{:?}", codes);
}

#[test]
fn test_assigning_to_a_constant() {
    let (_, codes) = diagnose("program t; const c = 1; begin c := 2 end.");
    assert!(codes.contains(&ErrorCode::KindMismatch));
}

#[test]
fn test_incompatible_assignment() {
    let (_, codes) = diagnose("program t; var b: boolean; begin b := 1 end.");
    assert!(codes.contains(&ErrorCode::TypeMismatch));
}

#[test]
fn test_lossy_real_assignment_still_compiles() {
    let mut comp = Compiler::new("test", false);
    let nerrors = comp.compile("program t; var n: integer; begin n := 2.5 end.");
    assert_eq!(nerrors, 1);
    assert_eq!(comp.errors()[0].code(), ErrorCode::LossyConversion);
    // the rounding was still emitted
    assert!(comp.code().iter().any(|i| i.op == OpCode::Round));
}

#[test]
fn test_wrong_number_of_parameters() {
    let (_, codes) = diagnose(
        "program t;
         procedure p(a: integer);
         begin end;
         begin p(1, 2) end.",
    );
    assert!(codes.contains(&ErrorCode::ArityMismatch));

    let (_, codes) = diagnose(
        "program t;
         procedure p(a: integer);
         begin end;
         begin p end.",
    );
    assert!(codes.contains(&ErrorCode::ArityMismatch));
}

#[test]
fn test_inverted_subrange() {
    let (_, codes) = diagnose("program t; var x: 5..1; begin end.");
    assert!(codes.contains(&ErrorCode::RangeInverted));
}

#[test]
fn test_non_ordinal_array_index() {
    let (_, codes) = diagnose("program t; var a: array [real] of integer; begin end.");
    assert!(codes.contains(&ErrorCode::NotOrdinal));
}

#[test]
fn test_calling_a_plain_variable() {
    let (_, codes) = diagnose("program t; var x: integer; begin x(1) end.");
    // an argument list after a variable is not a call
    assert!(!codes.is_empty());
}

#[test]
fn test_missing_semicolon_reports_expected_got() {
    let mut comp = Compiler::new("test", false);
    let nerrors = comp.compile("program t begin end.");
    assert!(nerrors >= 1);
    assert_eq!(comp.errors()[0].code(), ErrorCode::SyntaxError);
    let text = comp.errors()[0].to_string();
    assert!(text.contains("expected ;"), "{}", text);
    assert!(text.contains("near line 1"), "{}", text);
}

#[test]
fn test_errors_carry_line_numbers() {
    let mut comp = Compiler::new("test", false);
    comp.compile("program t;\nvar b: boolean;\nbegin\n    b := 3 end.");
    assert_eq!(comp.errors().len(), 1);
    assert_eq!(comp.errors()[0].line_number(), Some(4));
}

#[test]
fn test_indexing_a_scalar() {
    let (_, codes) = diagnose("program t; var x: integer; begin x[1] := 0 end.");
    assert!(codes.contains(&ErrorCode::TypeMismatch));
}

#[test]
fn test_unknown_record_field() {
    let (_, codes) = diagnose(
        "program t;
         type point = record x, y: integer end;
         var p: point;
         begin p.z := 1 end.",
    );
    assert!(codes.contains(&ErrorCode::Undefined));
}

#[test]
fn test_dereferencing_a_non_pointer() {
    let (_, codes) = diagnose("program t; var x: integer; begin x^ := 1 end.");
    assert!(codes.contains(&ErrorCode::TypeMismatch));
}

#[test]
fn test_error_count_is_the_return_value() {
    let mut comp = Compiler::new("test", false);
    let nerrors = comp.compile("program t; begin a := 1; b := 2; c := 3 end.");
    assert_eq!(nerrors, 3);
    assert_eq!(comp.errors().len(), 3);
}
