mod common;
use common::*;
use p_lang::mach::{Datum, Outcome};

#[test]
fn test_procedure_call_with_parameters() {
    let (outcome, m) = exec(
        "program t;
         var g: integer;
         procedure bump(by: integer);
         begin
             g := g + by
         end;
         begin
             g := 10;
             bump(5);
             bump(1)
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(16));
}

#[test]
fn test_function_result() {
    let (outcome, m) = exec(
        "program t;
         var n: integer;
         function add(a, b: integer): integer;
         begin
             add := a + b
         end;
         begin
             n := add(2, 3) * add(1, 1)
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(10));
}

#[test]
fn test_function_without_assignment_returns_zero() {
    let (outcome, m) = exec(
        "program t;
         var n: integer;
         function nothing(x: integer): integer;
         begin
         end;
         begin
             n := nothing(9) + 1
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(1));
}

#[test]
fn test_recursive_fibonacci() {
    let (outcome, m) = exec(
        "program t;
         var r: integer;
         function fib(n: integer): integer;
         begin
             if n < 2 then
                 fib := n
             else
                 fib := fib(n - 1) + fib(n - 2)
         end;
         begin
             r := fib(10)
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(55));
}

#[test]
fn test_static_links_reach_enclosing_frames() {
    let (outcome, m) = exec(
        "program t;
         var g: integer;
         procedure outer;
         var x: integer;
             procedure inner;
             begin
                 g := g + 1;
                 x := 2
             end;
         begin
             x := 0;
             inner;
             g := g + x
         end;
         begin
             g := 5;
             outer
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(8));
}

#[test]
fn test_deep_recursion_overflows_the_stack() {
    let (outcome, _m) = exec(
        "program t;
         var n: integer;
         procedure spin;
         begin
             spin
         end;
         begin
             spin
         end.",
    );
    assert_eq!(outcome, Outcome::StackOverflow);
}

#[test]
fn test_real_parameter_promotion() {
    let (outcome, m) = exec(
        "program t;
         var r: real;
         function half(x: real): real;
         begin
             half := x / 2.0
         end;
         begin
             r := half(5)
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Real(2.5));
    assert_eq!(output(&m), "");
}
