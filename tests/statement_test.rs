mod common;
use common::*;
use p_lang::mach::{Datum, Outcome};

#[test]
fn test_if_then_else_takes_the_true_arm() {
    let (outcome, m) = exec(
        "program t;
         var x: integer;
         begin
             if 3 > 2 then x := 1 else x := 2
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(1));
}

#[test]
fn test_if_then_else_takes_the_false_arm() {
    let (outcome, m) = exec(
        "program t;
         var x: integer;
         begin
             if 2 > 3 then x := 1 else x := 2
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(2));
}

#[test]
fn test_if_without_else() {
    let (outcome, m) = exec(
        "program t;
         var x: integer;
         begin
             x := 9;
             if false then x := 1
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(9));
}

#[test]
fn test_while_sums_one_to_ten() {
    let (outcome, m) = exec(
        "program t;
         var i, s: integer;
         begin
             i := 1;
             s := 0;
             while i <= 10 do
                 begin
                     s := s + i;
                     i := i + 1
                 end
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(11)); // i
    assert_eq!(local(&m, 1), Datum::Integer(55)); // s
    assert_eq!(output(&m), "");
}

#[test]
fn test_repeat_runs_at_least_once() {
    let (outcome, m) = exec(
        "program t;
         var n: integer;
         begin
             n := 10;
             repeat n := n - 3 until n < 0
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(-2));
}

#[test]
fn test_for_to_computes_factorial() {
    let (outcome, m) = exec(
        "program t;
         var result, i: integer;
         begin
             result := 1;
             for i := 2 to 10 do
                 result := result * i
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(3628800));
}

#[test]
fn test_for_downto_counts_down() {
    let (outcome, m) = exec(
        "program t;
         var i, s: integer;
         begin
             s := 0;
             for i := 5 downto 1 do
                 s := s * 10 + i
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 1), Datum::Integer(54321));
}

#[test]
fn test_for_body_that_never_runs() {
    let (outcome, m) = exec(
        "program t;
         var i, s: integer;
         begin
             s := 7;
             for i := 2 to 1 do s := 0
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 1), Datum::Integer(7));
}

#[test]
fn test_subrange_assignment_in_bounds() {
    let (outcome, m) = exec(
        "program t;
         var x: 1..5;
         begin
             x := 5
         end.",
    );
    assert_eq!(outcome, Outcome::Success);
    assert_eq!(local(&m, 0), Datum::Integer(5));
}

#[test]
fn test_subrange_violation_stops_the_run() {
    let (outcome, m) = exec(
        "program t;
         var x: 1..5;
         begin
             x := 6
         end.",
    );
    assert_eq!(outcome, Outcome::OutOfRange);
    // the store never happened
    assert_eq!(local(&m, 0), Datum::Integer(0));
}

#[test]
fn test_subrange_violation_from_arithmetic() {
    let (outcome, _m) = exec(
        "program t;
         var x: 1..5;
         begin
             x := 3;
             x := x + 4
         end.",
    );
    assert_eq!(outcome, Outcome::OutOfRange);
}
