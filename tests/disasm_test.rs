use expect_test::expect;
use p_lang::mach::{listing, Compiler, Instr};

fn compile(source: &str) -> Vec<Instr> {
    let mut comp = Compiler::new("test", false);
    let nerrors = comp.compile(source);
    assert_eq!(nerrors, 0, "unexpected diagnostics: {:?}", comp.errors());
    comp.code().to_vec()
}

#[test]
fn test_assignment_disassembly() {
    let code = compile("program t; var x: integer; begin x := 42 end.");
    let text: String = code.iter().map(|i| format!("{}\n", i)).collect();
    expect![[r#"
        CALL    0, 2
        HALT
        ENTER   1
        PUSHVAR 0, 4
        PUSH    42
        ASSIGN  1
        RET     0
    "#]]
    .assert_eq(&text);
}

#[test]
fn test_while_loop_disassembly() {
    let code = compile("program t; var i: integer; begin i := 3; while i > 0 do i := i - 1 end.");
    let text: String = code.iter().map(|i| format!("{}\n", i)).collect();
    expect![[r#"
        CALL    0, 2
        HALT
        ENTER   1
        PUSHVAR 0, 4
        PUSH    3
        ASSIGN  1
        PUSHVAR 0, 4
        EVAL    1
        PUSH    0
        GT
        JNEQ    18
        PUSHVAR 0, 4
        PUSHVAR 0, 4
        EVAL    1
        PUSH    1
        SUB
        ASSIGN  1
        JUMP    6
        RET     0
    "#]]
    .assert_eq(&text);
}

#[test]
fn test_listing_numbers_every_location() {
    let code = compile("program t; var i: integer; begin i := 3; while i > 0 do i := i - 1 end.");
    let text = listing(&code);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), code.len());
    assert_eq!(lines[0], "    0: CALL    0, 2");
    assert_eq!(lines[10], "   10: JNEQ    18");
    assert_eq!(lines[17], "   17: JUMP    6");
    assert_eq!(lines[18], "   18: RET     0");
}

#[test]
fn test_byte_round_trip_preserves_the_listing() {
    let code = compile(
        "program t;
         var result, i: integer;
         begin
             result := 1;
             for i := 2 to 10 do
                 result := result * i;
             writeln(result:12)
         end.",
    );
    let mut bytes = vec![];
    for instr in &code {
        instr.encode(&mut bytes);
    }
    assert_eq!(bytes.len(), code.len() * Instr::ENCODED_SIZE);
    let decoded: Vec<Instr> = bytes
        .chunks(Instr::ENCODED_SIZE)
        .map(|chunk| Instr::decode(chunk).unwrap())
        .collect();
    assert_eq!(decoded, code);
    assert_eq!(listing(&decoded), listing(&code));
}
