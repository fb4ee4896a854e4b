use p_lang::mach::{Compiler, Datum, Machine, Outcome, FRAME_SIZE};

/// Compile `source`, failing the test on any diagnostic, and run it on
/// a small machine whose output is captured.
pub fn exec(source: &str) -> (Outcome, Machine<Vec<u8>>) {
    let mut comp = Compiler::new("test", false);
    let nerrors = comp.compile(source);
    assert_eq!(nerrors, 0, "unexpected diagnostics: {:?}", comp.errors());
    let mut machine = Machine::with_output(256, 256, Vec::new());
    let outcome = machine.run(comp.code(), false);
    (outcome, machine)
}

/// The main program's local at `offset` cells past the frame prefix;
/// the first declared variable is `local(&machine, 0)`.
pub fn local(machine: &Machine<Vec<u8>>, offset: usize) -> Datum {
    machine.stack()[FRAME_SIZE + offset]
}

/// Everything the program wrote.
pub fn output(machine: &Machine<Vec<u8>>) -> String {
    String::from_utf8_lossy(machine.output()).to_string()
}
