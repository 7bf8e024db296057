use common::constants::BUILTIN_IMAGE;
use common::{words_to_bytes, Word};
use emulator::{Emulator, EmulatorConfig, ExecState};

use crate::sdb::{Debugger, PROMPT};

// addi a0, x0, 1; addi a0, a0, 1; addi a0, a0, 1; ebreak
const COUNTER: [Word; 4] = [0x00100513, 0x00150513, 0x00150513, 0x00100073];
// addi a0, x0, 0; addi a7, x0, 93; ecall
const EXIT_ZERO: [Word; 3] = [0x00000513, 0x05d00893, 0x00000073];
const INVALID: [Word; 1] = [0xffffffff];

fn session(program: &[Word], batch: bool, script: &str) -> (Debugger<Vec<u8>>, String) {
    let mut emulator = Emulator::new(EmulatorConfig {
        memory_size: 0x10000,
        ..Default::default()
    });
    emulator.load_bytes(&words_to_bytes(program)).unwrap();
    let mut debugger = Debugger::new(emulator, Vec::new());
    if batch {
        debugger.set_batch_mode();
    }
    debugger.mainloop(script.as_bytes()).unwrap();
    let text = String::from_utf8(debugger.output().clone()).unwrap();
    (debugger, text)
}

macro_rules! e2e_test {
    (
        $test_name:ident,
        program = $program:expr,
        script = $script:expr,
        exit_bad = $bad:expr,
        output = [$($expected:expr),* $(,)?]
    ) => {
        #[test]
        fn $test_name() {
            let (debugger, text) = session(&$program, false, $script);
            assert_eq!($bad, debugger.emulator().is_exit_status_bad(), "{text}");
            $(
                assert!(text.contains($expected), "missing {:?} in\n{text}", $expected);
            )*
        }
    };
}

e2e_test!(
    builtin_good_trap,
    program = BUILTIN_IMAGE,
    script = "c\n",
    exit_bad = false,
    output = [
        PROMPT,
        "rvdb: HIT GOOD TRAP at pc = 0x8000000c\ntotal guest instructions = 4\n",
    ]
);

e2e_test!(
    quit_before_running,
    program = BUILTIN_IMAGE,
    script = "q\nc\n",
    exit_bad = false,
    output = []
);

e2e_test!(
    end_of_input_while_stopped,
    program = BUILTIN_IMAGE,
    script = "si\n",
    exit_bad = true,
    output = ["0x80000000: 00000297\tauipc"]
);

e2e_test!(
    step_to_breakpoint,
    program = BUILTIN_IMAGE,
    script = "si 4\nx 1 $t0 + 16\n",
    exit_bad = false,
    output = [
        "0x8000000c: 00100073\tebreak",
        "0x80000010:\t0xdeadbe00\n",
    ]
);

e2e_test!(
    watchpoint_session,
    program = COUNTER,
    script = "w $a0\nc\nc\np $a0\nc\nc\nc\n",
    exit_bad = true,
    output = [
        "watchpoint 0: $a0, initial value: 0\n",
        "Old value = 0\nNew value = 1\n",
        "Old value = 1\nNew value = 2\n",
        "$0 = 2\n",
        "Old value = 2\nNew value = 3\n",
    ]
);

e2e_test!(
    errors_do_not_end_session,
    program = COUNTER,
    script = "frob\np 1/0\nx 1\np 1 +\np (1\nd 3\nw 2 2\np 7\nq\n",
    exit_bad = false,
    output = [
        "Unknown command 'frob'\n",
        "division by zero\n",
        "usage: x N EXPR\n",
        "missing operand\n",
        "unmatched parenthesis\n",
        "No watchpoint number 3.\n",
        "syntax error at position 2\n",
        "$0 = 7\n",
    ]
);

e2e_test!(
    exit_call,
    program = EXIT_ZERO,
    script = "c\n",
    exit_bad = false,
    output = ["rvdb: program exited with code 0 at pc = 0x80000008\n"]
);

e2e_test!(
    invalid_instruction,
    program = INVALID,
    script = "c\ninfo r\n",
    exit_bad = true,
    output = [
        "rvdb: ABORT at pc = 0x80000000: ",
        "pc              0x80000000",
    ]
);

#[test]
fn batch_mode_runs_without_prompt() {
    let (debugger, text) = session(&COUNTER, true, "q\n");
    assert_eq!(
        "rvdb: HIT BAD TRAP at pc = 0x8000000c (a0 = 0x3)\ntotal guest instructions = 4\n",
        text
    );
    assert_eq!(
        &ExecState::Trapped {
            pc: 0x8000000c,
            value: 3
        },
        debugger.emulator().state()
    );
}

#[test]
fn ended_program_stays_ended() {
    let (debugger, text) = session(&EXIT_ZERO, false, "c\nc\nsi 3\n");
    assert_eq!(2, text.matches("Program execution has ended.").count());
    assert!(matches!(
        debugger.emulator().state(),
        ExecState::Halted { code: 0, .. }
    ));
    assert_eq!(3, debugger.emulator().statistics().instructions);
}
