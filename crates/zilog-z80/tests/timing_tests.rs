//! Documented T-state counts, one instruction at a time.

use emu_core::{Cpu, SimpleBus};
use zilog_z80::{CF, Z80, ZF};

/// Run the first instruction of `program` with the given flags and B,
/// returning the T-states it consumed.
fn t_states(program: &[u8], f: u8, b: u8) -> u64 {
    let mut bus = SimpleBus::new();
    bus.load(0, program);
    let mut cpu = Z80::new();
    cpu.set_sp(0x8000);
    cpu.regs_mut().set_f(f);
    cpu.regs_mut().set_bc(u16::from(b) << 8 | 0x02);
    cpu.regs_mut().set_hl(0x4000);
    cpu.regs_mut().set_de(0x5000);
    cpu.regs_mut().ix = 0x4000;
    cpu.regs_mut().iy = 0x4000;
    cpu.step(&mut bus);
    assert_eq!(bus.cycles, cpu.cycles().get(), "every T-state reaches the bus");
    cpu.cycles().get()
}

fn t(program: &[u8]) -> u64 {
    t_states(program, 0, 1)
}

#[test]
fn base_table() {
    let cases: &[(&str, &[u8], u64)] = &[
        ("NOP", &[0x00], 4),
        ("LD BC,nn", &[0x01, 0x34, 0x12], 10),
        ("LD (BC),A", &[0x02], 7),
        ("INC BC", &[0x03], 6),
        ("INC B", &[0x04], 4),
        ("LD B,n", &[0x06, 0x00], 7),
        ("RLCA", &[0x07], 4),
        ("EX AF,AF'", &[0x08], 4),
        ("ADD HL,BC", &[0x09], 11),
        ("LD A,(BC)", &[0x0A], 7),
        ("JR e", &[0x18, 0x10], 12),
        ("LD (nn),HL", &[0x22, 0x00, 0x60], 16),
        ("DAA", &[0x27], 4),
        ("LD HL,(nn)", &[0x2A, 0x00, 0x60], 16),
        ("LD (nn),A", &[0x32, 0x00, 0x60], 13),
        ("INC (HL)", &[0x34], 11),
        ("LD (HL),n", &[0x36, 0x00], 10),
        ("LD A,(nn)", &[0x3A, 0x00, 0x60], 13),
        ("LD B,C", &[0x41], 4),
        ("LD B,(HL)", &[0x46], 7),
        ("LD (HL),B", &[0x70], 7),
        ("HALT", &[0x76], 4),
        ("ADD A,B", &[0x80], 4),
        ("ADD A,(HL)", &[0x86], 7),
        ("POP BC", &[0xC1], 10),
        ("JP nn", &[0xC3, 0x00, 0x10], 10),
        ("PUSH BC", &[0xC5], 11),
        ("ADD A,n", &[0xC6, 0x00], 7),
        ("RST 0", &[0xC7], 11),
        ("RET", &[0xC9], 10),
        ("CALL nn", &[0xCD, 0x00, 0x10], 17),
        ("OUT (n),A", &[0xD3, 0xFE], 11),
        ("EXX", &[0xD9], 4),
        ("IN A,(n)", &[0xDB, 0xFE], 11),
        ("EX (SP),HL", &[0xE3], 19),
        ("JP (HL)", &[0xE9], 4),
        ("EX DE,HL", &[0xEB], 4),
        ("DI", &[0xF3], 4),
        ("LD SP,HL", &[0xF9], 6),
        ("EI", &[0xFB], 4),
    ];
    for (name, program, expected) in cases {
        assert_eq!(t(program), *expected, "{name}");
    }
}

#[test]
fn conditional_branches() {
    // NZ is taken with F=0 and not taken with Z set.
    assert_eq!(t_states(&[0x20, 0x10], 0, 1), 12, "JR NZ taken");
    assert_eq!(t_states(&[0x20, 0x10], ZF, 1), 7, "JR NZ not taken");
    assert_eq!(t_states(&[0x38, 0x10], CF, 1), 12, "JR C taken");
    assert_eq!(t_states(&[0xC2, 0x00, 0x10], ZF, 1), 10, "JP NZ not taken");
    assert_eq!(t_states(&[0xC4, 0x00, 0x10], 0, 1), 17, "CALL NZ taken");
    assert_eq!(t_states(&[0xC4, 0x00, 0x10], ZF, 1), 10, "CALL NZ not taken");
    assert_eq!(t_states(&[0xC0], 0, 1), 11, "RET NZ taken");
    assert_eq!(t_states(&[0xC0], ZF, 1), 5, "RET NZ not taken");
    assert_eq!(t_states(&[0x10, 0x10], 0, 2), 13, "DJNZ taken");
    assert_eq!(t_states(&[0x10, 0x10], 0, 1), 8, "DJNZ not taken");
}

#[test]
fn cb_table() {
    assert_eq!(t(&[0xCB, 0x00]), 8, "RLC B");
    assert_eq!(t(&[0xCB, 0x06]), 15, "RLC (HL)");
    assert_eq!(t(&[0xCB, 0x46]), 12, "BIT 0,(HL)");
    assert_eq!(t(&[0xCB, 0xC6]), 15, "SET 0,(HL)");
    assert_eq!(t(&[0xCB, 0x7F]), 8, "BIT 7,A");
}

#[test]
fn indexed_table() {
    let cases: &[(&str, &[u8], u64)] = &[
        ("LD IX,nn", &[0xDD, 0x21, 0x00, 0x00], 14),
        ("ADD IX,BC", &[0xDD, 0x09], 15),
        ("INC IX", &[0xDD, 0x23], 10),
        ("LD (nn),IX", &[0xDD, 0x22, 0x00, 0x60], 20),
        ("INC (IX+d)", &[0xDD, 0x34, 0x01], 23),
        ("LD (IX+d),n", &[0xDD, 0x36, 0x01, 0x00], 19),
        ("LD B,(IX+d)", &[0xDD, 0x46, 0x01], 19),
        ("LD (IX+d),B", &[0xDD, 0x70, 0x01], 19),
        ("ADD A,(IY+d)", &[0xFD, 0x86, 0x01], 19),
        ("LD IXH,n", &[0xDD, 0x26, 0x00], 11),
        ("INC IXL", &[0xDD, 0x2C], 8),
        ("POP IX", &[0xDD, 0xE1], 14),
        ("PUSH IY", &[0xFD, 0xE5], 15),
        ("EX (SP),IX", &[0xDD, 0xE3], 23),
        ("JP (IX)", &[0xDD, 0xE9], 8),
        ("LD SP,IY", &[0xFD, 0xF9], 10),
        ("RLC (IX+d)", &[0xDD, 0xCB, 0x01, 0x06], 23),
        ("BIT 0,(IX+d)", &[0xDD, 0xCB, 0x01, 0x46], 20),
        ("SET 0,(IY+d),B", &[0xFD, 0xCB, 0x01, 0xC0], 23),
        ("DD NOP", &[0xDD, 0x00], 8),
    ];
    for (name, program, expected) in cases {
        assert_eq!(t(program), *expected, "{name}");
    }
}

#[test]
fn ed_table() {
    let cases: &[(&str, &[u8], u64)] = &[
        ("IN B,(C)", &[0xED, 0x40], 12),
        ("OUT (C),B", &[0xED, 0x41], 12),
        ("SBC HL,BC", &[0xED, 0x42], 15),
        ("LD (nn),BC", &[0xED, 0x43, 0x00, 0x60], 20),
        ("NEG", &[0xED, 0x44], 8),
        ("RETN", &[0xED, 0x45], 14),
        ("IM 0", &[0xED, 0x46], 8),
        ("LD I,A", &[0xED, 0x47], 9),
        ("ADC HL,BC", &[0xED, 0x4A], 15),
        ("LD BC,(nn)", &[0xED, 0x4B, 0x00, 0x60], 20),
        ("RETI", &[0xED, 0x4D], 14),
        ("LD A,R", &[0xED, 0x5F], 9),
        ("RRD", &[0xED, 0x67], 18),
        ("RLD", &[0xED, 0x6F], 18),
        ("LDI", &[0xED, 0xA0], 16),
        ("CPI", &[0xED, 0xA1], 16),
        ("INI", &[0xED, 0xA2], 16),
        ("OUTI", &[0xED, 0xA3], 16),
        ("LDD", &[0xED, 0xA8], 16),
        ("undefined", &[0xED, 0xFF], 8),
    ];
    for (name, program, expected) in cases {
        assert_eq!(t(program), *expected, "{name}");
    }
}

#[test]
fn block_repeat_timing() {
    // BC = 0x0202 so LDIR and CPIR repeat; B = 2 so INIR/OTIR repeat.
    assert_eq!(t_states(&[0xED, 0xB0], 0, 2), 21, "LDIR repeating");
    assert_eq!(t_states(&[0xED, 0xB1], 0, 2), 21, "CPIR repeating");
    assert_eq!(t_states(&[0xED, 0xB2], 0, 2), 21, "INIR repeating");
    assert_eq!(t_states(&[0xED, 0xB3], 0, 2), 21, "OTIR repeating");
    assert_eq!(t_states(&[0xED, 0xB2], 0, 1), 16, "INIR last");
    assert_eq!(t_states(&[0xED, 0xBB], 0, 1), 16, "OTDR last");
}
