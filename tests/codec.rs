use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;

use linxisa_rs::codec::{BackendEmitter, CTableEmitter, DecodeTreeEmitter, Emitter, FormTable};
use linxisa_rs::output::emit_artifacts;
use linxisa_rs::{compile_golden, Catalog, OutputError};

fn catalog() -> Catalog {
    compile_golden(&Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/golden")).unwrap()
}

fn form<'t>(table: &'t FormTable, mnemonic: &str) -> &'t linxisa_rs::codec::table::FormRow {
    table.forms.iter().find(|f| f.mnemonic == mnemonic).unwrap()
}

#[test]
fn split_signed_immediate_round_trips() {
    let table = FormTable::build(&catalog());
    let sw = form(&table, "SW");
    let simm = table.field(sw, "simm12").unwrap();
    let src_l = table.field(sw, "SrcL").unwrap();
    let src_r = table.field(sw, "SrcR").unwrap();
    assert_eq!(simm.signed_hint, 1);
    assert_eq!(simm.piece_count, 2);

    let mut word = sw.match_bits;
    word = table.insert(simm, word, (-27i64) as u64);
    word = table.insert(src_l, word, 1);
    word = table.insert(src_r, word, 2);
    assert_eq!(word, 0xfe20_a2a3);

    assert_eq!(table.extract_signed(simm, word), -27);
    assert_eq!(table.extract(simm, word), 0xfe5);
    assert_eq!(table.extract(src_l, word), 1);
    assert_eq!(table.extract(src_r, word), 2);
    assert_eq!(word & sw.mask, sw.match_bits);

    let hits: Vec<&str> = table.lookup(word, 32).iter().map(|f| f.mnemonic.as_str()).collect();
    assert_eq!(hits, vec!["SW"]);
}

#[test]
fn field_spanning_both_parts_round_trips() {
    let table = FormTable::build(&catalog());
    let li = form(&table, "LI64");
    let imm = table.field(li, "imm").unwrap();
    assert_eq!(imm.bit_width, 52);
    assert_eq!(imm.signed_hint, -1);

    let value = 0x0_1234_5678_9abcd;
    let word = table.insert(imm, li.match_bits, value);
    assert_eq!(word >> 32, 0x1234_5678);
    assert_eq!((word >> 12) & 0xf_ffff, 0x9_abcd);
    assert_eq!(table.extract(imm, word), value);
    assert_eq!(table.extract_signed(imm, word), value as i64);
}

#[test]
fn lookup_prefers_more_fixed_bits() {
    let table = FormTable::build(&catalog());
    // C.ADD RegDst=3 SrcR=2
    let hits = table.lookup(0x1881, 16);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].mnemonic, "C.ADD");
    let dst = table.field(hits[0], "RegDst").unwrap();
    assert_eq!(table.extract(dst, 0x1881), 3);

    // Both BSTART forms accept the same word.
    let hits: Vec<&str> = table.lookup(0x0000_1001, 32).iter().map(|f| f.mnemonic.as_str()).collect();
    assert_eq!(hits, vec!["BSTART.MPAR", "BSTART.PAR"]);
    assert!(table.lookup(0x0000, 16).is_empty());
}

#[test]
fn c_tables_describe_every_form() {
    let cat = catalog();
    let arts = CTableEmitter.emit(&cat);
    let names: Vec<&str> = arts.iter().map(|a| a.file_name.as_str()).collect();
    assert_eq!(names, vec!["linxisa_opcodes.h", "linxisa_opcodes.c"]);

    let header = &arts[0].contents;
    assert!(header.contains("} linxisa_inst_form;"));
    assert!(header.contains("extern const size_t linxisa_inst_forms_count;"));

    let source = &arts[1].contents;
    assert!(source.contains("#include \"linxisa_opcodes.h\""));
    assert!(source.contains("const size_t linxisa_inst_forms_count = 9;"));
    assert!(source.contains(".mnemonic = \"C.ADD\""));
    assert!(source.contains(".mask = 0x000000000000003fULL, .match = 0x0000000000000001ULL"));
    assert!(source.contains("{ .insn_lsb = 25, .width = 7, .value_lsb = 5 },"));
}

#[test]
fn decode_files_cover_every_length() {
    let arts = DecodeTreeEmitter.emit(&catalog());
    let names: Vec<&str> = arts.iter().map(|a| a.file_name.as_str()).collect();
    assert_eq!(names, vec!["linxisa16.decode", "linxisa32.decode", "linxisa48.decode", "linxisa64.decode"]);

    let d16 = &arts[0].contents;
    assert!(d16.starts_with("# Auto-generated from the LinxISA 0.3-test catalog.\n"));
    assert!(d16.contains("%RegDst 11:5\n"), "{d16}");
    assert!(d16.contains("%simm5 6:s5\n"), "{d16}");
    assert!(d16.contains("# C.MOVI | c.movi simm5, ->RegDst | opcodes/inc/c_moves.opc:2\n"));

    let d32 = &arts[1].contents;
    // RegDst sits at bits 11..7 in every 32-bit form; simm12 has two layouts.
    assert!(d32.contains("%RegDst 7:5\n"), "{d32}");
    assert!(d32.contains("%simm12__20_s12 20:s12\n"), "{d32}");
    assert!(d32.contains("%simm12__25_s7__7_5 25:s7 7:5\n"), "{d32}");
    assert!(d32.contains("simm12=%simm12__25_s7__7_5"), "{d32}");
}

#[test]
fn backend_groups_instructions() {
    let cat = catalog();
    let arts = BackendEmitter.emit(&cat);
    assert_eq!(arts.len(), 1);
    assert_eq!(arts[0].file_name, "LinxISAInstrInfo.td");
    let td = &arts[0].contents;
    assert!(td.contains("// Instruction count: 9\n"));
    assert!(td.contains("class LinxISAInst<int length, string mnemonic> {"));
    assert!(td.contains("// Store (1 instructions)"));
    assert!(td.contains("def SW_32 : LinxISAInst<32, \"SW\"> {"));
    assert!(td.contains("  let InOperandList = (ins GPR:$srcr, GPR:$srcl, simm12:$simm12);"));
    assert!(td.contains("  let AsmString = \"sw ${srcr}, [${srcl}, ${simm12}]\";"));
    assert!(td.contains("  let Mask = 0x0000707f;"));
}

#[test]
fn emitters_are_idempotent_and_checkable() {
    let cat = catalog();
    let dir = tempfile::tempdir().unwrap();
    let emitters: [&dyn Emitter; 3] = [&CTableEmitter, &DecodeTreeEmitter, &BackendEmitter];
    for e in emitters {
        let first = e.emit(&cat);
        assert_eq!(first, e.emit(&cat));

        let missing = emit_artifacts(dir.path(), &first, true, e.command()).unwrap_err();
        assert!(matches!(missing, OutputError::Missing { .. }), "{missing}");

        let written = emit_artifacts(dir.path(), &first, false, e.command()).unwrap();
        assert_eq!(written.len(), first.len());
        emit_artifacts(dir.path(), &first, true, e.command()).unwrap();

        let victim = &written[0];
        let mut text = fs::read_to_string(victim).unwrap();
        text.push_str("// edited\n");
        fs::write(victim, text).unwrap();
        let stale = emit_artifacts(dir.path(), &first, true, e.command()).unwrap_err();
        assert!(matches!(stale, OutputError::Outdated { .. }));
        assert!(stale.to_string().contains(&format!("regenerate with `linxisa {}`", e.command())));
    }
}
