use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

use linxisa_rs::encoding::combined;
use linxisa_rs::model::ConstraintOp;
use linxisa_rs::{compile_golden, BuildError, Catalog};

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/golden")
}

/// Minimal golden tree with one opcode file.
fn golden_with(dir: &Path, opcodes: &str) {
    fs::create_dir_all(dir.join("encoding")).unwrap();
    fs::create_dir_all(dir.join("opcodes")).unwrap();
    fs::write(dir.join("meta.json"), r#"{"isa":"LinxISA","version":"0.1"}"#).unwrap();
    fs::write(
        dir.join("encoding/formats.json"),
        r#"{"formats":[{"length_bits":16,"parts":[{"width_bits":16}]},{"length_bits":32,"parts":[{"width_bits":32}]}]}"#,
    )
    .unwrap();
    fs::write(dir.join("opcodes/t.opc"), opcodes).unwrap();
}

#[test]
fn fixture_compiles_sorted() {
    let cat = compile_golden(&fixture()).unwrap();
    assert_eq!(cat.isa, "LinxISA");
    assert_eq!(cat.version, "0.3-test");
    assert_eq!(cat.instruction_count, 9);
    let names: Vec<&str> = cat.instructions.iter().map(|i| i.mnemonic.as_str()).collect();
    assert_eq!(
        names,
        vec!["ADDI", "BSTART.MPAR", "BSTART.PAR", "C.ADD", "C.MOVI", "C.NOP", "HL.LI", "LI64", "SW"]
    );
    for inst in &cat.instructions {
        assert_eq!(inst.uid.len(), 12);
        assert!(inst.id.ends_with(&format!("_{}_{}", inst.length_bits, inst.uid)), "{}", inst.id);
    }
    assert!(cat.registers.contains_key("reg5"));
    assert!(cat.state.contains_key("csr"));
}

#[test]
fn build_is_deterministic() {
    let a = compile_golden(&fixture()).unwrap();
    let b = compile_golden(&fixture()).unwrap();
    assert_eq!(a.to_json(true).unwrap(), b.to_json(true).unwrap());
    assert_eq!(a.to_json(false).unwrap(), b.to_json(false).unwrap());

    let text = a.to_json(true).unwrap();
    assert!(text.ends_with('\n'));
    assert_eq!(Catalog::from_json(&text).unwrap(), a);
}

#[test]
fn imported_statements_keep_their_location() {
    let cat = compile_golden(&fixture()).unwrap();
    let movi = cat.instructions.iter().find(|i| i.mnemonic == "C.MOVI").unwrap();
    assert_eq!(movi.source.file, "opcodes/inc/c_moves.opc");
    assert_eq!(movi.source.line, 2);

    let cs = movi.constraints();
    assert_eq!(cs.len(), 1);
    assert_eq!((cs[0].field.as_str(), cs[0].op, cs[0].value.as_str()), ("RegDst", ConstraintOp::Ne, "RA"));
}

#[test]
fn encodings_match_the_source_bits() {
    let cat = compile_golden(&fixture()).unwrap();
    let add = cat.instructions.iter().find(|i| i.mnemonic == "C.ADD").unwrap();
    let p0 = &add.encoding.parts[0];
    assert_eq!(p0.pattern, "..........000001");
    assert_eq!((p0.mask, p0.match_bits), (0x003f, 0x0001));

    let sw = cat.instructions.iter().find(|i| i.mnemonic == "SW").unwrap();
    let simm = sw.encoding.parts[0].fields.iter().find(|f| f.name == "simm12").unwrap();
    assert_eq!(simm.signed, Some(true));
    assert_eq!(simm.bit_width(), 12);
    assert_eq!(simm.pieces.len(), 2);
    assert_eq!((simm.pieces[0].insn_lsb, simm.pieces[0].value_lsb), (25, 5));
    assert_eq!((simm.pieces[1].insn_lsb, simm.pieces[1].value_lsb), (7, 0));
}

#[test]
fn two_part_instruction_combines_low_part_first() {
    let cat = compile_golden(&fixture()).unwrap();
    let li = cat.instructions.iter().find(|i| i.mnemonic == "LI64").unwrap();
    assert_eq!(li.part_widths(), vec![32, 32]);
    assert_eq!(li.meta.get("stage"), Some(&serde_json::json!(2)));

    let enc = combined(li);
    assert_eq!(enc.length_bits, 64);
    assert_eq!(enc.pattern.len(), 64);
    assert!(enc.pattern.ends_with("1111111"));
    assert_eq!(enc.mask, 0x7f);
    assert_eq!(enc.match_bits, 0x7f);

    let imm = enc.field("imm").unwrap();
    assert_eq!(imm.bit_width(), 52);
    assert_eq!(imm.pieces[0].insn_lsb, 32);
    assert_eq!(imm.pieces[0].value_lsb, 20);
    assert_eq!(imm.pieces[1].insn_lsb, 12);
}

#[test]
fn statement_errors_carry_file_and_line() {
    let dir = tempfile::tempdir().unwrap();
    golden_with(
        dir.path(),
        "# comment\nOK [{\"length_bits\":16}] : 15..0=16'h0001 ; ; -\nBAD [{\"length_bits\":16}] : 15..1=X ; X ; -\n",
    );
    let err = compile_golden(dir.path()).unwrap_err();
    assert!(matches!(err, BuildError::Resolve { line: 3, part: 0, .. }), "{err}");
    let msg = err.to_string();
    assert!(msg.starts_with("opcodes/t.opc:3: BAD part[0]"), "{msg}");
    assert!(msg.contains("cover 15 bits"), "{msg}");
}

#[test]
fn parse_errors_show_the_line() {
    let dir = tempfile::tempdir().unwrap();
    golden_with(dir.path(), "ADD [{\"length_bits\":16}] 15..0=X ; ; -\n");
    let msg = compile_golden(dir.path()).unwrap_err().to_string();
    assert!(msg.starts_with("opcodes/t.opc:1: missing ':'"), "{msg}");
    assert!(msg.contains("line: ADD"), "{msg}");
}

#[test]
fn duplicate_statements_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let line = "X [{\"length_bits\":16}] : 15..0=16'h0001 ; ; -\n";
    golden_with(dir.path(), &format!("{line}{line}"));
    let err = compile_golden(dir.path()).unwrap_err();
    assert!(matches!(err, BuildError::DuplicateId { .. }));
    assert!(err.to_string().contains("opcodes/t.opc:1 and opcodes/t.opc:2"), "{err}");
}

#[test]
fn import_cycles_terminate() {
    let dir = tempfile::tempdir().unwrap();
    golden_with(dir.path(), "$import u.opc\nA [{\"length_bits\":16}] : 15..0=16'h0001 ; ; -\n");
    fs::write(
        dir.path().join("opcodes/u.opc"),
        "$import t.opc\nB [{\"length_bits\":16}] : 15..0=16'h0002 ; ; -\n",
    )
    .unwrap();
    let cat = compile_golden(dir.path()).unwrap();
    let names: Vec<&str> = cat.instructions.iter().map(|i| i.mnemonic.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
}

#[test]
fn imports_outside_the_root_get_relative_labels() {
    let dir = tempfile::tempdir().unwrap();
    let golden = dir.path().join("golden");
    golden_with(&golden, "$import ../../shared/s.opc\nA [{\"length_bits\":16}] : 15..0=16'h0001 ; ; -\n");
    fs::create_dir_all(dir.path().join("shared")).unwrap();
    fs::write(dir.path().join("shared/s.opc"), "B [{\"length_bits\":16}] : 15..0=16'h0002 ; ; -\n").unwrap();

    let cat = compile_golden(&golden).unwrap();
    let files: Vec<(&str, &str)> =
        cat.instructions.iter().map(|i| (i.mnemonic.as_str(), i.source.file.as_str())).collect();
    assert_eq!(files, vec![("A", "opcodes/t.opc"), ("B", "../shared/s.opc")]);
}

#[test]
fn missing_length_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    golden_with(dir.path(), "X : 15..0=16'h0001 ; ; -\n");
    let msg = compile_golden(dir.path()).unwrap_err().to_string();
    assert_eq!(msg, "opcodes/t.opc:1: X: meta.length_bits is required");
}
