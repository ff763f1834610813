use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;

use linxisa_rs::loader::display_label;
use linxisa_rs::{analyze, compile_golden, Catalog, DetectorConfig, Verdict};

fn fixture() -> Catalog {
    compile_golden(&Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/golden")).unwrap()
}

/// Compiles `opcodes` against 16/32/64-bit formats and a register file where RA is 10.
fn compile_lines(opcodes: &str) -> Catalog {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("encoding")).unwrap();
    fs::create_dir_all(root.join("registers")).unwrap();
    fs::create_dir_all(root.join("opcodes")).unwrap();
    fs::write(root.join("meta.json"), r#"{"isa":"LinxISA","version":"t"}"#).unwrap();
    fs::write(
        root.join("encoding/formats.json"),
        r#"{"formats":[
            {"length_bits":16,"parts":[{"width_bits":16}]},
            {"length_bits":32,"parts":[{"width_bits":32}]},
            {"length_bits":64,"parts":[{"width_bits":32},{"width_bits":32}]}]}"#,
    )
    .unwrap();
    fs::write(
        root.join("registers/gpr.json"),
        r#"{"entries":[{"code":0,"asm":"zero"},{"code":10,"asm":"ra"}]}"#,
    )
    .unwrap();
    fs::write(root.join("opcodes/t.opc"), opcodes).unwrap();
    compile_golden(root).unwrap()
}

fn quiet() -> DetectorConfig {
    DetectorConfig { exhaustive_16: false, ..DetectorConfig::default() }
}

fn verdicts(cat: &Catalog, config: &DetectorConfig) -> Vec<Verdict> {
    analyze(cat, config).signatures.iter().flat_map(|s| &s.pairs).map(|p| p.verdict).collect()
}

#[test]
fn fixture_has_no_conflicts() {
    let report = analyze(&fixture(), &DetectorConfig::default());
    assert_eq!(report.proven(), 0);
    assert_eq!(report.possible(), 0);
    assert_eq!(report.multi16(), 0);
    assert!(report.unresolved.is_empty(), "{:?}", report.unresolved);
    assert_eq!(report.suppressed_aliases, 1);
    assert!(report.prefix.is_empty());
    assert!(report.passes(true));

    let md = report.to_markdown(false);
    assert!(md.starts_with("# LinxISA Encoding Space Report\n"));
    assert!(md.contains("Suppressed intentional aliases: 1"));
    assert!(md.ends_with("- OK: no encoding conflicts detected\n"), "{md}");
}

#[test]
fn fixture_occupancy_and_coverage() {
    let report = analyze(&fixture(), &DetectorConfig::default());
    let c16 = &report.occupancy[0];
    assert_eq!(c16.name, "C16-major[5:0]");
    assert_eq!((c16.covered, c16.total, c16.partial), (3, 64, 0));
    assert_eq!(c16.used_slots, vec![1, 2, 3]);

    let lx32 = &report.occupancy[1];
    // LI64 contributes its 32-bit first part.
    assert_eq!(lx32.used_slots, vec![0x01, 0x13, 0x23, 0x7f]);

    let hl48 = &report.occupancy[2];
    assert_eq!(hl48.bits_desc, "[19:16],[3:0] (8b)");
    assert_eq!((hl48.covered, hl48.partial), (0, 1));

    let cov = report.coverage16.as_ref().unwrap();
    // C.ADD and C.MOVI take 1024 words each minus RegDst == RA for C.MOVI; C.NOP one.
    assert_eq!(cov.holes, 65536 - 1024 - (1024 - 32) - 1);
    assert_eq!(cov.multi, 0);
    assert_eq!(cov.hole_ranges[0].lo, 0);
}

#[test]
fn overlapping_sixteen_bit_forms_are_proven() {
    let cat = compile_lines(
        "A [{\"length_bits\":16}] : 15..10=6'b111111 9..0=X ; X ; -\n\
         B [{\"length_bits\":16}] : 15..0=16'hfc00 ; ; -\n",
    );
    let report = analyze(&cat, &DetectorConfig::default());
    assert_eq!(verdicts(&cat, &quiet()), vec![Verdict::Proven]);
    assert_eq!(report.multi16(), 1);
    let ex = &report.coverage16.as_ref().unwrap().examples[0];
    assert_eq!(ex.word, 0xfc00);
    assert_eq!(ex.matches, vec!["A", "B"]);
    assert!(!report.passes(false));
    assert!(report.to_markdown(false).contains("- FAIL: encoding conflicts detected"));
}

#[test]
fn inequality_separates_the_same_forms() {
    let cat = compile_lines(
        "A [{\"length_bits\":16}] : 15..10=6'b111111 9..0=X ; X ; X!=0\n\
         B [{\"length_bits\":16}] : 15..0=16'hfc00 ; ; -\n",
    );
    let report = analyze(&cat, &DetectorConfig::default());
    assert_eq!(report.proven(), 0);
    assert_eq!(report.multi16(), 0);
    assert!(report.passes(true));
}

#[test]
fn identical_patterns_conflict_even_with_one_sided_constraint() {
    let same = |a: &str, b: &str| {
        compile_lines(&format!(
            "A [{{\"length_bits\":16}}] : 15..10=6'b111111 9..0=X ; X ; {a}\n\
             B [{{\"length_bits\":16}}] : 15..10=6'b111111 9..0=X ; X ; {b}\n"
        ))
    };
    assert_eq!(verdicts(&same("-", "-"), &quiet()), vec![Verdict::Proven]);
    assert_eq!(verdicts(&same("-", "X!=0"), &quiet()), vec![Verdict::Proven]);
    assert_eq!(verdicts(&same("X==0", "X!=0"), &quiet()), Vec::<Verdict>::new());

    let report = analyze(&same("X==0", "X!=0"), &DetectorConfig::default());
    assert_eq!(report.multi16(), 0);
    assert_eq!(report.coverage16.as_ref().unwrap().holes, 65536 - 1024);
}

#[test]
fn unresolved_forms_do_not_fail_sixteen_bit_coverage() {
    let cat = compile_lines(
        "A [{\"length_bits\":16}] : 15..10=6'b111111 9..0=X ; X ; X!=FOO\n\
         B [{\"length_bits\":16}] : 15..0=16'hfc00 ; ; -\n",
    );
    let report = analyze(&cat, &DetectorConfig::default());
    assert_eq!(report.possible(), 1);
    let cov = report.coverage16.as_ref().unwrap();
    assert_eq!((cov.multi, cov.possible_multi), (0, 1));
    assert_eq!(cov.holes, 65536 - 1024);
    assert!(report.passes(false));
    assert!(!report.passes(true));
    assert!(report.to_markdown(false).contains("- possibly multiply-matched (unresolved constraints): 1"));
}

#[test]
fn report_label_ignores_path_spelling() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("cat.json"), fixture().to_json(true).unwrap()).unwrap();

    let render = |spelling: &Path| {
        let cat = Catalog::from_json(&fs::read_to_string(spelling).unwrap()).unwrap();
        let mut report = analyze(&cat, &DetectorConfig::default());
        report.source = Some(display_label(spelling, dir.path()));
        (report.to_markdown(false), serde_json::to_string_pretty(&report).unwrap())
    };
    let direct = render(&dir.path().join("cat.json"));
    let roundabout = render(&dir.path().join("sub/../cat.json"));
    assert_eq!(direct, roundabout);
    assert!(direct.0.contains("Catalog: `cat.json` (version 0.3-test)"), "{}", direct.0);
    assert!(!direct.1.contains(&*dir.path().to_string_lossy()));
    assert_eq!(display_label(&dir.path().join("cat.json"), &dir.path().join("sub")), "../cat.json");
}

#[test]
fn no_instruction_conflicts_with_itself() {
    let cat = compile_lines("A [{\"length_bits\":32}] : 31..7=X 6..0=7'h13 ; X ; -\n");
    let report = analyze(&cat, &quiet());
    assert!(report.signatures.iter().all(|s| s.pairs.is_empty()));
}

#[test]
fn register_alias_constraints_resolve() {
    let cat = compile_lines(
        "MOV [{\"length_bits\":32}] : 31..12=20'h0 11..7=RegDst 6..0=7'h13 ; RegDst ; RegDst!=RA\n\
         RET [{\"length_bits\":32}] : 31..12=20'h0 11..7=5'd10 6..0=7'h13 ; ; -\n\
         NOP [{\"length_bits\":32}] : 31..12=20'h0 11..7=5'd0 6..0=7'h13 ; ; -\n",
    );
    let report = analyze(&cat, &quiet());
    assert!(report.unresolved.is_empty());
    let pairs: Vec<(&str, &str, Verdict)> = report
        .signatures
        .iter()
        .flat_map(|s| &s.pairs)
        .map(|p| (p.a.mnemonic.as_str(), p.b.mnemonic.as_str(), p.verdict))
        .collect();
    assert_eq!(pairs, vec![("MOV", "NOP", Verdict::Proven)]);
}

#[test]
fn unknown_constraint_value_stays_possible() {
    let cat = compile_lines(
        "A [{\"length_bits\":32}] : 31..7=X 6..0=7'h13 ; X ; X!=FOO\n\
         B [{\"length_bits\":32}] : 31..7=25'h0 6..0=7'h13 ; ; -\n",
    );
    let report = analyze(&cat, &quiet());
    assert_eq!(verdicts(&cat, &quiet()), vec![Verdict::Possible]);
    assert_eq!(report.unresolved.len(), 1);
    assert!(report.unresolved[0].ends_with(": X!=FOO"), "{}", report.unresolved[0]);
    assert!(report.passes(false));
    assert!(!report.passes(true));
    assert!(report.to_markdown(false).contains("- note: 1 possible overlaps not proven either way"));
}

#[test]
fn wide_constrained_fields_fall_back_to_per_field_checks() {
    // P and Q together leave 15 free bits, above an 8-bit bound; P alone fits.
    let cat = compile_lines(
        "A [{\"length_bits\":32}] : 31..22=10'h0 21..12=Q 11..7=P 6..0=7'h13 ; P Q ; P>5,Q!=0\n\
         B [{\"length_bits\":32}] : 31..22=10'h0 21..12=Q 11..7=P 6..0=7'h13 ; P Q ; P<3,Q!=1\n\
         C [{\"length_bits\":32}] : 31..22=10'h0 21..12=Q 11..7=P 6..0=7'h13 ; P Q ; P<9,Q!=2\n",
    );
    let mut config = quiet();
    config.enum_bound_bits = 8;
    let pairs: Vec<(String, String, Verdict)> = analyze(&cat, &config)
        .signatures
        .iter()
        .flat_map(|s| &s.pairs)
        .map(|p| (p.a.mnemonic.clone(), p.b.mnemonic.clone(), p.verdict))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("A".to_string(), "C".to_string(), Verdict::Possible),
            ("B".to_string(), "C".to_string(), Verdict::Possible),
        ]
    );

    config.enum_bound_bits = 16;
    assert_eq!(verdicts(&cat, &config), vec![Verdict::Proven, Verdict::Proven]);
}

#[test]
fn alias_groups_suppress_pairs() {
    let lines = "\"BSTART.PAR\" [{\"length_bits\":32}] : 31..7=X 6..0=7'h01 ; X ; -\n\
                 \"BSTART.VSEQ\" [{\"length_bits\":32}] : 31..7=X 6..0=7'h01 ; X ; -\n\
                 FOO [{\"length_bits\":32}] : 31..7=X 6..0=7'h01 ; X ; -\n";
    let cat = compile_lines(lines);
    let report = analyze(&cat, &quiet());
    assert_eq!(report.suppressed_aliases, 1);
    assert_eq!(report.proven(), 2);

    let mut config = quiet();
    config.alias_groups.push(vec!["BSTART.PAR".into(), "BSTART.VSEQ".into(), "FOO".into()]);
    let report = analyze(&cat, &config);
    assert_eq!(report.suppressed_aliases, 3);
    assert_eq!(report.proven(), 0);
}

#[test]
fn multi_part_prefix_is_checked_against_single_parts() {
    let cat = compile_lines(
        "LONG [{\"length_bits\":64}] : 31..7=imm[24:0] 6..0=7'h13 | 31..0=imm[56:25] ; imm ; -\n\
         SHORT [{\"length_bits\":32}] : 31..7=X 6..0=7'h13 ; X ; -\n\
         OTHER [{\"length_bits\":32}] : 31..7=X 6..0=7'h33 ; X ; -\n",
    );
    let report = analyze(&cat, &quiet());
    assert_eq!(report.prefix.len(), 1);
    assert_eq!(report.prefix[0].a.mnemonic, "LONG");
    assert_eq!(report.prefix[0].b.mnemonic, "SHORT");
    assert_eq!(report.prefix[0].verdict, Verdict::Proven);
    assert!(!report.passes(false));
}

#[test]
fn json_report_names_verdicts() {
    let cat = compile_lines(
        "A [{\"length_bits\":16}] : 15..10=6'b111111 9..0=X ; X ; -\n\
         B [{\"length_bits\":16}] : 15..0=16'hfc00 ; ; -\n",
    );
    let report = analyze(&cat, &quiet());
    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v["signatures"][0]["parts"], serde_json::json!([16]));
    assert_eq!(v["signatures"][0]["pairs"][0]["verdict"], "proven");
    assert!(v.get("coverage16").is_none());
}
