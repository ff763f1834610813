//! Encoding-space conflict detection.
//!
//! Pairs of instructions with the same part-width signature are checked part by
//! part. A pair conflicts only if every part pair can accept a common word.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::model::{Catalog, ConstraintOp, Field, Instruction};
use crate::resolver::{ones, parse_const_token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// No word satisfies both sides.
    Disjoint,
    /// Some word satisfies both sides.
    Proven,
    /// Not decided within the enumeration bound.
    Possible,
}

/// Occupancy lists every slot, so selectors stay narrow.
pub const MAX_SELECTOR_BITS: usize = 16;

/// Narrow selector bits used to bucket part-0 patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub name: String,
    pub width_bits: u32,
    /// Instruction bits, in packed order from slot bit 0 upwards.
    pub bits: Vec<u32>,
}

impl Selector {
    fn new(name: &str, width_bits: u32, bits: &[u32]) -> Self {
        Selector { name: name.to_string(), width_bits, bits: bits.to_vec() }
    }

    pub fn mask(&self) -> u64 {
        self.bits.iter().fold(0, |m, b| m | (1u64 << b))
    }

    pub fn slot(&self, value: u64) -> u32 {
        self.bits
            .iter()
            .enumerate()
            .fold(0, |idx, (i, &b)| idx | ((((value >> b) & 1) as u32) << i))
    }

    /// `[19:17],[16],[3:0] (8b)`
    pub fn describe(&self) -> String {
        let mut bits = self.bits.clone();
        bits.sort_unstable_by(|a, b| b.cmp(a));
        bits.dedup();
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for b in bits {
            match runs.last_mut() {
                Some((_, lo)) if *lo == b + 1 => *lo = b,
                _ => runs.push((b, b)),
            }
        }
        let body: Vec<String> = runs
            .iter()
            .map(|&(hi, lo)| if hi == lo { format!("[{hi}]") } else { format!("[{hi}:{lo}]") })
            .collect();
        format!("{} ({}b)", body.join(","), self.bits.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Largest number of free constrained bits enumerated for parts wider than 16 bits.
    pub enum_bound_bits: u32,
    /// Mnemonics known to share an encoding on purpose.
    pub alias_groups: Vec<Vec<String>>,
    pub selectors: Vec<Selector>,
    pub max_pairs_listed: usize,
    pub max_examples: usize,
    pub max_hole_ranges: usize,
    /// Walk the whole 16-bit space for holes and multiple matches.
    pub exhaustive_16: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let bstart = ["BSTART.PAR", "BSTART.TEPL", "BSTART.MPAR", "BSTART.MSEQ", "BSTART.VPAR", "BSTART.VSEQ"];
        DetectorConfig {
            enum_bound_bits: 20,
            alias_groups: vec![bstart.iter().map(|s| s.to_string()).collect()],
            selectors: vec![
                Selector::new("C16-major[5:0]", 16, &[0, 1, 2, 3, 4, 5]),
                Selector::new("LX32-major[6:0]", 32, &[0, 1, 2, 3, 4, 5, 6]),
                Selector::new("HL48-major[19:17,16,3:0]", 48, &[0, 1, 2, 3, 16, 17, 18, 19]),
            ],
            max_pairs_listed: 50,
            max_examples: 50,
            max_hole_ranges: 25,
            exhaustive_16: true,
        }
    }
}

impl DetectorConfig {
    /// Missing keys take their defaults; selectors are checked before use.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: DetectorConfig = serde_json::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    /// Selector bits must lie inside a part of at most 64 bits, and a selector
    /// may not have more than [`MAX_SELECTOR_BITS`] of them.
    pub fn check(&self) -> Result<(), ConfigError> {
        for sel in &self.selectors {
            if !(1..=64).contains(&sel.width_bits) {
                return Err(ConfigError::SelectorWidth { name: sel.name.clone(), width: sel.width_bits });
            }
            if sel.bits.len() > MAX_SELECTOR_BITS {
                return Err(ConfigError::SelectorTooWide {
                    name: sel.name.clone(),
                    bits: sel.bits.len(),
                    max: MAX_SELECTOR_BITS,
                });
            }
            if let Some(&bit) = sel.bits.iter().find(|&&b| b >= sel.width_bits) {
                return Err(ConfigError::SelectorBit { name: sel.name.clone(), bit, width: sel.width_bits });
            }
        }
        Ok(())
    }

    pub fn is_alias_pair(&self, a: &str, b: &str) -> bool {
        self.alias_groups.iter().any(|g| g.iter().any(|m| m == a) && g.iter().any(|m| m == b))
    }

    fn all_aliases(&self, mnemonics: &[&str]) -> bool {
        self.alias_groups
            .iter()
            .any(|g| mnemonics.iter().all(|m| g.iter().any(|x| x == m)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstRef {
    pub id: String,
    pub mnemonic: String,
}

impl InstRef {
    fn of(inst: &Instruction) -> Self {
        InstRef { id: inst.id.clone(), mnemonic: inst.mnemonic.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairConflict {
    pub a: InstRef,
    pub b: InstRef,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureConflicts {
    pub parts: Vec<u32>,
    pub pairs: Vec<PairConflict>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub name: String,
    pub width_bits: u32,
    pub bits_desc: String,
    pub covered: usize,
    pub total: usize,
    /// Part-0 patterns that leave some selector bit free.
    pub partial: usize,
    pub used_slots: Vec<u32>,
    pub unused_slots: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiMatch {
    pub word: u32,
    pub matches: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HoleRange {
    pub lo: u32,
    pub hi: u32,
}

impl HoleRange {
    pub fn len(&self) -> u32 {
        self.hi - self.lo + 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Coverage16 {
    pub holes: u32,
    pub multi: u32,
    /// Words matched more than once only when a form with unresolved constraints
    /// is counted; kept out of `multi` like the pair verdict keeps them possible.
    pub possible_multi: u32,
    pub examples: Vec<MultiMatch>,
    pub hole_ranges: Vec<HoleRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictReport {
    pub isa: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub signatures: Vec<SignatureConflicts>,
    pub suppressed_aliases: usize,
    pub prefix: Vec<PairConflict>,
    pub occupancy: Vec<Occupancy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage16: Option<Coverage16>,
    /// Constraints whose value could not be resolved to a number.
    pub unresolved: Vec<String>,
    #[serde(skip)]
    max_pairs_listed: usize,
    #[serde(skip)]
    max_hole_ranges: usize,
}

impl ConflictReport {
    fn pairs(&self) -> impl Iterator<Item = &PairConflict> {
        self.signatures.iter().flat_map(|s| &s.pairs).chain(&self.prefix)
    }

    pub fn proven(&self) -> usize {
        self.pairs().filter(|p| p.verdict == Verdict::Proven).count()
    }

    pub fn possible(&self) -> usize {
        self.pairs().filter(|p| p.verdict == Verdict::Possible).count()
    }

    pub fn multi16(&self) -> u32 {
        self.coverage16.as_ref().map_or(0, |c| c.multi)
    }

    /// Build gate: proven overlaps and 16-bit multiple matches always fail,
    /// possible overlaps fail only in strict mode.
    pub fn passes(&self, strict: bool) -> bool {
        self.proven() == 0 && self.multi16() == 0 && !(strict && self.possible() > 0)
    }

    pub fn to_markdown(&self, strict: bool) -> String {
        let mut s = String::new();
        let _ = writeln!(s, "# {} Encoding Space Report\n", self.isa);
        if let Some(src) = &self.source {
            let _ = writeln!(s, "Catalog: `{src}` (version {})\n", self.version);
        }

        s.push_str("## Conflicts\n\n");
        s.push_str("Conflicts are reported at the full instruction length (all parts).\n");
        for sig in &self.signatures {
            let name: Vec<String> = sig.parts.iter().map(u32::to_string).collect();
            let _ = writeln!(s, "\n### parts: {}\n", name.join(" + "));
            if sig.pairs.is_empty() {
                s.push_str("- none\n");
                continue;
            }
            let _ = writeln!(s, "- count: {}", sig.pairs.len());
            self.list_pairs(&mut s, &sig.pairs);
        }
        if self.suppressed_aliases > 0 {
            let _ = writeln!(s, "\nSuppressed intentional aliases: {}", self.suppressed_aliases);
        }

        s.push_str("\n## Prefix Ambiguity (multi-part prefix vs single part)\n\n");
        if self.prefix.is_empty() {
            s.push_str("- none\n");
        } else {
            let _ = writeln!(s, "- count: {}", self.prefix.len());
            self.list_pairs(&mut s, &self.prefix);
        }

        if !self.unresolved.is_empty() {
            s.push_str("\n## Unresolved Constraint Values\n\n");
            for u in &self.unresolved {
                let _ = writeln!(s, "- `{u}`");
            }
        }

        s.push_str("\n## Major Opcode Occupancy\n");
        for occ in &self.occupancy {
            let digits = if occ.total <= 0x100 { 2 } else { 4 };
            let _ = writeln!(s, "\n### {}\n", occ.name);
            let _ = writeln!(s, "- width_bits: {}", occ.width_bits);
            let _ = writeln!(s, "- major bits: {}", occ.bits_desc);
            let _ = writeln!(s, "- covered slots: {}/{}", occ.covered, occ.total);
            if occ.partial > 0 {
                let _ = writeln!(s, "- patterns not fully constraining major bits: {}", occ.partial);
            }
            if !occ.used_slots.is_empty() {
                let _ = writeln!(s, "- used slot indices: {}", compact_ranges(&occ.used_slots, digits));
            }
            if !occ.unused_slots.is_empty() {
                let _ = writeln!(s, "- unused slot indices: {}", compact_ranges(&occ.unused_slots, digits));
            }
        }

        if let Some(cov) = &self.coverage16 {
            s.push_str("\n## 16-bit Exhaustive Coverage\n\n");
            let _ = writeln!(s, "- unmatched encodings (holes): {}", cov.holes);
            let _ = writeln!(s, "- multiply-matched encodings (conflicts): {}", cov.multi);
            if cov.possible_multi > 0 {
                let _ = writeln!(s, "- possibly multiply-matched (unresolved constraints): {}", cov.possible_multi);
            }
            if !cov.hole_ranges.is_empty() {
                let _ = writeln!(s, "- hole ranges: {}", cov.hole_ranges.len());
                s.push_str("\n### Largest 16-bit hole ranges\n\n");
                for r in largest_ranges(&cov.hole_ranges, self.max_hole_ranges) {
                    let _ = writeln!(s, "- `{:#06x}..{:#06x}` (count={})", r.lo, r.hi, r.len());
                }
            }
            if !cov.examples.is_empty() {
                s.push_str("\n### 16-bit conflict examples\n\n");
                for ex in &cov.examples {
                    let _ = writeln!(s, "- `{:#06x}` matches: {}", ex.word, ex.matches.join(", "));
                }
            }
        }

        s.push_str("\n## Status\n\n");
        if self.passes(strict) {
            s.push_str("- OK: no encoding conflicts detected\n");
            if self.possible() > 0 {
                let _ = writeln!(s, "- note: {} possible overlaps not proven either way", self.possible());
            }
        } else {
            s.push_str("- FAIL: encoding conflicts detected\n");
        }
        s
    }

    fn list_pairs(&self, s: &mut String, pairs: &[PairConflict]) {
        for p in pairs.iter().take(self.max_pairs_listed) {
            let tag = match p.verdict {
                Verdict::Possible => "possible",
                _ => "overlap",
            };
            let _ = writeln!(s, "- {tag}: `{}` ({}) vs `{}` ({})", p.a.mnemonic, p.a.id, p.b.mnemonic, p.b.id);
        }
        if pairs.len() > self.max_pairs_listed {
            let _ = writeln!(s, "- ... and {} more", pairs.len() - self.max_pairs_listed);
        }
    }
}

/// `0x00..0x03, 0x05` from sorted, deduplicated indices.
pub fn compact_ranges(xs: &[u32], digits: usize) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut i = 0;
    while i < xs.len() {
        let start = xs[i];
        let mut end = start;
        while i + 1 < xs.len() && xs[i + 1] == end + 1 {
            i += 1;
            end = xs[i];
        }
        if start == end {
            out.push(format!("0x{start:0digits$x}"));
        } else {
            out.push(format!("0x{start:0digits$x}..0x{end:0digits$x}"));
        }
        i += 1;
    }
    out.join(", ")
}

fn largest_ranges(ranges: &[HoleRange], n: usize) -> Vec<HoleRange> {
    let mut v = ranges.to_vec();
    v.sort_by(|a, b| (b.len(), b.lo).cmp(&(a.len(), a.lo)));
    v.truncate(n);
    v
}

#[derive(Debug, Clone)]
struct Check {
    field: String,
    op: ConstraintOp,
    value: u64,
}

/// One part of one instruction, ready for word tests.
#[derive(Debug, Clone)]
pub struct PartView<'a> {
    width: u32,
    mask: u64,
    match_bits: u64,
    fields: &'a [Field],
    checks: Vec<Check>,
    /// Some constraint could not be turned into a check.
    unresolved: bool,
}

impl<'a> PartView<'a> {
    fn field_value(&self, name: &str, word: u64) -> Option<u64> {
        let f = self.fields.iter().find(|f| f.name == name)?;
        Some(f.pieces.iter().fold(0, |v, p| v | (((word >> p.insn_lsb) & ones(p.width)) << p.value_lsb)))
    }

    fn field_bits(&self, name: &str) -> u64 {
        self.fields
            .iter()
            .filter(|f| f.name == name)
            .flat_map(|f| &f.pieces)
            .fold(0, |m, p| m | (ones(p.width) << p.insn_lsb))
    }

    fn checks_hold<'c>(&self, word: u64, mut checks: impl Iterator<Item = &'c Check>) -> bool {
        checks.all(|c| self.field_value(&c.field, word).is_some_and(|v| c.op.eval(v, c.value)))
    }

    /// Fixed bits and resolvable constraints. Unresolved constraints are not applied.
    pub fn accepts(&self, word: u64) -> bool {
        word & self.mask == self.match_bits && self.checks_hold(word, self.checks.iter())
    }
}

#[derive(Debug, Clone)]
pub struct InstView<'a> {
    pub inst: &'a Instruction,
    pub parts: Vec<PartView<'a>>,
}

/// Builds word-test views; constraint values are integers or register names.
pub fn views<'a>(catalog: &'a Catalog, unresolved: &mut Vec<String>) -> Vec<InstView<'a>> {
    let aliases = catalog.register_aliases();
    catalog
        .instructions
        .iter()
        .map(|inst| {
            let parts = inst
                .encoding
                .parts
                .iter()
                .map(|p| {
                    let mut view = PartView {
                        width: p.width_bits,
                        mask: p.mask,
                        match_bits: p.match_bits,
                        fields: &p.fields,
                        checks: Vec::new(),
                        unresolved: false,
                    };
                    for c in &p.constraints {
                        // A field with value bits outside this part cannot be checked here.
                        let local = piece_width(view.fields, &c.field);
                        let total: u32 = inst.encoding.parts.iter().map(|q| piece_width(&q.fields, &c.field)).sum();
                        let value = match parse_const_token(&c.value, 64) {
                            Ok(Some(v)) => Some(v),
                            Ok(None) => aliases.get(&c.value.to_ascii_uppercase()).copied(),
                            Err(_) => None,
                        };
                        match value {
                            Some(value) if local > 0 && local == total => {
                                view.checks.push(Check { field: c.field.clone(), op: c.op, value })
                            }
                            _ => {
                                view.unresolved = true;
                                unresolved.push(format!("{}: {c}", inst.id));
                            }
                        }
                    }
                    view
                })
                .collect();
            InstView { inst, parts }
        })
        .collect()
}

fn piece_width(fields: &[Field], name: &str) -> u32 {
    fields.iter().filter(|f| f.name == name).flat_map(|f| &f.pieces).map(|p| p.width).sum()
}

fn any_word(fixed: u64, free: u64, mut pred: impl FnMut(u64) -> bool) -> bool {
    let mut sub = free;
    loop {
        if pred(fixed | sub) {
            return true;
        }
        if sub == 0 {
            return false;
        }
        sub = (sub - 1) & free;
    }
}

/// Decides whether two parts of equal width accept a common word.
pub fn part_verdict(a: &PartView<'_>, b: &PartView<'_>, bound: u32) -> Verdict {
    if a.width != b.width {
        return Verdict::Disjoint;
    }
    let common = a.mask & b.mask;
    if (a.match_bits ^ b.match_bits) & common != 0 {
        return Verdict::Disjoint;
    }
    if a.unresolved || b.unresolved {
        return Verdict::Possible;
    }
    if a.checks.is_empty() && b.checks.is_empty() {
        return Verdict::Proven;
    }

    let fixed_mask = a.mask | b.mask;
    let fixed = a.match_bits | b.match_bits;
    let both = |w: u64| a.accepts(w) && b.accepts(w);
    let decided = |hit: bool| if hit { Verdict::Proven } else { Verdict::Disjoint };

    if a.width <= 16 {
        return decided(any_word(fixed, ones(a.width) & !fixed_mask, both));
    }

    let names: BTreeSet<&str> = a.checks.iter().chain(&b.checks).map(|c| c.field.as_str()).collect();
    let free_bits = |name: &str| (a.field_bits(name) | b.field_bits(name)) & !fixed_mask;
    let joint = names.iter().fold(0, |m, n| m | free_bits(n));
    if joint.count_ones() <= bound {
        return decided(any_word(fixed, joint, both));
    }

    for name in &names {
        let bits = free_bits(name);
        if bits.count_ones() > bound {
            continue;
        }
        let on_field = |w: u64| {
            a.checks_hold(w, a.checks.iter().filter(|c| c.field == *name))
                && b.checks_hold(w, b.checks.iter().filter(|c| c.field == *name))
        };
        if !any_word(fixed, bits, on_field) {
            return Verdict::Disjoint;
        }
    }
    Verdict::Possible
}

/// Any disjoint part separates the pair; otherwise any undecided part leaves it possible.
pub fn instruction_verdict(a: &InstView<'_>, b: &InstView<'_>, bound: u32) -> Verdict {
    if a.parts.len() != b.parts.len() {
        return Verdict::Disjoint;
    }
    let mut out = Verdict::Proven;
    for (pa, pb) in a.parts.iter().zip(&b.parts) {
        match part_verdict(pa, pb, bound) {
            Verdict::Disjoint => return Verdict::Disjoint,
            Verdict::Possible => out = Verdict::Possible,
            Verdict::Proven => {}
        }
    }
    out
}

pub fn analyze(catalog: &Catalog, config: &DetectorConfig) -> ConflictReport {
    let mut unresolved = Vec::new();
    let views = views(catalog, &mut unresolved);
    let bound = config.enum_bound_bits;

    let mut groups: BTreeMap<(usize, Vec<u32>), Vec<&InstView<'_>>> = BTreeMap::new();
    for v in &views {
        let sig = v.inst.part_widths();
        groups.entry((sig.len(), sig)).or_default().push(v);
    }

    let mut suppressed = 0;
    let mut signatures = Vec::new();
    for ((_, sig), members) in &groups {
        let mut pairs = Vec::new();
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                let verdict = instruction_verdict(a, b, bound);
                if verdict == Verdict::Disjoint {
                    continue;
                }
                if config.is_alias_pair(&a.inst.mnemonic, &b.inst.mnemonic) {
                    suppressed += 1;
                    continue;
                }
                if verdict == Verdict::Possible {
                    warn!(a = %a.inst.id, b = %b.inst.id, "possible overlap not decided within enumeration bound");
                }
                pairs.push(PairConflict { a: InstRef::of(a.inst), b: InstRef::of(b.inst), verdict });
            }
        }
        debug!(signature = ?sig, members = members.len(), conflicts = pairs.len(), "signature checked");
        signatures.push(SignatureConflicts { parts: sig.clone(), pairs });
    }

    let mut prefix = Vec::new();
    for multi in views.iter().filter(|v| v.parts.len() > 1) {
        for single in views.iter().filter(|v| v.parts.len() == 1 && v.parts[0].width == multi.parts[0].width) {
            let verdict = part_verdict(&multi.parts[0], &single.parts[0], bound);
            if verdict == Verdict::Disjoint || config.is_alias_pair(&multi.inst.mnemonic, &single.inst.mnemonic) {
                continue;
            }
            prefix.push(PairConflict { a: InstRef::of(multi.inst), b: InstRef::of(single.inst), verdict });
        }
    }

    let occupancy = config.selectors.iter().map(|sel| occupancy(&views, sel)).collect();
    let coverage16 = config.exhaustive_16.then(|| coverage16(&views, config));

    let report = ConflictReport {
        isa: catalog.isa.clone(),
        version: catalog.version.clone(),
        source: None,
        signatures,
        suppressed_aliases: suppressed,
        prefix,
        occupancy,
        coverage16,
        unresolved,
        max_pairs_listed: config.max_pairs_listed,
        max_hole_ranges: config.max_hole_ranges,
    };
    info!(
        proven = report.proven(),
        possible = report.possible(),
        multi16 = report.multi16(),
        suppressed = report.suppressed_aliases,
        "conflict analysis done"
    );
    report
}

fn occupancy(views: &[InstView<'_>], sel: &Selector) -> Occupancy {
    let mask = sel.mask();
    let mut used = BTreeSet::new();
    let mut partial = 0;
    for p in views.iter().filter_map(|v| v.parts.first()).filter(|p| p.width == sel.width_bits) {
        if p.mask & mask != mask {
            partial += 1;
            continue;
        }
        used.insert(sel.slot(p.match_bits));
    }
    let total = 1usize << sel.bits.len();
    let unused_slots = (0..total as u32).filter(|i| !used.contains(i)).collect();
    Occupancy {
        name: sel.name.clone(),
        width_bits: sel.width_bits,
        bits_desc: sel.describe(),
        covered: used.len(),
        total,
        partial,
        used_slots: used.into_iter().collect(),
        unused_slots,
    }
}

fn coverage16(views: &[InstView<'_>], config: &DetectorConfig) -> Coverage16 {
    let parts: Vec<(&str, &PartView<'_>)> = views
        .iter()
        .filter_map(|v| v.parts.first().map(|p| (v.inst.mnemonic.as_str(), p)))
        .filter(|(_, p)| p.width == 16)
        .collect();

    let mut cov = Coverage16::default();
    let mut hole_start: Option<u32> = None;
    for word in 0u32..=0xffff {
        let (sure, unsure): (Vec<_>, Vec<_>) =
            parts.iter().filter(|(_, p)| p.accepts(u64::from(word))).partition(|(_, p)| !p.unresolved);
        if sure.is_empty() && unsure.is_empty() {
            cov.holes += 1;
            hole_start.get_or_insert(word);
            continue;
        }
        if let Some(lo) = hole_start.take() {
            cov.hole_ranges.push(HoleRange { lo, hi: word - 1 });
        }
        let hits: Vec<&str> = sure.iter().map(|(m, _)| *m).collect();
        if hits.len() > 1 && !config.all_aliases(&hits) {
            cov.multi += 1;
            if cov.examples.len() < config.max_examples {
                cov.examples.push(MultiMatch { word, matches: hits.iter().take(10).map(|m| m.to_string()).collect() });
            }
            continue;
        }
        let all: Vec<&str> = sure.iter().chain(&unsure).map(|(m, _)| *m).collect();
        if all.len() > 1 && !config.all_aliases(&all) {
            cov.possible_multi += 1;
        }
    }
    if let Some(lo) = hole_start {
        cov.hole_ranges.push(HoleRange { lo, hi: 0xffff });
    }
    cov
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_packing_and_description() {
        let sel = Selector::new("HL48", 48, &[0, 1, 2, 3, 16, 17, 18, 19]);
        assert_eq!(sel.mask(), 0xf_000f);
        assert_eq!(sel.slot(0x1_0001), 0b1_0001);
        assert_eq!(sel.slot(0x8_0000), 0x80);
        assert_eq!(sel.describe(), "[19:16],[3:0] (8b)");
        assert_eq!(Selector::new("C16", 16, &[0, 1, 2, 3, 4, 5]).describe(), "[5:0] (6b)");
    }

    #[test]
    fn ranges_are_compact() {
        assert_eq!(compact_ranges(&[0, 1, 2, 3, 5, 7, 8, 9], 2), "0x00..0x03, 0x05, 0x07..0x09");
        assert_eq!(compact_ranges(&[], 2), "");
        assert_eq!(compact_ranges(&[0x1ff], 4), "0x01ff");
    }

    #[test]
    fn word_enumeration_visits_every_subset() {
        let mut seen = Vec::new();
        assert!(!any_word(0x100, 0b101, |w| {
            seen.push(w);
            false
        }));
        seen.sort_unstable();
        assert_eq!(seen, vec![0x100, 0x101, 0x104, 0x105]);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let cfg = DetectorConfig::default();
        let text = serde_json::to_string(&cfg).unwrap();
        assert_eq!(DetectorConfig::from_json(&text).unwrap(), cfg);
        let partial = DetectorConfig::from_json(r#"{"enum_bound_bits": 8}"#).unwrap();
        assert_eq!(partial.enum_bound_bits, 8);
        assert_eq!(partial.selectors.len(), 3);
        assert!(cfg.is_alias_pair("BSTART.PAR", "BSTART.VSEQ"));
        assert!(!cfg.is_alias_pair("BSTART.PAR", "C.ADD"));
    }

    #[test]
    fn selectors_outside_the_part_are_rejected() {
        let with = |sel: &str| DetectorConfig::from_json(&format!(r#"{{"selectors": [{sel}]}}"#));
        assert!(with(r#"{"name": "ok", "width_bits": 64, "bits": [0, 63]}"#).is_ok());

        let err = with(r#"{"name": "hi", "width_bits": 64, "bits": [0, 64]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::SelectorBit { bit: 64, width: 64, .. }), "{err}");
        let err = with(r#"{"name": "c16", "width_bits": 16, "bits": [16]}"#).unwrap_err();
        assert_eq!(err.to_string(), "selector c16: bit 16 is outside the 16-bit part");

        let wide: Vec<String> = (0..17).map(|b| b.to_string()).collect();
        let err = with(&format!(r#"{{"name": "w", "width_bits": 32, "bits": [{}]}}"#, wide.join(","))).unwrap_err();
        assert!(matches!(err, ConfigError::SelectorTooWide { bits: 17, max: 16, .. }), "{err}");

        let err = with(r#"{"name": "x", "width_bits": 128, "bits": [0]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::SelectorWidth { width: 128, .. }), "{err}");
        assert!(matches!(DetectorConfig::from_json("{"), Err(ConfigError::Json(_))));
    }
}
