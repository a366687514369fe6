//! Dense switch construction
//!
//! Builds `tableswitch` dispatch from a key/fragment map. Keys need not be
//! contiguous; gaps fall through to the default handler. Every case exits
//! over an explicit jump to the common end label, so case bodies compose
//! without fall-through surprises.

use std::collections::BTreeMap;

use crate::asm::code::{CodeBuilder, CodePiece};
use crate::asm::insn::{opcodes::GOTO, Insn, Label};

/// Accumulates switch cases, then emits a dense `tableswitch`.
#[derive(Debug, Default)]
pub struct SwitchBuilder {
    cases: BTreeMap<i32, CodePiece>,
    default: Option<CodePiece>,
}

impl SwitchBuilder {
    pub fn new() -> SwitchBuilder {
        SwitchBuilder::default()
    }

    /// Register the handler for a key. Each key may be added once.
    pub fn add(&mut self, key: i32, body: CodePiece) -> &mut Self {
        let prev = self.cases.insert(key, body);
        assert!(prev.is_none(), "duplicate switch key {key}");
        self
    }

    pub fn add_default(&mut self, body: CodePiece) -> &mut Self {
        assert!(self.default.is_none(), "duplicate default case");
        self.default = Some(body);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Emit the switch. `key` pushes the int being dispatched on. The key
    /// range is densified: keys absent from `lo..=hi` jump to the default
    /// handler, as does everything outside the range.
    pub fn build(self, key: CodePiece) -> CodePiece {
        assert!(!self.cases.is_empty(), "switch needs at least one case");

        let lo = *self.cases.keys().next().unwrap();
        let hi = *self.cases.keys().last().unwrap();
        let end = Label::fresh();
        let default_label = Label::fresh();

        let mut labels = BTreeMap::new();
        let mut targets = Vec::with_capacity((hi - lo + 1) as usize);
        for k in lo..=hi {
            if self.cases.contains_key(&k) {
                let label = Label::fresh();
                labels.insert(k, label);
                targets.push(label);
            } else {
                targets.push(default_label);
            }
        }

        let mut builder = CodeBuilder::new();
        builder.add(key).add(Insn::TableSwitch {
            lo,
            hi,
            default: default_label,
            targets,
        });
        for (k, body) in self.cases {
            builder
                .add(Insn::Mark(labels[&k]))
                .add(body)
                .add(Insn::Jump { opcode: GOTO, target: end });
        }
        builder.add(Insn::Mark(default_label));
        if let Some(default) = self.default {
            builder.add(default);
        }
        builder.add(Insn::Mark(end));
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::pieces;

    #[test]
    fn gaps_route_to_default() {
        let mut sw = SwitchBuilder::new();
        sw.add(0, pieces::const_int(10))
            .add(2, pieces::const_int(12))
            .add_default(pieces::const_int(99));
        let ops = sw.build(pieces::const_int(1)).build().into_vec();

        let Some(Insn::TableSwitch { lo, hi, default, targets }) = ops
            .iter()
            .find(|i| matches!(i, Insn::TableSwitch { .. }))
        else {
            panic!("no tableswitch emitted");
        };
        assert_eq!((*lo, *hi), (0, 2));
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[1], *default);
        assert_ne!(targets[0], *default);
        assert_ne!(targets[2], *default);
    }

    #[test]
    fn every_case_jumps_to_common_end() {
        let mut sw = SwitchBuilder::new();
        sw.add(3, pieces::const_int(1)).add(4, pieces::const_int(2));
        let ops = sw.build(pieces::const_int(3)).build().into_vec();

        let gotos: Vec<_> = ops
            .iter()
            .filter_map(|i| match i {
                Insn::Jump { opcode: GOTO, target } => Some(*target),
                _ => None,
            })
            .collect();
        assert_eq!(gotos.len(), 2);
        assert_eq!(gotos[0], gotos[1]);
        assert!(matches!(ops.last(), Some(Insn::Mark(end)) if *end == gotos[0]));
    }

    #[test]
    fn negative_keys_supported() {
        let mut sw = SwitchBuilder::new();
        sw.add(-2, pieces::const_int(1)).add(1, pieces::const_int(2));
        let ops = sw.build(pieces::const_int(0)).build().into_vec();
        let found = ops
            .iter()
            .any(|i| matches!(i, Insn::TableSwitch { lo: -2, hi: 1, .. }));
        assert!(found);
    }

    #[test]
    #[should_panic]
    fn duplicate_key_rejected() {
        let mut sw = SwitchBuilder::new();
        sw.add(1, pieces::const_int(1)).add(1, pieces::const_int(2));
    }
}
