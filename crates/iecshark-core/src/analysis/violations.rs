use std::collections::BTreeMap;

use crate::ViolationSummary;
use crate::bus::Violation;

/// Example samples kept per violation id.
pub(crate) const MAX_EXAMPLES: usize = 3;

/// Group detected violations by id, in id order.
pub(crate) fn summarize_violations(found: &[(Violation, u64)]) -> Vec<ViolationSummary> {
    let mut grouped: BTreeMap<&'static str, ViolationSummary> = BTreeMap::new();
    for &(violation, sample) in found {
        let entry = grouped
            .entry(violation.id())
            .or_insert_with(|| ViolationSummary {
                id: violation.id().to_string(),
                line: violation.line(),
                message: violation.message().to_string(),
                count: 0,
                examples: Vec::new(),
            });
        entry.count += 1;
        if entry.examples.len() < MAX_EXAMPLES {
            entry.examples.push(sample);
        }
    }
    grouped.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::summarize_violations;
    use crate::bus::{BusLine, Violation};

    #[test]
    fn groups_by_id_with_bounded_examples() {
        let found = [
            (Violation::MalformedEoi, 10),
            (Violation::AtnDiscipline, 20),
            (Violation::MalformedEoi, 30),
            (Violation::MalformedEoi, 40),
            (Violation::MalformedEoi, 50),
        ];
        let summaries = summarize_violations(&found);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "IEC-ATN-DISCIPLINE");
        assert_eq!(summaries[0].line, BusLine::Atn);
        assert_eq!(summaries[1].id, "IEC-EOI-HANDSHAKE");
        assert_eq!(summaries[1].count, 4);
        assert_eq!(summaries[1].examples, vec![10, 30, 40]);
    }

    #[test]
    fn empty_input_has_no_summaries() {
        assert!(summarize_violations(&[]).is_empty());
    }
}
