use crate::verifier::checks::Violation;
use std::fmt::Write;

/// The order and naming of the per-property summary lines.
pub const SUMMARY_PROPERTIES: [&str; 9] = [
    "Delegation Consistency",
    "Lame Delegation",
    "Rewrites",
    "Rewrite Blackholing",
    "Query Rewrite",
    "Nameserver Contact",
    "Response Value",
    "Response Consistency",
    "Response Returned",
];

/// The outcome of a whole verification run: the deduplicated, sorted
/// violations plus the totals shown in the summary.
#[derive(Debug)]
pub struct Report {
    pub violations: Vec<Violation>,
    pub zones_parsed: usize,
    pub ec_count: usize,
}

impl Report {
    /// Render the report: one `[FAIL]` block per violation followed by
    /// the verification summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for violation in &self.violations {
            writeln!(out, "[FAIL] Property Violation: {}", violation.property).unwrap();
            writeln!(out, "Query: {}", violation.subject).unwrap();
            writeln!(out, "Reason: {}", violation.reason).unwrap();
            writeln!(out).unwrap();
        }

        writeln!(out, "--- Verification Summary ---").unwrap();
        writeln!(out, "Total Zones Parsed: {}", self.zones_parsed).unwrap();
        writeln!(out, "Equivalence Classes Generated: {}", self.ec_count).unwrap();
        writeln!(out).unwrap();
        for (position, property) in SUMMARY_PROPERTIES.iter().enumerate() {
            let count = self
                .violations
                .iter()
                .filter(|v| &v.property == property)
                .count();
            let status = if count > 0 { "[FAIL]" } else { "[PASS]" };
            writeln!(
                out,
                "{}. {:<30} {} issues found {}",
                position + 1,
                property,
                count,
                status
            )
            .unwrap();
        }
        out
    }
}
