//! Violation sink: exclusions, severities and per-kind caps

use indexmap::IndexMap;
use std::collections::HashSet;

use super::config::DrcConfig;
use super::types::{ErrorKind, Severity, Violation};

/// Collects violations for one run
#[derive(Debug, Default)]
pub struct ViolationReporter {
    violations: Vec<Violation>,
    counts: IndexMap<ErrorKind, usize>,
    exclusions: HashSet<String>,
    report_excluded: bool,
    limits: IndexMap<ErrorKind, usize>,
    default_limit: Option<usize>,
}

impl ViolationReporter {
    pub fn new(config: &DrcConfig) -> Self {
        Self {
            violations: Vec::new(),
            counts: IndexMap::new(),
            exclusions: config.exclusions.iter().cloned().collect(),
            report_excluded: config.report_excluded,
            limits: config.error_limits.clone(),
            default_limit: config.default_error_limit,
        }
    }

    fn limit(&self, kind: ErrorKind) -> Option<usize> {
        self.limits.get(&kind).copied().or(self.default_limit)
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_limit_reached(&self, kind: ErrorKind) -> bool {
        self.limit(kind).is_some_and(|limit| self.count(kind) >= limit)
    }

    /// Record a violation; returns whether it was kept
    pub fn report(&mut self, mut violation: Violation) -> bool {
        if violation.severity == Severity::Ignore {
            return false;
        }
        if self.exclusions.contains(&violation.fingerprint()) {
            if !self.report_excluded {
                return false;
            }
            violation.excluded = true;
            self.violations.push(violation);
            return true;
        }
        let kind = violation.error_kind;
        if self.is_limit_reached(kind) {
            return false;
        }
        *self.counts.entry(kind).or_insert(0) += 1;
        self.violations.push(violation);
        true
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Hand over the results, leaving the reporter empty for the next run
    pub fn take(&mut self) -> (Vec<Violation>, IndexMap<ErrorKind, usize>) {
        (std::mem::take(&mut self.violations), std::mem::take(&mut self.counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{ItemId, Point};

    fn via_hit(id: u32) -> Violation {
        Violation::new(ErrorKind::ViaInsideKeepout)
            .with_items(&[ItemId(id)])
            .at(Point::new(id as f64, 0.0))
    }

    #[test]
    fn test_cap_stops_reports_of_that_kind_only() {
        let config = DrcConfig::default().with_error_limit(ErrorKind::ViaInsideKeepout, 2);
        let mut reporter = ViolationReporter::new(&config);
        assert!(reporter.report(via_hit(1)));
        assert!(reporter.report(via_hit(2)));
        assert!(!reporter.report(via_hit(3)));
        assert!(reporter.report(Violation::new(ErrorKind::TrackInsideKeepout)));
        assert_eq!(reporter.count(ErrorKind::ViaInsideKeepout), 2);
        assert_eq!(reporter.len(), 3);
    }

    #[test]
    fn test_exclusions_suppressed_unless_requested() {
        let excluded = via_hit(4).fingerprint();
        let mut config = DrcConfig::default();
        config.exclusions.push(excluded);
        let mut reporter = ViolationReporter::new(&config);
        assert!(!reporter.report(via_hit(4)));
        assert!(reporter.is_empty());

        config.report_excluded = true;
        let mut reporter = ViolationReporter::new(&config);
        assert!(reporter.report(via_hit(4)));
        assert!(reporter.violations()[0].excluded);
        assert_eq!(reporter.count(ErrorKind::ViaInsideKeepout), 0);
    }

    #[test]
    fn test_ignore_severity_is_dropped() {
        let mut reporter = ViolationReporter::new(&DrcConfig::default());
        assert!(!reporter.report(via_hit(1).with_severity(Severity::Ignore)));
        let (violations, counts) = reporter.take();
        assert!(violations.is_empty());
        assert!(counts.is_empty());
    }
}
