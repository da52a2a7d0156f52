// ✅ Data Quality Engine - Audit the resolved roster
//
// One QualityReport per ResolvedEntity, one rule per field that downstream
// consumers (roster builders, age analytics) depend on, plus a batch summary.

use crate::birth_year::YearBounds;
use crate::record::ResolvedEntity;
use serde::{Deserialize, Serialize};

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub message: String,
    pub confidence: f64,
    pub severity: Severity,
}

impl ValidationResult {
    pub fn pass(rule_name: &str, field: &str, message: &str) -> Self {
        ValidationResult {
            passed: true,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            confidence: 1.0,
            severity: Severity::Info,
        }
    }

    pub fn fail(rule_name: &str, field: &str, message: &str, severity: Severity) -> Self {
        ValidationResult {
            passed: false,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            confidence: if severity == Severity::Critical {
                0.0
            } else {
                0.5
            },
            severity,
        }
    }
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// `person@@org`
    pub entity_key: String,
    pub overall_quality: f64,
    pub overall_confidence: f64,
    pub validations: Vec<ValidationResult>,
    pub issues: Vec<QualityIssue>,
    pub passed_count: usize,
    pub failed_count: usize,
    pub needs_review: bool,
}

impl QualityReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: quality {:.1}%, confidence {:.1}%, {} issues ({} critical)",
            self.entity_key,
            self.overall_quality * 100.0,
            self.overall_confidence * 100.0,
            self.issues.len(),
            self.count(Severity::Critical)
        )
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn has_critical_issues(&self) -> bool {
        self.count(Severity::Critical) > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Entity is unusable as is
    Warning,  // Key attribute missing, entity still usable
    Info,     // Nice-to-have attribute missing
}

// ============================================================================
// DATA QUALITY ENGINE
// ============================================================================

pub struct DataQualityEngine {
    bounds: YearBounds,

    /// Minimum confidence before an entity is flagged for manual review
    review_threshold: f64,
}

impl DataQualityEngine {
    pub fn new(bounds: YearBounds) -> Self {
        DataQualityEngine {
            bounds,
            review_threshold: 0.7,
        }
    }

    /// Audit one entity
    pub fn validate(&self, entity: &ResolvedEntity) -> QualityReport {
        let rules: [(ValidationResult, &str); 7] = [
            (
                self.validate_display_name(entity),
                "Check the source record's name field",
            ),
            (
                self.validate_birth_year(entity),
                "Add a biography source or a manual fix for this player",
            ),
            (
                self.validate_org(entity),
                "Add a source that lists the player's current club",
            ),
            (
                self.validate_role(entity),
                "Use P/D/C/A or Goalkeeper/Defender/Midfielder/Forward",
            ),
            (
                self.validate_cost(entity),
                "Add a price list source",
            ),
            (
                self.validate_performance(entity),
                "Add a rating source",
            ),
            (
                self.validate_provenance(entity),
                "Entities must carry at least one source",
            ),
        ];

        let mut validations = Vec::with_capacity(rules.len());
        let mut issues = Vec::new();

        for (result, recommendation) in rules {
            if !result.passed {
                issues.push(QualityIssue {
                    severity: result.severity,
                    field: result.field.clone(),
                    issue: result.message.clone(),
                    recommendation: recommendation.to_string(),
                });
            }
            validations.push(result);
        }

        let passed_count = validations.iter().filter(|v| v.passed).count();
        let failed_count = validations.len() - passed_count;
        let overall_quality = passed_count as f64 / validations.len() as f64;
        let overall_confidence =
            validations.iter().map(|v| v.confidence).sum::<f64>() / validations.len() as f64;

        QualityReport {
            entity_key: entity.canonical_key.to_string(),
            overall_quality,
            overall_confidence,
            validations,
            issues,
            passed_count,
            failed_count,
            needs_review: overall_confidence < self.review_threshold,
        }
    }

    /// Audit a whole roster
    pub fn audit(&self, entities: &[ResolvedEntity]) -> QualityAudit {
        let reports: Vec<QualityReport> = entities.iter().map(|e| self.validate(e)).collect();
        let summary = QualitySummary::from_reports(&reports);
        QualityAudit { reports, summary }
    }

    // ========================================================================
    // VALIDATION RULES
    // ========================================================================

    fn validate_display_name(&self, entity: &ResolvedEntity) -> ValidationResult {
        if entity.display_name.trim().is_empty() {
            return ValidationResult::fail(
                "name_present",
                "display_name",
                "Display name is empty",
                Severity::Critical,
            );
        }
        ValidationResult::pass("name_present", "display_name", "Display name present")
    }

    fn validate_birth_year(&self, entity: &ResolvedEntity) -> ValidationResult {
        match entity.birth_year {
            None => ValidationResult::fail(
                "birth_year_present",
                "birth_year",
                "Birth year missing",
                Severity::Warning,
            ),
            Some(year) if self.bounds.validate(i64::from(year)).is_none() => ValidationResult::fail(
                "birth_year_plausible",
                "birth_year",
                &format!(
                    "Birth year {} outside [{}, {}]",
                    year,
                    self.bounds.min_year,
                    self.bounds.max_year()
                ),
                Severity::Critical,
            ),
            Some(_) => ValidationResult::pass("birth_year_plausible", "birth_year", "Birth year plausible"),
        }
    }

    fn validate_org(&self, entity: &ResolvedEntity) -> ValidationResult {
        if !entity.canonical_key.has_org() {
            return ValidationResult::fail(
                "org_known",
                "org_name",
                "Organization unknown",
                Severity::Warning,
            );
        }
        ValidationResult::pass("org_known", "org_name", "Organization known")
    }

    fn validate_role(&self, entity: &ResolvedEntity) -> ValidationResult {
        if !entity.role_code.is_known() {
            return ValidationResult::fail("role_known", "role_code", "Role unknown", Severity::Info);
        }
        ValidationResult::pass("role_known", "role_code", "Role known")
    }

    fn validate_cost(&self, entity: &ResolvedEntity) -> ValidationResult {
        if entity.cost_value.is_none() {
            return ValidationResult::fail("cost_present", "cost_value", "Cost missing", Severity::Info);
        }
        ValidationResult::pass("cost_present", "cost_value", "Cost present")
    }

    fn validate_performance(&self, entity: &ResolvedEntity) -> ValidationResult {
        if entity.performance_value.is_none() {
            return ValidationResult::fail(
                "performance_present",
                "performance_value",
                "Performance value missing",
                Severity::Info,
            );
        }
        ValidationResult::pass("performance_present", "performance_value", "Performance value present")
    }

    fn validate_provenance(&self, entity: &ResolvedEntity) -> ValidationResult {
        if entity.provenance_trail.is_empty() {
            return ValidationResult::fail(
                "provenance_present",
                "provenance_trail",
                "No contributing source recorded",
                Severity::Critical,
            );
        }
        ValidationResult::pass("provenance_present", "provenance_trail", "Provenance recorded")
    }
}

// ============================================================================
// AUDIT SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAudit {
    pub reports: Vec<QualityReport>,
    pub summary: QualitySummary,
}

impl QualityAudit {
    /// Reports that need attention, worst first
    pub fn flagged(&self) -> Vec<&QualityReport> {
        let mut flagged: Vec<&QualityReport> = self.reports.iter().filter(|r| r.needs_review).collect();
        flagged.sort_by(|a, b| {
            a.overall_confidence
                .partial_cmp(&b.overall_confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        flagged
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualitySummary {
    pub total_entities: usize,
    pub missing_birth_year: usize,
    pub unknown_org: usize,
    pub unknown_role: usize,
    pub needs_review_count: usize,
    pub critical_issues_count: usize,
    pub average_quality: f64,
    pub average_confidence: f64,
}

impl QualitySummary {
    pub fn from_reports(reports: &[QualityReport]) -> Self {
        let total = reports.len();
        if total == 0 {
            return QualitySummary::default();
        }

        let failed = |rule: &str| {
            reports
                .iter()
                .filter(|r| r.validations.iter().any(|v| !v.passed && v.rule_name == rule))
                .count()
        };

        QualitySummary {
            total_entities: total,
            missing_birth_year: failed("birth_year_present"),
            unknown_org: failed("org_known"),
            unknown_role: failed("role_known"),
            needs_review_count: reports.iter().filter(|r| r.needs_review).count(),
            critical_issues_count: reports.iter().filter(|r| r.has_critical_issues()).count(),
            average_quality: reports.iter().map(|r| r.overall_quality).sum::<f64>() / total as f64,
            average_confidence: reports.iter().map(|r| r.overall_confidence).sum::<f64>()
                / total as f64,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} entities: {:.1}% quality, {:.1}% confidence | {} missing birth year, {} unknown org, {} unknown role, {} need review, {} critical",
            self.total_entities,
            self.average_quality * 100.0,
            self.average_confidence * 100.0,
            self.missing_birth_year,
            self.unknown_org,
            self.unknown_role,
            self.needs_review_count,
            self.critical_issues_count
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::build_key;
    use crate::record::RoleCode;

    fn complete_entity() -> ResolvedEntity {
        ResolvedEntity {
            canonical_key: build_key("Yunus Musah", "Atalanta"),
            display_name: "Yunus Musah".to_string(),
            org_name: "Atalanta".to_string(),
            role_code: RoleCode::Midfielder,
            birth_year: Some(2002),
            performance_value: Some(6.1),
            cost_value: Some(12.0),
            provenance_trail: vec!["fantagazzetta".to_string()],
        }
    }

    #[test]
    fn test_complete_entity_passes() {
        let engine = DataQualityEngine::new(YearBounds::new(2025));
        let report = engine.validate(&complete_entity());

        assert_eq!(report.failed_count, 0);
        assert_eq!(report.overall_quality, 1.0);
        assert!(!report.needs_review);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_missing_birth_year_is_warning() {
        let engine = DataQualityEngine::new(YearBounds::new(2025));
        let mut entity = complete_entity();
        entity.birth_year = None;

        let report = engine.validate(&entity);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].severity, Severity::Warning);
        assert_eq!(report.issues[0].field, "birth_year");
    }

    #[test]
    fn test_implausible_birth_year_is_critical() {
        let engine = DataQualityEngine::new(YearBounds::new(2025));
        let mut entity = complete_entity();
        entity.birth_year = Some(2015);

        let report = engine.validate(&entity);
        assert!(report.has_critical_issues());
    }

    #[test]
    fn test_unknown_org_and_role() {
        let engine = DataQualityEngine::new(YearBounds::new(2025));
        let mut entity = complete_entity();
        entity.canonical_key = build_key("Yunus Musah", "");
        entity.org_name.clear();
        entity.role_code = RoleCode::Unknown;

        let report = engine.validate(&entity);
        assert_eq!(report.count(Severity::Warning), 1);
        assert_eq!(report.count(Severity::Info), 1);
    }

    #[test]
    fn test_sparse_entity_needs_review() {
        let engine = DataQualityEngine::new(YearBounds::new(2025));
        let entity = ResolvedEntity {
            canonical_key: build_key("Nicola Zalewski", ""),
            display_name: "Nicola Zalewski".to_string(),
            org_name: String::new(),
            role_code: RoleCode::Unknown,
            birth_year: None,
            performance_value: None,
            cost_value: None,
            provenance_trail: vec!["manual".to_string()],
        };

        let report = engine.validate(&entity);
        assert!(report.needs_review);
        assert_eq!(report.failed_count, 5);
    }

    #[test]
    fn test_audit_summary() {
        let engine = DataQualityEngine::new(YearBounds::new(2025));
        let mut missing = complete_entity();
        missing.birth_year = None;

        let audit = engine.audit(&[complete_entity(), missing]);

        assert_eq!(audit.summary.total_entities, 2);
        assert_eq!(audit.summary.missing_birth_year, 1);
        assert_eq!(audit.summary.unknown_org, 0);
        assert!(audit.summary.summary().contains("2 entities"));
        assert!(audit.flagged().is_empty());
    }

    #[test]
    fn test_empty_roster_summary() {
        let engine = DataQualityEngine::new(YearBounds::new(2025));
        let audit = engine.audit(&[]);
        assert_eq!(audit.summary.total_entities, 0);
        assert_eq!(audit.summary.average_quality, 0.0);
    }
}
