use chrono::{DateTime, Utc};

use super::domain::{CaseStudyId, Grade};

pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 18.0;

/// Grade bands of the 18 point scale, highest first. Lower bounds are inclusive.
const GRADE_BANDS: [(f64, &str); 7] = [
    (16.0, "sehr gut"),
    (13.0, "gut"),
    (10.0, "vollbefriedigend"),
    (7.0, "befriedigend"),
    (4.0, "ausreichend"),
    (1.0, "mangelhaft"),
    (0.0, "ungenügend"),
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradeError {
    #[error("grade {0} is outside the 0-18 point scale")]
    InvalidGrade(f64),
}

/// Describe a point value with the fixed wording of the 18 point scale.
///
/// Fractional values fall into the band of their integer floor, so 15.5 reads as "gut".
/// Values outside the scale are clamped; callers validate first.
pub fn describe(value: f64) -> &'static str {
    let clamped = value.clamp(MIN_GRADE, MAX_GRADE).floor();
    GRADE_BANDS
        .iter()
        .find(|(lower, _)| clamped >= *lower)
        .map(|(_, label)| *label)
        .unwrap_or("ungenügend")
}

pub fn validate(value: f64) -> Result<f64, GradeError> {
    if value.is_finite() && (MIN_GRADE..=MAX_GRADE).contains(&value) {
        Ok(value)
    } else {
        Err(GradeError::InvalidGrade(value))
    }
}

/// Build the grade to persist for a `saveGrade` call.
///
/// A missing value clears the grade. A present value always carries the table description;
/// non-blank text is kept as the instructor's comment.
pub fn evaluate(
    case_study_id: &CaseStudyId,
    value: Option<f64>,
    text: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Grade, GradeError> {
    let Some(value) = value else {
        return Ok(Grade {
            case_study_id: case_study_id.clone(),
            value: None,
            description: None,
            comment: None,
            updated_at: now,
        });
    };

    let value = validate(value)?;
    let comment = text
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    Ok(Grade {
        case_study_id: case_study_id.clone(),
        value: Some(value),
        description: Some(describe(value).to_string()),
        comment,
        updated_at: now,
    })
}
