use serde::{Deserialize, Serialize};

/// Chilean grading scale. Grades live on a fixed 1.0–7.0 axis and 4.0 is the
/// legal passing mark; these are constants of the educational system, not
/// per-course settings.
pub const GRADE_MIN: f64 = 1.0;
pub const GRADE_MAX: f64 = 7.0;
pub const GRADE_PASS: f64 = 4.0;

pub const MIN_EVALUATION_NAME_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    PrimerSemestre,
    SegundoSemestre,
    Anual,
}

impl Period {
    pub fn parse(s: &str) -> Option<Period> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primer_semestre" => Some(Period::PrimerSemestre),
            "segundo_semestre" => Some(Period::SegundoSemestre),
            "anual" => Some(Period::Anual),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Period::PrimerSemestre => "primer_semestre",
            Period::SegundoSemestre => "segundo_semestre",
            Period::Anual => "anual",
        }
    }

    /// Short label used on printed documents.
    pub fn short_label(self) -> &'static str {
        match self {
            Period::PrimerSemestre => "1° Sem",
            Period::SegundoSemestre => "2° Sem",
            Period::Anual => "Anual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationType {
    Prueba,
    Control,
    Trabajo,
    Tarea,
    Disertacion,
    Examen,
    Otro,
}

impl EvaluationType {
    pub fn parse(s: &str) -> Option<EvaluationType> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prueba" => Some(EvaluationType::Prueba),
            "control" => Some(EvaluationType::Control),
            "trabajo" => Some(EvaluationType::Trabajo),
            "tarea" => Some(EvaluationType::Tarea),
            "disertacion" | "disertación" => Some(EvaluationType::Disertacion),
            "examen" => Some(EvaluationType::Examen),
            "otro" => Some(EvaluationType::Otro),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationType::Prueba => "prueba",
            EvaluationType::Control => "control",
            EvaluationType::Trabajo => "trabajo",
            EvaluationType::Tarea => "tarea",
            EvaluationType::Disertacion => "disertacion",
            EvaluationType::Examen => "examen",
            EvaluationType::Otro => "otro",
        }
    }
}

/// Display label derived from a grade value. Presentation only; never stored.
pub fn status_label(grade: f64) -> &'static str {
    if grade >= 6.0 {
        "Excelente"
    } else if grade >= 5.0 {
        "Bueno"
    } else if grade >= GRADE_PASS {
        "Suficiente"
    } else {
        "Insuficiente"
    }
}

pub fn is_passing(grade: f64) -> bool {
    grade >= GRADE_PASS
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Raw submission as it arrives over the wire, before validation.
#[derive(Debug, Clone)]
pub struct GradeSubmission {
    pub date: String,
    pub subject: String,
    pub evaluation_type: String,
    pub evaluation_name: String,
    pub grade: f64,
    pub max_grade: f64,
    pub percentage: Option<f64>,
    pub period: String,
}

/// Validated submission with enums resolved.
#[derive(Debug, Clone)]
pub struct ValidGrade {
    pub date: String,
    pub subject: String,
    pub evaluation_type: EvaluationType,
    pub evaluation_name: String,
    pub grade: f64,
    pub max_grade: f64,
    pub percentage: Option<f64>,
    pub period: Period,
}

/// Checks the whole submission and reports every failing field at once, so
/// the shell can show inline errors in a single round trip. Nothing is
/// written unless this returns Ok.
pub fn validate_grade(sub: &GradeSubmission) -> Result<ValidGrade, Vec<FieldError>> {
    let mut errors: Vec<FieldError> = Vec::new();

    if chrono::NaiveDate::parse_from_str(sub.date.trim(), "%Y-%m-%d").is_err() {
        errors.push(FieldError {
            field: "date",
            message: "date must be YYYY-MM-DD".to_string(),
        });
    }

    if sub.subject.trim().is_empty() {
        errors.push(FieldError {
            field: "subject",
            message: "subject must not be empty".to_string(),
        });
    }

    let evaluation_type = EvaluationType::parse(&sub.evaluation_type);
    if evaluation_type.is_none() {
        errors.push(FieldError {
            field: "evaluationType",
            message: "unknown evaluation type".to_string(),
        });
    }

    let name = sub.evaluation_name.trim();
    if name.chars().count() < MIN_EVALUATION_NAME_LEN {
        errors.push(FieldError {
            field: "evaluationName",
            message: format!(
                "evaluation name must be at least {} characters",
                MIN_EVALUATION_NAME_LEN
            ),
        });
    }

    if !(GRADE_MIN..=GRADE_MAX).contains(&sub.grade) {
        errors.push(FieldError {
            field: "grade",
            message: format!("grade must be between {:.1} and {:.1}", GRADE_MIN, GRADE_MAX),
        });
    }
    if !(GRADE_MIN..=GRADE_MAX).contains(&sub.max_grade) {
        errors.push(FieldError {
            field: "maxGrade",
            message: format!(
                "max grade must be between {:.1} and {:.1}",
                GRADE_MIN, GRADE_MAX
            ),
        });
    }
    if sub.grade > sub.max_grade {
        errors.push(FieldError {
            field: "grade",
            message: "grade must not exceed max grade".to_string(),
        });
    }

    if let Some(p) = sub.percentage {
        if !(0.0..=100.0).contains(&p) {
            errors.push(FieldError {
                field: "percentage",
                message: "percentage must be between 0 and 100".to_string(),
            });
        }
    }

    let period = Period::parse(&sub.period);
    if period.is_none() {
        errors.push(FieldError {
            field: "period",
            message: "period must be primer_semestre, segundo_semestre or anual".to_string(),
        });
    }

    match (evaluation_type, period) {
        (Some(evaluation_type), Some(period)) if errors.is_empty() => Ok(ValidGrade {
            date: sub.date.trim().to_string(),
            subject: sub.subject.trim().to_string(),
            evaluation_type,
            evaluation_name: name.to_string(),
            grade: sub.grade,
            max_grade: sub.max_grade,
            percentage: sub.percentage,
            period,
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_submission() -> GradeSubmission {
        GradeSubmission {
            date: "2024-05-10".to_string(),
            subject: "Matemática".to_string(),
            evaluation_type: "prueba".to_string(),
            evaluation_name: "Prueba Unidad 3".to_string(),
            grade: 5.5,
            max_grade: 7.0,
            percentage: None,
            period: "primer_semestre".to_string(),
        }
    }

    #[test]
    fn status_labels_cover_the_scale() {
        assert_eq!(status_label(1.0), "Insuficiente");
        assert_eq!(status_label(3.9), "Insuficiente");
        assert_eq!(status_label(4.0), "Suficiente");
        assert_eq!(status_label(4.9), "Suficiente");
        assert_eq!(status_label(5.0), "Bueno");
        assert_eq!(status_label(5.9), "Bueno");
        assert_eq!(status_label(6.0), "Excelente");
        assert_eq!(status_label(7.0), "Excelente");
    }

    #[test]
    fn passing_threshold_is_4_0() {
        assert!(!is_passing(3.9));
        assert!(is_passing(4.0));
        assert!(is_passing(7.0));
    }

    #[test]
    fn accepts_valid_submission() {
        let v = validate_grade(&base_submission()).expect("valid");
        assert_eq!(v.evaluation_type, EvaluationType::Prueba);
        assert_eq!(v.period, Period::PrimerSemestre);
    }

    #[test]
    fn rejects_grade_above_max_grade() {
        let mut sub = base_submission();
        sub.grade = 6.5;
        sub.max_grade = 6.0;
        let errors = validate_grade(&sub).expect_err("grade > maxGrade");
        assert!(errors.iter().any(|e| e.field == "grade"));
    }

    #[test]
    fn rejects_out_of_scale_values() {
        let mut sub = base_submission();
        sub.grade = 0.5;
        sub.max_grade = 7.5;
        let errors = validate_grade(&sub).expect_err("out of scale");
        assert!(errors.iter().any(|e| e.field == "grade"));
        assert!(errors.iter().any(|e| e.field == "maxGrade"));
    }

    #[test]
    fn rejects_short_evaluation_name_and_bad_percentage() {
        let mut sub = base_submission();
        sub.evaluation_name = "ab".to_string();
        sub.percentage = Some(140.0);
        let errors = validate_grade(&sub).expect_err("invalid");
        assert!(errors.iter().any(|e| e.field == "evaluationName"));
        assert!(errors.iter().any(|e| e.field == "percentage"));
    }

    #[test]
    fn period_parse_is_case_insensitive() {
        assert_eq!(Period::parse("PRIMER_SEMESTRE"), Some(Period::PrimerSemestre));
        assert_eq!(Period::parse("Anual"), Some(Period::Anual));
        assert_eq!(Period::parse("trimestre"), None);
    }

    #[test]
    fn period_short_labels() {
        assert_eq!(Period::PrimerSemestre.short_label(), "1° Sem");
        assert_eq!(Period::SegundoSemestre.short_label(), "2° Sem");
        assert_eq!(Period::Anual.short_label(), "Anual");
    }
}
