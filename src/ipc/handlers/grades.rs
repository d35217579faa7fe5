use crate::grading::{self, GradeSubmission};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn get_required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn student_in_course(
    conn: &Connection,
    course_id: &str,
    student_id: &str,
) -> Result<bool, HandlerErr> {
    conn.query_row(
        "SELECT 1 FROM students WHERE course_id = ? AND id = ?",
        (course_id, student_id),
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })
}

fn grades_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let student_id = get_required_str(params, "studentId")?;
    let teacher_id = get_required_str(params, "teacherId")?;

    let submission = GradeSubmission {
        date: get_required_str(params, "date")?,
        subject: get_required_str(params, "subject")?,
        evaluation_type: get_required_str(params, "evaluationType")?,
        evaluation_name: get_required_str(params, "evaluationName")?,
        grade: get_required_f64(params, "grade")?,
        max_grade: get_required_f64(params, "maxGrade")?,
        percentage: params.get("percentage").and_then(|v| v.as_f64()),
        period: get_required_str(params, "period")?,
    };
    let comments = params
        .get("comments")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    // All field checks run before any write; a failure reports every bad
    // field at once.
    let valid = grading::validate_grade(&submission).map_err(|fields| HandlerErr {
        code: "validation_failed",
        message: "grade submission rejected".to_string(),
        details: Some(json!({ "fields": fields })),
    })?;

    if !student_in_course(conn, &course_id, &student_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found in course".to_string(),
            details: None,
        });
    }

    let grade_id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO grades(id, course_id, student_id, subject, evaluation_type, evaluation_name, date, grade, max_grade, percentage, period, comments, teacher_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &grade_id,
            &course_id,
            &student_id,
            &valid.subject,
            valid.evaluation_type.as_str(),
            &valid.evaluation_name,
            &valid.date,
            valid.grade,
            valid.max_grade,
            valid.percentage,
            valid.period.as_str(),
            &comments,
            &teacher_id,
            &created_at,
        ],
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "grades" })),
    })?;

    Ok(json!({
        "gradeId": grade_id,
        "status": grading::status_label(valid.grade),
        "passing": grading::is_passing(valid.grade)
    }))
}

fn grade_row_json(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let student_id: String = row.get(1)?;
    let subject: String = row.get(2)?;
    let evaluation_type: String = row.get(3)?;
    let evaluation_name: String = row.get(4)?;
    let date: String = row.get(5)?;
    let grade: f64 = row.get(6)?;
    let max_grade: f64 = row.get(7)?;
    let percentage: Option<f64> = row.get(8)?;
    let period: String = row.get(9)?;
    let comments: Option<String> = row.get(10)?;
    let teacher_id: String = row.get(11)?;
    Ok(json!({
        "id": id,
        "studentId": student_id,
        "subject": subject,
        "evaluationType": evaluation_type,
        "evaluationName": evaluation_name,
        "date": date,
        "grade": grade,
        "maxGrade": max_grade,
        "percentage": percentage,
        "period": period,
        "comments": comments,
        "teacherId": teacher_id,
        "status": grading::status_label(grade)
    }))
}

fn grades_list_for_student(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let student_id = get_required_str(params, "studentId")?;

    let mut stmt = conn
        .prepare(
            "SELECT id, student_id, subject, evaluation_type, evaluation_name, date, grade, max_grade, percentage, period, comments, teacher_id
             FROM grades
             WHERE course_id = ? AND student_id = ?
             ORDER BY date, created_at",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let grades = stmt
        .query_map((&course_id, &student_id), grade_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    Ok(json!({ "grades": grades }))
}

fn grades_list_for_course(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let period = params
        .get("period")
        .and_then(|v| v.as_str())
        .map(|s| s.to_ascii_lowercase());
    if let Some(ref p) = period {
        if grading::Period::parse(p).is_none() {
            return Err(HandlerErr {
                code: "bad_params",
                message: "period must be primer_semestre, segundo_semestre or anual".to_string(),
                details: None,
            });
        }
    }

    let sql = if period.is_some() {
        "SELECT id, student_id, subject, evaluation_type, evaluation_name, date, grade, max_grade, percentage, period, comments, teacher_id
         FROM grades WHERE course_id = ? AND period = ? ORDER BY date, created_at"
    } else {
        "SELECT id, student_id, subject, evaluation_type, evaluation_name, date, grade, max_grade, percentage, period, comments, teacher_id
         FROM grades WHERE course_id = ? ORDER BY date, created_at"
    };
    let mut stmt = conn.prepare(sql).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;

    let grades = match period {
        Some(p) => stmt
            .query_map((&course_id, &p), grade_row_json)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([&course_id], grade_row_json)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({ "grades": grades }))
}

fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.create" => Some(with_conn(state, req, grades_create)),
        "grades.listForStudent" => Some(with_conn(state, req, grades_list_for_student)),
        "grades.listForCourse" => Some(with_conn(state, req, grades_list_for_course)),
        _ => None,
    }
}
