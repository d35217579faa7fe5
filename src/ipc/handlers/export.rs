use crate::backup::sha256_hex;
use crate::grading::Period;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::libro::{
    self, AttendanceEntry, AttendanceStatus, ContentEntry, CourseInfo, GradeEntry,
    LibroClasesData, MeetingEntry, ObservationEntry, Section,
};
use crate::pdf;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::path::PathBuf;

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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportScope {
    FullYear,
    Semester,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    Pdf,
    Html,
}

impl ExportFormat {
    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Html => "html",
        }
    }
}

/// Calendar window for a semester of the Chilean school year. Grades carry
/// their period explicitly; date-keyed records (attendance, content,
/// observations, meetings) are windowed by these bounds instead.
fn semester_window(period: Period, academic_year: i64) -> Option<(String, String)> {
    match period {
        Period::PrimerSemestre => Some((
            format!("{}-03-01", academic_year),
            format!("{}-07-31", academic_year),
        )),
        Period::SegundoSemestre => Some((
            format!("{}-08-01", academic_year),
            format!("{}-12-31", academic_year),
        )),
        Period::Anual => None,
    }
}

struct ExportRequest {
    course_id: String,
    scope: ExportScope,
    period: Option<Period>,
    student_id: Option<String>,
    format: ExportFormat,
    out_path: Option<PathBuf>,
}

fn parse_export_request(params: &serde_json::Value) -> Result<ExportRequest, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;

    let scope_raw = params
        .get("scope")
        .and_then(|v| v.as_str())
        .unwrap_or("full_year")
        .to_ascii_lowercase();
    // "course" is the whole-course book, same coverage as the full year.
    let scope = match scope_raw.as_str() {
        "full_year" | "course" => ExportScope::FullYear,
        "semester" => ExportScope::Semester,
        "student" => ExportScope::Student,
        other => {
            return Err(HandlerErr {
                code: "bad_params",
                message: "scope must be full_year, semester, student or course".to_string(),
                details: Some(json!({ "scope": other })),
            })
        }
    };

    let period = match params.get("period").and_then(|v| v.as_str()) {
        Some(raw) => Some(Period::parse(raw).ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "period must be primer_semestre, segundo_semestre or anual".to_string(),
            details: Some(json!({ "period": raw })),
        })?),
        None => None,
    };
    if scope == ExportScope::Semester && period.is_none() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "semester scope requires a period".to_string(),
            details: None,
        });
    }

    let student_id = params
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    if scope == ExportScope::Student && student_id.is_none() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "student scope requires a studentId".to_string(),
            details: None,
        });
    }

    let format = match params
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("pdf")
        .to_ascii_lowercase()
        .as_str()
    {
        "pdf" => ExportFormat::Pdf,
        "html" => ExportFormat::Html,
        other => {
            return Err(HandlerErr {
                code: "bad_params",
                message: "format must be pdf or html".to_string(),
                details: Some(json!({ "format": other })),
            })
        }
    };

    let out_path = params
        .get("outPath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);

    Ok(ExportRequest {
        course_id,
        scope,
        period,
        student_id,
        format,
        out_path,
    })
}

struct CourseRow {
    name: String,
    grade_label: String,
    section: String,
    teacher_id: String,
    academic_year: i64,
}

fn load_course(conn: &Connection, course_id: &str) -> Result<CourseRow, HandlerErr> {
    conn.query_row(
        "SELECT name, grade_label, section, teacher_id, academic_year
         FROM courses WHERE id = ?",
        [course_id],
        |row| {
            Ok(CourseRow {
                name: row.get(0)?,
                grade_label: row.get(1)?,
                section: row.get(2)?,
                teacher_id: row.get(3)?,
                academic_year: row.get(4)?,
            })
        },
    )
    .optional()
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?
    .ok_or_else(|| HandlerErr {
        code: "not_found",
        message: "course not found".to_string(),
        details: None,
    })
}

fn db_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    }
}

fn gather_attendance(
    conn: &Connection,
    course_id: &str,
    student_id: Option<&str>,
    window: Option<&(String, String)>,
) -> Result<Vec<AttendanceEntry>, HandlerErr> {
    let (from, to) = match window {
        Some((f, t)) => (Some(f.clone()), Some(t.clone())),
        None => (None, None),
    };
    let mut stmt = conn
        .prepare(
            "SELECT a.date, s.last_name, s.first_name, a.status, a.note
             FROM attendance_days a
             JOIN students s ON s.id = a.student_id
             WHERE a.course_id = ?1
               AND (?2 IS NULL OR a.student_id = ?2)
               AND (?3 IS NULL OR a.date >= ?3)
               AND (?4 IS NULL OR a.date <= ?4)
             ORDER BY a.date, s.sort_order",
        )
        .map_err(db_err)?;
    stmt.query_map((course_id, student_id, &from, &to), |row| {
        let date: String = row.get(0)?;
        let last: String = row.get(1)?;
        let first: String = row.get(2)?;
        let status_raw: String = row.get(3)?;
        let note: Option<String> = row.get(4)?;
        Ok(AttendanceEntry {
            date,
            student_name: format!("{}, {}", last, first),
            status: AttendanceStatus::parse(&status_raw).unwrap_or(AttendanceStatus::Ausente),
            note,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

fn gather_grades(
    conn: &Connection,
    course_id: &str,
    student_id: Option<&str>,
    period: Option<Period>,
) -> Result<Vec<GradeEntry>, HandlerErr> {
    let period_str = period.map(|p| p.as_str().to_string());
    let mut stmt = conn
        .prepare(
            "SELECT g.date, s.last_name, s.first_name, g.subject, g.evaluation_name, g.grade, g.period
             FROM grades g
             JOIN students s ON s.id = g.student_id
             WHERE g.course_id = ?1
               AND (?2 IS NULL OR g.student_id = ?2)
               AND (?3 IS NULL OR g.period = ?3)
             ORDER BY g.date, s.sort_order",
        )
        .map_err(db_err)?;
    stmt.query_map((course_id, student_id, &period_str), |row| {
        let date: String = row.get(0)?;
        let last: String = row.get(1)?;
        let first: String = row.get(2)?;
        let subject: String = row.get(3)?;
        let evaluation_name: String = row.get(4)?;
        let grade: f64 = row.get(5)?;
        let period_raw: String = row.get(6)?;
        Ok(GradeEntry {
            date,
            student_name: format!("{}, {}", last, first),
            subject,
            evaluation_name,
            grade,
            period: Period::parse(&period_raw).unwrap_or(Period::Anual),
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

fn gather_observations(
    conn: &Connection,
    course_id: &str,
    student_id: Option<&str>,
    window: Option<&(String, String)>,
) -> Result<Vec<ObservationEntry>, HandlerErr> {
    let (from, to) = match window {
        Some((f, t)) => (Some(f.clone()), Some(t.clone())),
        None => (None, None),
    };
    let mut stmt = conn
        .prepare(
            "SELECT o.date, s.last_name, s.first_name, o.kind, o.text, o.author
             FROM observations o
             JOIN students s ON s.id = o.student_id
             WHERE o.course_id = ?1
               AND (?2 IS NULL OR o.student_id = ?2)
               AND (?3 IS NULL OR o.date >= ?3)
               AND (?4 IS NULL OR o.date <= ?4)
             ORDER BY o.date",
        )
        .map_err(db_err)?;
    stmt.query_map((course_id, student_id, &from, &to), |row| {
        let date: String = row.get(0)?;
        let last: String = row.get(1)?;
        let first: String = row.get(2)?;
        let kind: String = row.get(3)?;
        let text: String = row.get(4)?;
        let author: String = row.get(5)?;
        Ok(ObservationEntry {
            date,
            student_name: format!("{}, {}", last, first),
            kind,
            text,
            author,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

fn gather_content(
    conn: &Connection,
    course_id: &str,
    window: Option<&(String, String)>,
) -> Result<Vec<ContentEntry>, HandlerErr> {
    let (from, to) = match window {
        Some((f, t)) => (Some(f.clone()), Some(t.clone())),
        None => (None, None),
    };
    let mut stmt = conn
        .prepare(
            "SELECT date, subject, topic, activities
             FROM class_content
             WHERE course_id = ?1
               AND (?2 IS NULL OR date >= ?2)
               AND (?3 IS NULL OR date <= ?3)
             ORDER BY date",
        )
        .map_err(db_err)?;
    stmt.query_map((course_id, &from, &to), |row| {
        Ok(ContentEntry {
            date: row.get(0)?,
            subject: row.get(1)?,
            topic: row.get(2)?,
            activities: row.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

fn gather_meetings(
    conn: &Connection,
    course_id: &str,
    student_id: Option<&str>,
    window: Option<&(String, String)>,
) -> Result<Vec<MeetingEntry>, HandlerErr> {
    let (from, to) = match window {
        Some((f, t)) => (Some(f.clone()), Some(t.clone())),
        None => (None, None),
    };
    let mut stmt = conn
        .prepare(
            "SELECT m.meeting_date, m.meeting_number, s.last_name, s.first_name, m.attended, m.representative_name, m.relationship, m.agreements
             FROM meeting_records m
             JOIN students s ON s.id = m.student_id
             WHERE m.course_id = ?1
               AND (?2 IS NULL OR m.student_id = ?2)
               AND (?3 IS NULL OR m.meeting_date >= ?3)
               AND (?4 IS NULL OR m.meeting_date <= ?4)
             ORDER BY m.meeting_date, m.meeting_number, s.sort_order",
        )
        .map_err(db_err)?;
    stmt.query_map((course_id, student_id, &from, &to), |row| {
        let meeting_date: String = row.get(0)?;
        let meeting_number: i64 = row.get(1)?;
        let last: String = row.get(2)?;
        let first: String = row.get(3)?;
        let attended: i64 = row.get(4)?;
        let representative_name: Option<String> = row.get(5)?;
        let relationship: Option<String> = row.get(6)?;
        let agreements: Option<String> = row.get(7)?;
        Ok(MeetingEntry {
            meeting_date,
            meeting_number,
            student_name: format!("{}, {}", last, first),
            attended: attended != 0,
            representative_name,
            relationship,
            agreements,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

fn scope_label(req: &ExportRequest, student_name: Option<&str>) -> String {
    match req.scope {
        ExportScope::FullYear => "Año completo".to_string(),
        ExportScope::Semester => req
            .period
            .map(|p| p.short_label().to_string())
            .unwrap_or_else(|| "Semestre".to_string()),
        ExportScope::Student => match student_name {
            Some(n) => format!("Estudiante: {}", n),
            None => "Estudiante".to_string(),
        },
    }
}

fn file_stem(course_name: &str) -> String {
    let slug: String = course_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "libro_clases_{}_{}",
        slug,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

fn handle_export_libro(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let export = match parse_export_request(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let course = match load_course(conn, &export.course_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let enrolled: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM students WHERE course_id = ?",
        [&export.course_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let student_filter = export.student_id.as_deref();
    let student_name: Option<String> = match student_filter {
        Some(sid) => {
            match conn
                .query_row(
                    "SELECT last_name, first_name FROM students WHERE course_id = ? AND id = ?",
                    (&export.course_id, sid),
                    |r| {
                        let last: String = r.get(0)?;
                        let first: String = r.get(1)?;
                        Ok(format!("{}, {}", last, first))
                    },
                )
                .optional()
            {
                Ok(Some(v)) => Some(v),
                Ok(None) => return err(&req.id, "not_found", "student not found in course", None),
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            }
        }
        None => None,
    };

    let window = export
        .period
        .and_then(|p| semester_window(p, course.academic_year));

    let attendance = match gather_attendance(conn, &export.course_id, student_filter, window.as_ref())
    {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let grades = match gather_grades(conn, &export.course_id, student_filter, export.period) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let observations =
        match gather_observations(conn, &export.course_id, student_filter, window.as_ref()) {
            Ok(v) => v,
            Err(e) => return e.response(&req.id),
        };
    let class_content = match gather_content(conn, &export.course_id, window.as_ref()) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let meetings = match gather_meetings(conn, &export.course_id, student_filter, window.as_ref()) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let data = LibroClasesData {
        school: state.school.clone(),
        course: CourseInfo {
            name: course.name.clone(),
            grade_label: course.grade_label,
            section: course.section,
            teacher_id: course.teacher_id,
            academic_year: course.academic_year,
            enrolled: enrolled as usize,
        },
        scope_label: scope_label(&export, student_name.as_deref()),
        generated_at: chrono::Local::now().format("%d-%m-%Y %H:%M").to_string(),
        attendance: Section::from_vec(attendance),
        grades: Section::from_vec(grades),
        observations: Section::from_vec(observations),
        class_content: Section::from_vec(class_content),
        meetings: Section::from_vec(meetings),
    };

    let html = libro::build_html(&data);

    let bytes: Vec<u8> = match export.format {
        ExportFormat::Html => html.into_bytes(),
        ExportFormat::Pdf => match pdf::render_html(&html) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "libro de clases render failed");
                return err(&req.id, "export_failed", format!("{e:#}"), None);
            }
        },
    };

    let out_path = export.out_path.clone().unwrap_or_else(|| {
        workspace
            .join("exports")
            .join(format!("{}.{}", file_stem(&course.name), export.format.extension()))
    });
    if let Some(parent) = out_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(&req.id, "export_failed", e.to_string(), None);
        }
    }
    if let Err(e) = std::fs::write(&out_path, &bytes) {
        return err(&req.id, "export_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "path": out_path.to_string_lossy(),
            "bytes": bytes.len(),
            "sha256": sha256_hex(&bytes),
            "format": export.format.extension(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "export.libroClases" => Some(handle_export_libro(state, req)),
        _ => None,
    }
}
