use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::libro::AttendanceStatus;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

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

fn parse_iso_date(raw: &str, field: &str) -> Result<String, HandlerErr> {
    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| HandlerErr {
            code: "bad_params",
            message: format!("{} must be YYYY-MM-DD", field),
            details: None,
        })
}

fn course_exists(conn: &Connection, course_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })
}

fn attendance_record_day(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let date = parse_iso_date(&get_required_str(params, "date")?, "date")?;
    let registered_by = get_required_str(params, "registeredBy")?;

    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing entries".to_string(),
            details: None,
        });
    };
    if entries.is_empty() {
        return Err(HandlerErr {
            code: "validation_failed",
            message: "at least one attendance entry is required".to_string(),
            details: None,
        });
    }

    if !course_exists(conn, &course_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "course not found".to_string(),
            details: None,
        });
    }

    // Resolve statuses up front so a bad entry rejects the whole batch
    // before the transaction starts.
    let mut resolved: Vec<(String, AttendanceStatus, Option<String>)> =
        Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let student_id = entry
            .get("studentId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr {
                code: "bad_params",
                message: format!("entries[{}] missing studentId", i),
                details: None,
            })?;
        let status_raw = entry
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr {
                code: "bad_params",
                message: format!("entries[{}] missing status", i),
                details: None,
            })?;
        let status = AttendanceStatus::parse(status_raw).ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!(
                "entries[{}] status must be presente, ausente, atrasado, justificado or retirado",
                i
            ),
            details: Some(json!({ "status": status_raw })),
        })?;
        let note = entry
            .get("note")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        resolved.push((student_id.to_string(), status, note));
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    let mut recorded = 0usize;
    let mut skipped = 0usize;
    for (student_id, status, note) in &resolved {
        let exists = tx
            .query_row(
                "SELECT 1 FROM students WHERE course_id = ? AND id = ?",
                (&course_id, student_id),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map_err(|e| HandlerErr {
                code: "db_query_failed",
                message: e.to_string(),
                details: None,
            })?
            .is_some();
        if !exists {
            skipped += 1;
            continue;
        }
        tx.execute(
            "INSERT INTO attendance_days(course_id, student_id, date, status, note, registered_by)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(course_id, student_id, date) DO UPDATE SET
               status = excluded.status,
               note = excluded.note,
               registered_by = excluded.registered_by",
            (
                &course_id,
                student_id,
                &date,
                status.as_str(),
                note,
                &registered_by,
            ),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "attendance_days" })),
        })?;
        recorded += 1;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({ "recorded": recorded, "skipped": skipped, "date": date }))
}

fn attendance_list_for_course(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let from = match params.get("from").and_then(|v| v.as_str()) {
        Some(raw) => Some(parse_iso_date(raw, "from")?),
        None => None,
    };
    let to = match params.get("to").and_then(|v| v.as_str()) {
        Some(raw) => Some(parse_iso_date(raw, "to")?),
        None => None,
    };

    if !course_exists(conn, &course_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "course not found".to_string(),
            details: None,
        });
    }

    let mut stmt = conn
        .prepare(
            "SELECT a.date, a.student_id, s.last_name, s.first_name, a.status, a.note
             FROM attendance_days a
             JOIN students s ON s.id = a.student_id
             WHERE a.course_id = ?1
               AND (?2 IS NULL OR a.date >= ?2)
               AND (?3 IS NULL OR a.date <= ?3)
             ORDER BY a.date, s.sort_order",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let days = stmt
        .query_map((&course_id, &from, &to), |row| {
            let date: String = row.get(0)?;
            let student_id: String = row.get(1)?;
            let last: String = row.get(2)?;
            let first: String = row.get(3)?;
            let status: String = row.get(4)?;
            let note: Option<String> = row.get(5)?;
            Ok(json!({
                "date": date,
                "studentId": student_id,
                "displayName": format!("{}, {}", last, first),
                "status": status,
                "note": note
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    Ok(json!({ "records": days }))
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
        "attendance.recordDay" => Some(with_conn(state, req, attendance_record_day)),
        "attendance.listForCourse" => Some(with_conn(state, req, attendance_list_for_course)),
        _ => None,
    }
}
