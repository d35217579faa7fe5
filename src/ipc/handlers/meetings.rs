use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const DEFAULT_HISTORY_LIMIT: i64 = 10;

const RELATIONSHIPS: [&str; 10] = [
    "madre", "padre", "abuela", "abuelo", "tia", "tio", "hermana", "hermano", "tutor", "otro",
];

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

#[derive(Debug, Clone)]
struct MeetingEntry {
    student_id: String,
    parent_id: Option<String>,
    attended: bool,
    representative_name: Option<String>,
    relationship: Option<String>,
    observations: Option<String>,
    agreements: Option<String>,
}

/// Centralized bulk-save validation: one place decides what a well-formed
/// meeting batch is. A batch needs a real meeting date, a positive meeting
/// number and at least one entry with its attendance state set; anything
/// less is rejected before the transaction starts.
fn validate_bulk(
    params: &serde_json::Value,
) -> Result<(String, i64, Vec<MeetingEntry>), HandlerErr> {
    let date_raw = get_required_str(params, "meetingDate").map_err(|_| HandlerErr {
        code: "validation_failed",
        message: "a meeting date must be selected".to_string(),
        details: None,
    })?;
    let meeting_date = chrono::NaiveDate::parse_from_str(date_raw.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| HandlerErr {
            code: "validation_failed",
            message: "meeting date must be YYYY-MM-DD".to_string(),
            details: None,
        })?;

    let meeting_number = params
        .get("meetingNumber")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing meetingNumber".to_string(),
            details: None,
        })?;
    if meeting_number <= 0 {
        return Err(HandlerErr {
            code: "bad_params",
            message: "meetingNumber must be positive".to_string(),
            details: None,
        });
    }

    let Some(entries_json) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing entries".to_string(),
            details: None,
        });
    };

    let mut entries: Vec<MeetingEntry> = Vec::with_capacity(entries_json.len());
    for (i, entry) in entries_json.iter().enumerate() {
        let student_id = entry
            .get("studentId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr {
                code: "bad_params",
                message: format!("entries[{}] missing studentId", i),
                details: None,
            })?;
        // Entries without an attendance state are pre-fill leftovers from
        // the form; they are not persisted.
        let Some(attended) = entry.get("attended").and_then(|v| v.as_bool()) else {
            continue;
        };
        let relationship = entry
            .get("relationship")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_ascii_lowercase());
        if let Some(ref rel) = relationship {
            if !RELATIONSHIPS.contains(&rel.as_str()) {
                return Err(HandlerErr {
                    code: "bad_params",
                    message: format!("entries[{}] has an unknown relationship", i),
                    details: Some(json!({ "relationship": rel })),
                });
            }
        }
        entries.push(MeetingEntry {
            student_id: student_id.to_string(),
            parent_id: entry
                .get("parentId")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            attended,
            representative_name: entry
                .get("representativeName")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            relationship,
            observations: entry
                .get("observations")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            agreements: entry
                .get("agreements")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        });
    }

    if entries.is_empty() {
        return Err(HandlerErr {
            code: "validation_failed",
            message: "mark attendance for at least one student before saving".to_string(),
            details: None,
        });
    }

    Ok((meeting_date, meeting_number, entries))
}

fn meetings_bulk_record(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let registered_by = get_required_str(params, "registeredBy")?;
    let (meeting_date, meeting_number, entries) = validate_bulk(params)?;

    let course_known = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [&course_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?
        .is_some();
    if !course_known {
        return Err(HandlerErr {
            code: "not_found",
            message: "course not found".to_string(),
            details: None,
        });
    }

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
        details: None,
    })?;
    let mut recorded = 0usize;
    let mut skipped = 0usize;
    for entry in &entries {
        let exists = tx
            .query_row(
                "SELECT 1 FROM students WHERE course_id = ? AND id = ?",
                (&course_id, &entry.student_id),
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
        let record_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO meeting_records(id, course_id, student_id, parent_id, meeting_date, meeting_number, attended, representative_name, relationship, observations, agreements, registered_by)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(course_id, student_id, meeting_date, meeting_number) DO UPDATE SET
               parent_id = excluded.parent_id,
               attended = excluded.attended,
               representative_name = excluded.representative_name,
               relationship = excluded.relationship,
               observations = excluded.observations,
               agreements = excluded.agreements,
               registered_by = excluded.registered_by",
            rusqlite::params![
                &record_id,
                &course_id,
                &entry.student_id,
                &entry.parent_id,
                &meeting_date,
                meeting_number,
                entry.attended as i64,
                &entry.representative_name,
                &entry.relationship,
                &entry.observations,
                &entry.agreements,
                &registered_by,
            ],
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "meeting_records" })),
        })?;
        recorded += 1;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
        details: None,
    })?;

    Ok(json!({
        "recorded": recorded,
        "skipped": skipped,
        "meetingDate": meeting_date,
        "meetingNumber": meeting_number
    }))
}

fn meetings_history(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;
    let limit = params
        .get("limit")
        .and_then(|v| v.as_i64())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_HISTORY_LIMIT);

    // One row per meeting session, newest first.
    let mut stmt = conn
        .prepare(
            "SELECT meeting_date, meeting_number,
                    COUNT(*) AS total,
                    SUM(attended) AS attended
             FROM meeting_records
             WHERE course_id = ?
             GROUP BY meeting_date, meeting_number
             ORDER BY meeting_date DESC, meeting_number DESC
             LIMIT ?",
        )
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let meetings = stmt
        .query_map((&course_id, limit), |row| {
            let meeting_date: String = row.get(0)?;
            let meeting_number: i64 = row.get(1)?;
            let total: i64 = row.get(2)?;
            let attended: i64 = row.get(3)?;
            let pct = if total > 0 {
                100.0 * attended as f64 / total as f64
            } else {
                0.0
            };
            Ok(json!({
                "meetingDate": meeting_date,
                "meetingNumber": meeting_number,
                "totalRecords": total,
                "attendedCount": attended,
                "attendancePercent": pct
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    Ok(json!({ "meetings": meetings }))
}

fn meetings_statistics(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let course_id = get_required_str(params, "courseId")?;

    // Average of per-meeting attendance percentages, not of raw records, so
    // a small meeting weighs the same as a full one.
    let row: Option<(i64, f64)> = conn
        .query_row(
            "SELECT COUNT(*), COALESCE(AVG(pct), 0.0)
             FROM (
               SELECT 100.0 * SUM(attended) / COUNT(*) AS pct
               FROM meeting_records
               WHERE course_id = ?
               GROUP BY meeting_date, meeting_number
             )",
            [&course_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    let (total_meetings, average_attendance) = row.unwrap_or((0, 0.0));

    Ok(json!({
        "totalMeetings": total_meetings,
        "averageAttendance": average_attendance
    }))
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
        "meetings.bulkRecord" => Some(with_conn(state, req, meetings_bulk_record)),
        "meetings.history" => Some(with_conn(state, req, meetings_history)),
        "meetings.statistics" => Some(with_conn(state, req, meetings_statistics)),
        _ => None,
    }
}
