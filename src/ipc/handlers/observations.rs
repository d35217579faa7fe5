use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const OBSERVATION_KINDS: [&str; 4] = ["positiva", "negativa", "neutra", "conducta"];

fn handle_observations_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let course_id = match req.params.get("courseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing courseId", None),
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let date = match req
        .params
        .get("date")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
    {
        Some(d) => d.format("%Y-%m-%d").to_string(),
        None => return err(&req.id, "bad_params", "date must be YYYY-MM-DD", None),
    };
    let kind = req
        .params
        .get("kind")
        .and_then(|v| v.as_str())
        .unwrap_or("neutra")
        .trim()
        .to_ascii_lowercase();
    if !OBSERVATION_KINDS.contains(&kind.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "kind must be positiva, negativa, neutra or conducta",
            Some(json!({ "kind": kind })),
        );
    }
    let text = match req.params.get("text").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing text", None),
    };
    let author = match req.params.get("author").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing author", None),
    };

    let known = match conn
        .query_row(
            "SELECT 1 FROM students WHERE course_id = ? AND id = ?",
            (&course_id, &student_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()
    {
        Ok(v) => v.is_some(),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if !known {
        return err(&req.id, "not_found", "student not found in course", None);
    }

    let observation_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO observations(id, course_id, student_id, date, kind, text, author)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &observation_id,
            &course_id,
            &student_id,
            &date,
            &kind,
            &text,
            &author,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "observations" })),
        );
    }

    ok(&req.id, json!({ "observationId": observation_id }))
}

fn handle_observations_list_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match req.params.get("courseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing courseId", None),
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, date, kind, text, author
         FROM observations
         WHERE course_id = ? AND student_id = ?
         ORDER BY date",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let observations = match stmt
        .query_map((&course_id, &student_id), |row| {
            let id: String = row.get(0)?;
            let date: String = row.get(1)?;
            let kind: String = row.get(2)?;
            let text: String = row.get(3)?;
            let author: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "date": date,
                "kind": kind,
                "text": text,
                "author": author
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "observations": observations }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "observations.create" => Some(handle_observations_create(state, req)),
        "observations.listForStudent" => Some(handle_observations_list_for_student(state, req)),
        _ => None,
    }
}
