use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_content_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let course_id = match req.params.get("courseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing courseId", None),
    };
    let subject = match req.params.get("subject").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing subject", None),
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
    let topic = match req.params.get("topic").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing topic", None),
    };
    let activities = req
        .params
        .get("activities")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let teacher_id = match req.params.get("teacherId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing teacherId", None),
    };

    let content_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO class_content(id, course_id, subject, date, topic, activities, teacher_id)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &content_id,
            &course_id,
            &subject,
            &date,
            &topic,
            &activities,
            &teacher_id,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "class_content" })),
        );
    }

    ok(&req.id, json!({ "contentId": content_id }))
}

fn handle_content_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match req.params.get("courseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing courseId", None),
    };
    let subject = req
        .params
        .get("subject")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let mut stmt = match conn.prepare(
        "SELECT id, subject, date, topic, activities, teacher_id
         FROM class_content
         WHERE course_id = ?1 AND (?2 IS NULL OR subject = ?2)
         ORDER BY date",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let entries = match stmt
        .query_map((&course_id, &subject), |row| {
            let id: String = row.get(0)?;
            let subject: String = row.get(1)?;
            let date: String = row.get(2)?;
            let topic: String = row.get(3)?;
            let activities: String = row.get(4)?;
            let teacher_id: String = row.get(5)?;
            Ok(json!({
                "id": id,
                "subject": subject,
                "date": date,
                "topic": topic,
                "activities": activities,
                "teacherId": teacher_id
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "entries": entries }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "content.record" => Some(handle_content_record(state, req)),
        "content.list" => Some(handle_content_list(state, req)),
        _ => None,
    }
}
