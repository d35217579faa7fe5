use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_students_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let course_id = match req.params.get("courseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing courseId", None),
    };
    let last_name = match req.params.get("lastName").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing lastName", None),
    };
    let first_name = match req.params.get("firstName").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing firstName", None),
    };
    let parent_id = req
        .params
        .get("parentId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let capacity: Option<(i64, i64)> = match conn
        .query_row(
            "SELECT max_students,
                    (SELECT COUNT(*) FROM students s WHERE s.course_id = c.id)
             FROM courses c WHERE c.id = ?",
            [&course_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((max_students, enrolled)) = capacity else {
        return err(&req.id, "not_found", "course not found", None);
    };
    if enrolled >= max_students {
        return err(
            &req.id,
            "course_full",
            "course has reached its enrollment limit",
            Some(json!({ "maxStudents": max_students })),
        );
    }

    let student_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, course_id, last_name, first_name, parent_id, active, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, 1, ?, ?)",
        (
            &student_id,
            &course_id,
            &last_name,
            &first_name,
            &parent_id,
            enrolled,
            &now,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(
        &req.id,
        json!({
            "studentId": student_id,
            "displayName": format!("{}, {}", last_name, first_name)
        }),
    )
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match req.params.get("courseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing courseId", None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, last_name, first_name, parent_id, active, sort_order
         FROM students
         WHERE course_id = ?
         ORDER BY sort_order",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let students = match stmt
        .query_map([&course_id], |row| {
            let id: String = row.get(0)?;
            let last: String = row.get(1)?;
            let first: String = row.get(2)?;
            let parent_id: Option<String> = row.get(3)?;
            let active: i64 = row.get(4)?;
            let sort_order: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "displayName": format!("{}, {}", last, first),
                "parentId": parent_id,
                "active": active != 0,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "students": students }))
}

fn handle_students_set_active(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let active = match req.params.get("active").and_then(|v| v.as_bool()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing active", None),
    };

    let now = chrono::Utc::now().to_rfc3339();
    let updated = match conn.execute(
        "UPDATE students SET active = ?, updated_at = ? WHERE course_id = ? AND id = ?",
        (active as i64, &now, &course_id, &student_id),
    ) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            )
        }
    };
    if updated == 0 {
        return err(&req.id, "not_found", "student not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.enroll" => Some(handle_students_enroll(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.setActive" => Some(handle_students_set_active(state, req)),
        _ => None,
    }
}
