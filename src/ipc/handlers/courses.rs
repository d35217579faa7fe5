use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };

    // Correlated subquery for the count; joins would double-count.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.grade_label,
           c.section,
           c.level,
           c.academic_year,
           c.is_active,
           (SELECT COUNT(*) FROM students s WHERE s.course_id = c.id) AS student_count
         FROM courses c
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let grade_label: String = row.get(2)?;
            let section: String = row.get(3)?;
            let level: String = row.get(4)?;
            let academic_year: i64 = row.get(5)?;
            let is_active: i64 = row.get(6)?;
            let student_count: i64 = row.get(7)?;
            Ok(json!({
                "id": id,
                "name": name,
                "gradeLabel": grade_label,
                "section": section,
                "level": level,
                "academicYear": academic_year,
                "isActive": is_active != 0,
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "name must not be empty", None);
    }
    let grade_label = req
        .params
        .get("gradeLabel")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let section = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .unwrap_or("A")
        .trim()
        .to_string();
    let level = req
        .params
        .get("level")
        .and_then(|v| v.as_str())
        .unwrap_or("basica")
        .trim()
        .to_string();
    let subjects = req
        .params
        .get("subjects")
        .cloned()
        .unwrap_or_else(|| json!([]));
    if !subjects.is_array() {
        return err(&req.id, "bad_params", "subjects must be an array", None);
    }
    let max_students = req
        .params
        .get("maxStudents")
        .and_then(|v| v.as_i64())
        .unwrap_or(45);
    if max_students <= 0 {
        return err(&req.id, "bad_params", "maxStudents must be positive", None);
    }
    let teacher_id = req
        .params
        .get("teacherId")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let academic_year = match req.params.get("academicYear").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing academicYear", None),
    };

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, name, grade_label, section, level, subjects, max_students, teacher_id, academic_year, is_active)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, 1)",
        (
            &course_id,
            &name,
            &grade_label,
            &section,
            &level,
            &subjects.to_string(),
            max_students,
            &teacher_id,
            academic_year,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    ok(&req.id, json!({ "courseId": course_id, "name": name }))
}

fn handle_courses_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match req.params.get("courseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing courseId", None),
    };

    let course_row: Option<serde_json::Value> = match conn
        .query_row(
            "SELECT id, name, grade_label, section, level, subjects, max_students, teacher_id, academic_year, is_active
             FROM courses WHERE id = ?",
            [&course_id],
            |row| {
                let id: String = row.get(0)?;
                let name: String = row.get(1)?;
                let grade_label: String = row.get(2)?;
                let section: String = row.get(3)?;
                let level: String = row.get(4)?;
                let subjects_raw: String = row.get(5)?;
                let max_students: i64 = row.get(6)?;
                let teacher_id: String = row.get(7)?;
                let academic_year: i64 = row.get(8)?;
                let is_active: i64 = row.get(9)?;
                let subjects: serde_json::Value =
                    serde_json::from_str(&subjects_raw).unwrap_or_else(|_| json!([]));
                Ok(json!({
                    "id": id,
                    "name": name,
                    "gradeLabel": grade_label,
                    "section": section,
                    "level": level,
                    "subjects": subjects,
                    "maxStudents": max_students,
                    "teacherId": teacher_id,
                    "academicYear": academic_year,
                    "isActive": is_active != 0
                }))
            },
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(course) = course_row else {
        return err(&req.id, "not_found", "course not found", None);
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

    ok(&req.id, json!({ "course": course, "students": students }))
}

fn handle_courses_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let course_id = match req.params.get("courseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing courseId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [&course_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if exists.is_none() {
        return err(&req.id, "not_found", "course not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicit delete in dependency order (no ON DELETE CASCADE).
    for (table, sql) in [
        ("grades", "DELETE FROM grades WHERE course_id = ?"),
        (
            "attendance_days",
            "DELETE FROM attendance_days WHERE course_id = ?",
        ),
        (
            "meeting_records",
            "DELETE FROM meeting_records WHERE course_id = ?",
        ),
        (
            "observations",
            "DELETE FROM observations WHERE course_id = ?",
        ),
        (
            "class_content",
            "DELETE FROM class_content WHERE course_id = ?",
        ),
        ("students", "DELETE FROM students WHERE course_id = ?"),
        ("courses", "DELETE FROM courses WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [&course_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.get" => Some(handle_courses_get(state, req)),
        "courses.delete" => Some(handle_courses_delete(state, req)),
        _ => None,
    }
}
