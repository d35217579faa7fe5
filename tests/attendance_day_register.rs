use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_libroclasesd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn libroclasesd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn raw_request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = raw_request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = raw_request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

fn setup(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> (String, Vec<String>) {
    let _ = request(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        stdin,
        reader,
        "c1",
        "courses.create",
        json!({
            "name": "5° Básico A",
            "gradeLabel": "5° Básico",
            "maxStudents": 40,
            "teacherId": "t-5",
            "academicYear": 2024
        }),
    );
    let course_id = created
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();
    let mut ids = Vec::new();
    for (i, name) in ["Rojas", "Muñoz"].iter().enumerate() {
        let enrolled = request(
            stdin,
            reader,
            &format!("s{}", i),
            "students.enroll",
            json!({ "courseId": course_id, "lastName": name, "firstName": "Ana" }),
        );
        ids.push(
            enrolled
                .get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string(),
        );
    }
    (course_id, ids)
}

#[test]
fn day_register_records_and_lists_by_date() {
    let workspace = temp_dir("libroclases-attendance-day");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, students) = setup(&mut stdin, &mut reader, &workspace);

    let result = request(
        &mut stdin,
        &mut reader,
        "a1",
        "attendance.recordDay",
        json!({
            "courseId": course_id,
            "date": "2024-04-02",
            "registeredBy": "t-5",
            "entries": [
                { "studentId": students[0], "status": "presente" },
                { "studentId": students[1], "status": "atrasado", "note": "Llegó 08:20" }
            ]
        }),
    );
    assert_eq!(result.get("recorded").and_then(|v| v.as_i64()), Some(2));

    let listed = request(
        &mut stdin,
        &mut reader,
        "a2",
        "attendance.listForCourse",
        json!({ "courseId": course_id, "from": "2024-04-01", "to": "2024-04-30" }),
    );
    let records = listed
        .get("records")
        .and_then(|v| v.as_array())
        .expect("records");
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[1].get("status").and_then(|v| v.as_str()),
        Some("atrasado")
    );
    assert_eq!(
        records[1].get("note").and_then(|v| v.as_str()),
        Some("Llegó 08:20")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn rerecording_a_day_overwrites_previous_statuses() {
    let workspace = temp_dir("libroclases-attendance-upsert");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, students) = setup(&mut stdin, &mut reader, &workspace);

    for (id, status) in [("a1", "ausente"), ("a2", "justificado")] {
        let _ = request(
            &mut stdin,
            &mut reader,
            id,
            "attendance.recordDay",
            json!({
                "courseId": course_id,
                "date": "2024-04-03",
                "registeredBy": "t-5",
                "entries": [{ "studentId": students[0], "status": status }]
            }),
        );
    }

    let listed = request(
        &mut stdin,
        &mut reader,
        "a3",
        "attendance.listForCourse",
        json!({ "courseId": course_id }),
    );
    let records = listed
        .get("records")
        .and_then(|v| v.as_array())
        .expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].get("status").and_then(|v| v.as_str()),
        Some("justificado")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_status_rejects_the_whole_batch() {
    let workspace = temp_dir("libroclases-attendance-status");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, students) = setup(&mut stdin, &mut reader, &workspace);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "a1",
        "attendance.recordDay",
        json!({
            "courseId": course_id,
            "date": "2024-04-04",
            "registeredBy": "t-5",
            "entries": [
                { "studentId": students[0], "status": "presente" },
                { "studentId": students[1], "status": "volando" }
            ]
        }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("bad_params"));

    // The valid first entry must not have been written either.
    let listed = request(
        &mut stdin,
        &mut reader,
        "a2",
        "attendance.listForCourse",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        listed
            .get("records")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_students_are_skipped_not_fatal() {
    let workspace = temp_dir("libroclases-attendance-skip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, students) = setup(&mut stdin, &mut reader, &workspace);

    let result = request(
        &mut stdin,
        &mut reader,
        "a1",
        "attendance.recordDay",
        json!({
            "courseId": course_id,
            "date": "2024-04-05",
            "registeredBy": "t-5",
            "entries": [
                { "studentId": students[0], "status": "presente" },
                { "studentId": "no-such-student", "status": "presente" }
            ]
        }),
    );
    assert_eq!(result.get("recorded").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(result.get("skipped").and_then(|v| v.as_i64()), Some(1));

    drop(stdin);
    let _ = child.wait();
}
