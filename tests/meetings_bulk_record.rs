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

fn setup_course_with_students(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
    count: usize,
) -> (String, Vec<String>) {
    let _ = request(
        stdin,
        reader,
        "setup-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        stdin,
        reader,
        "setup-course",
        "courses.create",
        json!({
            "name": "2° Medio C",
            "gradeLabel": "2° Medio",
            "section": "C",
            "level": "media",
            "maxStudents": 40,
            "teacherId": "t-2",
            "academicYear": 2024
        }),
    );
    let course_id = created
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();
    let mut student_ids = Vec::with_capacity(count);
    for i in 0..count {
        let enrolled = request(
            stdin,
            reader,
            &format!("setup-student-{}", i),
            "students.enroll",
            json!({
                "courseId": course_id,
                "lastName": format!("Apellido{}", i),
                "firstName": format!("Nombre{}", i)
            }),
        );
        student_ids.push(
            enrolled
                .get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string(),
        );
    }
    (course_id, student_ids)
}

#[test]
fn bulk_save_requires_a_meeting_date() {
    let workspace = temp_dir("libroclases-meeting-date");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, students) = setup_course_with_students(&mut stdin, &mut reader, &workspace, 2);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "m1",
        "meetings.bulkRecord",
        json!({
            "courseId": course_id,
            "meetingNumber": 1,
            "registeredBy": "t-2",
            "entries": [{ "studentId": students[0], "attended": true }]
        }),
    );
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some("validation_failed")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn bulk_save_requires_at_least_one_marked_student() {
    let workspace = temp_dir("libroclases-meeting-empty");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, students) = setup_course_with_students(&mut stdin, &mut reader, &workspace, 2);

    // Entries without an attendance state do not count as marked.
    let error = request_err(
        &mut stdin,
        &mut reader,
        "m1",
        "meetings.bulkRecord",
        json!({
            "courseId": course_id,
            "meetingDate": "2024-03-10",
            "meetingNumber": 1,
            "registeredBy": "t-2",
            "entries": [
                { "studentId": students[0] },
                { "studentId": students[1] }
            ]
        }),
    );
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some("validation_failed")
    );

    let stats = request(
        &mut stdin,
        &mut reader,
        "m2",
        "meetings.statistics",
        json!({ "courseId": course_id }),
    );
    assert_eq!(stats.get("totalMeetings").and_then(|v| v.as_i64()), Some(0));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn bulk_save_persists_one_record_per_student_and_updates_statistics() {
    let workspace = temp_dir("libroclases-meeting-bulk");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, students) = setup_course_with_students(&mut stdin, &mut reader, &workspace, 3);

    let result = request(
        &mut stdin,
        &mut reader,
        "m1",
        "meetings.bulkRecord",
        json!({
            "courseId": course_id,
            "meetingDate": "2024-03-10",
            "meetingNumber": 2,
            "registeredBy": "t-2",
            "entries": [
                {
                    "studentId": students[0],
                    "attended": true,
                    "representativeName": "Juana Pérez",
                    "relationship": "madre"
                },
                { "studentId": students[1], "attended": false },
                { "studentId": students[2], "attended": false }
            ]
        }),
    );
    assert_eq!(result.get("recorded").and_then(|v| v.as_i64()), Some(3));
    assert_eq!(result.get("skipped").and_then(|v| v.as_i64()), Some(0));

    let history = request(
        &mut stdin,
        &mut reader,
        "m2",
        "meetings.history",
        json!({ "courseId": course_id }),
    );
    let meetings = history
        .get("meetings")
        .and_then(|v| v.as_array())
        .expect("meetings");
    assert_eq!(meetings.len(), 1);
    assert_eq!(
        meetings[0].get("meetingNumber").and_then(|v| v.as_i64()),
        Some(2)
    );
    assert_eq!(
        meetings[0].get("totalRecords").and_then(|v| v.as_i64()),
        Some(3)
    );
    assert_eq!(
        meetings[0].get("attendedCount").and_then(|v| v.as_i64()),
        Some(1)
    );

    let stats = request(
        &mut stdin,
        &mut reader,
        "m3",
        "meetings.statistics",
        json!({ "courseId": course_id }),
    );
    assert_eq!(stats.get("totalMeetings").and_then(|v| v.as_i64()), Some(1));
    let avg = stats
        .get("averageAttendance")
        .and_then(|v| v.as_f64())
        .expect("averageAttendance");
    assert!((avg - 100.0 / 3.0).abs() < 1e-6, "avg was {}", avg);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn resubmitting_a_meeting_updates_rather_than_duplicates() {
    let workspace = temp_dir("libroclases-meeting-upsert");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, students) = setup_course_with_students(&mut stdin, &mut reader, &workspace, 1);

    for (id, attended) in [("m1", false), ("m2", true)] {
        let _ = request(
            &mut stdin,
            &mut reader,
            id,
            "meetings.bulkRecord",
            json!({
                "courseId": course_id,
                "meetingDate": "2024-06-01",
                "meetingNumber": 1,
                "registeredBy": "t-2",
                "entries": [{ "studentId": students[0], "attended": attended }]
            }),
        );
    }

    let history = request(
        &mut stdin,
        &mut reader,
        "m3",
        "meetings.history",
        json!({ "courseId": course_id }),
    );
    let meetings = history
        .get("meetings")
        .and_then(|v| v.as_array())
        .expect("meetings");
    assert_eq!(meetings.len(), 1);
    assert_eq!(
        meetings[0].get("totalRecords").and_then(|v| v.as_i64()),
        Some(1)
    );
    // Second submission wins.
    assert_eq!(
        meetings[0].get("attendedCount").and_then(|v| v.as_i64()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_relationship_is_rejected() {
    let workspace = temp_dir("libroclases-meeting-rel");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, students) = setup_course_with_students(&mut stdin, &mut reader, &workspace, 1);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "m1",
        "meetings.bulkRecord",
        json!({
            "courseId": course_id,
            "meetingDate": "2024-06-01",
            "meetingNumber": 1,
            "registeredBy": "t-2",
            "entries": [{
                "studentId": students[0],
                "attended": true,
                "relationship": "vecino"
            }]
        }),
    );
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
}
