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

fn error_fields(error: &serde_json::Value) -> Vec<String> {
    error
        .get("details")
        .and_then(|d| d.get("fields"))
        .and_then(|f| f.as_array())
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| f.get("field").and_then(|v| v.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn setup_course_with_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> (String, String) {
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
            "name": "7° Básico B",
            "gradeLabel": "7° Básico",
            "section": "B",
            "level": "basica",
            "subjects": ["Matemática"],
            "maxStudents": 30,
            "teacherId": "t-9",
            "academicYear": 2024
        }),
    );
    let course_id = created
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();
    let enrolled = request(
        stdin,
        reader,
        "setup-student",
        "students.enroll",
        json!({ "courseId": course_id, "lastName": "Soto", "firstName": "Andrés" }),
    );
    let student_id = enrolled
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    (course_id, student_id)
}

fn grade_params(course_id: &str, student_id: &str) -> serde_json::Value {
    json!({
        "courseId": course_id,
        "studentId": student_id,
        "teacherId": "t-9",
        "date": "2024-04-18",
        "subject": "Matemática",
        "evaluationType": "prueba",
        "evaluationName": "Prueba Unidad 3",
        "grade": 3.5,
        "maxGrade": 7.0,
        "period": "primer_semestre"
    })
}

#[test]
fn grade_above_max_grade_is_rejected_without_write() {
    let workspace = temp_dir("libroclases-grade-max");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, student_id) = setup_course_with_student(&mut stdin, &mut reader, &workspace);

    let mut params = grade_params(&course_id, &student_id);
    params["grade"] = json!(6.5);
    params["maxGrade"] = json!(6.0);
    let error = request_err(&mut stdin, &mut reader, "g1", "grades.create", params);
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some("validation_failed")
    );
    assert!(error_fields(&error).contains(&"grade".to_string()));

    // Nothing was persisted.
    let listed = request(
        &mut stdin,
        &mut reader,
        "g2",
        "grades.listForStudent",
        json!({ "courseId": course_id, "studentId": student_id }),
    );
    assert_eq!(
        listed.get("grades").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn validation_reports_every_failing_field_at_once() {
    let workspace = temp_dir("libroclases-grade-fields");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, student_id) = setup_course_with_student(&mut stdin, &mut reader, &workspace);

    let mut params = grade_params(&course_id, &student_id);
    params["grade"] = json!(0.4);
    params["maxGrade"] = json!(8.0);
    params["evaluationName"] = json!("ab");
    params["percentage"] = json!(130.0);
    params["period"] = json!("trimestre");
    let error = request_err(&mut stdin, &mut reader, "g1", "grades.create", params);
    let fields = error_fields(&error);
    for expected in ["grade", "maxGrade", "evaluationName", "percentage", "period"] {
        assert!(
            fields.contains(&expected.to_string()),
            "missing field error for {} in {:?}",
            expected,
            fields
        );
    }

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn accepted_grade_reports_status_and_is_retrievable() {
    let workspace = temp_dir("libroclases-grade-ok");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, student_id) = setup_course_with_student(&mut stdin, &mut reader, &workspace);

    // grade 3.5 sits below the 4.0 passing mark.
    let result = request(
        &mut stdin,
        &mut reader,
        "g1",
        "grades.create",
        grade_params(&course_id, &student_id),
    );
    assert_eq!(
        result.get("status").and_then(|v| v.as_str()),
        Some("Insuficiente")
    );
    assert_eq!(result.get("passing").and_then(|v| v.as_bool()), Some(false));

    let listed = request(
        &mut stdin,
        &mut reader,
        "g2",
        "grades.listForStudent",
        json!({ "courseId": course_id, "studentId": student_id }),
    );
    let grades = listed.get("grades").and_then(|v| v.as_array()).expect("grades");
    assert_eq!(grades.len(), 1);
    assert_eq!(
        grades[0].get("evaluationName").and_then(|v| v.as_str()),
        Some("Prueba Unidad 3")
    );
    assert_eq!(grades[0].get("grade").and_then(|v| v.as_f64()), Some(3.5));
    assert_eq!(
        grades[0].get("status").and_then(|v| v.as_str()),
        Some("Insuficiente")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn unknown_student_is_rejected_after_validation() {
    let workspace = temp_dir("libroclases-grade-student");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (course_id, _student_id) = setup_course_with_student(&mut stdin, &mut reader, &workspace);

    let params = grade_params(&course_id, "no-such-student");
    let error = request_err(&mut stdin, &mut reader, "g1", "grades.create", params);
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn enrollment_stops_at_course_capacity() {
    let workspace = temp_dir("libroclases-capacity");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "c1",
        "courses.create",
        json!({
            "name": "Curso Pequeño",
            "gradeLabel": "1° Básico",
            "maxStudents": 1,
            "academicYear": 2024
        }),
    );
    let course_id = created
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();

    let _ = request(
        &mut stdin,
        &mut reader,
        "s1",
        "students.enroll",
        json!({ "courseId": course_id, "lastName": "Uno", "firstName": "Alumno" }),
    );
    let error = request_err(
        &mut stdin,
        &mut reader,
        "s2",
        "students.enroll",
        json!({ "courseId": course_id, "lastName": "Dos", "firstName": "Alumno" }),
    );
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some("course_full")
    );

    drop(stdin);
    let _ = child.wait();
}
