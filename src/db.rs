use rusqlite::Connection;
use std::path::Path;

pub const DB_FILENAME: &str = "libroclases.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILENAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade_label TEXT NOT NULL,
            section TEXT NOT NULL,
            level TEXT NOT NULL,
            subjects TEXT NOT NULL,
            max_students INTEGER NOT NULL,
            teacher_id TEXT NOT NULL,
            academic_year INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            parent_id TEXT,
            active INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_course ON students(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_course_sort ON students(course_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            evaluation_type TEXT NOT NULL,
            evaluation_name TEXT NOT NULL,
            date TEXT NOT NULL,
            grade REAL NOT NULL,
            max_grade REAL NOT NULL,
            percentage REAL,
            period TEXT NOT NULL,
            comments TEXT,
            teacher_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_course ON grades(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(course_id, student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_days(
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            note TEXT,
            registered_by TEXT NOT NULL,
            PRIMARY KEY(course_id, student_id, date),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_days_course_date ON attendance_days(course_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_days_student ON attendance_days(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS meeting_records(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            parent_id TEXT,
            meeting_date TEXT NOT NULL,
            meeting_number INTEGER NOT NULL,
            attended INTEGER NOT NULL,
            representative_name TEXT,
            relationship TEXT,
            observations TEXT,
            agreements TEXT,
            registered_by TEXT NOT NULL,
            UNIQUE(course_id, student_id, meeting_date, meeting_number),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meeting_records_course ON meeting_records(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meeting_records_student ON meeting_records(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS observations(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            kind TEXT NOT NULL,
            text TEXT NOT NULL,
            author TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_observations_student ON observations(course_id, student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_content(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            date TEXT NOT NULL,
            topic TEXT NOT NULL,
            activities TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_content_course ON class_content(course_id)",
        [],
    )?;

    // Workspaces created before the attendance note column may lack it.
    ensure_attendance_note(&conn)?;

    Ok(conn)
}

fn ensure_attendance_note(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "attendance_days", "note")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE attendance_days ADD COLUMN note TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
