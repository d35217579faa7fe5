use crate::config::SchoolInfo;
use crate::grading::{self, Period};

/// Builds the "Libro de Clases" HTML document from an assembled aggregate.
/// The aggregate is transient: the export handler gathers it for one render
/// and drops it. Every section is independent and renders a placeholder when
/// its data is missing, so partial data never blocks the rest of the book.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceStatus {
    Presente,
    Ausente,
    Atrasado,
    Justificado,
    Retirado,
}

impl AttendanceStatus {
    pub fn parse(s: &str) -> Option<AttendanceStatus> {
        match s.trim().to_ascii_lowercase().as_str() {
            "presente" => Some(AttendanceStatus::Presente),
            "ausente" => Some(AttendanceStatus::Ausente),
            "atrasado" => Some(AttendanceStatus::Atrasado),
            "justificado" => Some(AttendanceStatus::Justificado),
            "retirado" => Some(AttendanceStatus::Retirado),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Presente => "presente",
            AttendanceStatus::Ausente => "ausente",
            AttendanceStatus::Atrasado => "atrasado",
            AttendanceStatus::Justificado => "justificado",
            AttendanceStatus::Retirado => "retirado",
        }
    }

    /// Single-letter code used in the printed register.
    pub fn letter(self) -> char {
        match self {
            AttendanceStatus::Presente => 'P',
            AttendanceStatus::Ausente => 'A',
            AttendanceStatus::Atrasado => 'T',
            AttendanceStatus::Justificado => 'J',
            AttendanceStatus::Retirado => 'R',
        }
    }
}

/// A document section either has rows or renders its "no data" placeholder.
/// Making the empty case a variant keeps the renderer from ever indexing an
/// empty collection.
#[derive(Debug, Clone)]
pub enum Section<T> {
    Empty,
    Rows(Vec<T>),
}

impl<T> Section<T> {
    pub fn from_vec(rows: Vec<T>) -> Section<T> {
        if rows.is_empty() {
            Section::Empty
        } else {
            Section::Rows(rows)
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttendanceEntry {
    pub date: String,
    pub student_name: String,
    pub status: AttendanceStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GradeEntry {
    pub date: String,
    pub student_name: String,
    pub subject: String,
    pub evaluation_name: String,
    pub grade: f64,
    pub period: Period,
}

#[derive(Debug, Clone)]
pub struct ObservationEntry {
    pub date: String,
    pub student_name: String,
    pub kind: String,
    pub text: String,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct ContentEntry {
    pub date: String,
    pub subject: String,
    pub topic: String,
    pub activities: String,
}

#[derive(Debug, Clone)]
pub struct MeetingEntry {
    pub meeting_date: String,
    pub meeting_number: i64,
    pub student_name: String,
    pub attended: bool,
    pub representative_name: Option<String>,
    pub relationship: Option<String>,
    pub agreements: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CourseInfo {
    pub name: String,
    pub grade_label: String,
    pub section: String,
    pub teacher_id: String,
    pub academic_year: i64,
    pub enrolled: usize,
}

#[derive(Debug, Clone)]
pub struct LibroClasesData {
    pub school: SchoolInfo,
    pub course: CourseInfo,
    pub scope_label: String,
    pub generated_at: String,
    pub attendance: Section<AttendanceEntry>,
    pub grades: Section<GradeEntry>,
    pub observations: Section<ObservationEntry>,
    pub class_content: Section<ContentEntry>,
    pub meetings: Section<MeetingEntry>,
}

const NO_DATA: &str = "Sin registros para este período";

/// Escapes the five HTML-significant characters. Everything user-supplied
/// goes through here before interpolation.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// es-CL date rendering: `2024-03-10` → `10-03-2024`. Inputs that are not
/// ISO dates pass through escaped but otherwise untouched.
pub fn format_date_cl(iso: &str) -> String {
    match chrono::NaiveDate::parse_from_str(iso.trim(), "%Y-%m-%d") {
        Ok(d) => d.format("%d-%m-%Y").to_string(),
        Err(_) => escape_html(iso),
    }
}

fn grade_badge(grade: f64) -> String {
    let class = if grading::is_passing(grade) {
        "aprobado"
    } else {
        "reprobado"
    };
    format!("<span class=\"badge {}\">{:.1}</span>", class, grade)
}

fn section_table<T>(
    title: &str,
    section: &Section<T>,
    headers: &[&str],
    mut row: impl FnMut(&T) -> String,
) -> String {
    let mut html = String::new();
    html.push_str(&format!("<section>\n<h2>{}</h2>\n", escape_html(title)));
    match section {
        Section::Empty => {
            html.push_str(&format!("<p class=\"sin-datos\">{}</p>\n", NO_DATA));
        }
        Section::Rows(rows) => {
            html.push_str("<table>\n<thead><tr>");
            for h in headers {
                html.push_str(&format!("<th>{}</th>", escape_html(h)));
            }
            html.push_str("</tr></thead>\n<tbody>\n");
            for r in rows {
                html.push_str(&row(r));
                html.push('\n');
            }
            html.push_str("</tbody>\n</table>\n");
        }
    }
    html.push_str("</section>\n");
    html
}

fn attendance_section(section: &Section<AttendanceEntry>) -> String {
    section_table(
        "Registro de Asistencia",
        section,
        &["Fecha", "Estudiante", "Estado", "Observación"],
        |e| {
            format!(
                "<tr><td>{}</td><td>{}</td><td class=\"estado\">{}</td><td>{}</td></tr>",
                format_date_cl(&e.date),
                escape_html(&e.student_name),
                e.status.letter(),
                escape_html(e.note.as_deref().unwrap_or("")),
            )
        },
    )
}

fn grades_section(section: &Section<GradeEntry>) -> String {
    section_table(
        "Calificaciones",
        section,
        &["Fecha", "Estudiante", "Asignatura", "Evaluación", "Período", "Nota"],
        |e| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                format_date_cl(&e.date),
                escape_html(&e.student_name),
                escape_html(&e.subject),
                escape_html(&e.evaluation_name),
                e.period.short_label(),
                grade_badge(e.grade),
            )
        },
    )
}

fn observations_section(section: &Section<ObservationEntry>) -> String {
    section_table(
        "Observaciones",
        section,
        &["Fecha", "Estudiante", "Tipo", "Observación", "Registrado por"],
        |e| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                format_date_cl(&e.date),
                escape_html(&e.student_name),
                escape_html(&e.kind),
                escape_html(&e.text),
                escape_html(&e.author),
            )
        },
    )
}

fn content_section(section: &Section<ContentEntry>) -> String {
    section_table(
        "Registro de Contenidos",
        section,
        &["Fecha", "Asignatura", "Contenido", "Actividades"],
        |e| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                format_date_cl(&e.date),
                escape_html(&e.subject),
                escape_html(&e.topic),
                escape_html(&e.activities),
            )
        },
    )
}

fn meetings_section(section: &Section<MeetingEntry>) -> String {
    section_table(
        "Reuniones de Apoderados",
        section,
        &["Fecha", "N°", "Estudiante", "Asistió", "Apoderado", "Parentesco", "Acuerdos"],
        |e| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                format_date_cl(&e.meeting_date),
                e.meeting_number,
                escape_html(&e.student_name),
                if e.attended { "Sí" } else { "No" },
                escape_html(e.representative_name.as_deref().unwrap_or("")),
                escape_html(e.relationship.as_deref().unwrap_or("")),
                escape_html(e.agreements.as_deref().unwrap_or("")),
            )
        },
    )
}

const STYLE: &str = "\
body { font-family: 'Helvetica Neue', Arial, sans-serif; font-size: 11px; color: #1a1a1a; }
header { text-align: center; border-bottom: 2px solid #1a1a1a; padding-bottom: 8px; }
header h1 { font-size: 20px; letter-spacing: 2px; margin: 4px 0; }
.meta { font-size: 10px; color: #444; margin: 6px 0 14px 0; }
.curso { border: 1px solid #999; padding: 8px; margin-bottom: 14px; }
section { page-break-inside: avoid; margin-bottom: 16px; }
h2 { font-size: 13px; border-bottom: 1px solid #999; padding-bottom: 2px; }
table { width: 100%; border-collapse: collapse; }
th, td { border: 1px solid #bbb; padding: 3px 5px; text-align: left; }
th { background: #efefef; }
td.estado { text-align: center; font-weight: bold; }
.badge { padding: 1px 6px; border-radius: 3px; font-weight: bold; }
.badge.aprobado { background: #d4edda; color: #155724; }
.badge.reprobado { background: #f8d7da; color: #721c24; }
.sin-datos { color: #777; font-style: italic; }
.firmas { display: flex; justify-content: space-around; margin-top: 48px; }
.firmas div { width: 220px; text-align: center; border-top: 1px solid #1a1a1a; padding-top: 4px; }
footer { margin-top: 24px; font-size: 9px; color: #666; text-align: center; }";

/// Assembles the complete document. The caller decides whether the result is
/// written out as HTML or handed to the PDF renderer.
pub fn build_html(data: &LibroClasesData) -> String {
    let school = &data.school;
    let course = &data.course;

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"es-CL\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!(
        "<title>Libro de Clases — {}</title>\n<style>\n{}\n</style>\n</head>\n<body>\n",
        escape_html(&course.name),
        STYLE
    ));

    html.push_str(&format!(
        "<header>\n<div>{}</div>\n<h1>LIBRO DE CLASES</h1>\n<div>Año Escolar {}</div>\n</header>\n",
        escape_html(&school.name),
        course.academic_year
    ));
    html.push_str(&format!(
        "<p class=\"meta\">Curso: {} — Docente: {} — Alcance: {} — Generado: {}</p>\n",
        escape_html(&course.name),
        escape_html(&course.teacher_id),
        escape_html(&data.scope_label),
        escape_html(&data.generated_at),
    ));

    html.push_str("<div class=\"curso\">\n");
    html.push_str(&format!(
        "<strong>{}</strong> — {} {} — {} estudiantes matriculados<br>\n",
        escape_html(&course.name),
        escape_html(&course.grade_label),
        escape_html(&course.section),
        course.enrolled,
    ));
    html.push_str(&format!(
        "RBD {} — {} — {} — {}\n",
        escape_html(&school.rbd),
        escape_html(&school.address),
        escape_html(&school.phone),
        escape_html(&school.email),
    ));
    html.push_str("</div>\n");

    html.push_str(&attendance_section(&data.attendance));
    html.push_str(&grades_section(&data.grades));
    html.push_str(&observations_section(&data.observations));
    html.push_str(&content_section(&data.class_content));
    html.push_str(&meetings_section(&data.meetings));

    html.push_str(
        "<div class=\"firmas\">\n<div>Profesor(a) Jefe</div>\n<div>Director(a)</div>\n<div>Timbre del Establecimiento</div>\n</div>\n",
    );
    html.push_str(&format!(
        "<footer>Documento generado por {} — {} — válido para fiscalización</footer>\n",
        escape_html(&school.name),
        escape_html(&school.website),
    ));
    html.push_str("</body>\n</html>\n");
    html
}
