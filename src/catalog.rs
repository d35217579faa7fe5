use serde::Serialize;

/// Static description of the Chilean educational system: institution types,
/// their levels (with ISCED codes and age ranges), grade labels and subject
/// lists. Pure lookup tables consulted by the catalog handlers and by the
/// navigation builder; nothing here touches the database.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstitutionType {
    Preschool,
    BasicSchool,
    HighSchool,
    TechnicalInstitute,
    TechnicalCenter,
    University,
}

pub const ALL_INSTITUTION_TYPES: [InstitutionType; 6] = [
    InstitutionType::Preschool,
    InstitutionType::BasicSchool,
    InstitutionType::HighSchool,
    InstitutionType::TechnicalInstitute,
    InstitutionType::TechnicalCenter,
    InstitutionType::University,
];

impl InstitutionType {
    pub fn parse(s: &str) -> Option<InstitutionType> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRESCHOOL" => Some(InstitutionType::Preschool),
            "BASIC_SCHOOL" => Some(InstitutionType::BasicSchool),
            "HIGH_SCHOOL" => Some(InstitutionType::HighSchool),
            "TECHNICAL_INSTITUTE" => Some(InstitutionType::TechnicalInstitute),
            "TECHNICAL_CENTER" => Some(InstitutionType::TechnicalCenter),
            "UNIVERSITY" => Some(InstitutionType::University),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstitutionType::Preschool => "PRESCHOOL",
            InstitutionType::BasicSchool => "BASIC_SCHOOL",
            InstitutionType::HighSchool => "HIGH_SCHOOL",
            InstitutionType::TechnicalInstitute => "TECHNICAL_INSTITUTE",
            InstitutionType::TechnicalCenter => "TECHNICAL_CENTER",
            InstitutionType::University => "UNIVERSITY",
        }
    }

    pub fn chilean_name(self) -> &'static str {
        match self {
            InstitutionType::Preschool => "Jardín Infantil y Sala Cuna",
            InstitutionType::BasicSchool => "Escuela Básica",
            InstitutionType::HighSchool => "Liceo",
            InstitutionType::TechnicalInstitute => "Liceo Técnico-Profesional",
            InstitutionType::TechnicalCenter => "Centro de Formación Técnica",
            InstitutionType::University => "Universidad",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationalLevel {
    pub id: &'static str,
    pub chilean_name: &'static str,
    /// UNESCO ISCED 2011 level code.
    pub isced: u8,
    pub age_range: (u8, u8),
    pub grades: &'static [&'static str],
}

const PRESCHOOL_LEVELS: &[EducationalLevel] = &[
    EducationalLevel {
        id: "sala_cuna",
        chilean_name: "Sala Cuna",
        isced: 0,
        age_range: (0, 2),
        grades: &["Sala Cuna Menor", "Sala Cuna Mayor"],
    },
    EducationalLevel {
        id: "nivel_medio",
        chilean_name: "Nivel Medio",
        isced: 0,
        age_range: (2, 4),
        grades: &["Medio Menor", "Medio Mayor"],
    },
    EducationalLevel {
        id: "transicion",
        chilean_name: "Nivel de Transición",
        isced: 0,
        age_range: (4, 6),
        grades: &["Prekínder", "Kínder"],
    },
];

const BASIC_LEVELS: &[EducationalLevel] = &[EducationalLevel {
    id: "basica",
    chilean_name: "Educación Básica",
    isced: 1,
    age_range: (6, 14),
    grades: &[
        "1° Básico",
        "2° Básico",
        "3° Básico",
        "4° Básico",
        "5° Básico",
        "6° Básico",
        "7° Básico",
        "8° Básico",
    ],
}];

const HIGH_SCHOOL_LEVELS: &[EducationalLevel] = &[EducationalLevel {
    id: "media",
    chilean_name: "Educación Media Científico-Humanista",
    isced: 3,
    age_range: (14, 18),
    grades: &["1° Medio", "2° Medio", "3° Medio", "4° Medio"],
}];

const TECHNICAL_INSTITUTE_LEVELS: &[EducationalLevel] = &[EducationalLevel {
    id: "media_tp",
    chilean_name: "Educación Media Técnico-Profesional",
    isced: 3,
    age_range: (14, 18),
    grades: &["1° Medio", "2° Medio", "3° Medio TP", "4° Medio TP"],
}];

const TECHNICAL_CENTER_LEVELS: &[EducationalLevel] = &[EducationalLevel {
    id: "tecnico_superior",
    chilean_name: "Técnico de Nivel Superior",
    isced: 5,
    age_range: (18, 22),
    grades: &["Primer Año", "Segundo Año"],
}];

const UNIVERSITY_LEVELS: &[EducationalLevel] = &[EducationalLevel {
    id: "universitaria",
    chilean_name: "Educación Universitaria",
    isced: 6,
    age_range: (18, 25),
    grades: &[
        "Primer Año",
        "Segundo Año",
        "Tercer Año",
        "Cuarto Año",
        "Quinto Año",
    ],
}];

pub fn levels_for(institution: InstitutionType) -> &'static [EducationalLevel] {
    match institution {
        InstitutionType::Preschool => PRESCHOOL_LEVELS,
        InstitutionType::BasicSchool => BASIC_LEVELS,
        InstitutionType::HighSchool => HIGH_SCHOOL_LEVELS,
        InstitutionType::TechnicalInstitute => TECHNICAL_INSTITUTE_LEVELS,
        InstitutionType::TechnicalCenter => TECHNICAL_CENTER_LEVELS,
        InstitutionType::University => UNIVERSITY_LEVELS,
    }
}

/// Flat, ordered list of grade labels across the institution's levels.
pub fn grades_for(institution: InstitutionType) -> Vec<&'static str> {
    levels_for(institution)
        .iter()
        .flat_map(|l| l.grades.iter().copied())
        .collect()
}

pub fn subjects_for(institution: InstitutionType) -> &'static [&'static str] {
    match institution {
        InstitutionType::Preschool => &[
            "Comunicación Integral",
            "Interacción y Comprensión del Entorno",
            "Desarrollo Personal y Social",
        ],
        InstitutionType::BasicSchool => &[
            "Lenguaje y Comunicación",
            "Matemática",
            "Ciencias Naturales",
            "Historia, Geografía y Ciencias Sociales",
            "Inglés",
            "Educación Física y Salud",
            "Artes Visuales",
            "Música",
            "Tecnología",
            "Orientación",
            "Religión",
        ],
        InstitutionType::HighSchool => &[
            "Lengua y Literatura",
            "Matemática",
            "Ciencias Naturales",
            "Historia, Geografía y Ciencias Sociales",
            "Inglés",
            "Educación Física y Salud",
            "Artes",
            "Filosofía",
            "Educación Ciudadana",
            "Ciencias para la Ciudadanía",
        ],
        InstitutionType::TechnicalInstitute => &[
            "Lengua y Literatura",
            "Matemática",
            "Inglés",
            "Módulos de Especialidad",
            "Emprendimiento y Empleabilidad",
        ],
        InstitutionType::TechnicalCenter => &[
            "Módulos de Especialidad",
            "Formación General",
            "Práctica Profesional",
        ],
        InstitutionType::University => &[
            "Formación Básica",
            "Formación Profesional",
            "Formación General",
            "Práctica y Titulación",
        ],
    }
}

/// Feature-flag predicate consulted by navigation to decide which app
/// sections are visible for a given institution type.
pub fn should_show_feature(feature: &str, institution: InstitutionType) -> bool {
    use InstitutionType::*;
    match feature {
        "daycare_features" => matches!(institution, Preschool),
        "libro_clases" => matches!(
            institution,
            BasicSchool | HighSchool | TechnicalInstitute
        ),
        "grades" => !matches!(institution, Preschool),
        "meetings" => matches!(institution, Preschool | BasicSchool | HighSchool | TechnicalInstitute),
        "voting" => true,
        "higher_ed_features" => matches!(institution, TechnicalCenter | University),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Admin,
    Teacher,
    Parent,
    Master,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "parent" => Some(Role::Parent),
            "master" => Some(Role::Master),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub id: &'static str,
    pub label: &'static str,
    pub path: &'static str,
}

struct MenuEntry {
    item: MenuItem,
    roles: &'static [Role],
    /// Feature gate; empty string means always visible.
    feature: &'static str,
}

const MENU: &[MenuEntry] = &[
    MenuEntry {
        item: MenuItem { id: "dashboard", label: "Panel", path: "/" },
        roles: &[Role::Admin, Role::Teacher, Role::Parent, Role::Master],
        feature: "",
    },
    MenuEntry {
        item: MenuItem { id: "courses", label: "Cursos", path: "/cursos" },
        roles: &[Role::Admin, Role::Teacher, Role::Master],
        feature: "",
    },
    MenuEntry {
        item: MenuItem { id: "grades", label: "Calificaciones", path: "/calificaciones" },
        roles: &[Role::Admin, Role::Teacher, Role::Parent, Role::Master],
        feature: "grades",
    },
    MenuEntry {
        item: MenuItem { id: "attendance", label: "Asistencia", path: "/asistencia" },
        roles: &[Role::Admin, Role::Teacher, Role::Master],
        feature: "libro_clases",
    },
    MenuEntry {
        item: MenuItem { id: "meetings", label: "Reuniones de Apoderados", path: "/reuniones" },
        roles: &[Role::Teacher, Role::Parent, Role::Master],
        feature: "meetings",
    },
    MenuEntry {
        item: MenuItem { id: "libro", label: "Libro de Clases", path: "/libro" },
        roles: &[Role::Admin, Role::Teacher, Role::Master],
        feature: "libro_clases",
    },
    MenuEntry {
        item: MenuItem { id: "daycare", label: "Agenda Diaria", path: "/agenda" },
        roles: &[Role::Teacher, Role::Parent, Role::Master],
        feature: "daycare_features",
    },
    MenuEntry {
        item: MenuItem { id: "voting", label: "Votaciones", path: "/votaciones" },
        roles: &[Role::Admin, Role::Parent, Role::Master],
        feature: "voting",
    },
    MenuEntry {
        item: MenuItem { id: "admin", label: "Administración", path: "/admin" },
        roles: &[Role::Admin, Role::Master],
        feature: "",
    },
];

/// Data-driven menu: the same static table serves every role, filtered by
/// role membership and the institution's feature flags. Master sees every
/// section its institution type allows.
pub fn navigation_for(role: Role, institution: InstitutionType) -> Vec<MenuItem> {
    MENU.iter()
        .filter(|e| e.roles.contains(&role))
        .filter(|e| e.feature.is_empty() || should_show_feature(e.feature, institution))
        .map(|e| e.item.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_school_has_eight_basico_grades_in_order() {
        let grades = grades_for(InstitutionType::BasicSchool);
        assert_eq!(grades.len(), 8);
        for (i, g) in grades.iter().enumerate() {
            assert_eq!(*g, format!("{}° Básico", i + 1));
        }
    }

    #[test]
    fn daycare_features_gate() {
        assert!(should_show_feature("daycare_features", InstitutionType::Preschool));
        assert!(!should_show_feature("daycare_features", InstitutionType::University));
        assert!(!should_show_feature("daycare_features", InstitutionType::BasicSchool));
    }

    #[test]
    fn unknown_feature_is_hidden() {
        assert!(!should_show_feature("time_travel", InstitutionType::University));
    }

    #[test]
    fn preschool_levels_are_isced_0() {
        for level in levels_for(InstitutionType::Preschool) {
            assert_eq!(level.isced, 0);
        }
    }

    #[test]
    fn institution_type_parse_roundtrip() {
        for t in ALL_INSTITUTION_TYPES {
            assert_eq!(InstitutionType::parse(t.as_str()), Some(t));
        }
        assert_eq!(InstitutionType::parse("basic_school"), Some(InstitutionType::BasicSchool));
        assert_eq!(InstitutionType::parse("ACADEMY"), None);
    }

    #[test]
    fn parent_navigation_excludes_admin_sections() {
        let items = navigation_for(Role::Parent, InstitutionType::BasicSchool);
        assert!(items.iter().any(|i| i.id == "grades"));
        assert!(items.iter().any(|i| i.id == "meetings"));
        assert!(!items.iter().any(|i| i.id == "admin"));
        assert!(!items.iter().any(|i| i.id == "daycare"));
    }

    #[test]
    fn preschool_navigation_hides_grades_shows_daycare() {
        let items = navigation_for(Role::Teacher, InstitutionType::Preschool);
        assert!(!items.iter().any(|i| i.id == "grades"));
        assert!(items.iter().any(|i| i.id == "daycare"));
    }
}
