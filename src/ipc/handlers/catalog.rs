use crate::catalog::{self, InstitutionType, Role};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn parse_institution(req: &Request) -> Result<InstitutionType, serde_json::Value> {
    let raw = req
        .params
        .get("institutionType")
        .and_then(|v| v.as_str())
        .ok_or_else(|| err(&req.id, "bad_params", "missing institutionType", None))?;
    InstitutionType::parse(raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "unknown institution type",
            Some(json!({ "institutionType": raw })),
        )
    })
}

fn level_json(level: &catalog::EducationalLevel) -> serde_json::Value {
    json!({
        "id": level.id,
        "chileanName": level.chilean_name,
        "isced": level.isced,
        "ageRange": { "from": level.age_range.0, "to": level.age_range.1 },
        "grades": level.grades,
    })
}

fn handle_institution_types(req: &Request) -> serde_json::Value {
    let types: Vec<serde_json::Value> = catalog::ALL_INSTITUTION_TYPES
        .iter()
        .map(|t| {
            json!({
                "id": t.as_str(),
                "chileanName": t.chilean_name(),
                "levels": catalog::levels_for(*t).iter().map(level_json).collect::<Vec<_>>(),
            })
        })
        .collect();
    ok(&req.id, json!({ "institutionTypes": types }))
}

fn handle_grades(req: &Request) -> serde_json::Value {
    let institution = match parse_institution(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "grades": catalog::grades_for(institution) }))
}

fn handle_subjects(req: &Request) -> serde_json::Value {
    let institution = match parse_institution(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "subjects": catalog::subjects_for(institution) }),
    )
}

fn handle_feature_flag(req: &Request) -> serde_json::Value {
    let institution = match parse_institution(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let feature = match req.params.get("feature").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing feature", None),
    };
    ok(
        &req.id,
        json!({ "visible": catalog::should_show_feature(feature, institution) }),
    )
}

fn handle_navigation(req: &Request) -> serde_json::Value {
    let institution = match parse_institution(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let role_raw = match req.params.get("role").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing role", None),
    };
    let Some(role) = Role::parse(role_raw) else {
        return err(
            &req.id,
            "bad_params",
            "role must be admin, teacher, parent or master",
            Some(json!({ "role": role_raw })),
        );
    };
    ok(
        &req.id,
        json!({ "menu": catalog::navigation_for(role, institution) }),
    )
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.institutionTypes" => Some(handle_institution_types(req)),
        "catalog.grades" => Some(handle_grades(req)),
        "catalog.subjects" => Some(handle_subjects(req)),
        "catalog.featureFlag" => Some(handle_feature_flag(req)),
        "catalog.navigation" => Some(handle_navigation(req)),
        _ => None,
    }
}
