use crate::gradebook::{self, GradebookFilter, Item};
use crate::ipc::error::{err, model_err, ok};
use crate::ipc::helpers::{parse_params, require_str, respond, str_param};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_cohorts_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        req,
        "cohort",
        gradebook::create_cohort(conn, &name, str_param(req, "courseId")),
    )
}

fn handle_cohorts_add_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let cohort_id = match require_str(req, "cohortId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(raw) = req.params.get("studentIds").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing studentIds", None);
    };
    let mut student_ids = Vec::with_capacity(raw.len());
    for v in raw {
        let Some(s) = v.as_str() else {
            return err(&req.id, "bad_params", "studentIds must be strings", None);
        };
        student_ids.push(s.to_string());
    }
    respond(
        req,
        "added",
        gradebook::add_cohort_students(conn, &cohort_id, &student_ids),
    )
}

fn handle_benchmarks_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let number = match require_str(req, "number") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(req, "benchmark", gradebook::create_benchmark(conn, &number, &name))
}

fn handle_categories_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(req, "category", gradebook::create_category(conn, &name))
}

fn handle_assignment_types_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        req,
        "assignmentType",
        gradebook::create_assignment_type(conn, &name),
    )
}

fn handle_items_fields(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let hidden = match gradebook::user_excludes(conn) {
        Ok(v) => v,
        Err(e) => return model_err(&req.id, e),
    };
    match gradebook::item_fields(conn) {
        Ok(fields) => ok(&req.id, json!({ "fields": fields, "hidden": hidden })),
        Err(e) => model_err(&req.id, e),
    }
}

fn handle_items_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let item: Item = match parse_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(req, "item", gradebook::create_item(conn, item))
}

fn handle_demonstrations_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let item_id = match require_str(req, "itemId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let name = match require_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        req,
        "demonstration",
        gradebook::create_demonstration(conn, &item_id, &name),
    )
}

fn handle_filter_options(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match require_str(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(req, "options", gradebook::filter_options(conn, &course_id))
}

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match require_str(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let filter: GradebookFilter = match req.params.get("filter") {
        None | Some(serde_json::Value::Null) => GradebookFilter::default(),
        Some(v) => match serde_json::from_value(v.clone()) {
            Ok(f) => f,
            Err(e) => return err(&req.id, "bad_params", format!("filter: {}", e), None),
        },
    };
    match gradebook::open(conn, &course_id, &filter) {
        Ok(view) => ok(
            &req.id,
            json!({
                "courseId": course_id,
                "students": view.students,
                "items": view.items,
            }),
        ),
        Err(e) => model_err(&req.id, e),
    }
}

fn handle_marks_fill_column(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let item_id = match require_str(req, "itemId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(mark) = req.params.get("mark").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "mark must be a number", None);
    };
    respond(
        req,
        "summary",
        gradebook::fill_column(conn, &item_id, str_param(req, "demonstrationId"), mark),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "cohorts.create" => Some(handle_cohorts_create(state, req)),
        "cohorts.addStudents" => Some(handle_cohorts_add_students(state, req)),
        "benchmarks.create" => Some(handle_benchmarks_create(state, req)),
        "gradebook.categories.create" => Some(handle_categories_create(state, req)),
        "gradebook.assignmentTypes.create" => Some(handle_assignment_types_create(state, req)),
        "gradebook.items.fields" => Some(handle_items_fields(state, req)),
        "gradebook.items.create" => Some(handle_items_create(state, req)),
        "gradebook.demonstrations.create" => Some(handle_demonstrations_create(state, req)),
        "gradebook.filterOptions" => Some(handle_filter_options(state, req)),
        "gradebook.open" => Some(handle_open(state, req)),
        "gradebook.marks.fillColumn" => Some(handle_marks_fill_column(state, req)),
        _ => None,
    }
}
