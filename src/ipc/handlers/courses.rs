use crate::cache;
use crate::ipc::error::err;
use crate::ipc::helpers::{parse_params, require_str, respond, str_param};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, Course};

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut course: Course = match parse_params(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let r = roster::create_course(conn, &mut course).map(|_| course);
    respond(req, "course", r)
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(req, "courses", roster::list_courses(conn))
}

fn handle_enrollments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match require_str(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match require_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(
        req,
        "enrollment",
        roster::create_enrollment(conn, &course_id, &student_id, str_param(req, "role")),
    )
}

fn handle_enrollments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(
        req,
        "enrollments",
        roster::list_enrollments(conn, str_param(req, "courseId"), str_param(req, "studentId")),
    )
}

fn handle_enrollments_grade(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let enrollment_id = match require_str(req, "enrollmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    respond(req, "enrollment", cache::enrollment_grade(conn, &enrollment_id))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.list" => Some(handle_courses_list(state, req)),
        "enrollments.create" => Some(handle_enrollments_create(state, req)),
        "enrollments.list" => Some(handle_enrollments_list(state, req)),
        "enrollments.grade" => Some(handle_enrollments_grade(state, req)),
        _ => None,
    }
}
