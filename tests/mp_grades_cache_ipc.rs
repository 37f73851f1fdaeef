mod test_support;

use serde_json::json;
use test_support::{id_of, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn build_all_is_idempotent_and_reads_recompute_after_changes() {
    let workspace = temp_dir("gradebook-mp-cache");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let q1 = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "markingPeriods.create",
        json!({ "name": "S1", "startDate": "2024-09-01", "endDate": "2025-01-20", "weight": 1.0 }),
    );
    let q1 = id_of(&q1, "markingPeriod");
    let chem = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({ "fullname": "Chemistry", "credits": 1, "markingPeriodIds": [q1.clone()] }),
    );
    let chem = id_of(&chem, "course");
    let art = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "courses.create",
        json!({ "fullname": "Studio Art", "credits": 1, "markingPeriodIds": [q1.clone()] }),
    );
    let art = id_of(&art, "course");
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "lastName": "Cruz" }),
    );
    let student = id_of(&student, "student");
    for (i, course) in [&chem, &art].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("e{}", i),
            "enrollments.create",
            json!({ "courseId": course, "studentId": student.clone() }),
        );
    }

    let code = request_err(
        &mut stdin,
        &mut reader,
        "6",
        "mpGrades.get",
        json!({ "studentId": student.clone(), "markingPeriodId": q1.clone() }),
    );
    assert_eq!(code, "not_found");

    let first = request_ok(&mut stdin, &mut reader, "7", "mpGrades.buildAll", json!({}));
    assert_eq!(first["summary"]["created"], json!(1));
    let again = request_ok(&mut stdin, &mut reader, "8", "mpGrades.buildAll", json!({}));
    assert_eq!(again["summary"]["created"], json!(0));
    assert_eq!(again["summary"]["existing"], json!(1));

    let empty = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "mpGrades.get",
        json!({ "studentId": student.clone(), "markingPeriodId": q1.clone() }),
    );
    assert!(empty["markingPeriodGrade"]["grade"].is_null());

    for (i, (course, value)) in [(&chem, "70"), (&art, "0.9")].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("g{}", i),
            "grades.save",
            json!({ "studentId": student.clone(), "courseId": course, "markingPeriodId": q1.clone(), "value": value }),
        );
    }
    let got = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "mpGrades.get",
        json!({ "studentId": student.clone(), "markingPeriodId": q1.clone() }),
    );
    assert_eq!(got["markingPeriodGrade"]["grade"].as_f64(), Some(80.0));

    // Letter grades stay out of the marking-period average.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "grades.save",
        json!({ "studentId": student.clone(), "courseId": art.clone(), "markingPeriodId": q1.clone(), "value": "P" }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "mpGrades.list",
        json!({ "studentId": student }),
    );
    let rows = listed["markingPeriodGrades"].as_array().expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["grade"].as_f64(), Some(70.0));
}
