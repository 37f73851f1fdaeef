mod test_support;

use serde_json::json;
use test_support::{id_of, request_err, request_ok, spawn_sidecar, temp_dir};

fn names(v: &serde_json::Value) -> Vec<String> {
    v.as_array()
        .map(|a| {
            a.iter()
                .filter_map(|x| x.get("name").and_then(|n| n.as_str()).map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn gradebook_hide_fields_filters_and_fill_column() {
    let workspace = temp_dir("gradebook-ipc");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let mp = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "markingPeriods.create",
        json!({ "name": "T1", "startDate": "2024-09-01", "endDate": "2024-12-20" }),
    );
    let mp = id_of(&mp, "markingPeriod");
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({ "fullname": "Biology", "credits": 1, "markingPeriodIds": [mp.clone()] }),
    );
    let course = id_of(&course, "course");
    let mut students = Vec::new();
    for (i, last) in ["Diaz", "Evans", "Fox"].iter().enumerate() {
        let s = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({ "lastName": last }),
        );
        let sid = id_of(&s, "student");
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("e{}", i),
            "enrollments.create",
            json!({ "courseId": course.clone(), "studentId": sid.clone() }),
        );
        students.push(sid);
    }

    // Only hideable names are honored.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "config.set",
        json!({ "name": "Gradebook hide fields", "value": "Description, name" }),
    );
    let fields = request_ok(&mut stdin, &mut reader, "5", "gradebook.items.fields", json!({}));
    let field_list: Vec<&str> = fields["fields"]
        .as_array()
        .expect("fields")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(field_list.contains(&"name"));
    assert!(!field_list.contains(&"description"));
    assert_eq!(fields["hidden"], json!(["description"]));

    let lab = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "gradebook.categories.create",
        json!({ "name": "Labs" }),
    );
    let lab_again = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "gradebook.categories.create",
        json!({ "name": "Labs" }),
    );
    assert_eq!(id_of(&lab, "category"), id_of(&lab_again, "category"));
    let lab = id_of(&lab, "category");
    let bench = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "benchmarks.create",
        json!({ "number": "B.2", "name": "Cell structure" }),
    );
    assert_eq!(bench["benchmark"]["name"], json!("B.2 Cell structure"));
    let bench = id_of(&bench, "benchmark");

    let cells = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "gradebook.items.create",
        json!({
            "courseId": course.clone(),
            "name": "Cell lab",
            "date": "2024-10-01",
            "description": "microscopes",
            "categoryId": lab.clone(),
            "benchmarkId": bench.clone(),
            "markingPeriodId": mp.clone(),
            "pointsPossible": 20,
        }),
    );
    assert!(cells["item"]["description"].is_null());
    assert_eq!(cells["item"]["multiplier"].as_f64(), Some(1.0));
    let cells = id_of(&cells, "item");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "gradebook.items.create",
        json!({ "courseId": course.clone(), "name": "Unit quiz", "date": "2024-11-15" }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "11",
        "gradebook.items.create",
        json!({ "courseId": course.clone(), "name": "Bad date", "date": "11/15/2024" }),
    );
    assert_eq!(code, "bad_params");

    let cohort = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "cohorts.create",
        json!({ "name": "Period 3" }),
    );
    let cohort = id_of(&cohort, "cohort");
    let added = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "cohorts.addStudents",
        json!({ "cohortId": cohort.clone(), "studentIds": [students[0].clone(), students[2].clone()] }),
    );
    assert_eq!(added["added"], json!(2));

    let options = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "gradebook.filterOptions",
        json!({ "courseId": course.clone() }),
    );
    assert_eq!(names(&options["options"]["cohorts"]), vec!["Period 3"]);
    assert_eq!(names(&options["options"]["markingPeriods"]), vec!["T1"]);
    assert_eq!(names(&options["options"]["benchmarks"]), vec!["B.2 Cell structure"]);
    assert_eq!(names(&options["options"]["categories"]), vec!["Labs"]);
    assert!(names(&options["options"]["assignmentTypes"]).is_empty());

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "gradebook.open",
        json!({ "courseId": course.clone() }),
    );
    assert_eq!(all["students"].as_array().map(|a| a.len()), Some(3));
    assert_eq!(names(&all["items"]), vec!["Cell lab", "Unit quiz"]);

    let filtered = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "gradebook.open",
        json!({
            "courseId": course.clone(),
            "filter": { "cohortId": cohort, "dateBegin": "2024-11-01", "name": "QUIZ" }
        }),
    );
    assert_eq!(filtered["students"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(names(&filtered["items"]), vec!["Unit quiz"]);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "17",
        "gradebook.open",
        json!({
            "courseId": course.clone(),
            "filter": { "dateBegin": "2024-12-01", "dateEnd": "2024-11-01" }
        }),
    );
    assert_eq!(code, "bad_params");

    let demo = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "gradebook.demonstrations.create",
        json!({ "itemId": cells.clone(), "name": "Sketch" }),
    );
    let demo = id_of(&demo, "demonstration");

    let filled = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "gradebook.marks.fillColumn",
        json!({ "itemId": cells.clone(), "demonstrationId": demo.clone(), "mark": 15 }),
    );
    assert_eq!(filled["summary"]["created"], json!(3));
    let refilled = request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "gradebook.marks.fillColumn",
        json!({ "itemId": cells, "demonstrationId": demo, "mark": 18 }),
    );
    assert_eq!(refilled["summary"]["updated"], json!(3));
    assert_eq!(refilled["summary"]["created"], json!(0));
}
