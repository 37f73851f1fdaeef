//! Benchmark gradebook: assignment items, demonstrations and marks, plus the
//! per-course filtering and user-configurable item fields the gradebook
//! screens are built on.

use crate::cache::STUDENT_ROLE;
use crate::config;
use crate::error::{Error, Result};
use crate::roster::{self, parse_iso_date, Student};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Item form fields in display order. `multiplier` is never user-editable.
pub const ITEM_FORM_FIELDS: [&str; 9] = [
    "course",
    "name",
    "date",
    "description",
    "marking_period",
    "category",
    "points_possible",
    "assignment_type",
    "benchmark",
];

/// Fields a workspace may hide through `Gradebook hide fields`.
pub const HIDEABLE_ITEM_FIELDS: [&str; 5] = [
    "marking_period",
    "assignment_type",
    "benchmark",
    "date",
    "description",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

fn named_ref(r: &Row<'_>) -> rusqlite::Result<NamedRef> {
    Ok(NamedRef {
        id: r.get(0)?,
        name: r.get(1)?,
    })
}

fn exists(conn: &Connection, table: &str, id: &str) -> Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

fn require(conn: &Connection, table: &str, id: &str, what: &'static str) -> Result<()> {
    if exists(conn, table, id)? {
        Ok(())
    } else {
        Err(Error::NotFound(what))
    }
}

fn non_empty<'a>(raw: &'a str, field: &str) -> Result<&'a str> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(Error::BadParams(format!("{} must not be empty", field)));
    }
    Ok(t)
}

pub fn create_cohort(conn: &Connection, name: &str, course_id: Option<&str>) -> Result<NamedRef> {
    let name = non_empty(name, "name")?;
    if let Some(c) = course_id {
        require(conn, "courses", c, "course")?;
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO cohorts(id, name, course_id) VALUES(?, ?, ?)",
        (&id, name, course_id),
    )?;
    Ok(NamedRef {
        id,
        name: name.to_string(),
    })
}

pub fn add_cohort_students(conn: &Connection, cohort_id: &str, student_ids: &[String]) -> Result<usize> {
    require(conn, "cohorts", cohort_id, "cohort")?;
    let tx = conn.unchecked_transaction()?;
    let mut added = 0;
    for sid in student_ids {
        require(&tx, "students", sid, "student")?;
        added += tx.execute(
            "INSERT OR IGNORE INTO cohort_students(cohort_id, student_id) VALUES(?, ?)",
            (cohort_id, sid),
        )?;
    }
    tx.commit()?;
    Ok(added)
}

pub fn create_benchmark(conn: &Connection, number: &str, name: &str) -> Result<NamedRef> {
    let number = non_empty(number, "number")?;
    let name = non_empty(name, "name")?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO benchmarks(id, number, name) VALUES(?, ?, ?)",
        (&id, number, name),
    )?;
    Ok(NamedRef {
        id,
        name: format!("{} {}", number, name),
    })
}

/// Categories and assignment types are unique by name; creating an existing
/// name returns the stored row.
fn create_named(conn: &Connection, table: &str, name: &str) -> Result<NamedRef> {
    let name = non_empty(name, "name")?;
    let select = format!("SELECT id, name FROM {} WHERE name = ?", table);
    if let Some(found) = conn.query_row(&select, [name], named_ref).optional()? {
        return Ok(found);
    }
    let id = Uuid::new_v4().to_string();
    let insert = format!("INSERT INTO {}(id, name) VALUES(?, ?)", table);
    conn.execute(&insert, (&id, name))?;
    Ok(NamedRef {
        id,
        name: name.to_string(),
    })
}

pub fn create_category(conn: &Connection, name: &str) -> Result<NamedRef> {
    create_named(conn, "gradebook_categories", name)
}

pub fn create_assignment_type(conn: &Connection, name: &str) -> Result<NamedRef> {
    create_named(conn, "assignment_types", name)
}

/// Item fields the workspace configuration hides, limited to the hideable set.
pub fn user_excludes(conn: &Connection) -> Result<Vec<String>> {
    let raw = config::get_or_default(conn, config::GRADEBOOK_HIDE_FIELDS)?;
    let wanted: HashSet<String> = config::csv_list(&raw).into_iter().collect();
    Ok(HIDEABLE_ITEM_FIELDS
        .iter()
        .filter(|f| wanted.contains(**f))
        .map(|f| f.to_string())
        .collect())
}

pub fn item_fields(conn: &Connection) -> Result<Vec<&'static str>> {
    let hidden = user_excludes(conn)?;
    Ok(ITEM_FORM_FIELDS
        .iter()
        .copied()
        .filter(|f| !hidden.iter().any(|h| h.as_str() == *f))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default)]
    pub id: String,
    pub course_id: String,
    pub name: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub marking_period_id: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub points_possible: Option<f64>,
    #[serde(default)]
    pub assignment_type_id: Option<String>,
    #[serde(default)]
    pub benchmark_id: Option<String>,
    #[serde(default = "default_multiplier", skip_deserializing)]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

const ITEM_COLUMNS: &str = "i.id, i.course_id, i.name, i.date, i.description, i.marking_period_id, \
     i.category_id, i.points_possible, i.assignment_type_id, i.benchmark_id, i.multiplier";

fn item_from_row(r: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: r.get(0)?,
        course_id: r.get(1)?,
        name: r.get(2)?,
        date: r.get(3)?,
        description: r.get(4)?,
        marking_period_id: r.get(5)?,
        category_id: r.get(6)?,
        points_possible: r.get(7)?,
        assignment_type_id: r.get(8)?,
        benchmark_id: r.get(9)?,
        multiplier: r.get(10)?,
    })
}

/// Create an item. Values for fields hidden by configuration are dropped.
pub fn create_item(conn: &Connection, mut item: Item) -> Result<Item> {
    for hidden in user_excludes(conn)? {
        match hidden.as_str() {
            "marking_period" => item.marking_period_id = None,
            "assignment_type" => item.assignment_type_id = None,
            "benchmark" => item.benchmark_id = None,
            "date" => item.date = None,
            "description" => item.description = None,
            _ => {}
        }
    }

    item.name = non_empty(&item.name, "name")?.to_string();
    require(conn, "courses", &item.course_id, "course")?;
    if let Some(d) = &item.date {
        item.date = Some(parse_iso_date(d, "date")?.to_string());
    }
    if let Some(p) = item.points_possible {
        if !p.is_finite() || p < 0.0 {
            return Err(Error::BadParams("pointsPossible must be >= 0".into()));
        }
    }
    if let Some(id) = &item.marking_period_id {
        require(conn, "marking_periods", id, "marking period")?;
    }
    if let Some(id) = &item.category_id {
        require(conn, "gradebook_categories", id, "category")?;
    }
    if let Some(id) = &item.assignment_type_id {
        require(conn, "assignment_types", id, "assignment type")?;
    }
    if let Some(id) = &item.benchmark_id {
        require(conn, "benchmarks", id, "benchmark")?;
    }

    item.id = Uuid::new_v4().to_string();
    item.multiplier = default_multiplier();
    conn.execute(
        "INSERT INTO items(id, course_id, name, date, description, marking_period_id,
                           category_id, points_possible, assignment_type_id, benchmark_id, multiplier)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &item.id,
            &item.course_id,
            &item.name,
            &item.date,
            &item.description,
            &item.marking_period_id,
            &item.category_id,
            item.points_possible,
            &item.assignment_type_id,
            &item.benchmark_id,
            item.multiplier,
        ),
    )?;
    Ok(item)
}

pub fn create_demonstration(conn: &Connection, item_id: &str, name: &str) -> Result<NamedRef> {
    let name = non_empty(name, "name")?;
    require(conn, "items", item_id, "item")?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO demonstrations(id, item_id, name) VALUES(?, ?, ?)",
        (&id, item_id, name),
    )?;
    Ok(NamedRef {
        id,
        name: name.to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub cohorts: Vec<NamedRef>,
    pub marking_periods: Vec<NamedRef>,
    pub benchmarks: Vec<NamedRef>,
    pub assignment_types: Vec<NamedRef>,
    pub categories: Vec<NamedRef>,
}

fn query_refs(conn: &Connection, sql: &str, course_id: &str) -> Result<Vec<NamedRef>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([course_id], named_ref)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Choices offered by the gradebook filter for one course.
pub fn filter_options(conn: &Connection, course_id: &str) -> Result<FilterOptions> {
    require(conn, "courses", course_id, "course")?;

    // Global cohorts qualify through an enrolled member; per-course cohorts
    // only for their own course.
    let cohorts = query_refs(
        conn,
        "SELECT DISTINCT co.id, co.name
         FROM cohorts co
         WHERE (co.course_id IS NULL AND EXISTS (
                  SELECT 1 FROM cohort_students cs
                  JOIN course_enrollments ce ON ce.student_id = cs.student_id
                  WHERE cs.cohort_id = co.id AND ce.course_id = ?1 AND ce.role = 'student'))
            OR co.course_id = ?1
         ORDER BY co.name",
        course_id,
    )?;
    let marking_periods = query_refs(
        conn,
        "SELECT DISTINCT mp.id, mp.name
         FROM marking_periods mp
         JOIN course_marking_periods cmp ON cmp.marking_period_id = mp.id
         WHERE cmp.course_id = ?
         ORDER BY mp.start_date, mp.name",
        course_id,
    )?;
    let benchmarks = query_refs(
        conn,
        "SELECT DISTINCT b.id, b.number || ' ' || b.name
         FROM benchmarks b
         JOIN items i ON i.benchmark_id = b.id
         WHERE i.course_id = ?
         ORDER BY b.number",
        course_id,
    )?;
    let assignment_types = query_refs(
        conn,
        "SELECT DISTINCT t.id, t.name
         FROM assignment_types t
         JOIN items i ON i.assignment_type_id = t.id
         WHERE i.course_id = ?
         ORDER BY t.name",
        course_id,
    )?;
    let categories = query_refs(
        conn,
        "SELECT DISTINCT c.id, c.name
         FROM gradebook_categories c
         JOIN items i ON i.category_id = c.id
         WHERE i.course_id = ?
         ORDER BY c.name",
        course_id,
    )?;

    Ok(FilterOptions {
        cohorts,
        marking_periods,
        benchmarks,
        assignment_types,
        categories,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradebookFilter {
    pub cohort_id: Option<String>,
    pub marking_period_id: Option<String>,
    pub benchmark_ids: Vec<String>,
    pub category_id: Option<String>,
    pub assignment_type_id: Option<String>,
    pub name: Option<String>,
    pub date_begin: Option<String>,
    pub date_end: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradebookView {
    pub students: Vec<Student>,
    pub items: Vec<Item>,
}

fn filtered_items(conn: &Connection, course_id: &str, filter: &GradebookFilter) -> Result<Vec<Item>> {
    let mut clauses: Vec<String> = vec!["i.course_id = ?".to_string()];
    let mut binds: Vec<Value> = vec![Value::Text(course_id.to_string())];

    if let Some(v) = &filter.marking_period_id {
        clauses.push("i.marking_period_id = ?".into());
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &filter.category_id {
        clauses.push("i.category_id = ?".into());
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &filter.assignment_type_id {
        clauses.push("i.assignment_type_id = ?".into());
        binds.push(Value::Text(v.clone()));
    }
    if !filter.benchmark_ids.is_empty() {
        let placeholders = std::iter::repeat("?")
            .take(filter.benchmark_ids.len())
            .collect::<Vec<_>>()
            .join(",");
        clauses.push(format!("i.benchmark_id IN ({})", placeholders));
        for id in &filter.benchmark_ids {
            binds.push(Value::Text(id.clone()));
        }
    }
    if let Some(name) = filter.name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("instr(lower(i.name), lower(?)) > 0".into());
        binds.push(Value::Text(name.to_string()));
    }
    if let Some(d) = &filter.date_begin {
        clauses.push("i.date >= ?".into());
        binds.push(Value::Text(parse_iso_date(d, "dateBegin")?.to_string()));
    }
    if let Some(d) = &filter.date_end {
        clauses.push("i.date <= ?".into());
        binds.push(Value::Text(parse_iso_date(d, "dateEnd")?.to_string()));
    }

    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM items i WHERE {} ORDER BY i.date, i.name",
        clauses.join(" AND ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), item_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn enrolled_student_ids(conn: &Connection, course_id: &str, cohort_id: Option<&str>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT ce.student_id
         FROM course_enrollments ce
         JOIN students s ON s.id = ce.student_id
         WHERE ce.course_id = ?1 AND ce.role = ?2
           AND (?3 IS NULL OR EXISTS (
                 SELECT 1 FROM cohort_students cs
                 WHERE cs.cohort_id = ?3 AND cs.student_id = ce.student_id))
         ORDER BY s.last_name, s.first_name",
    )?;
    let rows = stmt
        .query_map((course_id, STUDENT_ROLE, cohort_id), |r| r.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Students and items of a course after applying the gradebook filter.
pub fn open(conn: &Connection, course_id: &str, filter: &GradebookFilter) -> Result<GradebookView> {
    require(conn, "courses", course_id, "course")?;
    if let (Some(b), Some(e)) = (&filter.date_begin, &filter.date_end) {
        if parse_iso_date(e, "dateEnd")? < parse_iso_date(b, "dateBegin")? {
            return Err(Error::BadParams("dateEnd must not precede dateBegin".into()));
        }
    }
    let items = filtered_items(conn, course_id, filter)?;
    let students = enrolled_student_ids(conn, course_id, filter.cohort_id.as_deref())?
        .iter()
        .map(|sid| roster::get_student(conn, sid))
        .collect::<Result<Vec<_>>>()?;
    Ok(GradebookView { students, items })
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillSummary {
    pub updated: usize,
    pub created: usize,
}

/// Mark an entire item column: every enrolled student receives `mark`.
pub fn fill_column(
    conn: &Connection,
    item_id: &str,
    demonstration_id: Option<&str>,
    mark: f64,
) -> Result<FillSummary> {
    if !mark.is_finite() {
        return Err(Error::BadParams("mark must be a finite number".into()));
    }
    let item: Option<(String, Option<f64>)> = conn
        .query_row(
            "SELECT course_id, points_possible FROM items WHERE id = ?",
            [item_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((course_id, points_possible)) = item else {
        return Err(Error::NotFound("item"));
    };
    if let Some(d) = demonstration_id {
        let owner: Option<String> = conn
            .query_row("SELECT item_id FROM demonstrations WHERE id = ?", [d], |r| r.get(0))
            .optional()?;
        match owner {
            None => return Err(Error::NotFound("demonstration")),
            Some(o) if o != item_id => {
                return Err(Error::BadParams("demonstration belongs to another item".into()))
            }
            Some(_) => {}
        }
    }
    let normalized = points_possible.filter(|p| *p > 0.0).map(|p| mark / p);

    let tx = conn.unchecked_transaction()?;
    let mut summary = FillSummary {
        updated: 0,
        created: 0,
    };
    for student_id in enrolled_student_ids(&tx, &course_id, None)? {
        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM marks WHERE item_id = ? AND demonstration_id IS ? AND student_id = ?",
                (item_id, demonstration_id, &student_id),
                |r| r.get(0),
            )
            .optional()?;
        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE marks SET mark = ?, normalized_mark = ? WHERE id = ?",
                    (mark, normalized, &id),
                )?;
                summary.updated += 1;
            }
            None => {
                tx.execute(
                    "INSERT INTO marks(id, item_id, demonstration_id, student_id, mark, normalized_mark)
                     VALUES(?, ?, ?, ?, ?, ?)",
                    (
                        Uuid::new_v4().to_string(),
                        item_id,
                        demonstration_id,
                        &student_id,
                        mark,
                        normalized,
                    ),
                )?;
                summary.created += 1;
            }
        }
    }
    tx.commit()?;
    tracing::debug!(item_id, created = summary.created, updated = summary.updated, "column filled");
    Ok(summary)
}
