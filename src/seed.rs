//! Demo database: houses, students, courses, enrollments and instructors.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::database::QueryRows;
use crate::error::{self, ConnectionError, ExecutionError};

const SCHEMA: &[&str] = &[
    "DROP TABLE IF EXISTS houses",
    "CREATE TABLE houses (
        house_id INTEGER PRIMARY KEY,
        house_name VARCHAR(50),
        head_of_house VARCHAR(50)
    )",
    "DROP TABLE IF EXISTS students",
    "CREATE TABLE students (
        student_id INTEGER PRIMARY KEY,
        name VARCHAR(50),
        house_id INTEGER,
        year INTEGER,
        FOREIGN KEY (house_id) REFERENCES houses(house_id)
    )",
    "DROP TABLE IF EXISTS courses",
    "CREATE TABLE courses (
        course_id INTEGER PRIMARY KEY,
        course_name VARCHAR(50),
        instructor_id INTEGER,
        FOREIGN KEY (instructor_id) REFERENCES instructors(instructor_id)
    )",
    "DROP TABLE IF EXISTS enrollments",
    "CREATE TABLE enrollments (
        enrollment_id INTEGER PRIMARY KEY,
        student_id INTEGER,
        course_id INTEGER,
        enrollment_date DATE,
        FOREIGN KEY (student_id) REFERENCES students(student_id),
        FOREIGN KEY (course_id) REFERENCES courses(course_id)
    )",
    "DROP TABLE IF EXISTS instructors",
    "CREATE TABLE instructors (
        instructor_id INTEGER PRIMARY KEY,
        name VARCHAR(50),
        course_id INTEGER,
        FOREIGN KEY (course_id) REFERENCES courses(course_id)
    )",
];

const HOUSES: &[(&str, &str)] = &[
    ("Gryffindor", "Minerva McGonagall"),
    ("Hufflepuff", "Pomona Sprout"),
    ("Ravenclaw", "Filius Flitwick"),
    ("Slytherin", "Severus Snape"),
];

// (name, house_id, year)
const STUDENTS: &[(&str, i64, i64)] = &[
    ("Harry Potter", 1, 5),
    ("Hermione Granger", 1, 5),
    ("Ron Weasley", 1, 5),
    ("Draco Malfoy", 4, 5),
    ("Luna Lovegood", 3, 5),
];

// (course_name, instructor_id)
const COURSES: &[(&str, i64)] = &[
    ("Defense Against the Dark Arts", 1),
    ("Potions", 2),
    ("Herbology", 3),
    ("Transfiguration", 4),
    ("Charms", 5),
];

// (student_id, course_id, enrollment_date)
const ENROLLMENTS: &[(i64, i64, &str)] = &[
    (1, 1, "2023-01-15"),
    (2, 1, "2023-01-15"),
    (3, 1, "2023-01-15"),
    (4, 1, "2023-01-15"),
    (5, 1, "2023-01-15"),
    (1, 2, "2023-01-16"),
    (4, 2, "2023-01-16"),
    (2, 3, "2023-01-17"),
    (5, 3, "2023-01-17"),
    (3, 4, "2023-01-18"),
];

// (name, course_id)
const INSTRUCTORS: &[(&str, i64)] = &[
    ("Remus Lupin", 1),
    ("Severus Snape", 2),
    ("Pomona Sprout", 3),
    ("Minerva McGonagall", 4),
    ("Filius Flitwick", 5),
];

/// (Re)create the demo tables in the SQLite file at `path`, creating the
/// file if needed. Returns the inserted students.
pub async fn seed(path: &Path) -> error::Result<QueryRows> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        // The demo rows reference tables created after them.
        .foreign_keys(false);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|source| ConnectionError::Open {
            target: format!("sqlite:{}", path.display()),
            source,
        })?;

    let mut tx = pool.begin().await.map_err(ExecutionError::from)?;

    for &statement in SCHEMA {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(ExecutionError::from)?;
    }
    for &(name, head) in HOUSES {
        sqlx::query("INSERT INTO houses (house_name, head_of_house) VALUES (?, ?)")
            .bind(name)
            .bind(head)
            .execute(&mut *tx)
            .await
            .map_err(ExecutionError::from)?;
    }
    for &(name, house_id, year) in STUDENTS {
        sqlx::query("INSERT INTO students (name, house_id, year) VALUES (?, ?, ?)")
            .bind(name)
            .bind(house_id)
            .bind(year)
            .execute(&mut *tx)
            .await
            .map_err(ExecutionError::from)?;
    }
    for &(name, instructor_id) in COURSES {
        sqlx::query("INSERT INTO courses (course_name, instructor_id) VALUES (?, ?)")
            .bind(name)
            .bind(instructor_id)
            .execute(&mut *tx)
            .await
            .map_err(ExecutionError::from)?;
    }
    for &(student_id, course_id, date) in ENROLLMENTS {
        sqlx::query(
            "INSERT INTO enrollments (student_id, course_id, enrollment_date) VALUES (?, ?, ?)",
        )
        .bind(student_id)
        .bind(course_id)
        .bind(date)
        .execute(&mut *tx)
        .await
        .map_err(ExecutionError::from)?;
    }
    for &(name, course_id) in INSTRUCTORS {
        sqlx::query("INSERT INTO instructors (name, course_id) VALUES (?, ?)")
            .bind(name)
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .map_err(ExecutionError::from)?;
    }

    tx.commit().await.map_err(ExecutionError::from)?;
    info!(path = %path.display(), "seeded demo database");

    let conn = crate::database::Connection::Sqlite(pool);
    let students = conn.execute("SELECT * FROM students").await?;
    conn.close().await;
    Ok(students)
}
