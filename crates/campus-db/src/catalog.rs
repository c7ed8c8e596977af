use std::collections::BTreeMap;

use anyhow::Result;
use rusqlite::params;

use crate::models::{CategoryRow, CourseRow};
use crate::{Database, OptionalExt, map_unique};

impl Database {
    // -- Reference data --

    pub fn create_category(&self, name: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute("INSERT INTO categories (name) VALUES (?1)", [name]).map_err(map_unique)?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn create_course(&self, name: &str, category_ids: &[i64]) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("INSERT INTO courses (name) VALUES (?1)", [name]).map_err(map_unique)?;
            let course_id = tx.last_insert_rowid();
            for category_id in category_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO category_course (course_id, category_id) VALUES (?1, ?2)",
                    params![course_id, category_id],
                )?;
            }
            tx.commit()?;
            Ok(course_id)
        })
    }

    pub fn course_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM courses WHERE id = ?1", [id], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Every course with its categories, ordered by name.
    pub fn list_courses(&self) -> Result<Vec<CourseRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, g.id, g.name
                 FROM courses c
                 LEFT JOIN category_course cc ON cc.course_id = c.id
                 LEFT JOIN categories g ON g.id = cc.category_id
                 ORDER BY c.name, c.id, g.name",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // Group the flat join back into courses, keeping query order.
            let mut order: Vec<i64> = Vec::new();
            let mut courses: BTreeMap<i64, CourseRow> = BTreeMap::new();
            for (course_id, course_name, category_id, category_name) in rows {
                let course = courses.entry(course_id).or_insert_with(|| {
                    order.push(course_id);
                    CourseRow { id: course_id, name: course_name, categories: Vec::new() }
                });
                if let (Some(id), Some(name)) = (category_id, category_name) {
                    course.categories.push(CategoryRow { id, name });
                }
            }

            Ok(order.into_iter().filter_map(|id| courses.remove(&id)).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;

    #[test]
    fn courses_list_with_their_categories() {
        let db = Database::open_in_memory().unwrap();
        let math = db.create_category("Math").unwrap();
        let cs = db.create_category("Computer Science").unwrap();
        db.create_course("Linear Algebra", &[math]).unwrap();
        db.create_course("Algorithms", &[math, cs]).unwrap();
        db.create_course("Art History", &[]).unwrap();

        let courses = db.list_courses().unwrap();
        let names: Vec<&str> = courses.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Algorithms", "Art History", "Linear Algebra"]);

        let algorithms = &courses[0];
        let cats: Vec<&str> = algorithms.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(cats, vec!["Computer Science", "Math"]);
        assert!(courses[1].categories.is_empty());
    }

    #[test]
    fn course_existence_and_duplicate_names() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_course("Calculus", &[]).unwrap();
        assert!(db.course_exists(id).unwrap());
        assert!(!db.course_exists(id + 1).unwrap());

        let err = db.create_course("Calculus", &[]).unwrap_err();
        assert!(matches!(err.downcast_ref::<DbError>(), Some(DbError::Unique(_))));
    }
}
