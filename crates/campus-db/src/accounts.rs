use anyhow::Result;
use rusqlite::{Connection, Row, params};

use crate::models::{
    CategoryRow, EnrollmentRow, NewEnrollment, NewStudent, NewUser, ProfileUpdated, StudentRow, UserRow,
    UserUpdate,
};
use crate::{Database, DbError, OptionalExt, map_unique};

const STUDENT_COLUMNS: &str = "id, first_name, last_name, email, phone, streetnr, postal_code, \
     city, country, password, approved, created_at";

const USER_COLUMNS: &str = "id, first_name, last_name, name, email, phone, street_nr, \
     postal_code, city, country, password, role_id, profile_picture, approved, created_at";

impl Database {
    // -- Students --

    pub fn create_student(&self, student: &NewStudent) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO students (id, first_name, last_name, email, phone, streetnr, postal_code, city, country, password)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    student.id,
                    student.first_name,
                    student.last_name,
                    student.email,
                    student.phone,
                    student.streetnr,
                    student.postal_code,
                    student.city,
                    student.country,
                    student.password_hash,
                ],
            )
            .map_err(map_unique)?;
            Ok(())
        })
    }

    pub fn get_student_by_id(&self, id: &str) -> Result<Option<StudentRow>> {
        self.with_conn(|conn| query_student(conn, "id", id))
    }

    pub fn get_student_by_email(&self, email: &str) -> Result<Option<StudentRow>> {
        self.with_conn(|conn| query_student(conn, "email", email))
    }

    pub fn student_email_taken(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| exists(conn, "SELECT 1 FROM students WHERE email = ?1", email))
    }

    pub fn set_student_approved(&self, id: &str, approved: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("UPDATE students SET approved = ?2 WHERE id = ?1", params![id, approved])?;
            Ok(n > 0)
        })
    }

    /// Removes the student and any sessions it holds.
    pub fn delete_student(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM sessions WHERE scope = 'student' AND account_id = ?1", [id])?;
            let n = tx.execute("DELETE FROM students WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(n > 0)
        })
    }

    // -- Users --

    /// Insert a user together with its enrollments in one transaction.
    ///
    /// For each enrollment the course's categories are resolved and attached
    /// first (a category already linked is left alone), then the course row
    /// with its years. A missing course rolls the whole registration back.
    pub fn create_user(&self, user: &NewUser, enrollments: &[NewEnrollment]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO users (id, first_name, last_name, name, email, phone, street_nr, postal_code, city, country, password, role_id, profile_picture)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    user.id,
                    user.first_name,
                    user.last_name,
                    user.name,
                    user.email,
                    user.phone,
                    user.street_nr,
                    user.postal_code,
                    user.city,
                    user.country,
                    user.password_hash,
                    user.role_id,
                    user.profile_picture,
                ],
            )
            .map_err(map_unique)?;

            for enrollment in enrollments {
                let category_ids = course_category_ids(&tx, enrollment.course_id)?;
                for category_id in category_ids {
                    tx.execute(
                        "INSERT OR IGNORE INTO category_user (user_id, category_id) VALUES (?1, ?2)",
                        params![user.id, category_id],
                    )?;
                }
                tx.execute(
                    "INSERT INTO course_user (user_id, course_id, start_year, end_year) VALUES (?1, ?2, ?3, ?4)",
                    params![user.id, enrollment.course_id, enrollment.start_year, enrollment.end_year],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_name(&self, name: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "name", name))
    }

    pub fn user_email_taken(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| exists(conn, "SELECT 1 FROM users WHERE email = ?1", email))
    }

    pub fn user_name_taken(&self, name: &str) -> Result<bool> {
        self.with_conn(|conn| exists(conn, "SELECT 1 FROM users WHERE name = ?1", name))
    }

    /// Overwrite the editable profile columns and, when the update carries
    /// one, the picture reference, all in one transaction. Returns `None` if
    /// the user is gone.
    pub fn update_user_profile(&self, id: &str, update: &UserUpdate) -> Result<Option<ProfileUpdated>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let current: Option<Option<String>> = tx
                .query_row("SELECT profile_picture FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            let Some(current) = current else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE users SET first_name = ?2, last_name = ?3, name = ?4, email = ?5, phone = ?6,
                        street_nr = ?7, postal_code = ?8, city = ?9, country = ?10,
                        profile_picture = COALESCE(?11, profile_picture)
                 WHERE id = ?1",
                params![
                    id,
                    update.first_name,
                    update.last_name,
                    update.name,
                    update.email,
                    update.phone,
                    update.street_nr,
                    update.postal_code,
                    update.city,
                    update.country,
                    update.profile_picture,
                ],
            )
            .map_err(map_unique)?;
            tx.commit()?;

            let replaced_picture = match &update.profile_picture {
                Some(_) => current,
                None => None,
            };
            Ok(Some(ProfileUpdated { replaced_picture }))
        })
    }

    pub fn set_user_approved(&self, id: &str, approved: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("UPDATE users SET approved = ?2 WHERE id = ?1", params![id, approved])?;
            Ok(n > 0)
        })
    }

    /// Removes the user; enrollment and category links cascade, sessions are
    /// deleted explicitly since they are not tied to one table.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM sessions WHERE scope = 'user' AND account_id = ?1", [id])?;
            let n = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(n > 0)
        })
    }

    pub fn get_user_enrollments(&self, user_id: &str) -> Result<Vec<EnrollmentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cu.course_id, c.name, cu.start_year, cu.end_year
                 FROM course_user cu
                 JOIN courses c ON c.id = cu.course_id
                 WHERE cu.user_id = ?1
                 ORDER BY cu.start_year, c.name",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(EnrollmentRow {
                        course_id: row.get(0)?,
                        course_name: row.get(1)?,
                        start_year: row.get(2)?,
                        end_year: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_user_categories(&self, user_id: &str) -> Result<Vec<CategoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name
                 FROM category_user gu
                 JOIN categories g ON g.id = gu.category_id
                 WHERE gu.user_id = ?1
                 ORDER BY g.name",
            )?;
            let rows = stmt
                .query_map([user_id], |row| Ok(CategoryRow { id: row.get(0)?, name: row.get(1)? }))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Category ids of a course; fails with `CourseNotFound` if the course does not exist.
fn course_category_ids(conn: &Connection, course_id: i64) -> Result<Vec<i64>> {
    let found = conn
        .query_row("SELECT id FROM courses WHERE id = ?1", [course_id], |row| row.get::<_, i64>(0))
        .optional()?;
    if found.is_none() {
        return Err(DbError::CourseNotFound(course_id).into());
    }

    let mut stmt = conn.prepare("SELECT category_id FROM category_course WHERE course_id = ?1")?;
    let ids = stmt
        .query_map([course_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(ids)
}

fn exists(conn: &Connection, sql: &str, value: &str) -> Result<bool> {
    let found = conn.query_row(sql, [value], |_| Ok(())).optional()?;
    Ok(found.is_some())
}

// `column` is always one of the literals above, never caller input.
fn query_student(conn: &Connection, column: &str, value: &str) -> Result<Option<StudentRow>> {
    let sql = format!("SELECT {STUDENT_COLUMNS} FROM students WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], student_from_row).optional()
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], user_from_row).optional()
}

pub(crate) fn student_from_row(row: &Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        streetnr: row.get(5)?,
        postal_code: row.get(6)?,
        city: row.get(7)?,
        country: row.get(8)?,
        password: row.get(9)?,
        approved: row.get(10)?,
        created_at: row.get(11)?,
    })
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        street_nr: row.get(6)?,
        postal_code: row.get(7)?,
        city: row.get(8)?,
        country: row.get(9)?,
        password: row.get(10)?,
        role_id: row.get(11)?,
        profile_picture: row.get(12)?,
        approved: row.get(13)?,
        created_at: row.get(14)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::NewEnrollment;

    pub(crate) fn new_user(id: &str, name: &str, email: &str) -> NewUser {
        NewUser {
            id: id.to_string(),
            first_name: "Alice".into(),
            last_name: "Archer".into(),
            name: name.into(),
            email: email.into(),
            phone: "0123".into(),
            street_nr: "Main St 1".into(),
            postal_code: "1000".into(),
            city: "Brussels".into(),
            country: "BE".into(),
            password_hash: "hash".into(),
            role_id: 2,
            profile_picture: None,
        }
    }

    fn new_student(id: &str, email: &str) -> NewStudent {
        NewStudent {
            id: id.to_string(),
            first_name: "Sam".into(),
            last_name: "Student".into(),
            email: email.into(),
            phone: "0123".into(),
            streetnr: "Main St 1".into(),
            postal_code: "1000".into(),
            city: "Ghent".into(),
            country: "BE".into(),
            password_hash: "hash".into(),
        }
    }

    #[test]
    fn student_starts_unapproved() {
        let db = Database::open_in_memory().unwrap();
        db.create_student(&new_student("s1", "sam@example.com")).unwrap();

        let row = db.get_student_by_email("sam@example.com").unwrap().unwrap();
        assert_eq!(row.id, "s1");
        assert!(!row.approved);

        assert!(db.set_student_approved("s1", true).unwrap());
        assert!(db.get_student_by_id("s1").unwrap().unwrap().approved);
    }

    #[test]
    fn duplicate_student_email_is_a_unique_error() {
        let db = Database::open_in_memory().unwrap();
        db.create_student(&new_student("s1", "sam@example.com")).unwrap();

        let err = db.create_student(&new_student("s2", "sam@example.com")).unwrap_err();
        let db_err = err.downcast_ref::<DbError>().expect("typed error");
        assert_eq!(db_err.unique_column(), Some("email"));
    }

    #[test]
    fn student_and_user_emails_are_separate_domains() {
        let db = Database::open_in_memory().unwrap();
        db.create_student(&new_student("s1", "same@example.com")).unwrap();
        db.create_user(&new_user("u1", "alice", "same@example.com"), &[]).unwrap();

        assert!(db.student_email_taken("same@example.com").unwrap());
        assert!(db.user_email_taken("same@example.com").unwrap());
        assert!(db.get_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_display_name_is_a_unique_error() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("u1", "alice", "a@example.com"), &[]).unwrap();

        let err = db.create_user(&new_user("u2", "alice", "b@example.com"), &[]).unwrap_err();
        let db_err = err.downcast_ref::<DbError>().expect("typed error");
        assert_eq!(db_err.unique_column(), Some("name"));
        assert!(db.get_user_by_id("u2").unwrap().is_none());
    }

    #[test]
    fn enrollment_attaches_course_categories_once() {
        let db = Database::open_in_memory().unwrap();
        let math = db.create_category("Math").unwrap();
        let physics = db.create_category("Physics").unwrap();
        let c1 = db.create_course("Calculus", &[math]).unwrap();
        let c2 = db.create_course("Mechanics", &[math, physics]).unwrap();

        let enrollments = [
            NewEnrollment { course_id: c1, start_year: 2020, end_year: 2024 },
            NewEnrollment { course_id: c2, start_year: 2021, end_year: 2022 },
        ];
        db.create_user(&new_user("u1", "alice", "a@example.com"), &enrollments).unwrap();

        let courses = db.get_user_enrollments("u1").unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].course_name, "Calculus");
        assert_eq!((courses[0].start_year, courses[0].end_year), (2020, 2024));

        let names: Vec<String> = db.get_user_categories("u1").unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Math".to_string(), "Physics".to_string()]);
    }

    #[test]
    fn unknown_course_rolls_back_registration() {
        let db = Database::open_in_memory().unwrap();
        let enrollments = [NewEnrollment { course_id: 99, start_year: 2020, end_year: 2021 }];

        let err = db.create_user(&new_user("u1", "alice", "a@example.com"), &enrollments).unwrap_err();
        assert!(matches!(err.downcast_ref::<DbError>(), Some(DbError::CourseNotFound(99))));
        assert!(db.get_user_by_id("u1").unwrap().is_none());
    }

    #[test]
    fn inverted_years_are_rejected_by_the_store() {
        let db = Database::open_in_memory().unwrap();
        let c1 = db.create_course("Calculus", &[]).unwrap();
        let enrollments = [NewEnrollment { course_id: c1, start_year: 2024, end_year: 2020 }];

        assert!(db.create_user(&new_user("u1", "alice", "a@example.com"), &enrollments).is_err());
        assert!(db.get_user_by_id("u1").unwrap().is_none());
    }

    fn profile_update(name: &str, email: &str, picture: Option<&str>) -> UserUpdate {
        UserUpdate {
            first_name: "Alicia".into(),
            last_name: "Archer".into(),
            name: name.into(),
            email: email.into(),
            phone: "0456".into(),
            street_nr: "Side St 2".into(),
            postal_code: "2000".into(),
            city: "Antwerp".into(),
            country: "BE".into(),
            profile_picture: picture.map(str::to_string),
        }
    }

    #[test]
    fn profile_update_and_picture_swap() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("u1", "alice", "a@example.com"), &[]).unwrap();

        let done = db.update_user_profile("u1", &profile_update("alicia", "alicia@example.com", None)).unwrap();
        assert_eq!(done, Some(ProfileUpdated { replaced_picture: None }));
        let row = db.get_user_by_name("alicia").unwrap().unwrap();
        assert_eq!(row.city, "Antwerp");
        assert_eq!(row.profile_picture, None);

        let done = db
            .update_user_profile("u1", &profile_update("alicia", "alicia@example.com", Some("profile-pictures/a.png")))
            .unwrap();
        assert_eq!(done, Some(ProfileUpdated { replaced_picture: None }));

        let done = db
            .update_user_profile("u1", &profile_update("alicia", "alicia@example.com", Some("profile-pictures/b.png")))
            .unwrap();
        assert_eq!(done, Some(ProfileUpdated { replaced_picture: Some("profile-pictures/a.png".into()) }));

        // No new picture keeps the current reference.
        db.update_user_profile("u1", &profile_update("alicia", "alicia@example.com", None)).unwrap();
        let row = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(row.profile_picture.as_deref(), Some("profile-pictures/b.png"));

        assert_eq!(db.update_user_profile("nobody", &profile_update("x", "x@example.com", None)).unwrap(), None);
    }

    #[test]
    fn conflicting_profile_update_keeps_fields_and_picture() {
        let db = Database::open_in_memory().unwrap();
        let mut alice = new_user("u1", "alice", "a@example.com");
        alice.profile_picture = Some("profile-pictures/old.png".into());
        db.create_user(&alice, &[]).unwrap();
        db.create_user(&new_user("u2", "bob", "b@example.com"), &[]).unwrap();

        let clash = profile_update("alicia", "b@example.com", Some("profile-pictures/new.png"));
        let err = db.update_user_profile("u1", &clash).unwrap_err();
        assert_eq!(err.downcast_ref::<DbError>().and_then(|e| e.unique_column()), Some("email"));

        let row = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(row.name, "alice");
        assert_eq!(row.email, "a@example.com");
        assert_eq!(row.profile_picture.as_deref(), Some("profile-pictures/old.png"));
    }

    #[test]
    fn deleting_a_user_cascades_links() {
        let db = Database::open_in_memory().unwrap();
        let math = db.create_category("Math").unwrap();
        let c1 = db.create_course("Calculus", &[math]).unwrap();
        let enrollments = [NewEnrollment { course_id: c1, start_year: 2020, end_year: 2024 }];
        db.create_user(&new_user("u1", "alice", "a@example.com"), &enrollments).unwrap();

        assert!(db.delete_user("u1").unwrap());
        let leftover: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM course_user) + (SELECT COUNT(*) FROM category_user)",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(leftover, 0);
        assert!(!db.delete_user("u1").unwrap());
    }
}
