use anyhow::Result;
use rusqlite::params;

use crate::Database;
use crate::accounts::{student_from_row, user_from_row};
use crate::models::{StudentRow, UserRow};

/// Escape LIKE metacharacters so the term matches literally, then wrap it
/// for a substring match. Pair with `ESCAPE '\'`.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

impl Database {
    // -- Directory search --

    /// Approved students other than `exclude_id` whose first name, last name
    /// or city contains `term`.
    pub fn search_students(&self, term: &str, exclude_id: &str) -> Result<Vec<StudentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"SELECT id, first_name, last_name, email, phone, streetnr, postal_code,
                         city, country, password, approved, created_at
                  FROM students
                  WHERE id != ?1
                    AND (first_name LIKE ?2 ESCAPE '\'
                         OR last_name LIKE ?2 ESCAPE '\'
                         OR city LIKE ?2 ESCAPE '\')
                    AND approved = 1
                  ORDER BY last_name COLLATE NOCASE, first_name COLLATE NOCASE, id",
            )?;

            let rows = stmt
                .query_map(params![exclude_id, like_pattern(term)], student_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Approved users with `role_id` other than `exclude_id` matching `term` on
    /// name fields, city, postal code, an enrolled course or a linked category.
    pub fn search_users(&self, term: &str, exclude_id: &str, role_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r"SELECT u.id, u.first_name, u.last_name, u.name, u.email, u.phone, u.street_nr,
                         u.postal_code, u.city, u.country, u.password, u.role_id,
                         u.profile_picture, u.approved, u.created_at
                  FROM users u
                  WHERE u.id != ?1
                    AND (u.first_name LIKE ?2 ESCAPE '\'
                         OR u.last_name LIKE ?2 ESCAPE '\'
                         OR u.name LIKE ?2 ESCAPE '\'
                         OR u.city LIKE ?2 ESCAPE '\'
                         OR u.postal_code LIKE ?2 ESCAPE '\'
                         OR EXISTS (SELECT 1 FROM course_user cu
                                    JOIN courses c ON c.id = cu.course_id
                                    WHERE cu.user_id = u.id AND c.name LIKE ?2 ESCAPE '\')
                         OR EXISTS (SELECT 1 FROM category_user gu
                                    JOIN categories g ON g.id = gu.category_id
                                    WHERE gu.user_id = u.id AND g.name LIKE ?2 ESCAPE '\'))
                    AND u.approved = 1
                    AND u.role_id = ?3
                  ORDER BY u.last_name COLLATE NOCASE, u.first_name COLLATE NOCASE, u.id",
            )?;

            let rows = stmt
                .query_map(params![exclude_id, like_pattern(term), role_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewEnrollment, NewStudent, NewUser};

    fn user(id: &str, name: &str, first: &str, last: &str, city: &str) -> NewUser {
        NewUser {
            id: id.into(),
            first_name: first.into(),
            last_name: last.into(),
            name: name.into(),
            email: format!("{name}@example.com"),
            phone: "0".into(),
            street_nr: "1".into(),
            postal_code: "9000".into(),
            city: city.into(),
            country: "BE".into(),
            password_hash: "hash".into(),
            role_id: 2,
            profile_picture: None,
        }
    }

    fn student(id: &str, first: &str, last: &str, city: &str) -> NewStudent {
        NewStudent {
            id: id.into(),
            first_name: first.into(),
            last_name: last.into(),
            email: format!("{id}@example.com"),
            phone: "0".into(),
            streetnr: "1".into(),
            postal_code: "9000".into(),
            city: city.into(),
            country: "BE".into(),
            password_hash: "hash".into(),
        }
    }

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("50%_a\\b"), "%50\\%\\_a\\\\b%");
    }

    #[test]
    fn student_search_filters_approval_and_requester() {
        let db = Database::open_in_memory().unwrap();
        for (id, first, last, city) in [
            ("s1", "Anna", "Peeters", "Leuven"),
            ("s2", "Bram", "Leuvenaar", "Ghent"),
            ("s3", "Chris", "Claes", "Leuven"),
            ("s4", "Dirk", "Dams", "Leuven"),
        ] {
            db.create_student(&student(id, first, last, city)).unwrap();
        }
        for id in ["s1", "s2", "s4"] {
            db.set_student_approved(id, true).unwrap();
        }

        let ids: Vec<String> = db
            .search_students("leuven", "s4")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        // s3 unapproved, s4 is the requester
        assert_eq!(ids, vec!["s2".to_string(), "s1".to_string()]);
    }

    #[test]
    fn user_search_reaches_courses_and_categories() {
        let db = Database::open_in_memory().unwrap();
        let math = db.create_category("Mathematics").unwrap();
        let c1 = db.create_course("Topology", &[math]).unwrap();
        let c2 = db.create_course("Pottery", &[]).unwrap();

        db.create_user(
            &user("u1", "alice", "Alice", "Archer", "Brussels"),
            &[NewEnrollment { course_id: c1, start_year: 2019, end_year: 2022 }],
        )
        .unwrap();
        db.create_user(
            &user("u2", "bob", "Bob", "Baker", "Liege"),
            &[NewEnrollment { course_id: c2, start_year: 2019, end_year: 2022 }],
        )
        .unwrap();
        let mut admin = user("u3", "root", "Root", "Admin", "Brussels");
        admin.role_id = 1;
        db.create_user(&admin, &[NewEnrollment { course_id: c1, start_year: 2019, end_year: 2020 }])
            .unwrap();
        for id in ["u1", "u2", "u3"] {
            db.set_user_approved(id, true).unwrap();
        }

        let by_course: Vec<String> =
            db.search_users("topo", "nobody", 2).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(by_course, vec!["u1".to_string()]);

        let by_category: Vec<String> =
            db.search_users("MATHEM", "nobody", 2).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(by_category, vec!["u1".to_string()]);

        let by_postal = db.search_users("9000", "u1", 2).unwrap();
        assert_eq!(by_postal.len(), 1);
        assert_eq!(by_postal[0].id, "u2");
    }

    #[test]
    fn wildcards_in_the_term_match_literally() {
        let db = Database::open_in_memory().unwrap();
        db.create_student(&student("s1", "Anna", "Peeters", "Leuven")).unwrap();
        db.set_student_approved("s1", true).unwrap();

        assert!(db.search_students("%%%", "x").unwrap().is_empty());
        assert!(db.search_students("___", "x").unwrap().is_empty());
    }
}
