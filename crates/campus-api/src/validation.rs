use anyhow::{Result, anyhow};
use campus_db::Database;
use campus_types::api::ImageUpload;
use chrono::Datelike;

use crate::error::{ApiError, ValidationErrors};
use crate::storage::{Image, ImageError, MAX_IMAGE_KIB};

/// Typed rule set of one operation.
///
/// Implementors enumerate the form's fields and run the checks for a request
/// value against a [`Validator`]. Every field reports its own first violation;
/// checks after a field's first failure are skipped.
pub trait Rules {
    const FIELDS: &'static [&'static str];

    fn check(&self, v: &mut Validator<'_>) -> Result<()>;

    fn field_names() -> Vec<String> {
        Self::FIELDS.iter().map(|f| f.to_string()).collect()
    }
}

/// Run `input`'s rules. `db` is needed only by uniqueness and existence checks;
/// pass `None` for rule sets that must not touch the store.
pub fn validate<R: Rules>(input: &R, db: Option<&Database>) -> std::result::Result<(), ApiError> {
    let mut v = Validator::new(db);
    input.check(&mut v)?;
    v.finish()
}

/// Columns that must be unique within their own table.
#[derive(Debug, Clone, Copy)]
pub enum Unique {
    StudentEmail,
    UserEmail,
    UserName,
}

pub struct Validator<'db> {
    db: Option<&'db Database>,
    errors: ValidationErrors,
}

impl<'db> Validator<'db> {
    pub fn new(db: Option<&'db Database>) -> Self {
        Self { db, errors: ValidationErrors::new() }
    }

    pub fn finish(self) -> std::result::Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation { errors: self.errors, old: None })
        }
    }

    pub fn has_error(&self, key: &str) -> bool {
        self.errors.contains_key(key)
    }

    fn store(&self) -> Result<&'db Database> {
        self.db.ok_or_else(|| anyhow!("rule needs the store but none was given"))
    }

    fn fail(&mut self, key: &str, message: String) {
        self.errors.entry(key.to_string()).or_insert(message);
    }

    pub fn text<'v>(&'v mut self, key: &'static str, value: &'v str) -> TextField<'v, 'db> {
        let failed = self.has_error(key);
        TextField { validator: self, key, value, failed }
    }

    /// `required|array|min:1`
    pub fn non_empty_list(&mut self, key: &str, len: usize) -> bool {
        if len == 0 {
            self.fail(key, format!("The {} field is required.", attribute(key)));
            return false;
        }
        true
    }

    /// Lists that must pair up index for index with another list.
    pub fn same_length(&mut self, key: &str, len: usize, other_key: &str, other_len: usize) {
        if len != other_len && !self.has_error(key) {
            self.fail(
                key,
                format!("The {} must have one entry per selected {}.", attribute(key), attribute(other_key)),
            );
        }
    }

    /// Every id must name an existing course (`courses.*` => `exists:courses,id`).
    pub fn existing_courses(&mut self, key: &str, ids: &[i64]) -> Result<()> {
        let db = self.store()?;
        for (i, id) in ids.iter().enumerate() {
            if !db.course_exists(*id)? {
                let element = format!("{key}.{i}");
                self.fail(&element, format!("The selected {} is invalid.", attribute(&element)));
            }
        }
        Ok(())
    }

    pub fn year(&mut self, key: String, value: Option<i32>) -> YearField<'_, 'db> {
        let failed = self.has_error(&key);
        YearField { validator: self, key, value, failed }
    }

    /// Optional image: decodable, an allowed type, at most `MAX_IMAGE_KIB`.
    pub fn image(&mut self, key: &str, upload: Option<&ImageUpload>) {
        let Some(upload) = upload else { return };
        if let Err(e) = Image::decode(upload) {
            let attr = attribute(key);
            let message = match e {
                ImageError::NotBase64 | ImageError::NotAnImage => format!("The {attr} must be an image."),
                ImageError::UnsupportedType => {
                    format!("The {attr} must be a file of type: jpeg, png, jpg, gif, svg.")
                }
                ImageError::TooLarge => {
                    format!("The {attr} may not be greater than {MAX_IMAGE_KIB} kilobytes.")
                }
            };
            self.fail(key, message);
        }
    }
}

/// Chainable checks on one text field.
pub struct TextField<'v, 'db> {
    validator: &'v mut Validator<'db>,
    key: &'static str,
    value: &'v str,
    failed: bool,
}

impl TextField<'_, '_> {
    fn reject(&mut self, message: String) {
        self.validator.fail(self.key, message);
        self.failed = true;
    }

    pub fn required(mut self) -> Self {
        if !self.failed && self.value.trim().is_empty() {
            self.reject(format!("The {} field is required.", attribute(self.key)));
        }
        self
    }

    pub fn max(mut self, chars: usize) -> Self {
        if !self.failed && self.value.chars().count() > chars {
            self.reject(format!(
                "The {} may not be greater than {} characters.",
                attribute(self.key),
                chars
            ));
        }
        self
    }

    pub fn min(mut self, chars: usize) -> Self {
        if !self.failed && self.value.chars().count() < chars {
            self.reject(format!("The {} must be at least {} characters.", attribute(self.key), chars));
        }
        self
    }

    pub fn email(mut self) -> Self {
        if !self.failed && !is_email(self.value) {
            self.reject(format!("The {} must be a valid email address.", attribute(self.key)));
        }
        self
    }

    /// Value must equal its `<field>_confirmation` companion.
    pub fn confirmed(mut self, confirmation: &str) -> Self {
        if !self.failed && self.value != confirmation {
            self.reject(format!("The {} confirmation does not match.", attribute(self.key)));
        }
        self
    }

    pub fn unique(mut self, column: Unique) -> Result<Self> {
        if self.failed {
            return Ok(self);
        }
        let db = self.validator.store()?;
        let taken = match column {
            Unique::StudentEmail => db.student_email_taken(self.value)?,
            Unique::UserEmail => db.user_email_taken(self.value)?,
            Unique::UserName => db.user_name_taken(self.value)?,
        };
        if taken {
            self.reject(format!("The {} has already been taken.", attribute(self.key)));
        }
        Ok(self)
    }
}

/// Chainable checks on one year element.
pub struct YearField<'v, 'db> {
    validator: &'v mut Validator<'db>,
    key: String,
    value: Option<i32>,
    failed: bool,
}

impl YearField<'_, '_> {
    fn reject(&mut self, message: String) {
        self.validator.fail(&self.key, message);
        self.failed = true;
    }

    pub fn required(mut self) -> Self {
        if !self.failed && self.value.is_none() {
            self.reject(format!("The {} field is required.", attribute(&self.key)));
        }
        self
    }

    pub fn between(mut self, min: i32, max: i32) -> Self {
        if let (false, Some(year)) = (self.failed, self.value) {
            if year < min || year > max {
                self.reject(format!("The {} must be between {} and {}.", attribute(&self.key), min, max));
            }
        }
        self
    }

    /// `gte:<other>`; skipped when the other value is itself missing.
    pub fn at_least(mut self, other: Option<i32>, other_key: &str) -> Self {
        if let (false, Some(year), Some(floor)) = (self.failed, self.value, other) {
            if year < floor {
                self.reject(format!(
                    "The {} must be greater than or equal to {}.",
                    attribute(&self.key),
                    attribute(other_key)
                ));
            }
        }
        self
    }
}

pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Human form of a field key: `start_years.1` -> `start years.1`.
pub fn attribute(key: &str) -> String {
    key.replace('_', " ")
}

/// Email shape check: one `@`, a non-empty local part, and a domain made of
/// non-empty labels of letters, digits and hyphens. No whitespace anywhere.
pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || domain.is_empty() || domain.len() > 255 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    let local_ok = local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-/=?^_`{|}~.".contains(c));
    let domain_ok = domain.split('.').all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    local_ok && domain_ok
}
