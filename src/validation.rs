use serde::Serialize;
use std::fmt;

/// Why a single field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Blank,
    Taken,
    Inclusion,
    Invalid,
    TooShort { min: usize },
    TooLong { max: usize },
    Confirmation,
    MustExist,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Blank => write!(f, "can't be blank"),
            ErrorKind::Taken => write!(f, "has already been taken"),
            ErrorKind::Inclusion => write!(f, "is not included in the list"),
            ErrorKind::Invalid => write!(f, "is invalid"),
            ErrorKind::TooShort { min } => {
                write!(f, "is too short (minimum is {} characters)", min)
            }
            ErrorKind::TooLong { max } => {
                write!(f, "is too long (maximum is {} characters)", max)
            }
            ErrorKind::Confirmation => write!(f, "doesn't match confirmation"),
            ErrorKind::MustExist => write!(f, "must exist"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub kind: ErrorKind,
}

/// Field-level errors collected while validating a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, kind: ErrorKind) {
        self.0.push(FieldError { field, kind });
    }

    /// Adds a `Blank` error when `value` is empty or whitespace only.
    /// Returns whether the value was present.
    pub fn require(&mut self, field: &'static str, value: &str) -> bool {
        if is_blank(value) {
            self.add(field, ErrorKind::Blank);
            false
        } else {
            true
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str, kind: ErrorKind) -> bool {
        self.0.iter().any(|e| e.field == field && e.kind == kind)
    }

    pub fn on(&self, field: &str) -> Vec<ErrorKind> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.kind)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self
            .iter()
            .map(|e| format!("{} {}", e.field, e.kind))
            .collect();
        write!(f, "{}", messages.join(", "))
    }
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
