//! Teacher accounts: registration with an argon2 password hash, and login.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use rand_core::OsRng;
use serde::Deserialize;
use thiserror::Error;

use crate::model::{ClassDetail, Teacher};
use crate::store::{StoreError, TeacherStore};

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("all fields are required")]
    MissingFields,
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(_) => Self::EmailTaken,
            other => Self::Store(other),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeacherSignup {
    pub name: String,
    pub email: String,
    pub password: String,
    pub school: String,
    pub phone: String,
    #[serde(default)]
    pub class_details: Vec<ClassDetail>,
}

pub fn hash_password(password: &str) -> Result<String, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AccountError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[derive(Clone)]
pub struct Accounts {
    teachers: Arc<dyn TeacherStore>,
}

impl Accounts {
    pub fn new(teachers: Arc<dyn TeacherStore>) -> Self {
        Self { teachers }
    }

    pub async fn register(&self, signup: TeacherSignup) -> Result<Teacher, AccountError> {
        let fields = [&signup.name, &signup.email, &signup.password, &signup.school, &signup.phone];
        if fields.iter().any(|f| f.trim().is_empty()) || signup.class_details.is_empty() {
            return Err(AccountError::MissingFields);
        }
        if self.teachers.find_by_email(&signup.email).await?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let teacher = Teacher {
            name: signup.name,
            email: signup.email,
            password_hash: hash_password(&signup.password)?,
            school: signup.school,
            phone: signup.phone,
            class_details: signup.class_details,
            registered_at: Utc::now(),
        };
        self.teachers.insert(&teacher).await?;
        tracing::info!(email = %teacher.email, "teacher registered");
        Ok(teacher)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Teacher, AccountError> {
        let teacher = self
            .teachers
            .find_by_email(email)
            .await?
            .ok_or(AccountError::InvalidCredentials)?;
        if !verify_password(password, &teacher.password_hash) {
            tracing::info!(email, "login rejected");
            return Err(AccountError::InvalidCredentials);
        }
        Ok(teacher)
    }
}
