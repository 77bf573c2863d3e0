//! Form drafts for login, registration, and persona creation, with the same rules the backend
//! enforces so errors show up before a request is made.

use crate::api::{NewPersona, RegisterRequest};

const PERSONA_FIELD_MAX: usize = 512;
const PERSONA_AGE_MAX: u32 = 120;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },
    #[error("age must be a whole number between 0 and 120")]
    InvalidAge,
    #[error("username may only contain letters, numbers, underscores, and hyphens")]
    InvalidUsername,
    #[error("email address is not valid")]
    InvalidEmail,
    #[error("password must contain an uppercase letter, a lowercase letter, and a digit")]
    WeakPassword,
    #[error("passwords do not match")]
    PasswordMismatch,
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(v.to_string())
}

fn bounded(field: &'static str, value: &str, min: usize, max: usize) -> Result<String, ValidationError> {
    let v = required(field, value)?;
    let len = v.chars().count();
    if len < min {
        return Err(ValidationError::TooShort { field, min });
    }
    if len > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(v)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    /// Trimmed username and the password as typed.
    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        let username = required("username", &self.username)?;
        if self.password.is_empty() {
            return Err(ValidationError::Required("password"));
        }
        Ok((username, self.password.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterForm {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<RegisterRequest, ValidationError> {
        let username = bounded("username", &self.username, 3, 30)?;
        if !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ValidationError::InvalidUsername);
        }
        let full_name = bounded("full name", &self.full_name, 1, 100)?;
        let email = required("email", &self.email)?;
        if !looks_like_email(&email) {
            return Err(ValidationError::InvalidEmail);
        }
        if self.password.is_empty() {
            return Err(ValidationError::Required("password"));
        }
        if self.password.chars().count() < 8 {
            return Err(ValidationError::TooShort {
                field: "password",
                min: 8,
            });
        }
        let p = &self.password;
        if !(p.chars().any(|c| c.is_ascii_uppercase())
            && p.chars().any(|c| c.is_ascii_lowercase())
            && p.chars().any(|c| c.is_ascii_digit()))
        {
            return Err(ValidationError::WeakPassword);
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(RegisterRequest {
            username: username.to_lowercase(),
            full_name,
            email,
            password: self.password.clone(),
        })
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.contains(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

/// Persona creation draft; every field is kept as typed text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonaForm {
    pub name: String,
    pub age: String,
    pub location: String,
    pub description: String,
    pub education: String,
    pub tech_skills: String,
    pub soft_skills: String,
    pub strenghts: String,
    pub weaknesses: String,
    pub goals: String,
    pub hobbies: String,
    pub personality: String,
    pub avatar: Option<String>,
}

impl PersonaForm {
    /// Labels and mutable slots for every text field, in display order.
    pub fn fields_mut(&mut self) -> [(&'static str, &mut String); 12] {
        [
            ("Name", &mut self.name),
            ("Age", &mut self.age),
            ("Location", &mut self.location),
            ("Description", &mut self.description),
            ("Education", &mut self.education),
            ("Tech skills", &mut self.tech_skills),
            ("Soft skills", &mut self.soft_skills),
            ("Strengths", &mut self.strenghts),
            ("Weaknesses", &mut self.weaknesses),
            ("Goals", &mut self.goals),
            ("Hobbies", &mut self.hobbies),
            ("Personality", &mut self.personality),
        ]
    }

    pub fn validate(&self) -> Result<NewPersona, ValidationError> {
        let text = |field, value: &str| bounded(field, value, 1, PERSONA_FIELD_MAX);
        let name = text("name", &self.name)?;
        let age = required("age", &self.age)?
            .parse::<u32>()
            .ok()
            .filter(|a| *a <= PERSONA_AGE_MAX)
            .ok_or(ValidationError::InvalidAge)?;
        Ok(NewPersona {
            name,
            age,
            location: text("location", &self.location)?,
            description: text("description", &self.description)?,
            education: text("education", &self.education)?,
            tech_skills: text("tech skills", &self.tech_skills)?,
            soft_skills: text("soft skills", &self.soft_skills)?,
            strenghts: text("strengths", &self.strenghts)?,
            weaknesses: text("weaknesses", &self.weaknesses)?,
            goals: text("goals", &self.goals)?,
            hobbies: text("hobbies", &self.hobbies)?,
            personality: text("personality", &self.personality)?,
            avatar: self
                .avatar
                .as_ref()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty() && a != "default"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_form() -> RegisterForm {
        RegisterForm {
            username: "Ana_Silva".to_string(),
            full_name: " Ana Silva ".to_string(),
            email: "ana@example.com".to_string(),
            password: "Secret123".to_string(),
            confirm_password: "Secret123".to_string(),
        }
    }

    fn persona_form() -> PersonaForm {
        let mut f = PersonaForm {
            name: " Maria ".to_string(),
            age: "31".to_string(),
            ..PersonaForm::default()
        };
        for (label, slot) in f.fields_mut().into_iter().skip(2) {
            *slot = format!("{} text", label);
        }
        f
    }

    #[test]
    fn login_requires_both_fields() {
        let mut f = LoginForm::default();
        assert_eq!(f.validate(), Err(ValidationError::Required("username")));
        f.username = " ana ".to_string();
        assert_eq!(f.validate(), Err(ValidationError::Required("password")));
        f.password = "x".to_string();
        assert_eq!(f.validate(), Ok(("ana".to_string(), "x".to_string())));
    }

    #[test]
    fn register_accepts_valid_form() {
        let req = register_form().validate().unwrap();
        assert_eq!(req.username, "ana_silva");
        assert_eq!(req.full_name, "Ana Silva");
    }

    #[test]
    fn register_rules() {
        let mut f = register_form();
        f.username = "an".to_string();
        assert_eq!(
            f.validate(),
            Err(ValidationError::TooShort { field: "username", min: 3 })
        );

        let mut f = register_form();
        f.username = "ana silva".to_string();
        assert_eq!(f.validate(), Err(ValidationError::InvalidUsername));

        let mut f = register_form();
        f.email = "ana@localhost".to_string();
        assert_eq!(f.validate(), Err(ValidationError::InvalidEmail));

        let mut f = register_form();
        f.password = "secret123".to_string();
        f.confirm_password = f.password.clone();
        assert_eq!(f.validate(), Err(ValidationError::WeakPassword));

        let mut f = register_form();
        f.confirm_password = "Secret124".to_string();
        assert_eq!(f.validate(), Err(ValidationError::PasswordMismatch));
    }

    #[test]
    fn persona_form_builds_payload() {
        let p = persona_form().validate().unwrap();
        assert_eq!(p.name, "Maria");
        assert_eq!(p.age, 31);
        assert_eq!(p.strenghts, "Strengths text");
        assert!(p.avatar.is_none());
    }

    #[test]
    fn persona_age_and_required_fields() {
        let mut f = persona_form();
        f.age = "121".to_string();
        assert_eq!(f.validate(), Err(ValidationError::InvalidAge));
        f.age = "abc".to_string();
        assert_eq!(f.validate(), Err(ValidationError::InvalidAge));
        f.age = String::new();
        assert_eq!(f.validate(), Err(ValidationError::Required("age")));

        let mut f = persona_form();
        f.hobbies = "   ".to_string();
        assert_eq!(f.validate(), Err(ValidationError::Required("hobbies")));

        let mut f = persona_form();
        f.goals = "x".repeat(513);
        assert_eq!(
            f.validate(),
            Err(ValidationError::TooLong { field: "goals", max: 512 })
        );
    }

    #[test]
    fn persona_avatar_default_is_omitted() {
        let mut f = persona_form();
        f.avatar = Some("default".to_string());
        assert!(f.validate().unwrap().avatar.is_none());
        f.avatar = Some("Avatar_2".to_string());
        assert_eq!(f.validate().unwrap().avatar.as_deref(), Some("Avatar_2"));
    }
}
