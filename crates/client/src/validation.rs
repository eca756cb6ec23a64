//! Input validation and normalisation for the sign-in, registration,
//! profile and tracking forms.

use once_cell::sync::Lazy;
use parceldesk_config::TracksConfig;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{ValidationError, FORM_FIELD};

pub const KG_PREFIX: &str = "+996";
const KG_TAIL_DIGITS: usize = 9;
const FULL_NAME_MAX: usize = 150;
const PASSWORD_MIN: usize = 8;
const PASSWORD_MAX: usize = 128;

static KG_PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+996\d{9}$").expect("invalid phone pattern"));
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[^\s@]+@[^\s@]+\.[^\s@]{2,}$").expect("invalid email pattern"));
static LETTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-zА-Яа-яЁё]").expect("invalid letter pattern"));

/// Canonical `+996XXXXXXXXX` form: non-digits dropped, a leading country
/// code removed, at most nine subscriber digits kept.
pub fn normalize_kg_phone(input: &str) -> String {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    let tail = digits.strip_prefix("996").unwrap_or(&digits);
    let tail: String = tail.chars().take(KG_TAIL_DIGITS).collect();
    format!("{KG_PREFIX}{tail}")
}

/// Returns the normalised phone or the message for the `phone` field.
pub fn validate_kg_phone(input: &str) -> Result<String, ValidationError> {
    let phone = normalize_kg_phone(input);
    if phone.len() == KG_PREFIX.len() {
        return Err(ValidationError::single("phone", "Укажите телефон."));
    }
    if !KG_PHONE.is_match(&phone) {
        return Err(ValidationError::single("phone", "Введите 9 цифр после +996."));
    }
    Ok(phone)
}

pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::single("email", "Укажите e-mail."));
    }
    if !EMAIL.is_match(email) {
        return Err(ValidationError::single("email", "Некорректный e-mail."));
    }
    Ok(email.to_string())
}

/// Tracking numbers are sent without any whitespace.
pub fn sanitize_tracking_number(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

pub fn validate_tracking_number(raw: &str, limits: &TracksConfig) -> Result<String, ValidationError> {
    let tracking_number = sanitize_tracking_number(raw);
    let length = tracking_number.chars().count();
    if length == 0 {
        return Err(ValidationError::single("tracking_number", "Введите трек-номер."));
    }
    if length < limits.min_length || length > limits.max_length {
        return Err(ValidationError::single(
            "tracking_number",
            format!(
                "Длина трек-номера: {}-{} символов.",
                limits.min_length, limits.max_length
            ),
        ));
    }
    Ok(tracking_number)
}

/// Full name as edited on the profile page.
pub fn validate_full_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    let mut error = ValidationError::new();
    if name.is_empty() {
        error.add("full_name", "Укажите ФИО.");
    }
    if name.chars().count() > FULL_NAME_MAX {
        error.add("full_name", "Максимум 150 символов.");
    }
    if name.chars().any(|c| c.is_ascii_digit()) {
        error.add("full_name", "ФИО не должно содержать цифры.");
    }
    error.into_result().map(|_| name.to_string())
}

/// Rules for a password chosen through the reset link.
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    let mut error = ValidationError::new();
    let length = password.chars().count();

    if length < PASSWORD_MIN {
        error.add("new_password", "Минимум 8 символов.");
    } else if length > PASSWORD_MAX {
        error.add("new_password", "Слишком длинный пароль.");
    } else if password.chars().any(char::is_whitespace) {
        error.add("new_password", "Пароль не должен содержать пробелы.");
    } else if !LETTER.is_match(password) || !password.chars().any(|c| c.is_ascii_digit()) {
        error.add("new_password", "Пароль должен содержать буквы и цифры.");
    }

    if confirmation != password {
        error.add("new_password_confirm", "Пароли не совпадают.");
    }

    error.into_result()
}

/// Maps a sign-in failure detail to the text shown above the form.
pub fn translate_auth_error(detail: &str) -> &'static str {
    let detail = detail.to_lowercase();
    let has = |needle: &str| detail.contains(needle);

    if has("no active") || has("unable") || has("invalid") || has("неверн") {
        "Неверный телефон или пароль."
    } else if has("inactive") || has("disabled") || has("not active") {
        "Аккаунт не активирован."
    } else if has("too many") || has("throttle") || has("rate limit") {
        "Слишком много попыток. Попробуйте позже."
    } else {
        "Не удалось выполнить вход."
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub phone: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(phone: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            password: password.into(),
        }
    }

    /// Returns the normalised phone on success.
    pub fn validate(&self) -> Result<String, ValidationError> {
        let mut error = ValidationError::new();
        let phone = validate_kg_phone(&self.phone).map_err(|e| error.merge(e)).ok();
        if self.password.trim().is_empty() {
            error.add("password", "Укажите пароль.");
        }
        error.into_result()?;
        Ok(phone.unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub full_name: String,
    pub phone: String,
    pub pickup_point_id: Option<i64>,
    pub password: String,
    pub password_confirm: String,
}

impl RegisterForm {
    /// Returns the request body for `auth/register/`.
    pub fn validate(&self) -> Result<Value, ValidationError> {
        let mut error = ValidationError::new();
        let full_name = self.full_name.trim();
        if full_name.is_empty() {
            error.add("full_name", "Укажите ФИО.");
        }
        let phone = validate_kg_phone(&self.phone).map_err(|e| error.merge(e)).ok();
        if self.pickup_point_id.is_none() {
            error.add("pickup_point_id", "Выберите пункт выдачи заказов.");
        }
        if self.password.is_empty() {
            error.add("password", "Укажите пароль.");
        }
        if self.password_confirm.is_empty() {
            error.add("password_confirm", "Подтвердите пароль.");
        } else if self.password_confirm != self.password {
            error.add("password_confirm", "Пароли не совпадают.");
        }
        error.into_result()?;

        Ok(serde_json::json!({
            "full_name": full_name,
            "phone": phone.unwrap_or_default(),
            "pickup_point_id": self.pickup_point_id,
            "password": self.password,
        }))
    }
}

/// Editable part of the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileForm {
    pub full_name: String,
    pub email: Option<String>,
    pub pickup_point_id: Option<i64>,
}

impl ProfileForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut error = ValidationError::new();
        if let Err(e) = validate_full_name(&self.full_name) {
            error.merge(e);
        }
        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            if let Err(e) = validate_email(email) {
                error.merge(e);
            }
        }
        if self.pickup_point_id.is_none() {
            error.add("pickup_point_id", "Выберите ПВЗ.");
        }
        error.into_result()
    }

    /// PATCH body holding only the fields that differ from `initial`.
    /// An emptied e-mail is sent as `null`.
    pub fn changes_from(&self, initial: &ProfileForm) -> Map<String, Value> {
        let mut payload = Map::new();
        if self.full_name != initial.full_name {
            payload.insert("full_name".into(), Value::from(self.full_name.trim()));
        }
        let email = non_blank(self.email.as_deref());
        if email != non_blank(initial.email.as_deref()) {
            payload.insert(
                "email".into(),
                email.map(|e| Value::from(e.trim())).unwrap_or(Value::Null),
            );
        }
        if self.pickup_point_id != initial.pickup_point_id {
            payload.insert("pickup_point_id".into(), Value::from(self.pickup_point_id));
        }
        payload
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Checks done before the reset-confirm request: link parameters first,
/// then the new password.
pub fn validate_reset_confirmation(
    uid: &str,
    token: &str,
    password: &str,
    confirmation: &str,
) -> Result<(), ValidationError> {
    let mut error = ValidationError::new();
    if uid.trim().is_empty() {
        error.add(
            FORM_FIELD,
            "Отсутствует идентификатор (uid). Откройте ссылку из письма ещё раз.",
        );
    }
    if token.trim().is_empty() {
        error.add(FORM_FIELD, "Отсутствует токен. Откройте ссылку из письма ещё раз.");
    }
    if let Err(e) = validate_new_password(password, confirmation) {
        error.merge(e);
    }
    error.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_is_normalised_to_kg_format() {
        assert_eq!(normalize_kg_phone("0555 12-34-56"), "+996055512345");
        assert_eq!(normalize_kg_phone("+996 555 123 456"), "+996555123456");
        assert_eq!(normalize_kg_phone("996555123456789"), "+996555123456");
        assert_eq!(normalize_kg_phone(""), "+996");
    }

    #[test]
    fn phone_validation_messages() {
        assert_eq!(
            validate_kg_phone("+996").unwrap_err().get("phone"),
            Some("Укажите телефон.")
        );
        assert_eq!(
            validate_kg_phone("555 12").unwrap_err().get("phone"),
            Some("Введите 9 цифр после +996.")
        );
        assert_eq!(validate_kg_phone("555123456").unwrap(), "+996555123456");
    }

    #[test]
    fn tracking_number_rules() {
        let limits = TracksConfig::default();
        assert_eq!(
            validate_tracking_number(" LC 123\t45 ", &limits).unwrap(),
            "LC12345"
        );
        assert_eq!(
            validate_tracking_number("   ", &limits).unwrap_err().get("tracking_number"),
            Some("Введите трек-номер.")
        );
        let too_long = "X".repeat(33);
        assert_eq!(
            validate_tracking_number(&too_long, &limits)
                .unwrap_err()
                .get("tracking_number"),
            Some("Длина трек-номера: 1-32 символов.")
        );
        assert!(validate_tracking_number(&"X".repeat(32), &limits).is_ok());
    }

    #[test]
    fn email_rules() {
        assert_eq!(validate_email(" user@mail.kg ").unwrap(), "user@mail.kg");
        assert!(validate_email("user@mail").is_err());
        assert_eq!(
            validate_email("").unwrap_err().get("email"),
            Some("Укажите e-mail.")
        );
    }

    #[test]
    fn full_name_digit_message_wins() {
        let name = format!("{}1", "я".repeat(150));
        assert_eq!(
            validate_full_name(&name).unwrap_err().get("full_name"),
            Some("ФИО не должно содержать цифры.")
        );
        assert_eq!(
            validate_full_name(&"я".repeat(151)).unwrap_err().get("full_name"),
            Some("Максимум 150 символов.")
        );
    }

    #[test]
    fn new_password_rules() {
        assert_eq!(
            validate_new_password("abc1", "abc1").unwrap_err().get("new_password"),
            Some("Минимум 8 символов.")
        );
        assert_eq!(
            validate_new_password("abcd efg1", "abcd efg1")
                .unwrap_err()
                .get("new_password"),
            Some("Пароль не должен содержать пробелы.")
        );
        assert_eq!(
            validate_new_password("abcdefgh", "abcdefgh")
                .unwrap_err()
                .get("new_password"),
            Some("Пароль должен содержать буквы и цифры.")
        );
        assert_eq!(
            validate_new_password("пароль123", "пароль124")
                .unwrap_err()
                .get("new_password_confirm"),
            Some("Пароли не совпадают.")
        );
        assert!(validate_new_password("пароль123", "пароль123").is_ok());
    }

    #[test]
    fn login_errors_are_translated() {
        assert_eq!(
            translate_auth_error("No active account found with the given credentials"),
            "Неверный телефон или пароль."
        );
        assert_eq!(translate_auth_error("User is inactive"), "Аккаунт не активирован.");
        assert_eq!(
            translate_auth_error("Request was throttled"),
            "Слишком много попыток. Попробуйте позже."
        );
        assert_eq!(translate_auth_error(""), "Не удалось выполнить вход.");
    }

    #[test]
    fn register_form_collects_every_problem() {
        let form = RegisterForm {
            phone: "+996".into(),
            password: "secret".into(),
            password_confirm: "other".into(),
            ..RegisterForm::default()
        };
        let error = form.validate().unwrap_err();
        assert_eq!(error.get("full_name"), Some("Укажите ФИО."));
        assert_eq!(error.get("phone"), Some("Укажите телефон."));
        assert_eq!(error.get("pickup_point_id"), Some("Выберите пункт выдачи заказов."));
        assert_eq!(error.get("password_confirm"), Some("Пароли не совпадают."));
        assert!(error.get("password").is_none());
    }

    #[test]
    fn profile_changes_only_include_edited_fields() {
        let initial = ProfileForm {
            full_name: "Айбек".into(),
            email: Some("a@mail.kg".into()),
            pickup_point_id: Some(3),
        };
        assert!(initial.changes_from(&initial).is_empty());

        let edited = ProfileForm {
            email: Some(String::new()),
            pickup_point_id: Some(4),
            ..initial.clone()
        };
        let changes = edited.changes_from(&initial);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["email"], Value::Null);
        assert_eq!(changes["pickup_point_id"], Value::from(4));
    }

    #[test]
    fn reset_confirmation_requires_link_parameters() {
        let error = validate_reset_confirmation("", "tok", "пароль123", "пароль123").unwrap_err();
        assert!(error.get(FORM_FIELD).is_some_and(|m| m.contains("uid")));
    }
}
