use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub existing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn normalize_phone(raw: Option<&str>, fallback: &str) -> String {
    let Some(raw) = raw else {
        return fallback.to_string();
    };

    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let plus_prefixed = raw.trim_start().starts_with('+');

    if digits.len() == 10 {
        // local MX number, assume country code 52
        return format!("+52{digits}");
    }
    if plus_prefixed && (11..=15).contains(&digits.len()) {
        return format!("+{digits}");
    }
    if digits.len() == 12 && digits.starts_with("52") {
        return format!("+{digits}");
    }

    fallback.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Maria.Lopez@Example.COM "), "maria.lopez@example.com");
    }

    #[test]
    fn ten_digit_phone_gets_country_code() {
        assert_eq!(
            normalize_phone(Some("55 1234 5678"), "+525500000000"),
            "+525512345678"
        );
    }

    #[test]
    fn e164_phone_is_kept() {
        assert_eq!(
            normalize_phone(Some("+52 (55) 1234-5678"), "+525500000000"),
            "+525512345678"
        );
    }

    #[test]
    fn unparseable_phone_falls_back_to_default() {
        assert_eq!(normalize_phone(Some("n/a"), "+525500000000"), "+525500000000");
        assert_eq!(normalize_phone(None, "+525500000000"), "+525500000000");
    }
}
