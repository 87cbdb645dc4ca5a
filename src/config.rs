use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub enforce_transitions: bool,
    /// `(token, email)` pairs accepted by the static identity verifier.
    pub auth_tokens: Vec<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 5000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            enforce_transitions: parse_or_default("ENFORCE_TRANSITIONS", false)?,
            auth_tokens: parse_token_pairs(&env::var("AUTH_TOKENS").unwrap_or_default())?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

pub fn parse_token_pairs(raw: &str) -> Result<Vec<(String, String)>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (token, email) = entry.split_once('=').ok_or_else(|| {
                AppError::Internal(format!("invalid AUTH_TOKENS entry: {entry}"))
            })?;
            let (token, email) = (token.trim(), email.trim());
            if token.is_empty() || email.is_empty() {
                return Err(AppError::Internal(format!(
                    "invalid AUTH_TOKENS entry: {entry}"
                )));
            }
            Ok((token.to_string(), email.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_token_pairs;

    #[test]
    fn token_pairs_are_split_and_trimmed() {
        let pairs = parse_token_pairs(" t1=a@x.com , t2=b@x.com,").unwrap();
        assert_eq!(
            pairs,
            vec![
                ("t1".to_string(), "a@x.com".to_string()),
                ("t2".to_string(), "b@x.com".to_string()),
            ]
        );
    }

    #[test]
    fn entry_without_separator_is_rejected() {
        assert!(parse_token_pairs("t1").is_err());
        assert!(parse_token_pairs("=a@x.com").is_err());
    }
}
