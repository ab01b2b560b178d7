//! Startup checks for credentials collaborators read from the environment

use log::debug;

use crate::error::{Result, VaultflowError};

/// Fail if any of `vars` is unset or empty according to `lookup`
pub fn check_required_env<F>(owner: &str, vars: &[String], lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let missing: Vec<&str> = vars
        .iter()
        .map(String::as_str)
        .filter(|var| lookup(var).is_none_or(|value| value.is_empty()))
        .collect();

    if missing.is_empty() {
        debug!("{}: all {} required variables set", owner, vars.len());
        return Ok(());
    }

    Err(VaultflowError::Configuration(format!(
        "{} requires environment variables that are not set: {}",
        owner,
        missing.join(", ")
    )))
}

/// `check_required_env` against the process environment
pub fn check_process_env(owner: &str, vars: &[String]) -> Result<()> {
    check_required_env(owner, vars, |var| std::env::var(var).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_present() {
        let env: HashMap<&str, &str> = [("SMTP_USERNAME", "me"), ("SMTP_PASSWORD", "pw")].into();
        let result = check_required_env("email", &vars(&["SMTP_USERNAME", "SMTP_PASSWORD"]), |v| {
            env.get(v).map(|s| s.to_string())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_missing_and_empty_reported_together() {
        let env: HashMap<&str, &str> = [("SMTP_USERNAME", "")].into();
        let err = check_required_env("email", &vars(&["SMTP_USERNAME", "SMTP_PASSWORD"]), |v| {
            env.get(v).map(|s| s.to_string())
        })
        .unwrap_err();

        assert!(err.is_fatal());
        let message = err.to_string();
        assert!(message.contains("SMTP_USERNAME"));
        assert!(message.contains("SMTP_PASSWORD"));
    }

    #[test]
    fn test_nothing_required() {
        assert!(check_required_env("inbox", &[], |_| None).is_ok());
    }
}
