//! `parley login`: password sign-in against the hosted backend.
//!
//! The session token and user id are written back to the config file so
//! later commands act as that user.

use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use rustyline::DefaultEditor;

use parley_core::config::{get_config_path, load_config, read_config_file, save_config, Config};
use parley_store::{AuthSession, RestBackend};

pub async fn run(config_path: Option<&Path>, email: &str, password: Option<String>) -> Result<()> {
    let config = load_config(config_path);
    let Some(backend) = RestBackend::from_config(&config.backend) else {
        bail!("no backend configured: set backend.url and backend.anonKey first");
    };

    let password = match password {
        Some(p) => p,
        None => DefaultEditor::new()?.readline("Password: ")?,
    };

    let session = backend
        .sign_in(email, password.trim())
        .await
        .context("sign-in failed")?;

    let path = config_path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    let mut file_config = read_config_file(&path);
    remember_session(&mut file_config, &session);
    save_config(&file_config, Some(&path))
        .with_context(|| format!("failed to save {}", path.display()))?;

    println!(
        "{} Signed in as {}",
        "✓".green(),
        session.user.email.as_deref().unwrap_or(email)
    );
    Ok(())
}

/// Store the session on the config's backend section.
fn remember_session(config: &mut Config, session: &AuthSession) {
    config.backend.access_token = Some(session.access_token.clone());
    config.backend.user_id = session.user.id.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::rest::AuthUser;

    #[test]
    fn remember_session_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.backend.url = "https://db.example.com".into();
        let session = AuthSession {
            access_token: "jwt-1".into(),
            user: AuthUser {
                id: "user-42".into(),
                email: Some("a@b.c".into()),
            },
        };
        remember_session(&mut config, &session);
        save_config(&config, Some(&path)).unwrap();

        let reloaded = read_config_file(&path);
        assert_eq!(reloaded.backend.access_token.as_deref(), Some("jwt-1"));
        assert_eq!(reloaded.backend.user_id, "user-42");
        assert_eq!(reloaded.backend.url, "https://db.example.com");
    }
}
