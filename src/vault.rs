use crate::error::{CreatorPilotError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::SysRng;
use rand::TryRng;
use std::path::PathBuf;

const SERVICE: &str = "creator-pilot";
const DAEMON_TOKEN_NAME: &str = "daemon_auth_token";

fn secret_fallback_file(name: &str) -> PathBuf {
    let encoded = URL_SAFE_NO_PAD.encode(name.as_bytes());
    crate::runtime_paths::secrets_dir()
        .join("fallback")
        .join(encoded)
}

fn read_secret_fallback_file(name: &str) -> Option<String> {
    let path = secret_fallback_file(name);
    let raw = std::fs::read_to_string(path).ok()?;
    let trimmed = raw.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn write_secret_fallback_file(name: &str, value: &str) -> Result<()> {
    let path = secret_fallback_file(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CreatorPilotError::Runtime(format!(
                "Failed to create secrets directory {}: {e}",
                parent.to_string_lossy()
            ))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
        }
    }
    std::fs::write(&path, value).map_err(|e| {
        CreatorPilotError::Runtime(format!(
            "Failed to write secret file {}: {e}",
            path.to_string_lossy()
        ))
    })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
    }
    Ok(())
}

fn keyring_backend_unavailable(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("dbus")
        || message.contains("secret service")
        || message.contains("keyring")
        || message.contains("no such interface")
        || message.contains("service unknown")
        || message.contains("backend not available")
        || message.contains("platform secure storage failure")
        || message.contains("keychain")
}

fn env_token() -> Option<String> {
    std::env::var("CREATOR_PILOT_TOKEN")
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn keyring_disabled() -> bool {
    std::env::var("CREATOR_PILOT_DISABLE_KEYRING")
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}

/// URL-safe random token with `bytes` bytes of OS entropy.
pub fn random_token(bytes: usize) -> Result<String> {
    let mut buf = vec![0u8; bytes.max(16)];
    let mut rng = SysRng;
    rng.try_fill_bytes(&mut buf)
        .map_err(|e| CreatorPilotError::Runtime(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(buf))
}

/// Stores in the OS keyring and mirrors to the 0600 fallback file, since
/// some keyring backends do not persist across processes.
pub fn set_secret(name: &str, value: &str) -> Result<()> {
    if !keyring_disabled() {
        let entry = keyring::Entry::new(SERVICE, name)
            .map_err(|e| CreatorPilotError::Runtime(e.to_string()))?;
        if let Err(err) = entry.set_password(value) {
            if !keyring_backend_unavailable(&err.to_string()) {
                return Err(CreatorPilotError::Runtime(err.to_string()));
            }
            tracing::debug!("keyring unavailable, using file fallback: {}", err);
        }
    }
    write_secret_fallback_file(name, value)
}

pub fn get_secret(name: &str) -> Result<Option<String>> {
    if keyring_disabled() {
        return Ok(read_secret_fallback_file(name));
    }
    let entry = keyring::Entry::new(SERVICE, name)
        .map_err(|e| CreatorPilotError::Runtime(e.to_string()))?;
    match entry.get_password() {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value.trim().to_string())),
        Ok(_) | Err(keyring::Error::NoEntry) => Ok(read_secret_fallback_file(name)),
        Err(err) => {
            if keyring_backend_unavailable(&err.to_string()) {
                return Ok(read_secret_fallback_file(name));
            }
            Err(CreatorPilotError::Runtime(err.to_string()))
        }
    }
}

pub fn ensure_daemon_auth_token() -> Result<String> {
    if let Some(token) = env_token() {
        return Ok(token);
    }

    if let Some(token) = get_secret(DAEMON_TOKEN_NAME)? {
        return Ok(token);
    }

    let generated = random_token(32)?;
    set_secret(DAEMON_TOKEN_NAME, &generated)?;
    tracing::info!(
        path = %secret_fallback_file(DAEMON_TOKEN_NAME).to_string_lossy(),
        "Generated daemon auth token"
    );
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_tokens_are_url_safe_and_distinct() {
        let a = random_token(32).unwrap();
        let b = random_token(32).unwrap();
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'));
        assert_eq!(a.len(), 43);
    }
}
