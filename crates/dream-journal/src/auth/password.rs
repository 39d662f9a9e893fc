use rand::{distributions::Alphanumeric, Rng};

const TOKEN_LENGTH: usize = 32;

pub fn generate_session_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Tokens are never stored in clear; the session map is keyed by this digest.
pub fn session_key(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

pub async fn hash_password(password: &str, cost: u32) -> anyhow::Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))?
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))
}

pub async fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))?
        .map_err(|e| anyhow::anyhow!("Password verification failed: {}", e))
}
