//! Auth-token issuance: a short random key, unique across `auth_tokens`,
//! with a bounded collision-retry loop.

use rand::rngs::OsRng;
use rand::Rng;
use rusqlite::Connection;

use crate::db;

const TOKEN_LEN: usize = 20;
const TOKEN_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const MAX_ATTEMPTS: usize = 16;

fn random_key() -> String {
    (0..TOKEN_LEN)
        .map(|_| TOKEN_CHARS[OsRng.gen_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

/// Expires every previous token for the user and inserts a fresh one.
/// Collisions are retried a bounded number of times rather than looping
/// until the key space is exhausted.
pub fn issue_token(conn: &Connection, user_id: i64) -> anyhow::Result<String> {
    let mut key = None;
    for _ in 0..MAX_ATTEMPTS {
        let candidate = random_key();
        let taken: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM auth_tokens WHERE key = ?)",
            [&candidate],
            |r| r.get(0),
        )?;
        if !taken {
            key = Some(candidate);
            break;
        }
    }
    let Some(key) = key else {
        anyhow::bail!("no free token key after {MAX_ATTEMPTS} attempts");
    };

    let now = db::now();
    conn.execute(
        "UPDATE auth_tokens SET is_expired = 1, modified_time = ? WHERE user_id = ? AND is_expired = 0",
        (&now, user_id),
    )?;
    conn.execute(
        "INSERT INTO auth_tokens(user_id, key, is_expired, is_active, created_time, modified_time, added_by)
         VALUES(?, ?, 0, 1, ?, ?, ?)",
        (user_id, &key, &now, &now, user_id),
    )?;
    Ok(key)
}
