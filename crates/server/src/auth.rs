//! Panel authentication: the stored password digest and in-memory
//! sessions.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use subtle::ConstantTimeEq;

/// Digest scheme of the stored `password` setting:
/// `md5(md5(password + "_bt_all_in_ssl") + salt)`.
pub fn password_digest(password: &str, salt: &str) -> String {
    let inner = format!("{:x}", md5::compute(format!("{password}_bt_all_in_ssl").as_bytes()));
    format!("{:x}", md5::compute(format!("{inner}{salt}").as_bytes()))
}

pub fn digests_match(candidate: &str, stored: &str) -> bool {
    candidate.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// Bearer-token sessions handed out by `/login`.
pub struct SessionMap {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Instant>>,
}

impl SessionMap {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.sessions
            .write()
            .insert(token.clone(), Instant::now() + self.ttl);
        token
    }

    pub fn validate(&self, token: &str) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(token) {
            Some(expiry) if *expiry > Instant::now() => true,
            Some(_) => {
                sessions.remove(token);
                false
            }
            None => false,
        }
    }

    pub fn revoke(&self, token: &str) {
        self.sessions.write().remove(token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_depends_on_password_and_salt() {
        let a = password_digest("secret", "salt1");
        assert_eq!(a.len(), 32);
        assert_eq!(a, password_digest("secret", "salt1"));
        assert_ne!(a, password_digest("secret", "salt2"));
        assert_ne!(a, password_digest("other", "salt1"));
    }

    #[test]
    fn sessions_expire_and_revoke() {
        let sessions = SessionMap::new(Duration::from_secs(3600));
        let token = sessions.create();
        assert!(sessions.validate(&token));
        assert!(!sessions.validate("forged"));

        sessions.revoke(&token);
        assert!(!sessions.validate(&token));

        let expired = SessionMap::new(Duration::from_secs(0));
        let token = expired.create();
        assert!(!expired.validate(&token), "zero-ttl session is dead on arrival");
    }
}
