//! Client-held conversation state as signed cookies
//!
//! The transport provider round-trips cookies per conversation, so the
//! markers `greeted`, `participant` and `identity` can live on the
//! webhook exchange instead of in a server-side store. Each cookie value
//! is HMAC-SHA1 signed and carries its issue time; tampered or expired
//! cookies read as absent, which is equivalent to a fresh conversation.

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::HashMap;
use std::time::Duration;

use solara_core::PhoneNumber;

use crate::state::{ConversationState, ConversationStore, Participation};

pub const GREETED_COOKIE: &str = "greeted";
pub const PARTICIPANT_COOKIE: &str = "participant";
pub const IDENTITY_COOKIE: &str = "identity";

/// Path the conversation cookies are scoped to
const COOKIE_PATH: &str = "/sms";

/// Signs and verifies individual conversation-marker cookies.
#[derive(Clone)]
pub struct CookieSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl CookieSigner {
    pub fn new(key: &str, ttl: Duration) -> Self {
        Self {
            key: key.as_bytes().to_vec(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn signature(&self, name: &str, value: &str, issued_at: i64) -> String {
        let mut mac = Hmac::<Sha1>::new_from_slice(&self.key)
            .expect("HMAC accepts keys of any length");
        mac.update(name.as_bytes());
        mac.update(b":");
        mac.update(value.as_bytes());
        mac.update(b":");
        mac.update(issued_at.to_string().as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Encode a marker value as `b64(value).issued-at.signature`.
    pub fn encode(&self, name: &str, value: &str) -> String {
        self.encode_at(name, value, chrono::Utc::now().timestamp())
    }

    fn encode_at(&self, name: &str, value: &str, issued_at: i64) -> String {
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(value.as_bytes());
        let sig = self.signature(name, value, issued_at);
        format!("{}.{}.{}", encoded, issued_at, sig)
    }

    /// Decode and verify a marker value; `None` for anything tampered,
    /// malformed or older than the TTL.
    pub fn decode(&self, name: &str, raw: &str) -> Option<String> {
        let mut parts = raw.splitn(3, '.');
        let encoded = parts.next()?;
        let issued_at: i64 = parts.next()?.parse().ok()?;
        let sig = parts.next()?;

        let value = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded)
            .ok()?;
        let value = String::from_utf8(value).ok()?;

        if self.signature(name, &value, issued_at) != sig {
            return None;
        }

        let age = chrono::Utc::now().timestamp() - issued_at;
        if age < 0 || age as u64 > self.ttl.as_secs() {
            return None;
        }

        Some(value)
    }
}

/// Per-request conversation store over signed cookies.
///
/// Built from the inbound webhook's `Cookie` header; `put`/`clear`
/// accumulate `Set-Cookie` values the handler flushes into the response.
pub struct CookieConversationStore {
    signer: CookieSigner,
    presented: HashMap<String, String>,
    pending: parking_lot::Mutex<Vec<String>>,
}

impl CookieConversationStore {
    pub fn from_cookie_header(signer: CookieSigner, header: Option<&str>) -> Self {
        let mut presented = HashMap::new();
        if let Some(header) = header {
            for pair in header.split(';') {
                if let Some((name, value)) = pair.trim().split_once('=') {
                    presented.insert(name.to_string(), value.to_string());
                }
            }
        }
        Self {
            signer,
            presented,
            pending: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Drain the response `Set-Cookie` values produced by `put`/`clear`.
    pub fn take_set_cookies(&self) -> Vec<String> {
        std::mem::take(&mut *self.pending.lock())
    }

    fn marker(&self, name: &str) -> Option<String> {
        let raw = self.presented.get(name)?;
        self.signer.decode(name, raw)
    }

    fn set_cookie(&self, name: &str, value: &str) -> String {
        format!(
            "{}={}; Max-Age={}; Path={}",
            name,
            self.signer.encode(name, value),
            self.signer.ttl().as_secs(),
            COOKIE_PATH
        )
    }

    fn expire_cookie(&self, name: &str) -> String {
        format!("{}=; Max-Age=0; Path={}", name, COOKIE_PATH)
    }
}

#[async_trait]
impl ConversationStore for CookieConversationStore {
    async fn get(&self, _number: &PhoneNumber) -> ConversationState {
        let greeted = self.marker(GREETED_COOKIE).as_deref() == Some("true");
        if !greeted {
            return ConversationState::fresh();
        }

        let participation = match self.marker(PARTICIPANT_COOKIE).as_deref() {
            Some("accepted") => Participation::Accepted,
            Some("declined") => Participation::Declined,
            _ => Participation::Undecided,
        };
        let collected_name = if participation == Participation::Accepted {
            self.marker(IDENTITY_COOKIE)
        } else {
            None
        };

        ConversationState {
            greeted,
            participation,
            collected_name,
        }
    }

    async fn put(&self, _number: &PhoneNumber, state: ConversationState) {
        let mut pending = self.pending.lock();
        pending.clear();

        if state.is_fresh() {
            pending.push(self.expire_cookie(GREETED_COOKIE));
            pending.push(self.expire_cookie(PARTICIPANT_COOKIE));
            pending.push(self.expire_cookie(IDENTITY_COOKIE));
            return;
        }

        pending.push(self.set_cookie(GREETED_COOKIE, "true"));
        match state.participation {
            Participation::Accepted => {
                pending.push(self.set_cookie(PARTICIPANT_COOKIE, "accepted"));
            }
            Participation::Declined => {
                pending.push(self.set_cookie(PARTICIPANT_COOKIE, "declined"));
            }
            Participation::Undecided => {
                pending.push(self.expire_cookie(PARTICIPANT_COOKIE));
            }
        }
        match state.collected_name.as_deref() {
            Some(name) => pending.push(self.set_cookie(IDENTITY_COOKIE, name)),
            None => pending.push(self.expire_cookie(IDENTITY_COOKIE)),
        }
    }

    async fn clear(&self, _number: &PhoneNumber) {
        let mut pending = self.pending.lock();
        pending.clear();
        pending.push(self.expire_cookie(GREETED_COOKIE));
        pending.push(self.expire_cookie(PARTICIPANT_COOKIE));
        pending.push(self.expire_cookie(IDENTITY_COOKIE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> CookieSigner {
        CookieSigner::new("test-auth-token", Duration::from_secs(14400))
    }

    fn number() -> PhoneNumber {
        PhoneNumber::new("+15551230002")
    }

    /// Simulate the provider echoing `Set-Cookie` values back on the
    /// next webhook request.
    fn echo_cookies(set_cookies: &[String]) -> String {
        set_cookies
            .iter()
            .filter(|c| !c.contains("Max-Age=0"))
            .map(|c| c.split(';').next().unwrap().to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    #[test]
    fn test_signer_round_trip() {
        let s = signer();
        let raw = s.encode(GREETED_COOKIE, "true");
        assert_eq!(s.decode(GREETED_COOKIE, &raw).as_deref(), Some("true"));
    }

    #[test]
    fn test_tampered_value_rejected() {
        let s = signer();
        let raw = s.encode(PARTICIPANT_COOKIE, "declined");
        let forged = raw.replacen(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("declined"),
            &base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("accepted"),
            1,
        );
        assert_eq!(s.decode(PARTICIPANT_COOKIE, &forged), None);
    }

    #[test]
    fn test_cookie_name_bound_to_signature() {
        let s = signer();
        let raw = s.encode(GREETED_COOKIE, "true");
        assert_eq!(s.decode(PARTICIPANT_COOKIE, &raw), None);
    }

    #[test]
    fn test_expired_marker_rejected() {
        let s = signer();
        let old = chrono::Utc::now().timestamp() - 14401;
        let raw = s.encode_at(GREETED_COOKIE, "true", old);
        assert_eq!(s.decode(GREETED_COOKIE, &raw), None);
    }

    #[tokio::test]
    async fn test_state_round_trip_through_cookie_exchange() {
        let store = CookieConversationStore::from_cookie_header(signer(), None);
        assert!(store.get(&number()).await.is_fresh());

        let state = ConversationState {
            greeted: true,
            participation: Participation::Accepted,
            collected_name: Some("John Smith".to_string()),
        };
        store.put(&number(), state.clone()).await;
        let header = echo_cookies(&store.take_set_cookies());

        let next = CookieConversationStore::from_cookie_header(signer(), Some(&header));
        assert_eq!(next.get(&number()).await, state);
    }

    #[tokio::test]
    async fn test_fresh_put_expires_all_markers() {
        let store = CookieConversationStore::from_cookie_header(signer(), None);
        store.put(&number(), ConversationState::fresh()).await;
        let set_cookies = store.take_set_cookies();
        assert_eq!(set_cookies.len(), 3);
        assert!(set_cookies.iter().all(|c| c.contains("Max-Age=0")));

        let header = echo_cookies(&set_cookies);
        let next = CookieConversationStore::from_cookie_header(signer(), Some(&header));
        assert!(next.get(&number()).await.is_fresh());
    }

    #[tokio::test]
    async fn test_unsigned_cookies_read_as_fresh() {
        let store = CookieConversationStore::from_cookie_header(
            signer(),
            Some("greeted=true; participant=accepted"),
        );
        assert!(store.get(&number()).await.is_fresh());
    }
}
