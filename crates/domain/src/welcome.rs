use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single live welcome announcement for a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeRecord {
    pub chat_id: i64,
    pub message_ref: i64,
    pub created_at: DateTime<Utc>,
    /// Display names in first-seen order, no duplicates.
    #[serde(default)]
    pub mentioned: Vec<String>,
}

impl WelcomeRecord {
    pub fn new(chat_id: i64, message_ref: i64, created_at: DateTime<Utc>) -> Self {
        Self { chat_id, message_ref, created_at, mentioned: Vec::new() }
    }

    /// Set-union `names` into `mentioned`. Returns true if anything was added.
    pub fn merge<I, S>(&mut self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut grew = false;
        for name in names {
            let name = name.as_ref();
            if !self.mentioned.iter().any(|m| m == name) {
                self.mentioned.push(name.to_owned());
                grew = true;
            }
        }
        grew
    }

    /// Seconds elapsed since creation; negative clock skew counts as zero.
    pub fn age_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.created_at).num_seconds().max(0) as u64
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl_secs: u64) -> bool {
        self.age_secs(now) >= ttl_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn merge_is_idempotent_and_ordered() {
        let mut rec = WelcomeRecord::new(1, 10, at(0));
        assert!(rec.merge(["alice", "bob"]));
        assert!(!rec.merge(["bob"]));
        assert!(rec.merge(["carol", "alice"]));
        assert_eq!(rec.mentioned, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let rec = WelcomeRecord::new(1, 10, at(0));
        assert!(!rec.is_expired(at(299), 300));
        assert!(rec.is_expired(at(300), 300));
        assert!(rec.is_expired(at(900), 300));
    }

    #[test]
    fn clock_skew_never_expires() {
        let rec = WelcomeRecord::new(1, 10, at(100));
        assert_eq!(rec.age_secs(at(0)), 0);
        assert!(!rec.is_expired(at(0), 300));
    }

    #[test]
    fn record_roundtrips_through_json() {
        let mut rec = WelcomeRecord::new(-100123, 77, at(5));
        rec.merge(["@dana"]);
        let json = serde_json::to_string(&rec).unwrap();
        let back: WelcomeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
