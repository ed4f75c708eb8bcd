use common_types::EventPayload;
use sha2::{Digest, Sha256};

/// Resolve the grouping key for a processed payload: an explicit fingerprint
/// set by the chain wins, otherwise one is derived from the canonicalized
/// message content. Either way the result is hashed so group keys stay
/// fixed-width regardless of what user code put in the override.
pub fn resolve_fingerprint(payload: &EventPayload) -> String {
    let proposed = match payload.fingerprint.as_deref() {
        Some([]) | None => generate_fingerprint(payload),
        Some(parts) => parts.join("-"),
    };
    hash_fingerprint(&proposed)
}

// Content-derived fallback. Kept deliberately shallow: richer stack-based
// derivation plugs in here without touching resolution.
fn generate_fingerprint(payload: &EventPayload) -> String {
    payload
        .message
        .clone()
        .unwrap_or_else(|| "<no-message>".to_string())
}

pub fn hash_fingerprint(fingerprint: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use common_types::EventPayload;

    use super::*;

    #[test]
    fn explicit_fingerprint_wins_over_message() {
        let mut a = EventPayload::new(1, Utc::now());
        a.message = Some("connection reset".to_string());
        a.fingerprint = Some(vec!["foo".to_string()]);

        let mut b = EventPayload::new(1, Utc::now());
        b.message = Some("completely different".to_string());
        b.fingerprint = Some(vec!["foo".to_string()]);

        assert_eq!(resolve_fingerprint(&a), resolve_fingerprint(&b));
    }

    #[test]
    fn derivation_is_deterministic_over_content() {
        let mut a = EventPayload::new(1, Utc::now());
        a.message = Some("connection reset".to_string());
        let mut b = EventPayload::new(1, Utc::now());
        b.message = Some("connection reset".to_string());

        assert_eq!(resolve_fingerprint(&a), resolve_fingerprint(&b));

        b.message = Some("something else".to_string());
        assert_ne!(resolve_fingerprint(&a), resolve_fingerprint(&b));
    }

    #[test]
    fn empty_override_falls_back_to_derivation() {
        let mut a = EventPayload::new(1, Utc::now());
        a.message = Some("connection reset".to_string());
        a.fingerprint = Some(vec![]);

        let mut b = EventPayload::new(1, Utc::now());
        b.message = Some("connection reset".to_string());

        assert_eq!(resolve_fingerprint(&a), resolve_fingerprint(&b));
    }

    #[test]
    fn multi_part_fingerprints_join() {
        let mut a = EventPayload::new(1, Utc::now());
        a.fingerprint = Some(vec!["db".to_string(), "timeout".to_string()]);

        assert_eq!(
            resolve_fingerprint(&a),
            hash_fingerprint("db-timeout")
        );
    }
}
