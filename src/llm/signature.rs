//! Per-session thought signature cache
//!
//! Backends that enforce signature continuity want the exact opaque token
//! they issued alongside a reasoning block. A session remembers the most
//! recent signed thought, the signature each tool call was issued with, and
//! which signatures it received for which thought text. Only signatures
//! that this session itself received, from the same backend family, are
//! ever offered back.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;

use super::model_resolver::ResolvedModel;

/// Upper bound for the per-call and per-text signature maps
const MAX_CACHED_SIGNATURES: usize = 512;

/// Backend family that issued a signature; signatures never cross families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureFamily {
    Claude,
    Gemini,
}

impl SignatureFamily {
    pub fn of(resolved: &ResolvedModel) -> Self {
        if resolved.is_claude() {
            SignatureFamily::Claude
        } else {
            SignatureFamily::Gemini
        }
    }
}

/// A reasoning block together with its continuation signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThoughtSignature {
    pub text: String,
    pub signature: String,
}

/// Where the session is in the signature lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignaturePhase {
    NoSignature,
    Valid,
    Refreshed,
}

#[derive(Debug, Clone)]
struct IssuedSignature {
    family: SignatureFamily,
    signature: String,
}

#[derive(Debug)]
pub struct SessionState {
    last_thoughts: HashMap<SignatureFamily, ThoughtSignature>,
    call_signatures: LruCache<String, IssuedSignature>,
    text_signatures: LruCache<String, IssuedSignature>,
    call_seed: u32,
    phase: SignaturePhase,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

fn text_digest(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn bounded_cache() -> LruCache<String, IssuedSignature> {
    LruCache::new(NonZeroUsize::new(MAX_CACHED_SIGNATURES).unwrap_or(NonZeroUsize::MIN))
}

fn issued_by(entry: Option<&IssuedSignature>, family: SignatureFamily) -> Option<&str> {
    entry
        .filter(|issued| issued.family == family)
        .map(|issued| issued.signature.as_str())
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            last_thoughts: HashMap::new(),
            call_signatures: bounded_cache(),
            text_signatures: bounded_cache(),
            call_seed: 0,
            phase: SignaturePhase::NoSignature,
        }
    }

    pub fn phase(&self) -> SignaturePhase {
        self.phase
    }

    /// Most recent signed thought issued by `family`
    pub fn last_thought(&self, family: SignatureFamily) -> Option<&ThoughtSignature> {
        self.last_thoughts.get(&family)
    }

    /// Store a signed thought, replacing the previous one of that family
    pub fn record_thought(&mut self, family: SignatureFamily, text: &str, signature: &str) {
        if signature.is_empty() {
            return;
        }
        self.text_signatures.put(
            text_digest(text),
            IssuedSignature {
                family,
                signature: signature.to_string(),
            },
        );
        self.last_thoughts.insert(
            family,
            ThoughtSignature {
                text: text.to_string(),
                signature: signature.to_string(),
            },
        );
        self.phase = match self.phase {
            SignaturePhase::NoSignature => SignaturePhase::Valid,
            SignaturePhase::Valid | SignaturePhase::Refreshed => SignaturePhase::Refreshed,
        };
        log::debug!(
            "[Signature] cached {:?} thought signature ({} chars of text), phase {:?}",
            family,
            text.len(),
            self.phase
        );
    }

    /// Remember the signature a specific tool call was issued with
    pub fn record_call_signature(&mut self, family: SignatureFamily, call_id: &str, signature: &str) {
        if call_id.is_empty() || signature.is_empty() {
            return;
        }
        self.call_signatures.put(
            call_id.to_string(),
            IssuedSignature {
                family,
                signature: signature.to_string(),
            },
        );
    }

    pub fn signature_for_call(&self, family: SignatureFamily, call_id: &str) -> Option<&str> {
        issued_by(self.call_signatures.peek(call_id), family)
    }

    /// Signature this session received from `family` for exactly this text
    pub fn signature_for_text(&self, family: SignatureFamily, text: &str) -> Option<&str> {
        issued_by(self.text_signatures.peek(&text_digest(text)), family)
    }

    /// Whether `signature` is the one `family` issued to this session for `text`
    pub fn is_trusted(&self, family: SignatureFamily, text: &str, signature: &str) -> bool {
        self.signature_for_text(family, text) == Some(signature)
    }

    /// Id for a tool call the backend sent without one, unique within the session
    pub fn next_call_id(&mut self) -> String {
        self.call_seed += 1;
        format!("tool-call-{}", self.call_seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::model_resolver::resolve;

    const GEMINI: SignatureFamily = SignatureFamily::Gemini;
    const CLAUDE: SignatureFamily = SignatureFamily::Claude;

    #[test]
    fn test_phase_transitions() {
        let mut session = SessionState::new();
        assert_eq!(session.phase(), SignaturePhase::NoSignature);
        assert!(session.last_thought(GEMINI).is_none());

        session.record_thought(GEMINI, "first", "sig-1");
        assert_eq!(session.phase(), SignaturePhase::Valid);

        session.record_thought(GEMINI, "second", "sig-2");
        assert_eq!(session.phase(), SignaturePhase::Refreshed);
        assert_eq!(
            session.last_thought(GEMINI),
            Some(&ThoughtSignature {
                text: "second".to_string(),
                signature: "sig-2".to_string(),
            })
        );
    }

    #[test]
    fn test_empty_signature_is_ignored() {
        let mut session = SessionState::new();
        session.record_thought(GEMINI, "text", "");
        session.record_call_signature(GEMINI, "call", "");
        assert_eq!(session.phase(), SignaturePhase::NoSignature);
        assert!(session.signature_for_call(GEMINI, "call").is_none());
    }

    #[test]
    fn test_trust_is_bound_to_text() {
        let mut session = SessionState::new();
        session.record_thought(CLAUDE, "plan A", "sig-a");
        session.record_thought(CLAUDE, "plan B", "sig-b");

        assert!(session.is_trusted(CLAUDE, "plan A", "sig-a"));
        assert!(session.is_trusted(CLAUDE, "plan B", "sig-b"));
        assert!(!session.is_trusted(CLAUDE, "plan A", "sig-b"));
        assert!(!session.is_trusted(CLAUDE, "plan C", "sig-a"));
        assert_eq!(session.signature_for_text(CLAUDE, "plan C"), None);
    }

    #[test]
    fn test_call_signatures_are_independent() {
        let mut session = SessionState::new();
        session.record_call_signature(GEMINI, "x", "sig-x");
        session.record_call_signature(GEMINI, "y", "sig-y");
        assert_eq!(session.signature_for_call(GEMINI, "x"), Some("sig-x"));
        assert_eq!(session.signature_for_call(GEMINI, "y"), Some("sig-y"));
        assert_eq!(session.signature_for_call(GEMINI, "z"), None);
    }

    #[test]
    fn test_signatures_do_not_cross_families() {
        let mut session = SessionState::new();
        session.record_thought(GEMINI, "gemini plan", "GEMINI-SIG");
        session.record_call_signature(GEMINI, "c1", "GEMINI-CALL");

        assert!(session.last_thought(CLAUDE).is_none());
        assert_eq!(session.signature_for_call(CLAUDE, "c1"), None);
        assert!(!session.is_trusted(CLAUDE, "gemini plan", "GEMINI-SIG"));
        assert!(session.is_trusted(GEMINI, "gemini plan", "GEMINI-SIG"));

        session.record_thought(CLAUDE, "claude plan", "CLAUDE-SIG");
        assert_eq!(session.last_thought(GEMINI).unwrap().signature, "GEMINI-SIG");
        assert_eq!(session.last_thought(CLAUDE).unwrap().signature, "CLAUDE-SIG");
    }

    #[test]
    fn test_family_of_resolved_model() {
        assert_eq!(SignatureFamily::of(&resolve("claude-sonnet-4-5-thinking")), CLAUDE);
        assert_eq!(SignatureFamily::of(&resolve("antigravity-gemini-3-pro")), GEMINI);
        assert_eq!(SignatureFamily::of(&resolve("gemini-2.5-flash")), GEMINI);
    }

    #[test]
    fn test_call_ids_are_unique_per_session() {
        let mut session = SessionState::new();
        assert_eq!(session.next_call_id(), "tool-call-1");
        assert_eq!(session.next_call_id(), "tool-call-2");
    }

    #[test]
    fn test_caches_are_bounded() {
        let mut session = SessionState::new();
        for i in 0..MAX_CACHED_SIGNATURES + 10 {
            session.record_call_signature(GEMINI, &format!("call-{i}"), "sig");
            session.record_thought(GEMINI, &format!("text-{i}"), "sig");
        }
        assert_eq!(session.call_signatures.len(), MAX_CACHED_SIGNATURES);
        assert_eq!(session.text_signatures.len(), MAX_CACHED_SIGNATURES);
        assert_eq!(session.signature_for_call(GEMINI, "call-0"), None);
        let newest = format!("call-{}", MAX_CACHED_SIGNATURES + 9);
        assert_eq!(session.signature_for_call(GEMINI, &newest), Some("sig"));
    }
}
