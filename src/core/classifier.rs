//! Pothole image validation
//!
//! The mobile app runs a TensorFlow.js model on-device and sends its own
//! severity. The backend keeps a seam here for server-side verification;
//! until a model ships, it either trusts the client or (in development)
//! approves everything.

use serde::Serialize;

use crate::utils::constants::{AI_BYPASS_SCORE, AI_CLIENT_TRUST_SCORE};

/// Classifier outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verdict {
    /// Image shows a pothole
    pub valid: bool,
    /// Confidence in [0, 1]
    pub score: f64,
}

/// Decides whether an image shows a pothole
pub trait PotholeClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(&self, image: &[u8]) -> Verdict;
}

/// Development mode: everything passes with near-perfect confidence
#[derive(Debug, Default, Clone, Copy)]
pub struct BypassClassifier;

impl PotholeClassifier for BypassClassifier {
    fn name(&self) -> &'static str {
        "bypass"
    }

    fn classify(&self, _image: &[u8]) -> Verdict {
        Verdict {
            valid: true,
            score: AI_BYPASS_SCORE,
        }
    }
}

/// Production fallback: trust the on-device model
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientTrustClassifier;

impl PotholeClassifier for ClientTrustClassifier {
    fn name(&self) -> &'static str {
        "client-trust"
    }

    fn classify(&self, _image: &[u8]) -> Verdict {
        Verdict {
            valid: true,
            score: AI_CLIENT_TRUST_SCORE,
        }
    }
}

/// Pick the classifier for the current configuration
pub fn classifier_for(ai_bypass: bool) -> Box<dyn PotholeClassifier> {
    if ai_bypass {
        Box::new(BypassClassifier)
    } else {
        Box::new(ClientTrustClassifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_selection() {
        let bypass = classifier_for(true);
        assert_eq!(bypass.name(), "bypass");
        assert_eq!(bypass.classify(&[]).score, 0.99);

        let trust = classifier_for(false);
        assert_eq!(trust.name(), "client-trust");
        let verdict = trust.classify(b"jpeg");
        assert!(verdict.valid);
        assert_eq!(verdict.score, 0.95);
    }
}
